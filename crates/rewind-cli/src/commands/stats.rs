use super::config::load_config;
use crate::output::Output;
use chrono::{Datelike, NaiveDate};
use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::Result;
use comfy_table::{Attribute, Cell, Color, Table};
use history_sync_config::PathManager;
use history_sync_core::stats::{category_counts, daily_counts, heatmap, monthly_counts, Heatmap};
use history_sync_core::HistoryReader;
use serde_json::json;

/// One glyph per intensity level, empty day first.
const LEVEL_GLYPHS: [char; 6] = ['·', '░', '▒', '▓', '█', '■'];

pub fn run_stats(year: Option<i32>, show_heatmap: bool, output: &Output) -> Result<()> {
    let paths = PathManager::default();
    let config = load_config(&paths)?;
    let reader = HistoryReader::from_paths(&paths);

    let latest = reader.latest_date().wrap_err("Failed to scan history store")?;
    let Some(latest) = latest else {
        output.warn("The history store is empty. Run 'rewind sync' first.");
        return Ok(());
    };

    // A heatmap always covers one year
    let year = match (year, show_heatmap) {
        (Some(year), _) => Some(year),
        (None, true) => Some(latest.year()),
        (None, false) => None,
    };

    let buckets = match year {
        Some(year) => {
            let (first, last) = year_bounds(year)?;
            reader.load_range(first, last)
        }
        None => reader.load_all(),
    }
    .wrap_err("Failed to load history buckets")?;

    let daily = daily_counts(&buckets);
    let monthly = monthly_counts(&daily);
    let categories = category_counts(&buckets, &config.categories.fallback_label);
    let total: usize = daily.values().sum();

    if show_heatmap {
        let year = year.unwrap_or_else(|| latest.year());
        let map = heatmap(year, &daily);
        if !output.is_human() {
            output.json(&serde_json::to_value(&map)?);
            return Ok(());
        }
        print_heatmap(&map, output);
        return Ok(());
    }

    if !output.is_human() {
        let months: serde_json::Map<String, serde_json::Value> = monthly
            .iter()
            .map(|(month, count)| (month.to_string(), json!(count)))
            .collect();
        output.json(&json!({
            "year": year,
            "total": total,
            "days": daily.len(),
            "monthly": months,
            "categories": categories,
        }));
        return Ok(());
    }
    if output.is_quiet() {
        return Ok(());
    }

    let scope = year.map(|y| y.to_string()).unwrap_or_else(|| "all time".to_string());
    output.info(format!("{} entries on {} day(s), {}", total, daily.len(), scope));

    let mut month_table = Table::new();
    month_table.set_header(vec![
        Cell::new("Month").fg(Color::Cyan).add_attribute(Attribute::Bold),
        Cell::new("Entries").fg(Color::Cyan).add_attribute(Attribute::Bold),
    ]);
    for (month, count) in &monthly {
        month_table.add_row(vec![Cell::new(month), Cell::new(count)]);
    }
    month_table.load_preset(comfy_table::presets::UTF8_FULL);
    month_table.apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS);
    println!("{}", month_table);

    let mut ranked: Vec<_> = categories.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let mut category_table = Table::new();
    category_table.set_header(vec![
        Cell::new("Category").fg(Color::Cyan).add_attribute(Attribute::Bold),
        Cell::new("Entries").fg(Color::Cyan).add_attribute(Attribute::Bold),
        Cell::new("Share").fg(Color::Cyan).add_attribute(Attribute::Bold),
    ]);
    for (label, count) in ranked {
        let share = if total > 0 { count as f64 * 100.0 / total as f64 } else { 0.0 };
        category_table.add_row(vec![
            Cell::new(label),
            Cell::new(count),
            Cell::new(format!("{:.1}%", share)),
        ]);
    }
    category_table.load_preset(comfy_table::presets::UTF8_FULL);
    category_table.apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS);
    println!("{}", category_table);

    Ok(())
}

fn year_bounds(year: i32) -> Result<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(year, 1, 1).ok_or_else(|| eyre!("Invalid year: {}", year))?;
    let last = NaiveDate::from_ymd_opt(year, 12, 31).ok_or_else(|| eyre!("Invalid year: {}", year))?;
    Ok((first, last))
}

fn print_heatmap(map: &Heatmap, output: &Output) {
    if output.is_quiet() {
        return;
    }

    output.info(format!(
        "{}: {} entries on {} active day(s)",
        map.year, map.total, map.active_days
    ));
    if let Some(busiest) = &map.busiest_day {
        output.info(format!("Busiest day: {} with {} entries", busiest.date, busiest.count));
    }

    // One row per month, one glyph per day
    let mut grid = Table::new();
    grid.set_header(vec![
        Cell::new("Month").fg(Color::Cyan).add_attribute(Attribute::Bold),
        Cell::new("1        10        20        31").fg(Color::Cyan),
        Cell::new("Entries").fg(Color::Cyan).add_attribute(Attribute::Bold),
    ]);
    for month in 1..=12u32 {
        let cells: Vec<_> = map.cells.iter().filter(|c| c.date.month() == month).collect();
        let row: String = cells
            .iter()
            .map(|c| LEVEL_GLYPHS[usize::from(c.level).min(LEVEL_GLYPHS.len() - 1)])
            .collect();
        let count: usize = cells.iter().map(|c| c.count).sum();
        grid.add_row(vec![
            Cell::new(format!("{}-{:02}", map.year, month)),
            Cell::new(row),
            Cell::new(count),
        ]);
    }
    grid.load_preset(comfy_table::presets::UTF8_FULL);
    grid.apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS);
    println!("{}", grid);

    output.println("Legend: · 0   ░ 1-10   ▒ 11-50   ▓ 51-100   █ 101-200   ■ 201+");
}
