use super::sync::report_table;
use crate::output::Output;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use comfy_table::{Attribute, Cell, Color, Table};
use history_sync_config::PathManager;
use history_sync_core::HistoryReader;
use serde_json::json;

pub fn run_status(output: &Output) -> Result<()> {
    let paths = PathManager::default();
    let reader = HistoryReader::from_paths(&paths);

    let checkpoint = reader.checkpoint().wrap_err("Failed to read sync checkpoint")?;
    let latest = reader.latest_date().wrap_err("Failed to scan history store")?;
    let bucket_count = reader.list_dates().map(|d| d.len()).unwrap_or(0);

    if !output.is_human() {
        output.json(&json!({
            "store": paths.history_dir().display().to_string(),
            "buckets": bucket_count,
            "latest_bucket": latest,
            "checkpoint": checkpoint,
        }));
        return Ok(());
    }

    let Some(checkpoint) = checkpoint else {
        output.warn("No sync has completed yet. Run 'rewind sync' to start a full backfill.");
        if let Some(latest) = latest {
            output.info(format!("Store already holds {} bucket(s), latest {}", bucket_count, latest));
        }
        return Ok(());
    };

    let mut table = Table::new();
    table.set_header(vec![
        Cell::new("Checkpoint").fg(Color::Cyan).add_attribute(Attribute::Bold),
        Cell::new(""),
    ]);
    table.add_row(vec![Cell::new("Updated"), Cell::new(checkpoint.updated_at.format("%Y-%m-%d %H:%M:%S UTC"))]);
    table.add_row(vec![
        Cell::new("Cursor"),
        Cell::new(format!("max={} view_at={}", checkpoint.cursor.max, checkpoint.cursor.view_at)),
    ]);
    table.add_row(vec![Cell::new("Buckets"), Cell::new(bucket_count)]);
    table.add_row(vec![
        Cell::new("Latest Bucket"),
        Cell::new(latest.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string())),
    ]);
    table.add_row(vec![Cell::new("Pending Walks"), Cell::new(checkpoint.pending.len())]);
    for walk in &checkpoint.pending {
        table.add_row(vec![
            Cell::new(format!("  {}", walk.mode)).fg(Color::Yellow),
            Cell::new(format!("resume at max={} view_at={}", walk.cursor.max, walk.cursor.view_at)),
        ]);
    }
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS);

    if output.is_quiet() {
        return Ok(());
    }
    println!("{}", table);

    match &checkpoint.last_report {
        Some(report) => println!("{}", report_table(report)),
        None => output.info("The checkpoint carries no report from the last cycle"),
    }
    Ok(())
}
