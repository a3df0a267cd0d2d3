use chrono::{Datelike, NaiveDate};
use history_sync_models::DayBucket;
use serde::Serialize;
use std::collections::BTreeMap;

/// Upper bounds of the heatmap intensity levels 1 to 4; anything above is level 5.
pub const HEATMAP_THRESHOLDS: [usize; 4] = [10, 50, 100, 200];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl std::fmt::Display for YearMonth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HeatmapCell {
    pub date: NaiveDate,
    pub count: usize,
    pub level: u8,
}

/// One cell per calendar day of a year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Heatmap {
    pub year: i32,
    pub cells: Vec<HeatmapCell>,
    pub total: usize,
    pub active_days: usize,
    pub busiest_day: Option<HeatmapCell>,
}

pub fn daily_counts(buckets: &[DayBucket]) -> BTreeMap<NaiveDate, usize> {
    buckets
        .iter()
        .filter(|b| !b.is_empty())
        .map(|b| (b.date, b.len()))
        .collect()
}

pub fn monthly_counts(daily: &BTreeMap<NaiveDate, usize>) -> BTreeMap<YearMonth, usize> {
    let mut months = BTreeMap::new();
    for (date, count) in daily {
        let key = YearMonth {
            year: date.year(),
            month: date.month(),
        };
        *months.entry(key).or_insert(0) += count;
    }
    months
}

/// Entries per category label; unlabelled entries are counted under `fallback`.
pub fn category_counts(buckets: &[DayBucket], fallback: &str) -> BTreeMap<String, usize> {
    let mut categories = BTreeMap::new();
    for entry in buckets.iter().flat_map(|b| b.entries.iter()) {
        let label = entry.category.as_deref().unwrap_or(fallback);
        *categories.entry(label.to_string()).or_insert(0) += 1;
    }
    categories
}

pub fn intensity_level(count: usize) -> u8 {
    if count == 0 {
        return 0;
    }
    HEATMAP_THRESHOLDS
        .iter()
        .position(|&upper| count <= upper)
        .map(|pos| pos as u8 + 1)
        .unwrap_or(HEATMAP_THRESHOLDS.len() as u8 + 1)
}

pub fn heatmap(year: i32, daily: &BTreeMap<NaiveDate, usize>) -> Heatmap {
    let mut cells = Vec::new();
    if let (Some(first), Some(last)) = (
        NaiveDate::from_ymd_opt(year, 1, 1),
        NaiveDate::from_ymd_opt(year, 12, 31),
    ) {
        for date in first.iter_days().take_while(|d| *d <= last) {
            let count = daily.get(&date).copied().unwrap_or(0);
            cells.push(HeatmapCell {
                date,
                count,
                level: intensity_level(count),
            });
        }
    }

    let total = cells.iter().map(|c| c.count).sum();
    let active_days = cells.iter().filter(|c| c.count > 0).count();
    let busiest_day = cells
        .iter()
        .filter(|c| c.count > 0)
        .max_by(|a, b| a.count.cmp(&b.count).then(b.date.cmp(&a.date)))
        .copied();

    Heatmap {
        year,
        cells,
        total,
        active_days,
        busiest_day,
    }
}
