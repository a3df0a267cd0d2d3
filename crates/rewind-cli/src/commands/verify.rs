use super::config::load_config;
use crate::output::Output;
use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::Result;
use history_sync_config::PathManager;
use history_sync_core::verify_store;

const MAX_LISTED: usize = 20;

pub fn run_verify(output: &Output) -> Result<()> {
    let paths = PathManager::default();
    let config = load_config(&paths)?;
    let root = paths.history_dir();

    let report = verify_store(&root, config.sync.timezone)
        .wrap_err_with(|| format!("Failed to scan history store at {}", root.display()))?;

    if !output.is_human() {
        output.json(&serde_json::to_value(&report)?);
    } else {
        output.info(format!(
            "Scanned {} bucket(s) with {} entries in {}",
            report.buckets_scanned,
            report.total_entries,
            root.display()
        ));

        for corrupt in report.corrupt.iter().take(MAX_LISTED) {
            output.error(format!("Corrupt bucket {}: {}", corrupt.path.display(), corrupt.message));
        }
        for misplaced in report.misplaced.iter().take(MAX_LISTED) {
            let expected = misplaced
                .expected
                .map(|d| d.to_string())
                .unwrap_or_else(|| "no valid date".to_string());
            output.warn(format!(
                "Entry {} stored under {} belongs to {}",
                misplaced.key, misplaced.bucket, expected
            ));
        }
        for duplicate in report.duplicates.iter().take(MAX_LISTED) {
            output.warn(format!(
                "Entry {} appears {} times in {}",
                duplicate.key, duplicate.occurrences, duplicate.bucket
            ));
        }
        for stray in report.stray_files.iter().take(MAX_LISTED) {
            output.info(format!("Stray file (not a bucket): {}", stray.display()));
        }

        let listed_max = report
            .corrupt
            .len()
            .max(report.misplaced.len())
            .max(report.duplicates.len());
        if listed_max > MAX_LISTED {
            output.info(format!("Only the first {} findings of each kind are listed", MAX_LISTED));
        }
    }

    if report.is_clean() {
        output.success("History store is consistent");
        Ok(())
    } else {
        Err(eyre!(
            "Integrity check failed: {} corrupt bucket(s), {} misplaced entr(ies), {} duplicate key(s)",
            report.corrupt.len(),
            report.misplaced.len(),
            report.duplicates.len()
        ))
    }
}
