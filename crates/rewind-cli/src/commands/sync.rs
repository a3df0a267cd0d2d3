use super::config::load_config;
use super::sync_ui::SyncUI;
use crate::output::Output;
use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::Result;
use comfy_table::{Attribute, Cell, Color, Table};
use history_sync_config::{Config, CredentialStore, PathManager, SESSDATA_ENV};
use history_sync_core::{SyncOrchestrator, SyncReport, SyncStatus};
use history_sync_models::SyncMode;
use history_sync_sources::BilibiliClient;
use std::sync::Arc;

pub async fn run_sync(full: bool, output: &Output) -> Result<()> {
    tracing::debug!("Sync command started");

    let paths = PathManager::default();
    let config = load_config(&paths)?;
    let orchestrator = build_orchestrator(&config, &paths)?;

    let mode = if full { SyncMode::Full } else { SyncMode::Incremental };
    let ui = SyncUI::new(output.is_human() && !output.is_quiet());
    ui.set_message(format!("Syncing watch history ({})...", mode));

    let report = orchestrator.run_cycle(mode).await;
    ui.finish();

    print_report(&report, output)?;

    match report.status {
        SyncStatus::PartialFailure => Err(eyre!(
            "Sync stopped early: {}",
            report.error.as_ref().map(|e| e.message.as_str()).unwrap_or("unknown error")
        )),
        _ => Ok(()),
    }
}

/// Build an orchestrator against the live Bilibili feed.
pub(crate) fn build_orchestrator(config: &Config, paths: &PathManager) -> Result<SyncOrchestrator> {
    paths
        .ensure_directories()
        .map_err(|e| eyre!("Failed to create data directories: {}", e))?;

    let credentials_file = paths.credentials_file();
    let mut cred_store = CredentialStore::new(credentials_file.clone());
    cred_store
        .load()
        .map_err(|e| eyre!("Failed to load credentials from {}: {}", credentials_file.display(), e))?;

    let sessdata = cred_store.resolve_sessdata().ok_or_else(|| {
        eyre!(
            "No SESSDATA cookie configured. Run 'rewind config cookie' or set {}.",
            SESSDATA_ENV
        )
    })?;

    let client = BilibiliClient::new(&config.remote, sessdata);
    SyncOrchestrator::from_config(Arc::new(client), config, paths)
        .wrap_err_with(|| format!("Failed to open history store at {}", paths.history_dir().display()))
}

pub(crate) fn print_report(report: &SyncReport, output: &Output) -> Result<()> {
    if !output.is_human() {
        output.json(&serde_json::to_value(report)?);
        return Ok(());
    }

    match report.status {
        SyncStatus::Succeeded => output.success(format!(
            "Sync completed: {} new item(s) in {:.1}s",
            report.total_added(),
            report.duration().num_milliseconds() as f64 / 1000.0
        )),
        SyncStatus::AlreadyRunning => {
            output.warn("A sync cycle is already running; this trigger was skipped");
            return Ok(());
        }
        SyncStatus::PartialFailure => {
            if let Some(error) = &report.error {
                output.error(format!("Sync stopped early ({}): {}", error.kind, error.message));
            }
        }
    }

    if !output.is_quiet() {
        println!("{}", report_table(report));
    }
    Ok(())
}

pub(crate) fn report_table(report: &SyncReport) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        Cell::new("Sync Report").fg(Color::Cyan).add_attribute(Attribute::Bold),
        Cell::new(""),
    ]);

    let mode = if report.requested_mode == report.mode {
        report.mode.to_string()
    } else {
        format!("{} (requested {})", report.mode, report.requested_mode)
    };
    let secured = report
        .secured_range
        .map(|r| format!("{} .. {}", r.from, r.to))
        .unwrap_or_else(|| "-".to_string());
    let stop = report
        .stop_reason
        .map(|s| s.to_string())
        .unwrap_or_else(|| "-".to_string());

    table.add_row(vec![Cell::new("Status"), Cell::new(status_label(report.status))]);
    table.add_row(vec![Cell::new("Mode"), Cell::new(mode)]);
    table.add_row(vec![Cell::new("Stopped"), Cell::new(stop)]);
    table.add_row(vec![Cell::new("New items"), Cell::new(report.total_added())]);
    table.add_row(vec![Cell::new("Pages merged"), Cell::new(report.pages_merged)]);
    table.add_row(vec![Cell::new("Requests"), Cell::new(report.fetch_calls)]);
    table.add_row(vec![Cell::new("Resumed walks"), Cell::new(report.resumed_walks)]);
    table.add_row(vec![Cell::new("Pending walks"), Cell::new(report.pending_walks)]);
    table.add_row(vec![Cell::new("Secured dates"), Cell::new(secured)]);
    table.add_row(vec![
        Cell::new("Finished"),
        Cell::new(report.finished_at.format("%Y-%m-%d %H:%M:%S UTC").to_string()),
    ]);
    if let Some(error) = &report.error {
        table.add_row(vec![
            Cell::new("Error").fg(Color::Red),
            Cell::new(format!("{}: {}", error.kind, error.message)),
        ]);
    }

    // Most recent dates first
    for (date, added) in report.added_by_date.iter().rev().take(10) {
        table.add_row(vec![Cell::new(format!("  {}", date)), Cell::new(format!("+{}", added))]);
    }
    if report.added_by_date.len() > 10 {
        table.add_row(vec![
            Cell::new("  ..."),
            Cell::new(format!("{} more date(s)", report.added_by_date.len() - 10)),
        ]);
    }

    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS);
    table
}

pub(crate) fn status_label(status: SyncStatus) -> &'static str {
    match status {
        SyncStatus::Succeeded => "succeeded",
        SyncStatus::PartialFailure => "partial failure",
        SyncStatus::AlreadyRunning => "already running",
    }
}
