use super::config::load_config;
use super::sync::{build_orchestrator, status_label};
use crate::logging;
use crate::output::Output;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use history_sync_config::{default_scheduler_config, PathManager, SchedulerConfig};
use history_sync_core::{SyncOrchestrator, SyncReport, SyncStatus};
use history_sync_models::SyncMode;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub struct Scheduler {
    scheduler: JobScheduler,
    orchestrator: Arc<SyncOrchestrator>,
    config: SchedulerConfig,
    shutdown: CancellationToken,
}

impl Scheduler {
    pub async fn new(orchestrator: SyncOrchestrator, config: SchedulerConfig) -> Result<Self> {
        let sched = JobScheduler::new().await?;

        Ok(Self {
            scheduler: sched,
            orchestrator: Arc::new(orchestrator),
            config,
            shutdown: CancellationToken::new(),
        })
    }

    /// Token cancelled on Ctrl+C or SIGTERM; the active cycle stops before its next page.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub async fn start(&mut self) -> Result<()> {
        if self.config.run_on_startup {
            info!(
                operation = "scheduler_startup",
                mode = %self.config.startup_mode,
                "Running initial sync on startup"
            );
            run_cycle(&self.orchestrator, self.config.startup_mode, self.shutdown.clone(), "startup").await;
        }

        if self.shutdown.is_cancelled() {
            info!(operation = "scheduler_stopped", "Shutdown requested during startup sync");
            return Ok(());
        }

        let orchestrator = Arc::clone(&self.orchestrator);
        let shutdown = self.shutdown.clone();
        let job = Job::new_async(self.config.schedule.as_str(), move |_uuid, _lock| {
            let orchestrator = Arc::clone(&orchestrator);
            let shutdown = shutdown.clone();
            Box::pin(async move {
                // Overlapping triggers are rejected by the orchestrator's run lock
                run_cycle(&orchestrator, SyncMode::Incremental, shutdown, "scheduled").await;
            })
        })
        .map_err(|e| eyre!("Invalid cron schedule '{}': {}", self.config.schedule, e))?;

        self.scheduler.add(job).await?;
        self.scheduler.start().await?;

        info!(
            operation = "scheduler_started",
            schedule = %self.config.schedule,
            "Scheduler started successfully"
        );

        self.shutdown.cancelled().await;

        info!(operation = "scheduler_stopping", "Shutdown requested, stopping scheduler");
        if let Err(e) = self.scheduler.shutdown().await {
            warn!("Scheduler did not shut down cleanly: {}", e);
        }

        // Wait for a cycle that is still between pages to write its checkpoint
        let store = self.orchestrator.store();
        let _idle = store.lock().await;
        info!(operation = "scheduler_stopped", "Daemon stopped");
        Ok(())
    }
}

async fn run_cycle(orchestrator: &SyncOrchestrator, mode: SyncMode, cancel: CancellationToken, trigger: &str) {
    if cancel.is_cancelled() {
        return;
    }
    info!(operation = "scheduled_sync_start", trigger, mode = %mode, "Starting sync");
    let report = orchestrator.run_cycle_with_cancel(mode, cancel).await;
    log_report(&report, trigger);
}

fn log_report(report: &SyncReport, trigger: &str) {
    match report.status {
        SyncStatus::Succeeded => info!(
            operation = "scheduled_sync_complete",
            trigger,
            added = report.total_added(),
            fetch_calls = report.fetch_calls,
            duration_ms = report.duration().num_milliseconds(),
            "Sync completed successfully"
        ),
        SyncStatus::AlreadyRunning => warn!(
            operation = "scheduled_sync_skipped",
            trigger,
            "Previous sync still running, trigger skipped"
        ),
        SyncStatus::PartialFailure => error!(
            operation = "scheduled_sync_error",
            trigger,
            status = status_label(report.status),
            added = report.total_added(),
            pending_walks = report.pending_walks,
            error = report.error.as_ref().map(|e| e.message.as_str()).unwrap_or(""),
            "Sync stopped early"
        ),
    }
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

pub async fn run_daemon(
    schedule_override: Option<String>,
    no_startup_sync: bool,
    verbose: u8,
    quiet: bool,
    output: &Output,
) -> Result<()> {
    let path_manager = PathManager::default();
    let config = load_config(&path_manager)?;
    let orchestrator = build_orchestrator(&config, &path_manager)?;

    let log_file = path_manager.daemon_log_file();
    logging::init_logging_with_file(verbose, quiet, Some(log_file.clone()))
        .map_err(|e| eyre!("Failed to set up daemon logging: {}", e))?;

    let from_file = config.scheduler.clone().unwrap_or_else(default_scheduler_config);
    let scheduler_config = SchedulerConfig {
        schedule: schedule_override.unwrap_or(from_file.schedule),
        run_on_startup: from_file.run_on_startup && !no_startup_sync,
        startup_mode: from_file.startup_mode,
    };

    output.info(format!(
        "Daemon running in foreground with schedule '{}'. Logs are being written to: {}",
        scheduler_config.schedule,
        log_file.display()
    ));

    let mut scheduler = Scheduler::new(orchestrator, scheduler_config)
        .await
        .map_err(|e| eyre!("Failed to create scheduler: {}", e))?;

    let shutdown = scheduler.shutdown_token();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!(operation = "shutdown_signal", "Received shutdown signal");
        shutdown.cancel();
    });

    scheduler
        .start()
        .await
        .map_err(|e| eyre!("Failed to run scheduler: {}", e))?;

    output.success("Daemon stopped");
    Ok(())
}
