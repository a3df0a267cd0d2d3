use super::prompts;
use super::sync_ui::is_interactive;
use crate::output::Output;
use crate::ConfigCommands;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use comfy_table::{Attribute, Cell, Color, Table};
use history_sync_config::{default_scheduler_config, Config, CredentialStore, PathManager, SESSDATA_ENV};
use owo_colors::OwoColorize;
use serde_json::json;

pub async fn run_config(cmd: ConfigCommands, output: &Output) -> Result<()> {
    match cmd {
        ConfigCommands::Show { full } => show_config(full, output),
        ConfigCommands::Cookie { sessdata } => configure_cookie(sessdata, output),
        ConfigCommands::Init { force } => init_config(force, output),
    }
}

/// Load and validate the config file, or defaults when none exists yet.
pub fn load_config(paths: &PathManager) -> Result<Config> {
    let config_file = paths.config_file();
    let config = Config::load_or_default(&config_file)
        .map_err(|e| eyre!("Failed to load config from {}: {}", config_file.display(), e))?;
    config
        .validate()
        .map_err(|e| eyre!("Invalid configuration in {}: {}", config_file.display(), e))?;
    Ok(config)
}

fn show_config(full: bool, output: &Output) -> Result<()> {
    let paths = PathManager::default();
    let config_file = paths.config_file();
    let config = load_config(&paths)?;

    let mut cred_store = CredentialStore::new(paths.credentials_file());
    cred_store
        .load()
        .map_err(|e| eyre!("Failed to load credentials: {}", e))?;
    let from_env = std::env::var(SESSDATA_ENV).map(|v| !v.trim().is_empty()).unwrap_or(false);
    let cookie = cred_store.resolve_sessdata().unwrap_or_default();
    let cookie_display = if full { cookie.clone() } else { mask_string(&cookie) };
    let scheduler = config.scheduler.clone().unwrap_or_else(default_scheduler_config);

    if !output.is_human() {
        output.json(&json!({
            "config_file": config_file.display().to_string(),
            "config_file_exists": config_file.exists(),
            "data_dir": paths.data_dir().display().to_string(),
            "sessdata": cookie_display,
            "sessdata_source": if from_env { "env" } else { "file" },
            "sessdata_updated_at": cred_store.get_sessdata_updated_at(),
            "remote": config.remote,
            "sync": config.sync,
            "scheduler": scheduler,
        }));
        return Ok(());
    }
    if output.is_quiet() {
        return Ok(());
    }

    if !config_file.exists() {
        output.warn(format!(
            "No configuration file at {}; showing defaults. Run 'rewind config init' to write one.",
            config_file.display()
        ));
    }

    let mut paths_table = section_table("Paths");
    paths_table.add_row(vec![Cell::new("Config File"), Cell::new(config_file.display())]);
    paths_table.add_row(vec![Cell::new("History Store"), Cell::new(paths.history_dir().display())]);
    paths_table.add_row(vec![Cell::new("Checkpoint"), Cell::new(paths.checkpoint_file().display())]);
    paths_table.add_row(vec![Cell::new("Daemon Log"), Cell::new(paths.daemon_log_file().display())]);
    println!("{}", paths_table);

    let mut remote_table = section_table("Bilibili");
    remote_table.add_row(vec![Cell::new("API Base URL"), Cell::new(&config.remote.base_url)]);
    remote_table.add_row(vec![
        Cell::new("SESSDATA"),
        Cell::new(if from_env {
            format!("{} (from {})", cookie_display, SESSDATA_ENV)
        } else {
            cookie_display
        }),
    ]);
    if let Some(updated) = cred_store.get_sessdata_updated_at() {
        remote_table.add_row(vec![
            Cell::new("Cookie Saved"),
            Cell::new(updated.format("%Y-%m-%d %H:%M UTC")),
        ]);
    }
    remote_table.add_row(vec![Cell::new("Page Size"), Cell::new(config.remote.effective_page_size())]);
    remote_table.add_row(vec![
        Cell::new("Request Interval"),
        Cell::new(format!("{} ms", config.remote.min_request_interval_ms)),
    ]);
    remote_table.add_row(vec![
        Cell::new("Request Timeout"),
        Cell::new(format!("{} s", config.remote.request_timeout_secs)),
    ]);
    remote_table.add_row(vec![
        Cell::new("Content Filter"),
        Cell::new(config.remote.business.as_deref().unwrap_or("all")),
    ]);
    println!("{}", remote_table);

    let mut sync_table = section_table("Sync Options");
    sync_table.add_row(vec![Cell::new("Retry Budget"), Cell::new(config.sync.retry_budget)]);
    sync_table.add_row(vec![
        Cell::new("Backoff"),
        Cell::new(format!(
            "{} ms doubling, max {} ms",
            config.sync.backoff_base_ms, config.sync.backoff_max_ms
        )),
    ]);
    sync_table.add_row(vec![Cell::new("Bucket Time Zone"), Cell::new(config.sync.timezone)]);
    sync_table.add_row(vec![Cell::new("Bucket Cache"), Cell::new(config.sync.bucket_cache_size)]);
    sync_table.add_row(vec![
        Cell::new("Stale Lock After"),
        Cell::new(format!("{} min", config.sync.stale_lock_minutes)),
    ]);
    println!("{}", sync_table);

    let mut scheduler_table = section_table("Scheduler");
    scheduler_table.add_row(vec![Cell::new("Schedule"), Cell::new(&scheduler.schedule)]);
    scheduler_table.add_row(vec![Cell::new("Run On Startup"), Cell::new(scheduler.run_on_startup)]);
    scheduler_table.add_row(vec![Cell::new("Startup Mode"), Cell::new(scheduler.startup_mode)]);
    println!("{}", scheduler_table);

    Ok(())
}

fn configure_cookie(sessdata_arg: Option<String>, output: &Output) -> Result<()> {
    let paths = PathManager::default();
    paths
        .ensure_directories()
        .map_err(|e| eyre!("Failed to create configuration directories: {}", e))?;

    let sessdata = match sessdata_arg {
        Some(value) => value,
        None => {
            if !is_interactive() {
                return Err(eyre!("No terminal available; pass the cookie with --sessdata"));
            }
            print_section_header("Bilibili Cookie Setup", output);
            output.println("  1. Log in to https://www.bilibili.com in your browser");
            output.println("  2. Open the developer tools and find the SESSDATA cookie");
            output.println("  3. Paste its value below (input is hidden)");
            output.println("");
            prompts::prompt_secret("SESSDATA: ")?
        }
    };

    let sessdata = sessdata.trim().to_string();
    if sessdata.is_empty() {
        return Err(eyre!("SESSDATA cannot be empty"));
    }

    let credentials_file = paths.credentials_file();
    let mut cred_store = CredentialStore::new(credentials_file.clone());
    cred_store
        .load()
        .map_err(|e| eyre!("Failed to load credentials from {}: {}", credentials_file.display(), e))?;
    cred_store.set_sessdata(sessdata.clone());
    cred_store
        .save()
        .map_err(|e| eyre!("Failed to save credentials to {}: {}", credentials_file.display(), e))?;

    output.success(format!("SESSDATA saved ({})", mask_string(&sessdata)));
    if std::env::var(SESSDATA_ENV).is_ok() {
        output.warn(format!("{} is set and takes precedence over the stored cookie", SESSDATA_ENV));
    }
    Ok(())
}

fn init_config(force: bool, output: &Output) -> Result<()> {
    let paths = PathManager::default();
    paths
        .ensure_directories()
        .map_err(|e| eyre!("Failed to create configuration directories: {}", e))?;

    let config_file = paths.config_file();
    if config_file.exists() && !force {
        let overwrite = is_interactive()
            && prompts::prompt_yes_no(
                &format!("{} already exists. Overwrite with defaults?", config_file.display()),
                Some(false),
            )?;
        if !overwrite {
            output.info("Keeping existing configuration (use --force to overwrite)");
            return Ok(());
        }
    }

    let config = Config {
        scheduler: Some(default_scheduler_config()),
        ..Config::default()
    };
    config
        .save_to_file(&config_file)
        .map_err(|e| eyre!("Failed to save config to {}: {}", config_file.display(), e))?;

    output.success(format!("Default configuration written to {}", config_file.display()));
    output.println("Next: run 'rewind config cookie' to store your SESSDATA cookie.");
    Ok(())
}

fn section_table(title: &str) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        Cell::new(title).fg(Color::Cyan).add_attribute(Attribute::Bold),
        Cell::new(""),
    ]);
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS);
    table
}

fn print_section_header(title: &str, output: &Output) {
    output.println("");
    output.println(format!("{}", title.bold().bright_cyan()));
    output.println(format!("{}", "─".repeat(title.chars().count()).bright_cyan()));
}

fn mask_string(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    if chars.is_empty() {
        return "<not set>".to_string();
    }
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..2].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{}***{}", head, tail)
}
