use crate::output::Output;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use history_sync_config::{CredentialStore, PathManager};
use history_sync_core::CheckpointStore;
use std::fs;

pub fn run_clear(all: bool, checkpoint: bool, credentials: bool, output: &Output) -> Result<()> {
    let path_manager = PathManager::default();

    if all {
        clear_checkpoint(&path_manager, output)?;
        clear_credentials(&path_manager, output)?;
        output.success("Checkpoint and credentials cleared");
        return Ok(());
    }

    let mut cleared_anything = false;

    if checkpoint {
        clear_checkpoint(&path_manager, output)?;
        cleared_anything = true;
    }

    if credentials {
        clear_credentials(&path_manager, output)?;
        cleared_anything = true;
    }

    if !cleared_anything {
        output.warn("No clear option specified. Use --checkpoint, --credentials, or --all");
        output.println("\nExample: rewind clear --checkpoint");
    }

    Ok(())
}

fn clear_checkpoint(path_manager: &PathManager, output: &Output) -> Result<()> {
    let checkpoints = CheckpointStore::new(path_manager.checkpoint_file());
    let removed = checkpoints
        .clear()
        .map_err(|e| eyre!("Failed to remove checkpoint: {}", e))?;

    if removed {
        output.success(format!(
            "Cleared checkpoint: {} (next sync runs a full backfill)",
            checkpoints.path().display()
        ));
    } else {
        output.info("No checkpoint found to clear");
    }
    Ok(())
}

fn clear_credentials(path_manager: &PathManager, output: &Output) -> Result<()> {
    let credentials_file = path_manager.credentials_file();
    if !credentials_file.exists() {
        output.info("No credentials file found to clear");
        return Ok(());
    }

    let mut cred_store = CredentialStore::new(credentials_file.clone());
    cred_store
        .load()
        .map_err(|e| eyre!("Failed to load credentials: {}", e))?;
    cred_store.clear_sessdata();

    if cred_store.get_all_keys().is_empty() {
        fs::remove_file(&credentials_file).map_err(|e| {
            eyre!(
                "Failed to remove credentials file at {}: {}",
                credentials_file.display(),
                e
            )
        })?;
    } else {
        cred_store
            .save()
            .map_err(|e| eyre!("Failed to save credentials: {}", e))?;
    }

    output.success(format!("Cleared credentials: {}", credentials_file.display()));
    Ok(())
}
