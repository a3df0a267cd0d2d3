pub mod clear;
pub mod config;
pub mod daemon;
pub mod prompts;
pub mod stats;
pub mod status;
pub mod sync;
pub mod sync_ui;
pub mod verify;
