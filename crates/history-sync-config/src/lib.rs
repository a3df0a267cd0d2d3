pub mod config;
pub mod credentials;
pub mod paths;

pub use config::{CategoryMapping, Config, RemoteConfig, SchedulerConfig, SyncSettings, default_category_mapping, default_scheduler_config, MAX_PAGE_SIZE};
pub use credentials::{CredentialStore, SESSDATA_ENV};
pub use paths::{PathManager, container_base_path};
