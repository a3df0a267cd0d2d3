use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Environment variable that overrides the stored session cookie.
pub const SESSDATA_ENV: &str = "REWIND_SESSDATA";

const SESSDATA_KEY: &str = "sessdata";
const SESSDATA_UPDATED_KEY: &str = "sessdata_updated_at";

#[derive(Debug, Serialize, Deserialize, Default)]
struct CredentialsData {
    #[serde(flatten)]
    data: HashMap<String, String>,
}

pub struct CredentialStore {
    path: PathBuf,
    credentials: HashMap<String, String>,
}

impl CredentialStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            credentials: HashMap::new(),
        }
    }

    pub fn load(&mut self) -> Result<()> {
        if self.path.exists() {
            let content = std::fs::read_to_string(&self.path)?;
            let creds_data: CredentialsData = toml::from_str(&content)?;
            self.credentials = creds_data.data;
        }
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let creds_data = CredentialsData {
            data: self.credentials.clone(),
        };
        let content = toml::to_string_pretty(&creds_data)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&String> {
        self.credentials.get(key)
    }

    pub fn set(&mut self, key: String, value: String) {
        self.credentials.insert(key, value);
    }

    pub fn remove(&mut self, key: &str) {
        self.credentials.remove(key);
    }

    pub fn get_sessdata(&self) -> Option<&String> {
        self.get(SESSDATA_KEY).filter(|s| !s.trim().is_empty())
    }

    /// Store a new session cookie and remember when it was captured.
    pub fn set_sessdata(&mut self, sessdata: String) {
        self.set(SESSDATA_KEY.to_string(), sessdata.trim().to_string());
        self.set(SESSDATA_UPDATED_KEY.to_string(), Utc::now().to_rfc3339());
    }

    pub fn clear_sessdata(&mut self) {
        self.remove(SESSDATA_KEY);
        self.remove(SESSDATA_UPDATED_KEY);
    }

    pub fn get_sessdata_updated_at(&self) -> Option<DateTime<Utc>> {
        self.get(SESSDATA_UPDATED_KEY)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Session cookie to use for requests: the environment wins over the file.
    pub fn resolve_sessdata(&self) -> Option<String> {
        resolve_with_env(std::env::var(SESSDATA_ENV).ok(), self.get_sessdata())
    }

    pub fn get_all_keys(&self) -> Vec<String> {
        self.credentials.keys().cloned().collect()
    }
}

fn resolve_with_env(env_value: Option<String>, stored: Option<&String>) -> Option<String> {
    env_value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| stored.cloned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_credential_store_load_and_save() {
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_path_buf();

        let mut store = CredentialStore::new(path.clone());
        store.set_sessdata("  abc%2C123  ".to_string());
        store.save().unwrap();

        let mut loaded_store = CredentialStore::new(path);
        loaded_store.load().unwrap();
        assert_eq!(loaded_store.get_sessdata(), Some(&"abc%2C123".to_string()));
        assert!(loaded_store.get_sessdata_updated_at().is_some());
    }

    #[test]
    fn test_clear_sessdata() {
        let mut store = CredentialStore::new(PathBuf::from("/tmp/test"));
        store.set_sessdata("cookie".to_string());
        store.set("other".to_string(), "value".to_string());

        store.clear_sessdata();
        assert_eq!(store.get_sessdata(), None);
        assert_eq!(store.get_sessdata_updated_at(), None);
        assert_eq!(store.get("other"), Some(&"value".to_string()));
    }

    #[test]
    fn test_blank_sessdata_is_missing() {
        let mut store = CredentialStore::new(PathBuf::from("/tmp/test"));
        store.set("sessdata".to_string(), "   ".to_string());
        assert_eq!(store.get_sessdata(), None);
    }

    #[test]
    fn test_env_overrides_stored_cookie() {
        let stored = "from-file".to_string();
        assert_eq!(
            resolve_with_env(Some("from-env".to_string()), Some(&stored)),
            Some("from-env".to_string())
        );
        assert_eq!(
            resolve_with_env(Some("  ".to_string()), Some(&stored)),
            Some("from-file".to_string())
        );
        assert_eq!(resolve_with_env(None, None), None);
    }
}
