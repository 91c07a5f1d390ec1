use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use conduit_queue::QueueConfig;
use conduit_server::ServerConfig;
use conduit_store::StoreConfig;
use conduit_triggers::TriggerConfig;

/// Settings file read when `--config` is not given and it exists.
pub const DEFAULT_SETTINGS_FILE: &str = "conduit.toml";

const REDACTED: &str = "<redacted>";

/// Process-wide settings, built once at startup.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerConfig,
    pub storage: StoreConfig,
    pub queue: QueueConfig,
    pub triggers: TriggerConfig,
    /// Secret values by key; environment variables take precedence.
    pub secrets: BTreeMap<String, String>,
}

impl Settings {
    /// Load from `path`, or from `./conduit.toml` when present, then apply
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(path) => Some(path.to_path_buf()),
            None => Some(PathBuf::from(DEFAULT_SETTINGS_FILE)).filter(|p| p.is_file()),
        };
        let mut settings = match &path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        settings.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading settings from {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Override individual keys from `CONDUIT_*` variables.
    pub fn apply_overrides<F>(&mut self, var: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = var("CONDUIT_STORAGE_CONNECTION") {
            self.storage.connection = v;
        }
        if let Some(v) = var("CONDUIT_STORAGE_CONTAINER") {
            self.storage.container = v;
        }
        if let Some(v) = var("CONDUIT_QUEUE_CONNECTION") {
            self.queue.connection = v;
        }
        if let Some(v) = var("CONDUIT_QUEUE_NAME") {
            self.queue.name = v;
        }
        if let Some(v) = var("CONDUIT_BIND_ADDR") {
            self.server.bind_addr = v
                .parse()
                .with_context(|| format!("CONDUIT_BIND_ADDR '{v}' is not a socket address"))?;
        }
        Ok(())
    }

    pub fn secrets(&self) -> SecretSource<'_> {
        SecretSource {
            table: &self.secrets,
        }
    }

    /// Copy safe to print: secret values are masked.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        for value in copy.secrets.values_mut() {
            *value = REDACTED.into();
        }
        copy
    }
}

/// Secret lookup by key: `CONDUIT_SECRET_<KEY>` first, then `[secrets]`.
#[derive(Clone, Copy, Debug)]
pub struct SecretSource<'a> {
    table: &'a BTreeMap<String, String>,
}

impl SecretSource<'_> {
    /// Environment variable consulted for `key`: upper-cased, with every
    /// character other than ASCII letters and digits replaced by `_`.
    pub fn env_key(key: &str) -> String {
        let key: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
            .collect();
        format!("CONDUIT_SECRET_{key}")
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.get_with(key, |name| std::env::var(name).ok())
    }

    pub fn get_with<F>(&self, key: &str, var: F) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        var(&Self::env_key(key))
            .or_else(|| self.table.get(key).cloned())
            .filter(|v| !v.is_empty())
    }

    pub fn require(&self, key: &str) -> anyhow::Result<String> {
        self.get(key).with_context(|| {
            format!(
                "secret '{key}' is not configured; set {} or add it under [secrets]",
                Self::env_key(key)
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SAMPLE: &str = r#"
[server]
bind_addr = "0.0.0.0:8080"
max_body_bytes = 1024

[storage]
connection = "file:///var/lib/conduit/objects"
container = "Payloads"
create_container = true

[queue]
connection = "file:///var/lib/conduit/queue"
sync_mode = "os-default"

[triggers]
concurrency = 4

[secrets]
"basic-auth.ingest" = "aW5nZXN0OnBhc3N3b3Jk"
"#;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let s = Settings::default();
        assert_eq!(s.server.bind_addr.to_string(), "127.0.0.1:7071");
        assert_eq!(s.storage.connection, "memory:");
        assert_eq!(s.storage.container, "payloads");
        assert_eq!(s.queue.connection, "memory:");
        assert_eq!(s.queue.name, "pointers");
        assert_eq!(s.server.max_body_bytes, 4 * 1024 * 1024);
        assert_eq!(s.triggers.max_delivery_count, 10);
        assert_eq!(s.triggers.concurrency, 1);
    }

    #[test]
    fn parses_sample() {
        let s = Settings::from_toml(SAMPLE).unwrap();
        assert_eq!(s.server.bind_addr.port(), 8080);
        assert_eq!(s.server.max_body_bytes, 1024);
        assert_eq!(s.storage.container, "Payloads");
        assert!(s.storage.create_container);
        assert_eq!(s.queue.name, "pointers");
        assert_eq!(s.triggers.concurrency, 4);
        assert_eq!(s.triggers.max_delivery_count, 10);
        assert_eq!(s.secrets["basic-auth.ingest"], "aW5nZXN0OnBhc3N3b3Jk");
    }

    #[test]
    fn empty_file_is_all_defaults() {
        assert_eq!(Settings::from_toml("").unwrap(), Settings::default());
    }

    #[test]
    fn wrong_value_types_are_errors() {
        assert!(Settings::from_toml("[server]\nbind_addr = 12").is_err());
    }

    #[test]
    fn env_overrides() {
        let mut s = Settings::from_toml(SAMPLE).unwrap();
        s.apply_overrides(vars(&[
            ("CONDUIT_STORAGE_CONNECTION", "memory:"),
            ("CONDUIT_STORAGE_CONTAINER", "other"),
            ("CONDUIT_QUEUE_CONNECTION", "/tmp/q"),
            ("CONDUIT_QUEUE_NAME", "ptrs"),
            ("CONDUIT_BIND_ADDR", "127.0.0.1:9000"),
        ]))
        .unwrap();
        assert_eq!(s.storage.connection, "memory:");
        assert_eq!(s.storage.container, "other");
        assert_eq!(s.queue.connection, "/tmp/q");
        assert_eq!(s.queue.name, "ptrs");
        assert_eq!(s.server.bind_addr.port(), 9000);
        // Untouched keys keep file values.
        assert_eq!(s.triggers.concurrency, 4);
    }

    #[test]
    fn bad_bind_override_is_an_error() {
        let mut s = Settings::default();
        let err = s
            .apply_overrides(vars(&[("CONDUIT_BIND_ADDR", "localhost")]))
            .unwrap_err();
        assert!(err.to_string().contains("CONDUIT_BIND_ADDR"));
    }

    #[test]
    fn load_reads_given_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conduit.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        let s = Settings::from_file(&path).unwrap();
        assert_eq!(s.triggers.concurrency, 4);
        assert!(Settings::from_file(&dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn secret_env_key() {
        assert_eq!(
            SecretSource::env_key("basic-auth.ingest"),
            "CONDUIT_SECRET_BASIC_AUTH_INGEST"
        );
    }

    #[test]
    fn secrets_prefer_environment() {
        let s = Settings::from_toml(SAMPLE).unwrap();
        let secrets = s.secrets();
        assert_eq!(
            secrets.get_with("basic-auth.ingest", vars(&[])).as_deref(),
            Some("aW5nZXN0OnBhc3N3b3Jk")
        );
        let from_env = secrets.get_with(
            "basic-auth.ingest",
            vars(&[("CONDUIT_SECRET_BASIC_AUTH_INGEST", "ZW52OnZhbHVl")]),
        );
        assert_eq!(from_env.as_deref(), Some("ZW52OnZhbHVl"));
        assert!(secrets.get_with("missing", vars(&[])).is_none());
    }

    #[test]
    fn empty_secret_counts_as_missing() {
        let mut s = Settings::default();
        s.secrets.insert("k".into(), String::new());
        assert!(s.secrets().get_with("k", vars(&[])).is_none());
    }

    #[test]
    fn redacted_masks_secrets_only() {
        let s = Settings::from_toml(SAMPLE).unwrap();
        let printed = toml::to_string_pretty(&s.redacted()).unwrap();
        assert!(!printed.contains("aW5nZXN0OnBhc3N3b3Jk"));
        assert!(printed.contains(REDACTED));
        assert!(printed.contains("0.0.0.0:8080"));
    }
}
