use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::database::ConnectionRegistry;

const MAX_AUDIT_ENTRIES: usize = 1000;
const MAX_RECENT_FILES: usize = 10;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub details: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AuditLog {
    entries: Vec<AuditEntry>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, action: impl Into<String>, details: impl Into<String>) {
        self.entries.push(AuditEntry {
            timestamp: Utc::now(),
            action: action.into(),
            details: details.into(),
        });

        if self.entries.len() > MAX_AUDIT_ENTRIES {
            self.entries
                .drain(0..self.entries.len() - MAX_AUDIT_ENTRIES);
        }
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Argument separator used by formula function calls.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListSeparator {
    #[default]
    #[serde(rename = ",")]
    Comma,
    #[serde(rename = ";")]
    Semicolon,
}

impl ListSeparator {
    pub fn as_char(self) -> char {
        match self {
            Self::Comma => ',',
            Self::Semicolon => ';',
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AppSettings {
    pub connections: ConnectionRegistry,
    pub list_separator: ListSeparator,
    /// Maximum number of undo states kept per sheet (default: 100)
    pub history_depth: usize,
    /// Rows shown by `inspect` and other previews (default: 20)
    pub preview_row_limit: usize,
    /// Whether CSV reads retry with looser settings after a failure
    pub csv_fallback: bool,
    /// Whether the `.erbak` copy made before overwriting a file is kept
    pub keep_backups: bool,
    /// Most recently opened files, newest first
    pub recent_files: Vec<PathBuf>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            connections: ConnectionRegistry::default(),
            list_separator: ListSeparator::Comma,
            history_depth: 100,
            preview_row_limit: 20,
            csv_fallback: true,
            keep_backups: true,
            recent_files: Vec::new(),
        }
    }
}

impl AppSettings {
    pub fn push_recent_file(&mut self, path: &Path) {
        let path = path.to_path_buf();
        self.recent_files.retain(|p| *p != path);
        self.recent_files.insert(0, path);
        self.recent_files.truncate(MAX_RECENT_FILES);
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct AppConfig {
    pub settings: AppSettings,
    pub audit_log: AuditLog,
}

impl AppConfig {
    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut AppSettings {
        &mut self.settings
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.audit_log
    }

    pub fn log_event(&mut self, action: impl Into<String>, details: impl Into<String>) {
        self.audit_log.push(action, details);
    }

    pub fn connections(&self) -> &ConnectionRegistry {
        &self.settings.connections
    }

    pub fn connections_mut(&mut self) -> &mut ConnectionRegistry {
        &mut self.settings.connections
    }
}

pub fn get_config_path() -> PathBuf {
    crate::utils::standard_paths().base_dir.join("config.json")
}

pub fn load_app_config() -> AppConfig {
    load_app_config_from(&get_config_path())
}

pub fn load_app_config_from(path: &Path) -> AppConfig {
    if path.exists()
        && let Ok(content) = std::fs::read_to_string(path)
    {
        match serde_json::from_str::<AppConfig>(&content) {
            Ok(config) => return config,
            Err(e) => tracing::warn!("Ignoring unreadable config {}: {e}", path.display()),
        }
    }

    AppConfig::default()
}

pub fn save_app_config(config: &AppConfig) -> Result<()> {
    save_app_config_to(config, &get_config_path())
}

pub fn save_app_config_to(config: &AppConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write config: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{Connection, ConnectionKind};

    #[test]
    fn test_audit_log_is_capped() {
        let mut log = AuditLog::new();
        for i in 0..1005 {
            log.push("action", format!("entry {i}"));
        }
        assert_eq!(log.len(), 1000);
        assert_eq!(log.entries()[0].details, "entry 5");
    }

    #[test]
    fn test_recent_files_are_deduplicated_and_capped() {
        let mut settings = AppSettings::default();
        for i in 0..12 {
            settings.push_recent_file(Path::new(&format!("file{i}.csv")));
        }
        settings.push_recent_file(Path::new("file5.csv"));
        assert_eq!(settings.recent_files.len(), 10);
        assert_eq!(settings.recent_files[0], PathBuf::from("file5.csv"));
        assert_eq!(
            settings
                .recent_files
                .iter()
                .filter(|p| p.as_path() == Path::new("file5.csv"))
                .count(),
            1
        );
    }

    #[test]
    fn test_config_round_trip_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let missing = load_app_config_from(&path);
        assert_eq!(missing.settings.history_depth, 100);
        assert!(missing.settings.csv_fallback);

        let mut config = AppConfig::default();
        config.settings.list_separator = ListSeparator::Semicolon;
        config
            .connections_mut()
            .add(Connection::sqlite("local", "/tmp/local.db"));
        config.log_event("test", "saved");
        save_app_config_to(&config, &path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\";\""));
        assert!(!raw.contains("password"));

        let loaded = load_app_config_from(&path);
        assert_eq!(loaded.settings.list_separator, ListSeparator::Semicolon);
        assert_eq!(loaded.connections().len(), 1);
        assert_eq!(
            loaded.connections().get("local").map(|c| c.kind),
            Some(ConnectionKind::Sqlite)
        );
        assert_eq!(loaded.audit_log().len(), 1);
    }

    #[test]
    fn test_unreadable_config_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        let config = load_app_config_from(&path);
        assert_eq!(config.settings.preview_row_limit, 20);
    }
}
