use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,
    #[serde(default = "default_backup_root")]
    pub backup_root: String,
    #[serde(default = "default_warmup_secs")]
    pub warmup_secs: u64,
    pub datastore: Datastore,
    pub backup: Backup,
    pub primary: Process,
    pub replica: Process,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Datastore {
    pub url: String,
    pub user: String,
    pub password: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Backup {
    pub command: String,
    #[serde(default = "default_quiesce_secs")]
    pub quiesce_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Process {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub pid_file: String,
    pub log_file: Option<String>,
}

fn default_interval_minutes() -> u64 {
    60
}

fn default_backup_root() -> String {
    "backups".to_string()
}

fn default_warmup_secs() -> u64 {
    30
}

fn default_quiesce_secs() -> u64 {
    15
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("failed to read config: {}", path.as_ref().display()))?;
        let cfg = toml::from_str(&contents)
            .with_context(|| format!("failed to parse config: {}", path.as_ref().display()))?;
        Ok(cfg)
    }
}
