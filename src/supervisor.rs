//! Runtime supervision: port negotiation, the identity file, docker
//! detection, and backup scheduling.
//!
//! The identity file is the out-of-band discovery mechanism: sibling
//! daemons, the CLI's status/stop commands, and external probes all find a
//! live server through it rather than by scanning ports.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::config::{default_engram_dir, in_docker, EngramConfig};
use crate::db::backup;

/// How many successive ports to probe past the preferred one.
const PORT_PROBE_RANGE: u16 = 100;

/// Identity record written by a live daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
    pub pid: u32,
    pub host: String,
    pub port: Option<u16>,
    pub in_docker: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,
    pub database_path: String,
    pub started_at: String,
}

impl ServerInfo {
    pub fn new(config: &EngramConfig, port: Option<u16>) -> Self {
        let dockerized = in_docker();
        let container_name = if dockerized {
            std::env::var("ENGRAM_CONTAINER_NAME")
                .or_else(|_| std::env::var("HOSTNAME"))
                .ok()
        } else {
            None
        };
        Self {
            name: config.server.name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            pid: std::process::id(),
            host: config.server.host.clone(),
            port,
            in_docker: dockerized,
            container_name,
            database_path: config.resolved_db_path().to_string_lossy().into_owned(),
            started_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Health-endpoint payload: identity fields plus `status`.
    pub fn health_value(&self) -> serde_json::Value {
        let mut v = serde_json::to_value(self).unwrap_or_else(|_| json!({}));
        v["status"] = json!("ok");
        v
    }
}

/// Path of the identity file: `<base>/server_info.json`.
pub fn server_info_path() -> PathBuf {
    default_engram_dir().join("server_info.json")
}

/// Write the identity file, creating the base directory if needed.
pub fn write_server_info(info: &ServerInfo) -> Result<()> {
    let path = server_info_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let contents = serde_json::to_string_pretty(info)?;
    std::fs::write(&path, contents)
        .with_context(|| format!("failed to write {}", path.display()))?;
    tracing::info!(path = %path.display(), "identity file written");
    Ok(())
}

/// Read the identity file, if present.
pub fn read_server_info() -> Result<Option<ServerInfo>> {
    let path = server_info_path();
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let info = serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(Some(info))
}

/// Remove the identity file. Missing files are fine.
pub fn remove_server_info() {
    let path = server_info_path();
    match std::fs::remove_file(&path) {
        Ok(()) => tracing::info!(path = %path.display(), "identity file removed"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove identity file"),
    }
}

/// Bind the preferred port, probing upward when it is taken. Two daemons on
/// one host land on adjacent ports and tell each other apart through their
/// identity files.
pub async fn bind_with_negotiation(host: &str, preferred: u16) -> Result<(TcpListener, u16)> {
    for offset in 0..PORT_PROBE_RANGE {
        let port = match preferred.checked_add(offset) {
            Some(p) => p,
            None => break,
        };
        match TcpListener::bind((host, port)).await {
            Ok(listener) => {
                let bound = listener.local_addr()?.port();
                if offset > 0 {
                    tracing::info!(preferred, port = bound, "preferred port busy, negotiated");
                }
                return Ok((listener, bound));
            }
            Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => continue,
            Err(e) => {
                return Err(e).with_context(|| format!("failed to bind {host}:{port}"));
            }
        }
    }
    anyhow::bail!(
        "no free port in range {preferred}-{}",
        preferred + PORT_PROBE_RANGE - 1
    )
}

/// Take a startup backup and prune, when configured.
pub fn run_startup_backup(config: &EngramConfig) {
    if !config.backup.backup_on_start {
        return;
    }
    let db_path = config.resolved_db_path();
    let backup_dir = config.resolved_backup_dir();
    if !db_path.exists() {
        return;
    }
    if let Err(e) = backup::backup_database(&db_path, &backup_dir) {
        tracing::warn!(error = %e, "startup backup failed");
    }
    if let Err(e) = backup::prune_backups(
        &backup_dir,
        config.backup.min_backups,
        config.backup.min_backup_age_days,
    ) {
        tracing::warn!(error = %e, "backup pruning failed");
    }
}

/// Spawn the periodic backup ticker. Returns None when disabled.
pub fn spawn_backup_ticker(config: Arc<EngramConfig>) -> Option<tokio::task::JoinHandle<()>> {
    let hours = config.backup.interval_hours;
    if hours == 0 {
        return None;
    }
    let period = std::time::Duration::from_secs(hours * 60 * 60);
    Some(tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        // The immediate first tick duplicates the startup backup; skip it.
        interval.tick().await;
        loop {
            interval.tick().await;
            let config = Arc::clone(&config);
            let result = tokio::task::spawn_blocking(move || {
                let db_path = config.resolved_db_path();
                let backup_dir = config.resolved_backup_dir();
                backup::backup_database(&db_path, &backup_dir)?;
                backup::prune_backups(
                    &backup_dir,
                    config.backup.min_backups,
                    config.backup.min_backup_age_days,
                )
            })
            .await;
            match result {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "periodic backup failed"),
                Err(e) => tracing::warn!(error = %e, "backup task panicked"),
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_round_trips_through_json() {
        let config = EngramConfig::default();
        let info = ServerInfo::new(&config, Some(6789));
        let text = serde_json::to_string(&info).unwrap();
        let back: ServerInfo = serde_json::from_str(&text).unwrap();
        assert_eq!(back.name, info.name);
        assert_eq!(back.port, Some(6789));
        assert_eq!(back.pid, std::process::id());
    }

    #[test]
    fn health_value_adds_status() {
        let config = EngramConfig::default();
        let info = ServerInfo::new(&config, Some(7000));
        let health = info.health_value();
        assert_eq!(health["status"], "ok");
        assert_eq!(health["port"], 7000);
        assert_eq!(health["name"], "engram");
    }

    #[tokio::test]
    async fn negotiation_skips_busy_port() {
        let (first, port) = bind_with_negotiation("127.0.0.1", 0).await.unwrap();
        // Port 0 binds an ephemeral port; now ask for that exact port again.
        let actual = first.local_addr().unwrap().port();
        let (_second, negotiated) = bind_with_negotiation("127.0.0.1", actual).await.unwrap();
        assert_ne!(negotiated, actual, "busy port must be skipped");
        assert!(negotiated > actual);
        drop(first);
        let _ = port;
    }
}
