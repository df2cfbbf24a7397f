//! CLI support commands: model download, daemon status/stop, local stats.

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

use crate::supervisor;

const MODEL_URL: &str =
    "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/onnx/model.onnx";
const TOKENIZER_URL: &str =
    "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/tokenizer.json";

/// Download the ONNX embedding model and tokenizer to the cache directory.
pub async fn model_download(config: &crate::config::EmbeddingConfig) -> Result<()> {
    let cache_dir = crate::config::expand_tilde(&config.cache_dir);
    std::fs::create_dir_all(&cache_dir)
        .with_context(|| format!("failed to create cache dir: {}", cache_dir.display()))?;

    let model_path = cache_dir.join("model.onnx");
    let tokenizer_path = cache_dir.join("tokenizer.json");

    if model_path.exists() {
        println!("Model already exists at {}", model_path.display());
    } else {
        println!("Downloading model.onnx (~90MB)...");
        download_file(MODEL_URL, &model_path).await?;
        println!("Model saved to {}", model_path.display());
    }

    if tokenizer_path.exists() {
        println!("Tokenizer already exists at {}", tokenizer_path.display());
    } else {
        println!("Downloading tokenizer.json...");
        download_file(TOKENIZER_URL, &tokenizer_path).await?;
        println!("Tokenizer saved to {}", tokenizer_path.display());
    }

    println!("Model download complete. Ready for use.");
    Ok(())
}

/// Download a file from a URL with a progress bar. Atomic write (tmp + rename).
async fn download_file(url: &str, dest: &PathBuf) -> Result<()> {
    let response = reqwest::get(url)
        .await
        .with_context(|| format!("HTTP request failed for {url}"))?;

    anyhow::ensure!(
        response.status().is_success(),
        "download failed with HTTP {}",
        response.status()
    );

    let total_size = response.content_length();
    let pb = if let Some(size) = total_size {
        let pb = ProgressBar::new(size);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("  {bar:40.cyan/blue} {bytes}/{total_bytes} ({eta})")
                .expect("valid template")
                .progress_chars("##-"),
        );
        pb
    } else {
        ProgressBar::new_spinner()
    };

    let tmp_path = dest.with_extension("tmp");
    let mut file = tokio::fs::File::create(&tmp_path)
        .await
        .with_context(|| format!("failed to create temp file: {}", tmp_path.display()))?;

    let bytes = response.bytes().await.context("error reading response")?;
    pb.inc(bytes.len() as u64);
    file.write_all(&bytes)
        .await
        .context("error writing to file")?;

    file.flush().await?;
    drop(file);

    tokio::fs::rename(&tmp_path, dest)
        .await
        .context("failed to rename temp file")?;

    pb.finish_and_clear();
    Ok(())
}

/// Probe the daemon named in the identity file and print its health.
pub async fn status() -> Result<()> {
    let info = match supervisor::read_server_info()? {
        Some(info) => info,
        None => {
            println!("No server running (no identity file found).");
            return Ok(());
        }
    };

    let port = info
        .port
        .context("identity file has no port; was the server started on stdio?")?;
    let url = format!("http://localhost:{port}/health");

    match reqwest::get(&url).await {
        Ok(response) if response.status().is_success() => {
            let health: serde_json::Value = response.json().await?;
            println!("{} v{} is running", info.name, info.version);
            println!("  pid:      {}", info.pid);
            println!("  address:  http://{}:{}", info.host, port);
            println!("  database: {}", info.database_path);
            println!("  started:  {}", info.started_at);
            if health["in_docker"].as_bool().unwrap_or(false) {
                println!(
                    "  container: {}",
                    health["container_name"].as_str().unwrap_or("unknown")
                );
            }
        }
        _ => {
            println!(
                "Identity file names {} (pid {}), but {} is not responding. \
                 The server may have crashed; the identity file is stale.",
                info.name, info.pid, url
            );
        }
    }
    Ok(())
}

/// Signal the daemon named in the identity file to shut down.
pub async fn stop() -> Result<()> {
    let info = match supervisor::read_server_info()? {
        Some(info) => info,
        None => {
            println!("No server running (no identity file found).");
            return Ok(());
        }
    };

    println!("Stopping {} (pid {})...", info.name, info.pid);
    let status = std::process::Command::new("kill")
        .arg(info.pid.to_string())
        .status()
        .context("failed to run kill")?;
    anyhow::ensure!(status.success(), "kill exited with {status}");

    // The daemon removes its own identity file on graceful shutdown; give it
    // a moment, then clean up if it could not.
    tokio::time::sleep(std::time::Duration::from_secs(2)).await;
    if supervisor::server_info_path().exists() {
        supervisor::remove_server_info();
    }
    println!("Stopped.");
    Ok(())
}

/// Print local database statistics and health without a running daemon.
pub fn stats(config: &crate::config::EngramConfig) -> Result<()> {
    let conn = crate::db::open_database(config.resolved_db_path())?;
    let stats = crate::graph::store::get_stats(&conn)
        .map_err(|e| anyhow::anyhow!("failed to read stats: {e}"))?;
    let health = crate::db::check_database_health(&conn)?;

    println!("entities:       {}", stats.entity_count);
    println!("relations:      {}", stats.relation_count);
    println!("observations:   {}", stats.observation_count);
    println!("entity types:   {}", stats.entity_types);
    println!("relation types: {}", stats.relation_types);
    println!("embeddings:     {}", stats.embedding_count);
    println!("schema version: {}", health.schema_version);
    println!(
        "integrity:      {}",
        if health.integrity_ok {
            "ok".to_string()
        } else {
            health.integrity_details
        }
    );
    Ok(())
}
