pub mod agent_core;
pub mod inference;
pub mod mcp_client;

use std::path::PathBuf;
use std::sync::Arc;

use agent_core::{Orchestrator, TermLookupCache};
use inference::{InferenceClient, InferenceError, ModelConfig};
use mcp_client::{McpClient, McpError};
use thiserror::Error;

/// Default endpoint of the remote VFB tool provider.
pub const DEFAULT_MCP_ENDPOINT: &str = "https://vfb3-mcp.virtualflybrain.org/";

/// Return the platform-standard data directory for the assistant.
///
/// - macOS: `~/Library/Application Support/org.vfb.chat/`
/// - Windows: `{FOLDERID_RoamingAppData}\vfb-chat\`
/// - Linux: `$XDG_DATA_HOME/org.vfb.chat/` (fallback `~/.local/share/...`)
///
/// Falls back to `~/.vfb-chat/` only if none of the above can be resolved.
pub fn data_dir() -> PathBuf {
    if let Some(dir) = dirs::data_dir() {
        return dir.join("org.vfb.chat");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".vfb-chat")
}

/// Location of the term-cache snapshot inside [`data_dir`].
pub fn default_snapshot_path() -> PathBuf {
    data_dir().join("term_cache.json")
}

/// Initialize the tracing subscriber — writes structured logs to the data
/// directory.
///
/// On each startup:
/// 1. Rotates existing logs (assistant.log → assistant.log.1 → .2 → .3, keeps last 3).
/// 2. Opens a fresh assistant.log with a line-flushing writer for crash resilience.
/// 3. Logs a startup banner with the data directory path for discoverability.
pub fn init_tracing() {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = data_dir();
    let _ = std::fs::create_dir_all(&log_dir);

    let log_path = log_dir.join("assistant.log");

    // Rotate: assistant.log.2 → .3, .1 → .2, assistant.log → .1
    rotate_log_file(&log_path, 3);

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .expect("failed to open assistant.log");

    let writer = LineFlushWriter::new(log_file);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("vfb_chat=info,warn"));

    fmt::fmt()
        .with_env_filter(filter)
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_target(true)
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        data_dir = %log_dir.display(),
        log_file = %log_path.display(),
        pid = std::process::id(),
        "=== VFB assistant starting ==="
    );
}

/// Rotate log files: `assistant.log` → `assistant.log.1` → `.2` → … → `.{keep}`.
///
/// Oldest file beyond `keep` is deleted. Missing files in the chain are skipped.
fn rotate_log_file(base_path: &std::path::Path, keep: u32) {
    let oldest = format!("{}.{keep}", base_path.display());
    let _ = std::fs::remove_file(&oldest);

    for i in (1..keep).rev() {
        let from = format!("{}.{i}", base_path.display());
        let to = format!("{}.{}", base_path.display(), i + 1);
        let _ = std::fs::rename(&from, &to);
    }

    if base_path.exists() {
        let to = format!("{}.1", base_path.display());
        let _ = std::fs::rename(base_path, &to);
    }
}

/// File writer that flushes after every write.
///
/// The subscriber buffers output internally; without flushing, log lines
/// can sit in OS buffers and be lost on crash. Write volume here is far
/// too low for the flush to matter.
#[derive(Clone)]
struct LineFlushWriter {
    file: std::sync::Arc<std::sync::Mutex<std::fs::File>>,
}

impl LineFlushWriter {
    fn new(file: std::fs::File) -> Self {
        Self { file: std::sync::Arc::new(std::sync::Mutex::new(file)) }
    }
}

impl std::io::Write for LineFlushWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("lock poisoned: {e}")))?;
        let n = f.write(buf)?;
        f.flush()?;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Failure to construct the engine from configuration.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Inference(#[from] InferenceError),
    #[error(transparent)]
    Mcp(#[from] McpError),
}

/// Wire up an orchestrator against the real model endpoint and the real
/// tool provider, with the term cache warm-started from disk.
pub fn build_orchestrator(model_config: ModelConfig) -> Result<Orchestrator, SetupError> {
    let model = InferenceClient::from_config(model_config)?;
    let gateway = McpClient::new(DEFAULT_MCP_ENDPOINT)?;
    let cache = TermLookupCache::with_snapshot(default_snapshot_path());
    Ok(Orchestrator::new(
        Arc::new(model),
        Arc::new(gateway),
        Arc::new(cache),
    ))
}
