use tracing_subscriber::EnvFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable naming the log file.
pub const LOG_ENV_VAR: &str = "VMKIT_LOG";

/// Initialize tracing with optional file output.
///
/// Logging is disabled by default: the engine runs inside a host UI and must
/// not write to its terminal. Set `VMKIT_LOG` to a file path to enable it.
///
/// Log files get a `{path}.{timestamp}.{pid}` suffix so several hosts can
/// log side by side.
pub fn init_tracing() {
    let Some(log_path) = std::env::var(LOG_ENV_VAR).ok() else {
        return;
    };

    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let unique_path = unique_log_path(&log_path, timestamp, std::process::id());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let Ok(file) = std::fs::File::create(&unique_path) else {
        eprintln!("Warning: Failed to create log file: {}", unique_path);
        return;
    };

    let file_layer = fmt::layer()
        .with_writer(file)
        .with_ansi(false)
        .with_target(true)
        .with_level(true);

    // A host may already have installed a subscriber; keep theirs.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .try_init();
}

fn unique_log_path(base: &str, timestamp: u64, pid: u32) -> String {
    format!("{}.{}.{}", base, timestamp, pid)
}
