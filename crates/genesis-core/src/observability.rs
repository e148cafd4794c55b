//! Observability: tracing init and the evolution audit log.
//!
//! Uses config::ObservabilityConfig for GENESIS_QUIET, GENESIS_LOG_LEVEL, GENESIS_AUDIT_LOG.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use serde_json::json;
use tracing_subscriber::{prelude::*, EnvFilter};

static AUDIT_PATH: Mutex<Option<String>> = Mutex::new(None);

/// Initialize tracing. Call once at process startup.
/// When GENESIS_QUIET=1 only WARN and above are logged.
pub fn init_tracing() {
    let cfg = crate::config::ObservabilityConfig::from_env();
    let level = filter_directives(cfg);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level));

    let _ = if cfg.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    };
}

const QUIET_FILTER: &str = "genesis=warn,genesis_core=warn,genesis_evolution=warn";

fn filter_directives(cfg: &crate::config::ObservabilityConfig) -> String {
    if cfg.quiet {
        QUIET_FILTER.to_string()
    } else {
        cfg.log_level.clone()
    }
}

fn get_audit_path() -> Option<String> {
    {
        let guard = AUDIT_PATH.lock().ok()?;
        if let Some(ref p) = *guard {
            return Some(p.clone());
        }
    }
    let path = crate::config::ObservabilityConfig::from_env().audit_log.clone()?;
    if path.is_empty() {
        return None;
    }
    if let Some(parent) = Path::new(&path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    {
        let mut guard = AUDIT_PATH.lock().ok()?;
        *guard = Some(path.clone());
    }
    Some(path)
}

/// Append one JSON record as a line. Write failures are dropped: auditing never
/// blocks the engine.
pub fn append_jsonl(path: &Path, record: &serde_json::Value) {
    if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(path) {
        if let Ok(line) = serde_json::to_string(record) {
            let _ = writeln!(f, "{}", line);
        }
    }
}

/// Audit: proposal lifecycle event (registered, approved, rejected, implemented, rollback).
pub fn audit_evolution_event(event_type: &str, target_id: &str, reason: &str) {
    tracing::debug!(
        event = %event_type,
        target_id = %target_id,
        reason = %reason,
        "Evolution audit event"
    );
    if let Some(path) = get_audit_path() {
        append_jsonl(Path::new(&path), &evolution_record(event_type, target_id, reason));
    }
}

fn evolution_record(event_type: &str, target_id: &str, reason: &str) -> serde_json::Value {
    json!({
        "ts": Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        "event": event_type,
        "target_id": target_id,
        "reason": reason,
        "source": "genesis"
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(quiet: bool) -> crate::config::ObservabilityConfig {
        crate::config::ObservabilityConfig {
            quiet,
            log_level: crate::config::DEFAULT_LOG_LEVEL.to_string(),
            log_json: false,
            audit_log: None,
        }
    }

    #[test]
    fn test_filters_cover_config_crate() {
        let default = filter_directives(&obs(false));
        assert!(default.contains("genesis_core=info"));
        let quiet = filter_directives(&obs(true));
        assert!(quiet.contains("genesis_core=warn"));
        for directives in [default, quiet] {
            assert!(EnvFilter::try_new(&directives).is_ok());
        }
    }

    #[test]
    fn test_append_jsonl_writes_lines() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("audit.jsonl");
        append_jsonl(&path, &evolution_record("proposal_registered", "abc", "cycle"));
        append_jsonl(&path, &evolution_record("proposal_approved", "abc", "votes"));

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["event"], "proposal_registered");
        assert_eq!(first["target_id"], "abc");
        assert!(first["ts"].as_str().unwrap().ends_with('Z'));
    }
}
