//! `genesis run`: drive the engine from stdin JSONL.
//!
//! Each input line is either an interaction record or a command. Command results,
//! cycle reports (with `--once`) and the final status are written to stdout as
//! JSON lines; logs go to stderr.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use genesis_core::config::{EvolutionConfig, PathsConfig};
use genesis_evolution::{
    seed, spawn_scheduler, CycleKind, EvolutionEngine, Interaction, JsonlHistorySink,
    RollbackTarget, SqliteHistorySink,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};

pub struct RunOptions {
    pub profile: Option<PathBuf>,
    pub rules: Option<PathBuf>,
    pub once: bool,
    pub no_history: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Command {
    Vote {
        proposal_id: String,
        approve: bool,
    },
    Apply {
        proposal_id: String,
    },
    Reject {
        proposal_id: String,
        #[serde(default)]
        reason: String,
    },
    /// No index: back to the original profile.
    Rollback {
        #[serde(default)]
        index: Option<usize>,
    },
    Cycle {
        kind: CycleKind,
    },
    Status,
}

#[derive(Debug, PartialEq)]
enum InputLine {
    Command(Command),
    Interaction(Interaction),
}

fn parse_line(line: &str) -> Result<InputLine> {
    if let Ok(cmd) = serde_json::from_str::<Command>(line) {
        return Ok(InputLine::Command(cmd));
    }
    let interaction: Interaction =
        serde_json::from_str(line).context("line is neither a command nor an interaction")?;
    Ok(InputLine::Interaction(interaction))
}

fn execute(engine: &EvolutionEngine, cmd: Command) -> Value {
    let (name, result) = match cmd {
        Command::Vote {
            proposal_id,
            approve,
        } => (
            "vote",
            engine
                .vote(&proposal_id, approve)
                .map(|r| json!(r)),
        ),
        Command::Apply { proposal_id } => (
            "apply",
            engine.apply(&proposal_id).map(|c| json!(c)),
        ),
        Command::Reject {
            proposal_id,
            reason,
        } => {
            let reason = if reason.is_empty() {
                "rejected by operator".to_string()
            } else {
                reason
            };
            ("reject", engine.reject(&proposal_id, &reason).map(|r| json!(r)))
        }
        Command::Rollback { index } => {
            let target = match index {
                Some(n) => RollbackTarget::HistoryIndex(n),
                None => RollbackTarget::Original,
            };
            ("rollback", engine.rollback(target).map(|p| json!(p)))
        }
        Command::Cycle { kind } => ("cycle", engine.run_cycle(kind).map(|r| json!(r))),
        Command::Status => (
            "status",
            Ok(json!({
                "status": engine.status(),
                "active_proposals": engine.list_active_proposals(),
                "analytics": engine.behavioral_analytics(),
            })),
        ),
    };
    match result {
        Ok(value) => json!({ "ok": true, "command": name, "result": value }),
        Err(e) => json!({ "ok": false, "command": name, "error": e.to_string() }),
    }
}

fn emit(value: &Value) {
    match serde_json::to_string(value) {
        Ok(line) => println!("{}", line),
        Err(e) => tracing::warn!(error = %e, "Failed to serialize output"),
    }
}

fn build_engine(opts: &RunOptions) -> Result<EvolutionEngine> {
    let paths = PathsConfig::from_env();
    let profile = match opts.profile.as_ref().or(paths.profile.as_ref()) {
        Some(path) => seed::load_profile(path)?,
        None => seed::seed_profile()?,
    };
    let mut builder = EvolutionEngine::builder(profile).config(EvolutionConfig::from_env());
    if let Some(ref path) = opts.rules {
        builder = builder.rules(seed::load_rules(path)?);
    }
    if !opts.no_history {
        builder = builder
            .sink(Arc::new(JsonlHistorySink::new(&paths.history_log)))
            .sink(Arc::new(SqliteHistorySink::open(&paths.history_db)?));
    }
    builder.build()
}

pub async fn cmd_run(opts: RunOptions) -> Result<()> {
    let engine = Arc::new(build_engine(&opts)?);
    let scheduler = if opts.once {
        engine.initialize();
        None
    } else {
        Some(spawn_scheduler(engine.clone()))
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut line_no = 0usize;
    loop {
        tokio::select! {
            next = lines.next_line() => {
                let Some(line) = next.context("reading stdin")? else {
                    break;
                };
                line_no += 1;
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match parse_line(line) {
                    Ok(InputLine::Interaction(i)) => engine.ingest(i),
                    Ok(InputLine::Command(cmd)) => emit(&execute(&engine, cmd)),
                    Err(e) => tracing::warn!(line = line_no, error = %e, "Skipping input line"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, shutting down");
                break;
            }
        }
    }

    if opts.once {
        for kind in CycleKind::ALL {
            match engine.run_cycle(kind) {
                Ok(report) => emit(&json!({ "cycle": report })),
                Err(e) => tracing::warn!(cycle = %kind, error = %e, "Evolution cycle failed"),
            }
        }
    }
    match scheduler {
        Some(handle) => handle.shutdown().await,
        None => engine.shutdown(),
    }

    emit(&json!({
        "status": engine.status(),
        "active_proposals": engine.list_active_proposals(),
        "current_profile": engine.get_current_profile(),
    }));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use genesis_evolution::VoteOutcome;

    #[test]
    fn test_parse_commands_and_interactions() {
        assert_eq!(
            parse_line(r#"{"vote":{"proposal_id":"abc","approve":true}}"#).unwrap(),
            InputLine::Command(Command::Vote {
                proposal_id: "abc".into(),
                approve: true
            })
        );
        assert_eq!(
            parse_line(r#"{"rollback":{}}"#).unwrap(),
            InputLine::Command(Command::Rollback { index: None })
        );
        assert_eq!(
            parse_line(r#"{"cycle":{"kind":"deep"}}"#).unwrap(),
            InputLine::Command(Command::Cycle {
                kind: CycleKind::Deep
            })
        );
        assert_eq!(parse_line(r#""status""#).unwrap(), InputLine::Command(Command::Status));

        match parse_line(r#"{"source":"chat","payload":{"satisfaction":0.2}}"#).unwrap() {
            InputLine::Interaction(i) => {
                assert_eq!(i.source, "chat");
                assert_eq!(i.payload["satisfaction"], 0.2);
            }
            other => panic!("expected interaction, got {:?}", other),
        }
        assert!(parse_line("not json").is_err());
        assert!(parse_line(r#"{"payload":{}}"#).is_err());
    }

    #[test]
    fn test_execute_reports_errors_as_json() {
        let engine = EvolutionEngine::builder(seed::seed_profile().unwrap())
            .build()
            .unwrap();
        let out = execute(
            &engine,
            Command::Vote {
                proposal_id: "missing".into(),
                approve: true,
            },
        );
        assert_eq!(out["ok"], false);
        assert_eq!(out["command"], "vote");
        assert!(out["error"].as_str().unwrap().contains("unknown proposal"));
    }

    #[test]
    fn test_execute_cycle_and_vote() {
        let engine = EvolutionEngine::builder(seed::seed_profile().unwrap())
            .build()
            .unwrap();
        for i in 0..20 {
            let s = if i < 17 { 0.2 } else { 0.7 };
            engine.ingest(Interaction::new("chat", json!({ "satisfaction": s })));
        }
        let out = execute(&engine, Command::Cycle { kind: CycleKind::Rapid });
        assert_eq!(out["ok"], true);
        let id = out["result"]["registered"][0].as_str().unwrap().to_string();

        execute(&engine, Command::Vote { proposal_id: id.clone(), approve: true });
        let out = execute(&engine, Command::Vote { proposal_id: id, approve: true });
        assert_eq!(out["result"]["outcome"], json!(VoteOutcome::Approved));
        assert_eq!(out["result"]["applied"], true);

        let status = execute(&engine, Command::Status);
        assert_eq!(status["result"]["status"]["total_evolutions"], 1);
    }
}
