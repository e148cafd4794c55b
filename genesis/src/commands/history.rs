//! `genesis history`: inspect the append-only evolution log.

use anyhow::Result;
use genesis_core::config::PathsConfig;
use genesis_evolution::{HistoryRecord, JsonlHistorySink, SqliteHistorySink};

pub fn cmd_history(limit: usize, jsonl: bool, as_json: bool) -> Result<()> {
    let paths = PathsConfig::from_env();
    let (records, counts) = if jsonl {
        let mut all = JsonlHistorySink::read_all(&paths.history_log)?;
        let keep = all.len().saturating_sub(limit);
        let mut recent = all.split_off(keep);
        recent.reverse();
        (recent, Vec::new())
    } else {
        if !paths.history_db.exists() {
            println!("No evolution history yet ({})", paths.history_db.display());
            return Ok(());
        }
        let sink = SqliteHistorySink::open(&paths.history_db)?;
        (sink.query_recent(limit)?, sink.count_by_type()?)
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }
    print_records(&records);
    if !counts.is_empty() {
        println!();
        println!("Totals:");
        for (event_type, n) in counts {
            println!("  {:<22} {}", event_type, n);
        }
    }
    Ok(())
}

fn print_records(records: &[HistoryRecord]) {
    if records.is_empty() {
        println!("No evolution history yet.");
        return;
    }
    println!("{:<26} {:<22} {:<17} REASON", "TIME", "EVENT", "TARGET");
    for r in records {
        let ts = r.ts.get(..19).unwrap_or(r.ts.as_str());
        let target = if r.target_id.is_empty() {
            "-"
        } else {
            r.target_id.as_str()
        };
        println!("{:<26} {:<22} {:<17} {}", ts, r.event_type, target, r.reason);
    }
}
