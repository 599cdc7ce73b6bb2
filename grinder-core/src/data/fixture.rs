//! Fixture replay loader
//!
//! Fixtures are directories holding either `events.jsonl` (one JSON object
//! per line) or `events.json` (a JSON array). Events are sorted by `ts`
//! before replay so runs are deterministic regardless of file order. Only
//! `"type": "SNAPSHOT"` events become snapshots; everything else is
//! carried through untouched.

use crate::data::snapshot::Snapshot;
use crate::core::time::TsMs;
use rust_decimal::Decimal;
use serde_json::Value;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("fixture io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("fixture parse error at line {line}: {source}")]
    Parse {
        line: usize,
        source: serde_json::Error,
    },

    #[error("no events file found in {0}")]
    Missing(String),
}

/// Load all events from a fixture directory, sorted by timestamp.
pub fn load_fixture(fixture_path: &Path) -> Result<Vec<Value>, FixtureError> {
    let jsonl_path = fixture_path.join("events.jsonl");
    let json_path = fixture_path.join("events.json");

    let mut events: Vec<Value> = if jsonl_path.exists() {
        let file = fs::File::open(&jsonl_path)?;
        let reader = BufReader::new(file);
        let mut out = Vec::new();
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let value =
                serde_json::from_str(&line).map_err(|source| FixtureError::Parse {
                    line: i + 1,
                    source,
                })?;
            out.push(value);
        }
        out
    } else if json_path.exists() {
        let text = fs::read_to_string(&json_path)?;
        serde_json::from_str(&text).map_err(|source| FixtureError::Parse { line: 0, source })?
    } else {
        return Err(FixtureError::Missing(fixture_path.display().to_string()));
    };

    events.sort_by_key(event_ts);
    Ok(events)
}

/// Timestamp of an event, 0 when absent (sorts first).
pub fn event_ts(event: &Value) -> TsMs {
    event.get("ts").and_then(Value::as_i64).unwrap_or(0)
}

/// Symbol of an event, empty when absent.
pub fn event_symbol(event: &Value) -> &str {
    event.get("symbol").and_then(Value::as_str).unwrap_or("")
}

/// Parse a fixture event into a `Snapshot` if it is a SNAPSHOT event.
/// Prices and quantities are decimal strings in fixtures.
pub fn parse_snapshot(event: &Value) -> Option<Snapshot> {
    if event.get("type").and_then(Value::as_str) != Some("SNAPSHOT") {
        return None;
    }
    Some(Snapshot {
        ts: event.get("ts")?.as_i64()?,
        symbol: event.get("symbol")?.as_str()?.to_string(),
        bid_price: field_decimal(event, "bid_price")?,
        ask_price: field_decimal(event, "ask_price")?,
        bid_qty: field_decimal(event, "bid_qty")?,
        ask_qty: field_decimal(event, "ask_qty")?,
        last_price: field_decimal(event, "last_price")?,
        last_qty: field_decimal(event, "last_qty")?,
    })
}

fn field_decimal(event: &Value, key: &str) -> Option<Decimal> {
    match event.get(key)? {
        Value::String(s) => Decimal::from_str(s).ok(),
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        _ => None,
    }
}
