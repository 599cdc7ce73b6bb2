//! Fill-outcome dataset: columnar Arrow IPC table + manifest
//!
//! `data.arrow` holds one row per completed roundtrip; `manifest.json`
//! records the schema version, row count, column list and the table's
//! SHA-256. Loading verifies the digest and refuses on mismatch.

use crate::artifact::{atomic_write, Manifest};
use crate::core::digest::sha256_hex;
use crate::core::errors::ArtifactError;
use crate::paper::roundtrip::{FillOutcomeRow, TradeDirection, TradeOutcome};
use arrow::array::{Array, ArrayRef, Int64Array, Int64Builder, StringArray, StringBuilder};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::ipc::reader::FileReader;
use arrow::ipc::writer::FileWriter;
use arrow::record_batch::RecordBatch;
use rust_decimal::Decimal;
use std::io::Cursor;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

pub const DATASET_SCHEMA_VERSION: &str = "fill_outcomes_v1";
pub const DATA_FILE: &str = "data.arrow";

/// Column order is part of the schema contract.
pub const COLUMNS: [&str; 21] = [
    "row_id",
    "symbol",
    "direction",
    "entry_ts",
    "entry_price",
    "entry_qty",
    "entry_fee",
    "entry_fill_count",
    "exit_ts",
    "exit_price",
    "exit_qty",
    "exit_fee",
    "exit_fill_count",
    "realized_pnl",
    "net_pnl",
    "pnl_bps",
    "holding_time_ms",
    "notional",
    "outcome",
    "source",
    "dataset_version",
];

fn dataset_schema() -> Schema {
    let string_cols = [
        "row_id",
        "symbol",
        "direction",
        "entry_price",
        "entry_qty",
        "entry_fee",
        "exit_price",
        "exit_qty",
        "exit_fee",
        "realized_pnl",
        "net_pnl",
        "notional",
        "outcome",
        "source",
        "dataset_version",
    ];
    let fields: Vec<Field> = COLUMNS
        .iter()
        .map(|name| {
            let data_type = if string_cols.contains(name) {
                DataType::Utf8
            } else {
                DataType::Int64
            };
            Field::new(*name, data_type, false)
        })
        .collect();
    Schema::new(fields)
}

/// Serialize rows into Arrow IPC file bytes.
fn encode_rows(rows: &[FillOutcomeRow]) -> Result<Vec<u8>, ArtifactError> {
    let schema = Arc::new(dataset_schema());

    let mut string_builders: std::collections::HashMap<&str, StringBuilder> = Default::default();
    let mut int_builders: std::collections::HashMap<&str, Int64Builder> = Default::default();

    for row in rows {
        let mut push_str = |name: &'static str, value: String| {
            string_builders
                .entry(name)
                .or_insert_with(StringBuilder::new)
                .append_value(value);
        };
        push_str("row_id", row.row_id.clone());
        push_str("symbol", row.symbol.clone());
        push_str("direction", row.direction.as_str().to_string());
        push_str("entry_price", row.entry_price.to_string());
        push_str("entry_qty", row.entry_qty.to_string());
        push_str("entry_fee", row.entry_fee.to_string());
        push_str("exit_price", row.exit_price.to_string());
        push_str("exit_qty", row.exit_qty.to_string());
        push_str("exit_fee", row.exit_fee.to_string());
        push_str("realized_pnl", row.realized_pnl.to_string());
        push_str("net_pnl", row.net_pnl.to_string());
        push_str("notional", row.notional.to_string());
        push_str("outcome", row.outcome.as_str().to_string());
        push_str("source", row.source.clone());
        push_str("dataset_version", row.dataset_version.clone());

        let mut push_int = |name: &'static str, value: i64| {
            int_builders
                .entry(name)
                .or_insert_with(Int64Builder::new)
                .append_value(value);
        };
        push_int("entry_ts", row.entry_ts);
        push_int("entry_fill_count", i64::from(row.entry_fill_count));
        push_int("exit_ts", row.exit_ts);
        push_int("exit_fill_count", i64::from(row.exit_fill_count));
        push_int("pnl_bps", row.pnl_bps);
        push_int("holding_time_ms", row.holding_time_ms);
    }

    let arrays: Vec<ArrayRef> = schema
        .fields()
        .iter()
        .map(|field| -> ArrayRef {
            let name = field.name().as_str();
            if let Some(builder) = string_builders.get_mut(name) {
                Arc::new(builder.finish())
            } else if let Some(builder) = int_builders.get_mut(name) {
                Arc::new(builder.finish())
            } else if field.data_type() == &DataType::Utf8 {
                Arc::new(StringArray::from(Vec::<&str>::new()))
            } else {
                Arc::new(Int64Array::from(Vec::<i64>::new()))
            }
        })
        .collect();

    let batch = RecordBatch::try_new(schema.clone(), arrays).map_err(arrow_err)?;

    let mut writer = FileWriter::try_new(Vec::new(), &schema).map_err(arrow_err)?;
    writer.write(&batch).map_err(arrow_err)?;
    writer.finish().map_err(arrow_err)?;
    writer.into_inner().map_err(arrow_err)
}

fn arrow_err(err: arrow::error::ArrowError) -> ArtifactError {
    ArtifactError::Malformed {
        path: DATA_FILE.to_string(),
        reason: err.to_string(),
    }
}

/// Write `data.arrow` + `manifest.json` into `out_dir`.
pub fn build_fill_dataset(
    rows: &[FillOutcomeRow],
    out_dir: &Path,
    created_at_utc: &str,
) -> Result<(), ArtifactError> {
    let bytes = encode_rows(rows)?;
    atomic_write(&out_dir.join(DATA_FILE), &bytes)?;

    let mut manifest = Manifest::new(DATASET_SCHEMA_VERSION, created_at_utc);
    manifest.row_count = rows.len();
    manifest.columns = COLUMNS.iter().map(|c| c.to_string()).collect();
    manifest.record_file(DATA_FILE, sha256_hex(&bytes));
    manifest.write(out_dir)
}

/// Load and verify a dataset directory.
pub fn load_fill_dataset(dir: &Path) -> Result<Vec<FillOutcomeRow>, ArtifactError> {
    let manifest = Manifest::load(dir)?;
    let bytes = manifest.verify_file(dir, DATA_FILE)?;
    decode_rows(&bytes)
}

fn decode_rows(bytes: &[u8]) -> Result<Vec<FillOutcomeRow>, ArtifactError> {
    let reader = FileReader::try_new(Cursor::new(bytes), None).map_err(arrow_err)?;
    let schema = reader.schema();
    let mut rows = Vec::new();

    for batch in reader {
        let batch = batch.map_err(arrow_err)?;
        let str_col = |name: &str| -> Result<&StringArray, ArtifactError> {
            let idx = schema.index_of(name).map_err(arrow_err)?;
            batch
                .column(idx)
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(|| ArtifactError::Malformed {
                    path: DATA_FILE.to_string(),
                    reason: format!("column {name} is not utf8"),
                })
        };
        let int_col = |name: &str| -> Result<&Int64Array, ArtifactError> {
            let idx = schema.index_of(name).map_err(arrow_err)?;
            batch
                .column(idx)
                .as_any()
                .downcast_ref::<Int64Array>()
                .ok_or_else(|| ArtifactError::Malformed {
                    path: DATA_FILE.to_string(),
                    reason: format!("column {name} is not int64"),
                })
        };

        let parse_dec = |raw: &str, name: &str| -> Result<Decimal, ArtifactError> {
            Decimal::from_str(raw).map_err(|_| ArtifactError::Malformed {
                path: DATA_FILE.to_string(),
                reason: format!("bad decimal in {name}: {raw:?}"),
            })
        };

        for i in 0..batch.num_rows() {
            let direction = match str_col("direction")?.value(i) {
                "long" => TradeDirection::Long,
                "short" => TradeDirection::Short,
                other => {
                    return Err(ArtifactError::Malformed {
                        path: DATA_FILE.to_string(),
                        reason: format!("bad direction {other:?}"),
                    })
                }
            };
            let outcome = match str_col("outcome")?.value(i) {
                "win" => TradeOutcome::Win,
                "loss" => TradeOutcome::Loss,
                "breakeven" => TradeOutcome::Breakeven,
                other => {
                    return Err(ArtifactError::Malformed {
                        path: DATA_FILE.to_string(),
                        reason: format!("bad outcome {other:?}"),
                    })
                }
            };

            rows.push(FillOutcomeRow {
                row_id: str_col("row_id")?.value(i).to_string(),
                symbol: str_col("symbol")?.value(i).to_string(),
                direction,
                entry_ts: int_col("entry_ts")?.value(i),
                entry_price: parse_dec(str_col("entry_price")?.value(i), "entry_price")?,
                entry_qty: parse_dec(str_col("entry_qty")?.value(i), "entry_qty")?,
                entry_fee: parse_dec(str_col("entry_fee")?.value(i), "entry_fee")?,
                entry_fill_count: int_col("entry_fill_count")?.value(i) as u32,
                exit_ts: int_col("exit_ts")?.value(i),
                exit_price: parse_dec(str_col("exit_price")?.value(i), "exit_price")?,
                exit_qty: parse_dec(str_col("exit_qty")?.value(i), "exit_qty")?,
                exit_fee: parse_dec(str_col("exit_fee")?.value(i), "exit_fee")?,
                exit_fill_count: int_col("exit_fill_count")?.value(i) as u32,
                realized_pnl: parse_dec(str_col("realized_pnl")?.value(i), "realized_pnl")?,
                net_pnl: parse_dec(str_col("net_pnl")?.value(i), "net_pnl")?,
                pnl_bps: int_col("pnl_bps")?.value(i),
                holding_time_ms: int_col("holding_time_ms")?.value(i),
                notional: parse_dec(str_col("notional")?.value(i), "notional")?,
                outcome,
                source: str_col("source")?.value(i).to_string(),
                dataset_version: str_col("dataset_version")?.value(i).to_string(),
            });
        }
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::model::test_rows::mixed_rows;
    use std::fs;

    #[test]
    fn test_dataset_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let rows = mixed_rows();
        build_fill_dataset(&rows, dir.path(), "2024-01-01T00:00:00Z").unwrap();

        let manifest = Manifest::load(dir.path()).unwrap();
        assert_eq!(manifest.schema_version, DATASET_SCHEMA_VERSION);
        assert_eq!(manifest.row_count, rows.len());
        assert_eq!(manifest.columns.len(), 21);

        let loaded = load_fill_dataset(dir.path()).unwrap();
        assert_eq!(loaded, rows);
    }

    #[test]
    fn test_empty_dataset_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        build_fill_dataset(&[], dir.path(), "2024-01-01T00:00:00Z").unwrap();
        let loaded = load_fill_dataset(dir.path()).unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn test_tampered_table_rejected() {
        let dir = tempfile::tempdir().unwrap();
        build_fill_dataset(&mixed_rows(), dir.path(), "2024-01-01T00:00:00Z").unwrap();

        let mut bytes = fs::read(dir.path().join(DATA_FILE)).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        fs::write(dir.path().join(DATA_FILE), bytes).unwrap();

        assert!(matches!(
            load_fill_dataset(dir.path()),
            Err(ArtifactError::ShaMismatch { .. })
        ));
    }

    #[test]
    fn test_deterministic_bytes() {
        let dir1 = tempfile::tempdir().unwrap();
        let dir2 = tempfile::tempdir().unwrap();
        let rows = mixed_rows();
        build_fill_dataset(&rows, dir1.path(), "2024-01-01T00:00:00Z").unwrap();
        build_fill_dataset(&rows, dir2.path(), "2024-01-01T00:00:00Z").unwrap();

        assert_eq!(
            fs::read(dir1.path().join(DATA_FILE)).unwrap(),
            fs::read(dir2.path().join(DATA_FILE)).unwrap()
        );
        assert_eq!(
            fs::read(dir1.path().join("manifest.json")).unwrap(),
            fs::read(dir2.path().join("manifest.json")).unwrap()
        );
    }
}
