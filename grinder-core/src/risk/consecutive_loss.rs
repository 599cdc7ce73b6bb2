//! Consecutive-loss guard and its persistence wiring
//!
//! The guard itself is pure: per-symbol loss streaks that trip at a
//! threshold. The service around it handles the side effects: evidence
//! artifacts with SHA-256 sidecars, the operator PAUSE override, and
//! state persisted as JSON + sidecar behind a monotonic `last_trade_id`
//! guard (an older save is refused, an equal one is skipped).

use crate::artifact::{atomic_write, sidecar_path, verify_sidecar, write_with_sidecar};
use crate::core::digest::canonical_pretty;
use crate::core::errors::ArtifactError;
use crate::core::time::TsMs;
use crate::execution::Fill;
use crate::live::fsm::{OperatorOverride, OperatorOverrideSignal};
use crate::paper::roundtrip::{
    FillOutcomeRow, RoundtripTracker, RoundtripTrackerState, TradeOutcome,
};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

pub const ARTIFACT_VERSION: &str = "consecutive_loss_evidence_v1";
pub const STATE_FILE_VERSION: &str = "consecutive_loss_state_v2";
pub const STATE_FILE_VERSION_V1: &str = "consecutive_loss_state_v1";

#[derive(Debug, Clone)]
pub struct ConsecutiveLossConfig {
    pub enabled: bool,
    /// Losses in a row before tripping; >= 1.
    pub threshold: u32,
    /// Whether a breakeven roundtrip resets the streak like a win does.
    pub reset_on_breakeven: bool,
    pub evidence_enabled: bool,
}

impl Default for ConsecutiveLossConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: 5,
            reset_on_breakeven: true,
            evidence_enabled: false,
        }
    }
}

/// Trip event handed to the wiring layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsecutiveLossTrip {
    pub symbol: String,
    pub count: u32,
    pub threshold: u32,
}

/// Pure per-symbol streak tracking.
#[derive(Debug, Default)]
pub struct ConsecutiveLossGuard {
    config: ConsecutiveLossConfig,
    streaks: BTreeMap<String, u32>,
}

impl ConsecutiveLossGuard {
    pub fn new(config: ConsecutiveLossConfig) -> Self {
        Self {
            config,
            streaks: BTreeMap::new(),
        }
    }

    pub fn from_streaks(config: ConsecutiveLossConfig, streaks: BTreeMap<String, u32>) -> Self {
        Self { config, streaks }
    }

    pub fn streak(&self, symbol: &str) -> u32 {
        self.streaks.get(symbol).copied().unwrap_or(0)
    }

    pub fn streaks(&self) -> &BTreeMap<String, u32> {
        &self.streaks
    }

    /// Record a closed roundtrip outcome. Returns a trip event when the
    /// streak reaches the threshold.
    pub fn record_outcome(
        &mut self,
        symbol: &str,
        outcome: TradeOutcome,
    ) -> Option<ConsecutiveLossTrip> {
        if !self.config.enabled {
            return None;
        }
        let streak = self.streaks.entry(symbol.to_string()).or_insert(0);
        match outcome {
            TradeOutcome::Loss => *streak += 1,
            TradeOutcome::Win => *streak = 0,
            TradeOutcome::Breakeven => {
                if self.config.reset_on_breakeven {
                    *streak = 0;
                }
            }
        }
        if *streak >= self.config.threshold {
            let trip = ConsecutiveLossTrip {
                symbol: symbol.to_string(),
                count: *streak,
                threshold: self.config.threshold,
            };
            return Some(trip);
        }
        None
    }
}

/// Persisted state: v2 embeds the roundtrip tracker; v1 files load
/// without it (a warning is logged and the tracker starts empty).
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedGuardState {
    pub version: String,
    pub streaks: BTreeMap<String, u32>,
    pub last_trade_id: i64,
    pub tracker: Option<RoundtripTrackerState>,
}

impl PersistedGuardState {
    pub fn v2(
        streaks: BTreeMap<String, u32>,
        last_trade_id: i64,
        tracker: RoundtripTrackerState,
    ) -> Self {
        Self {
            version: STATE_FILE_VERSION.to_string(),
            streaks,
            last_trade_id,
            tracker: Some(tracker),
        }
    }

    pub fn to_value(&self) -> Value {
        let mut value = json!({
            "version": self.version,
            "streaks": self.streaks,
            "last_trade_id": self.last_trade_id,
        });
        if let Some(tracker) = &self.tracker {
            value["tracker"] =
                serde_json::to_value(tracker).expect("tracker state serializes");
        }
        value
    }

    pub fn from_value(value: &Value) -> Result<Self, ArtifactError> {
        let malformed = |reason: String| ArtifactError::Malformed {
            path: "consecutive_loss_state".to_string(),
            reason,
        };
        let version = value
            .get("version")
            .and_then(Value::as_str)
            .ok_or_else(|| malformed("missing version".into()))?;
        if version != STATE_FILE_VERSION && version != STATE_FILE_VERSION_V1 {
            return Err(malformed(format!("unsupported state version: {version:?}")));
        }
        let last_trade_id = value
            .get("last_trade_id")
            .and_then(Value::as_i64)
            .unwrap_or(0);
        if last_trade_id < 0 {
            return Err(malformed(format!(
                "last_trade_id must be >= 0, got {last_trade_id}"
            )));
        }
        let streaks = value
            .get("streaks")
            .and_then(Value::as_object)
            .map(|m| {
                m.iter()
                    .filter_map(|(k, v)| v.as_u64().map(|n| (k.clone(), n as u32)))
                    .collect()
            })
            .unwrap_or_default();
        let tracker = match value.get("tracker") {
            None | Some(Value::Null) => {
                if version == STATE_FILE_VERSION_V1 {
                    warn!("loading v1 consecutive-loss state without tracker");
                }
                None
            }
            Some(raw) => Some(
                serde_json::from_value(raw.clone())
                    .map_err(|e| malformed(format!("bad tracker: {e}")))?,
            ),
        };
        Ok(Self {
            version: version.to_string(),
            streaks,
            last_trade_id,
            tracker,
        })
    }
}

/// Load persisted state; verifies the sidecar when present. Returns
/// `None` when no state file exists.
pub fn load_state(path: &Path) -> Result<Option<PersistedGuardState>, ArtifactError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = if sidecar_path(path).exists() {
        verify_sidecar(path)?
    } else {
        fs::read(path)?
    };
    let value: Value =
        serde_json::from_slice(&content).map_err(|e| ArtifactError::Malformed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
    Ok(Some(PersistedGuardState::from_value(&value)?))
}

/// Save state with the monotonic `last_trade_id` guard:
/// older -> refused, equal -> skipped (idempotent), newer -> written
/// atomically with a SHA-256 sidecar. Returns whether bytes hit disk.
pub fn save_state(path: &Path, state: &PersistedGuardState) -> Result<bool, ArtifactError> {
    if let Some(existing) = load_state(path)? {
        if state.last_trade_id < existing.last_trade_id {
            warn!(
                new = state.last_trade_id,
                on_disk = existing.last_trade_id,
                "refusing non-monotonic consecutive-loss state save"
            );
            return Err(ArtifactError::Malformed {
                path: path.display().to_string(),
                reason: format!(
                    "non-monotonic last_trade_id: {} < {}",
                    state.last_trade_id, existing.last_trade_id
                ),
            });
        }
        if state.last_trade_id == existing.last_trade_id {
            return Ok(false);
        }
    }
    let text = canonical_pretty(&state.to_value());
    write_with_sidecar(path, text.as_bytes())?;
    Ok(true)
}

/// Evidence artifact for a trip event.
pub fn write_trip_evidence(
    dir: &Path,
    trip: &ConsecutiveLossTrip,
    ts_ms: TsMs,
) -> Result<std::path::PathBuf, ArtifactError> {
    let value = json!({
        "artifact_version": ARTIFACT_VERSION,
        "ts_ms": ts_ms,
        "symbol": trip.symbol,
        "count": trip.count,
        "threshold": trip.threshold,
        "action": "PAUSE",
    });
    let text = canonical_pretty(&value);
    let path = dir.join(format!("consecutive_loss_trip_{ts_ms}.json"));
    fs::create_dir_all(dir)?;
    atomic_write(&path, text.as_bytes())?;
    let digest = crate::core::digest::sha256_hex(text.as_bytes());
    atomic_write(
        &dir.join(format!("consecutive_loss_trip_{ts_ms}.sha256")),
        format!("{digest}\n").as_bytes(),
    )?;
    Ok(path)
}

/// Wiring layer: routes live fills through the tracker and guard,
/// persists state, writes evidence, and raises the operator override.
pub struct ConsecutiveLossService {
    config: ConsecutiveLossConfig,
    guard: ConsecutiveLossGuard,
    tracker: RoundtripTracker,
    override_signal: OperatorOverrideSignal,
    evidence_dir: std::path::PathBuf,
    state_path: Option<std::path::PathBuf>,
    last_trade_id: i64,
}

impl ConsecutiveLossService {
    pub fn new(
        config: ConsecutiveLossConfig,
        override_signal: OperatorOverrideSignal,
        evidence_dir: impl Into<std::path::PathBuf>,
        state_path: Option<std::path::PathBuf>,
    ) -> Self {
        let mut guard = ConsecutiveLossGuard::new(config.clone());
        let mut tracker = RoundtripTracker::new("live");
        let mut last_trade_id = 0;

        if let Some(path) = &state_path {
            match load_state(path) {
                Ok(Some(state)) => {
                    guard = ConsecutiveLossGuard::from_streaks(config.clone(), state.streaks);
                    if let Some(tracker_state) = state.tracker {
                        tracker = RoundtripTracker::from_state(tracker_state, "live");
                    }
                    last_trade_id = state.last_trade_id;
                    info!(last_trade_id, "restored consecutive-loss state");
                }
                Ok(None) => {}
                Err(err) => warn!(%err, "failed to load consecutive-loss state"),
            }
        }

        Self {
            config,
            guard,
            tracker,
            override_signal,
            evidence_dir: evidence_dir.into(),
            state_path,
            last_trade_id,
        }
    }

    pub fn guard(&self) -> &ConsecutiveLossGuard {
        &self.guard
    }

    pub fn last_trade_id(&self) -> i64 {
        self.last_trade_id
    }

    /// Process one user trade. Duplicate or out-of-order trade ids are
    /// skipped. Returns completed roundtrips.
    pub fn on_trade(&mut self, trade_id: i64, fill: &Fill, fee: Decimal) -> Vec<FillOutcomeRow> {
        if !self.config.enabled {
            return Vec::new();
        }
        if trade_id <= self.last_trade_id {
            return Vec::new();
        }
        self.last_trade_id = trade_id;

        let rows = self.tracker.record_fill(fill, fee);
        for row in &rows {
            if let Some(trip) = self.guard.record_outcome(&row.symbol, row.outcome) {
                warn!(
                    symbol = %trip.symbol,
                    count = trip.count,
                    threshold = trip.threshold,
                    "CONSECUTIVE_LOSS_TRIP: setting operator override to PAUSE"
                );
                if self.config.evidence_enabled {
                    if let Err(err) = write_trip_evidence(&self.evidence_dir, &trip, fill.ts) {
                        warn!(%err, "failed to write consecutive loss evidence");
                    }
                }
                self.override_signal.set(OperatorOverride::Pause);
            }
        }

        if let Err(err) = self.persist() {
            warn!(%err, "failed to persist consecutive-loss state");
        }
        rows
    }

    fn persist(&self) -> Result<(), ArtifactError> {
        let Some(path) = &self.state_path else {
            return Ok(());
        };
        let state = PersistedGuardState::v2(
            self.guard.streaks().clone(),
            self.last_trade_id,
            self.tracker.state().clone(),
        );
        save_state(path, &state)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::Side;
    use rust_decimal_macros::dec;

    fn enabled_config(threshold: u32) -> ConsecutiveLossConfig {
        ConsecutiveLossConfig {
            enabled: true,
            threshold,
            reset_on_breakeven: true,
            evidence_enabled: false,
        }
    }

    #[test]
    fn test_streak_trips_at_threshold() {
        let mut guard = ConsecutiveLossGuard::new(enabled_config(3));
        assert!(guard.record_outcome("BTCUSDT", TradeOutcome::Loss).is_none());
        assert!(guard.record_outcome("BTCUSDT", TradeOutcome::Loss).is_none());
        let trip = guard.record_outcome("BTCUSDT", TradeOutcome::Loss).unwrap();
        assert_eq!(trip.count, 3);
        assert_eq!(trip.threshold, 3);
    }

    #[test]
    fn test_win_resets_streak() {
        let mut guard = ConsecutiveLossGuard::new(enabled_config(2));
        guard.record_outcome("BTCUSDT", TradeOutcome::Loss);
        guard.record_outcome("BTCUSDT", TradeOutcome::Win);
        assert!(guard.record_outcome("BTCUSDT", TradeOutcome::Loss).is_none());
        assert_eq!(guard.streak("BTCUSDT"), 1);
    }

    #[test]
    fn test_breakeven_reset_configurable() {
        let mut config = enabled_config(2);
        config.reset_on_breakeven = false;
        let mut guard = ConsecutiveLossGuard::new(config);
        guard.record_outcome("BTCUSDT", TradeOutcome::Loss);
        guard.record_outcome("BTCUSDT", TradeOutcome::Breakeven);
        assert_eq!(guard.streak("BTCUSDT"), 1);

        let mut guard = ConsecutiveLossGuard::new(enabled_config(2));
        guard.record_outcome("BTCUSDT", TradeOutcome::Loss);
        guard.record_outcome("BTCUSDT", TradeOutcome::Breakeven);
        assert_eq!(guard.streak("BTCUSDT"), 0);
    }

    #[test]
    fn test_streaks_per_symbol() {
        let mut guard = ConsecutiveLossGuard::new(enabled_config(2));
        guard.record_outcome("BTCUSDT", TradeOutcome::Loss);
        guard.record_outcome("ETHUSDT", TradeOutcome::Loss);
        assert_eq!(guard.streak("BTCUSDT"), 1);
        assert_eq!(guard.streak("ETHUSDT"), 1);
    }

    #[test]
    fn test_disabled_guard_never_trips() {
        let mut guard = ConsecutiveLossGuard::new(ConsecutiveLossConfig::default());
        for _ in 0..10 {
            assert!(guard.record_outcome("BTCUSDT", TradeOutcome::Loss).is_none());
        }
    }

    #[test]
    fn test_state_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let mut streaks = BTreeMap::new();
        streaks.insert("BTCUSDT".to_string(), 2u32);
        let state = PersistedGuardState::v2(streaks, 42, RoundtripTrackerState::default());

        assert!(save_state(&path, &state).unwrap());
        let loaded = load_state(&path).unwrap().unwrap();
        assert_eq!(loaded, state);
        assert!(sidecar_path(&path).exists());
    }

    #[test]
    fn test_monotonic_guard() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let state =
            PersistedGuardState::v2(BTreeMap::new(), 10, RoundtripTrackerState::default());
        save_state(&path, &state).unwrap();

        // Equal id: idempotent, no write.
        assert!(!save_state(&path, &state).unwrap());

        // Older id: refused.
        let older =
            PersistedGuardState::v2(BTreeMap::new(), 5, RoundtripTrackerState::default());
        assert!(save_state(&path, &older).is_err());

        // Newer id: written.
        let newer =
            PersistedGuardState::v2(BTreeMap::new(), 11, RoundtripTrackerState::default());
        assert!(save_state(&path, &newer).unwrap());
    }

    #[test]
    fn test_v1_state_loads_without_tracker() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let v1 = json!({
            "version": STATE_FILE_VERSION_V1,
            "streaks": {"BTCUSDT": 3},
            "last_trade_id": 7,
        });
        fs::write(&path, canonical_pretty(&v1)).unwrap();

        let loaded = load_state(&path).unwrap().unwrap();
        assert_eq!(loaded.version, STATE_FILE_VERSION_V1);
        assert_eq!(loaded.streaks["BTCUSDT"], 3);
        assert!(loaded.tracker.is_none());
    }

    #[test]
    fn test_tampered_state_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let state =
            PersistedGuardState::v2(BTreeMap::new(), 1, RoundtripTrackerState::default());
        save_state(&path, &state).unwrap();

        fs::write(&path, "{\"version\":\"consecutive_loss_state_v2\"}").unwrap();
        assert!(load_state(&path).is_err());
    }

    fn fill(ts: TsMs, side: Side, price: Decimal) -> Fill {
        Fill {
            ts,
            symbol: "BTCUSDT".into(),
            side,
            price,
            quantity: dec!(0.1),
            order_id: format!("o{ts}"),
        }
    }

    #[test]
    fn test_service_trip_sets_pause_and_writes_evidence() {
        let dir = tempfile::tempdir().unwrap();
        let signal = OperatorOverrideSignal::new();
        let mut config = enabled_config(1);
        config.evidence_enabled = true;
        let mut service = ConsecutiveLossService::new(
            config,
            signal.clone(),
            dir.path().to_path_buf(),
            None,
        );

        // One losing roundtrip.
        service.on_trade(1, &fill(1_000, Side::Buy, dec!(50000)), dec!(0));
        let rows = service.on_trade(2, &fill(2_000, Side::Sell, dec!(49000)), dec!(0));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].outcome, TradeOutcome::Loss);

        assert_eq!(signal.get(), Some(OperatorOverride::Pause));
        let evidence = dir.path().join("consecutive_loss_trip_2000.json");
        assert!(evidence.exists());
        assert!(dir.path().join("consecutive_loss_trip_2000.sha256").exists());
    }

    #[test]
    fn test_service_dedups_trade_ids() {
        let signal = OperatorOverrideSignal::new();
        let mut service = ConsecutiveLossService::new(
            enabled_config(5),
            signal,
            std::env::temp_dir(),
            None,
        );
        service.on_trade(1, &fill(1_000, Side::Buy, dec!(50000)), dec!(0));
        // Replayed trade id is ignored.
        let rows = service.on_trade(1, &fill(1_000, Side::Buy, dec!(50000)), dec!(0));
        assert!(rows.is_empty());
        assert_eq!(service.last_trade_id(), 1);
    }

    #[test]
    fn test_service_persists_and_restores() {
        let dir = tempfile::tempdir().unwrap();
        let state_path = dir.path().join("state.json");
        let signal = OperatorOverrideSignal::new();

        let mut service = ConsecutiveLossService::new(
            enabled_config(5),
            signal.clone(),
            dir.path().to_path_buf(),
            Some(state_path.clone()),
        );
        service.on_trade(1, &fill(1_000, Side::Buy, dec!(50000)), dec!(0));
        service.on_trade(2, &fill(2_000, Side::Sell, dec!(49000)), dec!(0));
        assert_eq!(service.guard().streak("BTCUSDT"), 1);

        // Restart: streaks and trade id come back.
        let restored = ConsecutiveLossService::new(
            enabled_config(5),
            signal,
            dir.path().to_path_buf(),
            Some(state_path),
        );
        assert_eq!(restored.guard().streak("BTCUSDT"), 1);
        assert_eq!(restored.last_trade_id(), 2);
    }
}
