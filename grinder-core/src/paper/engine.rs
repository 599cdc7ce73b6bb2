//! Paper trading engine
//!
//! Wires prefilter -> gating -> policy -> execution -> simulated fills ->
//! ledger over a fixture replay, and emits a deterministic digest over the
//! canonical JSON of all outputs. The digest is the regression oracle: the
//! same fixture and configuration must always produce the same 16 hex
//! chars.
//!
//! Output schema v1: adding fields is allowed, removing or renaming is
//! breaking. Top-K fields live on the result but stay out of the digest
//! input.

use crate::core::digest::{dec_value, short_digest};
use crate::core::ids::{OrderIdGenerator, OrderIdPolicy};
use crate::core::time::TsMs;
use crate::data::{event_symbol, load_fixture, parse_snapshot, Snapshot};
use crate::execution::{
    ExchangeFilters, ExecutionAction, ExecutionEngine, ExecutionEngineConfig, ExecutionState,
};
use crate::features::{
    hard_filter, FeatureEngine, PrefilterConfig, PrefilterInput, TopKConfig, TopKSelector,
};
use crate::gating::{
    GatingResult, GatingStack, RateLimiter, RateLimiterConfig, RiskGate, RiskGateConfig,
    ToxicityGate, ToxicityGateConfig,
};
use crate::paper::fills::{simulate_fills, FillModelConfig};
use crate::paper::ledger::Ledger;
use crate::paper::roundtrip::{FillOutcomeRow, RoundtripTracker};
use crate::policy::{GridPolicy, PolicyContext, StaticGridPolicy};
use crate::policy::static_grid::StaticGridConfig;
use rust_decimal::Decimal;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// Output schema version for contract stability.
pub const SCHEMA_VERSION: &str = "v1";

#[derive(Debug, Clone)]
pub struct PaperEngineConfig {
    pub grid: StaticGridConfig,
    pub price_precision: u32,
    pub quantity_precision: u32,
    pub rate: RateLimiterConfig,
    pub risk: RiskGateConfig,
    pub toxicity: ToxicityGateConfig,
    pub prefilter: PrefilterConfig,
    pub topk: TopKConfig,
    pub topk_window_size: usize,
    pub fill_after_ticks: u64,
}

impl Default for PaperEngineConfig {
    fn default() -> Self {
        Self {
            grid: StaticGridConfig::default(),
            price_precision: 2,
            quantity_precision: 3,
            rate: RateLimiterConfig::default(),
            risk: RiskGateConfig::default(),
            toxicity: ToxicityGateConfig::default(),
            prefilter: PrefilterConfig::default(),
            // Replay selection warms up from the scan pass, so the live
            // warmup gate is off by default here.
            topk: TopKConfig {
                warmup_min: 0,
                ..TopKConfig::default()
            },
            topk_window_size: 10,
            fill_after_ticks: 0,
        }
    }
}

/// Single paper trading cycle output.
#[derive(Debug, Clone)]
pub struct PaperOutput {
    pub ts: TsMs,
    pub symbol: String,
    pub prefilter_result: Value,
    pub gating_result: Value,
    pub plan: Option<Value>,
    pub actions: Vec<Value>,
    pub events: Vec<Value>,
    pub blocked_by_gating: bool,
    pub fills: Vec<Value>,
    pub pnl_snapshot: Option<Value>,
}

impl PaperOutput {
    pub fn to_value(&self) -> Value {
        json!({
            "ts": self.ts,
            "symbol": self.symbol,
            "prefilter_result": self.prefilter_result,
            "gating_result": self.gating_result,
            "plan": self.plan,
            "actions": self.actions,
            "events": self.events,
            "blocked_by_gating": self.blocked_by_gating,
            "fills": self.fills,
            "pnl_snapshot": self.pnl_snapshot,
        })
    }
}

/// Complete paper trading run result.
#[derive(Debug, Clone, Default)]
pub struct PaperResult {
    pub schema_version: String,
    pub fixture_path: String,
    pub outputs: Vec<PaperOutput>,
    pub digest: String,
    pub events_processed: usize,
    pub events_gated: usize,
    pub orders_placed: usize,
    pub orders_blocked: usize,
    pub total_fills: usize,
    pub final_positions: Map<String, Value>,
    pub total_realized_pnl: String,
    pub total_unrealized_pnl: String,
    pub errors: Vec<String>,
    // Top-K results are reported but excluded from digest input.
    pub topk_selected_symbols: Vec<String>,
    pub topk_k: usize,
    pub topk_scores: Vec<Value>,
}

impl PaperResult {
    pub fn to_value(&self) -> Value {
        json!({
            "schema_version": self.schema_version,
            "fixture_path": self.fixture_path,
            "outputs": self.outputs.iter().map(PaperOutput::to_value).collect::<Vec<_>>(),
            "digest": self.digest,
            "events_processed": self.events_processed,
            "events_gated": self.events_gated,
            "orders_placed": self.orders_placed,
            "orders_blocked": self.orders_blocked,
            "total_fills": self.total_fills,
            "final_positions": Value::Object(self.final_positions.clone()),
            "total_realized_pnl": self.total_realized_pnl,
            "total_unrealized_pnl": self.total_unrealized_pnl,
            "errors": self.errors,
            "topk_selected_symbols": self.topk_selected_symbols,
            "topk_k": self.topk_k,
            "topk_scores": self.topk_scores,
        })
    }
}

pub struct PaperEngine {
    config: PaperEngineConfig,
    policy: Box<dyn GridPolicy + Send>,
    engine: ExecutionEngine,
    gating: GatingStack,
    topk_selector: TopKSelector,
    features: FeatureEngine,
    states: HashMap<String, ExecutionState>,
    ledger: Ledger,
    roundtrips: RoundtripTracker,
    completed_roundtrips: Vec<FillOutcomeRow>,
    last_prices: HashMap<String, Decimal>,
    orders_placed: usize,
    orders_blocked: usize,
    total_fills: usize,
}

impl PaperEngine {
    pub fn new(config: PaperEngineConfig) -> Self {
        let policy = Box::new(StaticGridPolicy::new(config.grid.clone()));
        Self::with_policy(config, policy)
    }

    pub fn with_policy(config: PaperEngineConfig, policy: Box<dyn GridPolicy + Send>) -> Self {
        let id_policy =
            OrderIdPolicy::default_with_strategies([policy.name().to_string()]);
        let id_gen = OrderIdGenerator::new(id_policy, policy.name().to_string())
            .expect("policy name is a valid strategy token");
        let engine = ExecutionEngine::new(
            ExecutionEngineConfig {
                filters: ExchangeFilters::from_precisions(
                    config.price_precision,
                    config.quantity_precision,
                ),
                ..Default::default()
            },
            id_gen,
        );
        let gating = GatingStack::new(
            ToxicityGate::new(config.toxicity.clone()),
            RateLimiter::new(config.rate.clone()),
            RiskGate::new(config.risk.clone()),
        );
        let topk_selector = TopKSelector::new(config.topk.clone(), config.topk_window_size);

        Self {
            config,
            policy,
            engine,
            gating,
            topk_selector,
            features: FeatureEngine::with_defaults(),
            states: HashMap::new(),
            ledger: Ledger::new(),
            roundtrips: RoundtripTracker::new("paper"),
            completed_roundtrips: Vec::new(),
            last_prices: HashMap::new(),
            orders_placed: 0,
            orders_blocked: 0,
            total_fills: 0,
        }
    }

    /// Completed roundtrips observed so far (dataset builder input).
    pub fn completed_roundtrips(&self) -> &[FillOutcomeRow] {
        &self.completed_roundtrips
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Process a single snapshot through the full pipeline.
    pub fn process_snapshot(&mut self, snapshot: &Snapshot) -> PaperOutput {
        self.process_snapshot_actions(snapshot).0
    }

    /// As `process_snapshot`, but also hands back the typed actions for
    /// callers (the live engine) that route them further.
    pub fn process_snapshot_actions(
        &mut self,
        snapshot: &Snapshot,
    ) -> (PaperOutput, Vec<ExecutionAction>) {
        let symbol = snapshot.symbol.clone();
        let ts = snapshot.ts;
        let mid = snapshot.mid_price();

        self.last_prices.insert(symbol.clone(), mid);
        let feature_snap = self.features.on_snapshot(snapshot);

        // Step 1: prefilter. Paper runs assume ample venue volume; the
        // spread is the live input.
        let filter_result = hard_filter(
            &symbol,
            &PrefilterInput {
                spread_bps: snapshot.spread_bps(),
                vol_24h_usd: Decimal::from(100_000_000),
                vol_1h_usd: Decimal::from(10_000_000),
            },
            &self.config.prefilter,
        );

        // Mark-to-market even when blocked.
        let pnl_snap = self.ledger.pnl_snapshot(ts, &symbol, mid);

        if !filter_result.allowed {
            return (
                PaperOutput {
                    ts,
                    symbol,
                    prefilter_result: filter_result.to_value(),
                    gating_result: GatingResult::allow_empty().to_value(),
                    plan: None,
                    actions: Vec::new(),
                    events: Vec::new(),
                    blocked_by_gating: false,
                    fills: Vec::new(),
                    pnl_snapshot: Some(pnl_snap.to_value()),
                },
                Vec::new(),
            );
        }

        // Step 2: policy evaluation.
        let ctx = PolicyContext {
            mid_price: mid,
            spread_bps: feature_snap.spread_bps,
            natr_bps: feature_snap.natr_bps,
            range_score: feature_snap.range_score,
            net_return_bps: feature_snap.net_return_bps,
            is_warmed_up: feature_snap.is_warmed_up,
        };
        let plan = self.policy.evaluate(&ctx);

        // Step 3: gating. Record the price for impact tracking first.
        self.gating.toxicity.record_price(ts, &symbol, mid);
        let estimated_notional = plan
            .size_schedule
            .first()
            .copied()
            .unwrap_or(Decimal::ONE)
            * mid;
        let gating_result =
            self.gating
                .check(ts, &symbol, estimated_notional, snapshot.spread_bps(), mid);

        if !gating_result.allowed {
            self.orders_blocked += 1;
            return (
                PaperOutput {
                    ts,
                    symbol,
                    prefilter_result: filter_result.to_value(),
                    gating_result: gating_result.to_value(),
                    plan: Some(plan.to_value()),
                    actions: Vec::new(),
                    events: Vec::new(),
                    blocked_by_gating: true,
                    fills: Vec::new(),
                    pnl_snapshot: Some(pnl_snap.to_value()),
                },
                Vec::new(),
            );
        }

        // Step 4: advance the snapshot tick and settle pending fills
        // against the incoming mid before re-quoting. Orders from earlier
        // ticks fill here when the price has crossed them.
        let mut state = self.states.entry(symbol.clone()).or_default().clone();
        state.tick_counter += 1;
        let fills = simulate_fills(
            ts,
            &mut state,
            mid,
            &FillModelConfig {
                fill_after_ticks: self.config.fill_after_ticks,
            },
        );

        for fill in &fills {
            let released = self.ledger.apply_fill(fill);
            if !released.is_zero() {
                self.gating.risk_gate.record_realized_pnl(released);
            }
            self.gating.risk_gate.release_order(&symbol, fill.notional());
            self.completed_roundtrips
                .extend(self.roundtrips.record_fill(fill, Decimal::ZERO));
        }
        self.total_fills += fills.len();

        // Step 5: execution reconciles the plan against what is left.
        let result = self.engine.evaluate(&plan, &symbol, &state, ts);

        for action in &result.actions {
            if let ExecutionAction::Place {
                price, quantity, ..
            } = action
            {
                self.gating.rate_limiter.record_order(ts);
                self.gating.risk_gate.record_order(&symbol, *price * *quantity);
                self.orders_placed += 1;
            }
        }

        self.states.insert(symbol.clone(), result.state);

        let pnl_snap = self.ledger.pnl_snapshot(ts, &symbol, mid);

        let output = PaperOutput {
            ts,
            symbol,
            prefilter_result: filter_result.to_value(),
            gating_result: gating_result.to_value(),
            plan: Some(plan.to_value()),
            actions: result.actions.iter().map(ExecutionAction::to_value).collect(),
            events: result.events.iter().map(|e| e.to_value()).collect(),
            blocked_by_gating: false,
            fills: fills.iter().map(|f| f.to_value()).collect(),
            pnl_snapshot: Some(pnl_snap.to_value()),
        };
        (output, result.actions)
    }

    /// Run the paper loop over a fixture directory.
    ///
    /// Two passes: a scan pass feeds the Top-K selector, then only
    /// snapshots of selected symbols are processed.
    pub fn run(&mut self, fixture_path: &Path) -> PaperResult {
        let mut result = PaperResult {
            schema_version: SCHEMA_VERSION.to_string(),
            fixture_path: fixture_path.display().to_string(),
            total_realized_pnl: "0".to_string(),
            total_unrealized_pnl: "0".to_string(),
            ..Default::default()
        };

        let events = match load_fixture(fixture_path) {
            Ok(events) => events,
            Err(err) => {
                result.errors.push(err.to_string());
                result.digest = compute_digest(&[]);
                return result;
            }
        };
        result.events_processed = events.len();

        if events.is_empty() {
            result.errors.push("No events found in fixture".to_string());
            result.digest = compute_digest(&[]);
            return result;
        }

        // Scan pass: populate the selector.
        self.topk_selector.reset();
        for event in &events {
            if let Some(snapshot) = parse_snapshot(event) {
                self.topk_selector.record(
                    &snapshot.symbol,
                    snapshot.mid_price(),
                    snapshot.spread_bps(),
                    snapshot.bid_qty.min(snapshot.ask_qty),
                );
            }
        }
        let topk = self.topk_selector.select();
        info!(
            k = topk.k,
            selected = ?topk.selected,
            "top-k selection complete"
        );
        result.topk_selected_symbols = topk.selected.clone();
        result.topk_k = topk.k;
        result.topk_scores = topk.scores.iter().map(|s| s.to_value()).collect();

        // Process pass, restricted to selected symbols.
        let mut outputs = Vec::new();
        for event in &events {
            let Some(snapshot) = parse_snapshot(event) else {
                continue;
            };
            if !topk.selected.iter().any(|s| s.as_str() == event_symbol(event)) {
                continue;
            }
            if let Err(err) = snapshot.validate() {
                result
                    .errors
                    .push(format!("Invalid snapshot at ts={}: {err}", snapshot.ts));
                continue;
            }
            let output = self.process_snapshot(&snapshot);
            if output.blocked_by_gating {
                result.events_gated += 1;
            }
            outputs.push(output);
        }

        result.orders_placed = self.orders_placed;
        result.orders_blocked = self.orders_blocked;
        result.total_fills = self.total_fills;

        let mut total_unrealized = Decimal::ZERO;
        for (symbol, position) in self.ledger.all_positions() {
            let last_price = self
                .last_prices
                .get(symbol)
                .copied()
                .unwrap_or(Decimal::ZERO);
            let unrealized = self.ledger.unrealized_pnl(symbol, last_price);
            total_unrealized += unrealized;
            result.final_positions.insert(
                symbol.clone(),
                json!({
                    "quantity": dec_value(&position.quantity),
                    "avg_entry_price": dec_value(&position.avg_entry_price),
                    "realized_pnl": dec_value(&position.realized_pnl),
                    "unrealized_pnl": dec_value(&unrealized),
                }),
            );
        }
        result.total_realized_pnl = self.ledger.total_realized_pnl().to_string();
        result.total_unrealized_pnl = total_unrealized.to_string();

        result.digest = compute_digest(&outputs);
        debug!(digest = %result.digest, "paper run complete");
        result.outputs = outputs;
        result
    }

    /// Reset all engine state for a fresh run.
    pub fn reset(&mut self) {
        self.gating.reset();
        self.topk_selector.reset();
        self.features.reset();
        self.ledger.reset();
        self.roundtrips = RoundtripTracker::new("paper");
        self.completed_roundtrips.clear();
        self.states.clear();
        self.last_prices.clear();
        self.orders_placed = 0;
        self.orders_blocked = 0;
        self.total_fills = 0;
    }
}

/// Digest of the outputs array, the regression oracle.
fn compute_digest(outputs: &[PaperOutput]) -> String {
    let values: Vec<Value> = outputs.iter().map(PaperOutput::to_value).collect();
    short_digest(&Value::Array(values))
}
