//! Live engine v0
//!
//! Runs the paper engine to get proposed actions, then walks every
//! action through the safety gates in a fixed order (armed, mode, kill
//! switch, whitelist, drawdown, FSM, router, fill-probability) before
//! executing through the idempotent port. Every error becomes a
//! `LiveAction` status; nothing propagates to the snapshot loop.

use crate::core::errors::ExchangeError;
use crate::core::time::TsMs;
use crate::data::Snapshot;
use crate::execution::ExecutionAction;
use crate::live::fsm::{EngineFsm, EngineMode, KillSwitch};
use crate::ml::gate::{extract_online_features, FillProbGate, GateVerdict};
use crate::monitoring::MetricsRegistry;
use crate::paper::{PaperEngine, PaperOutput};
use crate::port::{
    ExchangePort, IdempotentExchangePort, PlaceOrderRequest, ReplaceOrderRequest,
};
use crate::reconcile::expected::{ExpectedOrder, ExpectedStateStore};
use crate::risk::drawdown::{classify_intent, DrawdownGuardV1};
use crate::router::{MarketView, OrderIntent, RouterDecision, SmartOrderRouter};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Why an action was blocked at engine level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    NotArmed,
    ModeNotLiveTrade,
    KillSwitchActive,
    SymbolNotWhitelisted,
    DrawdownBlocked,
    FsmStateBlocked,
    RouterBlocked,
    FillProbBlocked,
    NonRetryableError,
    CircuitBreakerOpen,
    MaxRetriesExceeded,
}

impl BlockReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockReason::NotArmed => "NOT_ARMED",
            BlockReason::ModeNotLiveTrade => "MODE_NOT_LIVE_TRADE",
            BlockReason::KillSwitchActive => "KILL_SWITCH_ACTIVE",
            BlockReason::SymbolNotWhitelisted => "SYMBOL_NOT_WHITELISTED",
            BlockReason::DrawdownBlocked => "DRAWDOWN_BLOCKED",
            BlockReason::FsmStateBlocked => "FSM_STATE_BLOCKED",
            BlockReason::RouterBlocked => "ROUTER_BLOCKED",
            BlockReason::FillProbBlocked => "FILL_PROB_BLOCKED",
            BlockReason::NonRetryableError => "NON_RETRYABLE_ERROR",
            BlockReason::CircuitBreakerOpen => "CIRCUIT_BREAKER_OPEN",
            BlockReason::MaxRetriesExceeded => "MAX_RETRIES_EXCEEDED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveActionStatus {
    Executed,
    Blocked,
    Skipped,
    Failed,
}

impl LiveActionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LiveActionStatus::Executed => "EXECUTED",
            LiveActionStatus::Blocked => "BLOCKED",
            LiveActionStatus::Skipped => "SKIPPED",
            LiveActionStatus::Failed => "FAILED",
        }
    }
}

/// Outcome of routing one proposed action through the gates.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveAction {
    pub action_type: String,
    pub status: LiveActionStatus,
    pub block_reason: Option<BlockReason>,
    pub order_id: Option<String>,
    pub error: Option<String>,
}

impl LiveAction {
    fn blocked(action: &ExecutionAction, reason: BlockReason) -> Self {
        Self {
            action_type: action.action_type().to_string(),
            status: LiveActionStatus::Blocked,
            block_reason: Some(reason),
            order_id: None,
            error: None,
        }
    }

    fn skipped(action: &ExecutionAction) -> Self {
        Self {
            action_type: action.action_type().to_string(),
            status: LiveActionStatus::Skipped,
            block_reason: None,
            order_id: None,
            error: None,
        }
    }

    pub fn to_value(&self) -> Value {
        json!({
            "action_type": self.action_type,
            "status": self.status.as_str(),
            "block_reason": self.block_reason.map(|r| r.as_str()),
            "order_id": self.order_id,
            "error": self.error,
        })
    }
}

#[derive(Debug, Clone)]
pub struct LiveEngineOutput {
    pub ts: TsMs,
    pub symbol: String,
    pub paper_output: PaperOutput,
    pub live_actions: Vec<LiveAction>,
}

#[derive(Debug, Clone)]
pub struct LiveEngineConfig {
    /// Default false: no writes until explicitly armed.
    pub armed: bool,
    pub mode: EngineMode,
    pub symbol_whitelist: BTreeSet<String>,
    pub sor_enabled: bool,
    pub initial_equity: Decimal,
}

impl Default for LiveEngineConfig {
    fn default() -> Self {
        Self {
            armed: false,
            mode: EngineMode::Shadow,
            symbol_whitelist: BTreeSet::new(),
            sor_enabled: false,
            initial_equity: Decimal::from(10_000),
        }
    }
}

pub struct LiveEngineV0<P: ExchangePort> {
    config: LiveEngineConfig,
    paper: PaperEngine,
    port: IdempotentExchangePort<P>,
    kill_switch: KillSwitch,
    drawdown: DrawdownGuardV1,
    fsm: EngineFsm,
    router: Option<SmartOrderRouter>,
    fill_gate: Option<FillProbGate>,
    expected: ExpectedStateStore,
    metrics: Option<MetricsRegistry>,
    last_ts_by_symbol: std::collections::HashMap<String, TsMs>,
}

impl<P: ExchangePort> LiveEngineV0<P> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: LiveEngineConfig,
        paper: PaperEngine,
        port: IdempotentExchangePort<P>,
        kill_switch: KillSwitch,
        drawdown: DrawdownGuardV1,
        fsm: EngineFsm,
        router: Option<SmartOrderRouter>,
        fill_gate: Option<FillProbGate>,
    ) -> Self {
        info!(
            armed = config.armed,
            mode = config.mode.as_str(),
            sor = config.sor_enabled,
            "live engine constructed"
        );
        Self {
            config,
            paper,
            port,
            kill_switch,
            drawdown,
            fsm,
            router,
            fill_gate,
            expected: ExpectedStateStore::new(),
            metrics: None,
            last_ts_by_symbol: std::collections::HashMap::new(),
        }
    }

    pub fn with_metrics(mut self, metrics: MetricsRegistry) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &LiveEngineConfig {
        &self.config
    }

    pub fn update_config(&mut self, config: LiveEngineConfig) {
        info!(armed = config.armed, mode = config.mode.as_str(), "live config updated");
        self.config = config;
    }

    pub fn expected(&self) -> &ExpectedStateStore {
        &self.expected
    }

    pub fn port(&self) -> &IdempotentExchangePort<P> {
        &self.port
    }

    /// Process one snapshot: paper pipeline for proposals, gate chain
    /// and execution for each proposed action.
    pub fn process_snapshot(&mut self, snapshot: &Snapshot) -> LiveEngineOutput {
        // Per-symbol timestamp idempotency: replayed or out-of-order
        // snapshots are dropped outright.
        if let Some(&last) = self.last_ts_by_symbol.get(&snapshot.symbol) {
            if snapshot.ts <= last {
                debug!(
                    symbol = %snapshot.symbol,
                    ts = snapshot.ts,
                    last,
                    "stale snapshot dropped"
                );
                return LiveEngineOutput {
                    ts: snapshot.ts,
                    symbol: snapshot.symbol.clone(),
                    paper_output: PaperOutput {
                        ts: snapshot.ts,
                        symbol: snapshot.symbol.clone(),
                        prefilter_result: Value::Null,
                        gating_result: Value::Null,
                        plan: None,
                        actions: Vec::new(),
                        events: Vec::new(),
                        blocked_by_gating: false,
                        fills: Vec::new(),
                        pnl_snapshot: None,
                    },
                    live_actions: Vec::new(),
                };
            }
        }
        self.last_ts_by_symbol
            .insert(snapshot.symbol.clone(), snapshot.ts);

        let (paper_output, actions) = self.paper.process_snapshot_actions(snapshot);

        self.fsm.tick();
        let equity = self.config.initial_equity + self.paper.ledger().total_realized_pnl();
        self.drawdown.update_equity(equity);
        if let Some(router) = &mut self.router {
            router.on_new_tick();
        }

        let market = MarketView {
            best_bid: snapshot.bid_price,
            best_ask: snapshot.ask_price,
        };

        let mut live_actions = Vec::with_capacity(actions.len());
        for action in &actions {
            let live_action = self.process_action(action, snapshot.ts, &market);
            if let Some(metrics) = &self.metrics {
                metrics
                    .live_actions
                    .with_label_values(&[live_action.status.as_str()])
                    .inc();
            }
            live_actions.push(live_action);
        }

        LiveEngineOutput {
            ts: snapshot.ts,
            symbol: snapshot.symbol.clone(),
            paper_output,
            live_actions,
        }
    }

    /// The fixed gate order; first failure short-circuits.
    fn process_action(
        &mut self,
        action: &ExecutionAction,
        ts: TsMs,
        market: &MarketView,
    ) -> LiveAction {
        if let ExecutionAction::Noop { .. } = action {
            return LiveAction::skipped(action);
        }

        // Gate 1: armed.
        if !self.config.armed {
            return LiveAction::blocked(action, BlockReason::NotArmed);
        }

        // Gate 2: mode.
        if self.config.mode != EngineMode::LiveTrade {
            return LiveAction::blocked(action, BlockReason::ModeNotLiveTrade);
        }

        // Gate 3: kill switch blocks risk-adding writes, never cancels.
        let is_cancel = matches!(action, ExecutionAction::Cancel { .. });
        if self.kill_switch.is_active() && !is_cancel {
            return LiveAction::blocked(action, BlockReason::KillSwitchActive);
        }

        // Gate 4: whitelist.
        if let Some(symbol) = action.symbol() {
            if !self.config.symbol_whitelist.is_empty()
                && !self.config.symbol_whitelist.contains(symbol)
            {
                return LiveAction::blocked(action, BlockReason::SymbolNotWhitelisted);
            }
        }

        // Gate 5: drawdown guard on the classified intent.
        let intent = classify_intent(action);
        if !self.drawdown.allows(intent) {
            debug!(intent = intent.as_str(), "action blocked by drawdown guard");
            return LiveAction::blocked(action, BlockReason::DrawdownBlocked);
        }

        // Gate 6: FSM.
        if !self.fsm.allows_writes() {
            return LiveAction::blocked(action, BlockReason::FsmStateBlocked);
        }

        // Gate 7: smart order router, PLACE/REPLACE only.
        if self.config.sor_enabled {
            if let Some(verdict) = self.apply_router(action, market) {
                return verdict;
            }
        }

        // Gate 8: fill-probability gate, PLACE/REPLACE only.
        if let Some(blocked) = self.apply_fill_gate(action, ts) {
            return blocked;
        }

        self.execute(action, ts)
    }

    fn apply_router(
        &mut self,
        action: &ExecutionAction,
        market: &MarketView,
    ) -> Option<LiveAction> {
        let router = self.router.as_mut()?;
        let (intent, existing_id) = match action {
            ExecutionAction::Place {
                symbol,
                side,
                price,
                quantity,
                ..
            } => (
                OrderIntent {
                    symbol: symbol.clone(),
                    side: *side,
                    price: *price,
                    quantity: *quantity,
                },
                None,
            ),
            ExecutionAction::Replace {
                symbol,
                order_id,
                side,
                new_price,
                new_quantity,
                ..
            } => (
                OrderIntent {
                    symbol: symbol.clone(),
                    side: *side,
                    price: *new_price,
                    quantity: *new_quantity,
                },
                Some(order_id.clone()),
            ),
            _ => return None,
        };

        // The router needs the resting order, which the expected store
        // tracks by client order id; the record shape it wants is the
        // execution one, so rebuild the minimal view.
        let existing = existing_id.and_then(|id| {
            self.expected.order(&id).map(|o| crate::execution::OrderRecord {
                order_id: o.client_order_id.clone(),
                symbol: o.symbol.clone(),
                side: o.side,
                price: o.price,
                quantity: o.quantity,
                state: crate::execution::OrderState::Open,
                level_id: 0,
                created_ts: o.ts_created,
                placed_tick: 0,
            })
        });

        let (decision, _reason) = router.decide(&intent, existing.as_ref(), market);
        match decision {
            RouterDecision::Block => {
                Some(LiveAction::blocked(action, BlockReason::RouterBlocked))
            }
            RouterDecision::Noop => Some(LiveAction::skipped(action)),
            RouterDecision::Amend | RouterDecision::CancelReplace => None,
        }
    }

    fn apply_fill_gate(&mut self, action: &ExecutionAction, ts: TsMs) -> Option<LiveAction> {
        let gate = self.fill_gate.as_ref()?;
        let (symbol, side, price, quantity) = match action {
            ExecutionAction::Place {
                symbol,
                side,
                price,
                quantity,
                ..
            } => (symbol, *side, *price, *quantity),
            ExecutionAction::Replace {
                symbol,
                side,
                new_price,
                new_quantity,
                ..
            } => (symbol, *side, *new_price, *new_quantity),
            _ => return None,
        };

        let features =
            extract_online_features(side, price, quantity, gate.bucket_thresholds());
        match gate.check(ts, symbol, &features) {
            Some(decision) if decision.verdict == GateVerdict::Block => {
                Some(LiveAction::blocked(action, BlockReason::FillProbBlocked))
            }
            // ALLOW, SHADOW, or kill-switched gate: continue.
            _ => None,
        }
    }

    fn execute(&mut self, action: &ExecutionAction, ts: TsMs) -> LiveAction {
        let result: Result<String, ExchangeError> = match action {
            ExecutionAction::Place {
                symbol,
                side,
                price,
                quantity,
                order_id,
                ..
            } => {
                let request = PlaceOrderRequest {
                    symbol: symbol.clone(),
                    side: *side,
                    price: *price,
                    quantity: *quantity,
                    client_order_id: order_id.clone(),
                };
                self.port.place_order(&request).map(|ack| {
                    self.expected.record_open(ExpectedOrder {
                        client_order_id: ack.client_order_id.clone(),
                        symbol: symbol.clone(),
                        side: *side,
                        price: *price,
                        quantity: *quantity,
                        ts_created: ts,
                    });
                    ack.client_order_id
                })
            }
            ExecutionAction::Cancel {
                symbol, order_id, ..
            } => self.port.cancel_order(symbol, order_id).map(|ack| {
                self.expected.record_close(&ack.client_order_id);
                ack.client_order_id
            }),
            ExecutionAction::Replace {
                symbol,
                order_id,
                side,
                new_price,
                new_quantity,
                ..
            } => {
                let request = ReplaceOrderRequest {
                    symbol: symbol.clone(),
                    client_order_id: order_id.clone(),
                    side: *side,
                    new_price: *new_price,
                    new_quantity: *new_quantity,
                };
                self.port.replace_order(&request).map(|ack| {
                    self.expected.record_open(ExpectedOrder {
                        client_order_id: ack.client_order_id.clone(),
                        symbol: symbol.clone(),
                        side: *side,
                        price: *new_price,
                        quantity: *new_quantity,
                        ts_created: ts,
                    });
                    ack.client_order_id
                })
            }
            ExecutionAction::Noop { .. } => unreachable!("no-ops are skipped earlier"),
        };

        match result {
            Ok(order_id) => LiveAction {
                action_type: action.action_type().to_string(),
                status: LiveActionStatus::Executed,
                block_reason: None,
                order_id: Some(order_id),
                error: None,
            },
            Err(err) => {
                let block_reason = match &err {
                    ExchangeError::CircuitOpen { .. } => BlockReason::CircuitBreakerOpen,
                    ExchangeError::Transient(_) | ExchangeError::Timeout { .. } => {
                        BlockReason::MaxRetriesExceeded
                    }
                    _ => BlockReason::NonRetryableError,
                };
                LiveAction {
                    action_type: action.action_type().to_string(),
                    status: LiveActionStatus::Failed,
                    block_reason: Some(block_reason),
                    order_id: None,
                    error: Some(err.to_string()),
                }
            }
        }
    }
}
