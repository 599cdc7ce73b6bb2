//! Gated remediation: cancel unexpected orders, flatten unexpected
//! positions
//!
//! Nine independent gates must all pass before the port is touched:
//! action configured, not dry-run, active remediation allowed, armed,
//! mainnet-trade flag, cooldown elapsed, whitelist, is-ours identity
//! (cancels), notional limit (flattens). Per-run limits cap orders and
//! distinct symbols. Blocked attempts have no side effects.

use crate::core::ids::OrderIdPolicy;
use crate::core::time::{SharedClock, TsMs};
use crate::execution::Side;
use crate::monitoring::MetricsRegistry;
use crate::port::ExchangePort;
use crate::reconcile::data_quality::DataQualityVerdict;
use crate::reconcile::observed::{ObservedOrder, ObservedPosition};
use rust_decimal::Decimal;
use std::collections::BTreeSet;
use tracing::{info, warn};

/// What remediation is allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemediationAction {
    None,
    CancelAll,
    Flatten,
}

impl RemediationAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemediationAction::None => "none",
            RemediationAction::CancelAll => "cancel_all",
            RemediationAction::Flatten => "flatten",
        }
    }
}

/// Block reasons. Values are stable metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemediationBlockReason {
    ActionIsNone,
    DryRun,
    NotAllowed,
    NotArmed,
    EnvVarMissing,
    CooldownNotElapsed,
    WhitelistRequired,
    SymbolNotInWhitelist,
    NoGrinderPrefix,
    NotionalExceedsLimit,
    MaxOrdersReached,
    MaxSymbolsReached,
    DataQualityStale,
    DataQualityGap,
    DataQualityOutlier,
    PortError,
}

impl RemediationBlockReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemediationBlockReason::ActionIsNone => "action_is_none",
            RemediationBlockReason::DryRun => "dry_run",
            RemediationBlockReason::NotAllowed => "allow_active_remediation_false",
            RemediationBlockReason::NotArmed => "not_armed",
            RemediationBlockReason::EnvVarMissing => "env_var_missing",
            RemediationBlockReason::CooldownNotElapsed => "cooldown_not_elapsed",
            RemediationBlockReason::WhitelistRequired => "whitelist_required",
            RemediationBlockReason::SymbolNotInWhitelist => "symbol_not_in_whitelist",
            RemediationBlockReason::NoGrinderPrefix => "no_grinder_prefix",
            RemediationBlockReason::NotionalExceedsLimit => "notional_exceeds_limit",
            RemediationBlockReason::MaxOrdersReached => "max_orders_reached",
            RemediationBlockReason::MaxSymbolsReached => "max_symbols_reached",
            RemediationBlockReason::DataQualityStale => "data_quality_stale",
            RemediationBlockReason::DataQualityGap => "data_quality_gap",
            RemediationBlockReason::DataQualityOutlier => "data_quality_outlier",
            RemediationBlockReason::PortError => "port_error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemediationStatus {
    /// Dry-run: would execute if enabled.
    Planned,
    Executed,
    Blocked,
    Failed,
}

impl RemediationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemediationStatus::Planned => "planned",
            RemediationStatus::Executed => "executed",
            RemediationStatus::Blocked => "blocked",
            RemediationStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemediationResult {
    pub mismatch_type: String,
    pub symbol: String,
    pub client_order_id: Option<String>,
    pub status: RemediationStatus,
    pub block_reason: Option<RemediationBlockReason>,
    pub error: Option<String>,
    pub action: String,
}

#[derive(Debug, Clone)]
pub struct RemediationConfig {
    pub action: RemediationAction,
    pub dry_run: bool,
    pub allow_active_remediation: bool,
    pub cooldown_ms: i64,
    pub require_whitelist: bool,
    pub max_flatten_notional_usdt: Decimal,
    pub max_orders_per_action: usize,
    pub max_symbols_per_action: usize,
    /// Consult the data-quality verdict before acting.
    pub dq_blocking: bool,
}

impl Default for RemediationConfig {
    fn default() -> Self {
        Self {
            action: RemediationAction::None,
            dry_run: true,
            allow_active_remediation: false,
            cooldown_ms: 60_000,
            require_whitelist: true,
            max_flatten_notional_usdt: Decimal::from(1_000),
            max_orders_per_action: 10,
            max_symbols_per_action: 3,
            dq_blocking: false,
        }
    }
}

type DqVerdictFn = Box<dyn Fn() -> Option<DataQualityVerdict> + Send>;

pub struct RemediationExecutor<P: ExchangePort> {
    config: RemediationConfig,
    port: P,
    id_policy: OrderIdPolicy,
    clock: SharedClock,
    pub armed: bool,
    pub symbol_whitelist: BTreeSet<String>,
    /// Resolved from `ALLOW_MAINNET_TRADE` by the config layer.
    pub mainnet_trade_allowed: bool,
    metrics: Option<MetricsRegistry>,
    dq_verdict_fn: Option<DqVerdictFn>,
    last_action_ts: TsMs,
    orders_this_run: usize,
    symbols_this_run: BTreeSet<String>,
}

impl<P: ExchangePort> RemediationExecutor<P> {
    pub fn new(
        config: RemediationConfig,
        port: P,
        id_policy: OrderIdPolicy,
        clock: SharedClock,
    ) -> Self {
        Self {
            config,
            port,
            id_policy,
            clock,
            armed: false,
            symbol_whitelist: BTreeSet::new(),
            mainnet_trade_allowed: false,
            metrics: None,
            dq_verdict_fn: None,
            last_action_ts: 0,
            orders_this_run: 0,
            symbols_this_run: BTreeSet::new(),
        }
    }

    pub fn with_metrics(mut self, metrics: MetricsRegistry) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_dq_verdict_fn(mut self, f: DqVerdictFn) -> Self {
        self.dq_verdict_fn = Some(f);
        self
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    /// Reset the per-run order/symbol counters (call at the start of a
    /// reconcile pass).
    pub fn reset_run_counters(&mut self) {
        self.orders_this_run = 0;
        self.symbols_this_run.clear();
    }

    fn check_cooldown(&self) -> bool {
        self.clock.now_ms() - self.last_action_ts >= self.config.cooldown_ms
    }

    fn dq_block_reason(&self) -> Option<RemediationBlockReason> {
        if !self.config.dq_blocking {
            return None;
        }
        // No verdict source wired: the gate is skipped (safe default).
        let verdict_fn = self.dq_verdict_fn.as_ref()?;
        let verdict = verdict_fn()?;
        if verdict.stale {
            Some(RemediationBlockReason::DataQualityStale)
        } else if verdict.gap_bucket.is_some() {
            Some(RemediationBlockReason::DataQualityGap)
        } else if verdict.outlier_kind.is_some() {
            Some(RemediationBlockReason::DataQualityOutlier)
        } else {
            None
        }
    }

    /// Evaluate all gates without side effects.
    pub fn can_execute(
        &self,
        symbol: &str,
        is_cancel: bool,
        client_order_id: Option<&str>,
        notional_usdt: Option<Decimal>,
    ) -> (bool, Option<RemediationBlockReason>) {
        if self.config.action == RemediationAction::None {
            return (false, Some(RemediationBlockReason::ActionIsNone));
        }
        if self.config.dry_run {
            return (false, Some(RemediationBlockReason::DryRun));
        }
        if !self.config.allow_active_remediation {
            return (false, Some(RemediationBlockReason::NotAllowed));
        }
        if !self.armed {
            return (false, Some(RemediationBlockReason::NotArmed));
        }
        if !self.mainnet_trade_allowed {
            return (false, Some(RemediationBlockReason::EnvVarMissing));
        }
        if !self.check_cooldown() {
            return (false, Some(RemediationBlockReason::CooldownNotElapsed));
        }
        if self.config.require_whitelist && self.symbol_whitelist.is_empty() {
            return (false, Some(RemediationBlockReason::WhitelistRequired));
        }
        if !self.symbol_whitelist.is_empty() && !self.symbol_whitelist.contains(symbol) {
            return (false, Some(RemediationBlockReason::SymbolNotInWhitelist));
        }
        if is_cancel {
            if let Some(id) = client_order_id {
                if !self.id_policy.is_ours(id) {
                    return (false, Some(RemediationBlockReason::NoGrinderPrefix));
                }
            }
        }
        if !is_cancel {
            if let Some(notional) = notional_usdt {
                if notional > self.config.max_flatten_notional_usdt {
                    return (false, Some(RemediationBlockReason::NotionalExceedsLimit));
                }
            }
        }
        if self.orders_this_run >= self.config.max_orders_per_action {
            return (false, Some(RemediationBlockReason::MaxOrdersReached));
        }
        if !self.symbols_this_run.contains(symbol)
            && self.symbols_this_run.len() >= self.config.max_symbols_per_action
        {
            return (false, Some(RemediationBlockReason::MaxSymbolsReached));
        }
        if let Some(reason) = self.dq_block_reason() {
            return (false, Some(reason));
        }
        (true, None)
    }

    /// Cancel an unexpected order carrying our prefix.
    pub fn remediate_cancel(&mut self, observed: &ObservedOrder) -> RemediationResult {
        let (ok, reason) = self.can_execute(
            &observed.symbol,
            true,
            Some(&observed.client_order_id),
            None,
        );
        if !ok {
            return self.blocked_result(
                "ORDER_EXISTS_UNEXPECTED",
                &observed.symbol,
                Some(observed.client_order_id.clone()),
                "cancel_all",
                reason.expect("blocked implies a reason"),
            );
        }

        match self
            .port
            .cancel_order(&observed.symbol, &observed.client_order_id)
        {
            Ok(_) => self.executed_result(
                "ORDER_EXISTS_UNEXPECTED",
                &observed.symbol,
                Some(observed.client_order_id.clone()),
                "cancel_all",
            ),
            Err(err) => self.failed_result(
                "ORDER_EXISTS_UNEXPECTED",
                &observed.symbol,
                Some(observed.client_order_id.clone()),
                "cancel_all",
                err.to_string(),
            ),
        }
    }

    /// Market-flatten an unexpected position.
    pub fn remediate_flatten(
        &mut self,
        observed: &ObservedPosition,
        mark_price: Decimal,
    ) -> RemediationResult {
        let notional = observed.position_amt.abs() * mark_price;
        let (ok, reason) =
            self.can_execute(&observed.symbol, false, None, Some(notional));
        if !ok {
            return self.blocked_result(
                "POSITION_NONZERO_UNEXPECTED",
                &observed.symbol,
                None,
                "flatten",
                reason.expect("blocked implies a reason"),
            );
        }

        let side = if observed.position_amt > Decimal::ZERO {
            Side::Sell
        } else {
            Side::Buy
        };
        match self
            .port
            .flatten_position(&observed.symbol, side, observed.position_amt.abs())
        {
            Ok(_) => self.executed_result(
                "POSITION_NONZERO_UNEXPECTED",
                &observed.symbol,
                None,
                "flatten",
            ),
            Err(err) => self.failed_result(
                "POSITION_NONZERO_UNEXPECTED",
                &observed.symbol,
                None,
                "flatten",
                err.to_string(),
            ),
        }
    }

    fn blocked_result(
        &self,
        mismatch_type: &str,
        symbol: &str,
        client_order_id: Option<String>,
        action: &str,
        reason: RemediationBlockReason,
    ) -> RemediationResult {
        // Dry-run style blocks report as PLANNED: they describe what
        // would have happened.
        let status = if matches!(
            reason,
            RemediationBlockReason::ActionIsNone | RemediationBlockReason::DryRun
        ) {
            info!(
                symbol,
                action,
                reason = reason.as_str(),
                "REMEDIATION_PLANNED"
            );
            RemediationStatus::Planned
        } else {
            warn!(
                symbol,
                action,
                reason = reason.as_str(),
                "REMEDIATION_BLOCKED"
            );
            if let Some(metrics) = &self.metrics {
                metrics
                    .remediation_blocked
                    .with_label_values(&[reason.as_str()])
                    .inc();
            }
            RemediationStatus::Blocked
        };
        RemediationResult {
            mismatch_type: mismatch_type.to_string(),
            symbol: symbol.to_string(),
            client_order_id,
            status,
            block_reason: Some(reason),
            error: None,
            action: action.to_string(),
        }
    }

    fn executed_result(
        &mut self,
        mismatch_type: &str,
        symbol: &str,
        client_order_id: Option<String>,
        action: &str,
    ) -> RemediationResult {
        self.last_action_ts = self.clock.now_ms();
        self.orders_this_run += 1;
        self.symbols_this_run.insert(symbol.to_string());
        info!(symbol, action, "REMEDIATION_EXECUTED");
        if let Some(metrics) = &self.metrics {
            metrics
                .remediation_attempts
                .with_label_values(&[action, RemediationStatus::Executed.as_str()])
                .inc();
        }
        RemediationResult {
            mismatch_type: mismatch_type.to_string(),
            symbol: symbol.to_string(),
            client_order_id,
            status: RemediationStatus::Executed,
            block_reason: None,
            error: None,
            action: action.to_string(),
        }
    }

    fn failed_result(
        &self,
        mismatch_type: &str,
        symbol: &str,
        client_order_id: Option<String>,
        action: &str,
        error: String,
    ) -> RemediationResult {
        warn!(symbol, action, error = %error, "REMEDIATION_FAILED");
        if let Some(metrics) = &self.metrics {
            metrics
                .remediation_attempts
                .with_label_values(&[action, RemediationStatus::Failed.as_str()])
                .inc();
            metrics
                .remediation_blocked
                .with_label_values(&[RemediationBlockReason::PortError.as_str()])
                .inc();
        }
        RemediationResult {
            mismatch_type: mismatch_type.to_string(),
            symbol: symbol.to_string(),
            client_order_id,
            status: RemediationStatus::Failed,
            block_reason: Some(RemediationBlockReason::PortError),
            error: Some(error),
            action: action.to_string(),
        }
    }
}
