//! Grinder Core - Grid Market-Making Engine
//!
//! Deterministic execution pipeline for cryptocurrency futures/spot
//! grid trading: normalized snapshots flow through prefilter, gating,
//! grid policy and the execution reconciler into either the paper fill
//! simulator or the safety-gated live path.
//!
//! ## Architecture
//! - **Exact money math** - every price, quantity, fee and PnL is a
//!   decimal; binary floats never reach digests or artifacts
//! - **Deterministic replay** - paper runs over a fixture emit a 16-hex
//!   digest used as a regression oracle
//! - **Injectable edges** - clocks, transports, exchange ports and
//!   sleeps are capabilities, so every path tests without I/O
//! - **Safety stacked in layers** - arm/mode/kill-switch/whitelist,
//!   drawdown and consecutive-loss guards, per-operation circuit
//!   breaker, idempotent writes, gated remediation
//!
//! ## Core Modules
//! - `core`: time, ids, digests, error taxonomy
//! - `data`: snapshots, depth, fixture replay
//! - `features`: bar features, prefilter, Top-K selection
//! - `gating`: toxicity / rate / risk gates
//! - `policy`: grid plans and the static grid policy
//! - `execution`: exchange filters and the plan reconciler
//! - `paper`: fill simulation, cycle intents, ledger, roundtrips
//! - `port`: exchange port with retry, breaker and idempotency
//! - `router`: smart order router
//! - `live`: the gated live engine and operational FSM
//! - `risk`: drawdown, consecutive-loss, allocator, auto-sizer
//! - `reconcile`: expected/observed stores, classification, remediation
//! - `ml`: fill-probability model, dataset, evaluation, online gate
//! - `transport`: WS/HTTP contracts and the fake transport
//! - `monitoring`: metric registry with a guarded label taxonomy
//! - `config`: typed configuration and the environment layer

pub mod artifact;
pub mod config;
pub mod core;
pub mod data;
pub mod execution;
pub mod features;
pub mod gating;
pub mod live;
pub mod ml;
pub mod monitoring;
pub mod paper;
pub mod policy;
pub mod port;
pub mod reconcile;
pub mod risk;
pub mod router;
pub mod transport;

pub use crate::core::{Clock, ExchangeError, FakeClock, SystemClock, TsMs};
pub use data::Snapshot;
pub use execution::{ExecutionAction, ExecutionState, Fill, OrderRecord, Side};
pub use paper::{PaperEngine, PaperEngineConfig, PaperResult};
pub use policy::{GridPlan, GridPolicy, StaticGridPolicy};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::config::{EnvOverrides, GrinderConfig};
    pub use crate::core::{Clock, ExchangeError, FakeClock, SystemClock, TsMs};
    pub use crate::data::Snapshot;
    pub use crate::execution::{ExecutionAction, ExecutionState, Fill, Side};
    pub use crate::live::{EngineMode, KillSwitch, LiveEngineConfig, LiveEngineV0};
    pub use crate::paper::{PaperEngine, PaperEngineConfig, PaperResult};
    pub use crate::policy::{GridPlan, GridPolicy, PolicyContext, StaticGridPolicy};
    pub use crate::port::{CircuitBreaker, ExchangePort, IdempotentExchangePort, RetryPolicy};
}
