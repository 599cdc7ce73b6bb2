//! Paper trading: fill simulation, cycle intents, ledger, roundtrips,
//! and the replay engine with its digest oracle

pub mod cycle;
pub mod engine;
pub mod fills;
pub mod ledger;
pub mod roundtrip;

pub use cycle::{CycleEngine, CycleIntent, CycleResult, IntentType};
pub use engine::{PaperEngine, PaperEngineConfig, PaperOutput, PaperResult, SCHEMA_VERSION};
pub use fills::{check_pending_fills, simulate_fills, FillCheckResult, FillModelConfig};
pub use ledger::{Ledger, PnLSnapshot, PositionState};
pub use roundtrip::{
    compute_row_id, FillOutcomeRow, RoundtripTracker, RoundtripTrackerState, TradeDirection,
    TradeOutcome, DATASET_VERSION,
};
