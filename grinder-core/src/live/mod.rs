//! Live trading: safety-gated execution of paper proposals

pub mod engine;
pub mod fsm;

pub use engine::{
    BlockReason, LiveAction, LiveActionStatus, LiveEngineConfig, LiveEngineOutput, LiveEngineV0,
};
pub use fsm::{
    EngineFsm, EngineMode, FsmState, KillSwitch, OperatorOverride, OperatorOverrideSignal,
};
