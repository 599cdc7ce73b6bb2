//! Operational FSM, operator override signal, and kill switch
//!
//! The FSM gates live writes: only RUNNING allows them. A process-wide
//! operator override (seeded from `GRINDER_OPERATOR_OVERRIDE` by the
//! config layer, or set by the consecutive-loss wiring on a trip) forces
//! PAUSED or EMERGENCY. The kill switch blocks risk-adding writes while
//! always allowing cancels.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Engine mode. Anything but LIVE_TRADE blocks all writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineMode {
    LiveTrade,
    Shadow,
    Replay,
}

impl EngineMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineMode::LiveTrade => "LIVE_TRADE",
            EngineMode::Shadow => "SHADOW",
            EngineMode::Replay => "REPLAY",
        }
    }
}

/// Operator-requested override of the FSM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorOverride {
    Pause,
    Emergency,
}

impl OperatorOverride {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "PAUSE" => Some(OperatorOverride::Pause),
            "EMERGENCY" => Some(OperatorOverride::Emergency),
            _ => None,
        }
    }
}

/// Process-wide override signal, shared between the config layer, the
/// consecutive-loss wiring, and the FSM.
#[derive(Clone, Default)]
pub struct OperatorOverrideSignal {
    inner: Arc<Mutex<Option<OperatorOverride>>>,
}

impl OperatorOverrideSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, value: OperatorOverride) {
        warn!(override_ = ?value, "operator override set");
        *self.inner.lock() = Some(value);
    }

    pub fn clear(&self) {
        info!("operator override cleared");
        *self.inner.lock() = None;
    }

    pub fn get(&self) -> Option<OperatorOverride> {
        *self.inner.lock()
    }
}

/// FSM states consulted by the live gate chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsmState {
    Idle,
    Running,
    Paused,
    Emergency,
}

impl FsmState {
    pub fn as_str(&self) -> &'static str {
        match self {
            FsmState::Idle => "IDLE",
            FsmState::Running => "RUNNING",
            FsmState::Paused => "PAUSED",
            FsmState::Emergency => "EMERGENCY",
        }
    }
}

/// Minimal operational state machine driven once per snapshot.
pub struct EngineFsm {
    state: FsmState,
    override_signal: OperatorOverrideSignal,
}

impl EngineFsm {
    pub fn new(override_signal: OperatorOverrideSignal) -> Self {
        Self {
            state: FsmState::Idle,
            override_signal,
        }
    }

    /// Advance the FSM one tick: apply any operator override, otherwise
    /// settle into RUNNING.
    pub fn tick(&mut self) -> FsmState {
        let next = match self.override_signal.get() {
            Some(OperatorOverride::Emergency) => FsmState::Emergency,
            Some(OperatorOverride::Pause) => FsmState::Paused,
            None => match self.state {
                // Emergency is sticky until the operator clears it and
                // the engine restarts; pause recovers on its own.
                FsmState::Emergency => FsmState::Emergency,
                _ => FsmState::Running,
            },
        };
        if next != self.state {
            info!(from = self.state.as_str(), to = next.as_str(), "fsm transition");
            self.state = next;
        }
        self.state
    }

    pub fn state(&self) -> FsmState {
        self.state
    }

    pub fn allows_writes(&self) -> bool {
        self.state == FsmState::Running
    }
}

/// Process-wide kill switch. When active, PLACE/REPLACE are blocked but
/// CANCEL stays allowed: reducing exposure must always be possible.
#[derive(Clone, Default)]
pub struct KillSwitch {
    active: Arc<AtomicBool>,
}

impl KillSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn activate(&self, reason: &str) {
        warn!(reason, "kill switch activated");
        self.active.store(true, Ordering::SeqCst);
    }

    pub fn deactivate(&self) {
        info!("kill switch deactivated");
        self.active.store(false, Ordering::SeqCst);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}
