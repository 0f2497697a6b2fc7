//! Per-backend health state machine.
//!
//! Events arrive from the prober (and, for recovery, from an explicit
//! trigger) and are folded into one of four states. Transitions are
//! serialized per machine; the current state is additionally mirrored
//! into an atomic so selectors can read it without taking the lock.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, warn};

/// Consecutive down entries tolerated before the machine complains.
const FAILURE_WARN_THRESHOLD: u32 = 3;

/// Health of a single backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HealthState {
    /// Never probed yet.
    Pending = 0,
    /// Last probe succeeded; selectable.
    Alive = 1,
    /// Last probe failed; not selectable.
    Down = 2,
    /// A recovery probe is in flight; not selectable.
    HalfOpen = 3,
}

/// Events a health machine can process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthEvent {
    Success,
    Failure,
    Recovery,
}

/// Errors surfaced by [`HealthMachine::send`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FsmError {
    /// The event has no transition from the current state. The state is
    /// left untouched.
    #[error("event {event} rejected in state {state}")]
    EventRejected {
        state: HealthState,
        event: HealthEvent,
    },

    /// The transition target has no entry action configured.
    #[error("no entry action configured for state {0}")]
    InvalidConfig(HealthState),
}

/// Entry action invoked on arrival in a state. Returning an event chains
/// another transition under the same lock; `None` ends the chain.
type EntryAction = fn(&str, &mut MachineCore) -> Option<HealthEvent>;

/// State owned by the machine's lock.
struct MachineCore {
    current: HealthState,
    previous: HealthState,
    failure_count: u32,
}

/// The health state machine for one backend.
pub struct HealthMachine {
    /// Backend name, for log lines emitted by entry actions.
    name: String,
    /// Mirror of `core.current` for lock-free reads.
    state_tag: AtomicU8,
    /// Entry actions keyed by target state.
    actions: [Option<EntryAction>; 4],
    core: Mutex<MachineCore>,
}

impl HealthMachine {
    /// Create a machine in [`HealthState::Pending`] with the standard
    /// entry actions installed.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_actions(
            name,
            [
                Some(enter_pending as EntryAction),
                Some(enter_alive as EntryAction),
                Some(enter_down as EntryAction),
                Some(enter_half_open as EntryAction),
            ],
        )
    }

    fn with_actions(name: impl Into<String>, actions: [Option<EntryAction>; 4]) -> Self {
        Self {
            name: name.into(),
            state_tag: AtomicU8::new(HealthState::Pending as u8),
            actions,
            core: Mutex::new(MachineCore {
                current: HealthState::Pending,
                previous: HealthState::Pending,
                failure_count: 0,
            }),
        }
    }

    /// Current state, read without taking the machine lock.
    pub fn state(&self) -> HealthState {
        HealthState::from_tag(self.state_tag.load(Ordering::Acquire))
    }

    /// State the machine was in before the last transition.
    pub fn previous_state(&self) -> HealthState {
        self.lock_core().previous
    }

    /// Consecutive down entries since the backend was last alive.
    pub fn failure_count(&self) -> u32 {
        self.lock_core().failure_count
    }

    /// Send an event to the machine.
    ///
    /// Resolves the transition, applies it, and runs the target state's
    /// entry action. If the action returns a follow-up event the chain
    /// continues under the same lock until an action returns `None`. A
    /// rejection mid-chain is returned as the call's error; transitions
    /// already applied stay applied.
    pub fn send(&self, event: HealthEvent) -> Result<HealthState, FsmError> {
        let mut core = self.lock_core();
        let mut event = event;

        loop {
            let next = next_state(core.current, event).ok_or(FsmError::EventRejected {
                state: core.current,
                event,
            })?;

            let action = self.actions[next as usize].ok_or(FsmError::InvalidConfig(next))?;

            core.previous = core.current;
            core.current = next;
            self.state_tag.store(next as u8, Ordering::Release);

            match action(&self.name, &mut core) {
                None => return Ok(next),
                Some(follow_up) => event = follow_up,
            }
        }
    }

    fn lock_core(&self) -> std::sync::MutexGuard<'_, MachineCore> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The transition table. `None` is a rejection.
fn next_state(current: HealthState, event: HealthEvent) -> Option<HealthState> {
    use HealthEvent::*;
    use HealthState::*;

    match (current, event) {
        (Pending, Success) => Some(Alive),
        (Pending, Failure) => Some(Down),
        (Alive, Failure) => Some(Down),
        (Down, Success) => Some(Alive),
        (Down, Recovery) => Some(HalfOpen),
        (HalfOpen, Success) => Some(Alive),
        (HalfOpen, Failure) => Some(Down),
        _ => None,
    }
}

fn enter_pending(_name: &str, _core: &mut MachineCore) -> Option<HealthEvent> {
    // No transition targets Pending; present so the action table is total.
    None
}

fn enter_alive(name: &str, core: &mut MachineCore) -> Option<HealthEvent> {
    debug!(backend = name, "backend is alive");
    core.failure_count = 0;
    None
}

fn enter_down(name: &str, core: &mut MachineCore) -> Option<HealthEvent> {
    core.failure_count += 1;
    debug!(backend = name, failures = core.failure_count, "backend is down");

    if core.failure_count == FAILURE_WARN_THRESHOLD + 1 {
        warn!(
            backend = name,
            failures = core.failure_count,
            "backend keeps failing health checks"
        );
    }

    None
}

fn enter_half_open(name: &str, _core: &mut MachineCore) -> Option<HealthEvent> {
    debug!(backend = name, "backend attempting recovery");
    None
}

impl HealthState {
    fn from_tag(tag: u8) -> Self {
        match tag {
            1 => HealthState::Alive,
            2 => HealthState::Down,
            3 => HealthState::HalfOpen,
            _ => HealthState::Pending,
        }
    }
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            HealthState::Pending => "PENDING",
            HealthState::Alive => "ALIVE",
            HealthState::Down => "DOWN",
            HealthState::HalfOpen => "HALF_OPEN",
        };
        f.write_str(name)
    }
}

impl std::fmt::Display for HealthEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            HealthEvent::Success => "SUCCESS",
            HealthEvent::Failure => "FAILURE",
            HealthEvent::Recovery => "RECOVERY",
        };
        f.write_str(name)
    }
}
