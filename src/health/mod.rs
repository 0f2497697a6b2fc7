//! Backend health: the per-backend state machine and the prober that
//! drives it.

mod fsm;
mod prober;

pub use fsm::{FsmError, HealthEvent, HealthMachine, HealthState};
pub use prober::{HealthCheckError, HealthProber, HEALTH_CHECK_TIMEOUT};
