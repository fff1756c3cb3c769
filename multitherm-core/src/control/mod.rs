//! Control engine
//!
//! PI control with time-proportioned relay output, relay-feedback autotune,
//! and the per-loop state they act on.

pub mod autotune;
pub mod loop_state;
pub mod pid;

pub use autotune::{AutotuneError, AutotuneResult, AutotuneSession, AutotuneState};
pub use loop_state::{Loop, LoopStatus};
pub use pid::{ControlMode, Gains, PiController, RelayWindow, SAMPLE_TIME_MS};
