//! Embassy async tasks
//!
//! Each task runs independently and communicates via channels/signals.

pub mod control;
pub mod remote_rx;
pub mod remote_tx;
pub mod storage;

pub use control::{control_task, log_event};
pub use remote_rx::remote_rx_task;
pub use remote_tx::remote_tx_task;
pub use storage::storage_task;
