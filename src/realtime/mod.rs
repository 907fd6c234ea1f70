//! Live step updates over WebSocket
//!
//! Every connected viewer gets its own poll loop over the metrics store. A
//! loop pushes a `step_update` message whenever the freshest step id is
//! newer than the last one it delivered.

mod events;
mod manager;
mod poller;
mod session;
mod socket;

pub use events::{encode_step, LiveMessage};
pub use manager::{SessionInfo, SessionManager};
pub use poller::{PollerState, SnapshotPoller};
pub use session::{CancelSignal, ClientFrame, CloseReason, LiveSession, SessionId, SessionStats};
pub use socket::live_handler;
