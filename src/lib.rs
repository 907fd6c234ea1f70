//! RewardScope - live telemetry dashboard for RL training runs
//!
//! Serves recent step rewards, reward-component breakdowns, episode
//! summaries and hacking alerts from a collector's run database, and pushes
//! fresh steps to connected viewers over WebSocket.

pub mod api;
pub mod error;
pub mod realtime;
pub mod server;
pub mod storage;
pub mod types;

pub use error::{Result, ScopeError};
pub use server::{router, AppState, DashboardServer};
pub use storage::{MetricsStore, SharedStore};
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
