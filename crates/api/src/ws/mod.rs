//! WebSocket infrastructure for live detection delivery.
//!
//! Provides connection management, heartbeat pings, and the per-job push
//! handler that drives a [`skyguard_store::distributor::PushSession`].

mod handler;
mod heartbeat;
pub mod manager;

pub use handler::detections_ws_handler;
pub use heartbeat::start_heartbeat;
pub use manager::WsManager;
