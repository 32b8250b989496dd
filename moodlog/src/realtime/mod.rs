//! Realtime voice conversations over a live vendor connection.

mod live;
mod manager;
mod store;

pub use live::{AudioFrame, GeminiLive, LiveVendor};
pub use manager::{RealtimeManager, SessionStatus, TurnReply};
pub use store::MemorySessionStore;
