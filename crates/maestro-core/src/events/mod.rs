//! Activity event bus
//!
//! Broadcast channel carrying lifecycle events for observers (the
//! WebSocket stream, dashboards). Pure observation: nothing in the state
//! machine reads events back, and a missing subscriber never blocks
//! execution.

mod bus;
mod types;


pub use bus::EventBus;
pub use types::ActivityEvent;
