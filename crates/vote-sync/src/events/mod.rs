//! Remote-change notification plumbing
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌────────────────────┐
//! │ Store writes │────▶│  ChangeBus   │────▶│ Controller         │
//! │ or poll tick │     │  (broadcast) │     │ subscription → refresh()
//! └──────────────┘     └──────────────┘     └────────────────────┘
//! ```
//!
//! - `types`: the [`ChangeNotice`] payload
//! - `bus`: Tokio broadcast pub/sub
//! - `poll`: periodic notices for stores without push

pub mod bus;
pub mod poll;
pub mod types;

// Re-export core types
pub use bus::{ChangeBus, SharedChangeBus};
pub use poll::PollingFeed;
pub use types::ChangeNotice;
