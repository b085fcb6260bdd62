//! Database query functions organized by domain.

pub mod events;
pub mod feeds;
pub mod rewards;
pub mod treasury;
