//! Shared record types and hub wire protocol for TaskDeck.

pub mod codec;
pub mod ids;
pub mod name;
pub mod records;
pub mod store;
pub mod wire;
