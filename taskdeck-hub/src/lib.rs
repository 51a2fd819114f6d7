//! `TaskDeck` hub library.
//!
//! Exposes the sync hub for use in tests and embedding. The hub accepts
//! WebSocket connections, stores task-list rows in three in-memory
//! tables, and fans row changes out to subscribed clients.

pub mod config;
pub mod hub;
pub mod tables;
