//! `TaskDeck` — shared meeting task deck library.

pub mod app;
pub mod breakouts;
pub mod config;
pub mod effects;
pub mod net;
pub mod session;
pub mod store;
pub mod tasks;
pub mod timer;
pub mod ui;
