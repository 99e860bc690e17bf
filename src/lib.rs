//! Native client library for the HuggingChat conversational AI service.
//!
//! The [`api`] layer speaks the service's HTTP surface, including the
//! streamed reply endpoint; [`services`] holds the conversation
//! synchronizer and the session plumbing around it; [`models`] are the
//! shared domain types. Binaries wire these together — see `main.rs` for
//! the reference CLI driver.

pub mod api;
pub mod config;
pub mod models;
pub mod services;
