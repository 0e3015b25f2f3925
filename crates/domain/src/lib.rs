//! Shared types for every Chatgate crate: messages, stream events, model
//! capabilities, configuration, errors and structured trace events.

pub mod capability;
pub mod config;
pub mod error;
pub mod stream;
pub mod tool;
pub mod trace;
