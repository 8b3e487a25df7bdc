//! Shared types for the DataChat workspace: conversation messages, canvas
//! code entries and execution outputs, the credit ledger, configuration,
//! the common error type, and structured trace events.

pub mod code;
pub mod config;
pub mod credit;
pub mod error;
pub mod message;
pub mod trace;
