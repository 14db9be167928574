//! Testing utilities for the mcpflow workspace.
//!
//! [`ScriptedTransport`] plays the peer in protocol tests: it records every
//! outbound message, answers requests from per-method reply scripts, and
//! accepts injected peer-initiated traffic. [`fixtures`] holds canned wire
//! payloads.

#![deny(missing_docs)]

pub mod fixtures;
mod scripted;

pub use scripted::ScriptedTransport;
