#![warn(clippy::all, clippy::pedantic)]

//! Single-shot POP3 mailbox health check.
//!
//! One invocation opens one session against one server: count the messages,
//! optionally delete them all, close the session, and classify the count
//! against warning/critical threshold ranges.  The binary prints exactly one
//! summary line on stdout and exits 0/1/2/3 for OK/WARNING/CRITICAL/UNKNOWN,
//! which is the whole interface a monitoring supervisor consumes.

pub mod check;
pub mod configuration;
pub mod errors;
pub mod pop3;
pub mod thresholds;
