//! Core types shared across netstage facilities
//!
//! This crate provides foundational types used by both error handling
//! and logging facilities:
//!
//! - **Correlation types**: RequestId (one CLI/API invocation) and TraceId
//!   (one apply transaction)
//! - **Schema constants**: Canonical field keys and event names

pub mod correlation;
pub mod schema;

pub use correlation::{RequestId, TraceId};
