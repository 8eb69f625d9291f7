//! # Flux-Bus Test Suite
//!
//! Unified test crate containing:
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── integration/      # End-to-end pub/sub over TCP loopback
//! │   ├── routing.rs    # Topic routing, lifecycle, session events
//! │   └── security.rs   # CURVE handshake and key-ordering rules
//! │
//! └── stress/           # Concurrency properties
//!     └── churn.rs      # Subscription churn against a live receive loop
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p flux-tests
//!
//! # By category
//! cargo test -p flux-tests integration::
//! cargo test -p flux-tests stress::
//!
//! # Without the security layer
//! cargo test -p flux-tests --no-default-features
//! ```

#![allow(dead_code)]

pub mod integration;
pub mod stress;
