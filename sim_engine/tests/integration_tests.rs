//! Integration tests for the engine wrapper.
//!
//! These exercise the wrapper's public API end to end across multiple
//! ticks, rather than a single internal method in isolation.

mod integration;
