//! Engine pipelines and the tick-driven wrapper actor.
//!
//! `base` provides the shared queue/history/health machinery every engine
//! composes (C3). `cpu`, `memory`, `storage`, `network` implement the
//! staged latency pipeline for each hardware domain (C4/C5), all behind
//! the common `engine::Engine` trait. `queue_sizing` derives queue/heap
//! capacities from a profile (C7). `wrapper` is the single-actor boundary
//! around an engine (C6).

pub mod base;
pub mod cpu;
pub mod engine;
pub mod memory;
pub mod network;
pub mod queue_sizing;
pub mod storage;
pub mod wrapper;
