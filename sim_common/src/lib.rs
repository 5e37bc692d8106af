//! Shared data model for the datacenter hardware simulator.
//!
//! This crate provides the types every engine and the wrapper actor operate
//! on: operations and their retired results (`operation`), hardware
//! profiles and the store that loads them (`profile`), the complexity
//! interface that gates pipeline stages (`complexity`), process
//! configuration (`config`), and the error taxonomy (`error`).

pub mod complexity;
pub mod config;
pub mod error;
pub mod operation;
pub mod prelude;
pub mod profile;
