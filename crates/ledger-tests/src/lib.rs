//! # ledger-tests
//!
//! Integration tests for the ledger crates.
//!
//! This crate provides:
//! - A test node wired with in-memory collaborators and a regtest miner
//! - Consensus engine tests against the network presets
//! - End-to-end block acceptance and rejection tests
//! - Download window and peer state tests
//! - Property-based tests for consensus and scheduling invariants
//! - Concurrency tests for serialized acceptance and script checking

pub mod generators;
pub mod harness;


#[cfg(test)]
mod acceptance_tests;




pub use generators::*;
pub use harness::*;
