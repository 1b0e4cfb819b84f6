//! CPU proof-of-work mining engine.
//!
//! The node supplies block templates and receives found blocks through
//! [`node::MinerHandler`]. [`engine::MiningEngine`] runs the hashing threads
//! and, when asked to, pauses them while the host is busy or on battery.

pub mod config;
pub mod controller;
pub mod daemon;
pub mod engine;
pub mod extra_nonce;
pub mod hash_thread;
pub mod hashrate;
pub mod node;
pub mod resource;
pub mod signal;
pub mod template;
pub mod tracing;
pub mod types;
