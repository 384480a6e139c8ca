//! Batch reduction of many curves
//!
//! A thin host adapter around `keyreduce-reduction`:
//! - Thread pool configuration for independent curves
//! - Cancellation between whole-curve reductions
//! - Per-curve reports and a batch summary

pub mod config;
pub mod batch;

pub use config::*;
pub use batch::*;
