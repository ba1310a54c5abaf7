//! # MazeDB Configuration Module
//!
//! This module centralizes all configuration constants for MazeDB. Constants
//! are grouped by their functional area and interdependencies are documented
//! and enforced through compile-time assertions.
//!
//! ## Why Centralization?
//!
//! The page geometry constants are load-bearing for the on-disk format: the
//! header size, the data-area size, and the free-list capacity must stay in
//! lockstep or files written by one build become unreadable by the next. By
//! co-locating these constants and adding compile-time checks, we prevent
//! such mismatches.
//!
//! ## Module Organization
//!
//! - [`constants`]: All numeric configuration values with dependency
//!   documentation

pub mod constants;
pub use constants::*;
