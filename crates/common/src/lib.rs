//! Common utilities and types shared across the IKS test harness crates.

#![warn(clippy::pedantic)]

/// Module for harness configuration loaded from the environment
pub mod config;

/// Module for the shared permanent-resources map
pub mod resources;

/// Module for secret types that prevent accidental logging
pub mod secret;
