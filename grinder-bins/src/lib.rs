//! Shared setup for the operational binaries

pub mod common;
