//! Shared utilities for semsolve.
//!
//! This crate provides the cross-cutting concerns used by the other semsolve
//! crates: the application error type and filesystem helpers.

pub mod errors;
pub mod fs;
