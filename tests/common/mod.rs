//! Shared helpers for the test targets.

#![allow(dead_code)]

#[cfg(unix)]
pub mod scripts;
