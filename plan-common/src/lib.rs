//! # Plan Common Library
//!
//! Shared code for the plan timetable tooling:
//! - Schedule store schema and row types
//! - Bootstrap configuration loading
//! - Error types

pub mod config;
pub mod db;
pub mod error;
pub mod uuid_utils;

pub use error::{Error, Result};
