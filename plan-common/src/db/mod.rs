//! Schedule store schema and row types

pub mod init;
pub mod models;

pub use init::*;
pub use models::*;
