//! Schedule store access for plan-scrape
//!
//! Every function that takes part in an ingestion pass borrows a
//! `SqliteConnection` so callers can run it inside the pass transaction
//! (`&mut *tx`).

pub mod courses;
pub mod lectures;
pub mod semesters;
pub mod settings;
