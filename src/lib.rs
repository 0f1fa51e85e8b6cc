//! Integrity validation and repair for the match stats store.
//!
//! A match is ingested as rows across six tables without a surrounding
//! transaction. [`integrity`] finds matches whose footprint is incomplete and
//! deletes them so ingestion can write them again.

pub mod cli;
pub mod config;
pub mod integrity;
pub mod logging;

pub mod util {
    pub mod db;
    pub mod env;
}
