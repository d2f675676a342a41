//! Mark Six draw and bet records with derived statistics.

pub mod api;
pub mod config;
pub mod database;
pub mod mappings;
pub mod stats;
pub mod types;
pub mod utils;

pub use mappings::*;
pub use stats::*;
pub use types::*;
