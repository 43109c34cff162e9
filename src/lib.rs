// Library interface for testing

// Declare all modules
pub mod command;
pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod ident;
pub mod pdb_format;
pub mod pipeline;
pub mod queries;
pub mod rate_limit;
pub mod request;
pub mod schema;
pub mod serve;
pub mod store;
pub mod tool;
pub mod torsions;

// Re-export the expected database version for convenience
pub use constants::EXPECTED_DB_VERSION;
