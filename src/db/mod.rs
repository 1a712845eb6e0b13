//! Database module for the MySQL connection pool
//!
//! The executor and the conversation store both borrow connections from the
//! pool created here; neither holds one across calls.

pub mod connection;

pub use connection::{init_pool, DbPool};
