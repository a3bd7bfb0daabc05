//! Database access layer

pub mod books;
pub mod connection;
pub mod models;
pub mod pages;

pub use connection::{create_pool, create_pool_from_env, DbPool};
