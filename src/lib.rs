pub mod client;
pub mod config;
pub mod error;
pub mod geometry;
pub mod map;
pub mod models;
pub mod observability;
pub mod sync;
