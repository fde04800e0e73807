// src/lib.rs

pub mod config;
pub mod error;
pub mod evaluator;
pub mod handlers;
pub mod models;
pub mod oracle;
pub mod routes;
pub mod state;
pub mod store;
pub mod utils;

pub use routes::create_router;
