pub mod api;
pub mod app;
pub mod config;
pub mod domain;
pub mod errors;
pub mod models;
pub mod session;
pub mod store;
pub mod sweeper;
