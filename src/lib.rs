// src/lib.rs
pub mod api;
pub mod banner;
pub mod classifier;
pub mod client;
pub mod codec;
pub mod config;
pub mod errors;
pub mod models;
pub mod runner;
pub mod session;
