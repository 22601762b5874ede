pub mod buffer;
pub mod config;
pub mod errors;
pub mod hls;
pub mod models;
pub mod observability;
pub mod repositories;
pub mod services;
pub mod transport;
pub mod utils;
pub mod web;
