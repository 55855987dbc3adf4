pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod mapper;
pub mod models;
pub mod rate_limit;
pub mod server;
pub mod service;
pub mod sweeper;

#[cfg(test)]
pub mod mock;

pub use server::start_server;
pub use service::LookupService;
