pub mod analytics;
pub mod chat;
pub mod config;
pub mod hospitals;
pub mod http;
pub mod model;
pub mod safety;
pub mod store;
pub mod symptoms;
pub mod types;
