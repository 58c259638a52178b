pub mod aliases;
pub mod api;
pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod dispatch;
pub mod events;
pub mod pages;
pub mod registry;
pub mod settings;
pub mod store;
pub mod telemetry;
pub mod utils;
