pub mod action;
pub mod config;
pub mod serve;
pub mod server;
pub mod status;
