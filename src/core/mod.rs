pub mod bootstrap;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod message;
pub mod session;
pub mod transcript;
