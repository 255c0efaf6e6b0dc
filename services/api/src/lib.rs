pub mod config;
pub mod credentials;
pub mod progress;
pub mod prompts;
pub mod ragtools;
pub mod server;
