pub mod audit;
pub mod commands;
pub mod config;
pub mod data;
pub mod embeds;
pub mod enforcement;
pub mod expiry;
pub mod gateway;
pub mod handlers;
pub mod ledger;
pub mod logging;
pub mod policy;
pub mod records;
pub mod store;

// Customize these constants for your bot
pub const BOT_NAME: &str = "sentinel_warden";
pub const COMMAND_TARGET: &str = "sentinel_warden::command";
pub const ERROR_TARGET: &str = "sentinel_warden::error";
pub const EVENT_TARGET: &str = "sentinel_warden::handlers";
pub const SWEEP_TARGET: &str = "sentinel_warden::expiry";
pub const CONSOLE_TARGET: &str = "sentinel_warden";

pub use data::{Data, DataInner};
pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
