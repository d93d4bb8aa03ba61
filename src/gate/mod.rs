//! Keyword gate - hands out files for keywords to channel subscribers.

pub mod access;
pub mod command;
pub mod database;
pub mod membership;
pub mod reply;
pub mod router;
pub mod session;
pub mod telegram;

#[cfg(test)]
mod tests;

pub use command::Inbound;
pub use database::Database;
pub use membership::HttpOracle;
pub use router::{Router, RouterConfig};
pub use telegram::TelegramClient;
