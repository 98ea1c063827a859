pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod extract;
pub mod ledger;
pub mod power;
pub mod server;
pub mod stats;
pub mod storage;

pub use error::{ClanError, Result};
