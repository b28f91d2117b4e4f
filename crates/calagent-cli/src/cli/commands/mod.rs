//! CLI command handlers.

pub mod auth;
pub mod config;
pub mod consent;
pub mod request;
pub mod waitlist;

use std::sync::Arc;

use anyhow::{Context, Result};
use calagent_core::config::Config;
use calagent_core::session::{SessionClient, SessionConfig};
use calagent_core::storage::FileStorage;

/// Session client over the default on-disk store.
fn session_client(config: &Config) -> Result<SessionClient> {
    let storage = Arc::new(FileStorage::open_default());
    SessionClient::new(SessionConfig::from_config(config), storage).context("create session client")
}
