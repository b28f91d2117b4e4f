//! Core Calendar Agent library (session, storage, config, backend contracts).

pub mod config;
pub mod consent;
pub mod logging;
pub mod session;
pub mod storage;
pub mod waitlist;
