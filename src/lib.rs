// CRCON chat bot: QQ group commands relayed to Hell Let Loose servers.

pub mod batch;
pub mod commands;
pub mod config;
pub mod crcon;
pub mod db;
pub mod error;
pub mod format;
pub mod maps;
pub mod metrics;
pub mod onebot;
pub mod permissions;
pub mod selector;
