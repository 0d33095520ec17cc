//! `prople-didcomm-storage` backs the `prople-didcomm-core` engine with RocksDB
//!
//! It carries the TOML configuration of the database and the engine, the
//! [`Repository`] implementing the engine key-value collaborator and the
//! builders wiring a configured [`prople_didcomm_core::engine::Engine`].
pub mod common;
pub mod config;
pub mod db;

mod repository;
pub use repository::Repository;

mod builder;
pub use builder::{build_engine, build_engine_from_file};

pub use config::{Config, Parser as ConfigManager};
pub use db::Builder as DbBuilder;
