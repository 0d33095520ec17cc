mod database;
pub use database::{Database, Protocol, RocksDBCommon, RocksDBOptions};

mod engine;
pub use engine::Engine;

mod config;
pub use config::Config;

mod parser;
pub use parser::Parser;
