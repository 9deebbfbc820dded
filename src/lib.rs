pub mod checkpoint;
pub mod config;
pub mod convert;
pub mod error;
pub mod event;
pub mod filter;
pub mod pumper;
pub mod reader;
pub mod writer;

pub mod clickhouse;
pub mod mysql;

pub use config::Config;
pub use error::{Error, Result};
pub use pumper::Pumper;
