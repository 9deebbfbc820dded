pub mod source;
mod values;

pub use source::MysqlBinlogSource;
