pub mod config_port;
pub mod data_port;
pub mod ledger_port;
pub mod universe_port;
