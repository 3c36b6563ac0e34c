pub mod afk;
pub mod catalog;
pub mod config;
pub mod error;
pub mod external;
pub mod ledger;
pub mod rpc;
pub mod storage;
