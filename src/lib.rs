pub mod config;
pub mod constants;
pub mod coordinator;
pub mod networking;
pub mod peer;
pub mod storage;
pub mod utils;
