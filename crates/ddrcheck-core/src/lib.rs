pub mod cancel;
pub mod config;
pub mod ddr;
pub mod engine;
pub mod errors;
pub mod model;
pub mod report;
pub mod scope;
pub mod storage;
pub mod validators_api;
