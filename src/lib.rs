pub mod config;
pub mod correction;
pub mod db;
pub mod error;
pub mod ingest;
pub mod output;
pub mod pages;
pub mod paths;
pub mod search;
pub mod storage;
