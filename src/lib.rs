// Depository: account ledger with an atomic transfer engine
pub mod account;
pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod service;
pub mod storage;
pub mod transfer;
