pub mod branch_predictor;
pub mod cache;
pub mod common;
pub mod config;
pub mod policy;
pub mod sim;
pub mod trace;

#[cfg(feature = "stat")]
pub mod stat;
