// src/lib.rs

pub mod app_state;
pub mod config;
pub mod error;
pub mod logging;
pub mod naming;
pub mod rate_limit;
pub mod service;
pub mod storage;
