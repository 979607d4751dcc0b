//! Core domain types and logic.

pub mod ohlcv;
pub mod indicator;
pub mod signal;
pub mod signal_service;
pub mod backtest;
pub mod backtest_service;
pub mod metrics;
pub mod config;
pub mod error;
