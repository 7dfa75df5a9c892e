//! Core domain types and logic.

pub mod error;
pub mod config;
pub mod series;
pub mod stats;
pub mod cache;
pub mod calendar;
pub mod universe;
pub mod metrics;
pub mod regime;
pub mod ranking;
pub mod portfolio;
pub mod trade;
pub mod simulator;
pub mod performance;
