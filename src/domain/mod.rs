//! Core domain types and logic.

pub mod aggregator;
pub mod bar;
pub mod config;
pub mod error;
pub mod indicator;
pub mod metric;
pub mod metric_cache;
pub mod normalization;
pub mod service;
pub mod trading_calendar;
pub mod universe;
