//! Infrastructure layer (adapters/implementations).
//!
//! This module contains the IO-heavy parts: configuration files and SQLite.

pub mod app_config;
pub mod db;
