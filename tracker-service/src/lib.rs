//! Tracker Service - email open tracking pixel with webhook notifications.

pub mod config;
pub mod handlers;
pub mod models;
pub mod policy;
pub mod services;
pub mod startup;
