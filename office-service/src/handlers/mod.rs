//! HTTP handlers for office-service.

pub mod auth;
pub mod catalog;
pub mod customers;
pub mod employees;
pub mod health;
pub mod incomes;
pub mod invoices;
pub mod services;
pub mod tasks;
pub mod tickets;

pub use health::{health_check, metrics_handler, readiness_check};
