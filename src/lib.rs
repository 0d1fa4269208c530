//! RFP lifecycle backend
//!
//! Buyers draft and publish requests for proposal, suppliers respond, and the
//! workflow engine moves each RFP through its status machine while the
//! dispatcher fans domain events out to the search projection and email.

pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod domain;
pub mod error;
pub mod logging;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod store;
pub mod workflow;
