//! Boxlane Storefront library.
//!
//! Services, repositories, and HTTP routes for the storefront binary,
//! exposed as a library so they can be tested and reused by the CLI.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
