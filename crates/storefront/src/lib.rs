//! Aurora storefront library.
//!
//! Carts, order checkout, Aurora Pro subscriptions and customer identity
//! behind a JSON API. The binary in `main.rs` wires this crate to the
//! environment; tests drive [`routes::app`] directly.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod billing;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
