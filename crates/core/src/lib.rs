//! Aurora Core - Shared domain types.
//!
//! This crate provides the types shared by every Aurora component:
//! - `storefront` - HTTP API for carts, checkout and the Aurora Pro subscription
//! - `cli` - Command-line tools for migrations, catalog seeding and sweeps
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no database
//! access, no HTTP clients. Database encoding is available behind the
//! `postgres` feature.
//!
//! # Modules
//!
//! - [`types`] - Typed ids, emails, quantities, money codes, statuses and plans

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
