//! Business logic services for the storefront.
//!
//! # Services
//!
//! - `auth` - Password registration and login
//! - `cart` - Cart store
//! - `identity` - Customer get-or-create by email
//! - `orders` - Order materializer
//! - `plans` - Cached plan rows
//! - `subscriptions` - Aurora Pro subscription reconciler
//! - `sweeper` - Periodic expiry sweep

pub mod auth;
pub mod cart;
pub mod identity;
pub mod orders;
pub mod plans;
pub mod subscriptions;
pub mod sweeper;
