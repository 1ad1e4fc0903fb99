//! Domain models for the storefront.
//!
//! Row types derive `sqlx::FromRow`; request payloads live with their routes.

pub mod cart;
pub mod catalog;
pub mod customer;
pub mod order;
pub mod session;
pub mod subscription;
pub mod user;

pub use cart::{Cart, CartHeader, CartLine, CartView};
pub use catalog::{ItemRef, Variant, choose_default_variant};
pub use customer::{AddressInput, Customer};
pub use order::{OrderDetail, OrderLine, OrderRecord, PaymentRecord};
pub use session::{CurrentUser, keys as session_keys};
pub use subscription::{Subscription, SubscriptionView};
pub use user::{Profile, User};
