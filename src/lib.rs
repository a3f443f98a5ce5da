//! Storefront
//!
//! Client-held cart and checkout orchestration for a storefront: a cart store that survives reloads
//! and identity changes, a three-step checkout wizard with per-step validation and coupons, and a
//! payment handshake that hands the shopper off to an external payment page and recovers when they
//! come back.

pub mod cache;
pub mod cart;
pub mod checkout;
pub mod config;
pub mod context;
pub mod fixtures;
pub mod http;
pub mod identity;
pub mod notify;
pub mod payment;
pub mod prelude;
pub mod pricing;
pub mod products;
pub mod services;
