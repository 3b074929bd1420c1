//! Offer service: prices, stock and the reservation counter the saga releases.
//!
//! Reads go through [`CachedOfferStore`], which populates the cache on a miss
//! and invalidates it before every write. [`OfferService::remove_reserved`]
//! is the saga step: it answers with `commit_delivery` on success and
//! `cancel_delivery` on failure.

pub mod cached;
pub mod consumer;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod service;
pub mod store;

pub use cached::CachedOfferStore;
pub use consumer::OfferConsumer;
pub use memory::InMemoryOfferStore;
pub use model::{Offer, OfferPrice};
pub use postgres::PgOfferStore;
pub use service::OfferService;
pub use store::OfferStore;
