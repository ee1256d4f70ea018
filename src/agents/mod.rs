//! Agent marketplace and its persistence.

pub mod catalog;
pub mod kv_store;

pub use catalog::{
    ALL_CATEGORIES, Agent, CATEGORIES, Category, Marketplace, MarketplaceError, MarketplaceResult,
    builtin_agents,
};
pub use kv_store::{KeyValueStore, SqliteKeyValueStore, StoreError, StoreFuture, StoreResult};
