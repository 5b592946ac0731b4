//! Content store collaborator
//!
//! The durable backing store for products is external. This subsystem only
//! reads from it with `GET <path>` requests returning JSON and never writes.

mod client;
mod item;

pub use client::{ContentStore, HttpContentStore, MemoryContentStore};
pub use item::ContentItem;
