//! Response cache subsystem.
//!
//! # Data Flow
//! ```text
//! request target
//!     → key.rs (target → filesystem-safe CacheKey)
//!     → store.rs (exists / read / write against the cache directory)
//!     → flight.rs (collapse concurrent misses for one key into one fetch)
//! ```
//!
//! # On-disk Layout
//! ```text
//! cache/
//!     <key>              exact body bytes of one upstream response
//!     <key>.meta.json    {"status": 20, "meta": "text/gemini"}
//!     .<key>.<uuid>.tmp  in-progress write, renamed into place on success
//! ```
//!
//! # Design Decisions
//! - Entries are immutable once written; there is no eviction or expiry
//! - Writes go through a temp file and rename so readers never see partial bodies
//! - The store is a trait so the request handler can be driven against fakes

pub mod flight;
pub mod key;
pub mod store;

pub use flight::{Flight, Flights};
pub use key::{hashed, sanitize, CacheKey, KeyStrategy};
pub use store::{CacheError, CacheStore, DirectoryStore, StoredMeta};
