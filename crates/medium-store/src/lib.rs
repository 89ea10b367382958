//! Random-access binary medium store.
//!
//! This crate provides cached, transactional access to a byte-addressable
//! medium: a file, a shared in-memory buffer or a forward-only input stream.
//!
//! - **Read caching**: reads are served from a bounded cache of disjoint
//!   regions with FIFO eviction, only uncached gaps touch the medium
//! - **Deferred edits**: inserts, removals and replacements are recorded as
//!   pending actions that can be undone until they are flushed
//! - **Tracked offsets**: positions handed out by the store are rebased on
//!   every flush, so holders keep pointing at the same logical bytes
//!
//! # Example
//!
//! ```rust
//! use medium_store::{Medium, MediumAccessType, MediumStore, StoreConfig};
//!
//! # fn example() -> Result<(), medium_store::StoreError> {
//! let medium = Medium::memory("tag", b"ID3 header".to_vec(), MediumAccessType::ReadWrite);
//! let mut store = MediumStore::new(medium.clone(), StoreConfig::default())?;
//! store.open()?;
//!
//! let header = store.create_offset(4)?;
//! store.insert_data(header, &b"v2 "[..])?;
//! store.flush()?;
//!
//! assert_eq!(store.offset_index(header)?, 7);
//! assert_eq!(store.get_data(header, 6)?.as_ref(), b"header");
//! assert_eq!(medium.memory_contents().as_deref(), Some(&b"ID3 v2 header"[..]));
//! store.close()?;
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

#![warn(missing_docs)]
#![allow(clippy::must_use_candidate)]

// Raw medium I/O
pub mod accessor;

// Deferred edits
pub mod action;

// Region cache
pub mod cache;

// Edit scheduling
pub mod change;

// Configuration
pub mod config;

// Errors
pub mod error;

// Medium descriptors
pub mod medium;

// Tracked offsets
pub mod offset;

// Byte ranges
pub mod region;

// Counters
pub mod stats;

// Store facade
pub mod store;

pub use accessor::{FileAccessor, MediumAccessor, MemoryAccessor, StreamAccessor};
pub use action::{ActionHandle, ActionKind, ActionState, MediumAction};
pub use cache::MediumCache;
pub use config::StoreConfig;
pub use error::{EndOfMedium, Result, StoreError};
pub use medium::{Medium, MediumAccessType, MediumSource, StreamOwnership};
pub use offset::{MediumOffset, OffsetFactory};
pub use region::{MediumRegion, RegionClip, RegionOverlap};
pub use stats::StoreStats;
pub use store::{MediumStore, SharedMediumStore};
