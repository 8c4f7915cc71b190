//! Family/key value store backends for the STIR/SHAKEN engine.
//!
//! This crate provides the [`KeyValueStore`] trait and the backends the
//! engine persists its public-key index into. Keys are grouped into
//! *families* (opaque ASCII namespace strings); the engine keeps a reverse
//! family mapping public-key URLs to digests and one family per digest
//! holding that key's bindings.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 Engine layer                 │
//! │     KeyIndex (url → {path, expiration})      │
//! ├──────────────────────────────────────────────┤
//! │             stir-shaken-storage              │
//! │              KeyValueStore trait             │
//! │   (put, get, delete, delete_family, entries) │
//! ├──────────────────────┬───────────────────────┤
//! │     MemoryStore      │       DiskStore       │
//! │      (testing)       │  (durable snapshot)   │
//! └──────────────────────┴───────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use stir_shaken_storage::{KeyValueStore, MemoryStore};
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let store = MemoryStore::new();
//!
//! store.put("STIR_SHAKEN", "https://ex.test/abc.pub", b"digest").await.unwrap();
//! let value = store.get("STIR_SHAKEN", "https://ex.test/abc.pub").await.unwrap();
//! assert!(value.is_some());
//! # });
//! ```
//!
//! # Available Backends
//!
//! | Backend | Use Case | Persistence |
//! |---------|----------|-------------|
//! | [`MemoryStore`] | Testing, development | No |
//! | [`DiskStore`] | Embedded deployments | Yes (JSON snapshot) |

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod disk;
pub mod error;
pub mod memory;

// Re-export primary types at crate root for convenience
pub use backend::KeyValueStore;
pub use disk::DiskStore;
pub use error::{BoxError, StorageError, StorageResult};
pub use memory::MemoryStore;
