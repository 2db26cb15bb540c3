//! Sync ingestion for the search indexer.
//!
//! Managed clusters push their resource graph as sync events. This crate
//! decides whether an event may be processed and turns it into database
//! writes.
//!
//! ## Components
//!
//! - **Admission**: per-cluster in-flight deduplication and a cap on large
//!   requests, evaluated before any database work
//! - **Batch**: groups writes into atomic units and bisects failing units
//!   until the bad items are isolated
//! - **Engine**: translates delta events and full resyncs into batched writes
//!   and assembles the response
//!
//! # Example
//!
//! ```no_run
//! use indexer_db::SqlitePool;
//! use indexer_sync::{EngineConfig, SyncEngine};
//! use indexer_types::SyncEvent;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = Arc::new(SqlitePool::open("search.db")?);
//! let engine = SyncEngine::new(pool, EngineConfig::default());
//!
//! let response = engine.sync("managed-1", SyncEvent::default()).await?;
//! println!("{} resources stored", response.total_resources);
//! # Ok(())
//! # }
//! ```

pub mod admission;
pub mod batch;
mod engine;
mod error;
mod resync;

pub use admission::{AdmissionConfig, AdmissionController, AdmissionPermit, Rejection};
pub use batch::{BatchItem, BatchReport, BatchWriter, ErrorLog};
pub use engine::{EngineConfig, SyncEngine};
pub use error::{EngineError, EngineResult};
