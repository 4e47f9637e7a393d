//! # jeapcached
//!
//! In-memory key/value cache speaking the memcached text protocol.
//!
//! ## Features
//!
//! - set, add, replace, append, prepend, cas, get, gets, delete, incr, decr
//! - Lock-per-bucket hash table with lazy expiration and delete tombstones
//! - Fixed worker pool fed through a single-slot handoff
//! - Prometheus metrics and health check endpoints
//!
//! ## Example
//!
//! ```ignore
//! use jeapcached::prelude::*;
//!
//! let config = Config::default();
//! let store = Arc::new(CacheStore::new(config.store.buckets));
//! let scheduler = Scheduler::new(
//!     &config.scheduler,
//!     config.store.max_value_length,
//!     store,
//!     DispatchTable::new(&config.store),
//!     Arc::new(Metrics::new()),
//! )?;
//! let job = scheduler.submit_and_await(Job::new(Request::new(Command::Stat)))?;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐  line  ┌────────────┐  slot  ┌──────────┐  lock  ┌────────────┐
//! │ client   │───────▶│ connection │───────▶│ worker-N │───────▶│ bucket i   │
//! │ (stdio / │◀───────│ (tokio)    │◀───────│ dispatch │        │ item list  │
//! │  tcp)    │ reply  └────────────┘  done  └──────────┘        └────────────┘
//! └──────────┘
//! ```

pub mod config;
pub mod error;
pub mod health;
pub mod metrics;
pub mod prelude;
pub mod protocol;
pub mod scheduler;
pub mod server;
pub mod storage;

pub use error::{CacheError, JeapError, ProtocolError, Result};
