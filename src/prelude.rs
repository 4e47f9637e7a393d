//! Common imports.
//!
//! ```ignore
//! use jeapcached::prelude::*;
//! ```

// Error types
pub use crate::error::{CacheError, JeapError, ProtocolError, Result};

// Configuration
pub use crate::config::{Config, MetricsConfig, SchedulerConfig, ServerConfig, StoreConfig};

// Storage
pub use crate::storage::{CacheStore, Fetched, Item, StoreStats};

// Protocol
pub use crate::protocol::{Command, ParsedLine, ResponseWriter, parse_line};

// Scheduler
pub use crate::scheduler::{DispatchTable, Job, Outcome, Reply, Request, Scheduler, Ticket};

// Metrics
pub use crate::metrics::Metrics;

// Server
pub use crate::server::Server;

pub use std::sync::Arc;
pub use tracing::{debug, error, info, trace, warn};
