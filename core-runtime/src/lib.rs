//! # Core Runtime Module
//!
//! Runtime infrastructure shared by the mirror and sync crates:
//! - Logging and tracing setup
//! - Configuration loading and validation
//! - Event bus for refresh and sync progress
//!
//! Nothing here touches the mirror database or an external library; it only
//! establishes the conventions the other crates follow.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{CoreConfig, CoreConfigBuilder, RetrySettings, SyncSettings};
pub use error::{Error, Result};
pub use events::{CoreEvent, EventBus, EventStream, RefreshEvent, SyncEvent};
pub use logging::{init_logging, LogFormat, LogLevel, LoggingConfig};
