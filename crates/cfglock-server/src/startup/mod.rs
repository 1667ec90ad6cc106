//! Application startup utilities module.

mod logging;

pub use logging::{LoggingConfig, LoggingGuard, init_logging};
