pub use crate::core::app::App;
pub use fazt_types::error::{Error, FzResult};
pub use fazt_types::types::{Patch, Role, Timestamp};

pub use tracing::{debug, debug_span, error, error_span, info, info_span, warn, warn_span};

// vim: ts=4
