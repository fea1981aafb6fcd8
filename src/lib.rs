// Satchel - pluggable session persistence for Rust services
//
// This library keeps per-client session state in a native, file, SQLite, or
// Redis store, optionally encrypted at rest, behind a single session facade.

// Re-export the session layer
pub use satchel_session::*;

// Re-export logging
pub use satchel_log;

// Prelude for common imports
pub mod prelude {
    pub use satchel_session::prelude::*;
    pub use satchel_session::{FLASH_KEY, OptionValue, SessionOptions};

    pub use async_trait::async_trait;
    pub use serde::{Deserialize, Serialize};
    pub use serde_json::json;
}
