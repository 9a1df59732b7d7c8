//! Re-exported types from external crates for convenience.
//!
//! These types appear in the public API of this crate and are re-exported here
//! so users don't need to add these dependencies to their `Cargo.toml`.

/// Cheaply cloneable byte buffer carried by binary frames.
pub use bytes::Bytes;
/// JSON value type and the [`json!`] macro for building query parameters and messages.
///
/// # Example
/// ```
/// use resilient_ws::types::json;
/// let query = json!({ "token": "abc" });
/// assert_eq!(query["token"], "abc");
/// ```
pub use serde_json::{Value, json};
/// Parsed connection address handed to a [`Connector`](crate::ws::Connector).
pub use url::Url;
