//! # kforge-id
//!
//! Identifier types shared by the kforge control plane.
//!
//! - Generated names use a prefixed format: `{prefix}-{ulid}` (lowercase), so
//!   they sort by creation time and stay valid as resource names.
//! - [`ResourceVersion`] is the monotonic counter the store uses for
//!   optimistic concurrency.
//!
//! Examples:
//! - `kit-01hv4z2wqxkjnm8gpqy6vbkc3d`
//! - `req-01hv4z3mxnkpqr9hstz7wcld4e`

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;

/// Re-export ulid for consumers that need raw ULID operations
pub use ulid::Ulid;
