//! # kforge-api
//!
//! Resource types reconciled by the kforge operator.
//!
//! ## Resources
//!
//! - [`Integration`]: the unit of work, turned into a running workload
//! - [`Build`]: one request to materialize dependencies into an artifact
//! - [`IntegrationKit`]: a reusable, possibly shared, build artifact
//! - [`IntegrationPlatform`]: namespace-wide build defaults (read-only here)
//! - [`ServiceAccount`], [`Role`], [`RoleBinding`]: builder prerequisites
//!
//! All reconciled resources share the same status shape: a closed `Phase`
//! enumeration plus a [`Conditions`] list merged by [`merge_conditions`].

mod build;
mod condition;
mod error;
mod integration;
mod kit;
pub mod labels;
mod macros;
mod meta;
mod platform;
mod rbac;

pub use build::*;
pub use condition::*;
pub use error::ApiError;
pub use integration::*;
pub use kit::*;
pub use meta::*;
pub use platform::*;
pub use rbac::*;

/// Version of the operator, stamped on integrations and kits it initializes.
pub const OPERATOR_VERSION: &str = env!("CARGO_PKG_VERSION");
