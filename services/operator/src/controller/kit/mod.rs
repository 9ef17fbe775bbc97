//! IntegrationKit controller.
//!
//! ```text
//! None/Initialization/WaitingForPlatform -> BuildSubmitted -> BuildRunning -> Ready
//!                                                                         \-> Error
//! ```
//!
//! External kits carrying an image skip the build. Kits in `Error` are
//! rebuilt a bounded number of times.

mod build;
mod error;
mod initialize;

use kforge_api::{IntegrationKit, KitPhase};

use crate::dispatch::{Dispatcher, Noop, PhaseTable};
use crate::error::DispatchError;

pub use build::BuildKitImage;
pub use error::ErrorRecovery;
pub use initialize::InitializeKit;

/// Rebuilds attempted for a kit in `Error`.
pub const KIT_RECOVERY_ATTEMPTS: u32 = 5;

pub fn dispatcher() -> Result<Dispatcher<IntegrationKit>, DispatchError> {
    use KitPhase as P;

    let table = PhaseTable::builder()
        .route(&[P::None, P::Initialization, P::WaitingForPlatform], InitializeKit)
        .route(&[P::BuildSubmitted, P::BuildRunning], BuildKitImage)
        .route(&[P::Error], ErrorRecovery)
        .route(&[P::Ready], Noop)
        .build()?;
    Ok(Dispatcher::new(table))
}
