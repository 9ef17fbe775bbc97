//! Build controller.
//!
//! ```text
//! None/Initialization -> Scheduling -> Pending -> Running -> Succeeded
//!                            ^                          \-> Failed -> (recovery) -> Initialization
//!                            waits for admission         \-> Interrupted (timeout)
//! ```
//!
//! Moving a build from `Pending` to `Running` and on to a result is the
//! builder's job; the controller admits, times out and retries.

mod initialize;
mod monitor;
mod recovery;
mod schedule;

use kforge_api::{Build, BuildPhase};

use crate::dispatch::{Dispatcher, Noop, PhaseTable};
use crate::error::DispatchError;

pub use initialize::InitializeBuild;
pub use monitor::{MonitorBuild, BUILD_TIMEOUT};
pub use recovery::Recovery;
pub use schedule::Schedule;

pub fn dispatcher() -> Result<Dispatcher<Build>, DispatchError> {
    use BuildPhase as P;

    let table = PhaseTable::builder()
        .route(&[P::None, P::Initialization, P::WaitingForPlatform], InitializeBuild)
        .route(&[P::Scheduling], Schedule)
        .route(&[P::Pending, P::Running], MonitorBuild)
        .route(&[P::Failed], Recovery)
        .route(&[P::Succeeded, P::Interrupted, P::Error], Noop)
        .build()?;
    Ok(Dispatcher::new(table))
}
