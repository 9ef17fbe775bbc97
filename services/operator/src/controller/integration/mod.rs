//! Integration controller.
//!
//! ```text
//! None/WaitingForPlatform -> Initialization -> BuildingKit -> Deploying -> Running
//!                                          \-> BuildSubmitted -> BuildRunning -/
//! ```
//!
//! `Error` is reachable from every build and run phase; Monitor moves it
//! back to `Initialization` once the spec changes. Objects marked for
//! deletion go to Delete whatever their phase.

mod build;
mod build_kit;
mod delete;
mod deploy;
mod initialize;
mod monitor;
mod platform_setup;

use chrono::{DateTime, Utc};
use kforge_api::{
    ConditionStatus, ConditionType, Failure, HasConditions, Integration, IntegrationPhase,
};

use crate::dispatch::{Dispatcher, Noop, PhaseTable};
use crate::error::DispatchError;

pub use build::BuildAction;
pub use build_kit::BuildKit;
pub use delete::Delete;
pub use deploy::Deploy;
pub use initialize::Initialize;
pub use monitor::Monitor;
pub use platform_setup::PlatformSetup;

pub fn dispatcher() -> Result<Dispatcher<Integration>, DispatchError> {
    use IntegrationPhase as P;

    let table = PhaseTable::builder()
        .route(&[P::None, P::WaitingForPlatform], PlatformSetup)
        .route(&[P::Initialization], Initialize)
        .route(&[P::BuildingKit], BuildKit)
        .route(&[P::BuildSubmitted, P::BuildRunning], BuildAction)
        .route(&[P::Deploying], Deploy)
        .route(&[P::Running, P::Error], Monitor)
        .route(&[P::BuildComplete], Noop)
        .route(&[P::Deleting], Delete)
        .preempt_last(Integration::is_being_deleted)
        .build()?;
    Ok(Dispatcher::new(table))
}

/// Moves `target` to `Error` with a `Ready=False` condition.
fn fail(target: &mut Integration, reason: &str, message: String, now: DateTime<Utc>) {
    target.status.set_condition(
        ConditionType::Ready,
        ConditionStatus::False,
        reason,
        message.clone(),
        now,
    );
    record_failure(target, message, now);
}

/// Like [`fail`], with the condition message taken from `err`.
fn fail_with_error(
    target: &mut Integration,
    reason: &str,
    err: &dyn std::error::Error,
    now: DateTime<Utc>,
) {
    target
        .status
        .set_error_condition(ConditionType::Ready, reason, err, now);
    record_failure(target, err.to_string(), now);
}

fn record_failure(target: &mut Integration, message: String, now: DateTime<Utc>) {
    let status = &mut target.status;
    status.phase = IntegrationPhase::Error;
    let keep_time = status
        .failure
        .as_ref()
        .filter(|f| f.reason == message)
        .map(|f| f.time);
    status.failure = Some(Failure::new(message, keep_time.unwrap_or(now)));
}
