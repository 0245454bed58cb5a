//! Run orchestration for hashstack.
//!
//! Ties the fetcher pool and the artifact layers into one run
//! ([`Pipeline::run`]), records every stage task in a [`Scheduler`] ledger and
//! hands the finished super-bundle to the [`PublishGate`].

pub mod pipeline;
pub mod publish;
pub mod scheduler;

pub use pipeline::{Pipeline, ProgressReporter, RunReport, SilentProgress};
pub use publish::{
    GitPublisher, PublishGate, PublishOutcome, PublishReport, PublishRequest, Publisher,
};
pub use scheduler::{Attested, Scheduler, Stage, TaskOutcome, TaskRecord};
