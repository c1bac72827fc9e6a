//! Orchestration layer for artifact releases
//!
//! Assembly, signing and publishing of modules, and the coordinator that
//! runs them across a worker pool.

pub mod artifact_set;
pub mod coordinator;
pub mod publisher;
pub mod report;
pub mod signer;

// Re-export main types for convenience
pub use artifact_set::{ArtifactSet, ArtifactSetBuilder};
pub use coordinator::{ReleaseCoordinator, ReleaseFilter, ResolvedTarget, default_parallelism};
pub use publisher::{PublishOptions, PublishOutcome, RepositoryPublisher, UploadLedger};
pub use report::{
    ModuleReport, ModuleStatus, ReleaseReport, ReportHandle, TargetReport, TargetStatus,
};
pub use signer::Signer;
