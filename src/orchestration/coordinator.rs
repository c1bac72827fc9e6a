//! Release Coordinator - runs the module pipelines
//!
//! Every module goes through build → sign → publish on its own task, driven by
//! a [`ModuleStateMachine`]. A bounded worker pool limits how many modules run
//! at once; a failed module never stops the others. Cancellation stops the
//! dispatch of new modules, lets in-flight modules finish, and reports the
//! rest as cancelled.

use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::core::config::ReleaseConfig;
use crate::core::error::ReleaseError;
use crate::core::model::{ModuleDescriptor, PublishTarget};
use crate::core::state_machine::{ModuleState, ModuleStateMachine};
use crate::core::traits::{Credential, Transport};
use crate::orchestration::artifact_set::{ArtifactSet, ArtifactSetBuilder};
use crate::orchestration::publisher::{PublishOptions, RepositoryPublisher};
use crate::orchestration::report::{
    ModuleReport, ModuleStatus, ReleaseReport, ReportHandle, TargetReport, TargetStatus,
};
use crate::orchestration::signer::Signer;
use crate::plugins::PluginLoader;
use crate::security::CredentialStore;

/// A target with its transport and resolved credential
#[derive(Clone)]
pub struct ResolvedTarget {
    pub target: PublishTarget,
    pub transport: Arc<dyn Transport>,
    pub credential: Option<Credential>,
}

/// Module and target selection for a run
#[derive(Debug, Clone, Default)]
pub struct ReleaseFilter {
    /// Only these modules; all when `None`
    pub modules: Option<Vec<String>>,
    /// Only these targets; all when `None`
    pub targets: Option<Vec<String>>,
}

impl ReleaseFilter {
    fn select<T>(
        items: Vec<T>,
        wanted: Option<&[String]>,
        name: impl Fn(&T) -> &str,
        kind: &str,
    ) -> Result<Vec<T>, ReleaseError> {
        let Some(wanted) = wanted else {
            return Ok(items);
        };

        if let Some(unknown) = wanted
            .iter()
            .find(|w| !items.iter().any(|item| name(item) == w.as_str()))
        {
            return Err(ReleaseError::Config(format!("unknown {}: {}", kind, unknown)));
        }

        Ok(items
            .into_iter()
            .filter(|item| wanted.iter().any(|w| w == name(item)))
            .collect())
    }
}

/// Default worker pool size
pub fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

struct Pipeline {
    builder: ArtifactSetBuilder,
    signer: Signer,
    publisher: RepositoryPublisher,
    targets: Vec<ResolvedTarget>,
}

/// Coordinates a release across modules and targets
pub struct ReleaseCoordinator {
    modules: Vec<ModuleDescriptor>,
    pipeline: Arc<Pipeline>,
    parallel: usize,
    cancel: CancellationToken,
}

impl ReleaseCoordinator {
    pub fn new(
        modules: Vec<ModuleDescriptor>,
        targets: Vec<ResolvedTarget>,
        signer: Signer,
        options: PublishOptions,
        parallel: usize,
    ) -> Self {
        Self {
            modules,
            pipeline: Arc::new(Pipeline {
                builder: ArtifactSetBuilder::new(),
                signer,
                publisher: RepositoryPublisher::new(options),
                targets,
            }),
            parallel: parallel.max(1),
            cancel: CancellationToken::new(),
        }
    }

    /// Coordinator for a loaded configuration
    ///
    /// Unknown names in `filter` are configuration errors.
    pub fn from_config(
        config: &ReleaseConfig,
        base_dir: &Path,
        filter: &ReleaseFilter,
        loader: &PluginLoader,
        credentials: &CredentialStore,
    ) -> Result<Self, ReleaseError> {
        let modules = ReleaseFilter::select(
            config.module_descriptors(base_dir)?,
            filter.modules.as_deref(),
            |m| m.name.as_str(),
            "module",
        )?;
        let targets = ReleaseFilter::select(
            config.targets.clone(),
            filter.targets.as_deref(),
            |t| t.name.as_str(),
            "target",
        )?;

        let targets = targets
            .into_iter()
            .map(|target| {
                Ok(ResolvedTarget {
                    transport: loader.transport_for(&target)?,
                    credential: credentials.credential_for(&target),
                    target,
                })
            })
            .collect::<Result<Vec<_>, ReleaseError>>()?;

        let signer = Signer::new(
            loader.signing_backend(config)?,
            loader.signing_key(config, credentials),
        );
        let options = PublishOptions {
            dry_run: config.release.dry_run,
            verify: config.release.verify,
            retry: config.release.retry.clone(),
        };
        let parallel = config.release.parallel.unwrap_or_else(default_parallelism);

        Ok(Self::new(modules, targets, signer, options, parallel))
    }

    pub fn modules(&self) -> &[ModuleDescriptor] {
        &self.modules
    }

    pub fn parallel(&self) -> usize {
        self.parallel
    }

    pub fn is_dry_run(&self) -> bool {
        self.pipeline.publisher.options().dry_run
    }

    /// Token that cancels the run; clones share the same cancellation
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Build every module's artifact set without signing or uploading
    pub async fn check(&self) -> Vec<(String, Result<ArtifactSet, ReleaseError>)> {
        let mut results = Vec::with_capacity(self.modules.len());
        for descriptor in &self.modules {
            let built = self.pipeline.builder.build(descriptor).await;
            results.push((descriptor.name.clone(), built));
        }
        results
    }

    /// Release every module and return the finished report
    pub async fn run(&self) -> ReleaseReport {
        let report = ReportHandle::new(ReleaseReport::new(self.is_dry_run()));
        let semaphore = Arc::new(Semaphore::new(self.parallel));
        let mut tasks = Vec::with_capacity(self.modules.len());

        tracing::info!(
            modules = self.modules.len(),
            targets = self.pipeline.targets.len(),
            parallel = self.parallel,
            dry_run = self.is_dry_run(),
            "release started"
        );

        let mut pending = self.modules.iter();
        for descriptor in pending.by_ref() {
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                Self::record_cancelled(&report, descriptor).await;
                break;
            };

            let pipeline = Arc::clone(&self.pipeline);
            let report = report.clone();
            let descriptor = descriptor.clone();
            let name = descriptor.name.clone();
            let task = tokio::spawn(async move {
                let _permit = permit;
                let entry = pipeline.release_module(&descriptor).await;
                if let Err(e) = report.record(entry).await {
                    tracing::error!("{}", e);
                }
            });
            tasks.push((name, task));
        }

        for descriptor in pending {
            Self::record_cancelled(&report, descriptor).await;
        }

        for (name, task) in tasks {
            if let Err(e) = task.await {
                tracing::error!(module = %name, "release task aborted: {}", e);
                if !report.contains(&name).await {
                    let entry = ModuleReport {
                        module: name.clone(),
                        version: String::new(),
                        status: ModuleStatus::Failed(format!("release task aborted: {}", e)),
                        state: ModuleState::Failed,
                        targets: Vec::new(),
                        warnings: Vec::new(),
                        history: Vec::new(),
                        duration_ms: 0,
                    };
                    let _ = report.record(entry).await;
                }
            }
        }

        let order: Vec<String> = self.modules.iter().map(|m| m.name.clone()).collect();
        let report = report.finish(&order).await;

        tracing::info!(
            done = report.count(ModuleState::Done),
            failed = report.count(ModuleState::Failed),
            cancelled = report.count(ModuleState::Cancelled),
            "release finished"
        );
        report
    }

    async fn record_cancelled(report: &ReportHandle, descriptor: &ModuleDescriptor) {
        let mut machine = ModuleStateMachine::new(&descriptor.name);
        if let Err(e) = machine.transition(ModuleState::Cancelled) {
            tracing::error!("{}", e);
        }
        let cancelled = ReleaseError::Cancelled {
            module: descriptor.name.clone(),
        };
        tracing::info!("{}", cancelled);

        let entry = ModuleReport {
            module: descriptor.name.clone(),
            version: descriptor.version.clone(),
            status: ModuleStatus::Cancelled,
            state: machine.state(),
            targets: Vec::new(),
            warnings: Vec::new(),
            history: machine.transitions().to_vec(),
            duration_ms: 0,
        };
        if let Err(e) = report.record(entry).await {
            tracing::error!("{}", e);
        }
    }
}

impl Pipeline {
    /// Run one module to a terminal state
    async fn release_module(&self, descriptor: &ModuleDescriptor) -> ModuleReport {
        let mut machine = ModuleStateMachine::new(&descriptor.name);
        let mut warnings = Vec::new();
        let mut targets = Vec::new();

        let result = self
            .drive(descriptor, &mut machine, &mut warnings, &mut targets)
            .await;

        let status = match result {
            Ok(()) => {
                tracing::info!(module = %descriptor.name, "released");
                ModuleStatus::Success
            }
            Err(e) => {
                tracing::error!(module = %descriptor.name, code = e.code(), "{}", e);
                if !machine.state().is_terminal() {
                    if let Err(transition) = machine.transition(ModuleState::Failed) {
                        tracing::error!("{}", transition);
                    }
                }
                ModuleStatus::Failed(e.to_string())
            }
        };

        ModuleReport {
            module: descriptor.name.clone(),
            version: descriptor.version.clone(),
            status,
            state: machine.state(),
            targets,
            warnings,
            history: machine.transitions().to_vec(),
            duration_ms: machine.elapsed_ms(),
        }
    }

    async fn drive(
        &self,
        descriptor: &ModuleDescriptor,
        machine: &mut ModuleStateMachine,
        warnings: &mut Vec<String>,
        reports: &mut Vec<TargetReport>,
    ) -> Result<(), ReleaseError> {
        let built = self.builder.build(descriptor).await?;
        warnings.extend(built.warnings);
        let module = built.module;
        machine.transition(ModuleState::Built)?;

        let signatures = self.signer.sign_module(&module).await?;
        machine.transition(ModuleState::Signed)?;

        let group: Vec<_> = module.artifacts.iter().cloned().zip(signatures).collect();
        machine.transition(ModuleState::Publishing)?;

        let mut failed = Vec::new();
        for resolved in &self.targets {
            let target = &resolved.target;
            if !target.accepts.accepts(&module.version) {
                let reason = if module.is_snapshot() {
                    "target does not accept snapshots"
                } else {
                    "target does not accept releases"
                };
                tracing::debug!(module = %module.name, target = %target.name, "{}", reason);
                reports.push(TargetReport::skipped(&target.name, reason));
                continue;
            }

            let outcome = self
                .publisher
                .publish(
                    &module,
                    &group,
                    target,
                    resolved.transport.as_ref(),
                    resolved.credential.as_ref(),
                )
                .await;

            let status = match &outcome.failure {
                None => TargetStatus::Published,
                Some(e) => {
                    failed.push(target.name.clone());
                    TargetStatus::Failed(e.to_string())
                }
            };
            reports.push(TargetReport {
                target: outcome.target,
                status,
                retries: outcome.retries,
                uploaded: outcome.uploaded,
                already_present: outcome.already_present,
            });
        }

        if reports.iter().all(|r| matches!(r.status, TargetStatus::Skipped(_))) {
            warnings.push(format!("no target accepts version {}", module.version));
        }

        if !failed.is_empty() {
            return Err(ReleaseError::PermanentFailure {
                target: failed.join(", "),
                message: "publishing failed".to_string(),
            });
        }

        machine.transition(ModuleState::Done)
    }
}
