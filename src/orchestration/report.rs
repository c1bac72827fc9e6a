//! Release report
//!
//! Built incrementally while modules finish, one entry per module. The
//! report is the run's only output besides the published files: it is
//! printed as a summary, written as JSON and rendered as Markdown.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::core::error::ReleaseError;
use crate::core::state_machine::{ModuleState, StateTransition};

/// Outcome of one module on one target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum TargetStatus {
    Published,
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetReport {
    pub target: String,
    #[serde(flatten)]
    pub status: TargetStatus,
    pub retries: u32,
    pub uploaded: usize,
    pub already_present: usize,
}

impl TargetReport {
    pub fn skipped(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            status: TargetStatus::Skipped(reason.into()),
            retries: 0,
            uploaded: 0,
            already_present: 0,
        }
    }
}

/// Overall outcome of one module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum ModuleStatus {
    Success,
    Failed(String),
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleReport {
    pub module: String,
    pub version: String,
    #[serde(flatten)]
    pub status: ModuleStatus,
    /// Terminal pipeline state
    pub state: ModuleState,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<TargetReport>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub history: Vec<StateTransition>,
    pub duration_ms: i64,
}

impl ModuleReport {
    pub fn is_failed(&self) -> bool {
        matches!(self.status, ModuleStatus::Failed(_))
    }
}

/// Report of one release run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub dry_run: bool,
    pub modules: Vec<ModuleReport>,
}

impl ReleaseReport {
    pub fn new(dry_run: bool) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            dry_run,
            modules: Vec::new(),
        }
    }

    /// Append a module entry
    ///
    /// Each module is recorded exactly once, and only once the run is still open.
    pub fn record(&mut self, entry: ModuleReport) -> Result<(), ReleaseError> {
        if self.finished_at.is_some() || self.modules.iter().any(|m| m.module == entry.module) {
            return Err(ReleaseError::DuplicateReportEntry {
                module: entry.module,
            });
        }
        self.modules.push(entry);
        Ok(())
    }

    pub fn module(&self, name: &str) -> Option<&ModuleReport> {
        self.modules.iter().find(|m| m.module == name)
    }

    /// Close the report, ordering entries like `order`
    ///
    /// Modules missing from `order` keep their completion order at the end.
    pub fn finish(&mut self, order: &[String]) {
        self.modules.sort_by_key(|m| {
            order
                .iter()
                .position(|name| *name == m.module)
                .unwrap_or(usize::MAX)
        });
        self.finished_at = Some(Utc::now());
    }

    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }

    pub fn failed_modules(&self) -> Vec<&str> {
        self.modules
            .iter()
            .filter(|m| m.is_failed())
            .map(|m| m.module.as_str())
            .collect()
    }

    pub fn count(&self, state: ModuleState) -> usize {
        self.modules.iter().filter(|m| m.state == state).count()
    }

    /// `PartialRelease` when any module failed
    ///
    /// The error summarises the report; it is never raised mid-run.
    pub fn outcome(&self) -> Result<(), ReleaseError> {
        let failed = self.failed_modules();
        if failed.is_empty() {
            Ok(())
        } else {
            Err(ReleaseError::PartialRelease {
                failed: failed.into_iter().map(String::from).collect(),
            })
        }
    }

    /// Process exit code: 0 unless a module failed
    pub fn exit_code(&self) -> i32 {
        if self.outcome().is_ok() { 0 } else { 1 }
    }

    pub fn duration_ms(&self) -> i64 {
        self.finished_at
            .map(|finished| (finished - self.started_at).num_milliseconds())
            .unwrap_or(0)
    }

    /// Rewrite every free-text field, e.g. to mask secrets
    pub fn redact(&mut self, redact: impl Fn(&str) -> String) {
        for module in &mut self.modules {
            if let ModuleStatus::Failed(reason) = &mut module.status {
                *reason = redact(reason);
            }
            for warning in &mut module.warnings {
                *warning = redact(warning);
            }
            for target in &mut module.targets {
                match &mut target.status {
                    TargetStatus::Skipped(reason) | TargetStatus::Failed(reason) => {
                        *reason = redact(reason);
                    }
                    TargetStatus::Published => {}
                }
            }
        }
    }

    pub fn to_json(&self) -> Result<String, ReleaseError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| ReleaseError::Config(format!("failed to serialize report: {}", e)))
    }

    /// Markdown summary, e.g. for a CI job summary
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# Release report{}", if self.dry_run { " (dry run)" } else { "" });
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "Run `{}`: {} done, {} failed, {} cancelled",
            self.run_id,
            self.count(ModuleState::Done),
            self.count(ModuleState::Failed),
            self.count(ModuleState::Cancelled)
        );
        let _ = writeln!(out);
        let _ = writeln!(out, "| Module | Version | Status | Targets |");
        let _ = writeln!(out, "|---|---|---|---|");

        for module in &self.modules {
            let status = match &module.status {
                ModuleStatus::Success => "✅ done".to_string(),
                ModuleStatus::Failed(reason) => format!("❌ {}", reason.replace('|', "\\|")),
                ModuleStatus::Cancelled => "⏹️ cancelled".to_string(),
            };
            let targets = module
                .targets
                .iter()
                .map(|t| match &t.status {
                    TargetStatus::Published => format!("{}: published", t.target),
                    TargetStatus::Skipped(_) => format!("{}: skipped", t.target),
                    TargetStatus::Failed(_) => format!("{}: failed", t.target),
                })
                .collect::<Vec<_>>()
                .join(", ");
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} |",
                module.module, module.version, status, targets
            );
        }

        out
    }
}

/// Shared, synchronized handle used by concurrently running modules
#[derive(Debug, Clone)]
pub struct ReportHandle {
    inner: Arc<Mutex<ReleaseReport>>,
}

impl ReportHandle {
    pub fn new(report: ReleaseReport) -> Self {
        Self {
            inner: Arc::new(Mutex::new(report)),
        }
    }

    pub async fn record(&self, entry: ModuleReport) -> Result<(), ReleaseError> {
        self.inner.lock().await.record(entry)
    }

    pub async fn contains(&self, module: &str) -> bool {
        self.inner.lock().await.module(module).is_some()
    }

    /// Finish and take a copy of the report
    pub async fn finish(&self, order: &[String]) -> ReleaseReport {
        let mut report = self.inner.lock().await;
        report.finish(order);
        report.clone()
    }
}
