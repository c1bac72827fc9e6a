//! Artifact Publisher CLI
//!
//! Multi-module artifact release orchestrator

use anyhow::{Context, Result};
use artifact_publisher::core::{ConfigLoadOptions, ConfigLoader, ConfigOverrides, ReleaseConfig};
use artifact_publisher::orchestration::{
    ModuleStatus, ReleaseCoordinator, ReleaseFilter, ReleaseReport, TargetStatus,
};
use artifact_publisher::plugins::PluginLoader;
use artifact_publisher::security::CredentialStore;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;

/// Multi-module artifact release orchestrator
#[derive(Parser)]
#[command(name = "artifact-publisher")]
#[command(version)]
#[command(about = "Assemble, sign and publish the modules of a multi-module project", long_about = None)]
struct Cli {
    /// Release configuration file
    #[arg(short, long, global = true, default_value = ".release.yaml")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Release modules to the configured targets
    Release {
        /// Comma-separated list of modules to release (default: all)
        #[arg(long, value_delimiter = ',')]
        modules: Option<Vec<String>>,

        /// Comma-separated list of targets to publish to (default: all)
        #[arg(long, value_delimiter = ',')]
        targets: Option<Vec<String>>,

        /// Run every step except the upload
        #[arg(long)]
        dry_run: bool,

        /// Number of modules released concurrently (1 = sequential)
        #[arg(long)]
        parallel: Option<usize>,

        /// Skip post-upload checksum verification
        #[arg(long)]
        no_verify: bool,

        /// Write the JSON release report to this file
        #[arg(long, value_name = "PATH")]
        report: Option<PathBuf>,

        /// Write a Markdown summary to this file
        #[arg(long, value_name = "PATH")]
        summary: Option<PathBuf>,
    },

    /// Validate the configuration and assemble artifacts without publishing
    Check {
        /// Comma-separated list of modules to check (default: all)
        #[arg(long, value_delimiter = ',')]
        modules: Option<Vec<String>>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(exit_code) => process::exit(exit_code),
        Err(e) => {
            eprintln!("\n❌ Error");
            eprintln!("{:#}", e);
            process::exit(1);
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Release {
            modules,
            targets,
            dry_run,
            parallel,
            no_verify,
            report,
            summary,
        } => {
            let overrides = ConfigOverrides {
                dry_run: dry_run.then_some(true),
                parallel,
                verify: no_verify.then_some(false),
            };
            let filter = ReleaseFilter { modules, targets };
            release_command(&cli.config, overrides, filter, report, summary).await
        }
        Commands::Check { modules } => {
            let filter = ReleaseFilter {
                modules,
                targets: None,
            };
            check_command(&cli.config, filter).await
        }
    }
}

struct Loaded {
    config: ReleaseConfig,
    base_dir: PathBuf,
    credentials: CredentialStore,
}

async fn load(config_path: &Path, overrides: ConfigOverrides) -> Result<Loaded> {
    let mut options = ConfigLoadOptions::new(".");
    options.config_path = Some(config_path.to_path_buf());
    options.overrides = overrides;

    let config = ConfigLoader::load(&options)
        .await
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    let credentials = CredentialStore::new(config.credentials.clone(), options.env.clone());

    Ok(Loaded {
        config,
        base_dir: options.base_dir(),
        credentials,
    })
}

async fn release_command(
    config_path: &Path,
    overrides: ConfigOverrides,
    filter: ReleaseFilter,
    report_path: Option<PathBuf>,
    summary_path: Option<PathBuf>,
) -> Result<i32> {
    let loaded = load(config_path, overrides).await?;
    let loader = PluginLoader::new(&loaded.base_dir);
    let coordinator = ReleaseCoordinator::from_config(
        &loaded.config,
        &loaded.base_dir,
        &filter,
        &loader,
        &loaded.credentials,
    )?;

    println!(
        "\n📦 Releasing {} module(s) to {}",
        coordinator.modules().len(),
        describe_targets(&loaded.config, &filter)
    );
    println!(
        "Mode: {}{}\n",
        if coordinator.parallel() == 1 {
            "Sequential".to_string()
        } else {
            format!("Parallel (max {} concurrent)", coordinator.parallel())
        },
        if coordinator.is_dry_run() { ", dry run" } else { "" }
    );

    let cancel = coordinator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n⏹️  Cancelling: running modules will finish, pending modules are skipped");
            cancel.cancel();
        }
    });

    let mut report = coordinator.run().await;
    report.redact(|text| loaded.credentials.mask_secrets_in(text));

    print_summary(&report);

    if let Some(path) = report_path {
        tokio::fs::write(&path, report.to_json()?)
            .await
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        println!("📝 Report written to {}", path.display());
    }
    if let Some(path) = summary_path {
        tokio::fs::write(&path, report.to_markdown())
            .await
            .with_context(|| format!("failed to write summary to {}", path.display()))?;
    }

    Ok(report.exit_code())
}

fn describe_targets(config: &ReleaseConfig, filter: &ReleaseFilter) -> String {
    let names: Vec<&str> = match &filter.targets {
        Some(targets) => targets.iter().map(String::as_str).collect(),
        None => config.targets.iter().map(|t| t.name.as_str()).collect(),
    };
    names.join(", ")
}

async fn check_command(config_path: &Path, filter: ReleaseFilter) -> Result<i32> {
    println!("\n🔍 Release Check\n");

    let loaded = load(config_path, ConfigOverrides::default()).await?;
    let loader = PluginLoader::new(&loaded.base_dir);
    let coordinator = ReleaseCoordinator::from_config(
        &loaded.config,
        &loaded.base_dir,
        &filter,
        &loader,
        &loaded.credentials,
    )?;

    let validation = ConfigLoader::validate(&loaded.config);
    if !validation.warnings.is_empty() {
        println!("⚠️  Configuration warnings:");
        for warning in &validation.warnings {
            println!("    - [{}] {}", warning.field, warning.message);
            if let Some(suggestion) = &warning.suggestion {
                println!("      💡 {}", suggestion);
            }
        }
        println!();
    }

    let mut failures = 0;
    for (module, built) in coordinator.check().await {
        println!("📦 {}:", module);
        match built {
            Ok(set) => {
                for artifact in &set.module.artifacts {
                    println!(
                        "  ✅ {} ({} bytes, sha256 {})",
                        artifact.file_name,
                        artifact.size,
                        &artifact.content_hash[..12]
                    );
                }
                for warning in &set.warnings {
                    println!("  ⚠️  {}", warning);
                }
            }
            Err(e) => {
                failures += 1;
                println!("  ❌ {}", e);
                for action in e.suggested_actions() {
                    println!("     💡 {}", action);
                }
            }
        }
    }

    if loaded.config.signing.as_ref().and_then(|s| s.effective_key_id()).is_none() {
        println!("\nℹ️  No signing key configured: artifacts will be published unsigned");
    }

    Ok(if failures == 0 { 0 } else { 1 })
}

fn print_summary(report: &ReleaseReport) {
    println!("\n{}", "=".repeat(60));
    println!("📊 Release Summary{}", if report.dry_run { " (dry run)" } else { "" });
    println!("{}", "=".repeat(60));

    for module in &report.modules {
        match &module.status {
            ModuleStatus::Success => {
                println!("\n✅ {} {} ({}ms)", module.module, module.version, module.duration_ms)
            }
            ModuleStatus::Failed(reason) => {
                println!("\n❌ {} {}: {}", module.module, module.version, reason)
            }
            ModuleStatus::Cancelled => println!("\n⏹️  {} {}: cancelled", module.module, module.version),
        }

        for target in &module.targets {
            let detail = match &target.status {
                TargetStatus::Published if target.already_present > 0 => format!(
                    "published ({} uploaded, {} already present)",
                    target.uploaded, target.already_present
                ),
                TargetStatus::Published => format!("published ({} uploaded)", target.uploaded),
                TargetStatus::Skipped(reason) => format!("skipped: {}", reason),
                TargetStatus::Failed(reason) => format!("failed: {}", reason),
            };
            let retries = if target.retries > 0 {
                format!(", {} retries", target.retries)
            } else {
                String::new()
            };
            println!("   - {}: {}{}", target.target, detail, retries);
        }

        for warning in &module.warnings {
            println!("   ⚠️  {}", warning);
        }
    }

    println!("\n{}", "=".repeat(60));
    match report.outcome() {
        Ok(()) => println!("Overall Status: ✅ SUCCESS"),
        Err(e) => println!("Overall Status: ❌ FAILED ({})", e),
    }
    println!("{}\n", "=".repeat(60));
}
