//! vermatrix - version-matrix verification and release
//!
//! ## Commands
//!
//! - `matrix`: Export the CI task matrix (to `$GITHUB_OUTPUT` when set)
//! - `versions`: Write `versions.json` for the component under test
//! - `verify`: Run one verification task per catalog version and gate on the result
//! - `release`: Publish, sign, tag and announce once the gate passes
//! - `tags`: Show a release tag and its announcement history

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn, Level};

use vermatrix_ci::{CommandExecutor, MatrixRunner, RunnerOptions, VerificationReport};
use vermatrix_core::config::DEFAULT_CONFIG_FILE;
use vermatrix_core::manifest::GITHUB_OUTPUT_ENV;
use vermatrix_core::reporting::{
    render_gate_report_md, render_release_report_md, write_markdown, write_report_json,
    VerificationSummaryArtifact,
};
use vermatrix_core::{
    check_matrices_agree, export_ci_matrix, obs, write_versions_manifest, CatalogDocument,
    EnvCredentialProvider, GateResult, GpgSigner, JsonFileReleaseRegistry, LocalRepository,
    MatrixSink, OrchestratorConfig, ReleaseCollaborators, ReleaseDescriptor, ReleasePipeline,
    ReleaseRegistry, RequestedStages, SystemGitTagStore, TagStore, VerificationPlan,
    VersionCatalog, VersionsManifest, DEFAULT_TARGET_COMMITISH,
};

const DEFAULT_VERSION_FILE: &str = "release/version.txt";

#[derive(Parser)]
#[command(name = "vermatrix")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Version-matrix verification and release orchestration", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Orchestrator config file
    #[arg(short, long, global = true, env = "VERMATRIX_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the CI task matrix, or append it to $GITHUB_OUTPUT
    Matrix,

    /// Write versions.json (component version plus supported matrix)
    Versions {
        /// Component version (default: contents of --version-file)
        #[arg(long)]
        version: Option<String>,

        #[arg(long, default_value = DEFAULT_VERSION_FILE)]
        version_file: PathBuf,

        #[arg(short, long, default_value = "build/generated/versions.json")]
        output: PathBuf,
    },

    /// Run every verification task and evaluate the gate
    Verify {
        /// Where verification.json and gate.md are written
        #[arg(long, default_value = "build/reports/vermatrix")]
        report_dir: PathBuf,

        /// Run only these tasks (comma separated names); the report cannot gate a release
        #[arg(long, value_delimiter = ',')]
        only: Vec<String>,

        /// Component version handed to every task (default: --version-file when present)
        #[arg(long)]
        version: Option<String>,

        #[arg(long, default_value = DEFAULT_VERSION_FILE)]
        version_file: PathBuf,
    },

    /// Publish, sign, tag and announce a release
    Release(ReleaseArgs),

    /// Show a release tag and its announcements
    Tags {
        /// Tag name, e.g. v3.0.1
        name: String,

        #[arg(long, default_value = ".")]
        repo: PathBuf,

        #[arg(long, default_value = "build/releases")]
        registry_dir: PathBuf,
    },
}

#[derive(Args, Debug)]
struct ReleaseArgs {
    /// Release version (default: contents of --version-file)
    #[arg(long, env = "VERMATRIX_RELEASE_VERSION")]
    version: Option<String>,

    #[arg(long, default_value = DEFAULT_VERSION_FILE)]
    version_file: PathBuf,

    /// Release notes file
    #[arg(long, default_value = "release/changes.md")]
    notes: PathBuf,

    /// Commit-ish the tag points at
    #[arg(long, default_value = DEFAULT_TARGET_COMMITISH)]
    target: String,

    /// Move an existing tag and re-announce
    #[arg(long)]
    overwrite: bool,

    /// Recorded with the forced tag move; required with --overwrite
    #[arg(long, requires = "overwrite")]
    overwrite_reason: Option<String>,

    /// Publish (and sign when credentials exist) without tagging or announcing
    #[arg(long)]
    publish_only: bool,

    /// verification.json from an earlier full `verify` run, re-gated against the current matrix
    #[arg(long)]
    gate_report: Option<PathBuf>,

    #[arg(long, default_value = "build/staging")]
    staging_dir: PathBuf,

    #[arg(long, default_value = "build/signatures")]
    signature_dir: PathBuf,

    #[arg(long, default_value = "build/releases")]
    registry_dir: PathBuf,

    /// Push created tags to this remote
    #[arg(long)]
    push: Option<String>,

    #[arg(long, default_value = ".")]
    repo: PathBuf,

    #[arg(long, default_value = "build/reports/vermatrix")]
    report_dir: PathBuf,

    /// Artifacts to publish
    artifacts: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    vermatrix_core::init_tracing(cli.json, level);

    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Matrix => {
            let github_output = std::env::var_os(GITHUB_OUTPUT_ENV).map(PathBuf::from);
            cmd_matrix(&config, github_output.as_deref())
        }
        Commands::Versions {
            version,
            version_file,
            output,
        } => cmd_versions(&config, version.as_deref(), &version_file, &output),
        Commands::Verify {
            report_dir,
            only,
            version,
            version_file,
        } => {
            let component_version = component_version(version.as_deref(), &version_file)?;
            let gate = cmd_verify(&config, &report_dir, &only, component_version.as_deref()).await?;
            if !gate.is_pass() {
                bail!(
                    "verification gate failed: {}",
                    gate.failing_tasks().join(", ")
                );
            }
            Ok(())
        }
        Commands::Release(args) => cmd_release(&config, args).await,
        Commands::Tags {
            name,
            repo,
            registry_dir,
        } => cmd_tags(&name, &repo, &registry_dir).await,
    }
}

fn load_config(path: &Path) -> Result<OrchestratorConfig> {
    let mut config = OrchestratorConfig::load(path)
        .with_context(|| format!("failed to load config {}", path.display()))?;
    config
        .apply_process_env()
        .context("invalid environment override")?;
    Ok(config)
}

/// Tested catalog, optional supported catalog, and the plan built from the tested one.
#[derive(Debug)]
struct LoadedMatrix {
    tested: VersionCatalog,
    supported: Option<VersionCatalog>,
    plan: VerificationPlan,
}

/// Every configuration-time check runs here, before any task exists.
fn load_matrix(config: &OrchestratorConfig) -> Result<LoadedMatrix> {
    let raw = std::fs::read_to_string(&config.catalog)
        .with_context(|| format!("failed to read catalog {}", config.catalog.display()))?;
    let document = CatalogDocument::parse(&raw).context("failed to parse catalog")?;

    let tested = VersionCatalog::from_document(&document, &config.tested_matrix)?;
    let supported = config
        .supported_matrix
        .as_deref()
        .map(|name| VersionCatalog::from_document(&document, name))
        .transpose()?;

    let latest = config.latest_known_version()?;
    match &supported {
        Some(supported) => check_matrices_agree(&tested, supported, &latest)?,
        None => tested.validate_against_latest_known(&latest)?,
    }

    let generator = config.generator(|key| std::env::var(key).ok());
    let plan = VerificationPlan::generate(&generator, &tested)?;
    info!(
        matrix = %tested.matrix_name(),
        tasks = plan.specs().len(),
        "verification plan ready"
    );
    Ok(LoadedMatrix {
        tested,
        supported,
        plan,
    })
}

fn cmd_matrix(config: &OrchestratorConfig, github_output: Option<&Path>) -> Result<()> {
    let loaded = load_matrix(config)?;
    match export_ci_matrix(&loaded.plan.ci_matrix(), github_output)? {
        MatrixSink::GithubOutput(path) => println!("Matrix written to {}", path.display()),
        MatrixSink::Stdout(json) => println!("{}", json),
    }
    Ok(())
}

fn cmd_versions(
    config: &OrchestratorConfig,
    version: Option<&str>,
    version_file: &Path,
    output: &Path,
) -> Result<()> {
    let component_version = match version {
        Some(v) => v.trim().to_string(),
        None => read_trimmed(version_file)?,
    };
    let loaded = load_matrix(config)?;
    let catalog = loaded.supported.as_ref().unwrap_or(&loaded.tested);
    write_versions_manifest(output, &VersionsManifest::new(&component_version, catalog))?;
    println!(
        "Wrote {} ({} supported versions)",
        output.display(),
        catalog.len()
    );
    Ok(())
}

/// One finished verification run.
struct VerificationRun {
    report: VerificationReport,
    gate: GateResult,
    /// Fewer tasks ran than the full plan holds.
    partial: bool,
}

async fn run_verification(
    config: &OrchestratorConfig,
    only: &[String],
    component_version: Option<&str>,
) -> Result<VerificationRun> {
    let loaded = load_matrix(config)?;
    let full_len = loaded.plan.specs().len();
    let plan = if only.is_empty() {
        loaded.plan
    } else {
        let known = loaded.plan.task_names();
        if let Some(unknown) = only.iter().find(|name| !known.contains(&name.as_str())) {
            bail!("unknown verification task: {}", unknown);
        }
        let specs = loaded
            .plan
            .specs()
            .iter()
            .filter(|spec| only.contains(&spec.name))
            .cloned()
            .collect();
        VerificationPlan::build(specs)?
    };

    if config.command.is_empty() {
        bail!("no verification command configured (set \"command\" in the config file)");
    }

    let mut executor = CommandExecutor::from_config(config);
    if let Some(version) = component_version {
        executor = executor.with_component_version(version);
    }
    let runner = MatrixRunner::new(Arc::new(executor), RunnerOptions::from_config(config));
    let report = runner.run(&plan).await;
    let gate = plan.gate(&report.outcomes())?;
    obs::emit_gate_evaluated(gate.total, gate.passed, &gate.failing_tasks());
    Ok(VerificationRun {
        partial: plan.specs().len() < full_len,
        report,
        gate,
    })
}

async fn cmd_verify(
    config: &OrchestratorConfig,
    report_dir: &Path,
    only: &[String],
    component_version: Option<&str>,
) -> Result<GateResult> {
    let VerificationRun {
        report,
        gate,
        partial,
    } = run_verification(config, only, component_version).await?;

    println!("Run ID: {}", report.run_id);
    println!("Duration: {}ms", report.duration_ms);
    println!();
    for result in &report.results {
        let status = if result.outcome.is_pass() { "✓" } else { "✗" };
        println!(
            "  {} {} ({} on {}, {} attempt(s), {}ms)",
            status,
            result.task,
            result.version,
            result.toolchain,
            result.attempts,
            result.duration_ms
        );
    }
    println!();

    std::fs::create_dir_all(report_dir)
        .with_context(|| format!("failed to create {}", report_dir.display()))?;
    write_report_json(
        &report_dir.join("verification.json"),
        &report.summary(gate.clone()).with_partial(partial),
    )?;
    let mut markdown = render_gate_report_md(&gate);
    if partial {
        markdown.push_str("\nPartial run (`--only`): this report cannot gate a release.\n");
    }
    write_markdown(&report_dir.join("gate.md"), &markdown)?;
    print!("{}", markdown);

    Ok(gate)
}

fn read_verification_summary(path: &Path) -> Result<VerificationSummaryArtifact> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read gate report {}", path.display()))?;
    serde_json::from_str(&raw).context("failed to parse gate report")
}

/// Re-evaluate a saved run against the current plan.
///
/// Plan tasks missing from the saved outcomes count as failed.
fn gate_from_report(config: &OrchestratorConfig, path: &Path) -> Result<GateResult> {
    let summary = read_verification_summary(path)?;
    if summary.partial {
        bail!(
            "gate report {} comes from a partial run (--only); verify the full matrix first",
            path.display()
        );
    }
    let loaded = load_matrix(config)?;
    let gate = loaded.plan.gate(&summary.outcomes)?;
    if gate.is_pass() != summary.gate.is_pass() {
        warn!(
            run_id = %summary.run_id,
            recorded = summary.gate.is_pass(),
            current = gate.is_pass(),
            "saved gate verdict differs from the current plan"
        );
    }
    obs::emit_gate_evaluated(gate.total, gate.passed, &gate.failing_tasks());
    Ok(gate)
}

fn build_descriptor(args: &ReleaseArgs) -> Result<ReleaseDescriptor> {
    let version = match &args.version {
        Some(v) => v.clone(),
        None => read_trimmed(&args.version_file)?,
    };
    let notes = std::fs::read_to_string(&args.notes)
        .with_context(|| format!("failed to read release notes {}", args.notes.display()))?;
    let mut descriptor = ReleaseDescriptor::new(&version, notes.trim_end(), Some(&args.target))?;
    if args.overwrite {
        descriptor = descriptor.with_overwrite(args.overwrite_reason.clone().unwrap_or_default())?;
    }
    Ok(descriptor)
}

async fn cmd_release(config: &OrchestratorConfig, args: ReleaseArgs) -> Result<()> {
    let descriptor = build_descriptor(&args)?;

    let gate = match &args.gate_report {
        Some(path) => gate_from_report(config, path)?,
        None => cmd_verify(config, &args.report_dir, &[], Some(&descriptor.version)).await?,
    };

    let mut tags = SystemGitTagStore::new(&args.repo);
    if let Some(remote) = &args.push {
        tags = tags.with_remote(remote.clone());
    }
    let requested = if args.publish_only {
        RequestedStages::PublishOnly
    } else {
        RequestedStages::TagAndAnnounce
    };

    let pipeline = ReleasePipeline::new(
        ReleaseCollaborators {
            artifacts: Arc::new(LocalRepository::new(&args.staging_dir)),
            signer: Arc::new(GpgSigner::default()),
            credentials: Arc::new(EnvCredentialProvider),
            tags: Arc::new(tags),
            registry: Arc::new(JsonFileReleaseRegistry::new(&args.registry_dir)),
        },
        requested,
        args.artifacts.clone(),
        &args.signature_dir,
    )?;

    let report = pipeline.run(&gate, &descriptor).await?;

    std::fs::create_dir_all(&args.report_dir)
        .with_context(|| format!("failed to create {}", args.report_dir.display()))?;
    write_report_json(&args.report_dir.join("release.json"), &report)?;
    let markdown = render_release_report_md(&report);
    write_markdown(&args.report_dir.join("release.md"), &markdown)?;
    print!("{}", markdown);

    match &report.first_failure {
        Some(failure) => bail!(
            "release {} halted at {}: {}",
            report.tag_name,
            failure.stage,
            failure.cause.as_deref().unwrap_or("unknown cause")
        ),
        None => Ok(()),
    }
}

async fn cmd_tags(name: &str, repo: &Path, registry_dir: &Path) -> Result<()> {
    let tags = SystemGitTagStore::new(repo);
    match tags.get(name).await? {
        Some(tag) => println!("{} -> {}", tag.name, tag.target),
        None => println!("No tag named {}", name),
    }

    let registry = JsonFileReleaseRegistry::new(registry_dir);
    let history = registry.history(name).await?;
    if history.is_empty() {
        println!("No announcements for {}", name);
        return Ok(());
    }
    for record in history {
        println!(
            "{} revision {} {} @ {}",
            record.created_at.to_rfc3339(),
            record.revision,
            record.announcement.version,
            record.announcement.target_commitish
        );
    }
    Ok(())
}

/// Explicit version, else the version file when it exists.
fn component_version(version: Option<&str>, version_file: &Path) -> Result<Option<String>> {
    match version {
        Some(v) => Ok(Some(v.trim().to_string())),
        None if version_file.exists() => read_trimmed(version_file).map(Some),
        None => Ok(None),
    }
}

fn read_trimmed(path: &Path) -> Result<String> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(raw.trim().to_string())
}
