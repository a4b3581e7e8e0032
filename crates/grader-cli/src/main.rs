//! Submission grader CLI
//!
//! The `grader` command drives the grading engine from the shell.
//!
//! ## Commands
//!
//! - `run`: grade a batch of submissions described by a JSON manifest
//! - `env`: build, rebuild or remove an environment image
//! - `attachments`: manage the files shared with every submission of a course

mod manifest;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use grader_core::{
    CourseId, Environment, EnvironmentStatus, GraderConfig, MemoryAssignmentStore,
    MemorySubmissionStore, NewSubmission, RuleBook, StorageLayout, Submission, SubmissionStatus,
};
use grader_pipeline::{GradingContext, Orchestrator, PipelineSettings, RulePipeline};
use grader_sandbox::{CliRuntime, ContainerRuntime, EnvironmentBuilder};
use grader_sources::StrategyAcquirer;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};

use crate::manifest::{Manifest, SubmissionSpec};

#[derive(Parser)]
#[command(name = "grader")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Build and test student submissions in isolated containers", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Media root holding courses, submissions and temporary uploads
    #[arg(long, global = true, env = "GRADER_MEDIA_ROOT")]
    media_root: Option<PathBuf>,

    /// Media root as seen by the container host
    #[arg(long, global = true, env = "GRADER_HOST_MEDIA_ROOT")]
    host_media_root: Option<PathBuf>,

    /// Container runtime binary (docker, podman)
    #[arg(long, global = true, env = "GRADER_CONTAINER_BINARY")]
    container_binary: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Grade every submission listed in a manifest
    Run {
        /// Path to the JSON manifest
        #[arg(short, long)]
        manifest: PathBuf,

        /// Number of concurrent workers
        #[arg(short, long, env = "GRADER_WORKERS")]
        workers: Option<usize>,

        /// Write the graded submissions here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Manage environment images
    Env {
        #[command(subcommand)]
        action: EnvAction,
    },

    /// Manage course attachments
    Attachments {
        #[command(subcommand)]
        action: AttachmentAction,
    },
}

#[derive(Subcommand)]
enum EnvAction {
    /// Build an image from a Dockerfile
    Build {
        /// Image tag
        #[arg(short, long)]
        tag: String,

        /// Path to the Dockerfile
        #[arg(short, long)]
        dockerfile: PathBuf,
    },

    /// Remove the image, then build it again
    Rebuild {
        /// Image tag
        #[arg(short, long)]
        tag: String,

        /// Path to the Dockerfile
        #[arg(short, long)]
        dockerfile: PathBuf,
    },

    /// Remove an image
    Remove {
        /// Image tag
        tag: String,
    },
}

#[derive(Subcommand)]
enum AttachmentAction {
    /// Copy files into the course attachments directory
    Add {
        /// Course the attachments belong to
        #[arg(short, long)]
        course: u64,

        /// Files to attach
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// List the course attachments
    List {
        /// Course to list
        #[arg(short, long)]
        course: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    grader_core::init_tracing(cli.json, level);

    let config = build_config(&cli);
    config.validate().context("Invalid grader configuration")?;

    match cli.command {
        Commands::Run {
            manifest,
            workers,
            output,
        } => {
            let config = match workers {
                Some(workers) => config.with_workers(workers),
                None => config,
            };
            cmd_run(&config, &manifest, output.as_deref()).await
        }
        Commands::Env { action } => match action {
            EnvAction::Build { tag, dockerfile } => {
                cmd_env_build(&config, &tag, &dockerfile, false).await
            }
            EnvAction::Rebuild { tag, dockerfile } => {
                cmd_env_build(&config, &tag, &dockerfile, true).await
            }
            EnvAction::Remove { tag } => cmd_env_remove(&config, &tag).await,
        },
        Commands::Attachments { action } => match action {
            AttachmentAction::Add { course, files } => {
                cmd_attachments_add(&config, CourseId(course), &files)
            }
            AttachmentAction::List { course } => cmd_attachments_list(&config, CourseId(course)),
        },
    }
}

/// Environment defaults with the global flags layered on top.
fn build_config(cli: &Cli) -> GraderConfig {
    let mut config = GraderConfig::from_env();
    if let Some(media_root) = &cli.media_root {
        config = config.with_media_root(media_root);
    }
    if let Some(host_media_root) = &cli.host_media_root {
        config = config.with_host_media_root(host_media_root);
    }
    if let Some(binary) = &cli.container_binary {
        config = config.with_container_binary(binary);
    }
    config
}

fn container_runtime(config: &GraderConfig) -> Arc<dyn ContainerRuntime> {
    Arc::new(CliRuntime::new(config.container_binary.as_str()))
}

#[derive(Serialize)]
struct RunSummary {
    performed: usize,
    failed: usize,
    submissions: Vec<Submission>,
}

/// Grade a manifest's submissions through the orchestrator
async fn cmd_run(config: &GraderConfig, manifest_path: &Path, output: Option<&Path>) -> Result<()> {
    let manifest = Manifest::load(manifest_path)?;
    let layout = config.layout();

    let assignments = Arc::new(MemoryAssignmentStore::new());
    assignments.insert(manifest.assignment());

    let rules = Arc::new(RuleBook::new());
    for new_rule in manifest.new_rules() {
        let title = new_rule.title.clone();
        rules
            .create(new_rule)
            .with_context(|| format!("Invalid rule '{}'", title))?;
    }

    let submissions = Arc::new(MemorySubmissionStore::new());
    let acquirer = StrategyAcquirer::new(layout.clone(), config.http_timeout())
        .context("Failed to build HTTP client")?;
    let pipeline = RulePipeline::with_settings(
        container_runtime(config),
        PipelineSettings::default().with_exec_grace(config.exec_grace()),
    );

    let context = GradingContext {
        submissions: submissions.clone(),
        assignments,
        rules,
        acquirer: Arc::new(acquirer),
        pipeline: Arc::new(pipeline),
        layout: layout.clone(),
    };
    // Stage every upload first: bailing out once workers hold containers
    // would leave them behind.
    let pending = prepare_submissions(&manifest, &layout)?;

    let orchestrator =
        Orchestrator::start(context, config.workers).context("Failed to start workers")?;
    let queued = queue_all(&orchestrator, pending).await;
    orchestrator.shutdown().await;
    queued?;

    let graded = submissions.all();
    let summary = RunSummary {
        performed: graded
            .iter()
            .filter(|s| s.status == SubmissionStatus::Performed)
            .count(),
        failed: graded
            .iter()
            .filter(|s| s.status == SubmissionStatus::Failed)
            .count(),
        submissions: graded,
    };
    let json = serde_json::to_string_pretty(&summary)?;

    match output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!(
                "{} performed, {} failed; results written to {}",
                summary.performed,
                summary.failed,
                path.display()
            );
        }
        None => println!("{}", json),
    }

    Ok(())
}

/// Turn manifest entries into submissions, staging uploads on the media root.
fn prepare_submissions(manifest: &Manifest, layout: &StorageLayout) -> Result<Vec<NewSubmission>> {
    let assignment_id = manifest.assignment.id;
    manifest
        .submissions
        .iter()
        .map(|spec| match spec {
            SubmissionSpec::Upload { user_id, upload } => {
                let filename = upload
                    .file_name()
                    .and_then(|name| name.to_str())
                    .with_context(|| format!("Upload path has no file name: {}", upload.display()))?;
                let data = std::fs::read(upload)
                    .with_context(|| format!("Failed to read upload {}", upload.display()))?;
                let source_ref = layout
                    .stage_upload(filename, &data)
                    .with_context(|| format!("Failed to stage upload {}", upload.display()))?;
                Ok(NewSubmission::uploaded(assignment_id, *user_id, &source_ref))
            }
            SubmissionSpec::Repository {
                user_id,
                repo_url,
                branch,
            } => Ok(NewSubmission::repository(
                assignment_id,
                *user_id,
                repo_url,
                branch,
            )),
        })
        .collect()
}

async fn queue_all(orchestrator: &Orchestrator, pending: Vec<NewSubmission>) -> Result<()> {
    for new in pending {
        let submission = orchestrator
            .submit(new)
            .await
            .context("Failed to queue submission")?;
        info!(submission_id = %submission.id, user_id = %submission.user_id, "Queued");
    }
    Ok(())
}

/// Build (or rebuild) an environment image
async fn cmd_env_build(
    config: &GraderConfig,
    tag: &str,
    dockerfile: &Path,
    rebuild: bool,
) -> Result<()> {
    let content = std::fs::read_to_string(dockerfile)
        .with_context(|| format!("Failed to read {}", dockerfile.display()))?;
    let mut env = Environment::new(tag, &content);
    let builder = EnvironmentBuilder::new(container_runtime(config));

    let report = if rebuild {
        builder.rebuild(&mut env).await
    } else {
        builder.build(&mut env).await
    }
    .with_context(|| format!("Failed to run image build for '{}'", tag))?;

    if !report.output.trim().is_empty() {
        println!("{}", report.output.trim_end());
    }
    match report.status {
        EnvironmentStatus::Created => {
            println!("Environment '{}' created", tag);
            Ok(())
        }
        _ => anyhow::bail!(
            "Environment '{}' failed to build (exit code {})",
            tag,
            report.exit_code
        ),
    }
}

/// Remove an environment image
async fn cmd_env_remove(config: &GraderConfig, tag: &str) -> Result<()> {
    let builder = EnvironmentBuilder::new(container_runtime(config));
    let removed = builder
        .remove(tag)
        .await
        .with_context(|| format!("Failed to remove image '{}'", tag))?;

    if removed {
        println!("Removed environment '{}'", tag);
    } else {
        println!("Environment '{}' was not removed", tag);
    }
    Ok(())
}

fn cmd_attachments_add(config: &GraderConfig, course: CourseId, files: &[PathBuf]) -> Result<()> {
    let layout = config.layout();
    for file in files {
        let name = file
            .file_name()
            .and_then(|name| name.to_str())
            .with_context(|| format!("Not a file: {}", file.display()))?;
        let data =
            std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
        let path = layout
            .store_attachment(course, name, &data)
            .with_context(|| format!("Failed to store attachment '{}'", name))?;
        println!("Attached {} -> {}", name, path.display());
    }
    Ok(())
}

fn cmd_attachments_list(config: &GraderConfig, course: CourseId) -> Result<()> {
    let names = config
        .layout()
        .list_attachments(course)
        .context("Failed to list attachments")?;

    if names.is_empty() {
        println!("No attachments for course {}", course);
        return Ok(());
    }
    for name in names {
        println!("{}", name);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_flags_override_config() {
        let cli = Cli::try_parse_from([
            "grader",
            "--media-root",
            "/srv/media",
            "--container-binary",
            "podman",
            "attachments",
            "list",
            "--course",
            "3",
        ])
        .unwrap();

        let config = build_config(&cli);
        assert_eq!(config.media_root, PathBuf::from("/srv/media"));
        assert_eq!(config.container_binary, "podman");
        assert!(matches!(
            cli.command,
            Commands::Attachments {
                action: AttachmentAction::List { course: 3 }
            }
        ));
    }

    #[test]
    fn test_attachments_add_then_list() {
        let media = tempfile::tempdir().unwrap();
        let files = tempfile::tempdir().unwrap();
        let makefile = files.path().join("Makefile");
        std::fs::write(&makefile, "all:\n\tgcc main.c\n").unwrap();

        let config = GraderConfig::from_env().with_media_root(media.path());
        cmd_attachments_add(&config, CourseId(4), &[makefile]).unwrap();

        assert_eq!(
            config.layout().list_attachments(CourseId(4)).unwrap(),
            vec!["Makefile".to_string()]
        );
    }

    fn write_manifest(dir: &Path, uploads: &[&str]) -> PathBuf {
        let submissions: Vec<String> = uploads
            .iter()
            .enumerate()
            .map(|(i, upload)| format!(r#"{{ "user_id": {}, "upload": "{}" }}"#, i + 1, upload))
            .collect();
        let json = format!(
            r#"{{
                "course_id": 3,
                "assignment": {{ "id": 5, "title": "Lab 1", "environment_tag": "gcc" }},
                "rules": [{{ "title": "compile", "command": "make" }}],
                "submissions": [{}]
            }}"#,
            submissions.join(", ")
        );
        let path = dir.join("manifest.json");
        std::fs::write(&path, json).unwrap();
        path
    }

    #[test]
    fn test_prepare_stages_every_upload() {
        let media = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        std::fs::write(work.path().join("alice.c"), "int main(){}").unwrap();
        std::fs::write(work.path().join("bob.c"), "int main(){return 1;}").unwrap();

        let manifest = Manifest::load(&write_manifest(work.path(), &["alice.c", "bob.c"])).unwrap();
        let pending = prepare_submissions(&manifest, &StorageLayout::new(media.path())).unwrap();

        assert_eq!(pending.len(), 2);
        for new in &pending {
            let source_ref = new.uploaded_source_ref.as_deref().unwrap();
            assert!(source_ref.starts_with("tmp/tmp_"), "{source_ref}");
            assert!(media.path().join(source_ref).exists());
        }
    }

    #[tokio::test]
    async fn test_run_rejects_missing_upload_before_grading() {
        let media = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        std::fs::write(work.path().join("alice.c"), "int main(){}").unwrap();
        let manifest = write_manifest(work.path(), &["alice.c", "missing.c"]);

        // No container runtime exists here; the run must fail before needing one.
        let config = GraderConfig::from_env()
            .with_media_root(media.path())
            .with_container_binary("/nonexistent/docker");
        let err = cmd_run(&config, &manifest, None).await.unwrap_err();

        let message = format!("{err:#}");
        assert!(message.contains("Failed to read upload"), "{message}");
        assert!(message.contains("missing.c"), "{message}");
    }
}
