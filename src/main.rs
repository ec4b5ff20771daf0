// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! coderev entry point: CLI, wiring, and the review command.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};

use coderev::cancel::CancelToken;
use coderev::config::{load_config, Config};
use coderev::error::Result;
use coderev::llm::{ClientFactory, ProviderKind};
use coderev::rag::RagService;
use coderev::review::{Orchestrator, ReviewOptions};
use coderev::store::{ReviewKind, ReviewRepo, SqliteStore, Store, WorkspaceRepo};
use coderev::telemetry::{init_telemetry, TelemetryConfig};
use coderev::tui::run_shell;
use coderev::vector::store::SqliteVectorStore;

/// coderev - local AI code review.
#[derive(Parser)]
#[command(name = "coderev")]
#[command(author, version, about = "Local AI code review", long_about = None)]
struct Cli {
    /// Provider to use for the review
    #[arg(short, long, env = "CODEREV_PROVIDER")]
    provider: Option<Provider>,

    /// Workspace root (defaults to the current directory)
    #[arg(short, long)]
    workspace: Option<PathBuf>,

    /// Database path override
    #[arg(long, env = "CODEREV_DB")]
    database: Option<PathBuf>,

    /// Show debug output
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Providers selectable from the CLI.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Provider {
    Claude,
    Gemini,
    Ollama,
}

impl From<Provider> for ProviderKind {
    fn from(value: Provider) -> Self {
        match value {
            Provider::Claude => ProviderKind::Claude,
            Provider::Gemini => ProviderKind::Gemini,
            Provider::Ollama => ProviderKind::Ollama,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Review a set of changed files
    Review {
        /// Files to review (as produced by your diff tool)
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Review staged changes (the default)
        #[arg(long, conflicts_with_all = ["commit", "branches"])]
        staged: bool,

        /// Review changes from a commit
        #[arg(long)]
        commit: Option<String>,

        /// Review changes between two branches: BASE HEAD
        #[arg(long, num_args = 2, value_names = ["BASE", "HEAD"])]
        branches: Option<Vec<String>>,

        /// Print results instead of opening the interactive shell
        #[arg(long)]
        no_shell: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let workspace_root = match cli.workspace {
        Some(path) => path,
        None => std::env::current_dir()?,
    };

    let mut config = load_config(&workspace_root)?;
    if let Some(path) = cli.database {
        config.database_path = Some(path);
    }

    let telemetry = if cli.debug {
        TelemetryConfig::verbose()
    } else {
        TelemetryConfig::from_log_settings(&config.log)
    };
    init_telemetry(&telemetry)?;

    match cli.command {
        Commands::Review {
            files,
            commit,
            branches,
            no_shell,
            ..
        } => {
            let kind = if commit.is_some() {
                ReviewKind::Commit
            } else if branches.is_some() {
                ReviewKind::Branch
            } else {
                ReviewKind::Staged
            };

            let (base_branch, head_branch) = match branches {
                Some(pair) => (pair.first().cloned(), pair.get(1).cloned()),
                None => (None, None),
            };

            let options = ReviewOptions {
                kind,
                commit_hash: commit,
                base_branch,
                head_branch,
                files,
                provider: cli.provider.map(Into::into),
            };

            run_review(&workspace_root, &config, options, no_shell).await
        }
    }
}

async fn run_review(
    workspace_root: &std::path::Path,
    config: &Config,
    options: ReviewOptions,
    no_shell: bool,
) -> Result<()> {
    let store = Arc::new(SqliteStore::open(&config.resolved_database_path())?);

    let name = workspace_root
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("workspace");
    let workspace = store.ensure_workspace(&workspace_root.to_string_lossy(), name)?;

    let factory = Arc::new(ClientFactory::from_config(config)?);
    let vectors = Arc::new(SqliteVectorStore::new(store.connection()));
    let embed_client = factory.client(options.provider)?;
    let rag = Arc::new(RagService::new(embed_client, vectors, config.rag.clone()));

    let cancel = CancelToken::new();
    let orchestrator = Orchestrator::new(
        store.clone() as Arc<dyn Store>,
        rag,
        factory,
        workspace,
        config.rag.clone(),
        cancel.clone(),
    )?;

    if no_shell {
        let outcome = orchestrator.run(options).await?;
        print_outcome(&outcome);
        return Ok(());
    }

    let ctrlc_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrlc_cancel.cancel();
        }
    });

    let outcome = run_shell(
        orchestrator,
        options,
        store.clone() as Arc<dyn ReviewRepo>,
        cancel,
    )
    .await?;

    if let Some(outcome) = outcome {
        print_outcome(&outcome);
    }
    Ok(())
}

fn print_outcome(outcome: &coderev::review::ReviewOutcome) {
    let summary = &outcome.summary;
    println!(
        "review {}: {} files, {} issues ({} critical, {} high, {} medium, {} low, {} info)",
        outcome.review.id,
        summary.files_reviewed,
        summary.total_issues,
        summary.critical,
        summary.high,
        summary.medium,
        summary.low,
        summary.info
    );

    for issue in &outcome.issues {
        let path = issue
            .metadata
            .as_ref()
            .and_then(|m| m.get("file_path"))
            .and_then(|v| v.as_str())
            .unwrap_or("?");
        println!(
            "  [{}] {} {}:{}-{} {}",
            issue.severity.as_str(),
            issue.issue_type.as_str(),
            path,
            issue.line_start,
            issue.line_end,
            issue.title
        );
    }
}
