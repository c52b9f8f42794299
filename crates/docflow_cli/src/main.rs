//! `docflow` — operator CLI for the approval engine.
//!
//! A thin binary over the library crates, in the shape of an ambient
//! operator surface rather than a graphical panel. It exercises every
//! public approval-engine operation for manual use, scripting, and smoke
//! testing against a real filesystem root.

mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docflow_core::{with_retry, ApprovalEngine, ListFilter, SortKey};
use docflow_fs::Resolver;
use docflow_identity::{FileIdentityProvider, IdentityProvider};
use docflow_ids::{NotificationId, SubmissionId};
use docflow_protocol::{IdentitySource, SubmissionState, SystemConfig};
use docflow_store::{DocPath, DocStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "docflow", about = "Operator CLI for the docflow approval engine")]
struct Cli {
    /// Enable verbose logging (debug to stderr as well as the log file)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Allow state-changing operations against the local fallback root when
    /// the network root is unreachable (degraded mode).
    #[arg(long, global = true)]
    allow_local_fallback_writes: bool,

    /// Bound the command's total wall-clock time, including retries. With no
    /// value, an operation retries transient failures but never times out on
    /// its own.
    #[arg(long, global = true)]
    deadline_seconds: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Submit a file for approval.
    Submit {
        /// Username of the submitter.
        #[arg(long)]
        actor: String,
        /// Path to the file to submit (read for its size; not moved yet).
        #[arg(long)]
        file: PathBuf,
        /// Free-form description.
        #[arg(long, default_value = "")]
        description: String,
        /// Comma-separated tags.
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,
    },
    /// Withdraw your own pending submission.
    Withdraw {
        #[arg(long)]
        actor: String,
        #[arg(long)]
        id: String,
    },
    /// Team-leader approval, advancing to PENDING_ADMIN.
    TlApprove {
        #[arg(long)]
        actor: String,
        #[arg(long)]
        id: String,
    },
    /// Team-leader rejection, a terminal state.
    TlReject {
        #[arg(long)]
        actor: String,
        #[arg(long)]
        id: String,
        #[arg(long)]
        reason: String,
    },
    /// Administrator approval: triggers file placement and archival.
    AdminApprove {
        #[arg(long)]
        actor: String,
        #[arg(long)]
        id: String,
    },
    /// Administrator rejection, a terminal state.
    AdminReject {
        #[arg(long)]
        actor: String,
        #[arg(long)]
        id: String,
        #[arg(long)]
        reason: String,
    },
    /// Add a comment to a submission's thread.
    Comment {
        #[arg(long)]
        actor: String,
        #[arg(long)]
        id: String,
        #[arg(long)]
        body: String,
    },
    /// List a submission's comment thread.
    Comments {
        #[arg(long)]
        actor: String,
        #[arg(long)]
        id: String,
    },
    /// List submissions visible to `actor`, optionally filtered.
    List {
        #[arg(long)]
        actor: String,
        #[arg(long)]
        state: Option<String>,
        #[arg(long)]
        team: Option<String>,
        #[arg(long)]
        submitter: Option<String>,
        #[arg(long)]
        text: Option<String>,
        /// Sort oldest-submitted-first instead of the default newest-first.
        #[arg(long)]
        oldest_first: bool,
    },
    /// Show a user's notification inbox.
    Inbox {
        #[arg(long)]
        actor: String,
        #[arg(long)]
        unread_only: bool,
    },
    /// Mark a notification as read.
    MarkRead {
        #[arg(long)]
        actor: String,
        #[arg(long)]
        id: String,
    },
    /// Run one placement-retry sweep and exit.
    RetryPlacements,
    /// Run the placement retrier in the foreground until interrupted.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    docflow_logging::init_logging(docflow_logging::LogConfig {
        app_name: "docflow",
        verbose: cli.verbose,
    })
    .context("failed to initialize logging")?;

    let config = SystemConfig::from_env().context("failed to load configuration from environment")?;
    let retry_interval = config.retry_interval;
    let archive_cap = config.archive_cap;
    let identity = build_identity_provider(&config.identity_source);
    let resolver = Arc::new(Resolver::new(config));
    if resolver.degraded() {
        tracing::warn!("network root unreachable at startup; serving in degraded mode");
    }

    let engine = Arc::new(ApprovalEngine::new(
        resolver,
        identity,
        archive_cap,
        cli.allow_local_fallback_writes,
    ));

    let deadline = cli.deadline_seconds.map(|secs| Instant::now() + Duration::from_secs(secs));
    run_command(cli.command, &engine, retry_interval, deadline).await
}

fn build_identity_provider(source: &IdentitySource) -> Arc<dyn IdentityProvider> {
    match source {
        IdentitySource::File(path) => {
            let root = path.parent().unwrap_or_else(|| std::path::Path::new(".")).to_path_buf();
            let doc = DocPath::new(
                path.file_name()
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("roster.json")),
            );
            Arc::new(FileIdentityProvider::new(DocStore::new(root), doc))
        }
    }
}

async fn run_command(
    command: Commands,
    engine: &Arc<ApprovalEngine>,
    retry_interval: Duration,
    deadline: Option<Instant>,
) -> Result<()> {
    match command {
        Commands::Submit { actor, file, description, tags } => {
            let size_bytes = std::fs::metadata(&file)
                .with_context(|| format!("failed to stat {}", file.display()))?
                .len();
            let original_filename = file
                .file_name()
                .and_then(|n| n.to_str())
                .context("file path has no filename component")?
                .to_string();
            let submission = with_retry(deadline, || {
                let file = file.clone();
                let description = description.clone();
                let tags = tags.clone();
                async move {
                    engine
                        .submit(&actor, file, &original_filename, size_bytes, None, description, tags, deadline)
                        .await
                }
            })
            .await?;
            print_submission(&submission);
        }
        Commands::Withdraw { actor, id } => {
            let id = parse_submission_id(&id)?;
            let submission = with_retry(deadline, || engine.withdraw(&actor, &id, deadline)).await?;
            print_submission(&submission);
        }
        Commands::TlApprove { actor, id } => {
            let id = parse_submission_id(&id)?;
            let submission = with_retry(deadline, || engine.tl_approve(&actor, &id, deadline)).await?;
            print_submission(&submission);
        }
        Commands::TlReject { actor, id, reason } => {
            let id = parse_submission_id(&id)?;
            let submission = with_retry(deadline, || engine.tl_reject(&actor, &id, &reason, deadline)).await?;
            print_submission(&submission);
        }
        Commands::AdminApprove { actor, id } => {
            let id = parse_submission_id(&id)?;
            let submission = with_retry(deadline, || engine.admin_approve(&actor, &id, deadline)).await?;
            print_submission(&submission);
        }
        Commands::AdminReject { actor, id, reason } => {
            let id = parse_submission_id(&id)?;
            let submission = with_retry(deadline, || engine.admin_reject(&actor, &id, &reason, deadline)).await?;
            print_submission(&submission);
        }
        Commands::Comment { actor, id, body } => {
            let id = parse_submission_id(&id)?;
            let comment =
                with_retry(deadline, || async { engine.add_comment(&actor, &id, &body, deadline) }).await?;
            println!("comment {} recorded at {}", comment.id, comment.at.to_rfc3339());
        }
        Commands::Comments { actor, id } => {
            let id = parse_submission_id(&id)?;
            let comments =
                with_retry(deadline, || async { engine.list_comments(&actor, &id, deadline) }).await?;
            for c in comments {
                println!("[{}] {} ({}): {}", c.at.to_rfc3339(), c.author_username, c.author_role, c.body);
            }
        }
        Commands::List { actor, state, team, submitter, text, oldest_first } => {
            let filter = ListFilter {
                state: state.map(|s| parse_state(&s)).transpose()?,
                team,
                submitter,
                text,
                sort: if oldest_first { SortKey::SubmittedAtAsc } else { SortKey::SubmittedAtDesc },
            };
            let result = with_retry(deadline, || async { engine.list(&actor, &filter, deadline) }).await?;
            println!("{}", output::submissions_table(&result.submissions));
            println!("{} submission(s)", result.total);
        }
        Commands::Inbox { actor, unread_only } => {
            let notifications =
                with_retry(deadline, || async { engine.get_inbox(&actor, unread_only, deadline) }).await?;
            println!("{}", output::notifications_table(&notifications));
        }
        Commands::MarkRead { actor, id } => {
            let notification_id = NotificationId::from_trusted(id.clone());
            with_retry(deadline, || async { engine.mark_read(&actor, &notification_id, deadline) }).await?;
            println!("notification {id} marked read");
        }
        Commands::RetryPlacements => {
            let promoted = docflow_worker::run_sweep(engine);
            println!("promoted {} submission(s) to delivered", promoted.len());
        }
        Commands::Serve => {
            info!("starting placement retrier; press ctrl-c to stop");
            let handle = docflow_worker::spawn(engine.clone(), retry_interval);
            tokio::signal::ctrl_c().await.context("failed to wait for ctrl-c")?;
            handle.shutdown().await;
        }
    }
    Ok(())
}

fn parse_submission_id(raw: &str) -> Result<SubmissionId> {
    SubmissionId::parse(raw).map_err(|err| anyhow::anyhow!("invalid submission id {raw}: {err}"))
}

fn parse_state(raw: &str) -> Result<SubmissionState> {
    match raw.to_uppercase().as_str() {
        "DRAFT" => Ok(SubmissionState::Draft),
        "PENDING_TEAM_LEADER" => Ok(SubmissionState::PendingTeamLeader),
        "PENDING_ADMIN" => Ok(SubmissionState::PendingAdmin),
        "APPROVED" => Ok(SubmissionState::Approved),
        "REJECTED_BY_TEAM_LEADER" => Ok(SubmissionState::RejectedByTeamLeader),
        "REJECTED_BY_ADMIN" => Ok(SubmissionState::RejectedByAdmin),
        "WITHDRAWN" => Ok(SubmissionState::Withdrawn),
        other => anyhow::bail!("unrecognized state {other}"),
    }
}

fn print_submission(submission: &docflow_protocol::Submission) {
    println!("{}", output::submissions_table(std::slice::from_ref(submission)));
}
