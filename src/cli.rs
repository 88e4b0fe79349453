//! Command-line surface.
//!
//! Every command runs against a JSON repository snapshot. Commands that
//! change repository state (status labels, index timestamps) write the
//! snapshot back when they finish.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tracing::info;

use crate::admin::{Accepted, AdminApi};
use crate::commands::{CommandEngine, ReindexHook, SetExternalStatusCommand, User};
use crate::config::IndexerConfig;
use crate::daemon::worker::{JobReport, JobResult, ReindexWorker, ReindexWorkerHandle};
use crate::indexer::Indexer;
use crate::logging::init_tracing;
use crate::remediation::RemediationLog;
use crate::repository::MemoryRepository;
use crate::search::client::SolrClient;

#[derive(Parser, Debug)]
#[command(
    name = "repo-index",
    version,
    about = "Keep the search index in step with the repository"
)]
pub struct Cli {
    /// Config file (defaults to $XDG_CONFIG_HOME/repo-index/config.toml)
    #[arg(long, global = true, env = "REPO_INDEX_CONFIG")]
    pub config: Option<PathBuf>,

    /// Repository snapshot (JSON)
    #[arg(long, env = "REPO_INDEX_SNAPSHOT")]
    pub snapshot: PathBuf,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Seconds to wait for a queued job before giving up
    #[arg(long, global = true, default_value_t = 3600)]
    pub wait_secs: u64,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Clear the index and rebuild it from the repository
    ReindexAll,
    /// Reindex one record and its files
    ReindexRecord {
        #[arg(long, conflicts_with = "pid", required_unless_present = "pid")]
        id: Option<i64>,
        /// Persistent identifier, e.g. doi:10.5072/FK2/ABC123
        #[arg(long)]
        pid: Option<String>,
    },
    /// Reindex one container
    ReindexContainer {
        #[arg(long)]
        id: i64,
    },
    /// Print the documents a record reindex would write
    PreviewRecord {
        #[arg(long)]
        id: i64,
    },
    /// Print the document a container reindex would write
    PreviewContainer {
        #[arg(long)]
        id: i64,
    },
    /// Set the curation status label on a record's draft
    SetStatus {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        label: String,
        #[arg(long)]
        user: String,
    },
}

struct Runtime {
    repo: Arc<MemoryRepository>,
    indexer: Indexer,
    remediation: Arc<RemediationLog>,
    worker: ReindexWorkerHandle,
    wait: Duration,
    json: bool,
}

impl Runtime {
    fn wait_for(&self, ticket: crate::daemon::worker::JobTicket) -> anyhow::Result<JobReport> {
        let job = ticket.job().to_string();
        ticket
            .wait_timeout(self.wait)
            .with_context(|| format!("{job} did not finish within {:?}", self.wait))
    }

    fn finish(&self, accepted: Accepted) -> anyhow::Result<()> {
        if !self.json {
            println!("{}", accepted.message);
        }
        let report = self.wait_for(accepted.ticket)?;
        self.print_report(&report)?;
        match &report.result {
            Ok(_) => Ok(()),
            Err(e) => bail!("{} failed after {} attempt(s): {e}", report.job, report.attempts),
        }
    }

    fn print_report(&self, report: &JobReport) -> anyhow::Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(report)?);
            return Ok(());
        }
        match &report.result {
            Ok(JobResult::Full(summary)) => {
                println!("{summary}");
                for failure in &summary.failures {
                    let entity = failure
                        .entity
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| failure.kind.to_string());
                    println!("  failed {entity} while {}: {}", failure.during, failure.error);
                }
            }
            Ok(JobResult::Entity(outcome)) => {
                println!("indexed {} ({} documents)", outcome.entity, outcome.documents.len());
            }
            Err(_) => {}
        }
        Ok(())
    }
}

pub fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => IndexerConfig::load_from(path),
        None => IndexerConfig::load(),
    }
    .map_err(|e| anyhow::anyhow!("{e}\n{}", e.help_message()))?;
    let _guard = init_tracing(&config.logging)?;

    let repo = Arc::new(
        MemoryRepository::load(&cli.snapshot)
            .with_context(|| format!("loading snapshot {}", cli.snapshot.display()))?,
    );
    let client = Arc::new(SolrClient::new(&config.solr_settings())?);
    let indexer = Indexer::new(repo.clone(), client, config.indexer_options());
    let remediation = Arc::new(RemediationLog::file(config.remediation_log_path()));
    let worker =
        ReindexWorker::start(indexer.clone(), remediation.clone(), config.worker_config())?;

    let rt = Runtime {
        repo,
        indexer,
        remediation,
        worker,
        wait: Duration::from_secs(cli.wait_secs),
        json: cli.json,
    };
    let result = dispatch(&rt, &cli);
    rt.worker.shutdown();
    result?;

    if mutates(&cli.command) {
        rt.repo.save(&cli.snapshot)?;
        info!(path = %cli.snapshot.display(), "snapshot written");
    }
    Ok(())
}

fn mutates(command: &Commands) -> bool {
    matches!(
        command,
        Commands::ReindexAll | Commands::ReindexRecord { .. } | Commands::SetStatus { .. }
    )
}

fn dispatch(rt: &Runtime, cli: &Cli) -> anyhow::Result<()> {
    let admin = AdminApi::new(rt.repo.clone(), rt.worker.clone());
    let admin_err = |e: crate::admin::AdminError| anyhow::anyhow!("{e}\n{}", e.help_message());

    match &cli.command {
        Commands::ReindexAll => rt.finish(admin.trigger_full_reindex().map_err(admin_err)?),
        Commands::ReindexRecord { id, pid } => {
            let accepted = match (id, pid) {
                (_, Some(pid)) => admin.trigger_record_reindex(pid),
                (Some(id), None) => admin.trigger_record_reindex_by_id(*id),
                (None, None) => bail!("either --id or --pid is required"),
            }
            .map_err(admin_err)?;
            rt.finish(accepted)
        }
        Commands::ReindexContainer { id } => {
            rt.finish(admin.trigger_container_reindex(*id).map_err(admin_err)?)
        }
        Commands::PreviewRecord { id } => {
            let docs = rt
                .indexer
                .preview_record(*id)
                .map_err(|e| anyhow::anyhow!("{e}\n{}", e.help_message()))?;
            let json: Vec<_> = docs.iter().map(|d| d.to_json()).collect();
            println!("{}", serde_json::to_string_pretty(&json)?);
            Ok(())
        }
        Commands::PreviewContainer { id } => {
            let doc = rt
                .indexer
                .preview_container(*id)
                .map_err(|e| anyhow::anyhow!("{e}\n{}", e.help_message()))?;
            println!("{}", serde_json::to_string_pretty(&doc.to_json())?);
            Ok(())
        }
        Commands::SetStatus { id, label, user } => {
            let engine = CommandEngine::new(
                rt.repo.clone(),
                ReindexHook::new(rt.worker.clone(), rt.remediation.clone()),
            );
            let outcome = engine
                .submit(&User::superuser(user), &SetExternalStatusCommand::new(*id, label))
                .map_err(|e| anyhow::anyhow!("{e}\n{}", e.help_message()))?;
            if !rt.json {
                println!("record {id} status set to {label:?}");
            }
            if !outcome.index_dispatched {
                eprintln!("reindex could not be dispatched; see the remediation log");
            }
            for ticket in outcome.tickets {
                let report = rt.wait_for(ticket)?;
                rt.print_report(&report)?;
                if !report.succeeded() {
                    eprintln!("status saved, but reindex failed; see the remediation log");
                }
            }
            Ok(())
        }
    }
}
