//! Record mutations and their post-success reindex hook.
//!
//! A [`Command`] changes one record. [`CommandEngine::submit`] checks the
//! requester's permission, applies the change, persists it and only then
//! runs the command's `on_success` hook. The repository is authoritative:
//! once the record is saved the mutation has succeeded, and the hook's
//! outcome is reported next to it, never instead of it.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::daemon::worker::{JobTicket, ReindexJob, ReindexWorkerHandle};
use crate::model::{EntityRef, Record};
use crate::remediation::{RemediationEntry, RemediationLog};
use crate::repository::{Repository, RepositoryError};

/// ASCII word characters and spaces only.
static LABEL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_ ]+$").expect("label regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    EditRecord,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub name: String,
    #[serde(default)]
    pub permissions: HashSet<Permission>,
    #[serde(default)]
    pub superuser: bool,
}

impl User {
    pub fn new(name: impl Into<String>, permissions: impl IntoIterator<Item = Permission>) -> Self {
        Self {
            name: name.into(),
            permissions: permissions.into_iter().collect(),
            superuser: false,
        }
    }

    pub fn superuser(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            permissions: HashSet::new(),
            superuser: true,
        }
    }

    pub fn can(&self, permission: Permission) -> bool {
        self.superuser || self.permissions.contains(&permission)
    }
}

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("{0}")]
    IllegalState(String),

    #[error("invalid label {0:?}: only letters, digits, underscores and spaces are allowed")]
    InvalidLabel(String),

    #[error("user {user} lacks {permission:?} required by {command}")]
    PermissionDenied {
        user: String,
        command: &'static str,
        permission: Permission,
    },

    #[error("record {0} not found")]
    NotFound(i64),

    #[error("failed to persist record: {0}")]
    Persist(#[source] RepositoryError),
}

impl CommandError {
    pub fn help_message(&self) -> &'static str {
        match self {
            CommandError::IllegalState(_) => {
                "Create a new draft version before changing its status label."
            }
            CommandError::InvalidLabel(_) => "Remove punctuation from the label.",
            CommandError::PermissionDenied { .. } => "Ask an administrator for edit rights.",
            CommandError::NotFound(_) => "Check the record id.",
            CommandError::Persist(e) => e.help_message(),
        }
    }
}

/// Dispatches reindex jobs and records the ones that could not be queued.
#[derive(Clone)]
pub struct ReindexHook {
    worker: ReindexWorkerHandle,
    remediation: Arc<RemediationLog>,
}

impl ReindexHook {
    pub fn new(worker: ReindexWorkerHandle, remediation: Arc<RemediationLog>) -> Self {
        Self {
            worker,
            remediation,
        }
    }

    /// Queue a targeted record reindex. Returns `None` when dispatch failed;
    /// the failure is already in the remediation log.
    pub fn reindex_record(&self, record_id: i64, context: &str) -> Option<JobTicket> {
        match self.worker.submit(ReindexJob::record(record_id, context)) {
            Ok(ticket) => Some(ticket),
            Err(e) => {
                self.remediation.record(RemediationEntry::new(
                    EntityRef::record(record_id),
                    context,
                    e.to_string(),
                ));
                None
            }
        }
    }
}

/// What a command's `on_success` hook can reach.
pub struct CommandContext<'a> {
    pub user: &'a User,
    hook: &'a ReindexHook,
    tickets: Mutex<Vec<JobTicket>>,
}

impl<'a> CommandContext<'a> {
    fn new(user: &'a User, hook: &'a ReindexHook) -> Self {
        Self {
            user,
            hook,
            tickets: Mutex::new(Vec::new()),
        }
    }

    /// Fire-and-forget reindex of `record_id`; `false` if it was not dispatched.
    pub fn reindex_record(&self, record_id: i64, context: &str) -> bool {
        match self.hook.reindex_record(record_id, context) {
            Some(ticket) => {
                self.tickets.lock().push(ticket);
                true
            }
            None => false,
        }
    }

    fn into_tickets(self) -> Vec<JobTicket> {
        self.tickets.into_inner()
    }
}

pub trait Command {
    fn name(&self) -> &'static str;
    fn required_permission(&self) -> Permission;
    fn record_id(&self) -> i64;

    /// Apply the change in memory. Nothing is persisted if this fails.
    fn execute(&self, record: &mut Record) -> Result<(), CommandError>;

    /// Runs after the record has been persisted.
    fn on_success(&self, _ctx: &CommandContext<'_>, _record: &Record) -> bool {
        true
    }
}

#[derive(Debug)]
pub struct CommandOutcome {
    /// The record as persisted.
    pub record: Record,
    /// Result of the post-success hook.
    pub index_dispatched: bool,
    pub tickets: Vec<JobTicket>,
}

pub struct CommandEngine {
    repo: Arc<dyn Repository>,
    hook: ReindexHook,
}

impl CommandEngine {
    pub fn new(repo: Arc<dyn Repository>, hook: ReindexHook) -> Self {
        Self { repo, hook }
    }

    pub fn submit(
        &self,
        user: &User,
        command: &dyn Command,
    ) -> Result<CommandOutcome, CommandError> {
        let id = command.record_id();
        let mut record = self
            .repo
            .record(id)
            .map_err(CommandError::Persist)?
            .ok_or(CommandError::NotFound(id))?;

        let permission = command.required_permission();
        if !user.can(permission) {
            return Err(CommandError::PermissionDenied {
                user: user.name.clone(),
                command: command.name(),
                permission,
            });
        }

        command.execute(&mut record)?;

        let now = Utc::now();
        record.modification_time = Some(now);
        record.latest_version.last_update_time = Some(now);
        self.repo.save_record(&record).map_err(CommandError::Persist)?;
        info!(command = command.name(), record_id = id, user = %user.name, "command applied");

        let ctx = CommandContext::new(user, &self.hook);
        let index_dispatched = command.on_success(&ctx, &record);
        debug!(
            command = command.name(),
            record_id = id,
            index_dispatched,
            "post-success hook finished"
        );

        Ok(CommandOutcome {
            record,
            index_dispatched,
            tickets: ctx.into_tickets(),
        })
    }
}

/// Assigns a curation status label to a record's latest, unreleased version.
#[derive(Debug, Clone)]
pub struct SetExternalStatusCommand {
    pub record_id: i64,
    pub label: String,
}

impl SetExternalStatusCommand {
    pub fn new(record_id: i64, label: impl Into<String>) -> Self {
        Self {
            record_id,
            label: label.into(),
        }
    }
}

impl Command for SetExternalStatusCommand {
    fn name(&self) -> &'static str {
        "SetExternalStatusCommand"
    }

    fn required_permission(&self) -> Permission {
        Permission::EditRecord
    }

    fn record_id(&self) -> i64 {
        self.record_id
    }

    fn execute(&self, record: &mut Record) -> Result<(), CommandError> {
        if record.latest_version.is_released() {
            return Err(CommandError::IllegalState(
                "Can't set external status on a record with no draft version".into(),
            ));
        }
        if !LABEL_PATTERN.is_match(&self.label) {
            return Err(CommandError::InvalidLabel(self.label.clone()));
        }
        record.latest_version.external_status_label = Some(self.label.clone());
        Ok(())
    }

    fn on_success(&self, ctx: &CommandContext<'_>, record: &Record) -> bool {
        match record.id {
            Some(id) => ctx.reindex_record(id, self.name()),
            None => false,
        }
    }
}
