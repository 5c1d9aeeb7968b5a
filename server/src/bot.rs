//! Chat command dispatcher
//!
//! Turns raw [`ChatEvent`]s into commands, checks that the sender is a
//! configured operator and routes each command either to the operator's
//! [`Workflow`] or to one of the read-only / admin handlers below.

use crate::blacklist::BlacklistSet;
use crate::scanner::scan;
use crate::session_manager::SessionManager;
use crate::utils::{format_duration, get_timestamp, push_list};
use crate::workflow::{idle_buttons, FileUpload, ProvisionContext, WorkflowInput, WorkflowState};
use log::{debug, info, warn};
use shared::{ButtonAction, ChatEvent, Reply};
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlacklistCommand {
    List,
    Add(String),
    Remove(String),
    Usage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Workflow(WorkflowInput),
    Status,
    Servers,
    /// `None` when the id argument was missing or not a number
    User(Option<u64>),
    Blacklist(BlacklistCommand),
    Help,
    Unknown(String),
}

impl Command {
    pub fn parse_event(event: ChatEvent) -> Self {
        match event {
            ChatEvent::ButtonPress { action } => Self::from_action(action),
            ChatEvent::FileUpload {
                file_name,
                size_bytes,
                content,
            } => Command::Workflow(WorkflowInput::File(FileUpload {
                file_name,
                size_bytes,
                content,
            })),
            ChatEvent::Text { text } => Self::parse_text(&text),
        }
    }

    fn from_action(action: ButtonAction) -> Self {
        match action {
            ButtonAction::EnterUploadMode => Command::Workflow(WorkflowInput::EnterUploadMode),
            ButtonAction::Finalize => Command::Workflow(WorkflowInput::Finalize),
            ButtonAction::Cancel => Command::Workflow(WorkflowInput::Cancel),
            ButtonAction::RestartYes => Command::Workflow(WorkflowInput::RestartDecision(true)),
            ButtonAction::RestartNo => Command::Workflow(WorkflowInput::RestartDecision(false)),
            ButtonAction::Status => Command::Status,
            ButtonAction::ListServers => Command::Servers,
        }
    }

    pub fn parse_text(text: &str) -> Self {
        let trimmed = text.trim();

        let Some(rest) = trimmed.strip_prefix('/') else {
            return match trimmed.to_ascii_lowercase().as_str() {
                "yes" | "y" => Command::Workflow(WorkflowInput::RestartDecision(true)),
                "no" | "n" => Command::Workflow(WorkflowInput::RestartDecision(false)),
                _ => Command::Workflow(WorkflowInput::Unrecognized(trimmed.to_string())),
            };
        };

        let mut parts = rest.split_whitespace();
        let word = parts.next().unwrap_or_default();
        // Group chats address commands as /cmd@botname
        let name = word.split('@').next().unwrap_or_default().to_ascii_lowercase();
        let args: Vec<&str> = parts.collect();

        match name.as_str() {
            "upload" => Command::Workflow(WorkflowInput::EnterUploadMode),
            "done" => Command::Workflow(WorkflowInput::Finalize),
            "cancel" => Command::Workflow(WorkflowInput::Cancel),
            "yes" => Command::Workflow(WorkflowInput::RestartDecision(true)),
            "no" => Command::Workflow(WorkflowInput::RestartDecision(false)),
            "status" => Command::Status,
            "servers" => Command::Servers,
            "user" => Command::User(args.first().and_then(|id| id.parse().ok())),
            "blacklist" => Command::Blacklist(match args.as_slice() {
                [] | ["list"] => BlacklistCommand::List,
                ["add", host] => BlacklistCommand::Add(host.to_string()),
                ["remove", host] => BlacklistCommand::Remove(host.to_string()),
                _ => BlacklistCommand::Usage,
            }),
            "help" | "start" => Command::Help,
            _ => Command::Unknown(format!("/{}", name)),
        }
    }
}

pub struct Bot {
    ctx: ProvisionContext,
    sessions: RwLock<SessionManager>,
    operators: HashSet<u64>,
}

impl Bot {
    pub fn new(ctx: ProvisionContext, operators: impl IntoIterator<Item = u64>) -> Self {
        let operators: HashSet<u64> = operators.into_iter().collect();
        if operators.is_empty() {
            warn!("No operators configured, every request will be refused");
        }
        Self {
            ctx,
            sessions: RwLock::new(SessionManager::new()),
            operators,
        }
    }

    pub fn context(&self) -> &ProvisionContext {
        &self.ctx
    }

    pub fn is_authorized(&self, operator_id: u64) -> bool {
        self.operators.contains(&operator_id)
    }

    /// Handles one inbound event and returns the replies to send back, in order.
    pub async fn handle(&self, operator_id: u64, event: ChatEvent) -> Vec<Reply> {
        if !self.is_authorized(operator_id) {
            warn!("Refused event from unknown operator {}", operator_id);
            return vec![Reply::text("You are not allowed to use this bot.")];
        }

        let command = Command::parse_event(event);
        debug!("Operator {} -> {:?}", operator_id, command);

        match command {
            Command::Workflow(input) => self.dispatch(operator_id, input).await,
            Command::Status => vec![self.status(operator_id).await],
            Command::Servers => vec![self.servers().await],
            Command::User(Some(user_id)) => vec![self.user(user_id).await],
            Command::User(None) => vec![Reply::text("Usage: /user <numeric id>")],
            Command::Blacklist(cmd) => vec![self.blacklist(cmd).await],
            Command::Help => vec![help()],
            Command::Unknown(name) => vec![Reply::with_buttons(
                format!("Unknown command {}. Send /help for the list.", name),
                idle_buttons(),
            )],
        }
    }

    async fn dispatch(&self, operator_id: u64, input: WorkflowInput) -> Vec<Reply> {
        let handle = self.sessions.write().await.workflow(operator_id);
        let mut workflow = handle.lock().await;
        workflow.handle(input, &self.ctx).await
    }

    /// Drops idle workflows. Returns how many were dropped.
    pub async fn prune_idle_sessions(&self) -> usize {
        self.sessions.write().await.prune_idle()
    }

    async fn status(&self, operator_id: u64) -> Reply {
        let handle = self.sessions.read().await.get(operator_id);
        let blacklisted = self.ctx.blacklist.read().await.len();

        let phase = match handle {
            None => "Idle.".to_string(),
            Some(handle) => match handle.try_lock() {
                Err(_) => "Busy with a previous request.".to_string(),
                Ok(workflow) => match workflow.state() {
                    WorkflowState::Idle => "Idle.".to_string(),
                    WorkflowState::Collecting { session } => {
                        let elapsed =
                            Duration::from_millis(get_timestamp().saturating_sub(session.started_at_ms()));
                        format!(
                            "Collecting for {}: {} credential(s) placed, {} of {} server(s) left.",
                            format_duration(elapsed),
                            session.assignments().len(),
                            session.remaining(),
                            session.initial_len()
                        )
                    }
                    WorkflowState::AwaitingRestartDecision { summary } => format!(
                        "Waiting for a restart decision on {} server(s).",
                        summary.assignments.len()
                    ),
                },
            },
        };

        Reply::text(format!(
            "{}\nPanel: {} ({} blacklisted host(s)).",
            phase,
            self.ctx.gateway.host(),
            blacklisted
        ))
    }

    async fn servers(&self) -> Reply {
        if let Err(e) = self.ctx.ensure_panel_allowed().await {
            return Reply::text(format!("Cannot list servers: {}", e));
        }

        let servers = match self.ctx.gateway.list_servers().await {
            Ok(servers) => servers,
            Err(e) => {
                warn!("Listing servers failed: {}", e);
                return Reply::text(format!("Could not list servers: {}", e));
            }
        };

        let mut text = String::new();
        if let Err(e) = self.ctx.resolver.resolve_volume_root() {
            text.push_str(&format!("Warning: {}\n", e));
        }

        let report = scan(&self.ctx.resolver, &servers);
        text.push_str(&format!(
            "{} server(s) on the panel: {} eligible, {} already have credentials, {} without a session directory.",
            report.total(),
            report.eligible.len(),
            report.occupied,
            report.no_session
        ));
        push_list(&mut text, report.eligible.iter().map(|s| s.display_name.as_str()));

        Reply::with_buttons(text, idle_buttons())
    }

    async fn user(&self, user_id: u64) -> Reply {
        if let Err(e) = self.ctx.ensure_panel_allowed().await {
            return Reply::text(format!("Cannot look up users: {}", e));
        }

        match self.ctx.gateway.get_user(user_id).await {
            Ok(user) => {
                let role = if user.root_admin { "root admin" } else { "user" };
                Reply::text(format!(
                    "User {}: {} <{}>, {}",
                    user.id, user.username, user.email, role
                ))
            }
            Err(e) => Reply::text(format!("Could not fetch user {}: {}", user_id, e)),
        }
    }

    async fn blacklist(&self, command: BlacklistCommand) -> Reply {
        match command {
            BlacklistCommand::List => render_blacklist(&*self.ctx.blacklist.read().await),
            BlacklistCommand::Add(host) => {
                match self.ctx.blacklist.write().await.add(&host).await {
                    Ok((host, true)) => {
                        info!("Blacklist add: {}", host);
                        Reply::text(format!("Blacklisted {}.", host))
                    }
                    Ok((host, false)) => Reply::text(format!("{} was already blacklisted.", host)),
                    Err(e) => Reply::text(format!("Could not update the blacklist: {}", e)),
                }
            }
            BlacklistCommand::Remove(host) => {
                match self.ctx.blacklist.write().await.remove(&host).await {
                    Ok((host, true)) => {
                        info!("Blacklist remove: {}", host);
                        Reply::text(format!("Removed {} from the blacklist.", host))
                    }
                    Ok((host, false)) => Reply::text(format!("{} was not blacklisted.", host)),
                    Err(e) => Reply::text(format!("Could not update the blacklist: {}", e)),
                }
            }
            BlacklistCommand::Usage => {
                Reply::text("Usage: /blacklist [list | add <host> | remove <host>]")
            }
        }
    }
}

fn render_blacklist(set: &BlacklistSet) -> Reply {
    if set.is_empty() {
        return Reply::text("The blacklist is empty.");
    }
    let mut text = format!("{} blacklisted host(s):", set.len());
    push_list(&mut text, set.entries());
    Reply::text(text)
}

fn help() -> Reply {
    Reply::with_buttons(
        "Commands:\n\
         /upload - start or resume an upload session\n\
         /done - finish uploading and review the placements\n\
         /cancel - stop the current session\n\
         /yes, /no - answer the restart prompt\n\
         /status - show the current session\n\
         /servers - list panel servers and their eligibility\n\
         /user <id> - look up a panel user\n\
         /blacklist [list | add <host> | remove <host>] - manage blocked panel hosts",
        idle_buttons(),
    )
}
