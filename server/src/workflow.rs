//! Per-operator upload workflow
//!
//! The workflow is a small state machine driven one chat input at a time:
//!
//! ```text
//! Idle --enter--> Collecting --file--> Collecting
//!                 Collecting --finalize--> (Finalizing) --> AwaitingRestartDecision
//!                 Collecting --cancel--> Idle
//! AwaitingRestartDecision --yes/no--> Idle
//! ```
//!
//! Each state carries its own data, so a distribution session only exists
//! while collecting and a summary only exists while waiting for the restart
//! decision. The current state is taken out of the workflow before every
//! transition and only put back explicitly, so any path that does not restore
//! it (including a failed remote call) ends in `Idle`.
//!
//! All collaborators arrive through [`ProvisionContext`], which lets tests
//! drive the machine without a chat transport or a live panel.

use crate::blacklist::BlacklistSet;
use crate::distribution::{
    check_extension, check_size, Assignment, DistributionSession, SessionOutcome, Summary,
    UploadLimits,
};
use crate::error::{ErrorKind, ProvisionError};
use crate::fetch::ByteFetcher;
use crate::gateway::PanelGateway;
use crate::paths::VolumeResolver;
use crate::scanner::scan;
use crate::utils::{format_duration, push_list};
use log::{debug, info, warn};
use shared::{Button, ButtonAction, Reply, UploadContent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Everything a workflow needs from the outside world.
pub struct ProvisionContext {
    pub resolver: VolumeResolver,
    pub gateway: Arc<dyn PanelGateway>,
    pub fetcher: Arc<dyn ByteFetcher>,
    pub blacklist: Arc<RwLock<BlacklistSet>>,
    pub limits: UploadLimits,
    /// Pause between consecutive power actions
    pub restart_delay: Duration,
}

impl ProvisionContext {
    /// Refuses any panel call while the panel's host is blacklisted.
    pub async fn ensure_panel_allowed(&self) -> Result<(), ProvisionError> {
        let host = self.gateway.host();
        if self.blacklist.read().await.contains(host) {
            Err(ProvisionError::Blacklisted(host.to_string()))
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    pub file_name: String,
    pub size_bytes: u64,
    pub content: UploadContent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowInput {
    EnterUploadMode,
    File(FileUpload),
    Finalize,
    Cancel,
    RestartDecision(bool),
    Unrecognized(String),
}

#[derive(Debug)]
pub enum WorkflowState {
    Idle,
    Collecting { session: DistributionSession },
    AwaitingRestartDecision { summary: Summary },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Collecting,
    AwaitingRestartDecision,
}

/// Outcome of a paced restart batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestartReport {
    pub restarted: Vec<String>,
    pub refused: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl RestartReport {
    pub fn attempted(&self) -> usize {
        self.restarted.len() + self.refused.len() + self.failed.len()
    }
}

#[derive(Debug)]
pub struct Workflow {
    operator_id: u64,
    state: WorkflowState,
}

impl Workflow {
    pub fn new(operator_id: u64) -> Self {
        Self {
            operator_id,
            state: WorkflowState::Idle,
        }
    }

    pub fn operator_id(&self) -> u64 {
        self.operator_id
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        match self.state {
            WorkflowState::Idle => Phase::Idle,
            WorkflowState::Collecting { .. } => Phase::Collecting,
            WorkflowState::AwaitingRestartDecision { .. } => Phase::AwaitingRestartDecision,
        }
    }

    pub async fn handle(&mut self, input: WorkflowInput, ctx: &ProvisionContext) -> Vec<Reply> {
        let state = std::mem::replace(&mut self.state, WorkflowState::Idle);

        match (state, input) {
            (WorkflowState::Idle, WorkflowInput::EnterUploadMode) => {
                self.enter_upload_mode(ctx).await
            }
            (WorkflowState::Idle, WorkflowInput::Unrecognized(_)) => Vec::new(),
            (WorkflowState::Idle, WorkflowInput::File(upload)) => {
                vec![not_collecting(&upload.file_name)]
            }
            (WorkflowState::Idle, _) => vec![Reply::with_buttons(
                "No upload session in progress.",
                idle_buttons(),
            )],

            (WorkflowState::Collecting { session }, WorkflowInput::EnterUploadMode) => {
                info!("Operator {} resumed their upload session", self.operator_id);
                let reply = Reply::with_buttons(
                    format!(
                        "Upload session already running: {} placed, {} server(s) left. Keep sending files.",
                        session.assignments().len(),
                        session.remaining()
                    ),
                    collecting_buttons(),
                );
                self.state = WorkflowState::Collecting { session };
                vec![reply]
            }
            (WorkflowState::Collecting { mut session }, WorkflowInput::File(upload)) => {
                let reply = receive_file(&mut session, upload, ctx).await;
                self.state = WorkflowState::Collecting { session };
                vec![reply]
            }
            (WorkflowState::Collecting { session }, WorkflowInput::Finalize) => {
                self.finalize(session)
            }
            (WorkflowState::Collecting { session }, WorkflowInput::Cancel) => {
                let summary = session.cancel();
                vec![Reply::with_buttons(render_summary(&summary), idle_buttons())]
            }
            (WorkflowState::Collecting { session }, WorkflowInput::RestartDecision(_))
            | (WorkflowState::Collecting { session }, WorkflowInput::Unrecognized(_)) => {
                let reply = Reply::with_buttons(
                    format!(
                        "Still collecting ({} server(s) left). Send a .json file, or press Done to finish.",
                        session.remaining()
                    ),
                    collecting_buttons(),
                );
                self.state = WorkflowState::Collecting { session };
                vec![reply]
            }

            (WorkflowState::AwaitingRestartDecision { summary }, WorkflowInput::RestartDecision(true)) => {
                match ctx.ensure_panel_allowed().await {
                    Ok(()) => {
                        let report = restart_assignments(&summary.assignments, ctx).await;
                        vec![Reply::with_buttons(render_restart_report(&report), idle_buttons())]
                    }
                    Err(e) => vec![Reply::with_buttons(
                        format!("Restart skipped: {}", e),
                        idle_buttons(),
                    )],
                }
            }
            (WorkflowState::AwaitingRestartDecision { .. }, WorkflowInput::RestartDecision(false))
            | (WorkflowState::AwaitingRestartDecision { .. }, WorkflowInput::Cancel) => {
                vec![Reply::with_buttons(
                    "Restart skipped. Credentials stay in place.",
                    idle_buttons(),
                )]
            }
            (WorkflowState::AwaitingRestartDecision { summary }, WorkflowInput::File(upload)) => {
                let reply = not_collecting(&upload.file_name);
                self.state = WorkflowState::AwaitingRestartDecision { summary };
                vec![reply]
            }
            (WorkflowState::AwaitingRestartDecision { summary }, _) => {
                let reply = restart_prompt(summary.assignments.len());
                self.state = WorkflowState::AwaitingRestartDecision { summary };
                vec![reply]
            }
        }
    }

    async fn enter_upload_mode(&mut self, ctx: &ProvisionContext) -> Vec<Reply> {
        if let Err(e) = ctx.ensure_panel_allowed().await {
            return vec![Reply::text(format!("Cannot start uploads: {}", e))];
        }
        if let Err(e) = ctx.resolver.resolve_volume_root() {
            warn!("Operator {} cannot start uploads: {}", self.operator_id, e);
            return vec![Reply::text(format!("Cannot start uploads: {}", e))];
        }

        let servers = match ctx.gateway.list_servers().await {
            Ok(servers) => servers,
            Err(e) => {
                warn!("Listing servers failed: {}", e);
                return vec![Reply::with_buttons(
                    format!("Could not list servers: {}. Try again.", e),
                    idle_buttons(),
                )];
            }
        };

        let report = scan(&ctx.resolver, &servers);
        let counts = format!(
            "{} eligible, {} already have credentials, {} without a session directory",
            report.eligible.len(),
            report.occupied,
            report.no_session
        );

        if report.eligible.is_empty() {
            return vec![Reply::with_buttons(
                format!("No eligible servers ({}).", counts),
                idle_buttons(),
            )];
        }

        let session = DistributionSession::begin(self.operator_id, report.eligible);
        self.state = WorkflowState::Collecting { session };
        vec![Reply::with_buttons(
            format!(
                "Upload mode on: {}.\nSend .json credential files one at a time, then press Done.",
                counts
            ),
            collecting_buttons(),
        )]
    }

    fn finalize(&mut self, session: DistributionSession) -> Vec<Reply> {
        debug!("Operator {} finalizing upload session", self.operator_id);
        let summary = session.finalize();
        let mut replies = vec![Reply::text(render_summary(&summary))];

        if summary.assignments.is_empty() {
            replies.push(Reply::with_buttons("Nothing to restart.", idle_buttons()));
        } else {
            replies.push(restart_prompt(summary.assignments.len()));
            self.state = WorkflowState::AwaitingRestartDecision { summary };
        }
        replies
    }
}

/// Restarts every assigned server once, in order, pausing between calls.
/// A failure on one server never stops the rest.
pub async fn restart_assignments(
    assignments: &[Assignment],
    ctx: &ProvisionContext,
) -> RestartReport {
    let mut report = RestartReport::default();

    for (idx, assignment) in assignments.iter().enumerate() {
        if idx > 0 && !ctx.restart_delay.is_zero() {
            tokio::time::sleep(ctx.restart_delay).await;
        }

        let target = &assignment.target;
        match ctx.gateway.restart_server(&target.identifier).await {
            Ok(true) => report.restarted.push(target.display_name.clone()),
            Ok(false) => report.refused.push(target.display_name.clone()),
            Err(e) => {
                warn!("Restarting {} failed: {}", target.identifier, e);
                report
                    .failed
                    .push((target.display_name.clone(), e.to_string()));
            }
        }
    }

    info!(
        "Restart batch done: {} ok, {} refused, {} failed",
        report.restarted.len(),
        report.refused.len(),
        report.failed.len()
    );
    report
}

async fn receive_file(
    session: &mut DistributionSession,
    upload: FileUpload,
    ctx: &ProvisionContext,
) -> Reply {
    let FileUpload {
        file_name,
        size_bytes,
        content,
    } = upload;

    let result = match load_upload(&file_name, size_bytes, content, ctx).await {
        Ok(bytes) => session.consume(&bytes, &file_name, &ctx.resolver, &ctx.limits),
        Err(e) => Err(e),
    };

    match result {
        Ok(assignment) => Reply::with_buttons(
            format!(
                "{} -> {}. {} server(s) left.",
                assignment.source_file_name,
                assignment.target.display_name,
                session.remaining()
            ),
            collecting_buttons(),
        ),
        Err(e) => rejection(&file_name, &e, session),
    }
}

/// Inline bytes are checked by `consume`; remote ones are pre-checked so
/// obviously bad uploads are never downloaded.
async fn load_upload(
    file_name: &str,
    size_bytes: u64,
    content: UploadContent,
    ctx: &ProvisionContext,
) -> Result<Vec<u8>, ProvisionError> {
    match content {
        UploadContent::Inline(bytes) => Ok(bytes),
        UploadContent::Remote(url) => {
            check_extension(file_name)?;
            check_size(file_name, size_bytes, &ctx.limits)?;
            let bytes = ctx.fetcher.fetch(&url, ctx.limits.max_file_bytes).await?;
            Ok(bytes)
        }
    }
}

fn rejection(file_name: &str, error: &ProvisionError, session: &DistributionSession) -> Reply {
    match error.kind() {
        ErrorKind::Validation => Reply::with_buttons(
            format!("Rejected: {}. Send another file.", error),
            collecting_buttons(),
        ),
        ErrorKind::QueueExhausted => Reply::with_buttons(
            format!(
                "Rejected {}: every eligible server already got a credential. Press Done to finish.",
                file_name
            ),
            vec![
                Button::new("Done", ButtonAction::Finalize),
                Button::new("Cancel", ButtonAction::Cancel),
            ],
        ),
        ErrorKind::PathNotFound | ErrorKind::WriteFailure => Reply::with_buttons(
            format!(
                "{} was not placed: {}. Send it again to use the next server ({} left).",
                file_name,
                error,
                session.remaining()
            ),
            collecting_buttons(),
        ),
        ErrorKind::RemoteCallFailure => Reply::with_buttons(
            format!("{} could not be fetched: {}. Send it again.", file_name, error),
            collecting_buttons(),
        ),
    }
}

fn not_collecting(file_name: &str) -> Reply {
    Reply::with_buttons(
        format!("Not currently collecting; {} was ignored.", file_name),
        idle_buttons(),
    )
}

fn restart_prompt(count: usize) -> Reply {
    Reply::with_buttons(
        format!("Restart the {} provisioned server(s) now?", count),
        vec![
            Button::new("Restart", ButtonAction::RestartYes),
            Button::new("Skip", ButtonAction::RestartNo),
        ],
    )
}

pub fn idle_buttons() -> Vec<Button> {
    vec![
        Button::new("Upload credentials", ButtonAction::EnterUploadMode),
        Button::new("Servers", ButtonAction::ListServers),
        Button::new("Status", ButtonAction::Status),
    ]
}

fn collecting_buttons() -> Vec<Button> {
    vec![
        Button::new("Done", ButtonAction::Finalize),
        Button::new("Cancel", ButtonAction::Cancel),
        Button::new("Status", ButtonAction::Status),
    ]
}

pub fn render_summary(summary: &Summary) -> String {
    let heading = match summary.outcome {
        SessionOutcome::Finalized => "Upload session finished",
        SessionOutcome::Cancelled => "Upload session cancelled",
    };
    let mut text = format!(
        "{} after {}: {} credential(s) placed, {} eligible server(s) unused.",
        heading,
        format_duration(summary.elapsed),
        summary.assignments.len(),
        summary.remaining
    );
    push_list(
        &mut text,
        summary.assignments.iter().map(|assignment| {
            format!(
                "{} -> {} ({})",
                assignment.source_file_name,
                assignment.target.display_name,
                assignment.target.identifier
            )
        }),
    );
    if summary.outcome == SessionOutcome::Cancelled && !summary.assignments.is_empty() {
        text.push_str("\nCredentials already placed were kept.");
    }
    text
}

fn render_restart_report(report: &RestartReport) -> String {
    let mut text = format!(
        "Restarted {}/{} server(s).",
        report.restarted.len(),
        report.attempted()
    );
    let refused = report
        .refused
        .iter()
        .map(|name| format!("{}: refused by the panel", name));
    let failed = report
        .failed
        .iter()
        .map(|(name, reason)| format!("{}: {}", name, reason));
    push_list(&mut text, refused.chain(failed));
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchError;
    use crate::gateway::{GatewayError, ServerRecord, UserRecord};
    use async_trait::async_trait;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct FakePanel {
        servers: Vec<ServerRecord>,
        restarts: Mutex<Vec<String>>,
        fail_restart_of: Option<String>,
    }

    #[async_trait]
    impl PanelGateway for FakePanel {
        fn host(&self) -> &str {
            "panel.test"
        }

        async fn list_servers(&self) -> Result<Vec<ServerRecord>, GatewayError> {
            Ok(self.servers.clone())
        }

        async fn restart_server(&self, identifier: &str) -> Result<bool, GatewayError> {
            self.restarts.lock().unwrap().push(identifier.to_string());
            if self.fail_restart_of.as_deref() == Some(identifier) {
                Err(GatewayError::Status {
                    status: 500,
                    body: "boom".into(),
                })
            } else {
                Ok(true)
            }
        }

        async fn get_user(&self, _user_id: u64) -> Result<UserRecord, GatewayError> {
            unimplemented!()
        }
    }

    struct StaticFetcher(Vec<u8>);

    #[async_trait]
    impl ByteFetcher for StaticFetcher {
        async fn fetch(&self, _url: &str, max_bytes: u64) -> Result<Vec<u8>, FetchError> {
            if self.0.len() as u64 > max_bytes {
                return Err(FetchError::TooLarge { max: max_bytes });
            }
            Ok(self.0.clone())
        }
    }

    fn setup(ids: &[&str]) -> (TempDir, Arc<FakePanel>, ProvisionContext) {
        let root = TempDir::new().unwrap();
        for id in ids {
            fs::create_dir_all(root.path().join(id).join("session")).unwrap();
        }
        let panel = Arc::new(FakePanel {
            servers: ids
                .iter()
                .map(|id| ServerRecord::new(*id, id.to_uppercase(), 1))
                .collect(),
            restarts: Mutex::new(Vec::new()),
            fail_restart_of: ids.first().map(|id| id.to_string()),
        });
        let ctx = ProvisionContext {
            resolver: VolumeResolver::with_candidates(vec![root.path().to_path_buf()]),
            gateway: panel.clone(),
            fetcher: Arc::new(StaticFetcher(b"{\"remote\":true}".to_vec())),
            blacklist: Arc::new(RwLock::new(BlacklistSet::empty(
                root.path().join("blacklist.json"),
            ))),
            limits: UploadLimits::default(),
            restart_delay: Duration::ZERO,
        };
        (root, panel, ctx)
    }

    fn file(name: &str, body: &str) -> WorkflowInput {
        WorkflowInput::File(FileUpload {
            file_name: name.to_string(),
            size_bytes: body.len() as u64,
            content: UploadContent::Inline(body.as_bytes().to_vec()),
        })
    }

    #[tokio::test]
    async fn test_idle_ignores_unrecognized_text() {
        let (_root, _panel, ctx) = setup(&["a"]);
        let mut workflow = Workflow::new(1);
        let replies = workflow
            .handle(WorkflowInput::Unrecognized("hello".into()), &ctx)
            .await;
        assert!(replies.is_empty());
        assert_eq!(workflow.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn test_file_while_idle_is_rejected() {
        let (root, _panel, ctx) = setup(&["a"]);
        let mut workflow = Workflow::new(1);
        let replies = workflow.handle(file("a.json", "{}"), &ctx).await;
        assert_eq!(replies.len(), 1);
        assert!(replies[0].text.contains("Not currently collecting"));
        assert!(!root.path().join("a/session/creds.json").exists());
    }

    #[tokio::test]
    async fn test_full_cycle_with_restart() {
        let (_root, panel, ctx) = setup(&["a", "b"]);
        let mut workflow = Workflow::new(1);

        workflow.handle(WorkflowInput::EnterUploadMode, &ctx).await;
        assert_eq!(workflow.phase(), Phase::Collecting);

        workflow.handle(file("one.json", "{\"x\":1}"), &ctx).await;
        workflow.handle(file("two.json", "{\"x\":2}"), &ctx).await;

        let replies = workflow.handle(WorkflowInput::Finalize, &ctx).await;
        assert_eq!(replies.len(), 2);
        assert!(replies[0].text.contains("one.json -> A"));
        assert!(replies[0].text.contains("two.json -> B"));
        assert_eq!(replies[1].buttons[0].action, ButtonAction::RestartYes);
        assert_eq!(workflow.phase(), Phase::AwaitingRestartDecision);

        let replies = workflow
            .handle(WorkflowInput::RestartDecision(true), &ctx)
            .await;
        assert!(replies[0].text.contains("Restarted 1/2"));
        assert_eq!(*panel.restarts.lock().unwrap(), vec!["a", "b"]);
        assert_eq!(workflow.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn test_restart_no_has_no_side_effects() {
        let (_root, panel, ctx) = setup(&["a"]);
        let mut workflow = Workflow::new(1);
        workflow.handle(WorkflowInput::EnterUploadMode, &ctx).await;
        workflow.handle(file("one.json", "{}"), &ctx).await;
        workflow.handle(WorkflowInput::Finalize, &ctx).await;

        workflow
            .handle(WorkflowInput::RestartDecision(false), &ctx)
            .await;
        assert!(panel.restarts.lock().unwrap().is_empty());
        assert_eq!(workflow.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn test_finalize_without_assignments_skips_prompt() {
        let (_root, _panel, ctx) = setup(&["a"]);
        let mut workflow = Workflow::new(1);
        workflow.handle(WorkflowInput::EnterUploadMode, &ctx).await;

        let replies = workflow.handle(WorkflowInput::Finalize, &ctx).await;
        assert!(replies[1].text.contains("Nothing to restart"));
        assert_eq!(workflow.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn test_resume_keeps_session() {
        let (_root, _panel, ctx) = setup(&["a", "b"]);
        let mut workflow = Workflow::new(1);
        workflow.handle(WorkflowInput::EnterUploadMode, &ctx).await;
        workflow.handle(file("one.json", "{}"), &ctx).await;

        let replies = workflow.handle(WorkflowInput::EnterUploadMode, &ctx).await;
        assert!(replies[0].text.contains("1 placed, 1 server(s) left"));
        match workflow.state() {
            WorkflowState::Collecting { session } => {
                assert_eq!(session.assignments().len(), 1);
                assert_eq!(session.remaining(), 1);
            }
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_no_eligible_servers_stays_idle() {
        let (root, _panel, ctx) = setup(&["a"]);
        fs::write(root.path().join("a/session/creds.json"), "{}").unwrap();

        let mut workflow = Workflow::new(1);
        let replies = workflow.handle(WorkflowInput::EnterUploadMode, &ctx).await;
        assert!(replies[0].text.contains("No eligible servers"));
        assert!(replies[0].text.contains("1 already have credentials"));
        assert_eq!(workflow.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn test_blacklisted_panel_blocks_upload_mode() {
        let (_root, _panel, ctx) = setup(&["a"]);
        ctx.blacklist.write().await.add("panel.test").await.unwrap();

        let mut workflow = Workflow::new(1);
        let replies = workflow.handle(WorkflowInput::EnterUploadMode, &ctx).await;
        assert!(replies[0].text.contains("blacklisted"));
        assert_eq!(workflow.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn test_remote_upload_is_fetched() {
        let (root, _panel, ctx) = setup(&["a"]);
        let mut workflow = Workflow::new(1);
        workflow.handle(WorkflowInput::EnterUploadMode, &ctx).await;

        let replies = workflow
            .handle(
                WorkflowInput::File(FileUpload {
                    file_name: "remote.json".into(),
                    size_bytes: 15,
                    content: UploadContent::Remote("https://files.test/remote.json".into()),
                }),
                &ctx,
            )
            .await;
        assert!(replies[0].text.contains("remote.json -> A"));
        assert_eq!(
            fs::read_to_string(root.path().join("a/session/creds.json")).unwrap(),
            "{\"remote\":true}"
        );
    }

    #[tokio::test]
    async fn test_remote_upload_with_bad_extension_is_not_fetched() {
        let (_root, _panel, ctx) = setup(&["a"]);
        let mut workflow = Workflow::new(1);
        workflow.handle(WorkflowInput::EnterUploadMode, &ctx).await;

        let replies = workflow
            .handle(
                WorkflowInput::File(FileUpload {
                    file_name: "remote.txt".into(),
                    size_bytes: 15,
                    content: UploadContent::Remote("https://files.test/remote.txt".into()),
                }),
                &ctx,
            )
            .await;
        assert!(replies[0].text.starts_with("Rejected"));
        match workflow.state() {
            WorkflowState::Collecting { session } => assert_eq!(session.remaining(), 1),
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancel_reports_partial_summary() {
        let (_root, _panel, ctx) = setup(&["a", "b"]);
        let mut workflow = Workflow::new(1);
        workflow.handle(WorkflowInput::EnterUploadMode, &ctx).await;
        workflow.handle(file("one.json", "{}"), &ctx).await;

        let replies = workflow.handle(WorkflowInput::Cancel, &ctx).await;
        assert!(replies[0].text.starts_with("Upload session cancelled"));
        assert!(replies[0].text.contains("Credentials already placed were kept"));
        assert_eq!(workflow.phase(), Phase::Idle);
    }

    #[test]
    fn test_large_summary_fits_one_datagram() {
        let assignments = (0..2_000)
            .map(|i| Assignment {
                source_file_name: format!("{}-{}.json", "x".repeat(200), i),
                target: ServerRecord::new(format!("srv-{}", i), "y".repeat(200), 1),
                assigned_at: 0,
            })
            .collect();
        let summary = Summary {
            operator_id: 1,
            outcome: SessionOutcome::Finalized,
            assignments,
            remaining: 0,
            elapsed: Duration::from_secs(3),
        };

        let text = render_summary(&summary);
        assert!(text.contains("2000 credential(s) placed"));
        assert!(text.ends_with("... and 1970 more"));

        let packet = shared::Packet::Reply {
            reply: Reply::with_buttons(text, idle_buttons()),
        };
        let bytes = shared::encode_packet(&packet).unwrap();
        assert!(bytes.len() < shared::MAX_DATAGRAM_BYTES);
    }

    #[test]
    fn test_restart_report_counts() {
        let report = RestartReport {
            restarted: vec!["A".into()],
            refused: vec!["B".into()],
            failed: vec![("C".into(), "timeout".into())],
        };
        assert_eq!(report.attempted(), 3);
        let text = render_restart_report(&report);
        assert!(text.starts_with("Restarted 1/3"));
        assert!(text.contains("B: refused by the panel"));
        assert!(text.contains("C: timeout"));
    }
}
