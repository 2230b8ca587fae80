//! Operator session: ROI mapping followed by live monitoring.
//!
//! Everything runs on one task. Each stream event, operator command and HTTP
//! response is handled to completion before the next one is looked at.

use crate::error::AppError;
use crate::lane::LaneId;
use crate::recommendation::{Action, recommend_action};
use crate::render::{BoardRenderer, render_roi};
use crate::roi::{CommitOutcome, CommitRequest, RoiClient, RoiError, RoiSession};
use crate::state::{LaneStateStore, LinkStatus};
use crate::stream::assembler::{AssemblyError, FrameAssembler};
use crate::stream::{ConnectionEvent, EventFeed};
use futures_util::future::OptionFuture;
use std::collections::BTreeSet;
use std::future::Future;
use std::io::Write;
use std::pin::Pin;
use std::str::FromStr;
use thiserror::Error;
use tokio::io::{AsyncBufRead, Lines};
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Click { x: f64, y: f64 },
    Reset,
    Commit,
    Retry,
    Restart,
    Select(Action),
    Clear,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognised command: {0}")]
pub struct CommandError(pub String);

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (verb, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();
        match verb.to_ascii_lowercase().as_str() {
            "click" => {
                let mut coords = rest.split_whitespace().map(str::parse::<f64>);
                match (coords.next(), coords.next(), coords.next()) {
                    (Some(Ok(x)), Some(Ok(y)), None) => Ok(Command::Click { x, y }),
                    _ => Err(CommandError(line.to_string())),
                }
            }
            "reset" => Ok(Command::Reset),
            "commit" | "next" => Ok(Command::Commit),
            "retry" => Ok(Command::Retry),
            "restart" => Ok(Command::Restart),
            "action" => parse_action(rest)
                .map(Command::Select)
                .ok_or_else(|| CommandError(line.to_string())),
            "clear" => Ok(Command::Clear),
            "quit" | "exit" => Ok(Command::Quit),
            _ => Err(CommandError(line.to_string())),
        }
    }
}

/// Operators type action names in any case.
fn parse_action(text: &str) -> Option<Action> {
    Action::ALL
        .into_iter()
        .find(|action| action.label().eq_ignore_ascii_case(text))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoiExit {
    Configured,
    Quit,
}

/// Live-monitoring half of the session: assembler feeding the lane store.
#[derive(Debug, Default)]
pub struct LiveMonitor {
    assembler: FrameAssembler,
    store: LaneStateStore,
    selected: Option<Action>,
}

impl LiveMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self) -> &LaneStateStore {
        &self.store
    }

    pub fn assembler(&self) -> &FrameAssembler {
        &self.assembler
    }

    pub fn select(&mut self, action: Option<Action>) {
        self.selected = action;
    }

    pub fn recommended(&self) -> BTreeSet<LaneId> {
        self.selected.map(recommend_action).unwrap_or_default()
    }

    /// Applies one connection event. Protocol violations are dropped here.
    pub fn handle_event(&mut self, event: ConnectionEvent) {
        match &event {
            ConnectionEvent::Opened => {
                info!("Streaming connection established");
                self.store.set_link(LinkStatus::Live);
            }
            ConnectionEvent::Closed(reason) => {
                info!(reason = %reason, "Streaming connection closed");
                self.store.set_link(LinkStatus::Closed {
                    reason: reason.clone(),
                });
            }
            ConnectionEvent::Failed(err) => {
                error!(error = %err, "Streaming connection failed");
                self.store.set_link(LinkStatus::Failed {
                    error: err.to_string(),
                });
            }
            ConnectionEvent::MessageReceived(_) => {}
        }

        match self.assembler.on_event(event) {
            Ok(Some(ready)) => {
                if let Err(err) = self.store.apply_snapshot(ready.lane_id, ready.snapshot) {
                    warn!(lane_id = ready.lane_id, error = %err, "Snapshot rejected by store");
                }
            }
            Ok(None) => {}
            // Already logged by the assembler; the next well-formed pair recovers.
            Err(AssemblyError::MalformedMetadata(_) | AssemblyError::OrphanFrame { .. }) => {}
        }
    }
}

/// Runs live monitoring until the operator quits or input ends.
pub async fn run_live<F, R, W>(
    feed: &mut F,
    input: &mut Lines<R>,
    monitor: &mut LiveMonitor,
    out: W,
) -> Result<(), AppError>
where
    F: EventFeed,
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut renderer = BoardRenderer::new(monitor.store().subscribe(), out);
    renderer.draw(&monitor.recommended())?;
    let mut feed_open = true;

    loop {
        tokio::select! {
            biased;
            event = feed.next_event(), if feed_open => match event {
                Some(event) => monitor.handle_event(event),
                None => {
                    feed_open = false;
                    if monitor.store().board().link().is_live() {
                        monitor.store.set_link(LinkStatus::Closed {
                            reason: "stream ended".to_string(),
                        });
                    }
                }
            },
            line = input.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<Command>() {
                    Ok(Command::Quit) => break,
                    Ok(Command::Select(action)) => {
                        info!(action = %action, "Action selected");
                        monitor.select(Some(action));
                        renderer.draw(&monitor.recommended())?;
                    }
                    Ok(Command::Clear) => {
                        monitor.select(None);
                        renderer.draw(&monitor.recommended())?;
                    }
                    Ok(other) => warn!(command = ?other, "Command not available while monitoring"),
                    Err(err) => warn!(error = %err, "Ignoring operator input"),
                }
            }
        }
        renderer.refresh(&monitor.recommended())?;
    }

    feed.close().await;
    Ok(())
}

type PendingCommit<'a> = Pin<Box<dyn Future<Output = (CommitRequest, Result<(), RoiError>)> + 'a>>;

fn start_commit<C: RoiClient>(client: &C, request: CommitRequest) -> PendingCommit<'_> {
    Box::pin(async move { (request, client.commit_roi(request).await) })
}

/// Runs ROI mapping until every lane is committed or the operator quits.
pub async fn run_roi<C, R, W>(
    client: &C,
    input: &mut Lines<R>,
    session: &mut RoiSession,
    mut out: W,
) -> Result<RoiExit, AppError>
where
    C: RoiClient,
    R: AsyncBufRead + Unpin,
    W: Write,
{
    session.load(client).await?;
    writeln!(out, "{}", render_roi(session))?;

    let mut pending: Option<PendingCommit<'_>> = None;

    loop {
        if session.is_configured() {
            return Ok(RoiExit::Configured);
        }

        tokio::select! {
            biased;
            Some((request, result)) = OptionFuture::from(pending.as_mut()),
                if pending.is_some() =>
            {
                pending = None;
                match session.finish_commit(request, result) {
                    CommitOutcome::Failed(err) => warn!(error = %err, "Commit failed"),
                    CommitOutcome::Ignored => continue,
                    CommitOutcome::Advanced { .. } | CommitOutcome::Configured => {}
                }
            }
            line = input.next_line() => {
                let Some(line) = line? else {
                    session.close();
                    return Ok(RoiExit::Quit);
                };
                if line.trim().is_empty() {
                    continue;
                }
                let command = match line.parse::<Command>() {
                    Ok(command) => command,
                    Err(err) => {
                        warn!(error = %err, "Ignoring operator input");
                        continue;
                    }
                };
                match command {
                    Command::Quit => {
                        // Dropping the pending future abandons the request client-side.
                        drop(pending.take());
                        session.close();
                        return Ok(RoiExit::Quit);
                    }
                    Command::Click { x, y } => {
                        if !session.click(x, y) {
                            writeln!(out, "Click ignored")?;
                        }
                    }
                    Command::Reset => {
                        if let Err(err) = session.reset() {
                            writeln!(out, "{err}")?;
                        }
                    }
                    Command::Commit => match session.begin_commit() {
                        Ok(request) => pending = Some(start_commit(client, request)),
                        Err(err) => writeln!(out, "{err}")?,
                    },
                    Command::Retry => match session.retry_commit() {
                        Ok(request) => pending = Some(start_commit(client, request)),
                        Err(err) => writeln!(out, "{err}")?,
                    },
                    Command::Restart => {
                        if matches!(session.state(), crate::roi::RoiState::Failed { .. }) {
                            *session = RoiSession::new();
                            session.load(client).await?;
                        } else {
                            writeln!(out, "Restart is only available after a failure")?;
                        }
                    }
                    Command::Select(_) | Command::Clear => {
                        writeln!(out, "Actions are available once monitoring starts")?;
                    }
                }
            }
        }
        writeln!(out, "{}", render_roi(session))?;
    }
}
