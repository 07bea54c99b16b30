//! Child-process adapter
//!
//! Runs each agent as a plain child process with piped stdio. Output is read
//! line by line from stdout and stderr, stripped of ANSI escapes, and
//! published as [`AgentEvent::Output`]. The exit event is published only
//! after both streams have closed, so it is always the last event.

use super::{AgentAdapter, AgentEvent, AgentHandle, EventHub};
use crate::agent::{AgentConfig, AgentKind};
use crate::{AtelierError, Result};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, warn};

/// Spawns agents as local child processes
#[derive(Debug, Clone, Default)]
pub struct ProcessAdapter;

impl ProcessAdapter {
    pub fn new() -> Self {
        Self
    }

    /// Build the command line for an agent.
    pub fn command_for(config: &AgentConfig) -> Result<Command> {
        let mut command = match &config.kind {
            AgentKind::ClaudeCode => {
                let mut command = Command::new("claude");
                command.arg("--print");
                if let Some(tools) = config.tools.as_ref().filter(|t| !t.is_empty()) {
                    command.arg("--allowedTools").arg(tools.join(","));
                }
                if let Some(prompt) = &config.system_prompt {
                    command.arg("--append-system-prompt").arg(prompt);
                }
                command.arg(&config.task);
                command
            }
            AgentKind::Amp => {
                return Err(AtelierError::UnsupportedAgent(config.kind.to_string()));
            }
            // Arbitrary executables get the task as their only argument
            AgentKind::Custom(program) => {
                let mut command = Command::new(program);
                command.arg(&config.task);
                command
            }
        };

        command
            .current_dir(&config.working_directory)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        Ok(command)
    }
}

#[async_trait]
impl AgentAdapter for ProcessAdapter {
    fn name(&self) -> &'static str {
        "process"
    }

    async fn spawn(&self, config: &AgentConfig) -> Result<Box<dyn AgentHandle>> {
        let mut command = Self::command_for(config)?;
        let mut child = command.spawn().map_err(|e| {
            AtelierError::Agent(format!("failed to start {} for {}: {}", config.kind, config.id, e))
        })?;

        let pid = child.id();
        let stdin = child.stdin.take();
        let hub = EventHub::new();
        let (kill_tx, kill_rx) = oneshot::channel();

        tokio::spawn(supervise(config.id.clone(), child, hub.sender(), kill_rx));

        info!(
            component = "adapter",
            event = "process_spawned",
            agent_id = %config.id,
            kind = %config.kind,
            pid = pid.unwrap_or_default(),
            "Agent process spawned"
        );

        Ok(Box::new(ProcessHandle {
            id: config.id.clone(),
            stdin: tokio::sync::Mutex::new(stdin),
            kill: std::sync::Mutex::new(Some(kill_tx)),
            hub,
        }))
    }
}

/// Handle to a child process started by [`ProcessAdapter`]
pub struct ProcessHandle {
    id: String,
    stdin: tokio::sync::Mutex<Option<ChildStdin>>,
    kill: std::sync::Mutex<Option<oneshot::Sender<()>>>,
    hub: EventHub,
}

#[async_trait]
impl AgentHandle for ProcessHandle {
    async fn send(&self, text: &str) -> Result<()> {
        let mut stdin = self.stdin.lock().await;
        let pipe = stdin
            .as_mut()
            .ok_or_else(|| AtelierError::Agent(format!("{}: stdin is closed", self.id)))?;

        pipe.write_all(text.as_bytes()).await?;
        if !text.ends_with('\n') {
            pipe.write_all(b"\n").await?;
        }
        pipe.flush().await?;
        Ok(())
    }

    fn kill(&self) {
        let sender = self.kill.lock().ok().and_then(|mut slot| slot.take());
        if let Some(sender) = sender {
            let _ = sender.send(());
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.hub.subscribe()
    }
}

/// Own the child until it exits, forwarding output and the exit code.
async fn supervise(
    id: String,
    mut child: Child,
    events: broadcast::Sender<AgentEvent>,
    mut kill: oneshot::Receiver<()>,
) {
    let stdout = child
        .stdout
        .take()
        .map(|pipe| tokio::spawn(forward_lines(pipe, events.clone())));
    let stderr = child
        .stderr
        .take()
        .map(|pipe| tokio::spawn(forward_lines(pipe, events.clone())));

    // A dropped handle disables the kill branch rather than killing
    let status = tokio::select! {
        status = child.wait() => status,
        Ok(()) = &mut kill => {
            if let Err(e) = child.start_kill() {
                warn!(component = "adapter", event = "kill_failed", agent_id = %id, error = %e, "Failed to kill agent");
            }
            child.wait().await
        }
    };

    for reader in [stdout, stderr].into_iter().flatten() {
        let _ = reader.await;
    }

    let code = match status {
        Ok(status) => status.code(),
        Err(e) => {
            warn!(component = "adapter", event = "wait_failed", agent_id = %id, error = %e, "Failed to wait for agent");
            None
        }
    };

    info!(component = "adapter", event = "process_exited", agent_id = %id, code = ?code, "Agent process exited");
    let _ = events.send(AgentEvent::Exit(code));
}

async fn forward_lines<R>(pipe: R, events: broadcast::Sender<AgentEvent>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(pipe);
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let clean = strip_ansi_escapes::strip(&line);
                let text = String::from_utf8_lossy(&clean).into_owned();
                let _ = events.send(AgentEvent::Output(text));
            }
            Err(e) => {
                debug!(component = "adapter", event = "read_failed", error = %e, "Output stream closed");
                break;
            }
        }
    }
}
