//! Agent process management.
//!
//! The server core only sees [`ContainerOrchestrator`]. [`ProcessOrchestrator`]
//! runs every agent as a local child process: the "image" is an executable
//! path, optionally followed by whitespace separated arguments.

use crate::error::OrchestratorError;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot, watch};
use uuid::Uuid;

pub const LOG_ENTRY_BUFFER: usize = 100;
pub const DEFAULT_AGENT_HOST: &str = "127.0.0.1";

#[derive(Debug, Clone, PartialEq)]
pub enum OrchestratorEvent {
    Debug(String),
    AgentLog { agent: Uuid, name: String, line: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentContainer {
    pub agent_id: Uuid,
    pub container_id: String,
    pub image: String,
    /// Where the agent must connect to
    pub host: String,
    pub port: u16,
}

/// How a container ended; `code` is `None` when killed or already gone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContainerExit {
    pub code: Option<i32>,
}

pub type WaitFuture = Pin<Box<dyn Future<Output = Result<ContainerExit, OrchestratorError>> + Send + 'static>>;

pub trait ContainerOrchestrator: Send + Sync + 'static {
    fn host(&self) -> Result<String, OrchestratorError>;

    fn create_agent_container(
        &self,
        agent_id: Uuid,
        host: &str,
        port: u16,
        image: &str,
    ) -> Result<AgentContainer, OrchestratorError>;

    fn start_agent_container(&self, container: &AgentContainer) -> Result<(), OrchestratorError>;

    /// Resolves once the container has stopped, or is gone.
    fn wait(&self, container: &AgentContainer) -> WaitFuture;

    fn tear_down(&self, container: &AgentContainer);

    fn remove_container(&self, container: &AgentContainer);

    fn tear_down_all(&self);

    /// Hands out the event stream. Only the first caller gets it.
    fn take_events(&self) -> Option<mpsc::Receiver<OrchestratorEvent>>;
}

struct ProcessEntry {
    container: AgentContainer,
    kill: Option<oneshot::Sender<()>>,
    done_tx: Arc<watch::Sender<Option<ContainerExit>>>,
    done: watch::Receiver<Option<ContainerExit>>,
}

pub struct ProcessOrchestrator {
    host: Option<String>,
    processes: Mutex<HashMap<Uuid, ProcessEntry>>,
    events: mpsc::Sender<OrchestratorEvent>,
    events_rx: Mutex<Option<mpsc::Receiver<OrchestratorEvent>>>,
}

impl ProcessOrchestrator {
    /// `host` is the address handed to the agents; `None` means loopback.
    pub fn new(host: Option<String>) -> Self {
        let (events, events_rx) = mpsc::channel(LOG_ENTRY_BUFFER);

        Self {
            host,
            processes: Mutex::new(HashMap::new()),
            events,
            events_rx: Mutex::new(Some(events_rx)),
        }
    }

    fn emit(&self, event: OrchestratorEvent) {
        emit(&self.events, event);
    }

    fn processes(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, ProcessEntry>> {
        // A poisoned registry is still consistent: entries are inserted and removed whole
        self.processes.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn len(&self) -> usize {
        self.processes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes().is_empty()
    }
}

fn emit(events: &mpsc::Sender<OrchestratorEvent>, event: OrchestratorEvent) {
    if events.try_send(event).is_err() {
        eprintln!("[orchestrator] Log dropped because buffer full");
    }
}

impl ContainerOrchestrator for ProcessOrchestrator {
    fn host(&self) -> Result<String, OrchestratorError> {
        match &self.host {
            Some(host) if host.is_empty() => Err(OrchestratorError::Host("empty host".into())),
            Some(host) => Ok(host.clone()),
            None => Ok(DEFAULT_AGENT_HOST.to_string()),
        }
    }

    fn create_agent_container(
        &self,
        agent_id: Uuid,
        host: &str,
        port: u16,
        image: &str,
    ) -> Result<AgentContainer, OrchestratorError> {
        if image.split_whitespace().next().is_none() {
            return Err(OrchestratorError::Spawn {
                image: image.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty agent image"),
            });
        }

        let container = AgentContainer {
            agent_id,
            container_id: format!("process-{}", agent_id.simple()),
            image: image.to_string(),
            host: host.to_string(),
            port,
        };

        let (done_tx, done) = watch::channel(None);
        self.processes().insert(
            agent_id,
            ProcessEntry {
                container: container.clone(),
                kill: None,
                done_tx: Arc::new(done_tx),
                done,
            },
        );

        Ok(container)
    }

    fn start_agent_container(&self, container: &AgentContainer) -> Result<(), OrchestratorError> {
        self.emit(OrchestratorEvent::Debug(format!("Spawning agent {}", container.image)));

        let mut parts = container.image.split_whitespace();
        let program = parts.next().unwrap_or_default();

        let mut child = Command::new(program)
            .args(parts)
            .env("PORT", container.port.to_string())
            .env("HOST", &container.host)
            .env("AGENTID", container.agent_id.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| OrchestratorError::Spawn {
                image: container.image.clone(),
                source,
            })?;

        let (kill_tx, kill_rx) = oneshot::channel();
        let done_tx = {
            let mut processes = self.processes();
            let entry = processes
                .get_mut(&container.agent_id)
                .ok_or(OrchestratorError::ContainerNotFound(container.agent_id))?;
            entry.kill = Some(kill_tx);
            Arc::clone(&entry.done_tx)
        };

        if let Some(stdout) = child.stdout.take() {
            let events = self.events.clone();
            let agent = container.agent_id;
            let name = container.image.clone();

            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    emit(
                        &events,
                        OrchestratorEvent::AgentLog {
                            agent,
                            name: name.clone(),
                            line,
                        },
                    );
                }
            });
        }

        let events = self.events.clone();
        let container_id = container.container_id.clone();
        tokio::spawn(async move {
            let exit = tokio::select! {
                status = child.wait() => ContainerExit {
                    code: status.ok().and_then(|s| s.code()),
                },
                _ = kill_rx => {
                    emit(&events, OrchestratorEvent::Debug(format!("Killing container {}", container_id)));
                    let _ = child.kill().await;
                    ContainerExit { code: None }
                }
            };

            let _ = done_tx.send(Some(exit));
        });

        Ok(())
    }

    fn wait(&self, container: &AgentContainer) -> WaitFuture {
        let done = self
            .processes()
            .get(&container.agent_id)
            .map(|entry| entry.done.clone());

        Box::pin(async move {
            let Some(mut done) = done else {
                return Ok(ContainerExit::default());
            };

            loop {
                let current = *done.borrow();
                if let Some(exit) = current {
                    return Ok(exit);
                }
                // Every sender is gone: the process was never started and has been removed
                if done.changed().await.is_err() {
                    return Ok(ContainerExit::default());
                }
            }
        })
    }

    fn tear_down(&self, container: &AgentContainer) {
        let kill = self
            .processes()
            .get_mut(&container.agent_id)
            .and_then(|entry| entry.kill.take());

        if let Some(kill) = kill {
            let _ = kill.send(());
        }
    }

    fn remove_container(&self, container: &AgentContainer) {
        self.processes().remove(&container.agent_id);
    }

    fn tear_down_all(&self) {
        let containers: Vec<AgentContainer> = self
            .processes()
            .values()
            .map(|entry| entry.container.clone())
            .collect();

        for container in &containers {
            self.tear_down(container);
        }
    }

    fn take_events(&self) -> Option<mpsc::Receiver<OrchestratorEvent>> {
        self.events_rx.lock().ok().and_then(|mut rx| rx.take())
    }
}
