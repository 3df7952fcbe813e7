//! Server core: agent lifecycle, message dispatch and the tick loop
//!
//! [`ArenaServer`] owns the game and the agent registry. Network tasks only
//! push mutation batches into a pending list; the tick loop swaps that list
//! out, steps the game, and fans the perceptions out to every agent.

use crate::agent_manager::{AgentManager, AgentProxy, AgentRecord};
use crate::config::{AgentDescriptor, GameDescription};
use crate::error::{DispatchError, OrchestratorError, ServerError};
use crate::game::{AgentMutationBatch, EntityId, Game};
use crate::mq::{MessageBroker, MqMessage, MqPayload};
use crate::network::{AgentMessageDispatcher, CommEvent, CommServer, Connection, DispatchFuture};
use crate::orchestrator::{AgentContainer, ContainerOrchestrator, OrchestratorEvent};
use crate::viz::StateUpdate;
use log::{debug, error, info, warn};
use serde_json::json;
use shared::protocol::{
    is_supported_version, ActionsPayload, AgentMessage, HandshakePayload, METHOD_ACTIONS, METHOD_HANDSHAKE,
};
use shared::Vector2;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{interval, sleep, MissedTickBehavior};
use uuid::Uuid;

pub const CLOSE_CONNECTION_BEFORE_KILL: Duration = Duration::from_secs(1);
pub const AGENTS_READY_DELAY: Duration = Duration::from_millis(100);
pub const APP_NAME: &str = "arena-server";

const STATE_UPDATE_BUFFER: usize = 64;

pub type TearDownCallback = Box<dyn FnOnce() + Send>;

#[derive(Debug, Clone)]
pub struct ArenaConfig {
    /// Address the comm server binds to
    pub host: String,
    pub port: u16,
    /// Stop ticking after this long; `None` runs until stopped
    pub game_duration: Option<Duration>,
    /// Spawn the roster's agent processes on start
    pub start_agents: bool,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: shared::DEFAULT_PORT,
            game_duration: None,
            start_agents: true,
        }
    }
}

/// Rolling window of tick durations, one second worth of ticks
#[derive(Debug)]
pub struct TickStats {
    window: usize,
    samples: Vec<Duration>,
}

impl TickStats {
    pub fn new(tps: u32) -> Self {
        let window = tps.max(1) as usize;
        Self {
            window,
            samples: Vec::with_capacity(window),
        }
    }

    pub fn record(&mut self, turn: u32, duration: Duration) {
        if self.samples.len() < self.window {
            self.samples.push(duration);
        } else {
            self.samples[turn as usize % self.window] = duration;
        }
    }

    pub fn mean(&self) -> Duration {
        if self.samples.is_empty() {
            return Duration::ZERO;
        }
        self.samples.iter().sum::<Duration>() / self.samples.len() as u32
    }
}

pub struct ArenaServer {
    uuid: Uuid,
    config: ArenaConfig,
    description: GameDescription,
    tps: u32,

    game: tokio::sync::Mutex<Box<dyn Game>>,
    agents: Mutex<AgentManager>,
    pending_mutations: Mutex<Vec<AgentMutationBatch>>,
    expected_agents: AtomicUsize,

    comm: CommServer,
    comm_events: Mutex<Option<mpsc::Receiver<CommEvent>>>,
    local_addr: Mutex<Option<SocketAddr>>,
    orchestrator: Arc<dyn ContainerOrchestrator>,
    broker: Arc<dyn MessageBroker>,

    turn: AtomicU32,
    local_sequence: AtomicU64,
    tick_stats: Mutex<TickStats>,
    ticking: AtomicBool,
    game_running: AtomicBool,
    game_over: Arc<AtomicBool>,
    stop_ticking: Arc<watch::Sender<bool>>,
    finished: watch::Sender<bool>,
    closed: watch::Sender<bool>,

    tear_down_calls: Mutex<Vec<TearDownCallback>>,
    state_updates: broadcast::Sender<StateUpdate>,
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl ArenaServer {
    pub fn new(
        description: GameDescription,
        mut game: Box<dyn Game>,
        config: ArenaConfig,
        orchestrator: Arc<dyn ContainerOrchestrator>,
        broker: Arc<dyn MessageBroker>,
    ) -> Arc<Self> {
        let address = format!("{}:{}", config.host, config.port);
        let (comm, comm_events) = CommServer::new(&address);

        let game_over = Arc::new(AtomicBool::new(false));
        let (stop_ticking, _) = watch::channel(false);
        let stop_ticking = Arc::new(stop_ticking);

        // The game may decide by itself that it is over (maze exit)
        let flag = Arc::clone(&game_over);
        let stop = Arc::clone(&stop_ticking);
        game.set_game_over_callback(Box::new(move || {
            flag.store(true, Ordering::SeqCst);
            stop.send_replace(true);
        }));

        let (state_updates, _) = broadcast::channel(STATE_UPDATE_BUFFER);
        let tps = description.tps.max(1);

        Arc::new(Self {
            uuid: Uuid::new_v4(),
            tps,
            expected_agents: AtomicUsize::new(description.expected_agents()),
            description,
            config,
            game: tokio::sync::Mutex::new(game),
            agents: Mutex::new(AgentManager::new()),
            pending_mutations: Mutex::new(Vec::new()),
            comm,
            comm_events: Mutex::new(Some(comm_events)),
            local_addr: Mutex::new(None),
            orchestrator,
            broker,
            turn: AtomicU32::new(0),
            local_sequence: AtomicU64::new(0),
            tick_stats: Mutex::new(TickStats::new(tps)),
            ticking: AtomicBool::new(false),
            game_running: AtomicBool::new(false),
            game_over,
            stop_ticking,
            finished: watch::channel(false).0,
            closed: watch::channel(false).0,
            tear_down_calls: Mutex::new(Vec::new()),
            state_updates,
        })
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn description(&self) -> &GameDescription {
        &self.description
    }

    pub fn tps(&self) -> u32 {
        self.tps
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        *locked(&self.local_addr)
    }

    pub fn current_turn(&self) -> u32 {
        self.turn.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.game_running.load(Ordering::SeqCst)
    }

    pub fn is_game_over(&self) -> bool {
        self.game_over.load(Ordering::SeqCst)
    }

    pub fn handshaked_count(&self) -> usize {
        locked(&self.agents).handshaked_count()
    }

    pub fn agent_count(&self) -> usize {
        locked(&self.agents).len()
    }

    pub fn pending_mutation_count(&self) -> usize {
        locked(&self.pending_mutations).len()
    }

    ///Returns the registered agent ids, in registration order
    pub fn agent_ids(&self) -> Vec<Uuid> {
        let mut proxies = locked(&self.agents).proxies();
        proxies.sort_by_key(|proxy| proxy.entity());
        proxies.iter().map(|proxy| proxy.id()).collect()
    }

    pub fn agent_entity(&self, agent: &Uuid) -> Option<EntityId> {
        locked(&self.agents).get(agent).map(|record| record.proxy.entity())
    }

    pub fn subscribe_state_updates(&self) -> broadcast::Receiver<StateUpdate> {
        self.state_updates.subscribe()
    }

    pub async fn viz_init_json(&self) -> Vec<u8> {
        self.game.lock().await.viz_init_json()
    }

    pub async fn agent_perception(&self, entity: EntityId) -> Vec<u8> {
        self.game.lock().await.agent_perception(entity)
    }

    pub fn add_tear_down_call(&self, callback: TearDownCallback) {
        locked(&self.tear_down_calls).push(callback);
    }

    ///////////////////////////////////////////////////////////////////////////
    // Lifecycle
    ///////////////////////////////////////////////////////////////////////////

    /// Listens, registers the roster and spawns its agents.
    ///
    /// Ticking starts once every expected agent has handshaked.
    pub async fn start(self: &Arc<Self>) -> Result<SocketAddr, ServerError> {
        let addr = self.listen().await?;
        self.spawn_orchestrator_drain();

        for descriptor in &self.description.agents {
            let agent = self.register_agent(descriptor).await?;
            if self.config.start_agents {
                self.start_agent_container(agent, addr.port())?;
            } else {
                info!(
                    "Agent {} waits for an external connection with id {}",
                    descriptor.manifest.name, agent
                );
            }
        }

        let broker = Arc::clone(&self.broker);
        let game_id = self.description.id.clone();
        let uuid = self.uuid;
        self.add_tear_down_call(Box::new(move || {
            let message = MqMessage::new(
                APP_NAME,
                format!("Arena Server {}, game {} stopped", uuid, game_id),
            )
            .with_payload(launch_payload(&game_id, uuid));

            if let Err(e) = broker.publish("game", "stopped", &message) {
                warn!("Failed to publish game stopped; {}", e);
            }
        }));

        self.check_agents_ready();
        Ok(addr)
    }

    pub async fn listen(self: &Arc<Self>) -> Result<SocketAddr, ServerError> {
        let addr = self.comm.listen(Arc::clone(self)).await?;
        *locked(&self.local_addr) = Some(addr);
        info!("Arena server listening on {}", addr);

        if let Some(events) = locked(&self.comm_events).take() {
            self.spawn_comm_drain(events);
        }

        Ok(addr)
    }

    pub fn send_launched(&self) {
        let payload = launch_payload(&self.description.id, self.uuid);
        let message = MqMessage::new(APP_NAME, format!("Arena Server {} launched", self.uuid))
            .with_payload(payload.clone());

        if let Err(e) = self.broker.publish("game", "launched", &message) {
            warn!("Failed to publish game launched; {}", e);
        }
        info!("Send game launched: {}", serde_json::Value::Object(payload));
    }

    /// Stops ticking and releases every agent.
    pub async fn stop(&self) {
        self.game_running.store(false, Ordering::SeqCst);
        debug!("TearDown from stop");
        self.tear_down().await;
    }

    pub async fn tear_down(&self) {
        debug!("teardown");

        let callbacks = std::mem::take(&mut *locked(&self.tear_down_calls));
        for callback in callbacks.into_iter().rev() {
            callback();
        }

        self.close_all_agent_connections().await;
        self.orchestrator.tear_down_all();
        self.closed.send_replace(true);
    }

    /// Resolves when the tick loop has ended.
    pub async fn wait_game_over(&self) {
        let mut finished = self.finished.subscribe();
        let _ = finished.wait_for(|done| *done).await;
    }

    /// Resolves after [`ArenaServer::tear_down`].
    pub async fn wait_closed(&self) {
        let mut closed = self.closed.subscribe();
        let _ = closed.wait_for(|done| *done).await;
    }

    async fn close_all_agent_connections(&self) {
        let connections: Vec<Connection> = locked(&self.agents)
            .proxies()
            .iter()
            .filter_map(|proxy| proxy.connection().cloned())
            .collect();

        let closing: Vec<_> = connections
            .into_iter()
            .map(|connection| {
                tokio::spawn(async move {
                    if !connection.close().await {
                        debug!("Agent connection {} was already closed", connection.peer());
                    }
                    sleep(CLOSE_CONNECTION_BEFORE_KILL).await;
                })
            })
            .collect();

        for handle in closing {
            let _ = handle.await;
        }
    }

    ///////////////////////////////////////////////////////////////////////////
    // Agents
    ///////////////////////////////////////////////////////////////////////////

    /// Creates the agent's entity at the next free start point.
    pub async fn register_agent(&self, descriptor: &AgentDescriptor) -> Result<Uuid, ServerError> {
        let spawn = self.next_spawn(descriptor)?;
        let entity = self.game.lock().await.new_entity_agent(descriptor, spawn);

        Ok(locked(&self.agents).insert(AgentRecord {
            proxy: AgentProxy::network(entity),
            descriptor: descriptor.clone(),
            spawn,
            container: None,
            handshaked: false,
        }))
    }

    /// Registers an in-process agent. It needs no handshake.
    pub async fn register_local_agent(self: &Arc<Self>, descriptor: &AgentDescriptor) -> Result<AgentProxy, ServerError> {
        let spawn = self.next_spawn(descriptor)?;
        let entity = self.game.lock().await.new_entity_agent(descriptor, spawn);
        let proxy = AgentProxy::local(entity);

        locked(&self.agents).insert(AgentRecord {
            proxy: proxy.clone(),
            descriptor: descriptor.clone(),
            spawn,
            container: None,
            handshaked: true,
        });
        self.expected_agents.fetch_add(1, Ordering::SeqCst);
        self.check_agents_ready();

        Ok(proxy)
    }

    fn next_spawn(&self, descriptor: &AgentDescriptor) -> Result<Vector2, ServerError> {
        let starts = self.description.map.start_points();
        let index = locked(&self.agents).len();

        starts.get(index).copied().ok_or_else(|| {
            let err = ServerError::NoStartingPoint {
                image: descriptor.image.clone(),
                starts: starts.len(),
            };
            error!("{}", err);
            err
        })
    }

    /// Queues the actions of an in-process agent for the next tick.
    pub fn push_local_actions(&self, proxy: &AgentProxy, actions: Vec<shared::AgentAction>) {
        let sequence = self.local_sequence.fetch_add(1, Ordering::SeqCst);
        locked(&self.pending_mutations).push(AgentMutationBatch {
            agent_proxy: proxy.id(),
            entity: proxy.entity(),
            mutations: actions,
            sequence,
        });
    }

    fn start_agent_container(self: &Arc<Self>, agent: Uuid, port: u16) -> Result<(), ServerError> {
        let (image, name) = match locked(&self.agents).get(&agent) {
            Some(record) => (record.descriptor.image.clone(), record.name().to_string()),
            None => return Err(DispatchError::UnknownAgent(agent).into()),
        };

        let container = self
            .create_and_start(agent, port, &image)
            .map_err(|e| ServerError::from(e).for_agent(name.clone(), "could not start agent"))?;

        locked(&self.agents).set_container(&agent, container.clone());
        self.spawn_exit_watcher(agent, name, container);
        Ok(())
    }

    fn create_and_start(&self, agent: Uuid, port: u16, image: &str) -> Result<AgentContainer, OrchestratorError> {
        let host = self.orchestrator.host()?;
        let container = self.orchestrator.create_agent_container(agent, &host, port, image)?;
        self.orchestrator.start_agent_container(&container)?;
        Ok(container)
    }

    fn spawn_exit_watcher(self: &Arc<Self>, agent: Uuid, name: String, container: AgentContainer) {
        let server = Arc::downgrade(self);
        let waiting = self.orchestrator.wait(&container);

        tokio::spawn(async move {
            let exit = waiting.await;
            let Some(server) = server.upgrade() else {
                return;
            };

            if !locked(&server.agents).contains(&agent) {
                debug!("Agent {} container {} is gone", name, container.container_id);
                return;
            }

            match exit {
                Ok(exit) if !server.is_game_over() => {
                    warn!("Agent terminated; {} exited with code {:?}", name, exit.code)
                }
                Ok(_) => info!("Agent {} has stopped", name),
                Err(e) => warn!("Failed to wait for agent {}; {}", name, e),
            }

            server.orchestrator.remove_container(&container);
            server.remove_agent(&agent).await;
        });
    }

    /// Removes the agent with its entity and connection.
    pub async fn remove_agent(&self, agent: &Uuid) -> bool {
        let removed = locked(&self.agents).remove(agent);
        let Some(record) = removed else {
            return false;
        };

        self.game.lock().await.remove_entity_agent(record.proxy.entity());
        if let Some(connection) = record.proxy.connection() {
            connection.close().await;
        }
        true
    }

    async fn remove_agent_conn(&self, connection: &Connection) {
        let removed = {
            let mut agents = locked(&self.agents);
            agents.find_by_connection(connection).and_then(|id| agents.remove(&id))
        };

        if let Some(record) = removed {
            warn!("Agent {} disconnected", record.name());
        }
    }

    /// Replaces the agent with a fresh process at its last spawn point.
    ///
    ///Returns the id of the new agent.
    pub async fn reload_agent(self: &Arc<Self>, agent: Uuid) -> Result<Uuid, ServerError> {
        let was_running = self.game_running.swap(false, Ordering::SeqCst);
        let result = self.reload_agent_inner(agent).await;
        self.game_running.store(was_running, Ordering::SeqCst);

        if let Err(e) = &result {
            error!("Could not reload agent {}; {}", agent, e);
        }
        result
    }

    async fn reload_agent_inner(self: &Arc<Self>, agent: Uuid) -> Result<Uuid, ServerError> {
        let record = locked(&self.agents)
            .get(&agent)
            .cloned()
            .ok_or(DispatchError::UnknownAgent(agent))?;
        let name = record.name().to_string();

        let container = record
            .container
            .clone()
            .ok_or_else(|| ServerError::from(OrchestratorError::ContainerNotFound(agent)).for_agent(name.clone(), "could not reload agent"))?;

        self.game.lock().await.remove_entity_agent(record.proxy.entity());

        if let Some(connection) = record.proxy.connection() {
            connection.close().await;
        }
        locked(&self.agents).remove(&agent);

        let waiting = self.orchestrator.wait(&container);
        self.orchestrator.tear_down(&container);
        self.orchestrator.remove_container(&container);
        waiting
            .await
            .map_err(|e| ServerError::from(e).for_agent(name.clone(), "could not reload agent"))?;

        let entity = self.game.lock().await.new_entity_agent(&record.descriptor, record.spawn);
        let reloaded = locked(&self.agents).insert(AgentRecord {
            proxy: AgentProxy::network(entity),
            descriptor: record.descriptor.clone(),
            spawn: record.spawn,
            container: None,
            handshaked: false,
        });

        let port = self.local_addr().map_or(self.config.port, |addr| addr.port());
        self.start_agent_container(reloaded, port)?;

        Ok(reloaded)
    }

    ///////////////////////////////////////////////////////////////////////////
    // Dispatch
    ///////////////////////////////////////////////////////////////////////////

    pub async fn dispatch(self: &Arc<Self>, message: AgentMessage, connection: Connection, sequence: u64) -> Result<(), DispatchError> {
        let agent = message.agentid;

        if !locked(&self.agents).contains(&agent) {
            // Agents come and go while reloading
            return if self.is_running() {
                Err(DispatchError::UnknownAgent(agent))
            } else {
                Ok(())
            };
        }

        match message.normalized_method().as_str() {
            METHOD_HANDSHAKE => self.handle_handshake(agent, message, connection).await,
            METHOD_ACTIONS => {
                let payload: ActionsPayload =
                    serde_json::from_value(message.payload).map_err(|source| DispatchError::BadPayload {
                        what: "actions",
                        agent,
                        source,
                    })?;

                let entity = self
                    .agent_entity(&agent)
                    .ok_or(DispatchError::UnknownAgent(agent))?;

                locked(&self.pending_mutations).push(AgentMutationBatch {
                    agent_proxy: agent,
                    entity,
                    mutations: payload.actions,
                    sequence,
                });
                Ok(())
            }
            other => Err(DispatchError::UnknownMethod(other.to_string())),
        }
    }

    async fn handle_handshake(self: &Arc<Self>, agent: Uuid, message: AgentMessage, connection: Connection) -> Result<(), DispatchError> {
        if locked(&self.agents).get(&agent).map_or(false, |record| record.handshaked) {
            return Err(DispatchError::DuplicateHandshake(agent));
        }

        let payload: HandshakePayload =
            serde_json::from_value(message.payload).map_err(|source| DispatchError::BadPayload {
                what: "handshake",
                agent,
                source,
            })?;

        let version = payload.normalized_version();
        if !is_supported_version(version) {
            return Err(DispatchError::UnsupportedProtocol {
                agent,
                version: version.to_string(),
            });
        }

        let proxy = {
            let mut agents = locked(&self.agents);
            let record = agents.get(&agent).ok_or(DispatchError::UnknownAgent(agent))?;
            if record.proxy.is_local() {
                return Err(DispatchError::NotNetworked(agent));
            }
            if !agents.mark_handshaked(&agent) {
                return Err(DispatchError::DuplicateHandshake(agent));
            }
            agents.set_connection(&agent, connection);
            agents
                .get(&agent)
                .map(|record| record.proxy.clone())
                .ok_or(DispatchError::UnknownAgent(agent))?
        };

        debug!("Received handshake from agent {}", proxy);

        let welcome = self.game.lock().await.agent_welcome(proxy.entity());
        if let Err(e) = proxy.send_agent_welcome(&welcome).await {
            warn!("Failed to send welcome to agent {}; {}", proxy, e);
        }

        self.check_agents_ready();
        Ok(())
    }

    fn check_agents_ready(self: &Arc<Self>) {
        let expected = self.expected_agents.load(Ordering::SeqCst);
        if self.handshaked_count() < expected || self.ticking.swap(true, Ordering::SeqCst) {
            return;
        }

        let server = Arc::clone(self);
        tokio::spawn(async move {
            info!("Agents are ready; starting in {} ms", AGENTS_READY_DELAY.as_millis());
            sleep(AGENTS_READY_DELAY).await;
            server.start_ticking();
        });
    }

    ///////////////////////////////////////////////////////////////////////////
    // Ticking
    ///////////////////////////////////////////////////////////////////////////

    fn start_ticking(self: &Arc<Self>) {
        if *self.closed.borrow() {
            return;
        }
        self.game_running.store(true, Ordering::SeqCst);

        let stop = Arc::clone(&self.stop_ticking);
        self.add_tear_down_call(Box::new(move || {
            stop.send_replace(true);
        }));

        match self.config.game_duration {
            Some(duration) => {
                info!("Game will run for {:?}", duration);
                let game_over = Arc::clone(&self.game_over);
                let stop = Arc::clone(&self.stop_ticking);

                tokio::spawn(async move {
                    sleep(duration).await;
                    game_over.store(true, Ordering::SeqCst);
                    info!("Game ended after {:?}", duration);
                    stop.send_replace(true);
                });
            }
            None => info!("Game will run indefinitely"),
        }

        let server = Arc::clone(self);
        tokio::spawn(async move { server.run_tick_loop().await });
    }

    async fn run_tick_loop(self: Arc<Self>) {
        let mut stop = self.stop_ticking.subscribe();
        let mut ticker = interval(Duration::from_micros(1_000_000 / self.tps as u64));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = stop.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }

            if *stop.borrow() || self.is_game_over() {
                break;
            }

            self.do_tick().await;
        }

        self.game_over.store(true, Ordering::SeqCst);
        info!("Received stop ticking signal after {} ticks", self.current_turn());
        self.finished.send_replace(true);
    }

    /// Swaps the pending batches out, in per agent arrival order.
    pub fn pop_mutation_batches(&self) -> Vec<AgentMutationBatch> {
        let mut batches = std::mem::take(&mut *locked(&self.pending_mutations));
        batches.sort_by_key(|batch| (batch.agent_proxy, batch.sequence));
        batches
    }

    pub async fn do_tick(self: &Arc<Self>) {
        let begin = Instant::now();
        let turn = self.turn.fetch_add(1, Ordering::SeqCst);
        let dt = 1.0 / self.tps as f64;

        let mutations = self.pop_mutation_batches();
        let proxies = locked(&self.agents).proxies();

        let (perceptions, frame) = {
            let mut game = self.game.lock().await;
            game.step(turn, dt, mutations);

            let perceptions: Vec<(AgentProxy, Vec<u8>)> = proxies
                .into_iter()
                .map(|proxy| {
                    let perception = game.agent_perception(proxy.entity());
                    (proxy, perception)
                })
                .filter(|(_, perception)| !perception.is_empty())
                .collect();

            (perceptions, game.viz_frame_json())
        };

        for (proxy, perception) in perceptions {
            let server = Arc::clone(self);
            tokio::spawn(async move {
                if let Err(e) = proxy.set_perception(&perception).await {
                    if server.is_running() {
                        error!("Failed to send perception to agent {}; {}", proxy, e);
                    }
                }
            });
        }

        // Nobody listening is fine
        let _ = self.state_updates.send(StateUpdate {
            tick: turn,
            frame: Arc::new(frame),
        });

        let last = begin.elapsed();
        let mut stats = locked(&self.tick_stats);
        stats.record(turn, last);

        if turn % self.tps == 0 {
            info!(
                "Tick {}; {:.3} ms mean; {:.3} ms last",
                turn,
                stats.mean().as_secs_f64() * 1000.0,
                last.as_secs_f64() * 1000.0
            );
        }
    }

    ///////////////////////////////////////////////////////////////////////////
    // Event drains
    ///////////////////////////////////////////////////////////////////////////

    fn spawn_comm_drain(self: &Arc<Self>, mut events: mpsc::Receiver<CommEvent>) {
        let server: Weak<Self> = Arc::downgrade(self);

        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    CommEvent::Log(message) => debug!("[commserver] {}", message),
                    CommEvent::Warn(message) => warn!("[commserver] {}", message),
                    CommEvent::Error(message) => error!("[commserver] {}", message),
                    CommEvent::Disconnected { connection, error } => {
                        warn!("Agent connection {} closed; {}", connection.peer(), error);
                        match server.upgrade() {
                            Some(server) => server.remove_agent_conn(&connection).await,
                            None => break,
                        }
                    }
                }
            }
        });
    }

    fn spawn_orchestrator_drain(&self) {
        let Some(mut events) = self.orchestrator.take_events() else {
            return;
        };

        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    OrchestratorEvent::Debug(message) => debug!("{}", message),
                    OrchestratorEvent::AgentLog { name, line, .. } => info!("[{}] {}", name, line),
                }
            }
        });
    }
}

impl AgentMessageDispatcher for ArenaServer {
    fn dispatch_agent_message(
        self: Arc<Self>,
        message: AgentMessage,
        connection: Connection,
        sequence: u64,
    ) -> DispatchFuture {
        Box::pin(async move {
            if let Err(e) = self.dispatch(message, connection, sequence).await {
                error!("Failed to dispatch agent message; {}", e);
            }
        })
    }
}

fn launch_payload(game_id: &str, uuid: Uuid) -> MqPayload {
    let mut payload = MqPayload::new();
    payload.insert("id".into(), json!(game_id));
    payload.insert("arenaserveruuid".into(), json!(uuid.to_string()));
    payload
}
