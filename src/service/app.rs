//! Main application state and service coordination
//!
//! This module wires the arena core to its timers, the persistence writer,
//! the client gateway and the health server, and drives graceful shutdown.

use crate::config::{AppConfig, PersistenceBackend};
use crate::gateway::{GatewayServer, GatewayState};
use crate::metrics::health::HealthServerConfig;
use crate::metrics::{HealthServer, MetricsCollector, MetricsService};
use crate::notifier::ChannelNotifier;
use crate::persistence::{
    run_writer, FileGateway, InMemoryGateway, PersistenceGateway, PersistenceJob, PlayerIdentity,
    ResilientGateway,
};
use crate::protocol::ClientEvent;
use crate::room::EngineFactory;
use crate::service::core::{ArenaCore, CoreStats};
use crate::types::{ConnectionId, RoomId};
use anyhow::Result;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Persistence backend error: {message}")]
    Persistence { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },

    #[error("Background task error: {message}")]
    BackgroundTask { message: String },

    #[error("Arena core is not running")]
    CoreStopped,
}

/// Work handed to the core loop
#[derive(Debug)]
pub enum CoreCommand {
    Connect {
        connection_id: ConnectionId,
        identity: PlayerIdentity,
        rejoin: Option<(RoomId, String)>,
    },
    Event {
        connection_id: ConnectionId,
        event: ClientEvent,
    },
    Disconnect {
        connection_id: ConnectionId,
    },
    /// End everything and stop the loop; replies with the number of rooms ended
    Shutdown { done: oneshot::Sender<usize> },
}

/// Timer periods of the core loop
#[derive(Debug, Clone, Copy)]
pub struct CoreTiming {
    pub scan: Duration,
    pub tick: Duration,
    pub probe: Duration,
}

impl CoreTiming {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            scan: config.matchmaking.scan_interval(),
            tick: config.room.tick_interval(),
            probe: config.matchmaking.latency_probe_interval(),
        }
    }
}

/// Cloneable view of the running service for the gateway and health checks
#[derive(Clone)]
pub struct ServiceHandle {
    name: String,
    commands: mpsc::UnboundedSender<CoreCommand>,
    running: Arc<AtomicBool>,
    stats: Arc<RwLock<CoreStats>>,
    persistence: Arc<dyn PersistenceGateway>,
    resilient: Option<Arc<ResilientGateway>>,
}

impl ServiceHandle {
    pub fn new(
        name: impl Into<String>,
        commands: mpsc::UnboundedSender<CoreCommand>,
        persistence: Arc<dyn PersistenceGateway>,
        resilient: Option<Arc<ResilientGateway>>,
    ) -> Self {
        Self {
            name: name.into(),
            commands,
            running: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(RwLock::new(CoreStats::default())),
            persistence,
            resilient,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Relaxed);
    }

    /// Last statistics published by the core loop
    pub fn stats(&self) -> Result<CoreStats> {
        self.stats
            .read()
            .map(|s| s.clone())
            .map_err(|_| anyhow::anyhow!("Core statistics lock poisoned"))
    }

    pub(crate) fn stats_cell(&self) -> Arc<RwLock<CoreStats>> {
        self.stats.clone()
    }

    pub fn persistence(&self) -> Arc<dyn PersistenceGateway> {
        self.persistence.clone()
    }

    /// True while writes are served by the in-memory fallback
    pub fn persistence_degraded(&self) -> bool {
        self.resilient
            .as_ref()
            .map(|r| r.is_degraded())
            .unwrap_or(false)
    }

    pub fn send(&self, command: CoreCommand) -> Result<(), ServiceError> {
        self.commands
            .send(command)
            .map_err(|_| ServiceError::CoreStopped)
    }
}

/// Drive the core from commands and timers until shutdown
pub async fn run_core(
    mut core: ArenaCore,
    mut commands: mpsc::UnboundedReceiver<CoreCommand>,
    timing: CoreTiming,
    stats: Arc<RwLock<CoreStats>>,
) {
    let mut scan = tokio::time::interval(timing.scan);
    let mut tick = tokio::time::interval(timing.tick);
    let mut probe = tokio::time::interval(timing.probe);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    scan.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let delta = timing.tick.as_secs_f64();

    info!(
        "Arena core running (scan {:?}, tick {:?}, probe {:?})",
        timing.scan, timing.tick, timing.probe
    );

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(CoreCommand::Connect { connection_id, identity, rejoin }) => {
                    core.connect(connection_id, identity, rejoin, Utc::now());
                }
                Some(CoreCommand::Event { connection_id, event }) => {
                    core.handle(connection_id, event, Utc::now());
                }
                Some(CoreCommand::Disconnect { connection_id }) => {
                    core.disconnect(connection_id, Utc::now());
                }
                Some(CoreCommand::Shutdown { done }) => {
                    let ended = core.shutdown(Utc::now());
                    publish(&stats, core.stats());
                    let _ = done.send(ended);
                    break;
                }
                None => {
                    warn!("Command channel closed, shutting the core down");
                    core.shutdown(Utc::now());
                    publish(&stats, core.stats());
                    break;
                }
            },
            _ = scan.tick() => {
                let proposed = core.scan(Utc::now());
                if proposed > 0 {
                    debug!("Scan proposed {} matches", proposed);
                }
                publish(&stats, core.stats());
            }
            _ = tick.tick() => {
                core.tick(delta, Utc::now());
            }
            _ = probe.tick() => {
                core.send_latency_probes(Utc::now());
            }
        }
    }

    info!("Arena core stopped");
}

fn publish(cell: &RwLock<CoreStats>, stats: &CoreStats) {
    match cell.write() {
        Ok(mut current) => *current = stats.clone(),
        Err(_) => warn!("Core statistics lock poisoned, stats not published"),
    }
}

/// Pieces built by `new` and moved into tasks by `start`
struct Pending {
    core: ArenaCore,
    commands: mpsc::UnboundedReceiver<CoreCommand>,
    jobs: mpsc::UnboundedReceiver<PersistenceJob>,
}

/// Main application state containing all service components
pub struct AppState {
    /// Application configuration
    config: AppConfig,

    handle: ServiceHandle,

    notifier: Arc<ChannelNotifier>,

    /// Metrics service for monitoring and health checks
    metrics_service: Arc<MetricsService>,

    gateway: Arc<GatewayServer>,

    pending: Option<Pending>,

    core_task: Option<JoinHandle<()>>,

    writer_task: Option<JoinHandle<u64>>,

    /// Background task handles
    background_tasks: Vec<JoinHandle<()>>,
}

impl AppState {
    /// Initialize the application with all dependencies
    pub async fn new(
        config: AppConfig,
        engines: Arc<dyn EngineFactory>,
    ) -> Result<Self, ServiceError> {
        info!("Initializing arena-room service");
        info!(
            "Configuration: service={}, persistence={:?}, data_dir={}",
            config.service.name,
            config.persistence.backend,
            config.persistence.data_dir.display()
        );

        let metrics_collector =
            Arc::new(
                MetricsCollector::new().map_err(|e| ServiceError::Initialization {
                    message: format!("Failed to create metrics collector: {}", e),
                })?,
            );

        let (persistence, resilient) = Self::initialize_persistence(&config).await?;

        let notifier = Arc::new(ChannelNotifier::new());
        let (jobs_tx, jobs) = mpsc::unbounded_channel();
        let (commands_tx, commands) = mpsc::unbounded_channel();

        let core = ArenaCore::new(
            &config,
            engines,
            notifier.clone(),
            jobs_tx,
            metrics_collector.clone(),
        )
        .map_err(|e| ServiceError::Configuration {
            message: format!("Failed to build arena core: {}", e),
        })?;

        let handle = ServiceHandle::new(
            config.service.name.clone(),
            commands_tx,
            persistence.clone(),
            resilient,
        );

        let health_config = HealthServerConfig {
            port: config.service.health_port,
            host: config.service.bind_address.clone(),
        };
        let health_server = Arc::new(
            HealthServer::new(health_config, metrics_collector.clone()).with_service(handle.clone()),
        );
        let metrics_service = Arc::new(MetricsService::new(metrics_collector, health_server));

        let gateway = Arc::new(GatewayServer::new(
            config.gateway_address(),
            GatewayState::new(handle.clone(), notifier.clone(), persistence),
        ));

        Ok(Self {
            config,
            handle,
            notifier,
            metrics_service,
            gateway,
            pending: Some(Pending {
                core,
                commands,
                jobs,
            }),
            core_task: None,
            writer_task: None,
            background_tasks: Vec::new(),
        })
    }

    /// Start the writer, the core loop, the gateway and the health server
    pub async fn start(&mut self) -> Result<(), ServiceError> {
        info!("Starting arena-room service");

        let pending = self.pending.take().ok_or_else(|| ServiceError::Initialization {
            message: "Service already started".to_string(),
        })?;

        self.handle.set_running(true);

        self.writer_task = Some(tokio::spawn(run_writer(
            self.handle.persistence(),
            pending.jobs,
            self.metrics_service.collector(),
        )));

        self.core_task = Some(tokio::spawn(run_core(
            pending.core,
            pending.commands,
            CoreTiming::from_config(&self.config),
            self.handle.stats_cell(),
        )));

        self.start_metrics_service();
        self.start_gateway();
        self.start_background_tasks();

        info!("✅ arena-room service started successfully");
        Ok(())
    }

    /// Perform graceful shutdown
    pub async fn shutdown(&mut self) -> Result<(), ServiceError> {
        info!("Starting graceful shutdown of arena-room service");
        self.handle.set_running(false);
        let timeout = self.config.shutdown_timeout();

        if let Err(e) = self.gateway.stop() {
            warn!("Failed to stop gateway: {}", e);
        }

        if self.pending.take().is_some() {
            info!("Service was never started, nothing to settle");
        }

        if let Some(task) = self.core_task.take() {
            let (done_tx, done_rx) = oneshot::channel();
            match self.handle.send(CoreCommand::Shutdown { done: done_tx }) {
                Ok(()) => match tokio::time::timeout(timeout, done_rx).await {
                    Ok(Ok(ended)) => info!("✅ Core settled {} live rooms", ended),
                    Ok(Err(_)) => warn!("Core stopped without reporting shutdown"),
                    Err(_) => warn!("Core did not finish shutdown within {:?}", timeout),
                },
                Err(e) => warn!("Could not reach core: {}", e),
            }
            if let Err(e) = task.await {
                error!("Core task failed: {}", e);
            }
        }

        // the core owned every job sender, so the writer drains and exits
        if let Some(task) = self.writer_task.take() {
            match tokio::time::timeout(timeout, task).await {
                Ok(Ok(stored)) => info!("✅ Persistence writer flushed ({} jobs)", stored),
                Ok(Err(e)) => {
                    return Err(ServiceError::BackgroundTask {
                        message: format!("Persistence writer failed: {}", e),
                    })
                }
                Err(_) => warn!("Persistence writer did not drain within {:?}", timeout),
            }
        }

        self.stop_background_tasks().await;

        info!("Stopping metrics service...");
        if let Err(e) = self.metrics_service.stop().await {
            warn!("Failed to stop metrics service: {}", e);
        } else {
            info!("✅ Metrics service stopped");
        }

        match self.handle.stats() {
            Ok(stats) => info!("Final service statistics: {:?}", stats),
            Err(e) => warn!("Final statistics unavailable: {}", e),
        }
        info!("✅ arena-room service shutdown completed");
        Ok(())
    }

    /// Get service configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn handle(&self) -> ServiceHandle {
        self.handle.clone()
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_running()
    }

    pub fn notifier(&self) -> Arc<ChannelNotifier> {
        self.notifier.clone()
    }

    /// Get metrics service
    pub fn metrics_service(&self) -> Arc<MetricsService> {
        self.metrics_service.clone()
    }

    /// Build the configured persistence backend
    async fn initialize_persistence(
        config: &AppConfig,
    ) -> Result<
        (Arc<dyn PersistenceGateway>, Option<Arc<ResilientGateway>>),
        ServiceError,
    > {
        let default_rating = config.rating.default_rating;
        match config.persistence.backend {
            PersistenceBackend::Memory => {
                info!("Using in-memory persistence; data is lost on exit");
                Ok((Arc::new(InMemoryGateway::new(default_rating)), None))
            }
            PersistenceBackend::File => {
                let file = FileGateway::open(&config.persistence.data_dir, default_rating)
                    .await
                    .map_err(|e| ServiceError::Persistence {
                        message: format!(
                            "Failed to open data directory {}: {}",
                            config.persistence.data_dir.display(),
                            e
                        ),
                    })?;
                let resilient = Arc::new(ResilientGateway::new(
                    Arc::new(file),
                    Arc::new(InMemoryGateway::new(default_rating)),
                ));
                Ok((resilient.clone(), Some(resilient)))
            }
        }
    }

    /// Start metrics service
    fn start_metrics_service(&mut self) {
        info!("Starting metrics and health endpoints");

        let metrics_service = self.metrics_service.clone();
        let port = self.config.service.health_port;

        let metrics_handle = tokio::spawn(async move {
            if let Err(e) = metrics_service.start().await {
                error!("Metrics service failed: {}", e);
            } else {
                info!("Metrics service task completed");
            }
        });

        self.background_tasks.push(metrics_handle);
        info!("✅ Metrics service starting on port {}", port);
    }

    fn start_gateway(&mut self) {
        let gateway = self.gateway.clone();
        let address = self.config.gateway_address();
        self.background_tasks.push(tokio::spawn(async move {
            if let Err(e) = gateway.start().await {
                error!("Client gateway failed: {}", e);
            }
        }));
        info!("✅ Client gateway starting on {}", address);
    }

    /// Start background maintenance tasks
    fn start_background_tasks(&mut self) {
        info!("Starting health metrics task (15s interval)...");
        let metrics_collector = self.metrics_service.collector();
        let handle = self.handle.clone();

        let health_metrics_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(15));
            let start_time = tokio::time::Instant::now();
            info!("Health metrics task started");

            while handle.is_running() {
                interval.tick().await;

                let uptime_seconds = start_time.elapsed().as_secs() as i64;
                metrics_collector
                    .service()
                    .uptime_seconds
                    .set(uptime_seconds);

                let degraded = handle.persistence_degraded();
                metrics_collector.set_persistence_degraded(degraded);
                metrics_collector.update_component_health("persistence", !degraded);
                metrics_collector.update_component_health("core", handle.is_running());
                metrics_collector.update_health_status(if degraded { 1 } else { 2 });

                debug!(
                    "Updated service health metrics - uptime: {}s, degraded: {}",
                    uptime_seconds, degraded
                );
            }

            info!("Health metrics task stopped");
        });

        self.background_tasks.push(health_metrics_task);
    }

    /// Stop all background tasks
    async fn stop_background_tasks(&mut self) {
        let task_count = self.background_tasks.len();
        if task_count == 0 {
            info!("No background tasks to stop");
            return;
        }

        info!("Stopping {} background tasks...", task_count);
        for (i, task) in self.background_tasks.drain(..).enumerate() {
            debug!("Aborting background task {}/{}", i + 1, task_count);
            task.abort();
        }

        info!("✅ All {} background tasks stopped", task_count);
    }
}
