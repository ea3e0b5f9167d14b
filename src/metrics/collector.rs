//! Metrics collection using Prometheus
//!
//! This module provides metrics collection for the arena-room service using
//! Prometheus metrics, grouped by concern.

use crate::service::core::CoreStats;
use crate::types::{EndReason, Playlist};
use anyhow::Result;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Main metrics collector for the arena service
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Service-level metrics
    service_metrics: ServiceMetrics,

    /// Queue metrics
    queue_metrics: QueueMetrics,

    /// Ready-check and match-found metrics
    match_metrics: MatchMetrics,

    /// Live room metrics
    room_metrics: RoomMetrics,

    /// Reconnection metrics
    reconnect_metrics: ReconnectMetrics,

    /// Persistence writer metrics
    persistence_metrics: PersistenceMetrics,

    /// Performance metrics
    performance_metrics: PerformanceMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Open client connections
    pub connections: IntGauge,

    /// Client messages handled, by type and status
    pub messages_total: IntCounterVec,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,

    /// Component health status
    pub component_health: IntGaugeVec,
}

/// Queue metrics
#[derive(Clone)]
pub struct QueueMetrics {
    /// Parties admitted, by playlist
    pub parties_queued_total: IntCounterVec,

    /// Parties put back with priority after a cancelled ready-check
    pub parties_requeued_total: IntCounter,

    /// Parties that left the queue before a match
    pub parties_withdrawn_total: IntCounter,

    /// Parties currently waiting
    pub parties_waiting: IntGauge,

    /// Wait from admission to match proposal, by playlist
    pub queue_wait_time_seconds: HistogramVec,
}

/// Match search and ready-check metrics
#[derive(Clone)]
pub struct MatchMetrics {
    /// Combinations proposed by the finder, by playlist
    pub proposals_total: IntCounterVec,

    /// Ready-checks by outcome (confirmed, declined, expired, disconnected, shutdown)
    pub ready_checks_total: IntCounterVec,

    /// Ready-checks awaiting answers
    pub pending_ready_checks: IntGauge,

    /// Team-average rating gap of proposals
    pub team_gap: Histogram,
}

/// Live room metrics
#[derive(Clone)]
pub struct RoomMetrics {
    /// Rooms currently running
    pub active_rooms: IntGauge,

    /// Rooms created, by playlist
    pub rooms_created_total: IntCounterVec,

    /// Rooms ended, by reason
    pub rooms_ended_total: IntCounterVec,

    /// Match length in seconds
    pub match_duration_seconds: Histogram,

    /// Members abandoned (left or out of grace)
    pub abandons_total: IntCounter,
}

/// Reconnection metrics
#[derive(Clone)]
pub struct ReconnectMetrics {
    /// Reconnection attempts, by result
    pub attempts_total: IntCounterVec,
}

/// Persistence writer metrics
#[derive(Clone)]
pub struct PersistenceMetrics {
    /// Jobs processed, by job kind and status
    pub jobs_total: IntCounterVec,

    /// 1 while the durable backend is bypassed
    pub degraded: IntGauge,
}

/// Performance metrics
#[derive(Clone)]
pub struct PerformanceMetrics {
    /// Duration of one queue scan across all buckets
    pub scan_duration: Histogram,

    /// Duration of one tick across all rooms
    pub tick_duration: Histogram,

    /// Persistence job durations
    pub persistence_duration: HistogramVec,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let queue_metrics = QueueMetrics::new(&registry)?;
        let match_metrics = MatchMetrics::new(&registry)?;
        let room_metrics = RoomMetrics::new(&registry)?;
        let reconnect_metrics = ReconnectMetrics::new(&registry)?;
        let persistence_metrics = PersistenceMetrics::new(&registry)?;
        let performance_metrics = PerformanceMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            queue_metrics,
            match_metrics,
            room_metrics,
            reconnect_metrics,
            persistence_metrics,
            performance_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    pub fn queue(&self) -> &QueueMetrics {
        &self.queue_metrics
    }

    pub fn matches(&self) -> &MatchMetrics {
        &self.match_metrics
    }

    pub fn rooms(&self) -> &RoomMetrics {
        &self.room_metrics
    }

    pub fn reconnects(&self) -> &ReconnectMetrics {
        &self.reconnect_metrics
    }

    pub fn persistence(&self) -> &PersistenceMetrics {
        &self.persistence_metrics
    }

    pub fn performance(&self) -> &PerformanceMetrics {
        &self.performance_metrics
    }

    /// Refresh gauges from the core's current statistics
    pub fn update_from_core_stats(&self, stats: &CoreStats) {
        self.service_metrics
            .connections
            .set(stats.connections as i64);
        self.queue_metrics
            .parties_waiting
            .set(stats.parties_queued as i64);
        self.match_metrics
            .pending_ready_checks
            .set(stats.pending_ready_checks as i64);
        self.room_metrics.active_rooms.set(stats.live_rooms as i64);
    }

    /// Record a client message being handled
    pub fn record_message(&self, kind: &str, success: bool) {
        let status = if success { "ok" } else { "rejected" };
        self.service_metrics
            .messages_total
            .with_label_values(&[kind, status])
            .inc();
    }

    /// Record a party admitted to the queue
    pub fn record_enqueue(&self, playlist: Playlist) {
        self.queue_metrics
            .parties_queued_total
            .with_label_values(&[playlist.as_str()])
            .inc();
    }

    pub fn record_requeue(&self, count: usize) {
        self.queue_metrics
            .parties_requeued_total
            .inc_by(count as u64);
    }

    pub fn record_withdrawal(&self) {
        self.queue_metrics.parties_withdrawn_total.inc();
    }

    /// Record a combination found by the finder
    pub fn record_proposal(&self, playlist: Playlist, team_gap: f64, waits: &[f64]) {
        self.match_metrics
            .proposals_total
            .with_label_values(&[playlist.as_str()])
            .inc();
        self.match_metrics.team_gap.observe(team_gap);
        for wait in waits {
            self.queue_metrics
                .queue_wait_time_seconds
                .with_label_values(&[playlist.as_str()])
                .observe(*wait);
        }
    }

    /// Record a ready-check reaching a terminal state
    pub fn record_ready_check(&self, outcome: &str) {
        self.match_metrics
            .ready_checks_total
            .with_label_values(&[outcome])
            .inc();
    }

    pub fn record_room_created(&self, playlist: Playlist) {
        self.room_metrics
            .rooms_created_total
            .with_label_values(&[playlist.as_str()])
            .inc();
    }

    /// Record a room ending
    pub fn record_room_ended(&self, reason: EndReason, duration_seconds: f64, abandons: usize) {
        let reason = match reason {
            EndReason::ScoreLimit => "score_limit",
            EndReason::TimeLimit => "time_limit",
            EndReason::Abandoned => "abandoned",
            EndReason::ServerShutdown => "server_shutdown",
        };
        self.room_metrics
            .rooms_ended_total
            .with_label_values(&[reason])
            .inc();
        self.room_metrics
            .match_duration_seconds
            .observe(duration_seconds.max(0.0));
        self.room_metrics.abandons_total.inc_by(abandons as u64);
    }

    pub fn record_reconnect(&self, accepted: bool) {
        let result = if accepted { "accepted" } else { "rejected" };
        self.reconnect_metrics
            .attempts_total
            .with_label_values(&[result])
            .inc();
    }

    /// Record one persistence job
    pub fn record_persistence(&self, kind: &str, success: bool, duration: Duration) {
        let status = if success { "success" } else { "error" };
        self.persistence_metrics
            .jobs_total
            .with_label_values(&[kind, status])
            .inc();
        self.performance_metrics
            .persistence_duration
            .with_label_values(&[kind])
            .observe(duration.as_secs_f64());
    }

    pub fn set_persistence_degraded(&self, degraded: bool) {
        self.persistence_metrics
            .degraded
            .set(if degraded { 1 } else { 0 });
    }

    pub fn record_scan(&self, duration: Duration) {
        self.performance_metrics
            .scan_duration
            .observe(duration.as_secs_f64());
    }

    pub fn record_tick(&self, duration: Duration) {
        self.performance_metrics
            .tick_duration
            .observe(duration.as_secs_f64());
    }

    /// Update health status
    pub fn update_health_status(&self, status: u8) {
        self.service_metrics.health_status.set(status as i64);
    }

    /// Update component health
    pub fn update_component_health(&self, component: &str, healthy: bool) {
        let status = if healthy { 1 } else { 0 };
        self.service_metrics
            .component_health
            .with_label_values(&[component])
            .set(status);
    }

    /// Create a timer for measuring operation duration
    pub fn start_timer(&self) -> MetricsTimer {
        MetricsTimer::new()
    }
}

/// Timer for measuring operation durations
pub struct MetricsTimer {
    start: Instant,
}

impl MetricsTimer {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get the elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer and return the duration
    pub fn stop(self) -> Duration {
        self.elapsed()
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds =
            IntGauge::new("arena_room_uptime_seconds", "Service uptime in seconds")?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let connections = IntGauge::new("arena_room_connections", "Open client connections")?;
        registry.register(Box::new(connections.clone()))?;

        let messages_total = IntCounterVec::new(
            Opts::new("arena_room_messages_total", "Client messages handled"),
            &["type", "status"],
        )?;
        registry.register(Box::new(messages_total.clone()))?;

        let health_status = IntGauge::new(
            "arena_room_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        let component_health = IntGaugeVec::new(
            Opts::new("arena_room_component_health", "Component health status"),
            &["component"],
        )?;
        registry.register(Box::new(component_health.clone()))?;

        Ok(Self {
            uptime_seconds,
            connections,
            messages_total,
            health_status,
            component_health,
        })
    }
}

impl QueueMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let parties_queued_total = IntCounterVec::new(
            Opts::new("arena_room_parties_queued_total", "Parties admitted"),
            &["playlist"],
        )?;
        registry.register(Box::new(parties_queued_total.clone()))?;

        let parties_requeued_total = IntCounter::new(
            "arena_room_parties_requeued_total",
            "Parties re-queued with priority",
        )?;
        registry.register(Box::new(parties_requeued_total.clone()))?;

        let parties_withdrawn_total = IntCounter::new(
            "arena_room_parties_withdrawn_total",
            "Parties that left the queue",
        )?;
        registry.register(Box::new(parties_withdrawn_total.clone()))?;

        let parties_waiting =
            IntGauge::new("arena_room_parties_waiting", "Parties currently waiting")?;
        registry.register(Box::new(parties_waiting.clone()))?;

        let queue_wait_time_seconds = HistogramVec::new(
            HistogramOpts::new(
                "arena_room_queue_wait_time_seconds",
                "Wait from admission to match proposal",
            )
            .buckets(vec![1.0, 5.0, 10.0, 20.0, 30.0, 60.0, 120.0, 300.0]),
            &["playlist"],
        )?;
        registry.register(Box::new(queue_wait_time_seconds.clone()))?;

        Ok(Self {
            parties_queued_total,
            parties_requeued_total,
            parties_withdrawn_total,
            parties_waiting,
            queue_wait_time_seconds,
        })
    }
}

impl MatchMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let proposals_total = IntCounterVec::new(
            Opts::new("arena_room_proposals_total", "Match combinations proposed"),
            &["playlist"],
        )?;
        registry.register(Box::new(proposals_total.clone()))?;

        let ready_checks_total = IntCounterVec::new(
            Opts::new("arena_room_ready_checks_total", "Ready-checks by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(ready_checks_total.clone()))?;

        let pending_ready_checks = IntGauge::new(
            "arena_room_pending_ready_checks",
            "Ready-checks awaiting answers",
        )?;
        registry.register(Box::new(pending_ready_checks.clone()))?;

        let team_gap = Histogram::with_opts(
            HistogramOpts::new(
                "arena_room_team_gap",
                "Team-average rating gap of proposals",
            )
            .buckets(vec![0.0, 10.0, 25.0, 50.0, 100.0, 200.0, 400.0]),
        )?;
        registry.register(Box::new(team_gap.clone()))?;

        Ok(Self {
            proposals_total,
            ready_checks_total,
            pending_ready_checks,
            team_gap,
        })
    }
}

impl RoomMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let active_rooms = IntGauge::new("arena_room_active_rooms", "Rooms currently running")?;
        registry.register(Box::new(active_rooms.clone()))?;

        let rooms_created_total = IntCounterVec::new(
            Opts::new("arena_room_rooms_created_total", "Rooms created"),
            &["playlist"],
        )?;
        registry.register(Box::new(rooms_created_total.clone()))?;

        let rooms_ended_total = IntCounterVec::new(
            Opts::new("arena_room_rooms_ended_total", "Rooms ended"),
            &["reason"],
        )?;
        registry.register(Box::new(rooms_ended_total.clone()))?;

        let match_duration_seconds = Histogram::with_opts(
            HistogramOpts::new("arena_room_match_duration_seconds", "Match length")
                .buckets(vec![30.0, 60.0, 120.0, 180.0, 240.0, 300.0, 360.0]),
        )?;
        registry.register(Box::new(match_duration_seconds.clone()))?;

        let abandons_total =
            IntCounter::new("arena_room_abandons_total", "Members that abandoned")?;
        registry.register(Box::new(abandons_total.clone()))?;

        Ok(Self {
            active_rooms,
            rooms_created_total,
            rooms_ended_total,
            match_duration_seconds,
            abandons_total,
        })
    }
}

impl ReconnectMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let attempts_total = IntCounterVec::new(
            Opts::new(
                "arena_room_reconnect_attempts_total",
                "Reconnection attempts",
            ),
            &["result"],
        )?;
        registry.register(Box::new(attempts_total.clone()))?;

        Ok(Self { attempts_total })
    }
}

impl PersistenceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let jobs_total = IntCounterVec::new(
            Opts::new("arena_room_persistence_jobs_total", "Persistence jobs"),
            &["job", "status"],
        )?;
        registry.register(Box::new(jobs_total.clone()))?;

        let degraded = IntGauge::new(
            "arena_room_persistence_degraded",
            "1 while writes go to the in-memory fallback",
        )?;
        registry.register(Box::new(degraded.clone()))?;

        Ok(Self {
            jobs_total,
            degraded,
        })
    }
}

impl PerformanceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let scan_duration = Histogram::with_opts(
            HistogramOpts::new(
                "arena_room_scan_duration_seconds",
                "Queue scan duration",
            )
            .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1]),
        )?;
        registry.register(Box::new(scan_duration.clone()))?;

        let tick_duration = Histogram::with_opts(
            HistogramOpts::new("arena_room_tick_duration_seconds", "Room tick duration")
                .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.0167]),
        )?;
        registry.register(Box::new(tick_duration.clone()))?;

        let persistence_duration = HistogramVec::new(
            HistogramOpts::new(
                "arena_room_persistence_duration_seconds",
                "Persistence job duration",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["job"],
        )?;
        registry.register(Box::new(persistence_duration.clone()))?;

        Ok(Self {
            scan_duration,
            tick_duration,
            persistence_duration,
        })
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new().expect("Failed to create default metrics collector")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::{Encoder, TextEncoder};

    fn render(collector: &MetricsCollector) -> String {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&collector.registry().gather(), &mut buffer)
            .unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn test_metrics_collector_creation() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");

        let _service = collector.service();
        let _queue = collector.queue();
        let _matches = collector.matches();
        let _rooms = collector.rooms();
        let _reconnects = collector.reconnects();
        let _persistence = collector.persistence();
        let _performance = collector.performance();
    }

    #[test]
    fn test_queue_and_match_recording() {
        let collector = MetricsCollector::new().unwrap();
        collector.record_enqueue(Playlist::Duel);
        collector.record_enqueue(Playlist::Duel);
        collector.record_proposal(Playlist::Duel, 12.0, &[3.0, 4.5]);
        collector.record_ready_check("confirmed");

        assert_eq!(
            collector
                .queue()
                .parties_queued_total
                .with_label_values(&["duel"])
                .get(),
            2
        );
        let text = render(&collector);
        assert!(text.contains("arena_room_ready_checks_total"));
        assert!(text.contains("outcome=\"confirmed\""));
    }

    #[test]
    fn test_room_recording() {
        let collector = MetricsCollector::new().unwrap();
        collector.record_room_created(Playlist::Doubles);
        collector.record_room_ended(EndReason::Abandoned, 95.0, 2);
        collector.record_reconnect(true);
        collector.record_reconnect(false);

        assert_eq!(collector.rooms().abandons_total.get(), 2);
        assert_eq!(
            collector
                .rooms()
                .rooms_ended_total
                .with_label_values(&["abandoned"])
                .get(),
            1
        );
        assert_eq!(
            collector
                .reconnects()
                .attempts_total
                .with_label_values(&["rejected"])
                .get(),
            1
        );
    }

    #[test]
    fn test_core_stats_update_gauges() {
        let collector = MetricsCollector::new().unwrap();
        let stats = CoreStats {
            connections: 5,
            parties_queued: 3,
            pending_ready_checks: 1,
            live_rooms: 2,
            ..CoreStats::default()
        };
        collector.update_from_core_stats(&stats);
        assert_eq!(collector.service().connections.get(), 5);
        assert_eq!(collector.queue().parties_waiting.get(), 3);
        assert_eq!(collector.rooms().active_rooms.get(), 2);
    }

    #[test]
    fn test_health_status_updates() {
        let collector = MetricsCollector::new().unwrap();
        collector.update_health_status(2);
        collector.update_component_health("persistence", false);
        collector.set_persistence_degraded(true);
        assert_eq!(collector.service().health_status.get(), 2);
        assert_eq!(collector.persistence().degraded.get(), 1);
    }

    #[test]
    fn test_metrics_timer() {
        let collector = MetricsCollector::new().unwrap();
        let timer = collector.start_timer();
        std::thread::sleep(Duration::from_millis(10));
        assert!(timer.elapsed() >= Duration::from_millis(10));
        collector.record_scan(timer.stop());
    }
}
