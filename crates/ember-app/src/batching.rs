//! Folds raw alerts into groups and groups into incidents.
//!
//! Each open group sits behind its own async mutex, keyed by grouping key,
//! so alerts for one key are applied in arrival order while other keys
//! proceed. Incident changes go through the shared [`IncidentStore`] under
//! the incident's own lock. Writes that keep failing after the retry budget
//! are parked and replayed on every sweep.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use ember_core::alert::{AlertGroup, GroupingKey, GroupingPolicy, RawAlert};
use ember_core::events::{AlertReceived, DomainEvent};
use ember_core::incident::Incident;
use ember_ports::error::UseCaseError;
use ember_ports::inbound::AlertIngestor;
use ember_ports::outbound::{AlertRepository, EventPublisher, IncidentRepository};
use ember_ports::types::IngestOutcome;

use crate::clock::Clock;
use crate::error::AppError;
use crate::incident_store::IncidentStore;
use crate::retry::RetryPolicy;
use crate::scheduler::PeriodicJob;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchingConfig {
    pub batch_window: Duration,
    pub min_alerts_for_incident: usize,
    pub sweep_interval: StdDuration,
    pub grouping: GroupingPolicy,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            batch_window: Duration::seconds(300),
            min_alerts_for_incident: 1,
            sweep_interval: StdDuration::from_secs(30),
            grouping: GroupingPolicy::default(),
        }
    }
}

impl BatchingConfig {
    /// Sweep interval, never longer than the batching window.
    pub fn effective_sweep_interval(&self) -> StdDuration {
        match self.batch_window.to_std() {
            Ok(window) if !window.is_zero() => self.sweep_interval.min(window),
            _ => self.sweep_interval,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub closed_groups: usize,
    pub flushed_writes: usize,
    pub pending_writes: usize,
}

struct OpenGroup {
    group: AlertGroup,
    incident: Option<Incident>,
}

type GroupSlot = Arc<tokio::sync::Mutex<Option<OpenGroup>>>;

pub struct BatchingEngine<A, I, EP>
where
    A: AlertRepository,
    I: IncidentRepository,
    EP: EventPublisher,
{
    alerts: A,
    incidents: Arc<IncidentStore<I>>,
    events: EP,
    config: BatchingConfig,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
    groups: Mutex<HashMap<GroupingKey, GroupSlot>>,
    pending: Mutex<VecDeque<RawAlert>>,
}

impl<A, I, EP> BatchingEngine<A, I, EP>
where
    A: AlertRepository,
    I: IncidentRepository,
    EP: EventPublisher,
{
    pub fn new(
        alerts: A,
        incidents: Arc<IncidentStore<I>>,
        events: EP,
        config: BatchingConfig,
        retry: RetryPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            alerts,
            incidents,
            events,
            config,
            retry,
            clock,
            groups: Mutex::new(HashMap::new()),
            pending: Mutex::new(VecDeque::new()),
        }
    }

    pub async fn ingest_alert(
        &self,
        alert: RawAlert,
        now: DateTime<Utc>,
    ) -> Result<IngestOutcome, AppError> {
        alert.validate()?;
        let key = GroupingKey::for_alert(&alert, &self.config.grouping);
        let received = DomainEvent::AlertReceived(AlertReceived {
            alert_id: alert.id().clone(),
            source: alert.source().to_string(),
            severity: alert.severity(),
            occurred_at: now,
        });

        let slot = self.slot(&key);
        let mut guard = slot.lock().await;

        if guard.as_ref().is_some_and(|open| open.group.is_expired(now)) {
            if let Some(closed) = guard.take() {
                tracing::debug!(group_key = %key, alerts = closed.group.len(), "batching window closed");
            }
        }

        let bound = guard
            .as_ref()
            .and_then(|open| open.incident.as_ref())
            .map(|incident| incident.id().clone());
        // Held until the update below is saved or parked.
        let held = match &bound {
            Some(id) => Some(self.incidents.acquire(id).await),
            None => None,
        };

        let closed_externally = match guard.as_mut().and_then(|open| open.incident.as_mut()) {
            Some(cached) => {
                if let Some(fresh) = self.reload(cached).await {
                    *cached = fresh;
                }
                !cached.is_open()
            }
            None => false,
        };
        if closed_externally {
            tracing::info!(group_key = %key, "bound incident was closed, starting a new group");
            *guard = None;
        }

        let open = match guard.take() {
            Some(mut open) => {
                open.group.push(alert);
                open
            }
            None => OpenGroup {
                group: AlertGroup::open(key.clone(), alert, self.config.batch_window, now),
                incident: None,
            },
        };

        let (open, outcome, mut events) = self.settle(open, now).await;
        *guard = Some(open);
        drop(held);
        drop(guard);

        events.insert(0, received);
        self.publish(events).await;
        Ok(outcome)
    }

    /// Applies the newest alert in `open` to its incident, opening one when
    /// the group reaches the threshold.
    async fn settle(
        &self,
        mut open: OpenGroup,
        now: DateTime<Utc>,
    ) -> (OpenGroup, IngestOutcome, Vec<DomainEvent>) {
        let Some(newest) = open.group.alerts().last().cloned() else {
            return (open, IngestOutcome::Buffered { group_size: 0 }, vec![]);
        };

        if let Some(mut incident) = open.incident.take() {
            return match incident.record_alert(&newest, now) {
                Ok(events) => {
                    self.incidents.save_or_park(&incident).await;
                    self.persist_alert(&newest).await;
                    let outcome = IngestOutcome::Updated(incident.id().clone());
                    open.incident = Some(incident);
                    (open, outcome, events)
                }
                Err(e) => {
                    tracing::warn!(incident_id = %incident.id(), error = %e, "could not update incident");
                    open.group.unbind_incident();
                    self.persist_alert(&newest).await;
                    let outcome = IngestOutcome::Buffered {
                        group_size: open.group.len(),
                    };
                    (open, outcome, vec![])
                }
            };
        }

        if open.group.len() >= self.config.min_alerts_for_incident.max(1) {
            let (incident, events) = Incident::open(&open.group, now);
            open.group.bind_incident(incident.id().clone());
            tracing::info!(
                incident_id = %incident.id(),
                severity = %incident.severity(),
                alerts = incident.alert_count(),
                "incident opened"
            );
            self.incidents.save_or_park(&incident).await;
            for alert in open.group.alerts() {
                self.persist_alert(alert).await;
            }
            let outcome = IngestOutcome::Opened(incident.id().clone());
            open.incident = Some(incident);
            return (open, outcome, events);
        }

        self.persist_alert(&newest).await;
        let outcome = IngestOutcome::Buffered {
            group_size: open.group.len(),
        };
        (open, outcome, vec![])
    }

    /// Newest copy of a bound incident, so escalations and status changes
    /// made elsewhere are not overwritten. A parked write of our own counts
    /// as newest. Caller holds the incident's lock.
    async fn reload(&self, cached: &Incident) -> Option<Incident> {
        match self.incidents.load(cached.id()).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(incident_id = %cached.id(), error = %e, "reload failed, using cached incident");
                None
            }
        }
    }

    /// Closes expired groups and replays parked writes.
    pub async fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let flushed_writes = self.incidents.flush().await + self.flush_pending().await;

        let closed_groups = {
            let mut groups = lock(&self.groups);
            let before = groups.len();
            groups.retain(|_, slot| {
                // Someone else holds a handle: an ingest is about to use it.
                if Arc::strong_count(slot) > 1 {
                    return true;
                }
                match slot.try_lock() {
                    Ok(open) => open.as_ref().is_some_and(|o| !o.group.is_expired(now)),
                    Err(_) => true,
                }
            });
            before - groups.len()
        };

        let report = SweepReport {
            closed_groups,
            flushed_writes,
            pending_writes: self.pending_writes(),
        };
        if report.closed_groups > 0 || report.flushed_writes > 0 {
            tracing::debug!(
                closed = report.closed_groups,
                flushed = report.flushed_writes,
                pending = report.pending_writes,
                "batch sweep"
            );
        }
        report
    }

    pub fn open_groups(&self) -> usize {
        lock(&self.groups).len()
    }

    pub fn pending_writes(&self) -> usize {
        lock(&self.pending).len() + self.incidents.parked()
    }

    pub fn config(&self) -> &BatchingConfig {
        &self.config
    }

    fn slot(&self, key: &GroupingKey) -> GroupSlot {
        lock(&self.groups)
            .entry(key.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(None)))
            .clone()
    }

    async fn persist_alert(&self, alert: &RawAlert) {
        if let Err(e) = self.retry.run("save alert", || self.alerts.save(alert)).await {
            tracing::warn!(alert_id = %alert.id(), error = %e, "alert write failed, queued for retry");
            self.park(alert.clone());
        }
    }

    /// Queues an alert write, replacing any older queued write for the same alert.
    fn park(&self, alert: RawAlert) {
        let mut pending = lock(&self.pending);
        pending.retain(|a| a.id() != alert.id());
        pending.push_back(alert);
    }

    async fn flush_pending(&self) -> usize {
        let queued: Vec<RawAlert> = lock(&self.pending).drain(..).collect();
        if queued.is_empty() {
            return 0;
        }

        let mut flushed = 0;
        let mut failed = Vec::new();
        for alert in queued {
            match self.alerts.save(&alert).await {
                Ok(()) => flushed += 1,
                Err(e) => {
                    tracing::debug!(alert_id = %alert.id(), error = %e, "queued alert write still failing");
                    failed.push(alert);
                }
            }
        }

        let mut pending = lock(&self.pending);
        for alert in failed.into_iter().rev() {
            // A newer write for the same alert was queued while we flushed.
            if !pending.iter().any(|a| a.id() == alert.id()) {
                pending.push_front(alert);
            }
        }
        flushed
    }

    async fn publish(&self, events: Vec<DomainEvent>) {
        if events.is_empty() {
            return;
        }
        if let Err(e) = self.events.publish(events).await {
            tracing::warn!(error = %e, "failed to publish batching events");
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[async_trait]
impl<A, I, EP> AlertIngestor for BatchingEngine<A, I, EP>
where
    A: AlertRepository,
    I: IncidentRepository,
    EP: EventPublisher,
{
    async fn ingest_alert(&self, alert: RawAlert) -> Result<IngestOutcome, UseCaseError> {
        let now = self.clock.now();
        BatchingEngine::ingest_alert(self, alert, now)
            .await
            .map_err(Into::into)
    }
}

#[async_trait]
impl<A, I, EP> PeriodicJob for BatchingEngine<A, I, EP>
where
    A: AlertRepository + 'static,
    I: IncidentRepository + 'static,
    EP: EventPublisher + 'static,
{
    fn name(&self) -> &'static str {
        "batch-sweep"
    }

    async fn run(&self) {
        self.sweep(self.clock.now()).await;
    }
}
