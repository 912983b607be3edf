//! Shared write path for incidents.
//!
//! Batching, escalation and operator commands all change incidents. Each of
//! them takes the incident's lock, reads the newest copy through
//! [`IncidentStore::load`], applies its change and saves through here. A
//! write that keeps failing is parked; until it lands, `load` hands out the
//! parked copy instead of the older stored row.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::OwnedMutexGuard;

use ember_core::ids::IncidentId;
use ember_core::incident::Incident;
use ember_ports::error::PortError;
use ember_ports::outbound::IncidentRepository;
use ember_ports::types::IncidentFilter;

use crate::retry::RetryPolicy;

pub type IncidentGuard = OwnedMutexGuard<()>;

type IncidentSlot = Arc<tokio::sync::Mutex<()>>;

pub struct IncidentStore<I>
where
    I: IncidentRepository,
{
    repo: I,
    retry: RetryPolicy,
    slots: Mutex<HashMap<IncidentId, IncidentSlot>>,
    parked: Mutex<HashMap<IncidentId, Incident>>,
}

impl<I> IncidentStore<I>
where
    I: IncidentRepository,
{
    pub fn new(repo: I, retry: RetryPolicy) -> Self {
        Self {
            repo,
            retry,
            slots: Mutex::new(HashMap::new()),
            parked: Mutex::new(HashMap::new()),
        }
    }

    pub fn repo(&self) -> &I {
        &self.repo
    }

    /// Waits for exclusive access to one incident. Hold the guard across
    /// the whole load, change and save.
    pub async fn acquire(&self, id: &IncidentId) -> IncidentGuard {
        let slot = locked(&self.slots)
            .entry(id.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        slot.lock_owned().await
    }

    /// Newest known copy. A parked write wins over the stored row.
    pub async fn load(&self, id: &IncidentId) -> Result<Option<Incident>, PortError> {
        let parked = locked(&self.parked).get(id).cloned();
        if parked.is_some() {
            return Ok(parked);
        }
        self.repo.find_by_id(&id.to_string()).await
    }

    /// Open incidents, including ones that so far only exist as parked writes.
    pub async fn find_open(&self) -> Result<Vec<Incident>, PortError> {
        let mut open = self.repo.find_by_filter(&IncidentFilter::open()).await?;
        let parked: Vec<Incident> = locked(&self.parked)
            .values()
            .filter(|i| i.is_open())
            .cloned()
            .collect();
        for incident in parked {
            if !open.iter().any(|o| o.id() == incident.id()) {
                open.push(incident);
            }
        }
        Ok(open)
    }

    /// Saves with retry. A successful save supersedes any parked copy.
    pub async fn save(&self, incident: &Incident) -> Result<(), PortError> {
        self.retry
            .run("save incident", || self.repo.save(incident))
            .await?;
        locked(&self.parked).remove(incident.id());
        Ok(())
    }

    /// Saves, parking the incident for the next flush when retries run out.
    pub async fn save_or_park(&self, incident: &Incident) {
        if let Err(e) = self.save(incident).await {
            tracing::warn!(incident_id = %incident.id(), error = %e, "incident write failed, queued for retry");
            locked(&self.parked).insert(incident.id().clone(), incident.clone());
        }
    }

    pub fn parked(&self) -> usize {
        locked(&self.parked).len()
    }

    /// One attempt per parked write, each under its incident's lock.
    /// Returns how many landed.
    pub async fn flush(&self) -> usize {
        let ids: Vec<IncidentId> = locked(&self.parked).keys().cloned().collect();
        let mut flushed = 0;
        for id in ids {
            let _held = self.acquire(&id).await;
            let Some(incident) = locked(&self.parked).get(&id).cloned() else {
                continue;
            };
            match self.repo.save(&incident).await {
                Ok(()) => {
                    locked(&self.parked).remove(&id);
                    flushed += 1;
                }
                Err(e) => {
                    tracing::debug!(incident_id = %id, error = %e, "parked incident write still failing");
                }
            }
        }
        self.prune();
        flushed
    }

    /// Drops lock slots nobody holds or waits on.
    fn prune(&self) {
        locked(&self.slots).retain(|_, slot| Arc::strong_count(slot) > 1);
    }
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{ts, MockIncidentRepo};
    use ember_core::alert::{AlertGroup, GroupingKey, GroupingPolicy, RawAlert};
    use ember_core::severity::Severity;
    use std::collections::BTreeMap;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn store() -> IncidentStore<MockIncidentRepo> {
        IncidentStore::new(
            MockIncidentRepo::default(),
            RetryPolicy {
                attempts: 2,
                backoff: Duration::from_millis(1),
            },
        )
    }

    fn incident() -> Incident {
        let at = ts("2025-01-15T10:00:00Z");
        let alert = RawAlert::new("api", "5xx", Severity::Warning, BTreeMap::new(), at).unwrap();
        let key = GroupingKey::for_alert(&alert, &GroupingPolicy::default());
        let group = AlertGroup::open(key, alert, chrono::Duration::seconds(300), at);
        Incident::open(&group, at).0
    }

    fn extra_alert(at: &str) -> RawAlert {
        RawAlert::new("api", "5xx", Severity::Warning, BTreeMap::new(), ts(at)).unwrap()
    }

    #[tokio::test]
    async fn parked_copy_shadows_stored_row() {
        let store = store();
        let mut inc = incident();
        store.save(&inc).await.unwrap();

        inc.record_alert(&extra_alert("2025-01-15T10:01:00Z"), ts("2025-01-15T10:01:00Z"))
            .unwrap();
        store.repo().fail_saves.store(2, Ordering::SeqCst);
        store.save_or_park(&inc).await;
        assert_eq!(store.parked(), 1);
        assert_eq!(store.repo().all()[0].alert_count(), 1);

        let loaded = store.load(inc.id()).await.unwrap().unwrap();
        assert_eq!(loaded.alert_count(), 2);
    }

    #[tokio::test]
    async fn successful_save_clears_parked_copy() {
        let store = store();
        let mut inc = incident();
        store.repo().fail_saves.store(2, Ordering::SeqCst);
        store.save_or_park(&inc).await;
        assert_eq!(store.parked(), 1);

        inc.record_alert(&extra_alert("2025-01-15T10:01:00Z"), ts("2025-01-15T10:01:00Z"))
            .unwrap();
        store.save(&inc).await.unwrap();
        assert_eq!(store.parked(), 0);
        assert_eq!(store.flush().await, 0);
        assert_eq!(store.repo().all()[0].alert_count(), 2);
    }

    #[tokio::test]
    async fn flush_lands_parked_writes() {
        let store = store();
        let inc = incident();
        store.repo().fail_saves.store(3, Ordering::SeqCst);
        store.save_or_park(&inc).await;

        // One injected failure is left, so the first flush still fails.
        assert_eq!(store.flush().await, 0);
        assert_eq!(store.parked(), 1);
        assert_eq!(store.flush().await, 1);
        assert_eq!(store.parked(), 0);
        assert_eq!(store.repo().all().len(), 1);
    }

    #[tokio::test]
    async fn open_incidents_include_parked_ones() {
        let store = store();
        let stored = incident();
        store.save(&stored).await.unwrap();
        let parked = incident();
        store.repo().fail_saves.store(2, Ordering::SeqCst);
        store.save_or_park(&parked).await;

        let open = store.find_open().await.unwrap();
        assert_eq!(open.len(), 2);
        assert!(open.iter().any(|i| i.id() == parked.id()));
    }

    #[tokio::test]
    async fn acquire_serializes_one_incident() {
        let store = Arc::new(store());
        let id = IncidentId::new();
        let held = store.acquire(&id).await;

        let waiter = {
            let store = Arc::clone(&store);
            let id = id.clone();
            tokio::spawn(async move {
                let _guard = store.acquire(&id).await;
            })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        // Other incidents are not blocked.
        drop(store.acquire(&IncidentId::new()).await);

        drop(held);
        waiter.await.unwrap();
        store.prune();
        assert!(locked(&store.slots).is_empty());
    }
}
