//! # Result sink
//!
//! Turns host verdicts into deduplicated, time-limited discovery records and
//! tells the registry about every distinct discovery exactly once.
//!
//! Keys are the address for presence evidence (echo and ARP replies merge
//! into one record) and address plus port for service evidence. Events go
//! out over an unbounded channel: `Discovered` on first sighting, `Removed`
//! when a record expires, is pruned or is re-sighted after it went stale
//! (in which case `Removed` precedes the fresh `Discovered`).

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use netsweep_common::config::PerKind;
use netsweep_common::models::{
    DiscoveryKey, DiscoveryRecord, Evidence, HostVerdict, ProbeKind, RegistryEvent,
};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info};

use crate::vendors;

pub struct ResultSink {
    records: Mutex<HashMap<DiscoveryKey, DiscoveryRecord>>,
    ttls: PerKind<Duration>,
    registry: UnboundedSender<RegistryEvent>,
}

#[derive(Default)]
struct Sighting {
    ttl: Duration,
    kinds: BTreeSet<ProbeKind>,
    best_rtt: Option<Duration>,
    properties: BTreeMap<String, String>,
}

impl Sighting {
    fn observe(&mut self, kind: ProbeKind, ttl: Duration, rtt: Duration) {
        self.ttl = self.ttl.max(ttl);
        self.kinds.insert(kind);
        self.best_rtt = Some(self.best_rtt.map_or(rtt, |best| best.min(rtt)));
    }

    fn into_properties(mut self) -> BTreeMap<String, String> {
        let detected_by: Vec<&str> = self.kinds.iter().map(ProbeKind::as_str).collect();
        self.properties.insert("detectedBy".into(), detected_by.join(","));
        if let Some(rtt) = self.best_rtt {
            self.properties.insert("latencyMs".into(), format!("{:.2}", rtt.as_secs_f64() * 1_000.0));
        }
        self.properties
    }
}

impl ResultSink {
    pub fn new(ttls: PerKind<Duration>, registry: UnboundedSender<RegistryEvent>) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            ttls,
            registry,
        }
    }

    /// A sink together with the receiving end of its registry channel.
    pub fn channel(ttls: PerKind<Duration>) -> (Arc<Self>, UnboundedReceiver<RegistryEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self::new(ttls, tx)), rx)
    }

    pub fn accept(&self, verdict: &HostVerdict) -> Vec<RegistryEvent> {
        self.accept_at(verdict, Instant::now())
    }

    /// Applies `verdict` as seen at `now`, returning the emitted events.
    pub fn accept_at(&self, verdict: &HostVerdict, now: Instant) -> Vec<RegistryEvent> {
        if !verdict.present {
            return Vec::new();
        }

        let sightings = self.sightings(verdict);
        let mut events = Vec::new();
        let mut records = self.lock();
        for (key, sighting) in sightings {
            let ttl = sighting.ttl;
            let properties = sighting.into_properties();

            if let Some(record) = records.get_mut(&key) {
                if !record.is_expired(now) {
                    record.refresh(now, ttl, properties);
                    continue;
                }
                records.remove(&key);
                events.push(RegistryEvent::Removed(key));
            }

            let record = DiscoveryRecord::new(key, properties, ttl, now);
            info!(key = %record.key, "{} discovered", record.label);
            records.insert(key, record.clone());
            events.push(RegistryEvent::Discovered(record));
        }
        // Sent under the lock so the registry sees mutations in map order.
        self.emit(&events);
        drop(records);
        events
    }

    pub fn expire(&self) -> Vec<DiscoveryKey> {
        self.expire_at(Instant::now())
    }

    /// Removes every record whose TTL elapsed by `now`.
    pub fn expire_at(&self, now: Instant) -> Vec<DiscoveryKey> {
        self.remove_where(|record| record.is_expired(now))
    }

    /// Removes every record not seen since `cutoff`.
    pub fn remove_older_than(&self, cutoff: Instant) -> Vec<DiscoveryKey> {
        self.remove_where(|record| record.last_seen < cutoff)
    }

    pub fn remove(&self, key: &DiscoveryKey) -> bool {
        let mut records = self.lock();
        let removed = records.remove(key).is_some();
        if removed {
            self.emit(&[RegistryEvent::Removed(*key)]);
        }
        removed
    }

    /// Snapshot of the live records, ordered by key.
    pub fn records(&self) -> Vec<DiscoveryRecord> {
        let mut records: Vec<DiscoveryRecord> = self.lock().values().cloned().collect();
        records.sort_by_key(|record| record.key);
        records
    }

    pub fn get(&self, key: &DiscoveryKey) -> Option<DiscoveryRecord> {
        self.lock().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove_where(&self, stale: impl Fn(&DiscoveryRecord) -> bool) -> Vec<DiscoveryKey> {
        let mut records = self.lock();
        let mut removed: Vec<DiscoveryKey> = records
            .values()
            .filter(|record| stale(record))
            .map(|record| record.key)
            .collect();
        removed.sort();
        for key in &removed {
            records.remove(key);
        }

        if !removed.is_empty() {
            debug!(count = removed.len(), "Removed stale records");
            let events: Vec<RegistryEvent> = removed.iter().copied().map(RegistryEvent::Removed).collect();
            self.emit(&events);
        }
        removed
    }

    fn sightings(&self, verdict: &HostVerdict) -> BTreeMap<DiscoveryKey, Sighting> {
        let addr = verdict.addr();
        let mut sightings: BTreeMap<DiscoveryKey, Sighting> = BTreeMap::new();

        for outcome in verdict.outcomes.iter().filter(|o| o.reachable) {
            let ttl = self.ttls.get(outcome.kind);
            for evidence in &outcome.evidence {
                let key = match evidence.port() {
                    Some(port) => DiscoveryKey::service(addr, port),
                    None => DiscoveryKey::host(addr),
                };
                let sighting = sightings.entry(key).or_insert_with(|| {
                    let mut base = Sighting::default();
                    base.properties.insert("address".into(), addr.to_string());
                    if let Some(port) = key.port {
                        base.properties.insert("port".into(), port.to_string());
                    }
                    if let Some(interface) = &verdict.target.interface {
                        base.properties.insert("interface".into(), interface.clone());
                    }
                    base
                });
                sighting.observe(outcome.kind, ttl, evidence.rtt());

                if let Evidence::LinkLayer { mac: Some(mac), .. } = evidence {
                    sighting.properties.insert("mac".into(), mac.to_string());
                    if let Some(vendor) = vendors::lookup(*mac) {
                        sighting.properties.insert("vendor".into(), vendor);
                    }
                }
            }
        }
        sightings
    }

    fn emit(&self, events: &[RegistryEvent]) {
        for event in events {
            if self.registry.send(event.clone()).is_err() {
                debug!("Registry channel closed, dropping event");
                break;
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<DiscoveryKey, DiscoveryRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
