// Syncable registry: the mapping from domain identifier to the objects that
// serialize and apply synchronized simulation state.
//
// The registry owns only the synchronization hook. The simulation subsystem
// that mutates a syncable (camera controller, time manager, script engine)
// keeps authority over its semantics and reaches it through `get`/`get_mut`;
// the registry calls `encode`/`decode` at the synchronization points.
//
// Host side: `collect_dirty()` runs once per simulation tick and serializes
// every syncable whose state changed since the last collection.
//
// Client side: `apply()` enforces latest-write-wins. Messages from different
// connections can arrive in any relative order, so each domain keeps a
// watermark of the last applied timestamp; anything not strictly newer is
// dropped (and logged at debug), never queued for later. A decode failure
// (schema mismatch, exhausted buffer) drops that one message with a warning
// and leaves the watermark untouched, so a later complete message still wins.

use std::collections::BTreeMap;

use orrery_protocol::syncbuf::{SyncBuffer, SyncBufferError};
use orrery_protocol::types::DomainType;
use thiserror::Error;

/// A unit of state participating in synchronization. Implementations
/// serialize their full or delta state into a `SyncBuffer` and reconstruct
/// it from one; the dirty flag gates host-side collection.
pub trait Syncable: Send {
    fn encode(&self, buf: &mut SyncBuffer);
    fn decode(&mut self, buf: &mut SyncBuffer) -> Result<(), SyncBufferError>;
    fn is_dirty(&self) -> bool;
    fn clear_dirty(&mut self);
}

/// Errors from applying received state to a registered syncable. Fatal to
/// the offending message only — the connection stays up.
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("no syncable registered for domain {0:?}")]
    UnknownSyncable(DomainType),
    #[error("failed to decode syncable state: {0}")]
    Decode(#[from] SyncBufferError),
}

/// Registry of syncables keyed by domain, with per-domain latest-write-wins
/// watermarks.
#[derive(Default)]
pub struct SyncRegistry {
    syncables: BTreeMap<DomainType, Box<dyn Syncable>>,
    last_applied: BTreeMap<DomainType, f64>,
}

impl SyncRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a syncable under a domain. Re-registering replaces the
    /// previous entry and forgets its applied-timestamp watermark.
    pub fn register(&mut self, domain: DomainType, syncable: Box<dyn Syncable>) {
        self.syncables.insert(domain, syncable);
        self.last_applied.remove(&domain);
    }

    pub fn unregister(&mut self, domain: DomainType) {
        self.syncables.remove(&domain);
        self.last_applied.remove(&domain);
    }

    pub fn get(&self, domain: DomainType) -> Option<&dyn Syncable> {
        self.syncables.get(&domain).map(|s| &**s)
    }

    pub fn get_mut(&mut self, domain: DomainType) -> Option<&mut (dyn Syncable + 'static)> {
        self.syncables.get_mut(&domain).map(|s| &mut **s)
    }

    pub fn is_registered(&self, domain: DomainType) -> bool {
        self.syncables.contains_key(&domain)
    }

    /// Host side, once per synchronization point: serialize every dirty
    /// syncable and clear its dirty flag. Deterministic domain order.
    pub fn collect_dirty(&mut self) -> Vec<(DomainType, Vec<u8>)> {
        let mut collected = Vec::new();
        for (&domain, syncable) in &mut self.syncables {
            if !syncable.is_dirty() {
                continue;
            }
            let mut buf = SyncBuffer::new();
            syncable.encode(&mut buf);
            syncable.clear_dirty();
            collected.push((domain, buf.into_bytes()));
        }
        collected
    }

    /// Client side: decode and apply received state if `timestamp` is
    /// strictly newer than the last applied timestamp for this domain.
    /// Returns `Ok(false)` for a stale message (silently dropped).
    pub fn apply(
        &mut self,
        domain: DomainType,
        timestamp: f64,
        content: &[u8],
    ) -> Result<bool, ApplyError> {
        let syncable = self
            .syncables
            .get_mut(&domain)
            .ok_or(ApplyError::UnknownSyncable(domain))?;

        if let Some(&last) = self.last_applied.get(&domain)
            && timestamp <= last
        {
            log::debug!(
                "dropping stale update for domain {domain:?}: t={timestamp} <= applied t={last}"
            );
            return Ok(false);
        }

        let mut buf = SyncBuffer::from_bytes(content.to_vec());
        syncable.decode(&mut buf)?;
        self.last_applied.insert(domain, timestamp);
        Ok(true)
    }

    /// Watermark of the last applied timestamp for a domain, if any update
    /// has been applied since (re-)registration.
    pub fn last_applied(&self, domain: DomainType) -> Option<f64> {
        self.last_applied.get(&domain).copied()
    }
}
