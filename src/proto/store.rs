use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use crate::message::record::Record;
use crate::message::RecordType;

// RFC 6762 section 10.2: cache-flush only evicts entries that have been in
// the cache for at least one second.
pub(crate) const CACHE_FLUSH_GRACE: Duration = Duration::from_secs(1);

/// Generation-tagged handle into the record arena.
///
/// Schedulers and query trackers hold these instead of references; once the
/// slot is reused the generation no longer matches and the lookup resolves
/// to "gone".
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct RecordId {
    index: u32,
    generation: u32,
}

/// Lifecycle of an owned record, per RFC 6762 sections 8.1-8.3 and 10.1.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum PublishState {
    /// Querying the link to make sure nobody else claims the name.
    Probing { sent: u8, next: Instant },
    /// Unsolicited responses advertising the record.
    Announcing { sent: u8, next: Instant },
    /// Idle; answers matching questions.
    Published,
    /// TTL=0 responses on the way out; the record is gone after the last.
    Goodbye { remaining: u8, next: Instant },
}

impl PublishState {
    pub(crate) fn deadline(&self) -> Option<Instant> {
        match self {
            PublishState::Probing { next, .. }
            | PublishState::Announcing { next, .. }
            | PublishState::Goodbye { next, .. } => Some(*next),
            PublishState::Published => None,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Origin {
    Owned {
        unique: bool,
        state: PublishState,
    },
    Cached {
        received_at: Instant,
        expires_at: Instant,
        original_ttl: u32,
    },
}

#[derive(Debug, Clone)]
pub(crate) struct Entry {
    pub(crate) record: Record,
    pub(crate) origin: Origin,
}

impl Entry {
    pub(crate) fn is_owned(&self) -> bool {
        matches!(self.origin, Origin::Owned { .. })
    }

    pub(crate) fn is_unique(&self) -> bool {
        matches!(self.origin, Origin::Owned { unique: true, .. })
    }

    pub(crate) fn state(&self) -> Option<PublishState> {
        match &self.origin {
            Origin::Owned { state, .. } => Some(*state),
            Origin::Cached { .. } => None,
        }
    }

    /// Seconds of life left at `now`. Owned records never age.
    pub(crate) fn remaining_ttl(&self, now: Instant) -> u32 {
        match &self.origin {
            Origin::Owned { .. } => self.record.ttl,
            Origin::Cached { expires_at, .. } => {
                expires_at.saturating_duration_since(now).as_secs() as u32
            }
        }
    }

    /// Whether at least half the original TTL remains, the threshold both
    /// for known-answer lists and for honoring another responder's answer
    /// as a substitute for ours.
    pub(crate) fn is_fresh(&self, now: Instant) -> bool {
        match &self.origin {
            Origin::Owned { .. } => true,
            Origin::Cached { original_ttl, .. } => {
                self.remaining_ttl(now) as u64 * 2 >= *original_ttl as u64
            }
        }
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    entry: Option<Entry>,
}

/// What `put_cached` did with an inbound record.
#[derive(Debug)]
pub(crate) enum CacheOutcome {
    New(RecordId),
    Refreshed(RecordId),
    /// A TTL=0 record; anything it named is evicted and returned.
    Goodbye(Vec<Record>),
}

/// Owned and cached records, indexed by lowercase name with per-lookup type
/// filtering, plus a deadline index over cached entries so expiry scans are
/// O(log n).
#[derive(Default)]
pub(crate) struct RecordStore {
    slots: Vec<Slot>,
    free: Vec<u32>,
    by_name: HashMap<String, Vec<RecordId>>,
    expirations: BTreeMap<(Instant, RecordId), ()>,
}

impl RecordStore {
    pub(crate) fn get(&self, id: RecordId) -> Option<&Entry> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.entry.as_ref()
    }

    pub(crate) fn get_mut(&mut self, id: RecordId) -> Option<&mut Entry> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.entry.as_mut()
    }

    pub(crate) fn set_state(&mut self, id: RecordId, state: PublishState) {
        if let Some(entry) = self.get_mut(id) {
            if let Origin::Owned { state: s, .. } = &mut entry.origin {
                *s = state;
            }
        }
    }

    pub(crate) fn insert(&mut self, entry: Entry) -> RecordId {
        let key = entry.record.name.key();
        let expires = match &entry.origin {
            Origin::Cached { expires_at, .. } => Some(*expires_at),
            Origin::Owned { .. } => None,
        };

        let id = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.entry = Some(entry);
                RecordId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    entry: Some(entry),
                });
                RecordId {
                    index,
                    generation: 0,
                }
            }
        };

        self.by_name.entry(key).or_default().push(id);
        if let Some(at) = expires {
            self.expirations.insert((at, id), ());
        }
        id
    }

    pub(crate) fn remove(&mut self, id: RecordId) -> Option<Entry> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let entry = slot.entry.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);

        let key = entry.record.name.key();
        if let Some(ids) = self.by_name.get_mut(&key) {
            ids.retain(|other| *other != id);
            if ids.is_empty() {
                self.by_name.remove(&key);
            }
        }
        if let Origin::Cached { expires_at, .. } = &entry.origin {
            self.expirations.remove(&(*expires_at, id));
        }
        Some(entry)
    }

    /// Handles for every record under a name, in insertion order.
    pub(crate) fn ids_for_name(&self, key: &str) -> Vec<RecordId> {
        self.by_name.get(key).cloned().unwrap_or_default()
    }

    pub(crate) fn all_ids(&self) -> Vec<RecordId> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.entry.is_some())
            .map(|(index, slot)| RecordId {
                index: index as u32,
                generation: slot.generation,
            })
            .collect()
    }

    pub(crate) fn owned_ids(&self) -> Vec<RecordId> {
        self.all_ids()
            .into_iter()
            .filter(|id| self.get(*id).map(Entry::is_owned).unwrap_or(false))
            .collect()
    }

    /// Owned records under (key, rtype); `Any` matches every type.
    pub(crate) fn owned_matching(&self, key: &str, rtype: RecordType) -> Vec<RecordId> {
        self.ids_for_name(key)
            .into_iter()
            .filter(|id| {
                self.get(*id)
                    .map(|e| e.is_owned() && rtype.matches(e.record.rtype()))
                    .unwrap_or(false)
            })
            .collect()
    }

    pub(crate) fn cached_matching(&self, key: &str, rtype: RecordType) -> Vec<RecordId> {
        self.ids_for_name(key)
            .into_iter()
            .filter(|id| {
                self.get(*id)
                    .map(|e| !e.is_owned() && rtype.matches(e.record.rtype()))
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Owned and cached records matching a question, expired entries
    /// evicted first.
    pub(crate) fn lookup(
        &mut self,
        key: &str,
        rtype: RecordType,
        now: Instant,
    ) -> Vec<RecordId> {
        for id in self.ids_for_name(key) {
            if let Some(entry) = self.get(id) {
                if let Origin::Cached { expires_at, .. } = &entry.origin {
                    if *expires_at <= now {
                        self.remove(id);
                    }
                }
            }
        }

        self.ids_for_name(key)
            .into_iter()
            .filter(|id| {
                self.get(*id)
                    .map(|e| rtype.matches(e.record.rtype()))
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Inserts or refreshes a record learned from the network.
    pub(crate) fn put_cached(&mut self, record: &Record, now: Instant) -> CacheOutcome {
        let key = record.name.key();

        if record.ttl == 0 {
            // Goodbye: evict matching data, never store.
            let mut evicted = Vec::new();
            for id in self.ids_for_name(&key) {
                let matches = self.get(id).map(|e| {
                    !e.is_owned()
                        && e.record.rtype() == record.rtype()
                        && e.record.rdata == record.rdata
                });
                if matches == Some(true) {
                    if let Some(entry) = self.remove(id) {
                        evicted.push(entry.record);
                    }
                }
            }
            return CacheOutcome::Goodbye(evicted);
        }

        if record.cache_flush {
            // RFC 6762 section 10.2: flush cached entries of this key that
            // were unique and are older than the grace period.
            for id in self.ids_for_name(&key) {
                let stale = self.get(id).map(|e| match &e.origin {
                    Origin::Cached { received_at, .. } => {
                        e.record.cache_flush
                            && e.record.rtype() == record.rtype()
                            && e.record.rdata != record.rdata
                            && *received_at + CACHE_FLUSH_GRACE <= now
                    }
                    Origin::Owned { .. } => false,
                });
                if stale == Some(true) {
                    self.remove(id);
                }
            }
        }

        // Refresh an existing entry carrying the same data.
        for id in self.ids_for_name(&key) {
            let same = self.get(id).map(|e| {
                !e.is_owned()
                    && e.record.rtype() == record.rtype()
                    && e.record.rdata == record.rdata
            });
            if same == Some(true) {
                let new_expiry = now + Duration::from_secs(record.ttl as u64);
                let mut old_expiry = None;
                if let Some(entry) = self.get_mut(id) {
                    if let Origin::Cached {
                        received_at,
                        expires_at,
                        original_ttl,
                    } = &mut entry.origin
                    {
                        old_expiry = Some(*expires_at);
                        *received_at = now;
                        *expires_at = new_expiry;
                        *original_ttl = record.ttl;
                        entry.record.ttl = record.ttl;
                        entry.record.cache_flush = record.cache_flush;
                    }
                }
                if let Some(old) = old_expiry {
                    self.expirations.remove(&(old, id));
                    self.expirations.insert((new_expiry, id), ());
                }
                return CacheOutcome::Refreshed(id);
            }
        }

        let id = self.insert(Entry {
            record: record.clone(),
            origin: Origin::Cached {
                received_at: now,
                expires_at: now + Duration::from_secs(record.ttl as u64),
                original_ttl: record.ttl,
            },
        });
        CacheOutcome::New(id)
    }

    /// Evicts every cached record whose TTL has run out, returning the
    /// evicted records.
    pub(crate) fn expire_due(&mut self, now: Instant) -> Vec<Record> {
        let mut expired = Vec::new();
        loop {
            let due = match self.expirations.keys().next() {
                Some((at, id)) if *at <= now => (*at, *id),
                _ => break,
            };
            self.expirations.remove(&due);
            if let Some(entry) = self.remove(due.1) {
                expired.push(entry.record);
            }
        }
        expired
    }

    pub(crate) fn next_expiry(&self) -> Option<Instant> {
        self.expirations.keys().next().map(|(at, _)| *at)
    }

    /// The nearest probe/announce/goodbye deadline over owned records.
    pub(crate) fn next_owned_deadline(&self) -> Option<Instant> {
        self.slots
            .iter()
            .filter_map(|slot| slot.entry.as_ref())
            .filter_map(|entry| entry.state().and_then(|s| s.deadline()))
            .min()
    }
}
