//! Sans-I/O mDNS responder and querier engine.
//!
//! [`Responder`] holds the protocol state for one link and performs no I/O
//! of its own. The embedding event loop:
//!
//! 1. Reads a datagram, decodes it (or lets [`Responder::input_packet`] do
//!    it) and calls [`Responder::input`].
//! 2. Drains [`Responder::output`] after every input and before sleeping,
//!    sending each message to the returned destination.
//! 3. Sleeps until [`Responder::sleep`] says the next timed emission
//!    (probe, announcement, goodbye, delayed response, query retry or
//!    cache expiry) is due, then drains `output` again.
//!
//! ```text
//! loop {
//!     while let Some((msg, dest)) = responder.output(now) {
//!         socket.send_to(&msg.pack()?, dest);
//!     }
//!     select! {
//!         (packet, src) = socket.recv_from() => {
//!             responder.input_packet(&packet, src, Instant::now());
//!         }
//!         _ = sleep_until(responder.sleep(now)) => {}
//!     }
//! }
//! ```


pub(crate) mod store;
pub(crate) mod tracker;

use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::ResponderConfig;
use crate::config::ServiceDefinition;
use crate::error::Error;
use crate::message::header::Header;
use crate::message::name::Name;
use crate::message::question::Question;
use crate::message::record::{RData, Record};
use crate::message::{Message, RecordType};
use store::{CacheOutcome, Entry, Origin, PublishState, RecordId, RecordStore};
use tracker::QueryTracker;

pub use tracker::QueryHandle;

/// The mDNS multicast group address (224.0.0.251).
pub const MDNS_MULTICAST_IPV4: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 251);

/// The standard mDNS port (5353).
pub const MDNS_PORT: u16 = 5353;

/// mDNS multicast destination address (224.0.0.251:5353).
pub const MDNS_DEST_ADDR: SocketAddr =
    SocketAddr::new(IpAddr::V4(MDNS_MULTICAST_IPV4), MDNS_PORT);

// Probing, announcement and goodbye cadence, per RFC 6762 sections 8.1,
// 8.3 and 10.1.
const PROBE_ATTEMPTS: u8 = 3;
const PROBE_INTERVAL: Duration = Duration::from_millis(250);
const PROBE_JITTER_MS: u64 = 20;
const ANNOUNCE_ATTEMPTS: u8 = 2;
const ANNOUNCE_INTERVAL: Duration = Duration::from_secs(1);
const GOODBYE_ATTEMPTS: u8 = 3;
const GOODBYE_INTERVAL: Duration = Duration::from_millis(250);

// Shared-record responses wait a little so answers from several responders
// can aggregate, per RFC 6762 section 6.
const RESPONSE_DELAY_MIN_MS: u64 = 20;
const RESPONSE_DELAY_MAX_MS: u64 = 120;

type ConflictCallback = Box<dyn FnMut(&Name, RecordType)>;
type ReceiveCallback = Box<dyn FnMut(&Record)>;

// A response being held back for aggregation. Records are referenced by
// arena id so a record withdrawn or conflicted away while the response is
// pending simply drops out.
struct PendingResponse {
    due: Instant,
    dest: SocketAddr,
    unicast: bool,
    answers: Vec<RecordId>,
    additionals: Vec<RecordId>,
}

/// A per-interface mDNS responder and querier.
///
/// One `Responder` is bound to one link: one local address, one multicast
/// socket owned by the embedder. Multiple responders are fully independent.
pub struct Responder {
    class: u16,
    ttl: u32,
    address: Option<Ipv4Addr>,
    hostname: Option<Name>,
    // Host names we maintain address records for.
    addr_names: Vec<Name>,

    store: RecordStore,
    tracker: QueryTracker,
    pending: Vec<PendingResponse>,
    out_queue: VecDeque<(Message, SocketAddr)>,

    rng: StdRng,
    conflict_cb: Option<ConflictCallback>,
    receive_cb: Option<ReceiveCallback>,

    // Inbound packets dropped as malformed.
    malformed: u64,
    // Set by shutdown; input is discarded but goodbyes still drain.
    closed: bool,
}

impl Default for Responder {
    fn default() -> Self {
        Responder::new(ResponderConfig::default())
    }
}

impl Responder {
    /// Creates a responder and publishes the records described by the
    /// configuration: a host address record plus PTR/SRV/TXT/A sets for
    /// each service definition.
    pub fn new(config: ResponderConfig) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        let mut responder = Responder {
            class: config.class,
            ttl: config.record_ttl,
            address: config.address,
            hostname: None,
            addr_names: Vec::new(),
            store: RecordStore::default(),
            tracker: QueryTracker::default(),
            pending: Vec::new(),
            out_queue: VecDeque::new(),
            rng,
            conflict_cb: None,
            receive_cb: None,
            malformed: 0,
            closed: false,
        };

        let now = Instant::now();
        if let Some(host) = &config.hostname {
            match Name::new(&format!("{host}.local.")) {
                Ok(name) => {
                    responder.hostname = Some(name.clone());
                    responder.track_addr_name(name, now);
                }
                Err(err) => log::warn!("invalid hostname {host}: {err}"),
            }
        }
        for def in &config.services {
            responder.publish_service(def);
        }

        responder
    }

    /// The local IPv4 address advertised in address records.
    pub fn address(&self) -> Option<Ipv4Addr> {
        self.address
    }

    /// Sets or changes the local address. Owned A records are rewritten to
    /// the new address and re-announced; hosts that were waiting for an
    /// address get their A record published.
    pub fn set_address(&mut self, address: Ipv4Addr) {
        if self.address == Some(address) {
            return;
        }
        self.address = Some(address);
        let now = Instant::now();
        for name in self.addr_names.clone() {
            self.refresh_address_record(&name, address, now);
        }
    }

    /// Registers a conflict callback, invoked with the record name and type
    /// every time a unique record loses its name to another responder.
    pub fn on_conflict(&mut self, callback: impl FnMut(&Name, RecordType) + 'static) {
        self.conflict_cb = Some(Box::new(callback));
    }

    /// Registers a callback invoked for every record parsed out of inbound
    /// messages, before any other processing.
    pub fn on_record_received(&mut self, callback: impl FnMut(&Record) + 'static) {
        self.receive_cb = Some(Box::new(callback));
    }

    /// Number of inbound packets dropped as malformed.
    pub fn malformed_packets(&self) -> u64 {
        self.malformed
    }

    /// Adds a record to the owned set. Unique records probe for the name
    /// first; shared records go straight to announcing. Publishing a
    /// record that is already owned with identical data is a no-op.
    pub fn publish(&mut self, record: Record, unique: bool) {
        let now = Instant::now();
        self.publish_at(record, unique, now);
    }

    fn publish_at(&mut self, mut record: Record, unique: bool, now: Instant) {
        record.class = self.class;
        record.cache_flush = unique;
        let key = record.name.key();

        for id in self.store.owned_matching(&key, record.rtype()) {
            let Some(entry) = self.store.get(id) else {
                continue;
            };
            if entry.record.rdata == record.rdata {
                log::debug!("duplicate publish of {} {}", record.name, record.rtype());
                return;
            }
            if unique && entry.is_unique() {
                // A unique key holds at most one record; replace and
                // probe the new data.
                self.store.remove(id);
            }
        }

        log::debug!(
            "publishing {} {} ({})",
            record.name,
            record.rtype(),
            if unique { "unique" } else { "shared" }
        );
        let state = if unique {
            PublishState::Probing { sent: 0, next: now }
        } else {
            PublishState::Announcing { sent: 0, next: now }
        };
        self.store.insert(Entry {
            record,
            origin: Origin::Owned { unique, state },
        });
    }

    /// Schedules goodbye announcements for the owned records under
    /// `(name, rtype)` and removes them after the last goodbye goes out.
    /// `RecordType::Any` withdraws every type under the name. Unknown
    /// names are a no-op.
    pub fn withdraw(&mut self, name: &Name, rtype: RecordType) -> bool {
        let now = Instant::now();
        let mut found = false;
        for id in self.store.owned_matching(&name.key(), rtype) {
            found = true;
            match self.store.get(id).and_then(Entry::state) {
                // Never announced, nothing to say goodbye to.
                Some(PublishState::Probing { .. }) => {
                    self.store.remove(id);
                }
                Some(PublishState::Goodbye { .. }) | None => {}
                Some(_) => self.store.set_state(
                    id,
                    PublishState::Goodbye {
                        remaining: GOODBYE_ATTEMPTS,
                        next: now,
                    },
                ),
            }
        }
        found
    }

    /// Publishes the record set for one service definition: the DNS-SD
    /// PTR pair (service enumeration and instance), the instance SRV and
    /// TXT, and an address record for the target host.
    pub fn publish_service(&mut self, def: &ServiceDefinition) {
        let now = Instant::now();

        let service_name = match Name::new(&format!("{}.local.", def.service)) {
            Ok(name) => name,
            Err(err) => {
                log::warn!("invalid service type {}: {err}", def.service);
                return;
            }
        };
        let instance_name = match Name::new(&format!("{}.{}.local.", def.instance, def.service)) {
            Ok(name) => name,
            Err(err) => {
                log::warn!("invalid service instance {}: {err}", def.instance);
                return;
            }
        };
        let target_name = match &def.target {
            Some(target) => match Name::new(&format!("{target}.local.")) {
                Ok(name) => name,
                Err(err) => {
                    log::warn!("invalid target host {target}: {err}");
                    return;
                }
            },
            None => match &self.hostname {
                Some(name) => name.clone(),
                None => instance_name.clone(),
            },
        };

        let ttl = self.ttl;
        if let Ok(enumeration) = Name::new("_services._dns-sd._udp.local.") {
            self.publish_at(
                Record::ptr(enumeration, service_name.clone(), ttl),
                false,
                now,
            );
        }
        self.publish_at(
            Record::ptr(service_name.clone(), instance_name.clone(), ttl),
            false,
            now,
        );
        self.publish_at(
            Record::srv(instance_name.clone(), def.port, target_name.clone(), ttl),
            true,
            now,
        );
        self.publish_at(Record::txt(instance_name, def.txt.clone(), ttl), true, now);
        self.track_addr_name(target_name, now);
    }

    /// Registers a continuous query. The callback fires immediately for
    /// every cached matching record and again for every matching record
    /// received later, until the handle is cancelled.
    pub fn query(
        &mut self,
        name: &Name,
        rtype: RecordType,
        callback: impl FnMut(&Record) + 'static,
    ) -> QueryHandle {
        self.register_query(name, rtype, false, Box::new(callback))
    }

    /// Like [`query`](Responder::query), but the callback additionally
    /// fires with a TTL=0 record when a matching record is withdrawn or
    /// expires from the cache.
    pub fn monitor(
        &mut self,
        name: &Name,
        rtype: RecordType,
        callback: impl FnMut(&Record) + 'static,
    ) -> QueryHandle {
        self.register_query(name, rtype, true, Box::new(callback))
    }

    fn register_query(
        &mut self,
        name: &Name,
        rtype: RecordType,
        monitor: bool,
        mut callback: Box<dyn FnMut(&Record)>,
    ) -> QueryHandle {
        let now = Instant::now();
        for id in self.store.cached_matching(&name.key(), rtype) {
            if let Some(entry) = self.store.get(id) {
                let remaining = entry.remaining_ttl(now);
                if remaining == 0 {
                    continue;
                }
                let mut record = entry.record.clone();
                record.ttl = remaining;
                callback(&record);
            }
        }
        self.tracker.add(name.clone(), rtype, monitor, callback, now)
    }

    /// Cancels a query. The callback is guaranteed not to fire once this
    /// returns. Unknown handles are a no-op.
    pub fn cancel_query(&mut self, handle: QueryHandle) -> bool {
        self.tracker.cancel(handle)
    }

    pub fn is_query_pending(&self, handle: QueryHandle) -> bool {
        self.tracker.is_active(handle)
    }

    /// Decodes and feeds one received datagram. Undecodable packets are
    /// dropped and counted.
    pub fn input_packet(&mut self, packet: &[u8], src: SocketAddr, now: Instant) {
        match Message::unpack(packet) {
            Ok(msg) => self.input(&msg, src, now),
            Err(err) => {
                self.malformed += 1;
                log::warn!("dropping malformed packet from {src}: {err}");
            }
        }
    }

    /// Feeds one decoded inbound message. Queries may schedule responses;
    /// responses update the cache, answer local queries and can trigger
    /// conflicts. After [`shutdown`](Responder::shutdown) input is
    /// silently discarded.
    pub fn input(&mut self, msg: &Message, src: SocketAddr, now: Instant) {
        if self.closed {
            return;
        }

        if self.receive_cb.is_some() {
            for record in msg.records() {
                if let Some(cb) = self.receive_cb.as_mut() {
                    cb(record);
                }
            }
        }

        if msg.header.response {
            self.handle_response(msg, now);
        } else {
            self.handle_query(msg, src, now);
        }
    }

    /// Produces the next outbound message, running every timed emission
    /// that is due at `now` first. Drain until `None` after each `input`
    /// and before sleeping.
    pub fn output(&mut self, now: Instant) -> Option<(Message, SocketAddr)> {
        self.advance(now);
        self.out_queue.pop_front()
    }

    /// The next deadline at which [`output`](Responder::output) will have
    /// something new to say. `None` means idle until further input.
    pub fn sleep(&self, now: Instant) -> Option<Instant> {
        if !self.out_queue.is_empty() {
            return Some(now);
        }
        let candidates = [
            self.store.next_owned_deadline(),
            self.store.next_expiry(),
            self.pending.iter().map(|p| p.due).min(),
            self.tracker.next_deadline(),
        ];
        candidates.into_iter().flatten().min()
    }

    /// Begins shutdown: every owned record moves to goodbye emission and
    /// further input is discarded. The caller keeps pumping
    /// [`output`](Responder::output) until it returns `None`.
    pub fn shutdown(&mut self, now: Instant) {
        if self.closed {
            return;
        }
        log::debug!("shutting down responder");
        self.closed = true;
        self.tracker = QueryTracker::default();
        self.pending.clear();
        for id in self.store.owned_ids() {
            match self.store.get(id).and_then(Entry::state) {
                Some(PublishState::Probing { .. }) => {
                    self.store.remove(id);
                }
                Some(PublishState::Goodbye { .. }) | None => {}
                Some(_) => self.store.set_state(
                    id,
                    PublishState::Goodbye {
                        remaining: GOODBYE_ATTEMPTS,
                        next: now,
                    },
                ),
            }
        }
    }

    fn track_addr_name(&mut self, name: Name, now: Instant) {
        if !self.addr_names.iter().any(|n| *n == name) {
            self.addr_names.push(name.clone());
        }
        if let Some(address) = self.address {
            self.refresh_address_record(&name, address, now);
        }
    }

    fn refresh_address_record(&mut self, name: &Name, address: Ipv4Addr, now: Instant) {
        let ids = self.store.owned_matching(&name.key(), RecordType::A);
        if ids.is_empty() {
            let ttl = self.ttl;
            self.publish_at(Record::a(name.clone(), address, ttl), true, now);
            return;
        }
        for id in ids {
            let Some(entry) = self.store.get_mut(id) else {
                continue;
            };
            if entry.record.rdata == RData::A(address) {
                continue;
            }
            entry.record.rdata = RData::A(address);
            if let Origin::Owned { state, .. } = &mut entry.origin {
                if matches!(
                    state,
                    PublishState::Published | PublishState::Announcing { .. }
                ) {
                    *state = PublishState::Announcing { sent: 0, next: now };
                }
            }
        }
    }

    // Inbound question handling: match owned records, drop known answers,
    // schedule the (possibly delayed) response.
    fn handle_query(&mut self, msg: &Message, src: SocketAddr, now: Instant) {
        if !msg.authorities.is_empty() {
            self.handle_probe_conflicts(msg, now);
        }
        if msg.questions.is_empty() {
            return;
        }

        // Match owned records question by question. Suppressed answers
        // still contribute their DNS-SD additionals; only the additionals
        // a querier already holds are dropped with them.
        let mut matched: Vec<RecordId> = Vec::new();
        let mut extra: Vec<RecordId> = Vec::new();
        for question in &msg.questions {
            for id in self.store.lookup(&question.name.key(), question.rtype, now) {
                let Some(entry) = self.store.get(id) else {
                    continue;
                };
                if !self.is_answerable(id) {
                    continue;
                }
                let suppressed = known_answer(msg, &entry.record);
                if !suppressed && !matched.contains(&id) {
                    matched.push(id);
                }
                for add in self.additionals_for(id) {
                    let Some(add_entry) = self.store.get(add) else {
                        continue;
                    };
                    if !known_answer(msg, &add_entry.record) && !extra.contains(&add) {
                        extra.push(add);
                    }
                }
            }
        }
        if matched.is_empty() && extra.is_empty() {
            return;
        }

        let unicast = src.port() != MDNS_PORT;
        let dest = if unicast { src } else { MDNS_DEST_ADDR };
        let all_unique = matched
            .iter()
            .all(|id| self.store.get(*id).map(Entry::is_unique).unwrap_or(false));
        let due = if unicast || all_unique {
            now
        } else {
            now + Duration::from_millis(
                self.rng
                    .random_range(RESPONSE_DELAY_MIN_MS..=RESPONSE_DELAY_MAX_MS),
            )
        };

        if let Some(pending) = self.pending.iter_mut().find(|p| p.dest == dest) {
            for id in matched {
                if !pending.answers.contains(&id) {
                    pending.answers.push(id);
                }
            }
            for id in extra {
                if !pending.additionals.contains(&id) {
                    pending.additionals.push(id);
                }
            }
            pending.due = pending.due.min(due);
        } else {
            self.pending.push(PendingResponse {
                due,
                dest,
                unicast,
                answers: matched,
                additionals: extra,
            });
        }
    }

    fn is_answerable(&self, id: RecordId) -> bool {
        matches!(
            self.store.get(id).and_then(Entry::state),
            Some(PublishState::Published) | Some(PublishState::Announcing { .. })
        )
    }

    // DNS-SD additional-record rules: a PTR answer carries the instance's
    // SRV and TXT along, and any SRV carries its target's addresses.
    fn additionals_for(&self, id: RecordId) -> Vec<RecordId> {
        let mut extra: Vec<RecordId> = Vec::new();
        let Some(entry) = self.store.get(id) else {
            return extra;
        };

        match &entry.record.rdata {
            RData::Ptr(instance) => {
                for rtype in [RecordType::Srv, RecordType::Txt] {
                    for add in self.store.owned_matching(&instance.key(), rtype) {
                        if self.is_answerable(add) && !extra.contains(&add) {
                            extra.push(add);
                        }
                    }
                }
                let srv_ids: Vec<RecordId> = extra
                    .iter()
                    .copied()
                    .filter(|add| {
                        self.store
                            .get(*add)
                            .map(|e| e.record.rtype() == RecordType::Srv)
                            .unwrap_or(false)
                    })
                    .collect();
                for srv in srv_ids {
                    for addr in self.address_records_for(srv) {
                        if !extra.contains(&addr) {
                            extra.push(addr);
                        }
                    }
                }
            }
            RData::Srv { .. } => {
                for addr in self.address_records_for(id) {
                    if !extra.contains(&addr) {
                        extra.push(addr);
                    }
                }
            }
            _ => {}
        }
        extra
    }

    // A/AAAA records for an SRV record's target host.
    fn address_records_for(&self, srv: RecordId) -> Vec<RecordId> {
        let mut addrs = Vec::new();
        let Some(entry) = self.store.get(srv) else {
            return addrs;
        };
        if let RData::Srv { target, .. } = &entry.record.rdata {
            for rtype in [RecordType::A, RecordType::Aaaa] {
                for id in self.store.owned_matching(&target.key(), rtype) {
                    if self.is_answerable(id) {
                        addrs.push(id);
                    }
                }
            }
        }
        addrs
    }

    // Records in the authority section of somebody else's query are a
    // simultaneous probe. RFC 6762 section 8.2: compare class, type, then
    // rdata octets; the lexicographically later data keeps the name.
    fn handle_probe_conflicts(&mut self, msg: &Message, _now: Instant) {
        let mut conflicts: Vec<RecordId> = Vec::new();
        for theirs in &msg.authorities {
            for id in self.store.owned_matching(&theirs.name.key(), theirs.rtype()) {
                let Some(entry) = self.store.get(id) else {
                    continue;
                };
                if !entry.is_unique()
                    || !matches!(entry.state(), Some(PublishState::Probing { .. }))
                {
                    continue;
                }
                if entry.record.rdata == theirs.rdata {
                    continue;
                }
                let ours = (
                    entry.record.class,
                    entry.record.rtype().value(),
                    entry.record.rdata.wire_bytes(),
                );
                let other = (theirs.class, theirs.rtype().value(), theirs.rdata.wire_bytes());
                if other > ours && !conflicts.contains(&id) {
                    conflicts.push(id);
                }
            }
        }
        for id in conflicts {
            self.conflict(id);
        }
    }

    // Inbound response handling: conflicts, caching, local query callbacks
    // and duplicate-answer suppression.
    fn handle_response(&mut self, msg: &Message, now: Instant) {
        for record in msg.answers.iter().chain(msg.additionals.iter()) {
            self.detect_conflict(record);

            // Our own data echoed back is not worth caching.
            let own_echo = self
                .store
                .owned_matching(&record.name.key(), record.rtype())
                .into_iter()
                .any(|id| {
                    self.store
                        .get(id)
                        .map(|e| e.record.rdata == record.rdata)
                        .unwrap_or(false)
                });

            if !own_echo {
                match self.store.put_cached(record, now) {
                    CacheOutcome::Goodbye(evicted) => {
                        for mut gone in evicted {
                            log::debug!("goodbye for {} {}", gone.name, gone.rtype());
                            gone.ttl = 0;
                            self.tracker.notify_removed(&gone);
                        }
                    }
                    CacheOutcome::New(_) | CacheOutcome::Refreshed(_) => {
                        if record.ttl > 0 {
                            self.tracker.notify(record);
                        }
                    }
                }
            }

            self.suppress_pending(record);
        }
    }

    // A unique record of ours seen on the wire with different data means
    // somebody else owns the name.
    fn detect_conflict(&mut self, theirs: &Record) {
        let mut conflicts: Vec<RecordId> = Vec::new();
        for id in self.store.owned_matching(&theirs.name.key(), theirs.rtype()) {
            let Some(entry) = self.store.get(id) else {
                continue;
            };
            if !entry.is_unique() || entry.record.rdata == theirs.rdata {
                continue;
            }
            let conflicted = match entry.state() {
                // While probing, any established answer beats us.
                Some(PublishState::Probing { .. }) => true,
                Some(PublishState::Published) | Some(PublishState::Announcing { .. }) => {
                    theirs.cache_flush
                }
                _ => false,
            };
            if conflicted && !conflicts.contains(&id) {
                conflicts.push(id);
            }
        }
        for id in conflicts {
            self.conflict(id);
        }
    }

    fn conflict(&mut self, id: RecordId) {
        let Some(entry) = self.store.remove(id) else {
            return;
        };
        let rtype = entry.record.rtype();
        let name = entry.record.name;
        log::warn!("conflicting name detected: {name} {rtype}");
        if let Some(cb) = self.conflict_cb.as_mut() {
            cb(&name, rtype);
        }
    }

    // Somebody else multicast the same answer while ours was waiting for
    // aggregation; no need to repeat it.
    fn suppress_pending(&mut self, theirs: &Record) {
        let store = &self.store;
        let same_answer = |id: &RecordId| match store.get(*id) {
            Some(entry) => {
                !(entry.record.name == theirs.name
                    && entry.record.rtype() == theirs.rtype()
                    && entry.record.rdata == theirs.rdata
                    && theirs.ttl as u64 * 2 >= entry.record.ttl as u64)
            }
            None => false,
        };
        for pending in &mut self.pending {
            if pending.unicast {
                continue;
            }
            pending.answers.retain(same_answer);
            pending.additionals.retain(same_answer);
        }
        self.pending
            .retain(|p| !p.answers.is_empty() || !p.additionals.is_empty());
    }

    // Runs every timed emission due at `now`: cache expiry, probe and
    // announce and goodbye steps, delayed responses and query retries.
    fn advance(&mut self, now: Instant) {
        for mut expired in self.store.expire_due(now) {
            log::trace!("cache expiry for {} {}", expired.name, expired.rtype());
            expired.ttl = 0;
            self.tracker.notify_removed(&expired);
        }

        let mut probes: Vec<RecordId> = Vec::new();
        let mut announces: Vec<RecordId> = Vec::new();
        let mut goodbyes: Vec<Record> = Vec::new();
        for id in self.store.owned_ids() {
            loop {
                let Some(state) = self.store.get(id).and_then(Entry::state) else {
                    break;
                };
                match state {
                    PublishState::Probing { sent, next } if next <= now => {
                        if sent >= PROBE_ATTEMPTS {
                            // No objection heard; start announcing.
                            self.store
                                .set_state(id, PublishState::Announcing { sent: 0, next: now });
                            continue;
                        }
                        probes.push(id);
                        let jitter = self.rng.random_range(0..=2 * PROBE_JITTER_MS);
                        let next = now + PROBE_INTERVAL
                            - Duration::from_millis(PROBE_JITTER_MS)
                            + Duration::from_millis(jitter);
                        self.store
                            .set_state(id, PublishState::Probing { sent: sent + 1, next });
                        break;
                    }
                    PublishState::Announcing { sent, next } if next <= now => {
                        announces.push(id);
                        if sent + 1 >= ANNOUNCE_ATTEMPTS {
                            self.store.set_state(id, PublishState::Published);
                        } else {
                            self.store.set_state(
                                id,
                                PublishState::Announcing {
                                    sent: sent + 1,
                                    next: now + ANNOUNCE_INTERVAL,
                                },
                            );
                        }
                        break;
                    }
                    PublishState::Goodbye { remaining, next } if next <= now => {
                        if let Some(entry) = self.store.get(id) {
                            goodbyes.push(entry.record.clone());
                        }
                        if remaining <= 1 {
                            self.store.remove(id);
                        } else {
                            self.store.set_state(
                                id,
                                PublishState::Goodbye {
                                    remaining: remaining - 1,
                                    next: now + GOODBYE_INTERVAL,
                                },
                            );
                        }
                        break;
                    }
                    _ => break,
                }
            }
        }

        if !probes.is_empty() {
            self.emit_probes(&probes);
        }
        if !announces.is_empty() {
            self.emit_announcements(&announces);
        }
        if !goodbyes.is_empty() {
            self.emit_goodbyes(goodbyes);
        }

        self.emit_responses(now);
        self.emit_queries(now);
    }

    // One probe packet for every record still probing this tick: a
    // question for (name, ANY) plus the proposed record in Authority.
    fn emit_probes(&mut self, probes: &[RecordId]) {
        let mut msg = Message::default();
        for id in probes {
            let Some(entry) = self.store.get(*id) else {
                continue;
            };
            if !msg.questions.iter().any(|q| q.name == entry.record.name) {
                msg.questions
                    .push(Question::new(entry.record.name.clone(), RecordType::Any));
            }
            let mut proposed = entry.record.clone();
            // The cache-flush bit stays clear until the name is won.
            proposed.cache_flush = false;
            msg.authorities.push(proposed);
        }
        if !msg.questions.is_empty() {
            self.enqueue(msg, MDNS_DEST_ADDR);
        }
    }

    fn emit_announcements(&mut self, announces: &[RecordId]) {
        let mut msg = Message {
            header: Header::response(),
            ..Default::default()
        };
        for id in announces {
            if let Some(entry) = self.store.get(*id) {
                msg.answers.push(entry.record.clone());
            }
        }
        if !msg.answers.is_empty() {
            self.enqueue(msg, MDNS_DEST_ADDR);
        }
    }

    fn emit_goodbyes(&mut self, goodbyes: Vec<Record>) {
        let mut msg = Message {
            header: Header::response(),
            ..Default::default()
        };
        for mut record in goodbyes {
            record.ttl = 0;
            msg.answers.push(record);
        }
        self.enqueue(msg, MDNS_DEST_ADDR);
    }

    fn emit_responses(&mut self, now: Instant) {
        if self.pending.is_empty() {
            return;
        }
        let mut keep = Vec::new();
        for pending in std::mem::take(&mut self.pending) {
            if pending.due > now {
                keep.push(pending);
                continue;
            }
            let mut msg = Message {
                header: Header::response(),
                ..Default::default()
            };
            for id in &pending.answers {
                if let Some(entry) = self.store.get(*id) {
                    msg.answers.push(entry.record.clone());
                }
            }
            for id in &pending.additionals {
                if pending.answers.contains(id) {
                    continue;
                }
                if let Some(entry) = self.store.get(*id) {
                    let duplicate = msg.answers.iter().any(|existing| {
                        existing.name == entry.record.name
                            && existing.rtype() == entry.record.rtype()
                            && existing.rdata == entry.record.rdata
                    });
                    if !duplicate {
                        msg.additionals.push(entry.record.clone());
                    }
                }
            }
            if record_count(&msg) == 0 {
                continue;
            }
            self.enqueue(msg, pending.dest);
        }
        self.pending.extend(keep);
    }

    fn emit_queries(&mut self, now: Instant) {
        let questions = self.tracker.due(now);
        if questions.is_empty() {
            return;
        }

        let mut msg = Message::default();
        for (name, rtype) in questions {
            // Known answers ride along so responders can stay quiet.
            for id in self.store.cached_matching(&name.key(), rtype) {
                if let Some(entry) = self.store.get(id) {
                    if entry.is_fresh(now) {
                        let mut known = entry.record.clone();
                        known.ttl = entry.remaining_ttl(now);
                        known.cache_flush = false;
                        msg.answers.push(known);
                    }
                }
            }
            msg.questions.push(Question::new(name, rtype));
        }
        self.enqueue(msg, MDNS_DEST_ADDR);
    }

    fn enqueue(&mut self, msg: Message, dest: SocketAddr) {
        match msg.pack() {
            Ok(_) => {
                log::trace!("queuing {msg} to {dest}");
                self.out_queue.push_back((msg, dest));
            }
            Err(Error::ErrPacketTooBig) => self.enqueue_split(msg, dest),
            Err(err) => log::error!("failed to pack message: {err}"),
        }
    }

    // Greedy split of an oversized message: questions and records fill
    // packets up to the size limit, and every packet but the last is
    // marked truncated.
    fn enqueue_split(&mut self, msg: Message, dest: SocketAddr) {
        let Message {
            header,
            questions,
            answers,
            authorities,
            additionals,
        } = msg;

        let mut chunks: Vec<Message> = Vec::new();
        let mut current = Message {
            header: header.clone(),
            ..Default::default()
        };
        let mut current_items = 0usize;

        for question in questions {
            let mut trial = current.clone();
            trial.questions.push(question.clone());
            if trial.pack().is_err() && current_items > 0 {
                chunks.push(current);
                current = Message {
                    header: header.clone(),
                    ..Default::default()
                };
                current.questions.push(question);
                current_items = 1;
            } else {
                current = trial;
                current_items += 1;
            }
        }
        for (section, records) in [(0, answers), (1, authorities), (2, additionals)] {
            for record in records {
                let mut trial = current.clone();
                push_section(&mut trial, section, record.clone());
                if trial.pack().is_err() && current_items > 0 {
                    chunks.push(current);
                    current = Message {
                        header: header.clone(),
                        ..Default::default()
                    };
                    push_section(&mut current, section, record);
                    current_items = 1;
                } else {
                    current = trial;
                    current_items += 1;
                }
            }
        }
        chunks.push(current);

        let last = chunks.len() - 1;
        for (i, mut chunk) in chunks.into_iter().enumerate() {
            chunk.header.truncated = i != last;
            match chunk.pack() {
                Ok(_) => self.out_queue.push_back((chunk, dest)),
                Err(err) => log::error!("failed to pack split message: {err}"),
            }
        }
    }
}

// Known-answer suppression, RFC 6762 section 7.1: the querier listed this
// record itself with at least half its true TTL remaining.
fn known_answer(msg: &Message, record: &Record) -> bool {
    msg.answers.iter().any(|answer| {
        answer.name == record.name
            && answer.rtype() == record.rtype()
            && answer.rdata == record.rdata
            && answer.ttl as u64 * 2 >= record.ttl as u64
    })
}

fn push_section(msg: &mut Message, section: usize, record: Record) {
    match section {
        0 => msg.answers.push(record),
        1 => msg.authorities.push(record),
        _ => msg.additionals.push(record),
    }
}

fn record_count(msg: &Message) -> usize {
    msg.answers.len() + msg.authorities.len() + msg.additionals.len()
}
