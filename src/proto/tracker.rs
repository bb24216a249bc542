use std::time::{Duration, Instant};

use crate::message::name::Name;
use crate::message::record::Record;
use crate::message::RecordType;

/// Identifies a registered query so it can be cancelled later.
pub type QueryHandle = u64;

// RFC 6762 section 5.2: successive transmissions of a continuous query at
// least double the interval, capped at one hour.
pub(crate) const QUERY_BACKOFF_START: Duration = Duration::from_secs(1);
pub(crate) const QUERY_BACKOFF_CAP: Duration = Duration::from_secs(3600);

struct ActiveQuery {
    id: QueryHandle,
    name: Name,
    rtype: RecordType,
    monitor: bool,
    callback: Box<dyn FnMut(&Record)>,
    next_send: Instant,
    interval: Duration,
    // Whether the immediate first transmission has gone out.
    fired: bool,
}

impl ActiveQuery {
    fn matches(&self, record: &Record) -> bool {
        self.rtype.matches(record.rtype()) && self.name == record.name
    }
}

/// Outstanding local queries and their answer callbacks.
#[derive(Default)]
pub(crate) struct QueryTracker {
    queries: Vec<ActiveQuery>,
    next_id: QueryHandle,
}

impl QueryTracker {
    /// Registers a query. The first transmission is due immediately;
    /// retransmissions back off from one second to the one-hour cap.
    pub(crate) fn add(
        &mut self,
        name: Name,
        rtype: RecordType,
        monitor: bool,
        callback: Box<dyn FnMut(&Record)>,
        now: Instant,
    ) -> QueryHandle {
        self.next_id += 1;
        let id = self.next_id;
        self.queries.push(ActiveQuery {
            id,
            name,
            rtype,
            monitor,
            callback,
            next_send: now,
            interval: QUERY_BACKOFF_START,
            fired: false,
        });
        id
    }

    /// Removes a registration. Once this returns the callback will never
    /// fire again. Unknown handles are a no-op.
    pub(crate) fn cancel(&mut self, id: QueryHandle) -> bool {
        let before = self.queries.len();
        self.queries.retain(|q| q.id != id);
        before != self.queries.len()
    }

    pub(crate) fn is_active(&self, id: QueryHandle) -> bool {
        self.queries.iter().any(|q| q.id == id)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    /// Hands an answer record to every matching query callback.
    pub(crate) fn notify(&mut self, record: &Record) {
        for query in &mut self.queries {
            if query.matches(record) {
                (query.callback)(record);
            }
        }
    }

    /// Tells monitor-mode queries a record went away. The caller passes
    /// the record with its TTL already zeroed.
    pub(crate) fn notify_removed(&mut self, record: &Record) {
        for query in &mut self.queries {
            if query.monitor && query.matches(record) {
                (query.callback)(record);
            }
        }
    }

    /// Collects the questions due for transmission at `now`, advancing
    /// each query's backoff. Sends land at 0, 1, 2, 4, 8, ... seconds
    /// after registration, so the interval only starts doubling after the
    /// second transmission. Duplicate (name, type) registrations merge
    /// into a single question.
    pub(crate) fn due(&mut self, now: Instant) -> Vec<(Name, RecordType)> {
        let mut questions: Vec<(Name, RecordType)> = Vec::new();
        for query in &mut self.queries {
            if query.next_send > now {
                continue;
            }
            query.next_send = now + query.interval;
            if query.fired {
                query.interval = (query.interval * 2).min(QUERY_BACKOFF_CAP);
            } else {
                query.fired = true;
            }

            let duplicate = questions
                .iter()
                .any(|(name, rtype)| *rtype == query.rtype && *name == query.name);
            if !duplicate {
                questions.push((query.name.clone(), query.rtype));
            }
        }
        questions
    }

    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.queries.iter().map(|q| q.next_send).min()
    }
}
