//! End-to-end tests for mdnsd.
//!
//! Two responders are wired back to back through packed wire bytes, with
//! time driven explicitly through `sleep()`. No sockets, no real waiting.

use std::cell::RefCell;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::rc::Rc;
use std::time::{Duration, Instant};

use mdnsd::{
    Header, Message, Name, RData, Record, RecordType, Responder, ResponderConfig,
    ServiceDefinition, MAX_PACKET_LEN, MDNS_DEST_ADDR, MDNS_PORT,
};

fn name(s: &str) -> Name {
    Name::new(s).unwrap()
}

fn link_addr(last: u8) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(192, 0, 2, last)), MDNS_PORT)
}

/// Moves every multicast packet queued in `from` across the simulated
/// link into `to`, through real wire bytes. Returns the packet count.
fn deliver(from: &mut Responder, from_addr: SocketAddr, to: &mut Responder, now: Instant) -> usize {
    let mut count = 0;
    while let Some((msg, dest)) = from.output(now) {
        assert_eq!(dest, MDNS_DEST_ADDR);
        let bytes = msg.pack().expect("emitted message must pack");
        assert!(bytes.len() <= MAX_PACKET_LEN);
        to.input_packet(&bytes, from_addr, now);
        count += 1;
    }
    count
}

/// Exchanges traffic between two responders, stepping virtual time along
/// their own deadlines, until `done` reports success or `deadline` hits.
/// Returns the time reached.
fn exchange_until(
    a: &mut Responder,
    a_addr: SocketAddr,
    b: &mut Responder,
    b_addr: SocketAddr,
    mut now: Instant,
    deadline: Instant,
    mut done: impl FnMut() -> bool,
) -> Instant {
    loop {
        loop {
            let moved = deliver(a, a_addr, b, now) + deliver(b, b_addr, a, now);
            if moved == 0 {
                break;
            }
        }
        if done() {
            return now;
        }
        let next = [a.sleep(now), b.sleep(now)].into_iter().flatten().min();
        match next {
            Some(t) if t <= deadline => now = t.max(now),
            _ => return now,
        }
    }
}

/// Pumps a lone responder through its deadlines, discarding its traffic,
/// until it goes quiet. Returns the time reached.
fn settle(r: &mut Responder, mut now: Instant) -> Instant {
    for _ in 0..32 {
        while r.output(now).is_some() {}
        match r.sleep(now) {
            Some(t) => now = t.max(now),
            None => break,
        }
    }
    now
}

#[test]
fn test_service_discovery_end_to_end() {
    let mut r1 = Responder::new(
        ResponderConfig::default()
            .with_rng_seed(1)
            .with_hostname("printhost")
            .with_address(Ipv4Addr::new(192, 0, 2, 5))
            .with_service(
                ServiceDefinition::new("_ipp._tcp", "printer", 631)
                    .with_txt(vec!["pdl=application/pdf".to_string()]),
            ),
    );
    // R1 probes and announces into the void before R2 exists.
    let now = settle(&mut r1, Instant::now());

    let mut r2 = Responder::new(ResponderConfig::default().with_rng_seed(2));
    let hits: Rc<RefCell<Vec<Record>>> = Rc::default();
    let sink = hits.clone();
    r2.query(&name("_ipp._tcp.local."), RecordType::Ptr, move |record| {
        sink.borrow_mut().push(record.clone())
    });

    let query_time = now;
    let answered = exchange_until(
        &mut r1,
        link_addr(5),
        &mut r2,
        link_addr(20),
        now,
        now + Duration::from_secs(2),
        || !hits.borrow().is_empty(),
    );

    // The PTR arrives within the 20-120 ms aggregation window.
    assert!(!hits.borrow().is_empty(), "PTR query went unanswered");
    assert!(answered.duration_since(query_time) <= Duration::from_millis(250));
    assert_eq!(
        hits.borrow()[0].rdata,
        RData::Ptr(name("printer._ipp._tcp.local."))
    );

    // The same response carried SRV, TXT and A as additionals, so R2 can
    // resolve the instance entirely from cache, with no network traffic.
    let srv_hits: Rc<RefCell<Vec<Record>>> = Rc::default();
    let sink = srv_hits.clone();
    r2.query(
        &name("printer._ipp._tcp.local."),
        RecordType::Srv,
        move |record| sink.borrow_mut().push(record.clone()),
    );
    assert_eq!(srv_hits.borrow().len(), 1);
    match &srv_hits.borrow()[0].rdata {
        RData::Srv { port, target, .. } => {
            assert_eq!(*port, 631);
            assert_eq!(*target, name("printhost.local."));
        }
        other => panic!("expected SRV rdata, got {other:?}"),
    }

    let txt_hits: Rc<RefCell<Vec<Record>>> = Rc::default();
    let sink = txt_hits.clone();
    r2.query(
        &name("printer._ipp._tcp.local."),
        RecordType::Txt,
        move |record| sink.borrow_mut().push(record.clone()),
    );
    assert_eq!(txt_hits.borrow().len(), 1);

    let a_hits: Rc<RefCell<Vec<Record>>> = Rc::default();
    let sink = a_hits.clone();
    r2.query(&name("printhost.local."), RecordType::A, move |record| {
        sink.borrow_mut().push(record.clone())
    });
    assert_eq!(a_hits.borrow().len(), 1);
    assert_eq!(a_hits.borrow()[0].rdata, RData::A(Ipv4Addr::new(192, 0, 2, 5)));
}

#[test]
fn test_simultaneous_probe_conflict() {
    // Both claim host.local at the same time; the tiebreaker hands the
    // name to the lexicographically greater address.
    let mut r1 = Responder::new(ResponderConfig::default().with_rng_seed(1));
    let mut r2 = Responder::new(ResponderConfig::default().with_rng_seed(2));
    let host = name("host.local.");
    r1.publish(Record::a(host.clone(), Ipv4Addr::new(192, 0, 2, 5), 120), true);
    r2.publish(Record::a(host.clone(), Ipv4Addr::new(192, 0, 2, 9), 120), true);

    let r1_conflicts: Rc<RefCell<Vec<String>>> = Rc::default();
    let sink = r1_conflicts.clone();
    r1.on_conflict(move |name, _| sink.borrow_mut().push(name.to_string()));
    let r2_conflicts: Rc<RefCell<Vec<String>>> = Rc::default();
    let sink = r2_conflicts.clone();
    r2.on_conflict(move |name, _| sink.borrow_mut().push(name.to_string()));

    let now = Instant::now();
    exchange_until(
        &mut r1,
        link_addr(5),
        &mut r2,
        link_addr(9),
        now,
        now + Duration::from_secs(3),
        || false,
    );

    // R1 lost, R2 never heard an objection: at most one owner.
    assert_eq!(r1_conflicts.borrow().as_slice(), &["host.local.".to_string()]);
    assert!(r2_conflicts.borrow().is_empty());

    // R2 now answers for the name.
    let hits: Rc<RefCell<Vec<Record>>> = Rc::default();
    let sink = hits.clone();
    let mut r3 = Responder::new(ResponderConfig::default().with_rng_seed(3));
    r3.query(&host, RecordType::A, move |record| {
        sink.borrow_mut().push(record.clone())
    });
    let later = Instant::now();
    exchange_until(
        &mut r2,
        link_addr(9),
        &mut r3,
        link_addr(30),
        later,
        later + Duration::from_secs(1),
        || !hits.borrow().is_empty(),
    );
    assert_eq!(hits.borrow().len(), 1);
    assert_eq!(hits.borrow()[0].rdata, RData::A(Ipv4Addr::new(192, 0, 2, 9)));
}

#[test]
fn test_goodbye_evicts_remote_cache() {
    let mut r1 = Responder::new(ResponderConfig::default().with_rng_seed(1));
    let mut r2 = Responder::new(ResponderConfig::default().with_rng_seed(2));
    let service = name("_ipp._tcp.local.");
    let instance = name("printer._ipp._tcp.local.");
    r1.publish(Record::ptr(service.clone(), instance.clone(), 4500), false);

    let hits: Rc<RefCell<Vec<u32>>> = Rc::default();
    let sink = hits.clone();
    r2.monitor(&service, RecordType::Ptr, move |record| {
        sink.borrow_mut().push(record.ttl)
    });

    let now = Instant::now();
    let now = exchange_until(
        &mut r1,
        link_addr(5),
        &mut r2,
        link_addr(20),
        now,
        now + Duration::from_secs(3),
        || !hits.borrow().is_empty(),
    );
    assert!(hits.borrow().iter().any(|ttl| *ttl > 0));

    // Withdrawal sends TTL=0 goodbyes; the first one evicts R2's cache.
    r1.withdraw(&service, RecordType::Ptr);
    exchange_until(
        &mut r1,
        link_addr(5),
        &mut r2,
        link_addr(20),
        now,
        now + Duration::from_secs(2),
        || hits.borrow().last() == Some(&0),
    );
    assert_eq!(hits.borrow().last(), Some(&0));

    // Nothing left in R2's cache for the service.
    let empty: Rc<RefCell<Vec<Record>>> = Rc::default();
    let sink = empty.clone();
    r2.query(&service, RecordType::Ptr, move |record| {
        sink.borrow_mut().push(record.clone())
    });
    assert!(empty.borrow().is_empty());
}

#[test]
fn test_known_answer_suppression_end_to_end() {
    let mut r1 = Responder::new(
        ResponderConfig::default()
            .with_rng_seed(1)
            .with_hostname("printhost")
            .with_address(Ipv4Addr::new(192, 0, 2, 5))
            .with_service(ServiceDefinition::new("_ipp._tcp", "printer", 631)),
    );
    let now = settle(&mut r1, Instant::now());

    // R2 already holds the PTR with most of its TTL left.
    let mut r2 = Responder::new(ResponderConfig::default().with_rng_seed(2));
    let seed = Message {
        header: Header::response(),
        answers: vec![Record::ptr(
            name("_ipp._tcp.local."),
            name("printer._ipp._tcp.local."),
            4500,
        )],
        ..Default::default()
    };
    r2.input_packet(&seed.pack().unwrap(), link_addr(5), now);
    r2.query(&name("_ipp._tcp.local."), RecordType::Ptr, |_| {});

    // R2's query carries the known answer.
    let (query, _) = r2.output(now).expect("query packet");
    assert_eq!(query.questions.len(), 1);
    assert_eq!(query.answers.len(), 1);

    // R1 suppresses the PTR but still offers SRV, TXT and A.
    r1.input(&query, link_addr(20), now);
    let (response, _) = r1.output(now).expect("response with additionals");
    assert!(response.header.response);
    assert!(response.answers.iter().all(|r| r.rtype() != RecordType::Ptr));
    let types: Vec<RecordType> = response.additionals.iter().map(|r| r.rtype()).collect();
    assert!(types.contains(&RecordType::Srv));
    assert!(types.contains(&RecordType::Txt));
    assert!(types.contains(&RecordType::A));
}

#[test]
fn test_cache_flush_replaces_stale_address() {
    let mut r1 = Responder::new(
        ResponderConfig::default()
            .with_rng_seed(1)
            .with_hostname("host")
            .with_address(Ipv4Addr::new(192, 0, 2, 5)),
    );
    let mut r2 = Responder::new(ResponderConfig::default().with_rng_seed(2));

    // R2 caches host.local = .5 from R1's announcements.
    let now = Instant::now();
    let now = exchange_until(
        &mut r1,
        link_addr(5),
        &mut r2,
        link_addr(20),
        now,
        now + Duration::from_secs(3),
        || false,
    );

    // Well past the one second flush grace, R1 moves to .9.
    let flush_time = now + Duration::from_millis(1500);
    r1.set_address(Ipv4Addr::new(192, 0, 2, 9));
    exchange_until(
        &mut r1,
        link_addr(9),
        &mut r2,
        link_addr(20),
        flush_time,
        flush_time + Duration::from_secs(2),
        || false,
    );

    // Only the new address survives in R2's cache.
    let hits: Rc<RefCell<Vec<RData>>> = Rc::default();
    let sink = hits.clone();
    r2.query(&name("host.local."), RecordType::A, move |record| {
        sink.borrow_mut().push(record.rdata.clone())
    });
    assert_eq!(hits.borrow().as_slice(), &[RData::A(Ipv4Addr::new(192, 0, 2, 9))]);
}

#[test]
fn test_unanswered_query_backs_off() {
    let mut r = Responder::new(ResponderConfig::default().with_rng_seed(1));
    r.query(&name("ghost.local."), RecordType::A, |_| {});
    let start = Instant::now();

    let mut send_times = Vec::new();
    let mut now = start;
    for _ in 0..6 {
        let mut sent = false;
        while let Some((msg, _)) = r.output(now) {
            assert_eq!(msg.questions.len(), 1);
            sent = true;
        }
        if sent {
            send_times.push(now);
        }
        match r.sleep(now) {
            Some(next) => now = next.max(now),
            None => break,
        }
    }

    // Send times are 0, 1, 2, 4, 8, 16 seconds after the start.
    assert_eq!(send_times.len(), 6);
    let deltas: Vec<Duration> = send_times.windows(2).map(|w| w[1] - w[0]).collect();
    assert_eq!(
        deltas,
        vec![
            Duration::from_secs(1),
            Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_secs(4),
            Duration::from_secs(8),
        ]
    );
}
