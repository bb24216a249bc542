//! # mdnsd
//!
//! A sans-I/O implementation of a Multicast DNS responder and querier
//! (RFC 6762) with DNS-SD service discovery conventions (RFC 6763).
//!
//! The crate provides a per-interface [`Responder`] that answers queries
//! for locally published records, issues queries on behalf of local
//! consumers, probes unique names for conflicts, and times announcements,
//! goodbyes and retransmissions — without performing any I/O of its own.
//!
//! ## Sans-I/O design
//!
//! The engine never touches a socket, spawns no threads and sets no
//! timers. The embedding event loop is responsible for:
//!
//! 1. Reading datagrams and calling [`Responder::input_packet`] (or
//!    decoding with [`Message::unpack`] and calling [`Responder::input`]).
//! 2. Draining [`Responder::output`] after every input and before
//!    sleeping, sending each message to its destination.
//! 3. Sleeping until the deadline returned by [`Responder::sleep`].
//!
//! That makes it runtime-agnostic (tokio, async-std, smol or a plain
//! `select(2)` loop), fully testable without a network, and free of
//! hidden background activity.
//!
//! ## Publishing services
//!
//! ```rust
//! use std::net::Ipv4Addr;
//! use std::time::Instant;
//! use mdnsd::{Responder, ResponderConfig, ServiceDefinition};
//!
//! let mut responder = Responder::new(
//!     ResponderConfig::default()
//!         .with_hostname("printhost")
//!         .with_address(Ipv4Addr::new(192, 168, 1, 5))
//!         .with_service(
//!             ServiceDefinition::new("_ipp._tcp", "printer", 631)
//!                 .with_txt(vec!["pdl=application/pdf".to_string()]),
//!         ),
//! );
//!
//! // The unique records (SRV, TXT, A) probe for their names first; the
//! // first packet out is that probe, to the mDNS multicast group.
//! let (msg, dest) = responder.output(Instant::now()).expect("probe packet");
//! assert_eq!(dest.to_string(), "224.0.0.251:5353");
//! let bytes = msg.pack().expect("wire bytes");
//! assert!(!bytes.is_empty());
//! ```
//!
//! ## Querying
//!
//! ```rust
//! use std::time::Instant;
//! use mdnsd::{Name, RecordType, Responder, ResponderConfig};
//!
//! let mut responder = Responder::new(ResponderConfig::default());
//!
//! let name = Name::new("_ipp._tcp.local.").unwrap();
//! let handle = responder.query(&name, RecordType::Ptr, |record| {
//!     println!("discovered {record}");
//! });
//!
//! // The first transmission is due immediately; retries back off from
//! // one second, doubling up to an hour.
//! let (msg, _dest) = responder.output(Instant::now()).expect("query packet");
//! assert_eq!(msg.questions.len(), 1);
//!
//! responder.cancel_query(handle);
//! ```
//!
//! ## Event loop pattern
//!
//! ```text
//! loop {
//!     while let Some((msg, dest)) = responder.output(Instant::now()) {
//!         socket.send_to(&msg.pack()?, dest);
//!     }
//!     select! {
//!         (packet, src) = socket.recv_from() => {
//!             responder.input_packet(&packet, src, Instant::now());
//!         }
//!         _ = sleep_until(responder.sleep(Instant::now())) => {}
//!     }
//! }
//! ```
//!
//! ## Protocol details
//!
//! - Multicast group 224.0.0.251:5353; queries from other ports are
//!   answered with legacy unicast.
//! - Unique records probe three times 250 ms apart before announcing;
//!   conflicts are resolved with the RFC 6762 section 8.2 tiebreaker and
//!   reported through [`Responder::on_conflict`].
//! - Known-answer suppression, response aggregation delays, cache-flush
//!   handling and TTL=0 goodbyes follow RFC 6762.
//! - Messages are capped at 9000 bytes; larger record sets are split with
//!   the TC bit set on every packet but the last.

#![warn(rust_2018_idioms)]
#![allow(dead_code)]

pub mod config;
pub mod error;
pub mod message;
pub mod proto;
pub mod socket;

pub use config::{ResponderConfig, ServiceDefinition};
pub use error::{Error, Result};
pub use message::header::Header;
pub use message::name::Name;
pub use message::question::Question;
pub use message::record::{RData, Record};
pub use message::{Message, RecordType, CLASS_IN, MAX_PACKET_LEN};
pub use proto::{QueryHandle, Responder, MDNS_DEST_ADDR, MDNS_MULTICAST_IPV4, MDNS_PORT};
pub use socket::MulticastSocket;
