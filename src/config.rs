//! Configuration for mDNS responders.
//!
//! # Examples
//!
//! A responder that answers for a host name:
//!
//! ```rust
//! use std::net::Ipv4Addr;
//! use mdnsd::ResponderConfig;
//!
//! let config = ResponderConfig::default()
//!     .with_hostname("myhost")
//!     .with_address(Ipv4Addr::new(192, 168, 1, 100));
//! ```
//!
//! A responder advertising a DNS-SD service:
//!
//! ```rust
//! use std::net::Ipv4Addr;
//! use mdnsd::{ResponderConfig, ServiceDefinition};
//!
//! let config = ResponderConfig::default()
//!     .with_hostname("printhost")
//!     .with_address(Ipv4Addr::new(192, 168, 1, 5))
//!     .with_service(
//!         ServiceDefinition::new("_ipp._tcp", "printer", 631)
//!             .with_txt(vec!["pdl=application/pdf".to_string()]),
//!     );
//! ```

use std::net::Ipv4Addr;

use crate::message::CLASS_IN;

/// Default TTL for published records (120 seconds).
pub(crate) const DEFAULT_RECORD_TTL: u32 = 120;

/// One advertised service: the `(service, instance, port, TXT, target)`
/// tuple a responder turns into a PTR + SRV + TXT + A record set.
#[derive(Clone, Debug)]
pub struct ServiceDefinition {
    /// Service type without domain, e.g. `"_ipp._tcp"`.
    pub service: String,
    /// Instance label, e.g. `"printer"`.
    pub instance: String,
    /// Port the service listens on.
    pub port: u16,
    /// TXT entries, conventionally `key=value`.
    pub txt: Vec<String>,
    /// Target host label. Falls back to the responder's hostname.
    pub target: Option<String>,
}

impl ServiceDefinition {
    pub fn new(service: &str, instance: &str, port: u16) -> Self {
        ServiceDefinition {
            service: service.to_string(),
            instance: instance.to_string(),
            port,
            txt: Vec::new(),
            target: None,
        }
    }

    pub fn with_txt(mut self, txt: Vec<String>) -> Self {
        self.txt = txt;
        self
    }

    pub fn with_target(mut self, target: &str) -> Self {
        self.target = Some(target.to_string());
        self
    }
}

/// Configuration for a [`Responder`](crate::Responder).
#[derive(Clone, Debug)]
pub struct ResponderConfig {
    /// Host label to claim, without domain; publishes a unique A record
    /// for `"<hostname>.local."` once an address is known.
    pub hostname: Option<String>,

    /// Local IPv4 address advertised in address records. May also be set
    /// later through [`Responder::set_address`](crate::Responder::set_address).
    pub address: Option<Ipv4Addr>,

    /// TTL for published records.
    ///
    /// Default: 120 seconds
    pub record_ttl: u32,

    /// DNS class for published records. There is no practical reason to
    /// change this from Internet.
    pub class: u16,

    /// Seed for the jitter source. Probe intervals and response delays
    /// are randomized; seeding makes them reproducible for tests.
    pub rng_seed: Option<u64>,

    /// Services to advertise from the start.
    pub services: Vec<ServiceDefinition>,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        ResponderConfig {
            hostname: None,
            address: None,
            record_ttl: DEFAULT_RECORD_TTL,
            class: CLASS_IN,
            rng_seed: None,
            services: Vec::new(),
        }
    }
}

impl ResponderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hostname(mut self, hostname: &str) -> Self {
        self.hostname = Some(hostname.to_string());
        self
    }

    pub fn with_address(mut self, address: Ipv4Addr) -> Self {
        self.address = Some(address);
        self
    }

    pub fn with_record_ttl(mut self, ttl: u32) -> Self {
        self.record_ttl = ttl;
        self
    }

    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    pub fn with_service(mut self, service: ServiceDefinition) -> Self {
        self.services.push(service);
        self
    }
}
