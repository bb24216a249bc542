//! Socket utilities for mDNS embedders.
//!
//! The engine itself performs no I/O; this module is a convenience for the
//! event loop that drives it. [`MulticastSocket`] builds a UDP socket
//! bound to port 5353 and joined to 224.0.0.251 on one interface, with the
//! options mDNS wants.
//!
//! ```rust,ignore
//! use mdnsd::MulticastSocket;
//! use std::net::Ipv4Addr;
//!
//! let std_socket = MulticastSocket::new()
//!     .with_interface(Ipv4Addr::new(192, 168, 1, 100))
//!     .into_std()?;
//!
//! // For tokio:
//! let socket = tokio::net::UdpSocket::from_std(std_socket)?;
//! ```

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};

use socket2::{Domain, Protocol, Socket, Type};

use crate::proto::{MDNS_MULTICAST_IPV4, MDNS_PORT};

/// A builder for multicast UDP sockets suitable for mDNS.
///
/// The resulting socket is:
///
/// - bound to port 5353 (the mDNS group address on Linux, the wildcard
///   elsewhere),
/// - configured with `SO_REUSEADDR`, and `SO_REUSEPORT` where available,
/// - non-blocking,
/// - joined to 224.0.0.251 on the chosen interface,
/// - multicast TTL 1 (link-local only) with loopback disabled, so a
///   responder does not hear its own transmissions.
#[derive(Debug, Clone)]
pub struct MulticastSocket {
    local_ipv4: Option<Ipv4Addr>,
    local_port: Option<u16>,
    interface: Option<Ipv4Addr>,
    multicast_ttl: u32,
}

impl Default for MulticastSocket {
    fn default() -> Self {
        Self::new()
    }
}

impl MulticastSocket {
    pub fn new() -> Self {
        Self {
            local_ipv4: None,
            local_port: None,
            interface: None,
            multicast_ttl: 1,
        }
    }

    /// Overrides the local bind address.
    pub fn with_local_ipv4(mut self, local_ipv4: Ipv4Addr) -> Self {
        self.local_ipv4 = Some(local_ipv4);
        self
    }

    /// Overrides the local bind port. The default is 5353; anything else
    /// makes this a legacy-unicast querier socket.
    pub fn with_local_port(mut self, local_port: u16) -> Self {
        self.local_port = Some(local_port);
        self
    }

    /// Selects the network interface for multicast by its IPv4 address.
    /// Without it the socket joins on `INADDR_ANY`.
    pub fn with_interface(mut self, interface: Ipv4Addr) -> Self {
        self.interface = Some(interface);
        self
    }

    /// Raises the multicast TTL above the link-local default of 1 for
    /// setups that deliberately route mDNS.
    pub fn with_multicast_ttl(mut self, ttl: u32) -> Self {
        self.multicast_ttl = ttl;
        self
    }

    /// Builds the configured `std::net::UdpSocket`.
    pub fn into_std(self) -> io::Result<UdpSocket> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;

        socket.set_reuse_address(true)?;
        #[cfg(all(unix, not(target_os = "solaris"), not(target_os = "illumos")))]
        socket.set_reuse_port(true)?;

        socket.set_nonblocking(true)?;

        let local_ip = if let Some(local_ipv4) = self.local_ipv4 {
            IpAddr::V4(local_ipv4)
        } else if cfg!(target_os = "linux") {
            IpAddr::V4(MDNS_MULTICAST_IPV4)
        } else {
            // Binding the group address does not work on Mac/Windows;
            // only the wildcard does.
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        };
        let local_port = self.local_port.unwrap_or(MDNS_PORT);
        let local_addr = SocketAddr::new(local_ip, local_port);
        socket.bind(&local_addr.into())?;

        let iface = self.interface.unwrap_or(Ipv4Addr::UNSPECIFIED);
        socket.join_multicast_v4(&MDNS_MULTICAST_IPV4, &iface)?;
        if self.interface.is_some() {
            socket.set_multicast_if_v4(&iface)?;
        }

        socket.set_multicast_ttl_v4(self.multicast_ttl)?;
        socket.set_multicast_loop_v4(false)?;

        Ok(socket.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multicast_constants() {
        assert_eq!(MDNS_MULTICAST_IPV4, Ipv4Addr::new(224, 0, 0, 251));
        assert_eq!(MDNS_PORT, 5353);
    }

    #[test]
    fn test_multicast_socket_builder() {
        let builder = MulticastSocket::new()
            .with_local_ipv4(Ipv4Addr::UNSPECIFIED)
            .with_local_port(5353);
        assert!(builder.local_ipv4.is_some());
        assert!(builder.local_port.is_some());
        assert!(builder.interface.is_none());
        assert_eq!(builder.multicast_ttl, 1);
    }

    #[test]
    fn test_multicast_socket_with_interface() {
        let interface = Ipv4Addr::new(192, 168, 1, 100);
        let builder = MulticastSocket::new().with_interface(interface);
        assert_eq!(builder.interface, Some(interface));
    }

    // Socket creation needs real network access and may collide with a
    // running mDNS service, so it stays untested here.
}
