//! Wire access for the probe engine.
//!
//! The engine sends through an [`EchoTransport`] and receives replies on a
//! channel fed by the transport's listeners. [`RawIcmpTransport`] is the
//! production implementation on raw ICMP sockets.
//!
//! # Privileges Required
//!
//! Raw ICMP sockets need root or `CAP_NET_RAW`. Startup fails with
//! [`EngineError::PermissionDenied`] without them.

use super::packet::{self, EchoReply};
use crate::error::{EngineError, EngineResult};
use async_trait::async_trait;
use pnet::datalink;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io;
use std::mem::MaybeUninit;
use std::net::{IpAddr, SocketAddr, SocketAddrV6};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Outbound half of the wire.
#[async_trait]
pub trait EchoTransport: Send + Sync + 'static {
    /// Transmit one echo request to `target`.
    async fn send_echo(&self, target: IpAddr, identifier: u16, sequence: u16) -> io::Result<()>;
}

/// How often a blocked listener wakes up to check whether the engine is gone.
const LISTENER_POLL: Duration = Duration::from_millis(250);

/// Largest datagram a listener reads.
const RECV_BUFFER: usize = 1500;

/// Raw-socket echo transport.
///
/// One unbound socket per address family sends; one listener thread per
/// local interface address receives and forwards echo replies.
pub struct RawIcmpTransport {
    v4: Option<Socket>,
    v6: Option<Socket>,
}

impl RawIcmpTransport {
    /// Open listeners on every local interface address.
    ///
    /// Replies are forwarded to `replies`; receive errors go to `errors`.
    /// Returns the transport and the addresses that listeners were bound to.
    /// Listener threads exit once `replies` is closed.
    pub fn listen_all(
        replies: mpsc::Sender<EchoReply>,
        errors: mpsc::Sender<EngineError>,
    ) -> EngineResult<(Self, Vec<IpAddr>)> {
        let addresses = local_addresses();
        if addresses.is_empty() {
            return Err(EngineError::NoInterfaces);
        }

        let mut bound = Vec::with_capacity(addresses.len());
        for (address, scope) in addresses {
            let socket = open_listener(address, scope)?;
            spawn_listener(socket, address, replies.clone(), errors.clone())?;
            bound.push(address);
        }

        let has_v4 = bound.iter().any(IpAddr::is_ipv4);
        let has_v6 = bound.iter().any(IpAddr::is_ipv6);
        let v4 = if has_v4 {
            Some(open_raw(Domain::IPV4, Protocol::ICMPV4)?)
        } else {
            None
        };
        // IPv6 sending is best-effort; probes to v6 targets fail individually without it
        let v6 = if has_v6 {
            open_raw(Domain::IPV6, Protocol::ICMPV6)
                .map_err(|e| debug!("ICMPv6 send socket unavailable: {}", e))
                .ok()
        } else {
            None
        };

        Ok((Self { v4, v6 }, bound))
    }
}

#[async_trait]
impl EchoTransport for RawIcmpTransport {
    async fn send_echo(&self, target: IpAddr, identifier: u16, sequence: u16) -> io::Result<()> {
        let (socket, buffer) = match target {
            IpAddr::V4(_) => (
                self.v4.as_ref(),
                packet::encode_echo_request_v4(identifier, sequence),
            ),
            IpAddr::V6(_) => (
                self.v6.as_ref(),
                packet::encode_echo_request_v6(identifier, sequence),
            ),
        };

        let socket = socket.ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::Unsupported,
                format!("no ICMP socket for address family of {}", target),
            )
        })?;
        let buffer = buffer.map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;

        let destination = SockAddr::from(SocketAddr::new(target, 0));
        socket.send_to(&buffer, &destination)?;
        trace!(%target, sequence, "echo request sent");
        Ok(())
    }
}

/// Usable addresses of all up interfaces, with the scope id for IPv6.
fn local_addresses() -> Vec<(IpAddr, u32)> {
    datalink::interfaces()
        .into_iter()
        .filter(|iface| iface.is_up())
        .flat_map(|iface| {
            let index = iface.index;
            iface
                .ips
                .into_iter()
                .map(move |network| (network.ip(), index))
        })
        .collect()
}

fn open_raw(domain: Domain, protocol: Protocol) -> EngineResult<Socket> {
    Socket::new(domain, Type::RAW, Some(protocol)).map_err(|e| {
        if e.kind() == io::ErrorKind::PermissionDenied {
            EngineError::PermissionDenied(
                "Raw ICMP sockets require root/sudo or CAP_NET_RAW".to_string(),
            )
        } else {
            EngineError::RawSocket(e.to_string())
        }
    })
}

fn open_listener(address: IpAddr, scope: u32) -> EngineResult<Socket> {
    let socket = match address {
        IpAddr::V4(_) => open_raw(Domain::IPV4, Protocol::ICMPV4)?,
        IpAddr::V6(_) => open_raw(Domain::IPV6, Protocol::ICMPV6)?,
    };

    let local = match address {
        IpAddr::V4(v4) => SocketAddr::new(IpAddr::V4(v4), 0),
        IpAddr::V6(v6) => {
            // Link-local addresses only bind with their interface scope
            let link_local = (v6.segments()[0] & 0xffc0) == 0xfe80;
            let scope = if link_local { scope } else { 0 };
            SocketAddr::V6(SocketAddrV6::new(v6, 0, 0, scope))
        }
    };

    let bind_error = |e: io::Error| EngineError::Bind {
        address: address.to_string(),
        reason: e.to_string(),
    };
    socket.bind(&SockAddr::from(local)).map_err(bind_error)?;
    socket
        .set_read_timeout(Some(LISTENER_POLL))
        .map_err(bind_error)?;

    Ok(socket)
}

fn spawn_listener(
    socket: Socket,
    address: IpAddr,
    replies: mpsc::Sender<EchoReply>,
    errors: mpsc::Sender<EngineError>,
) -> EngineResult<()> {
    std::thread::Builder::new()
        .name(format!("icmp-listen-{}", address))
        .spawn(move || listen(socket, address, replies, errors))
        .map(|_| ())
        .map_err(|e| EngineError::Bind {
            address: address.to_string(),
            reason: e.to_string(),
        })
}

fn listen(
    socket: Socket,
    address: IpAddr,
    replies: mpsc::Sender<EchoReply>,
    errors: mpsc::Sender<EngineError>,
) {
    let mut buffer = [MaybeUninit::<u8>::uninit(); RECV_BUFFER];

    while !replies.is_closed() {
        let (len, from) = match socket.recv_from(&mut buffer) {
            Ok(received) => received,
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                continue;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                let error = EngineError::Receive {
                    address: address.to_string(),
                    reason: e.to_string(),
                };
                if errors.blocking_send(error).is_err() {
                    break;
                }
                std::thread::sleep(LISTENER_POLL);
                continue;
            }
        };

        // SAFETY: recv_from initialized the first `len` bytes of `buffer`.
        let datagram =
            unsafe { std::slice::from_raw_parts(buffer.as_ptr().cast::<u8>(), len) };

        let reply = match address {
            IpAddr::V4(_) => packet::decode_reply_v4(datagram),
            IpAddr::V6(_) => from
                .as_socket_ipv6()
                .and_then(|source| packet::decode_reply_v6(datagram, *source.ip())),
        };

        if let Some(reply) = reply {
            if replies.blocking_send(reply).is_err() {
                break;
            }
        }
    }

    debug!(%address, "ICMP listener stopped");
}
