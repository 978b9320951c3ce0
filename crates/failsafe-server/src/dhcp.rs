//! Minimal DHCPv4 responder.
//!
//! Serves DISCOVER with OFFER and REQUEST with ACK for a single client,
//! leasing one address adjacent to the server's own, so a directly
//! attached browser gets connectivity out of the box. Everything else
//! (RELEASE, INFORM, malformed packets) is silently ignored.
//!
//! The codec is sans-IO and fully testable; [`DhcpServer`] adds the UDP
//! socket.

use std::net::Ipv4Addr;

use tokio::net::UdpSocket;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::error::ServerError;

/// Fixed BOOTP header preceding the options (RFC 2131), without the magic
/// cookie.
#[repr(C)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
struct BootpHeader {
    op: u8,
    htype: u8,
    hlen: u8,
    hops: u8,
    xid: [u8; 4],
    secs: [u8; 2],
    flags: [u8; 2],
    ciaddr: [u8; 4],
    yiaddr: [u8; 4],
    siaddr: [u8; 4],
    giaddr: [u8; 4],
    chaddr: [u8; 16],
    sname: [u8; 64],
    file: [u8; 128],
}

#[cfg(test)]
const BOOTP_HEADER_SIZE: usize = 236;
const MAGIC_COOKIE: [u8; 4] = [0x63, 0x82, 0x53, 0x63];

const OP_BOOTREQUEST: u8 = 1;
const OP_BOOTREPLY: u8 = 2;

const OPT_SUBNET_MASK: u8 = 1;
const OPT_ROUTER: u8 = 3;
const OPT_LEASE_TIME: u8 = 51;
const OPT_MESSAGE_TYPE: u8 = 53;
const OPT_SERVER_ID: u8 = 54;
const OPT_END: u8 = 255;
const OPT_PAD: u8 = 0;

const MSG_DISCOVER: u8 = 1;
const MSG_OFFER: u8 = 2;
const MSG_REQUEST: u8 = 3;
const MSG_ACK: u8 = 5;

/// Minimum reply size; short BOOTP frames upset some clients.
const MIN_REPLY: usize = 300;

/// Responder configuration.
#[derive(Debug, Clone, Copy)]
pub struct DhcpConfig {
    /// Address the HTTP server is reachable on; also server identifier
    /// and router option.
    pub server_ip: Ipv4Addr,
    /// Subnet mask handed to the client.
    pub netmask: Ipv4Addr,
    /// Lease time in seconds; short, this is a recovery LAN.
    pub lease_secs: u32,
}

impl DhcpConfig {
    /// The single address leased out: the server's own IP plus one when
    /// that stays inside the subnet and below broadcast, minus one
    /// otherwise.
    #[must_use]
    pub fn lease_addr(&self) -> Ipv4Addr {
        let ip = u32::from(self.server_ip);
        let mask = u32::from(self.netmask);
        let network = ip & mask;
        let broadcast = network | !mask;

        let up = ip.wrapping_add(1);
        if up & mask == network && up < broadcast {
            return Ipv4Addr::from(up);
        }
        Ipv4Addr::from(ip.wrapping_sub(1))
    }
}

/// Handle one inbound packet; `Some` is the reply to transmit.
///
/// DISCOVER → OFFER, REQUEST → ACK, anything else (including malformed
/// input) → `None`.
#[must_use]
pub fn handle_packet(config: &DhcpConfig, packet: &[u8]) -> Option<Vec<u8>> {
    let (header, rest) = BootpHeader::read_from_prefix(packet).ok()?;
    if header.op != OP_BOOTREQUEST {
        return None;
    }
    let options = rest.strip_prefix(&MAGIC_COOKIE)?;

    let msg_type = find_option(options, OPT_MESSAGE_TYPE).and_then(|v| v.first().copied())?;
    let reply_type = match msg_type {
        MSG_DISCOVER => MSG_OFFER,
        MSG_REQUEST => MSG_ACK,
        _ => return None,
    };

    Some(build_reply(config, &header, reply_type))
}

fn find_option(options: &[u8], wanted: u8) -> Option<&[u8]> {
    let mut at = 0;
    while at < options.len() {
        match options[at] {
            OPT_PAD => at += 1,
            OPT_END => return None,
            code => {
                let len = *options.get(at + 1)? as usize;
                let value = options.get(at + 2..at + 2 + len)?;
                if code == wanted {
                    return Some(value);
                }
                at += 2 + len;
            },
        }
    }
    None
}

fn build_reply(config: &DhcpConfig, request: &BootpHeader, msg_type: u8) -> Vec<u8> {
    let reply = BootpHeader {
        op: OP_BOOTREPLY,
        htype: request.htype,
        hlen: request.hlen,
        hops: 0,
        xid: request.xid,
        secs: [0; 2],
        flags: request.flags,
        ciaddr: [0; 4],
        yiaddr: config.lease_addr().octets(),
        siaddr: config.server_ip.octets(),
        giaddr: [0; 4],
        chaddr: request.chaddr,
        sname: [0; 64],
        file: [0; 128],
    };

    let mut packet = Vec::with_capacity(MIN_REPLY);
    packet.extend_from_slice(reply.as_bytes());
    packet.extend_from_slice(&MAGIC_COOKIE);

    packet.extend_from_slice(&[OPT_MESSAGE_TYPE, 1, msg_type]);
    packet.extend_from_slice(&[OPT_SERVER_ID, 4]);
    packet.extend_from_slice(&config.server_ip.octets());
    packet.extend_from_slice(&[OPT_LEASE_TIME, 4]);
    packet.extend_from_slice(&config.lease_secs.to_be_bytes());
    packet.extend_from_slice(&[OPT_SUBNET_MASK, 4]);
    packet.extend_from_slice(&config.netmask.octets());
    packet.extend_from_slice(&[OPT_ROUTER, 4]);
    packet.extend_from_slice(&config.server_ip.octets());
    packet.push(OPT_END);

    if packet.len() < MIN_REPLY {
        packet.resize(MIN_REPLY, 0);
    }
    packet
}

/// The UDP side of the responder.
pub struct DhcpServer {
    socket: UdpSocket,
    config: DhcpConfig,
    reply_port: u16,
}

impl DhcpServer {
    /// Bind the responder. Production uses ports 67/68; tests bind
    /// ephemeral ports.
    ///
    /// # Errors
    ///
    /// Socket setup failures.
    pub async fn bind(
        config: DhcpConfig,
        listen_port: u16,
        reply_port: u16,
    ) -> Result<Self, ServerError> {
        let socket = UdpSocket::bind(("0.0.0.0", listen_port)).await?;
        socket.set_broadcast(true)?;
        tracing::info!(port = listen_port, lease = %config.lease_addr(), "dhcp responder up");
        Ok(Self { socket, config, reply_port })
    }

    /// Bound socket address (useful with port 0 in tests).
    ///
    /// # Errors
    ///
    /// Socket introspection failure.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, ServerError> {
        Ok(self.socket.local_addr()?)
    }

    /// Receive one packet and answer it if it deserves an answer.
    ///
    /// # Errors
    ///
    /// Socket receive failures; send failures are logged and swallowed
    /// (the client will retry).
    pub async fn pump(&self) -> Result<(), ServerError> {
        let mut buf = [0u8; 1024];
        let (len, from) = self.socket.recv_from(&mut buf).await?;

        let Some(reply) = handle_packet(&self.config, &buf[..len]) else {
            return Ok(());
        };

        // Clients without an address yet can only hear broadcast.
        let dest = if from.ip().is_unspecified() {
            (Ipv4Addr::BROADCAST, self.reply_port).into()
        } else {
            from
        };
        if let Err(err) = self.socket.send_to(&reply, dest).await {
            tracing::warn!(%err, "dhcp reply send failed");
        }
        Ok(())
    }
}
