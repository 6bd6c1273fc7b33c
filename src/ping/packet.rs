//! ICMP echo packet encoding and decoding.
//!
//! IPv4 raw sockets deliver the IP header in front of the ICMP message;
//! ICMPv6 raw sockets deliver the ICMPv6 message only, and the kernel fills
//! in the ICMPv6 checksum on send.

use crate::error::{EngineError, EngineResult};
use pnet::packet::icmp::echo_reply::EchoReplyPacket;
use pnet::packet::icmp::echo_request::MutableEchoRequestPacket;
use pnet::packet::icmp::{self, IcmpCode, IcmpPacket, IcmpTypes};
use pnet::packet::icmpv6::{Icmpv6Code, Icmpv6Packet, Icmpv6Types, MutableIcmpv6Packet};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::Packet;
use std::net::{IpAddr, Ipv6Addr};

/// Identifier embedded in every echo request this engine sends.
pub const ICMP_IDENTIFIER: u16 = 0x3039;

/// Payload carried by every echo request.
const PAYLOAD: &[u8] = b"pingboard-echo-probe";

/// ICMP echo header: type, code, checksum, identifier, sequence.
const ECHO_HEADER_LEN: usize = 8;

/// An inbound echo reply, reduced to the fields used for correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EchoReply {
    pub source: IpAddr,
    pub identifier: u16,
    pub sequence: u16,
}

/// Build an ICMPv4 echo request with a valid checksum.
pub fn encode_echo_request_v4(identifier: u16, sequence: u16) -> EngineResult<Vec<u8>> {
    let mut buffer = vec![0u8; ECHO_HEADER_LEN + PAYLOAD.len()];
    let mut packet = MutableEchoRequestPacket::new(&mut buffer)
        .ok_or_else(|| EngineError::InvalidPacket("Failed to create echo request".to_string()))?;

    packet.set_icmp_type(IcmpTypes::EchoRequest);
    packet.set_icmp_code(IcmpCode::new(0));
    packet.set_identifier(identifier);
    packet.set_sequence_number(sequence);
    packet.set_payload(PAYLOAD);

    let checksum = icmp::checksum(
        &IcmpPacket::new(packet.packet())
            .ok_or_else(|| EngineError::InvalidPacket("Failed to view echo request".to_string()))?,
    );
    packet.set_checksum(checksum);

    Ok(buffer)
}

/// Build an ICMPv6 echo request. The checksum is left to the kernel.
pub fn encode_echo_request_v6(identifier: u16, sequence: u16) -> EngineResult<Vec<u8>> {
    let mut buffer = vec![0u8; ECHO_HEADER_LEN + PAYLOAD.len()];
    let mut packet = MutableIcmpv6Packet::new(&mut buffer)
        .ok_or_else(|| EngineError::InvalidPacket("Failed to create ICMPv6 packet".to_string()))?;

    packet.set_icmpv6_type(Icmpv6Types::EchoRequest);
    packet.set_icmpv6_code(Icmpv6Code::new(0));

    // ICMPv6 echo body: identifier, sequence, data
    let mut body = Vec::with_capacity(4 + PAYLOAD.len());
    body.extend_from_slice(&identifier.to_be_bytes());
    body.extend_from_slice(&sequence.to_be_bytes());
    body.extend_from_slice(PAYLOAD);
    packet.set_payload(&body);

    Ok(buffer)
}

/// Decode an IPv4 datagram as read from a raw ICMP socket.
///
/// Returns `None` for anything that is not a well-formed echo reply.
pub fn decode_reply_v4(datagram: &[u8]) -> Option<EchoReply> {
    let ip = Ipv4Packet::new(datagram)?;
    if ip.get_next_level_protocol() != IpNextHeaderProtocols::Icmp {
        return None;
    }

    let header_len = (ip.get_header_length() as usize) * 4;
    let message = datagram.get(header_len..)?;

    let icmp = IcmpPacket::new(message)?;
    if icmp.get_icmp_type() != IcmpTypes::EchoReply {
        return None;
    }

    let reply = EchoReplyPacket::new(message)?;
    Some(EchoReply {
        source: IpAddr::V4(ip.get_source()),
        identifier: reply.get_identifier(),
        sequence: reply.get_sequence_number(),
    })
}

/// Decode an ICMPv6 message received from `source`.
pub fn decode_reply_v6(message: &[u8], source: Ipv6Addr) -> Option<EchoReply> {
    let icmp = Icmpv6Packet::new(message)?;
    if icmp.get_icmpv6_type() != Icmpv6Types::EchoReply {
        return None;
    }

    let body = icmp.payload();
    if body.len() < 4 {
        return None;
    }

    Some(EchoReply {
        source: IpAddr::V6(source),
        identifier: u16::from_be_bytes([body[0], body[1]]),
        sequence: u16::from_be_bytes([body[2], body[3]]),
    })
}
