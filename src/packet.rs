//! Read-only access to the headers of a packet owned by the host.
//!
//! The filter never owns packet memory. Everything it needs is reached
//! through [`PacketView`]: the bytes starting at the network header, the
//! bytes starting at the transport header and the transport protocol.
//! [`PacketRef`] is the borrowed implementation used for raw IP datagrams
//! and Ethernet frames.

use pnet::packet::Packet;
use pnet::packet::ethernet::EtherType;
use pnet::packet::ethernet::EtherTypes;
use pnet::packet::ethernet::EthernetPacket;
use pnet::packet::ip::IpNextHeaderProtocol;
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::Ipv4Flags;
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::ipv6::Ipv6Packet;
use pnet::packet::tcp::TcpPacket;
use pnet::packet::udp::UdpPacket;
use std::net::IpAddr;

const ETHERNET_HEADER_LEN: usize = 14;
const VLAN_TAG_LEN: usize = 4;
const IPV4_MIN_HEADER_WORDS: u8 = 5;
const IPV6_HEADER_LEN: usize = 40;
const IPV6_FRAGMENT_HEADER_LEN: usize = 8;

pub trait PacketView {
    /// Bytes from the start of the network header to the end of the packet.
    fn network_header(&self) -> &[u8];
    /// Bytes from the start of the transport header, when one was located.
    fn transport_header(&self) -> Option<&[u8]>;
    fn transport_protocol(&self) -> Option<IpNextHeaderProtocol>;
    /// Total packet length, link layer included.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    fn ip_header(&self) -> Option<IpHeader<'_>> {
        IpHeader::new(self.network_header())
    }
    fn tcp_header(&self) -> Option<TcpPacket<'_>> {
        match self.transport_protocol()? {
            IpNextHeaderProtocols::Tcp => TcpPacket::new(self.transport_header()?),
            _ => None,
        }
    }
    fn ports(&self) -> Option<PacketPort> {
        let transport = self.transport_header()?;
        match self.transport_protocol()? {
            IpNextHeaderProtocols::Tcp => TcpPacket::new(transport).map(|tcp| PacketPort {
                src_port: tcp.get_source(),
                dst_port: tcp.get_destination(),
            }),
            IpNextHeaderProtocols::Udp | IpNextHeaderProtocols::UdpLite => {
                UdpPacket::new(transport).map(|udp| PacketPort {
                    src_port: udp.get_source(),
                    dst_port: udp.get_destination(),
                })
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketPort {
    pub src_port: u16,
    pub dst_port: u16,
}

/// Where the IPv6 extension header chain ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Ipv6Chain {
    transport_offset: usize,
    next_header: IpNextHeaderProtocol,
    fragment: Option<FragmentInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FragmentInfo {
    offset: u16,
    more_fragments: bool,
}

impl FragmentInfo {
    fn is_fragment(&self) -> bool {
        self.offset != 0 || self.more_fragments
    }
}

fn walk_ipv6_extensions(header: &[u8]) -> Option<Ipv6Chain> {
    let ipv6_packet = Ipv6Packet::new(header)?;
    let mut next_header = ipv6_packet.get_next_header();
    let mut offset = IPV6_HEADER_LEN;
    let mut fragment = None;
    loop {
        let ext_len = match next_header {
            IpNextHeaderProtocols::Hopopt
            | IpNextHeaderProtocols::Ipv6Route
            | IpNextHeaderProtocols::Ipv6Opts => (*header.get(offset + 1)? as usize + 1) * 8,
            IpNextHeaderProtocols::Ipv6Frag => {
                let frag = header.get(offset..offset + IPV6_FRAGMENT_HEADER_LEN)?;
                let field = u16::from_be_bytes([frag[2], frag[3]]);
                fragment = Some(FragmentInfo {
                    offset: field >> 3,
                    more_fragments: field & 1 == 1,
                });
                IPV6_FRAGMENT_HEADER_LEN
            }
            // the AH length counts 32-bit words minus two
            IpNextHeaderProtocols::Ah => (*header.get(offset + 1)? as usize + 2) * 4,
            _ => break,
        };
        next_header = IpNextHeaderProtocol(*header.get(offset)?);
        offset += ext_len;
    }
    Some(Ipv6Chain {
        transport_offset: offset,
        next_header,
        fragment,
    })
}

/// An IPv4 or IPv6 header, picked by the version nibble.
pub enum IpHeader<'p> {
    V4(Ipv4Packet<'p>),
    V6(Ipv6Packet<'p>),
}

impl<'p> IpHeader<'p> {
    pub fn new(header: &'p [u8]) -> Option<Self> {
        match header.first()? >> 4 {
            4 => Ipv4Packet::new(header).map(IpHeader::V4),
            6 => Ipv6Packet::new(header).map(IpHeader::V6),
            _ => None,
        }
    }
    pub fn version(&self) -> u8 {
        match self {
            IpHeader::V4(ipv4_packet) => ipv4_packet.get_version(),
            IpHeader::V6(ipv6_packet) => ipv6_packet.get_version(),
        }
    }
    pub fn source(&self) -> IpAddr {
        match self {
            IpHeader::V4(ipv4_packet) => IpAddr::V4(ipv4_packet.get_source()),
            IpHeader::V6(ipv6_packet) => IpAddr::V6(ipv6_packet.get_source()),
        }
    }
    pub fn destination(&self) -> IpAddr {
        match self {
            IpHeader::V4(ipv4_packet) => IpAddr::V4(ipv4_packet.get_destination()),
            IpHeader::V6(ipv6_packet) => IpAddr::V6(ipv6_packet.get_destination()),
        }
    }
    /// The IPv4 type-of-service byte or the IPv6 traffic class.
    pub fn tos(&self) -> u8 {
        match self {
            IpHeader::V4(ipv4_packet) => (ipv4_packet.get_dscp() << 2) | ipv4_packet.get_ecn(),
            IpHeader::V6(ipv6_packet) => ipv6_packet.get_traffic_class(),
        }
    }
    /// The IPv4 time to live or the IPv6 hop limit.
    pub fn ttl(&self) -> u8 {
        match self {
            IpHeader::V4(ipv4_packet) => ipv4_packet.get_ttl(),
            IpHeader::V6(ipv6_packet) => ipv6_packet.get_hop_limit(),
        }
    }
    /// Length of the whole datagram, header included.
    pub fn length(&self) -> u16 {
        match self {
            IpHeader::V4(ipv4_packet) => ipv4_packet.get_total_length(),
            IpHeader::V6(ipv6_packet) => ipv6_packet
                .get_payload_length()
                .saturating_add(IPV6_HEADER_LEN as u16),
        }
    }
    /// IPv4 header length in 32-bit words.
    pub fn header_length(&self) -> Option<u8> {
        match self {
            IpHeader::V4(ipv4_packet) => Some(ipv4_packet.get_header_length()),
            IpHeader::V6(_) => None,
        }
    }
    pub fn identification(&self) -> Option<u16> {
        match self {
            IpHeader::V4(ipv4_packet) => Some(ipv4_packet.get_identification()),
            IpHeader::V6(_) => None,
        }
    }
    pub fn flow_label(&self) -> Option<u32> {
        match self {
            IpHeader::V4(_) => None,
            IpHeader::V6(ipv6_packet) => Some(ipv6_packet.get_flow_label()),
        }
    }
    pub fn payload_length(&self) -> Option<u16> {
        match self {
            IpHeader::V4(_) => None,
            IpHeader::V6(ipv6_packet) => Some(ipv6_packet.get_payload_length()),
        }
    }
    pub fn hop_limit(&self) -> Option<u8> {
        match self {
            IpHeader::V4(_) => None,
            IpHeader::V6(ipv6_packet) => Some(ipv6_packet.get_hop_limit()),
        }
    }
    /// IPv6 upper-layer protocol, past the extension chain.
    pub fn next_header(&self) -> Option<IpNextHeaderProtocol> {
        match self {
            IpHeader::V4(_) => None,
            IpHeader::V6(_) => Some(self.protocol()),
        }
    }
    /// Upper-layer protocol; for IPv6 the header after the extension chain.
    pub fn protocol(&self) -> IpNextHeaderProtocol {
        match self {
            IpHeader::V4(ipv4_packet) => ipv4_packet.get_next_level_protocol(),
            IpHeader::V6(ipv6_packet) => match walk_ipv6_extensions(ipv6_packet.packet()) {
                Some(chain) => chain.next_header,
                None => ipv6_packet.get_next_header(),
            },
        }
    }
    pub fn is_fragment(&self) -> bool {
        match self {
            IpHeader::V4(ipv4_packet) => {
                ipv4_packet.get_flags() & Ipv4Flags::MoreFragments != 0
                    || ipv4_packet.get_fragment_offset() != 0
            }
            IpHeader::V6(ipv6_packet) => walk_ipv6_extensions(ipv6_packet.packet())
                .and_then(|chain| chain.fragment)
                .is_some_and(|fragment| fragment.is_fragment()),
        }
    }
    /// Offset of the transport header relative to the start of this header.
    /// Non-first fragments carry no transport header.
    fn transport_offset(&self) -> Option<usize> {
        match self {
            IpHeader::V4(ipv4_packet) => {
                let words = ipv4_packet.get_header_length();
                if words < IPV4_MIN_HEADER_WORDS || ipv4_packet.get_fragment_offset() != 0 {
                    None
                } else {
                    Some(words as usize * 4)
                }
            }
            IpHeader::V6(ipv6_packet) => walk_ipv6_extensions(ipv6_packet.packet())
                .filter(|chain| chain.fragment.is_none_or(|fragment| fragment.offset == 0))
                .map(|chain| chain.transport_offset),
        }
    }
}

/// A packet borrowed from the host together with its header offsets.
#[derive(Debug, Clone, Copy)]
pub struct PacketRef<'a> {
    data: &'a [u8],
    network_offset: usize,
    transport_offset: Option<usize>,
    transport_protocol: Option<IpNextHeaderProtocol>,
}

impl<'a> PacketRef<'a> {
    /// Use offsets the host already knows. The transport protocol is read
    /// from the network header.
    pub fn new(data: &'a [u8], network_offset: usize, transport_offset: Option<usize>) -> Self {
        let transport_protocol = data
            .get(network_offset..)
            .and_then(IpHeader::new)
            .map(|ip| ip.protocol());
        PacketRef {
            data,
            network_offset,
            transport_offset,
            transport_protocol,
        }
    }
    /// A raw IPv4 or IPv6 datagram starting at offset zero.
    pub fn from_ip(data: &'a [u8]) -> Self {
        Self::locate(data, 0)
    }
    /// An Ethernet II frame, optionally carrying one 802.1Q tag. Frames that
    /// do not carry IPv4 or IPv6 give `None`.
    pub fn from_ethernet(frame: &'a [u8]) -> Option<Self> {
        let ethernet_packet = EthernetPacket::new(frame)?;
        let (ethertype, network_offset) = match ethernet_packet.get_ethertype() {
            EtherTypes::Vlan => {
                let inner = frame.get(ETHERNET_HEADER_LEN + 2..ETHERNET_HEADER_LEN + VLAN_TAG_LEN)?;
                (
                    EtherType(u16::from_be_bytes([inner[0], inner[1]])),
                    ETHERNET_HEADER_LEN + VLAN_TAG_LEN,
                )
            }
            ethertype => (ethertype, ETHERNET_HEADER_LEN),
        };
        match ethertype {
            EtherTypes::Ipv4 | EtherTypes::Ipv6 => Some(Self::locate(frame, network_offset)),
            _ => None,
        }
    }
    fn locate(data: &'a [u8], network_offset: usize) -> Self {
        let ip_header = data.get(network_offset..).and_then(IpHeader::new);
        let transport_offset = ip_header
            .as_ref()
            .and_then(|ip| ip.transport_offset())
            .map(|offset| network_offset + offset)
            .filter(|offset| *offset <= data.len());
        PacketRef {
            data,
            network_offset,
            transport_offset,
            transport_protocol: ip_header.map(|ip| ip.protocol()),
        }
    }
    pub fn data(&self) -> &'a [u8] {
        self.data
    }
    pub fn network_offset(&self) -> usize {
        self.network_offset
    }
    pub fn transport_offset(&self) -> Option<usize> {
        self.transport_offset
    }
}

impl PacketView for PacketRef<'_> {
    fn network_header(&self) -> &[u8] {
        self.data.get(self.network_offset..).unwrap_or(&[])
    }
    fn transport_header(&self) -> Option<&[u8]> {
        self.transport_offset.and_then(|offset| self.data.get(offset..))
    }
    fn transport_protocol(&self) -> Option<IpNextHeaderProtocol> {
        self.transport_protocol
    }
    fn len(&self) -> usize {
        self.data.len()
    }
}
