//! Packet builders for the unit tests.

use pnet::packet::ip::IpNextHeaderProtocol;
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::MutableIpv4Packet;
use pnet::packet::ipv6::MutableIpv6Packet;
use pnet::packet::tcp::MutableTcpPacket;
use pnet::packet::udp::MutableUdpPacket;
use std::net::Ipv4Addr;
use std::net::Ipv6Addr;

use crate::packet::PacketRef;

#[derive(Debug, Clone)]
pub struct EthernetBuilder {
    ethertype: u16,
    vlan_inner: Option<u16>,
    payload: Vec<u8>,
}

impl EthernetBuilder {
    pub fn new() -> Self {
        EthernetBuilder {
            ethertype: 0x0800,
            vlan_inner: None,
            payload: Vec::new(),
        }
    }
    pub fn ipv4(mut self) -> Self {
        self.ethertype = 0x0800;
        self
    }
    pub fn arp(mut self) -> Self {
        self.ethertype = 0x0806;
        self
    }
    pub fn vlan(mut self, inner_ethertype: u16) -> Self {
        self.ethertype = 0x8100;
        self.vlan_inner = Some(inner_ethertype);
        self
    }
    pub fn payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }
    pub fn build(self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(18 + self.payload.len());
        frame.extend_from_slice(&[0x00, 0x0c, 0x29, 0x82, 0x7f, 0x58]);
        frame.extend_from_slice(&[0x00, 0x50, 0x56, 0xc0, 0x00, 0x08]);
        frame.extend_from_slice(&self.ethertype.to_be_bytes());
        if let Some(inner) = self.vlan_inner {
            frame.extend_from_slice(&[0x00, 0x64]);
            frame.extend_from_slice(&inner.to_be_bytes());
        }
        frame.extend_from_slice(&self.payload);
        frame
    }
}

#[derive(Debug, Clone)]
pub struct Ipv4Builder {
    source: Ipv4Addr,
    destination: Ipv4Addr,
    dscp: u8,
    ecn: u8,
    identification: u16,
    flags: u8,
    fragment_offset: u16,
    ttl: u8,
    options_words: u8,
    protocol: IpNextHeaderProtocol,
    payload: Vec<u8>,
}

impl Ipv4Builder {
    pub fn new() -> Self {
        Ipv4Builder {
            source: Ipv4Addr::new(192, 0, 2, 1),
            destination: Ipv4Addr::new(192, 0, 2, 2),
            dscp: 0,
            ecn: 0,
            identification: 0,
            flags: 0,
            fragment_offset: 0,
            ttl: 64,
            options_words: 0,
            protocol: IpNextHeaderProtocols::Tcp,
            payload: TcpBuilder::new().build(),
        }
    }
    pub fn source(mut self, source: Ipv4Addr) -> Self {
        self.source = source;
        self
    }
    pub fn destination(mut self, destination: Ipv4Addr) -> Self {
        self.destination = destination;
        self
    }
    pub fn dscp(mut self, dscp: u8) -> Self {
        self.dscp = dscp;
        self
    }
    pub fn ecn(mut self, ecn: u8) -> Self {
        self.ecn = ecn;
        self
    }
    pub fn identification(mut self, identification: u16) -> Self {
        self.identification = identification;
        self
    }
    pub fn fragment(mut self, flags: u8, offset: u16) -> Self {
        self.flags = flags;
        self.fragment_offset = offset;
        self
    }
    pub fn ttl(mut self, ttl: u8) -> Self {
        self.ttl = ttl;
        self
    }
    pub fn options_words(mut self, words: u8) -> Self {
        self.options_words = words;
        self
    }
    pub fn payload(mut self, protocol: IpNextHeaderProtocol, payload: Vec<u8>) -> Self {
        self.protocol = protocol;
        self.payload = payload;
        self
    }
    pub fn build(self) -> Vec<u8> {
        let header_len = 20 + self.options_words as usize * 4;
        let mut buf = vec![0u8; header_len + self.payload.len()];
        let total_length = buf.len() as u16;
        {
            let mut ipv4_packet = MutableIpv4Packet::new(&mut buf).unwrap();
            ipv4_packet.set_version(4);
            ipv4_packet.set_header_length((header_len / 4) as u8);
            ipv4_packet.set_dscp(self.dscp);
            ipv4_packet.set_ecn(self.ecn);
            ipv4_packet.set_total_length(total_length);
            ipv4_packet.set_identification(self.identification);
            ipv4_packet.set_flags(self.flags);
            ipv4_packet.set_fragment_offset(self.fragment_offset);
            ipv4_packet.set_ttl(self.ttl);
            ipv4_packet.set_next_level_protocol(self.protocol);
            ipv4_packet.set_source(self.source);
            ipv4_packet.set_destination(self.destination);
        }
        buf[header_len..].copy_from_slice(&self.payload);
        buf
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Ipv6Extension {
    HopByHop,
    Fragment { offset: u16, more_fragments: bool },
}

impl Ipv6Extension {
    fn kind(&self) -> IpNextHeaderProtocol {
        match self {
            Ipv6Extension::HopByHop => IpNextHeaderProtocols::Hopopt,
            Ipv6Extension::Fragment { .. } => IpNextHeaderProtocols::Ipv6Frag,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Ipv6Builder {
    source: Ipv6Addr,
    destination: Ipv6Addr,
    traffic_class: u8,
    flow_label: u32,
    hop_limit: u8,
    extensions: Vec<Ipv6Extension>,
    protocol: IpNextHeaderProtocol,
    payload: Vec<u8>,
}

impl Ipv6Builder {
    pub fn new() -> Self {
        Ipv6Builder {
            source: Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 0x1),
            destination: Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 0x2),
            traffic_class: 0,
            flow_label: 0,
            hop_limit: 64,
            extensions: Vec::new(),
            protocol: IpNextHeaderProtocols::Ipv6NoNxt,
            payload: Vec::new(),
        }
    }
    pub fn source(mut self, source: Ipv6Addr) -> Self {
        self.source = source;
        self
    }
    pub fn destination(mut self, destination: Ipv6Addr) -> Self {
        self.destination = destination;
        self
    }
    pub fn traffic_class(mut self, traffic_class: u8) -> Self {
        self.traffic_class = traffic_class;
        self
    }
    pub fn flow_label(mut self, flow_label: u32) -> Self {
        self.flow_label = flow_label;
        self
    }
    pub fn hop_limit(mut self, hop_limit: u8) -> Self {
        self.hop_limit = hop_limit;
        self
    }
    pub fn extension(mut self, extension: Ipv6Extension) -> Self {
        self.extensions.push(extension);
        self
    }
    pub fn payload(mut self, protocol: IpNextHeaderProtocol, payload: Vec<u8>) -> Self {
        self.protocol = protocol;
        self.payload = payload;
        self
    }
    pub fn build(self) -> Vec<u8> {
        let kinds: Vec<IpNextHeaderProtocol> = self
            .extensions
            .iter()
            .map(|extension| extension.kind())
            .chain(std::iter::once(self.protocol))
            .collect();
        let mut extension_bytes = Vec::new();
        for (i, extension) in self.extensions.iter().enumerate() {
            let next = kinds[i + 1].0;
            match extension {
                // PadN option filling the 8-byte header
                Ipv6Extension::HopByHop => {
                    extension_bytes.extend_from_slice(&[next, 0, 1, 4, 0, 0, 0, 0])
                }
                Ipv6Extension::Fragment {
                    offset,
                    more_fragments,
                } => {
                    let field = (*offset << 3) | u16::from(*more_fragments);
                    extension_bytes.extend_from_slice(&[next, 0]);
                    extension_bytes.extend_from_slice(&field.to_be_bytes());
                    extension_bytes.extend_from_slice(&[0, 0, 0, 1]);
                }
            }
        }
        let payload_length = extension_bytes.len() + self.payload.len();
        let mut buf = vec![0u8; 40 + payload_length];
        {
            let mut ipv6_packet = MutableIpv6Packet::new(&mut buf).unwrap();
            ipv6_packet.set_version(6);
            ipv6_packet.set_traffic_class(self.traffic_class);
            ipv6_packet.set_flow_label(self.flow_label);
            ipv6_packet.set_payload_length(payload_length as u16);
            ipv6_packet.set_next_header(kinds[0]);
            ipv6_packet.set_hop_limit(self.hop_limit);
            ipv6_packet.set_source(self.source);
            ipv6_packet.set_destination(self.destination);
        }
        buf[40..40 + extension_bytes.len()].copy_from_slice(&extension_bytes);
        buf[40 + extension_bytes.len()..].copy_from_slice(&self.payload);
        buf
    }
}

#[derive(Debug, Clone)]
pub struct TcpBuilder {
    src_port: u16,
    dst_port: u16,
    flags: u8,
    window: u16,
}

impl TcpBuilder {
    pub fn new() -> Self {
        TcpBuilder {
            src_port: 49152,
            dst_port: 80,
            flags: 0,
            window: 65535,
        }
    }
    pub fn ports(mut self, src_port: u16, dst_port: u16) -> Self {
        self.src_port = src_port;
        self.dst_port = dst_port;
        self
    }
    /// Raw flags byte, FIN in the lowest bit.
    pub fn flags(mut self, flags: u8) -> Self {
        self.flags = flags;
        self
    }
    pub fn window(mut self, window: u16) -> Self {
        self.window = window;
        self
    }
    pub fn build(self) -> Vec<u8> {
        let mut buf = vec![0u8; 20];
        {
            let mut tcp_packet = MutableTcpPacket::new(&mut buf).unwrap();
            tcp_packet.set_source(self.src_port);
            tcp_packet.set_destination(self.dst_port);
            tcp_packet.set_data_offset(5);
            tcp_packet.set_flags(self.flags.into());
            tcp_packet.set_window(self.window);
        }
        buf
    }
}

#[derive(Debug, Clone)]
pub struct UdpBuilder {
    src_port: u16,
    dst_port: u16,
}

impl UdpBuilder {
    pub fn new() -> Self {
        UdpBuilder {
            src_port: 49152,
            dst_port: 53,
        }
    }
    pub fn ports(mut self, src_port: u16, dst_port: u16) -> Self {
        self.src_port = src_port;
        self.dst_port = dst_port;
        self
    }
    pub fn build(self) -> Vec<u8> {
        let mut buf = vec![0u8; 8];
        {
            let mut udp_packet = MutableUdpPacket::new(&mut buf).unwrap();
            udp_packet.set_source(self.src_port);
            udp_packet.set_destination(self.dst_port);
            udp_packet.set_length(8);
        }
        buf
    }
}

/// Wrap a datagram built above for the predicates under test.
pub fn ip_packet(data: &[u8]) -> PacketRef<'_> {
    PacketRef::from_ip(data)
}
