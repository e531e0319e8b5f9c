use pnet::ipnetwork::IpNetwork;
use pnet::packet::ip::IpNextHeaderProtocol;
use pnet::packet::ip::IpNextHeaderProtocols;
use std::fmt;
use std::net::IpAddr;
use std::net::Ipv4Addr;
use std::net::Ipv6Addr;
use std::sync::LazyLock;
use strum_macros::Display;
use strum_macros::EnumIter;
use strum_macros::EnumString;

use crate::packet::PacketView;

const DSCP_SHIFT: u8 = 2;
const ECN_MASK: u8 = 0b0000_0011;
const ECN_CE: u8 = 0b0000_0011;

/// Comparison operator written between a keyword and its operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, EnumString, EnumIter, Display)]
pub enum Operator {
    #[default]
    #[strum(to_string = "==", serialize = "=")]
    Eq,
    #[strum(to_string = "!=")]
    Ne,
    #[strum(to_string = ">")]
    Gt,
    #[strum(to_string = ">=")]
    Ge,
    #[strum(to_string = "<")]
    Lt,
    #[strum(to_string = "<=")]
    Le,
}

impl Operator {
    pub fn apply<T: PartialOrd>(self, field: T, operand: T) -> bool {
        match self {
            Operator::Eq => field == operand,
            Operator::Ne => field != operand,
            Operator::Gt => field > operand,
            Operator::Ge => field >= operand,
            Operator::Lt => field < operand,
            Operator::Le => field <= operand,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, EnumIter, Display)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum TcpFlag {
    Fin,
    Syn,
    Rst,
    Psh,
    Ack,
    Urg,
    Ece,
    Cwr,
}

impl TcpFlag {
    /// Bit of this flag in the TCP flags byte.
    pub fn bit(self) -> u8 {
        match self {
            TcpFlag::Fin => 0b0000_0001,
            TcpFlag::Syn => 0b0000_0010,
            TcpFlag::Rst => 0b0000_0100,
            TcpFlag::Psh => 0b0000_1000,
            TcpFlag::Ack => 0b0001_0000,
            TcpFlag::Urg => 0b0010_0000,
            TcpFlag::Ece => 0b0100_0000,
            TcpFlag::Cwr => 0b1000_0000,
        }
    }
}

static PROTOCOL_NAME: LazyLock<Vec<&str>> = LazyLock::new(|| {
    vec![
        "icmp", "igmp", "tcp", "udp", "dccp", "gre", "esp", "ah", "icmp6", "icmpv6", "ospf",
        "pim", "vrrp", "sctp", "udplite",
    ]
});

static PROTOCOL_TYPE: LazyLock<Vec<IpNextHeaderProtocol>> = LazyLock::new(|| {
    vec![
        IpNextHeaderProtocols::Icmp,
        IpNextHeaderProtocols::Igmp,
        IpNextHeaderProtocols::Tcp,
        IpNextHeaderProtocols::Udp,
        IpNextHeaderProtocols::Dccp,
        IpNextHeaderProtocols::Gre,
        IpNextHeaderProtocols::Esp,
        IpNextHeaderProtocols::Ah,
        IpNextHeaderProtocols::Icmpv6,
        IpNextHeaderProtocols::Icmpv6,
        IpNextHeaderProtocols::OspfigP,
        IpNextHeaderProtocols::Pim,
        IpNextHeaderProtocols::Vrrp,
        IpNextHeaderProtocols::Sctp,
        IpNextHeaderProtocols::UdpLite,
    ]
});

/// Look up a transport protocol keyword such as `tcp` or `icmp6`.
pub fn protocol_by_name(name: &str) -> Option<IpNextHeaderProtocol> {
    PROTOCOL_NAME
        .iter()
        .position(|&x| x.eq_ignore_ascii_case(name))
        .map(|index| PROTOCOL_TYPE[index])
}

pub fn valid_protocol() -> Vec<String> {
    PROTOCOL_NAME.iter().map(|x| x.to_string()).collect()
}

/// An address with its mask. Host predicates carry a full-length mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddrMask {
    addr: IpAddr,
    mask: IpAddr,
}

impl AddrMask {
    pub fn host(addr: IpAddr) -> Self {
        let mask = match addr {
            IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::from(u32::MAX)),
            IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::from(u128::MAX)),
        };
        AddrMask { addr, mask }
    }
    pub fn network(network: IpNetwork) -> Self {
        AddrMask {
            addr: network.ip(),
            mask: network.mask(),
        }
    }
    pub fn addr(&self) -> IpAddr {
        self.addr
    }
    pub fn mask(&self) -> IpAddr {
        self.mask
    }
    pub fn prefix(&self) -> u32 {
        match self.mask {
            IpAddr::V4(mask) => u32::from(mask).leading_ones(),
            IpAddr::V6(mask) => u128::from(mask).leading_ones(),
        }
    }
    /// `(field & mask) OP (addr & mask)`; false across address families.
    pub fn compare(&self, operator: Operator, field: IpAddr) -> bool {
        match (self.addr, self.mask, field) {
            (IpAddr::V4(addr), IpAddr::V4(mask), IpAddr::V4(field)) => {
                let mask = u32::from(mask);
                operator.apply(u32::from(field) & mask, u32::from(addr) & mask)
            }
            (IpAddr::V6(addr), IpAddr::V6(mask), IpAddr::V6(field)) => {
                let mask = u128::from(mask);
                operator.apply(u128::from(field) & mask, u128::from(addr) & mask)
            }
            _ => false,
        }
    }
}

impl fmt::Display for AddrMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix())
    }
}

/// The leaf tests a filter expression is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Host(AddrMask),
    SrcHost(AddrMask),
    DstHost(AddrMask),
    Net(AddrMask),
    SrcNet(AddrMask),
    DstNet(AddrMask),
    Version(u8),
    HeaderLength(u8),
    Id(u16),
    Tos(u8),
    Dscp(u8),
    Ecn(u8),
    Ce,
    Ttl(u8),
    Length(u16),
    Proto(u8),
    Frag,
    Unfrag,
    FlowLabel(u32),
    PayloadLength(u16),
    HopLimit(u8),
    NextHeader(u8),
    Port(u16),
    SrcPort(u16),
    DstPort(u16),
    TcpFlag(TcpFlag),
    TcpWindow(u16),
    Constant(bool),
}

impl Primitive {
    /// Boolean primitives have no operand and ignore the operator.
    pub fn is_boolean(&self) -> bool {
        matches!(
            self,
            Primitive::Ce
                | Primitive::Frag
                | Primitive::Unfrag
                | Primitive::TcpFlag(_)
                | Primitive::Constant(_)
        )
    }
    fn matches<P: PacketView + ?Sized>(&self, operator: Operator, packet: &P) -> bool {
        let ip_header = packet.ip_header();
        match *self {
            Primitive::Host(target) | Primitive::Net(target) => ip_header.is_some_and(|ip| {
                target.compare(operator, ip.source()) || target.compare(operator, ip.destination())
            }),
            Primitive::SrcHost(target) | Primitive::SrcNet(target) => {
                ip_header.is_some_and(|ip| target.compare(operator, ip.source()))
            }
            Primitive::DstHost(target) | Primitive::DstNet(target) => {
                ip_header.is_some_and(|ip| target.compare(operator, ip.destination()))
            }
            Primitive::Version(version) => {
                ip_header.is_some_and(|ip| operator.apply(ip.version(), version))
            }
            Primitive::HeaderLength(words) => ip_header
                .and_then(|ip| ip.header_length())
                .is_some_and(|hl| operator.apply(hl, words)),
            Primitive::Id(id) => ip_header
                .and_then(|ip| ip.identification())
                .is_some_and(|field| operator.apply(field, id)),
            Primitive::Tos(tos) => ip_header.is_some_and(|ip| operator.apply(ip.tos(), tos)),
            Primitive::Dscp(dscp) => {
                ip_header.is_some_and(|ip| operator.apply(ip.tos() >> DSCP_SHIFT, dscp))
            }
            Primitive::Ecn(ecn) => {
                ip_header.is_some_and(|ip| operator.apply(ip.tos() & ECN_MASK, ecn))
            }
            Primitive::Ce => ip_header.is_some_and(|ip| ip.tos() & ECN_MASK == ECN_CE),
            Primitive::Ttl(ttl) => ip_header.is_some_and(|ip| operator.apply(ip.ttl(), ttl)),
            Primitive::Length(length) => {
                ip_header.is_some_and(|ip| operator.apply(ip.length(), length))
            }
            Primitive::Proto(proto) => {
                ip_header.is_some_and(|ip| operator.apply(ip.protocol().0, proto))
            }
            Primitive::Frag => ip_header.is_some_and(|ip| ip.is_fragment()),
            Primitive::Unfrag => ip_header.is_some_and(|ip| !ip.is_fragment()),
            Primitive::FlowLabel(label) => ip_header
                .and_then(|ip| ip.flow_label())
                .is_some_and(|field| operator.apply(field, label)),
            Primitive::PayloadLength(length) => ip_header
                .and_then(|ip| ip.payload_length())
                .is_some_and(|field| operator.apply(field, length)),
            Primitive::HopLimit(limit) => ip_header
                .and_then(|ip| ip.hop_limit())
                .is_some_and(|field| operator.apply(field, limit)),
            Primitive::NextHeader(proto) => ip_header
                .and_then(|ip| ip.next_header())
                .is_some_and(|field| operator.apply(field.0, proto)),
            Primitive::Port(port) => packet.ports().is_some_and(|ports| {
                operator.apply(ports.src_port, port) || operator.apply(ports.dst_port, port)
            }),
            Primitive::SrcPort(port) => packet
                .ports()
                .is_some_and(|ports| operator.apply(ports.src_port, port)),
            Primitive::DstPort(port) => packet
                .ports()
                .is_some_and(|ports| operator.apply(ports.dst_port, port)),
            Primitive::TcpFlag(flag) => packet
                .tcp_header()
                .is_some_and(|tcp| u16::from(tcp.get_flags()) & u16::from(flag.bit()) != 0),
            Primitive::TcpWindow(window) => packet
                .tcp_header()
                .is_some_and(|tcp| operator.apply(tcp.get_window(), window)),
            Primitive::Constant(value) => value,
        }
    }
    fn fmt_with(&self, f: &mut fmt::Formatter<'_>, operator: &str) -> fmt::Result {
        match self {
            Primitive::Host(target) => write!(f, "host {}{}", operator, target.addr()),
            Primitive::SrcHost(target) => write!(f, "src host {}{}", operator, target.addr()),
            Primitive::DstHost(target) => write!(f, "dst host {}{}", operator, target.addr()),
            Primitive::Net(target) => write!(f, "net {}{}", operator, target),
            Primitive::SrcNet(target) => write!(f, "src net {}{}", operator, target),
            Primitive::DstNet(target) => write!(f, "dst net {}{}", operator, target),
            Primitive::Version(v) => write!(f, "ip vers {}{}", operator, v),
            Primitive::HeaderLength(v) => write!(f, "ip hl {}{}", operator, v),
            Primitive::Id(v) => write!(f, "ip id {}{}", operator, v),
            Primitive::Tos(v) => write!(f, "ip tos {}{}", operator, v),
            Primitive::Dscp(v) => write!(f, "ip dscp {}{}", operator, v),
            Primitive::Ecn(v) => write!(f, "ip ecn {}{}", operator, v),
            Primitive::Ce => write!(f, "ip ce"),
            Primitive::Ttl(v) => write!(f, "ip ttl {}{}", operator, v),
            Primitive::Length(v) => write!(f, "ip len {}{}", operator, v),
            Primitive::Proto(v) => write!(f, "ip proto {}{}", operator, v),
            Primitive::Frag => write!(f, "ip frag"),
            Primitive::Unfrag => write!(f, "ip unfrag"),
            Primitive::FlowLabel(v) => write!(f, "ip6 flow {}{}", operator, v),
            Primitive::PayloadLength(v) => write!(f, "ip6 plen {}{}", operator, v),
            Primitive::HopLimit(v) => write!(f, "ip6 hlim {}{}", operator, v),
            Primitive::NextHeader(v) => write!(f, "ip6 nxt {}{}", operator, v),
            Primitive::Port(v) => write!(f, "port {}{}", operator, v),
            Primitive::SrcPort(v) => write!(f, "src port {}{}", operator, v),
            Primitive::DstPort(v) => write!(f, "dst port {}{}", operator, v),
            Primitive::TcpFlag(flag) => write!(f, "tcp opt {}", flag),
            Primitive::TcpWindow(v) => write!(f, "tcp win {}{}", operator, v),
            Primitive::Constant(value) => write!(f, "{}", value),
        }
    }
}

/// A primitive bound to its operator and to the `not` that preceded it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PrimitiveToken {
    kind: Primitive,
    operator: Option<Operator>,
    negated: bool,
}

impl PrimitiveToken {
    pub fn new(kind: Primitive, operator: Option<Operator>, negated: bool) -> Self {
        PrimitiveToken {
            kind,
            operator: if kind.is_boolean() {
                None
            } else {
                Some(operator.unwrap_or_default())
            },
            negated,
        }
    }
    pub fn kind(&self) -> Primitive {
        self.kind
    }
    pub fn operator(&self) -> Option<Operator> {
        self.operator
    }
    pub fn is_negated(&self) -> bool {
        self.negated
    }
    /// Same primitive and operator with the negation flipped.
    pub fn negated_clone(&self) -> Self {
        PrimitiveToken {
            negated: !self.negated,
            ..*self
        }
    }
    pub fn check<P: PacketView + ?Sized>(&self, packet: &P) -> bool {
        let matched = self
            .kind
            .matches(self.operator.unwrap_or_default(), packet);
        matched != self.negated
    }
}

impl fmt::Display for PrimitiveToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            write!(f, "not ")?;
        }
        let operator = match self.operator {
            Some(Operator::Eq) | None => String::new(),
            Some(operator) => format!("{} ", operator),
        };
        self.kind.fmt_with(f, &operator)
    }
}
