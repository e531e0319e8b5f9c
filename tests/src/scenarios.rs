use ip6filter::Dispatch;
use ip6filter::FilterAction;
use ip6filter::FilterError;
use ip6filter::Mode;
use ip6filter::PacketRef;
use ip6filter::ProgramConfig;
use ip6filter::ProgramSet;
use ip6filter::compile;
use pnet::packet::ethernet::EtherTypes;
use pnet::packet::ip::IpNextHeaderProtocols;
use std::net::Ipv4Addr;
use std::net::Ipv6Addr;

use crate::packets::TCP_ACK;
use crate::packets::TCP_SYN;
use crate::packets::ethernet;
use crate::packets::ipv4;
use crate::packets::ipv6;
use crate::packets::ipv6_fragment;
use crate::packets::tcp;
use crate::packets::udp;

fn v4(src: [u8; 4], dst: [u8; 4], ttl: u8) -> Vec<u8> {
    ipv4(
        Ipv4Addr::from(src),
        Ipv4Addr::from(dst),
        ttl,
        IpNextHeaderProtocols::Udp,
        &udp(1000, 2000),
    )
}

#[test]
fn scenario_a_src_host() {
    let ast = compile("src host 10.1.1.1").unwrap();
    let matching = v4([10, 1, 1, 1], [172, 16, 0, 1], 64);
    assert!(ast.matches(&PacketRef::from_ip(&matching)));
    for (src, dst) in [([10, 1, 1, 2], [10, 1, 1, 1]), ([192, 0, 2, 1], [10, 1, 1, 1])] {
        let data = v4(src, dst, 64);
        assert!(!ast.matches(&PacketRef::from_ip(&data)));
    }
}

#[test]
fn scenario_b_not_ttl() {
    let ast = compile("not ttl 5").unwrap();
    let data = v4([10, 0, 0, 1], [10, 0, 0, 2], 5);
    assert!(!ast.matches(&PacketRef::from_ip(&data)));
    let data = v4([10, 0, 0, 1], [10, 0, 0, 2], 7);
    assert!(ast.matches(&PacketRef::from_ip(&data)));
}

#[test]
fn scenario_c_classifier() {
    let set = ProgramSet::compile(
        ["dst net 10.0.0.0/8", "-"],
        Mode::Classifier {
            default_output: None,
        },
    )
    .unwrap();
    let data = v4([192, 0, 2, 9], [10, 5, 5, 5], 64);
    assert_eq!(set.process(&PacketRef::from_ip(&data)), Dispatch::Output(0));
    let data = v4([10, 5, 5, 5], [192, 0, 2, 1], 64);
    assert_eq!(set.process(&PacketRef::from_ip(&data)), Dispatch::Output(1));
}

#[test]
fn scenario_d_malformed_expression() {
    assert!(compile("and host 1.2.3.4").is_err());
    let set = ProgramSet::compile(
        ["and host 1.2.3.4", "host 1.2.3.4", "-"],
        Mode::Classifier {
            default_output: None,
        },
    )
    .unwrap();
    assert_eq!(set.len(), 2);
    assert_eq!(set.rejected().len(), 1);
    assert_eq!(set.rejected()[0].index, 0);
    let data = v4([1, 2, 3, 4], [10, 0, 0, 1], 64);
    assert_eq!(set.classify(&PacketRef::from_ip(&data)), Dispatch::Output(1));
    let data = v4([4, 3, 2, 1], [10, 0, 0, 1], 64);
    assert_eq!(set.classify(&PacketRef::from_ip(&data)), Dispatch::Output(2));
}

#[test]
fn ipv6_address_and_flags() {
    let src: Ipv6Addr = "2001:db8::1".parse().unwrap();
    let dst: Ipv6Addr = "2001:db8:ffff::2".parse().unwrap();
    let ast = compile("src host 2001:db8::1 and tcp opt ack").unwrap();

    let data = ipv6(src, dst, 64, IpNextHeaderProtocols::Tcp, &tcp(1, 2, TCP_ACK));
    assert!(ast.matches(&PacketRef::from_ip(&data)));
    let data = ipv6(src, dst, 64, IpNextHeaderProtocols::Tcp, &tcp(1, 2, TCP_SYN));
    assert!(!ast.matches(&PacketRef::from_ip(&data)));
    let data = ipv6(dst, src, 64, IpNextHeaderProtocols::Tcp, &tcp(1, 2, TCP_ACK));
    assert!(!ast.matches(&PacketRef::from_ip(&data)));
}

#[test]
fn ipv6_fragment_header_is_walked() {
    let src: Ipv6Addr = "2001:db8::1".parse().unwrap();
    let dst: Ipv6Addr = "2001:db8::2".parse().unwrap();
    let payload = ipv6_fragment(IpNextHeaderProtocols::Tcp, 0, true, &tcp(40000, 443, TCP_SYN));
    let data = ipv6(src, dst, 64, IpNextHeaderProtocols::Ipv6Frag, &payload);
    let packet = PacketRef::from_ip(&data);
    for expression in ["frag", "ip proto tcp", "tcp dst port 443", "tcp opt syn"] {
        assert!(compile(expression).unwrap().matches(&packet), "{}", expression);
    }
    assert!(!compile("unfrag").unwrap().matches(&packet));
}

#[test]
fn ethernet_frames() {
    let ast = compile("net 10.0.0.0/24 or not dst net 10.1.0.0/24").unwrap();
    let frame = ethernet(EtherTypes::Ipv4, &v4([10, 9, 9, 9], [10, 1, 0, 7], 64));
    let packet = PacketRef::from_ethernet(&frame).unwrap();
    assert!(!ast.matches(&packet));
    let frame = ethernet(EtherTypes::Ipv4, &v4([10, 0, 0, 9], [10, 1, 0, 7], 64));
    let packet = PacketRef::from_ethernet(&frame).unwrap();
    assert!(ast.matches(&packet));
    let frame = ethernet(EtherTypes::Arp, &[0u8; 28]);
    assert!(PacketRef::from_ethernet(&frame).is_none());
}

#[test]
fn filter_mode_from_config() {
    let config = ProgramConfig {
        expressions: vec!["udp port 53".into(), "tcp port 80".into()],
        mode: Mode::Filter {
            action: FilterAction::Gate,
        },
    };
    let set = ProgramSet::from_config(&config).unwrap();
    let dns = ipv4(
        Ipv4Addr::new(10, 0, 0, 1),
        Ipv4Addr::new(10, 0, 0, 53),
        64,
        IpNextHeaderProtocols::Udp,
        &udp(5353, 53),
    );
    let packet = PacketRef::from_ip(&dns);
    let verdicts = set.evaluate_all(&packet);
    assert_eq!(verdicts.len(), 2);
    assert!(verdicts[0].matched);
    assert!(!verdicts[1].matched);
    assert_eq!(set.process(&packet), Dispatch::Output(0));

    let ssh = ipv4(
        Ipv4Addr::new(10, 0, 0, 1),
        Ipv4Addr::new(10, 0, 0, 22),
        64,
        IpNextHeaderProtocols::Tcp,
        &tcp(50000, 22, TCP_SYN),
    );
    assert_eq!(set.process(&PacketRef::from_ip(&ssh)), Dispatch::Drop);
}

#[test]
fn error_positions() {
    assert_eq!(
        compile("src host 10.1.1.1 and ttl 5 and dscp 99").unwrap_err(),
        FilterError::ValueError {
            parameter: "99".into(),
            target: "integer in 0..=63".into(),
            pos: 37,
            e: "out of range".into(),
        }
    );
    assert_eq!(
        compile("(ttl 5").unwrap_err(),
        FilterError::UnbalancedParenthesis
    );
}
