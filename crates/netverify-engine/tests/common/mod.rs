#![allow(dead_code)]

use netverify_engine::{z3_checker, CheckOptions, PropertyChecker};
use netverify_model::config::{Acl, AclLine, Interface, LineAction, Network, OspfConfig, RouterConfig, StaticRoute};
use netverify_model::Prefix;
use netverify_smt::backends::z3_backend::Z3Solver;

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

pub fn pfx(s: &str) -> Prefix {
    s.parse().unwrap_or_else(|e| panic!("bad prefix {s}: {e}"))
}

/// A router with plain interfaces and no routing protocol.
pub fn router(name: &str, ifaces: &[(&str, &str)]) -> RouterConfig {
    let mut config = RouterConfig::new(name);
    config.interfaces = ifaces.iter().map(|(n, p)| Interface::new(*n, pfx(p))).collect();
    config
}

/// A router running OSPF on every interface; `passive` interfaces are
/// advertised but form no adjacency.
pub fn ospf_router(name: &str, ifaces: &[(&str, &str)], passive: &[&str]) -> RouterConfig {
    let mut config = router(name, ifaces);
    config.ospf = Some(OspfConfig {
        interfaces: ifaces.iter().map(|(n, _)| n.to_string()).collect(),
        passive: passive.iter().map(|p| p.to_string()).collect(),
        ..OspfConfig::default()
    });
    config
}

pub fn add_static(config: &mut RouterConfig, prefix: &str, iface: &str) {
    config.static_routes.push(StaticRoute::via_interface(pfx(prefix), iface));
}

/// Drop everything leaving `iface`.
pub fn deny_outgoing(config: &mut RouterConfig, iface: &str) {
    config.acls.insert(
        "deny-all".into(),
        Acl {
            lines: vec![AclLine {
                action: LineAction::Deny,
                dst: None,
                src: None,
            }],
        },
    );
    if let Some(i) = config.interfaces.iter_mut().find(|i| i.name == iface) {
        i.outgoing_filter = Some("deny-all".into());
    }
}

/// `a --e0-- b`, plain interfaces; `a` also has a boundary `ext`.
pub fn static_pair() -> (RouterConfig, RouterConfig) {
    (
        router("a", &[("e0", "10.0.0.1/24"), ("ext", "192.0.2.1/24")]),
        router("b", &[("e0", "10.0.0.2/24")]),
    )
}

/// OSPF chain `a -- b -- c`; `a` owns the passive boundary `ext`.
pub fn ospf_chain() -> Network {
    Network::new(vec![
        ospf_router("a", &[("e0", "10.0.1.1/24"), ("ext", "192.0.2.1/24")], &["ext"]),
        ospf_router("b", &[("e0", "10.0.1.2/24"), ("e1", "10.0.2.1/24")], &[]),
        ospf_router("c", &[("e1", "10.0.2.2/24")], &[]),
    ])
}

/// OSPF diamond: `s` reaches `d`'s passive `lan` over `m1` or `m2` at equal
/// cost.
pub fn ospf_diamond() -> Network {
    Network::new(vec![
        ospf_router("s", &[("e1", "10.0.1.1/24"), ("e2", "10.0.2.1/24")], &[]),
        ospf_router("m1", &[("e0", "10.0.1.2/24"), ("e1", "10.0.3.1/24")], &[]),
        ospf_router("m2", &[("e0", "10.0.2.2/24"), ("e1", "10.0.4.1/24")], &[]),
        ospf_router(
            "d",
            &[("e1", "10.0.3.2/24"), ("e2", "10.0.4.2/24"), ("lan", "172.16.0.1/24")],
            &["lan"],
        ),
    ])
}

/// OSPF hub `h` with leaves `l1..=leaves`, each leaf using interface `e0`.
/// `h` owns the passive boundary `ext`.
pub fn ospf_star(leaves: u8) -> Network {
    let mut hub_ifaces: Vec<(String, String)> = vec![("ext".into(), "192.0.2.1/24".into())];
    let mut routers = Vec::new();
    for i in 1..=leaves {
        hub_ifaces.push((format!("e{i}"), format!("10.0.{i}.1/24")));
        let addr = format!("10.0.{i}.2/24");
        routers.push(ospf_router(&format!("l{i}"), &[("e0", addr.as_str())], &[]));
    }
    let hub: Vec<(&str, &str)> = hub_ifaces.iter().map(|(n, p)| (n.as_str(), p.as_str())).collect();
    routers.push(ospf_router("h", &hub, &["ext"]));
    Network::new(routers)
}

pub fn checker(network: &Network) -> PropertyChecker<impl Fn() -> Z3Solver + Sync> {
    checker_with(network, CheckOptions::default())
}

pub fn checker_with(network: &Network, options: CheckOptions) -> PropertyChecker<impl Fn() -> Z3Solver + Sync> {
    z3_checker(network, options).unwrap_or_else(|e| panic!("checker: {e}"))
}
