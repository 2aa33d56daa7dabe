//! Black holes, routing loops, multipath consistency and load balance.

mod common;

use common::*;
use netverify_model::config::Network;
use netverify_model::Question;

#[test]
fn static_route_into_a_dead_end_is_a_black_hole() -> TestResult {
    let (mut a, b) = static_pair();
    let clean = Network::new(vec![a.clone(), b.clone()]);
    assert!(checker(&clean).compute_black_hole(&Question::default())?.result.verified);

    add_static(&mut a, "10.9.0.0/24", "e0");
    let answer = checker(&Network::new(vec![a, b])).compute_black_hole(&Question::default())?;
    assert!(!answer.result.verified);
    assert!(answer.result.packet_model["dst_ip"].starts_with("10.9.0."));
    assert!(answer.result.fwd_model.iter().any(|e| e.starts_with("a,e0 --> b,e0")));
    Ok(())
}

#[test]
fn filter_behind_a_static_route_is_a_black_hole() -> TestResult {
    let mut a = router("a", &[("e0", "10.0.1.1/24")]);
    let mut b = router("b", &[("e0", "10.0.1.2/24"), ("e1", "10.0.2.1/24")]);
    let c = router("c", &[("e1", "10.0.2.2/24")]);
    add_static(&mut a, "10.9.0.0/24", "e0");
    add_static(&mut b, "10.9.0.0/24", "e1");
    let open = Network::new(vec![a.clone(), b.clone(), c.clone()]);
    let answer = checker(&open).compute_black_hole(&Question::default())?;
    assert!(!answer.result.verified, "c drops what b hands over");

    deny_outgoing(&mut b, "e1");
    let answer = checker(&Network::new(vec![a, b, c])).compute_black_hole(&Question::default())?;
    assert!(!answer.result.verified);
    assert!(answer.result.packet_model["dst_ip"].starts_with("10.9.0."));
    assert!(answer.result.fwd_model.iter().any(|e| e.starts_with("a,e0 --> b,e0")));
    assert!(!answer.result.fwd_model.iter().any(|e| e.starts_with("b,e1")));
    Ok(())
}

#[test]
fn bounded_length_follows_the_chosen_route_past_a_filter() -> TestResult {
    let q = Question::between("a", "ext", "c");
    let clean = checker(&ospf_chain());
    assert!(clean.compute_bounded_length(&q, 2)?.result.verified);
    assert!(!clean.compute_bounded_length(&q, 1)?.result.verified);

    let mut network = ospf_chain();
    let c = network.routers.iter_mut().find(|r| r.name == "c").expect("router c");
    deny_outgoing(c, "e1");
    let filtered = checker(&network);
    assert!(!filtered.compute_bounded_length(&q, 0)?.result.verified);
    assert!(filtered.compute_bounded_length(&q, 2)?.result.verified);
    Ok(())
}

#[test]
fn mutual_static_routes_loop() -> TestResult {
    let (mut a, mut b) = static_pair();
    add_static(&mut a, "10.9.0.0/24", "e0");
    let one_way = Network::new(vec![a.clone(), b.clone()]);
    assert!(checker(&one_way).compute_routing_loop(&Question::default())?.result.verified);

    add_static(&mut b, "10.9.0.0/24", "e0");
    let answer = checker(&Network::new(vec![a, b])).compute_routing_loop(&Question::default())?;
    assert!(!answer.result.verified);
    assert!(answer.result.packet_model["dst_ip"].starts_with("10.9.0."));
    Ok(())
}

#[test]
fn network_without_static_routes_has_no_loop() -> TestResult {
    let answer = checker(&ospf_chain()).compute_routing_loop(&Question::default())?;
    assert!(answer.result.verified);
    Ok(())
}

#[test]
fn single_paths_are_multipath_consistent() -> TestResult {
    let answer =
        checker(&ospf_chain()).compute_multipath_consistency(&Question::between("a", "ext", ".*"))?;
    assert!(answer.result.verified);
    Ok(())
}

#[test]
fn chain_load_differs_by_one() -> TestResult {
    let checker = checker(&ospf_chain());
    let q = Question::between("a", "ext", "b|c");
    let tight = checker.compute_load_balance(&q, 0)?;
    assert_eq!(tight.results.len(), 1);
    assert!(!tight.results["a,ext"].verified);
    let loose = checker.compute_load_balance(&q, 1)?;
    assert!(loose.verified());
    assert!(loose.skipped.is_empty());
    Ok(())
}

#[test]
fn forwarding_finds_a_stable_state() -> TestResult {
    let q = Question {
        full_model: true,
        ..Question::default()
    };
    let answer = checker(&ospf_diamond()).compute_forwarding(&q)?;
    assert!(!answer.result.verified);
    let full = answer.result.full_model.expect("full model requested");
    assert!(full.contains_key("0_dst_ip"));
    Ok(())
}
