//! Determinism and local consistency.

mod common;

use common::*;
use netverify_engine::CheckError;
use netverify_model::config::Network;
use netverify_model::{DiffType, Question, TieBreak};

#[test]
fn edge_order_tie_break_is_deterministic() -> TestResult {
    let answer = checker(&ospf_diamond()).compute_determinism(&Question::default())?;
    assert!(answer.result.verified);
    assert!(answer.flow.is_none());
    assert!(answer.case1.is_empty() && answer.case2.is_empty());
    Ok(())
}

#[test]
fn arbitrary_tie_break_splits_equal_cost_paths() -> TestResult {
    let q = Question {
        tie_break: TieBreak::Arbitrary,
        ..Question::default()
    };
    let answer = checker(&ospf_diamond()).compute_determinism(&q)?;
    assert!(!answer.result.verified);
    let flow = answer.flow.expect("counterexample flow");
    assert!(flow.dst_ip.starts_with("172.16.0."), "flow: {flow:?}");
    assert!(!answer.case1.is_empty());
    assert!(!answer.case2.is_empty());
    assert!(answer.case1.is_disjoint(&answer.case2));
    Ok(())
}

#[test]
fn comparisons_reject_a_diff_type() {
    let q = Question {
        diff_type: Some(DiffType::Increased),
        ..Question::default()
    };
    let checker = checker(&ospf_diamond());
    assert!(matches!(
        checker.compute_determinism(&q),
        Err(CheckError::UnsupportedOption { option: "diff type", .. })
    ));
    assert!(matches!(
        checker.compute_local_consistency(&q, ".*", false),
        Err(CheckError::UnsupportedOption { .. })
    ));
}

#[test]
fn a_single_router_has_nothing_to_compare() -> TestResult {
    let answer = checker(&ospf_star(2)).compute_local_consistency(&Question::default(), "h", false)?;
    assert!(answer.results.is_empty());
    assert!(answer.skipped.is_empty());
    Ok(())
}

#[test]
fn identical_leaves_are_locally_consistent() -> TestResult {
    let checker = checker(&ospf_star(2));
    for strict in [false, true] {
        let answer = checker.compute_local_consistency(&Question::default(), ".*", strict)?;
        assert_eq!(answer.results.keys().collect::<Vec<_>>(), vec!["l1<-->l2"]);
        assert!(answer.verified(), "strict={strict}: {:?}", answer.results);
        assert_eq!(answer.skipped.len(), 1);
        assert!(answer.skipped.contains_key("h<-->l1"));
    }
    Ok(())
}

#[test]
fn a_filter_breaks_forwarding_but_not_route_choice() -> TestResult {
    let mut network: Network = ospf_star(2);
    let l2 = network.routers.iter_mut().find(|r| r.name == "l2").expect("leaf");
    deny_outgoing(l2, "e0");
    let checker = checker(&network);
    let loose = checker.compute_local_consistency(&Question::default(), "l.*", false)?;
    assert!(!loose.results["l1<-->l2"].verified);
    let strict = checker.compute_local_consistency(&Question::default(), "l.*", true)?;
    assert!(strict.results["l1<-->l2"].verified);
    Ok(())
}
