//! Property-based tests for encoding stability.
//!
//! The SMT script of a query must depend only on the network and the
//! question, never on the order routers were listed in or on hash seeds.

mod common;

use common::*;
use netverify_engine::encoder::Encoder;
use netverify_model::config::Network;
use netverify_model::{Graph, Question, TieBreak};
use proptest::prelude::*;

fn script(network: &Network, question: &Question) -> String {
    let graph = Graph::new(network).expect("graph");
    let mut encoder = Encoder::new(&graph, question).expect("encoder");
    if question.diff_type.is_some() {
        encoder.add_slice(&graph, 0).expect("second slice");
    }
    encoder.constraints().to_smt2_script()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn encoding_ignores_router_order(leaves in 1u8..5, rotate in 0usize..5, failures in 0u32..3) {
        let q = Question { failures, ..Question::default() };
        let network = ospf_star(leaves);
        let mut shuffled = network.clone();
        let len = shuffled.routers.len();
        shuffled.routers.rotate_left(rotate % len);
        prop_assert_eq!(script(&network, &q), script(&shuffled, &q));
    }

    #[test]
    fn encoding_is_repeatable(leaves in 1u8..5, arbitrary in any::<bool>()) {
        let q = Question {
            tie_break: if arbitrary { TieBreak::Arbitrary } else { TieBreak::EdgeOrder },
            diff_type: Some(netverify_model::DiffType::Any),
            ..Question::default()
        };
        let network = ospf_star(leaves);
        prop_assert_eq!(script(&network, &q), script(&network, &q));
    }
}

#[test]
fn slices_are_named_apart() {
    let q = Question {
        diff_type: Some(netverify_model::DiffType::Any),
        ..Question::default()
    };
    let smt = script(&ospf_chain(), &q);
    assert!(smt.contains("0_dst_ip"));
    assert!(smt.contains("1_dst_ip"));
}
