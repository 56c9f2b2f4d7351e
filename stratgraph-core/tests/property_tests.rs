//! Property tests for graph-model invariants.
//!
//! Uses proptest to verify:
//! 1. Preview rendering is pure and drops incomplete leaves without failing
//! 2. Trailing variables are exactly the image of enabled trailing configs
//! 3. VPI uniqueness holds across any sequence of position adds
//! 4. A re-entry-signal node has 0 or 1 outgoing edges after any target sequence
//! 5. Clipboard paste is idempotent
//! 6. Edits inside a quiet period coalesce into one flush
//! 7. History length never exceeds its cap

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use proptest::prelude::*;
use stratgraph_core::ast::{
    group_condition_to_string, is_sentinel, ComparisonOperator, Condition, ConditionNode,
    Expression, GroupCondition, GroupLogic, MathOperator, PriceField, RenderContext,
};
use stratgraph_core::debounce::{EditDebouncer, EditKind};
use stratgraph_core::domain::{
    ConditionId, GlobalVariable, GlobalVariableUpdate, IndicatorDefinition, NodeId,
    OptionDetails, OptionType, Position, TrailingConfig, VariableId,
};
use stratgraph_core::graph::{GraphStore, Node, NodeData, NodeKind, NodePatch, Point};
use stratgraph_core::reentry::select_target;
use stratgraph_core::variables::{derive_trailing_variables, AssignmentClipboard};

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_leaf_expression() -> impl Strategy<Value = Expression> {
    prop_oneof![
        (-1000.0..1000.0_f64).prop_map(Expression::constant),
        prop::sample::select(vec!["rsi-1", "ema-1", "", "unknown"])
            .prop_map(|id| Expression::indicator(id)),
        prop::sample::select(vec![PriceField::Open, PriceField::Close, PriceField::Volume])
            .prop_map(Expression::market),
        Just(Expression::global("gv-1", "count")),
    ]
}

fn arb_expression() -> impl Strategy<Value = Expression> {
    arb_leaf_expression().prop_recursive(3, 16, 2, |inner| {
        (
            prop::sample::select(vec![MathOperator::Add, MathOperator::Max, MathOperator::Divide]),
            inner.clone(),
            inner,
        )
            .prop_map(|(op, l, r)| Expression::math(op, l, r))
    })
}

fn arb_operator() -> impl Strategy<Value = ComparisonOperator> {
    prop::sample::select(vec![
        ComparisonOperator::GreaterThan,
        ComparisonOperator::LessThanOrEqual,
        ComparisonOperator::CrossesAbove,
    ])
}

fn arb_logic() -> impl Strategy<Value = GroupLogic> {
    prop_oneof![Just(GroupLogic::And), Just(GroupLogic::Or)]
}

fn arb_group() -> impl Strategy<Value = GroupCondition> {
    let leaf = (arb_expression(), arb_operator(), arb_expression())
        .prop_map(|(l, op, r)| ConditionNode::Leaf(Condition::new(l, op, r)));
    let node = leaf.prop_recursive(3, 24, 4, |inner| {
        (arb_logic(), prop::collection::vec(inner, 0..4))
            .prop_map(|(logic, children)| ConditionNode::Group(GroupCondition::with(logic, children)))
    });
    (arb_logic(), prop::collection::vec(node, 0..5))
        .prop_map(|(logic, children)| GroupCondition::with(logic, children))
}

fn render_ctx() -> RenderContext {
    RenderContext::from_indicators(&[
        IndicatorDefinition::new("rsi-1", "RSI", &[("period", 14.0)]),
        IndicatorDefinition::new("ema-1", "EMA", &[("period", 20.0)]),
    ])
}

// ── 1. Preview purity ────────────────────────────────────────────────

proptest! {
    #[test]
    fn preview_is_pure_and_sentinel_free(tree in arb_group()) {
        let ctx = render_ctx();
        let first = group_condition_to_string(&tree, &ctx);
        let second = group_condition_to_string(&tree, &ctx);
        prop_assert_eq!(&first, &second);
        prop_assert!(!is_sentinel(&first), "sentinel leaked: {}", first);
    }

    #[test]
    fn incomplete_leaf_is_excluded(tree in arb_group()) {
        let ctx = render_ctx();
        let mut with_bad = tree.clone();
        with_bad.push_leaf(Condition {
            id: ConditionId::new("half"),
            lhs: None,
            operator: ComparisonOperator::Equal,
            rhs: Some(Expression::constant(1.0)),
        });
        prop_assert_eq!(
            group_condition_to_string(&with_bad, &ctx),
            group_condition_to_string(&tree, &ctx)
        );
    }
}

// ── 2. Trailing derivation ───────────────────────────────────────────

proptest! {
    #[test]
    fn trailing_variables_match_enabled_configs(flags in prop::collection::vec((any::<bool>(), any::<bool>()), 0..8)) {
        let positions: Vec<Position> = flags
            .iter()
            .enumerate()
            .map(|(i, (enabled, option))| {
                let mut pos = Position::new(format!("p{i}"), NodeId::new("e1"));
                pos.trailing_config = Some(TrailingConfig { enabled: *enabled, ..TrailingConfig::default() });
                if *option {
                    pos.option_details = Some(OptionDetails {
                        expiry: "current-week".into(),
                        strike_type: "ATM".into(),
                        option_type: OptionType::Put,
                    });
                }
                pos
            })
            .collect();

        let mut expected = BTreeSet::new();
        for pos in &positions {
            if pos.active_trailing().is_some() {
                expected.insert(format!("Trailing_{}_Position", pos.vpi));
                if pos.is_option() {
                    expected.insert(format!("Trailing_{}_Underlying", pos.vpi));
                }
            }
        }

        let derived = derive_trailing_variables(&positions, &[]);
        let names: BTreeSet<String> = derived.iter().map(|v| v.name.clone()).collect();
        prop_assert_eq!(names, expected);
        prop_assert_eq!(derived.len(), derived.iter().map(|v| &v.id).collect::<BTreeSet<_>>().len());

        // Re-deriving keeps every id.
        let again = derive_trailing_variables(&positions, &derived);
        prop_assert_eq!(again, derived);
    }
}

// ── 3. VPI uniqueness ────────────────────────────────────────────────

proptest! {
    #[test]
    fn vpis_stay_unique(ops in prop::collection::vec((0usize..3, 0usize..4), 1..20)) {
        let mut store = GraphStore::new();
        store.load(
            (0..3).map(|i| Node::with_id(format!("e{i}"), NodeKind::Entry, Point::default())).collect(),
            Vec::new(),
            Vec::new(),
        );

        for (step, (node, vpi)) in ops.into_iter().enumerate() {
            let node_id = NodeId::new(format!("e{node}"));
            let vpi = format!("p{vpi}");
            let taken = store.vpi_in_use(&vpi, None);
            let before = store.state_hash();
            let result = store.add_position(&node_id, Position::new(vpi, node_id.clone()), step as i64);
            if taken {
                prop_assert!(result.is_err());
                prop_assert_eq!(store.state_hash(), before);
            } else {
                prop_assert!(result.is_ok());
            }
        }

        let all: Vec<&str> = store.nodes().iter().flat_map(|n| n.data.positions()).map(|p| p.vpi.as_str()).collect();
        let unique: BTreeSet<&str> = all.iter().copied().collect();
        prop_assert_eq!(all.len(), unique.len());
    }
}

// ── 4. Re-entry single edge ──────────────────────────────────────────

fn reentry_store() -> GraphStore {
    let mut nodes: Vec<Node> = (0..3u32)
        .map(|i| {
            let mut node = Node::with_id(format!("e{i}"), NodeKind::Entry, Point::default());
            if let NodeData::Entry(d) = &mut node.data {
                let mut pos = Position::new(format!("p{i}"), node.id.clone());
                pos.max_entries = i + 2;
                d.positions.push(pos);
            }
            node
        })
        .collect();
    nodes.push(Node::with_id("r", NodeKind::ReEntrySignal, Point::default()));
    let mut store = GraphStore::new();
    store.load(nodes, Vec::new(), Vec::new());
    store
}

proptest! {
    #[test]
    fn re_entry_keeps_at_most_one_edge(targets in prop::collection::vec(prop::option::of(0u32..3), 1..12)) {
        let mut store = reentry_store();
        let r = NodeId::new("r");
        for (step, target) in targets.into_iter().enumerate() {
            let target_id = target.map(|i| NodeId::new(format!("e{i}")));
            select_target(&mut store, &r, target_id.as_ref(), step as i64).unwrap();

            let outgoing: Vec<_> = store.edges().iter().filter(|e| e.source == r).collect();
            prop_assert_eq!(outgoing.len(), usize::from(target.is_some()));
            let NodeData::ReEntrySignal(d) = &store.node(&r).unwrap().data else {
                panic!("re-entry node changed kind");
            };
            prop_assert_eq!(&d.target_entry_node_id, &target_id);
            prop_assert_eq!(d.retry_config.max_entries, target.map_or(1, |i| i + 2));
            if let Some(id) = &target_id {
                prop_assert_eq!(&outgoing[0].target, id);
            }
        }
    }
}

// ── 5. Clipboard idempotence ─────────────────────────────────────────

proptest! {
    #[test]
    fn paste_twice_equals_paste_once(picks in prop::collection::vec(0usize..5, 0..8)) {
        let globals: Vec<GlobalVariable> = (0..5).map(|i| GlobalVariable::new(format!("g{i}"))).collect();
        let copied: Vec<GlobalVariableUpdate> = picks
            .iter()
            .map(|&i| GlobalVariableUpdate {
                id: VariableId::generate(),
                global_variable_id: globals[i].id.clone(),
                global_variable_name: globals[i].name.clone(),
                expression: Expression::constant(i as f64),
            })
            .collect();
        let mut clipboard = AssignmentClipboard::new();
        clipboard.copy(&copied);

        let mut target = Vec::new();
        clipboard.paste_into(&mut target, &globals);
        let once: BTreeSet<_> = target.iter().map(|u| u.global_variable_id.clone()).collect();
        prop_assert_eq!(once.len(), target.len());

        let report = clipboard.paste_into(&mut target, &globals);
        prop_assert_eq!(report.pasted, 0);
        let twice: BTreeSet<_> = target.iter().map(|u| u.global_variable_id.clone()).collect();
        prop_assert_eq!(once, twice);
    }
}

// ── 6. Debounce coalescing ───────────────────────────────────────────

proptest! {
    #[test]
    fn quiet_period_edits_coalesce(gaps in prop::collection::vec(0u64..299, 1..10)) {
        let t0 = Instant::now();
        let mut deb = EditDebouncer::default();
        let id = NodeId::new("n");
        let mut now = t0;
        let mut last = String::new();
        for (i, gap) in gaps.iter().enumerate() {
            now += Duration::from_millis(*gap);
            last = format!("label-{i}");
            deb.push(id.clone(), EditKind::Label, NodePatch::SetLabel(last.clone()), now);
            prop_assert!(deb.due(now).is_empty());
        }
        let batches = deb.due(now + Duration::from_millis(300));
        prop_assert_eq!(batches.len(), 1);
        prop_assert_eq!(&batches[0].patches, &vec![NodePatch::SetLabel(last)]);
    }
}

// ── 7. History cap ───────────────────────────────────────────────────

proptest! {
    #[test]
    fn history_never_exceeds_limit(limit in 1usize..10, edits in 0usize..30) {
        let mut store = GraphStore::with_history_limit(limit);
        store.load(vec![Node::with_id("s", NodeKind::Signal, Point::default())], Vec::new(), Vec::new());
        for i in 0..edits {
            store.update_node(&"s".into(), NodePatch::SetLabel(format!("l{i}")), i as i64).unwrap();
            prop_assert!(store.history().len() <= limit);
        }
    }
}
