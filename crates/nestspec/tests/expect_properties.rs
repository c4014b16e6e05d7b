use std::collections::BTreeMap;

use nestspec::Expectation;
use proptest::prelude::*;

#[derive(Debug, Clone, PartialEq)]
struct Row {
    id: u32,
    label: String,
    amounts: Vec<i64>,
    tags: BTreeMap<String, bool>,
}

fn row() -> impl Strategy<Value = Row> {
    (
        any::<u32>(),
        "[a-z]{0,8}",
        prop::collection::vec(any::<i64>(), 0..5),
        prop::collection::btree_map("[a-z]{1,4}", any::<bool>(), 0..3),
    )
        .prop_map(|(id, label, amounts, tags)| Row {
            id,
            label,
            amounts,
            tags,
        })
}

proptest! {
    #[test]
    fn prop_to_equal_is_reflexive(rows in prop::collection::vec(row(), 0..6)) {
        prop_assert!(Expectation::new(rows.clone()).to_equal(rows.clone()).is_ok());
        prop_assert!(Expectation::new(rows.clone()).not().to_equal(rows).is_err());
    }

    #[test]
    fn prop_to_equal_detects_a_changed_id(
        rows in prop::collection::vec(row(), 1..6),
        index in any::<prop::sample::Index>(),
        delta in 1u32..,
    ) {
        let mut changed = rows.clone();
        let i = index.index(changed.len());
        changed[i].id = changed[i].id.wrapping_add(delta);

        let failure = Expectation::new(changed).to_equal(rows).unwrap_err();
        prop_assert!(failure.message().starts_with("Expected "));
        prop_assert!(failure.message().contains("\n- "));
        prop_assert!(failure.message().contains("\n+ "));
    }

    #[test]
    fn prop_to_equal_detects_a_changed_leaf_deep_inside(
        rows in prop::collection::vec(row(), 1..6),
        index in any::<prop::sample::Index>(),
        extra in any::<i64>(),
    ) {
        let mut changed = rows.clone();
        let i = index.index(changed.len());
        changed[i].amounts.push(extra);

        prop_assert!(Expectation::new(changed.clone()).to_equal(rows.clone()).is_err());
        prop_assert!(Expectation::new(changed).not().to_equal(rows).is_ok());
    }
}
