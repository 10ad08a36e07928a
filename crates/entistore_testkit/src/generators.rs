//! Property-based test generators using proptest.
//!
//! Strategies produce plain descriptions (`HumanSpec`, `StoreOp`) rather than
//! handles, so failing cases shrink and print readably.

use crate::fixtures::{Human, Id};
use entistore_core::ObjectRef;
use proptest::prelude::*;

/// Description of a human to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HumanSpec {
    /// First name.
    pub first_name: String,
    /// Last name.
    pub last_name: String,
}

impl HumanSpec {
    /// Full name.
    pub fn name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Creates the described human.
    pub fn build(&self) -> ObjectRef {
        Human::create(&self.name(), &self.first_name, &self.first_name, &self.last_name)
    }
}

/// One mutation against a store of humans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    /// Put a fresh human under `id`.
    Put {
        /// Identity.
        id: Id,
        /// Human to create.
        human: HumanSpec,
    },
    /// Change the last name of the occupant of `id` and put it again.
    Rename {
        /// Identity.
        id: Id,
        /// New last name.
        last_name: String,
    },
    /// Remove the occupant of `id`.
    Remove {
        /// Identity.
        id: Id,
    },
}

/// Strategy for name parts. A small alphabet makes key collisions likely.
pub fn name_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec![
        "Tegnér", "Gustavsson", "Svensson", "Lind", "Berg", "Alice", "Robert", "Kalle",
    ])
    .prop_map(str::to_string)
}

/// Strategy for humans.
pub fn human_strategy() -> impl Strategy<Value = HumanSpec> {
    (name_strategy(), name_strategy()).prop_map(|(first_name, last_name)| HumanSpec {
        first_name,
        last_name,
    })
}

/// Strategy for identities drawn from a small pool so operations overlap.
pub fn identity_strategy() -> impl Strategy<Value = Id> {
    0i64..8
}

/// Strategy for store operations.
pub fn store_op_strategy() -> impl Strategy<Value = StoreOp> {
    prop_oneof![
        3 => (identity_strategy(), human_strategy()).prop_map(|(id, human)| StoreOp::Put { id, human }),
        2 => (identity_strategy(), name_strategy())
            .prop_map(|(id, last_name)| StoreOp::Rename { id, last_name }),
        2 => identity_strategy().prop_map(|id| StoreOp::Remove { id }),
    ]
}

/// Strategy for operation sequences.
pub fn store_ops_strategy(max_len: usize) -> impl Strategy<Value = Vec<StoreOp>> {
    prop::collection::vec(store_op_strategy(), 0..max_len)
}

/// Strategy for identifier instants in milliseconds, including negative
/// (pre-epoch) values.
pub fn instant_strategy() -> impl Strategy<Value = i64> {
    prop_oneof![
        any::<i64>(),
        -1_000_000i64..1_000_000,
        1_500_000_000_000i64..2_500_000_000_000,
    ]
}

/// Strategy for non-decreasing instant sequences.
pub fn monotonic_instants_strategy(max_len: usize) -> impl Strategy<Value = Vec<i64>> {
    (
        0i64..2_000_000_000_000,
        prop::collection::vec(0i64..3, 1..max_len),
    )
        .prop_map(|(start, steps)| {
            steps
                .into_iter()
                .scan(start, |instant, step| {
                    *instant += step;
                    Some(*instant)
                })
                .collect()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::strategy::ValueTree;
    use proptest::test_runner::TestRunner;

    #[test]
    fn monotonic_instants_never_decrease() {
        let mut runner = TestRunner::default();
        for _ in 0..32 {
            let instants = monotonic_instants_strategy(20)
                .new_tree(&mut runner)
                .unwrap()
                .current();
            assert!(instants.windows(2).all(|w| w[0] <= w[1]));
        }
    }

    #[test]
    fn human_spec_builds_a_human() {
        let spec = HumanSpec {
            first_name: "Alice".into(),
            last_name: "Tegnér".into(),
        };
        let human = spec.build();
        assert_eq!(Human::of(&human).name(), "Alice Tegnér");
        assert_eq!(Human::of(&human).last_name(), "Tegnér");
    }
}
