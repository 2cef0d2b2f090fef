//! Property-based tests for the review engine
//!
//! Random action sequences are replayed against every kind to check that
//! versions only move on accepted mutations and that terminal outcomes stick.

use proptest::prelude::*;
use rust_decimal::Decimal;
use std::sync::Arc;

use review_flow::storage::MemoryStore;
use review_flow::workflows::transition_table::{required_role, table_for};
use review_flow::workflows::types::{Action, Actor, Role, WorkItemKind};
use review_flow::workflows::{compute_financials, NewWorkItem, ReviewEngine};

fn kind_strategy() -> impl Strategy<Value = WorkItemKind> {
    prop_oneof![
        Just(WorkItemKind::SubmissionList),
        Just(WorkItemKind::ContentSubmission),
        Just(WorkItemKind::Invoice),
        Just(WorkItemKind::Quotation),
    ]
}

fn action_strategy() -> impl Strategy<Value = Action> {
    (0..Action::ALL.len()).prop_map(|index| Action::ALL[index])
}

fn actor_for(kind: WorkItemKind, action: Action) -> Actor {
    match required_role(kind, action) {
        Some(Role::Counterparty) => Actor::counterparty("reviewer-1"),
        _ => Actor::owner("owner-1"),
    }
}

proptest! {
    #[test]
    fn prop_version_counts_accepted_transitions(
        kind in kind_strategy(),
        actions in prop::collection::vec(action_strategy(), 1..25),
    ) {
        let result: Result<(), TestCaseError> = tokio_test::block_on(async {
            let engine = ReviewEngine::new(Arc::new(MemoryStore::new()));
            let item = engine
                .create(NewWorkItem::new(kind, "owner-1", "reviewer-1"))
                .await
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            let table = table_for(kind);

            let mut current = item;
            let mut accepted = 0u64;
            for action in actions {
                let was_terminal = table.is_terminal(current.state);
                let actor = actor_for(kind, action);
                let outcome = engine
                    .transition(&current.id, action, current.version, &actor)
                    .await;
                match outcome {
                    Ok(next) => {
                        prop_assert!(!was_terminal, "left terminal state {}", current.state);
                        prop_assert_eq!(next.version, current.version + 1);
                        prop_assert!(table.contains(next.state));
                        accepted += 1;
                        current = next;
                    }
                    Err(err) => {
                        prop_assert!(!err.is_retryable(), "unexpected conflict: {}", err);
                        let stored = engine
                            .get(&current.id)
                            .await
                            .map_err(|e| TestCaseError::fail(e.to_string()))?;
                        prop_assert_eq!(&stored, &current);
                    }
                }
            }

            prop_assert_eq!(current.version, 1 + accepted);
            prop_assert_eq!(current.history.len() as u64, accepted);
            prop_assert!(current.approved_at.is_none() || current.rejected_at.is_none());
            Ok::<(), TestCaseError>(())
        });
        result?;
    }

    #[test]
    fn prop_financials_are_idempotent(cents in 0i64..100_000_000, rate_bp in 0u32..3000, vat in any::<bool>()) {
        let price = Decimal::new(cents, 2);
        let rate = Decimal::new(rate_bp as i64, 4);
        let first = compute_financials(price, vat, rate);
        let again = compute_financials(first.price, first.vat_applicable, first.vat_rate);
        prop_assert_eq!(&first, &again);
        prop_assert_eq!(first.total, first.price + first.vat_amount);
        prop_assert!(first.vat_amount.scale() <= 2);
    }
}
