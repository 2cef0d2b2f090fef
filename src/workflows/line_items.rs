// Line-item editing for work items in an editable state, plus the invoice
// VAT arithmetic.

use chrono::Utc;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

use super::concurrency::check_version;
use super::engine::{authorize_owner, ReviewEngine};
use super::errors::WorkflowError;
use super::transition_table::is_editable;
use super::types::{Actor, FinancialLine, LineItem, LineItemDetails, LineItemId, WorkItem, WorkItemId, WorkItemKind};

/// Caller-supplied line item content. Derived fields (ids, VAT amounts,
/// totals) are filled in by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItemInput {
    pub reference_id: String,
    #[serde(default)]
    pub notes: Option<String>,
    pub details: LineItemDraft,
}

impl LineItemInput {
    pub fn new(reference_id: impl Into<String>, details: LineItemDraft) -> Self {
        Self {
            reference_id: reference_id.into(),
            notes: None,
            details,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LineItemDraft {
    Roster {
        #[serde(default)]
        price: Option<Decimal>,
    },
    Asset {
        content_url: String,
        #[serde(default)]
        metrics: BTreeMap<String, u64>,
    },
    Financial {
        price: Decimal,
        #[serde(default = "vat_applies")]
        vat_applicable: bool,
        /// Falls back to the configured default rate
        #[serde(default)]
        vat_rate: Option<Decimal>,
    },
}

fn vat_applies() -> bool {
    true
}

/// Rounds to cents, halves away from zero
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Derives VAT amount and total from a price and rate
pub fn compute_financials(price: Decimal, vat_applicable: bool, vat_rate: Decimal) -> FinancialLine {
    let vat_amount = if vat_applicable {
        round2(price * vat_rate)
    } else {
        Decimal::ZERO
    };
    FinancialLine {
        price,
        vat_applicable,
        vat_rate,
        vat_amount,
        total: price + vat_amount,
    }
}

/// Validates `input` against `kind` and produces the stored line item.
///
/// `id` is kept when replacing an existing line item; a fresh one is
/// generated otherwise.
pub fn build_line_item(
    kind: WorkItemKind,
    input: LineItemInput,
    id: Option<LineItemId>,
    default_vat_rate: Decimal,
) -> Result<LineItem, WorkflowError> {
    let reference_id = input.reference_id.trim().to_string();
    if reference_id.is_empty() {
        return Err(WorkflowError::validation("line item reference_id must not be empty"));
    }

    let details = match (kind, input.details) {
        (WorkItemKind::SubmissionList | WorkItemKind::Quotation, LineItemDraft::Roster { price }) => {
            if let Some(price) = price {
                ensure_non_negative("price", price)?;
            }
            LineItemDetails::Roster { price }
        }
        (WorkItemKind::ContentSubmission, LineItemDraft::Asset { content_url, metrics }) => {
            let content_url = content_url.trim().to_string();
            if content_url.is_empty() {
                return Err(WorkflowError::validation("content_url must not be empty"));
            }
            LineItemDetails::Asset { content_url, metrics }
        }
        (
            WorkItemKind::Invoice,
            LineItemDraft::Financial {
                price,
                vat_applicable,
                vat_rate,
            },
        ) => {
            let vat_rate = vat_rate.unwrap_or(default_vat_rate);
            ensure_non_negative("price", price)?;
            ensure_non_negative("vat_rate", vat_rate)?;
            LineItemDetails::Financial(compute_financials(price, vat_applicable, vat_rate))
        }
        (kind, draft) => {
            return Err(WorkflowError::validation(format!(
                "{} line items are not accepted by a {kind}",
                draft.type_name()
            )));
        }
    };

    Ok(LineItem {
        id: id.unwrap_or_else(LineItemId::generate),
        reference_id,
        notes: input.notes.filter(|notes| !notes.trim().is_empty()),
        details,
    })
}

impl LineItemDraft {
    fn type_name(&self) -> &'static str {
        match self {
            LineItemDraft::Roster { .. } => "roster",
            LineItemDraft::Asset { .. } => "asset",
            LineItemDraft::Financial { .. } => "financial",
        }
    }
}

fn ensure_non_negative(field: &str, value: Decimal) -> Result<(), WorkflowError> {
    if value < Decimal::ZERO {
        return Err(WorkflowError::validation(format!("{field} must not be negative, got {value}")));
    }
    Ok(())
}

impl ReviewEngine {
    pub async fn add_line_item(
        &self,
        id: &WorkItemId,
        input: LineItemInput,
        expected_version: u64,
        actor: &Actor,
    ) -> Result<WorkItem, WorkflowError> {
        self.edit_line_items(id, expected_version, actor, "add_line_item", |item, rate| {
            let line = build_line_item(item.kind, input, None, rate)?;
            info!(work_item.id = %item.id, line_item.id = %line.id, "Adding line item");
            item.line_items.push(line);
            Ok(())
        })
        .await
    }

    /// Replaces the content of an existing line item, keeping its id and position
    pub async fn update_line_item(
        &self,
        id: &WorkItemId,
        line_item_id: &LineItemId,
        input: LineItemInput,
        expected_version: u64,
        actor: &Actor,
    ) -> Result<WorkItem, WorkflowError> {
        self.edit_line_items(id, expected_version, actor, "update_line_item", |item, rate| {
            let position = find_line(item, line_item_id)?;
            let line = build_line_item(item.kind, input, Some(line_item_id.clone()), rate)?;
            info!(work_item.id = %item.id, line_item.id = %line.id, "Updating line item");
            item.line_items[position] = line;
            Ok(())
        })
        .await
    }

    pub async fn remove_line_item(
        &self,
        id: &WorkItemId,
        line_item_id: &LineItemId,
        expected_version: u64,
        actor: &Actor,
    ) -> Result<WorkItem, WorkflowError> {
        self.edit_line_items(id, expected_version, actor, "remove_line_item", |item, _| {
            let position = find_line(item, line_item_id)?;
            item.line_items.remove(position);
            info!(work_item.id = %item.id, line_item.id = %line_item_id, "Removed line item");
            Ok(())
        })
        .await
    }

    // Shared guard for every line-item edit: owner only, version check,
    // editable state, then exactly one version bump.
    async fn edit_line_items<F>(
        &self,
        id: &WorkItemId,
        expected_version: u64,
        actor: &Actor,
        operation: &str,
        edit: F,
    ) -> Result<WorkItem, WorkflowError>
    where
        F: FnOnce(&mut WorkItem, Decimal) -> Result<(), WorkflowError>,
    {
        let current = self.get(id).await?;
        authorize_owner(&current, actor, operation)?;
        check_version(&current, expected_version)?;
        if !is_editable(current.kind, current.state) {
            return Err(WorkflowError::NotEditable {
                kind: current.kind,
                state: current.state,
                version: current.version,
            });
        }

        let mut next = current;
        edit(&mut next, self.settings.default_vat_rate)?;
        next.version = expected_version + 1;
        next.updated_at = Utc::now();
        self.commit(expected_version, next).await
    }
}

fn find_line(item: &WorkItem, line_item_id: &LineItemId) -> Result<usize, WorkflowError> {
    item.line_items
        .iter()
        .position(|line| &line.id == line_item_id)
        .ok_or_else(|| WorkflowError::LineItemNotFound {
            work_item_id: item.id.clone(),
            line_item_id: line_item_id.clone(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::workflows::engine::NewWorkItem;
    use crate::workflows::types::{Action, State};
    use std::str::FromStr;
    use std::sync::Arc;

    fn dec(value: &str) -> Decimal {
        Decimal::from_str(value).unwrap()
    }

    fn financial(price: &str, rate: Option<&str>) -> LineItemInput {
        LineItemInput::new(
            "creator-1",
            LineItemDraft::Financial {
                price: dec(price),
                vat_applicable: true,
                vat_rate: rate.map(dec),
            },
        )
    }

    #[test]
    fn test_vat_rounds_half_away_from_zero() {
        let line = compute_financials(dec("0.50"), true, dec("0.07"));
        // 0.035 rounds up to 0.04
        assert_eq!(line.vat_amount, dec("0.04"));
        assert_eq!(line.total, dec("0.54"));

        let line = compute_financials(dec("1000"), false, dec("0.07"));
        assert_eq!(line.vat_amount, Decimal::ZERO);
        assert_eq!(line.total, dec("1000"));
    }

    #[test]
    fn test_financials_are_idempotent() {
        for price in ["0.01", "19.99", "333.33", "1234.565", "100000"] {
            let first = compute_financials(dec(price), true, dec("0.07"));
            let again = compute_financials(first.price, first.vat_applicable, first.vat_rate);
            assert_eq!(first, again);
        }
    }

    #[test]
    fn test_default_rate_applies_when_missing() {
        let line = build_line_item(WorkItemKind::Invoice, financial("100", None), None, dec("0.07")).unwrap();
        let LineItemDetails::Financial(financials) = line.details else {
            panic!("expected financial details");
        };
        assert_eq!(financials.vat_rate, dec("0.07"));
        assert_eq!(financials.vat_amount, dec("7.00"));
        assert_eq!(financials.total, dec("107.00"));
    }

    #[test]
    fn test_validation_rejects_bad_input() {
        let rate = dec("0.07");
        let negative = build_line_item(WorkItemKind::Invoice, financial("-1", None), None, rate);
        assert!(matches!(negative, Err(WorkflowError::Validation { .. })));

        let negative_rate = build_line_item(WorkItemKind::Invoice, financial("1", Some("-0.1")), None, rate);
        assert!(matches!(negative_rate, Err(WorkflowError::Validation { .. })));

        let wrong_kind = build_line_item(WorkItemKind::SubmissionList, financial("1", None), None, rate);
        assert!(matches!(wrong_kind, Err(WorkflowError::Validation { .. })));

        let blank = LineItemInput::new("  ", LineItemDraft::Roster { price: None });
        assert!(matches!(
            build_line_item(WorkItemKind::Quotation, blank, None, rate),
            Err(WorkflowError::Validation { .. })
        ));
    }

    async fn draft_invoice(engine: &ReviewEngine) -> WorkItem {
        engine
            .create(NewWorkItem::new(WorkItemKind::Invoice, "creator-1", "agency"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_each_edit_bumps_version_once() {
        let engine = ReviewEngine::new(Arc::new(MemoryStore::new()));
        let owner = Actor::owner("creator-1");
        let invoice = draft_invoice(&engine).await;

        let added = engine
            .add_line_item(&invoice.id, financial("200", Some("0.07")), 1, &owner)
            .await
            .unwrap();
        assert_eq!(added.version, 2);
        let line_id = added.line_items[0].id.clone();

        let updated = engine
            .update_line_item(&invoice.id, &line_id, financial("300", Some("0.07")), 2, &owner)
            .await
            .unwrap();
        assert_eq!(updated.version, 3);
        assert_eq!(updated.line_items[0].id, line_id);
        assert!(matches!(
            &updated.line_items[0].details,
            LineItemDetails::Financial(line) if line.total == dec("321.00")
        ));

        let removed = engine.remove_line_item(&invoice.id, &line_id, 3, &owner).await.unwrap();
        assert_eq!(removed.version, 4);
        assert!(removed.line_items.is_empty());
    }

    #[tokio::test]
    async fn test_edits_outside_editable_states_are_rejected() {
        let engine = ReviewEngine::new(Arc::new(MemoryStore::new()));
        let owner = Actor::owner("creator-1");
        let invoice = draft_invoice(&engine).await;
        let sent = engine.transition(&invoice.id, Action::Send, 1, &owner).await.unwrap();
        assert_eq!(sent.state, State::Sent);

        let err = engine
            .add_line_item(&invoice.id, financial("10", None), sent.version, &owner)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::NotEditable { state: State::Sent, version: 2, .. }));
        assert_eq!(engine.get(&invoice.id).await.unwrap(), sent);
    }

    #[tokio::test]
    async fn test_unknown_line_item_and_wrong_role() {
        let engine = ReviewEngine::new(Arc::new(MemoryStore::new()));
        let invoice = draft_invoice(&engine).await;

        let err = engine
            .remove_line_item(&invoice.id, &LineItemId::from("nope"), 1, &Actor::owner("creator-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::LineItemNotFound { .. }));

        let err = engine
            .add_line_item(&invoice.id, financial("10", None), 1, &Actor::counterparty("agency"))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Forbidden { .. }));

        let err = engine
            .add_line_item(&invoice.id, financial("10", None), 7, &Actor::owner("creator-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::StaleVersion { expected: 7, current: 1, .. }));
        assert_eq!(engine.get(&invoice.id).await.unwrap().version, 1);
    }
}
