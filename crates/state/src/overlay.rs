use cashpilot_core::Transaction;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Category and tag changes for an existing transaction. `None` leaves the field alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionPatch {
    pub category: Option<String>,
    pub tags: Option<BTreeSet<String>>,
}

impl TransactionPatch {
    pub fn category(category: impl Into<String>) -> Self {
        TransactionPatch {
            category: Some(category.into()),
            tags: None,
        }
    }

    pub fn apply_to(&self, tx: &mut Transaction) {
        if let Some(category) = &self.category {
            tx.category = category.clone();
        }
        if let Some(tags) = &self.tags {
            tx.tags = tags.clone();
        }
    }

    fn is_reflected_in(&self, tx: &Transaction) -> bool {
        self.category.as_ref().map_or(true, |c| *c == tx.category)
            && self.tags.as_ref().map_or(true, |t| *t == tx.tags)
    }
}

/// A not-yet-confirmed edit, serialized as `{op, target, payload}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PendingEdit {
    Create { target: String, payload: Transaction },
    Update { target: String, payload: TransactionPatch },
    Delete { target: String },
}

impl PendingEdit {
    pub fn create(tx: Transaction) -> Self {
        PendingEdit::Create {
            target: tx.id.clone(),
            payload: tx,
        }
    }

    pub fn update(target: impl Into<String>, patch: TransactionPatch) -> Self {
        PendingEdit::Update {
            target: target.into(),
            payload: patch,
        }
    }

    pub fn delete(target: impl Into<String>) -> Self {
        PendingEdit::Delete { target: target.into() }
    }

    pub fn target(&self) -> &str {
        match self {
            PendingEdit::Create { target, .. }
            | PendingEdit::Update { target, .. }
            | PendingEdit::Delete { target } => target,
        }
    }

    fn apply(&self, view: &mut Vec<Transaction>) {
        match self {
            PendingEdit::Create { payload, .. } => {
                match view.iter_mut().find(|t| t.id == payload.id) {
                    Some(existing) => *existing = payload.clone(),
                    None => view.push(payload.clone()),
                }
            }
            PendingEdit::Update { target, payload } => {
                if let Some(tx) = view.iter_mut().find(|t| t.id == *target) {
                    payload.apply_to(tx);
                }
            }
            PendingEdit::Delete { target } => view.retain(|t| t.id != *target),
        }
    }
}

/// Ordered queue of pending edits, replayed over the confirmed list at read time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EditLog {
    edits: Vec<PendingEdit>,
}

impl EditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, edit: PendingEdit) {
        self.edits.push(edit);
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingEdit> {
        self.edits.iter()
    }

    pub fn clear(&mut self) {
        self.edits.clear();
    }

    pub fn is_pending(&self, target: &str) -> bool {
        self.edits.iter().any(|e| e.target() == target)
    }

    /// The confirmed list with every pending edit applied in queue order.
    pub fn view(&self, confirmed: &[Transaction]) -> Vec<Transaction> {
        let mut view = confirmed.to_vec();
        for edit in &self.edits {
            edit.apply(&mut view);
        }
        view
    }

    /// Drops edits the confirmed list already reflects, plus updates whose target
    /// no longer exists anywhere. Returns how many were dropped.
    pub fn reconcile(&mut self, confirmed: &[Transaction]) -> usize {
        let before = self.edits.len();
        let find = |id: &str| confirmed.iter().find(|t| t.id == id);

        let mut kept: Vec<PendingEdit> = Vec::with_capacity(before);
        for edit in self.edits.drain(..) {
            let settled = match &edit {
                PendingEdit::Create { target, .. } => find(target).is_some(),
                PendingEdit::Update { target, payload } => match find(target) {
                    Some(tx) => payload.is_reflected_in(tx),
                    None => !kept
                        .iter()
                        .any(|k| matches!(k, PendingEdit::Create { target: t, .. } if t == target)),
                },
                PendingEdit::Delete { target } => find(target).is_none(),
            };
            if !settled {
                kept.push(edit);
            }
        }
        self.edits = kept;

        let dropped = before - self.edits.len();
        if dropped > 0 {
            tracing::debug!(dropped, remaining = self.edits.len(), "reconciled pending edits");
        }
        dropped
    }
}
