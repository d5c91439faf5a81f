use cashpilot_core::{Transaction, TransactionType, YearMonth};
use cashpilot_insights::{AnalysisInput, AnalysisReport, HealthScore, Insight, InsightEngine, KpiSummary};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, PoisonError};

use crate::feed::{Feed, Subscription};
use crate::overlay::{EditLog, PendingEdit};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UiFlags {
    pub loading: bool,
    pub error: Option<String>,
    /// Restricts period-scoped selectors to one month.
    pub selected_period: Option<YearMonth>,
}

/// Every state change goes through one of these.
#[derive(Debug, Clone)]
pub enum Action {
    /// Authoritative list from the backing store; settles matching pending edits.
    ConfirmTransactions(Vec<Transaction>),
    QueueEdit(PendingEdit),
    DiscardEdits,
    SetReport(Box<AnalysisReport>),
    SetLoading(bool),
    SetError(String),
    ClearError,
    SelectPeriod(Option<YearMonth>),
}

#[derive(Debug, Clone, Default)]
pub struct AppState {
    confirmed: Vec<Transaction>,
    edits: EditLog,
    report: Option<AnalysisReport>,
    kpis: Option<KpiSummary>,
    flags: UiFlags,
}

pub type SharedState = Arc<Mutex<AppState>>;

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, action: Action) {
        match action {
            Action::ConfirmTransactions(transactions) => {
                self.confirmed = transactions;
                self.edits.reconcile(&self.confirmed);
            }
            Action::QueueEdit(edit) => {
                tracing::debug!(target_id = edit.target(), "queued edit");
                self.edits.push(edit);
            }
            Action::DiscardEdits => self.edits.clear(),
            Action::SetReport(report) => {
                self.kpis = Some(report.summary.clone());
                self.report = Some(*report);
                self.flags.loading = false;
                self.flags.error = None;
            }
            Action::SetLoading(loading) => self.flags.loading = loading,
            Action::SetError(message) => {
                self.flags.loading = false;
                self.flags.error = Some(message);
            }
            Action::ClearError => self.flags.error = None,
            Action::SelectPeriod(period) => self.flags.selected_period = period,
        }
    }

    /// Re-runs the engine over the current view and stores the result.
    pub fn refresh_report(&mut self, engine: &InsightEngine, now: DateTime<Utc>) {
        let input = AnalysisInput::new(self.transactions());
        let report = engine.analyze_at(&input, now);
        self.apply(Action::SetReport(Box::new(report)));
    }

    pub fn confirmed_transactions(&self) -> &[Transaction] {
        &self.confirmed
    }

    /// Confirmed transactions with pending edits applied.
    pub fn transactions(&self) -> Vec<Transaction> {
        self.edits.view(&self.confirmed)
    }

    /// The overlaid view limited to the selected period, if any, newest first.
    pub fn visible_transactions(&self) -> Vec<Transaction> {
        let mut view: Vec<Transaction> = self
            .transactions()
            .into_iter()
            .filter(|t| {
                self.flags
                    .selected_period
                    .map_or(true, |p| YearMonth::of(t.day()) == p)
            })
            .collect();
        view.sort_by(|a, b| b.date.cmp(&a.date));
        view
    }

    pub fn transactions_of(&self, kind: TransactionType) -> Vec<Transaction> {
        self.transactions().into_iter().filter(|t| t.kind == kind).collect()
    }

    pub fn pending_edits(&self) -> &EditLog {
        &self.edits
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.edits.is_pending(id)
    }

    pub fn report(&self) -> Option<&AnalysisReport> {
        self.report.as_ref()
    }

    pub fn insights(&self) -> &[Insight] {
        self.report.as_ref().map(|r| r.insights.as_slice()).unwrap_or_default()
    }

    pub fn health_score(&self) -> Option<&HealthScore> {
        self.report.as_ref().map(|r| &r.health_score)
    }

    pub fn kpis(&self) -> Option<&KpiSummary> {
        self.kpis.as_ref()
    }

    pub fn flags(&self) -> &UiFlags {
        &self.flags
    }
}

/// Feeds every published transaction snapshot into `state` as a confirmation.
pub fn follow(state: &SharedState, feed: &Feed<Transaction>) -> Subscription<Transaction> {
    let state = Arc::clone(state);
    feed.subscribe(move |transactions| {
        let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
        state.apply(Action::ConfirmTransactions(transactions.to_vec()));
    })
}
