pub mod quickbooks;
pub mod raw;
pub mod rules;
pub mod shopify;
pub(crate) mod util;

pub use quickbooks::{RawBill, RawInvoice, RawLine, RawRef};
pub use rules::{CategoryRule, Categorizer, MatchType, RuleError, EXPENSE_KEYWORDS, INCOME_KEYWORDS};
pub use shopify::{RawCustomer, RawLineItem, RawOrder};

pub mod sync {
    use cashpilot_core::Transaction;

    use crate::*;

    /// Converts every dated connector record into a transaction, in source order:
    /// Shopify orders, then QuickBooks invoices, then bills.
    pub fn convert_all(
        orders: &[RawOrder],
        invoices: &[RawInvoice],
        bills: &[RawBill],
        user_id: &str,
        categorizer: &Categorizer,
    ) -> Vec<Transaction> {
        let mut transactions = shopify::orders_to_transactions(orders, user_id, categorizer);
        transactions.extend(quickbooks::invoices_to_transactions(invoices, user_id, categorizer));
        transactions.extend(quickbooks::bills_to_transactions(bills, user_id, categorizer));
        tracing::debug!(count = transactions.len(), "converted connector records");
        transactions
    }
}
