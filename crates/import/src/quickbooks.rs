use cashpilot_core::transaction::flexible_date;
use cashpilot_core::{Money, Transaction, TransactionSource, TransactionStatus, TransactionType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::raw::{flexible_id, null_as_default};
use crate::rules::Categorizer;

const INVOICE_CATEGORY: &str = "Services";
const BILL_CATEGORY: &str = "Uncategorized";

/// `{"value": "...", "name": "..."}` reference to a customer, vendor or account.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawRef {
    #[serde(deserialize_with = "flexible_id")]
    pub value: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct RawLine {
    pub description: Option<String>,
    pub amount: Option<Money>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct RawInvoice {
    #[serde(deserialize_with = "flexible_id")]
    pub id: String,
    pub doc_number: Option<String>,
    pub txn_date: Option<String>,
    pub total_amt: Option<Money>,
    pub balance: Option<Money>,
    pub customer_ref: Option<RawRef>,
    pub private_note: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub line: Vec<RawLine>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct RawBill {
    #[serde(deserialize_with = "flexible_id")]
    pub id: String,
    pub doc_number: Option<String>,
    pub txn_date: Option<String>,
    pub total_amt: Option<Money>,
    pub balance: Option<Money>,
    pub vendor_ref: Option<RawRef>,
    pub private_note: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub line: Vec<RawLine>,
}

fn lines_total(lines: &[RawLine]) -> Money {
    lines.iter().filter_map(|l| l.amount).sum()
}

fn first_line_description(lines: &[RawLine]) -> Option<&str> {
    lines
        .iter()
        .filter_map(|l| l.description.as_deref())
        .map(str::trim)
        .find(|d| !d.is_empty())
}

fn status_from_balance(balance: Option<Money>) -> TransactionStatus {
    match balance {
        Some(b) if !b.is_zero() => TransactionStatus::Pending,
        _ => TransactionStatus::Completed,
    }
}

impl RawInvoice {
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.txn_date.as_deref().and_then(flexible_date::parse)
    }

    pub fn total(&self) -> Money {
        self.total_amt.unwrap_or_else(|| lines_total(&self.line))
    }

    /// Customer identity: the reference value, else the display name.
    pub fn customer_key(&self) -> Option<String> {
        let customer = self.customer_ref.as_ref()?;
        if !customer.value.is_empty() {
            return Some(customer.value.clone());
        }
        customer.name.clone().filter(|n| !n.trim().is_empty())
    }
}

impl RawBill {
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.txn_date.as_deref().and_then(flexible_date::parse)
    }

    pub fn total(&self) -> Money {
        self.total_amt.unwrap_or_else(|| lines_total(&self.line))
    }
}

/// Converts an invoice into an income transaction; undated invoices are skipped.
pub fn invoice_to_transaction(
    invoice: &RawInvoice,
    user_id: &str,
    categorizer: &Categorizer,
) -> Option<Transaction> {
    let date = invoice.issued_at()?;
    let number = invoice.doc_number.clone().unwrap_or_else(|| invoice.id.clone());
    let detail = first_line_description(&invoice.line)
        .map(str::to_string)
        .or_else(|| invoice.customer_ref.as_ref().and_then(|c| c.name.clone()));
    let description = match detail {
        Some(detail) => format!("Invoice {number} - {detail}"),
        None => format!("Invoice {number}"),
    };

    let mut tx = Transaction::new(
        format!("qb-invoice-{}", invoice.id),
        date,
        invoice.total().abs(),
        TransactionType::Income,
    )
    .with_description(description)
    .with_source(TransactionSource::Quickbooks)
    .with_tag("quickbooks")
    .with_tag("invoice");
    tx.user_id = user_id.to_string();
    tx.status = status_from_balance(invoice.balance);
    tx.created_at = Some(date);

    // The description always carries "Invoice", so skip past that generic hit when
    // the line text gives something more specific.
    let suggestions = categorizer.suggest_for(&tx);
    tx.category = suggestions
        .iter()
        .find(|c| c.as_str() != INVOICE_CATEGORY)
        .or_else(|| suggestions.first())
        .cloned()
        .unwrap_or_else(|| INVOICE_CATEGORY.to_string());
    Some(tx)
}

/// Converts a bill into an expense transaction (negative amount); undated bills are skipped.
pub fn bill_to_transaction(bill: &RawBill, user_id: &str, categorizer: &Categorizer) -> Option<Transaction> {
    let date = bill.issued_at()?;
    let vendor = bill.vendor_ref.as_ref().and_then(|v| v.name.clone());
    let description = first_line_description(&bill.line)
        .map(str::to_string)
        .or_else(|| bill.private_note.clone().filter(|n| !n.trim().is_empty()))
        .or_else(|| vendor.as_ref().map(|v| format!("Bill from {v}")))
        .unwrap_or_else(|| format!("Bill {}", bill.id));

    let mut tx = Transaction::new(
        format!("qb-bill-{}", bill.id),
        date,
        -bill.total().abs(),
        TransactionType::Expense,
    )
    .with_description(description)
    .with_source(TransactionSource::Quickbooks)
    .with_tag("quickbooks")
    .with_tag("bill");
    tx.user_id = user_id.to_string();
    tx.status = status_from_balance(bill.balance);
    tx.created_at = Some(date);

    let mut suggestion = categorizer.suggest_for(&tx).into_iter().next();
    if suggestion.is_none() {
        if let Some(vendor) = &vendor {
            suggestion = categorizer
                .suggest(vendor, TransactionType::Expense)
                .into_iter()
                .next();
        }
    }
    tx.category = suggestion.unwrap_or_else(|| BILL_CATEGORY.to_string());
    Some(tx)
}

pub fn invoices_to_transactions(
    invoices: &[RawInvoice],
    user_id: &str,
    categorizer: &Categorizer,
) -> Vec<Transaction> {
    invoices
        .iter()
        .filter_map(|i| invoice_to_transaction(i, user_id, categorizer))
        .collect()
}

pub fn bills_to_transactions(bills: &[RawBill], user_id: &str, categorizer: &Categorizer) -> Vec<Transaction> {
    bills
        .iter()
        .filter_map(|b| bill_to_transaction(b, user_id, categorizer))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cashpilot_core::AnalysisConfig;

    fn categorizer() -> Categorizer {
        Categorizer::new(&AnalysisConfig::default())
    }

    #[test]
    fn parses_invoice_payload() {
        let invoice: RawInvoice = serde_json::from_str(
            r#"{
                "Id": "130",
                "DocNumber": "1037",
                "TxnDate": "2024-04-12",
                "TotalAmt": 362.07,
                "Balance": 0,
                "CustomerRef": {"value": "3", "name": "Cool Cars"},
                "Line": [{"Description": "Monthly retainer", "Amount": 362.07}]
            }"#,
        )
        .unwrap();
        assert_eq!(invoice.id, "130");
        assert_eq!(invoice.total(), Money::from_cents(36207));
        assert_eq!(invoice.customer_key().as_deref(), Some("3"));

        let tx = invoice_to_transaction(&invoice, "u1", &categorizer()).unwrap();
        assert_eq!(tx.id, "qb-invoice-130");
        assert_eq!(tx.kind, TransactionType::Income);
        assert_eq!(tx.source, TransactionSource::Quickbooks);
        assert_eq!(tx.status, TransactionStatus::Completed);
        assert_eq!(tx.description, "Invoice 1037 - Monthly retainer");
        assert_eq!(tx.category, "Retainer");
    }

    #[test]
    fn open_invoice_is_pending_with_default_category() {
        let invoice = RawInvoice {
            id: "9".into(),
            txn_date: Some("2024-04-01".into()),
            total_amt: Some(Money::from_cents(5000)),
            balance: Some(Money::from_cents(5000)),
            ..RawInvoice::default()
        };
        let tx = invoice_to_transaction(&invoice, "u1", &categorizer()).unwrap();
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert_eq!(tx.category, "Services");
    }

    #[test]
    fn bill_becomes_negative_expense() {
        let bill: RawBill = serde_json::from_str(
            r#"{
                "Id": 46,
                "TxnDate": "2024-04-03",
                "TotalAmt": 250,
                "VendorRef": {"value": "30", "name": "Acme Insurance Co"},
                "Line": [{"Amount": 250}]
            }"#,
        )
        .unwrap();
        let tx = bill_to_transaction(&bill, "u1", &categorizer()).unwrap();
        assert_eq!(tx.id, "qb-bill-46");
        assert_eq!(tx.kind, TransactionType::Expense);
        assert_eq!(tx.amount, Money::from_cents(-25000));
        assert_eq!(tx.description, "Bill from Acme Insurance Co");
        assert_eq!(tx.category, "Insurance");
        assert!(tx.has_tag("bill"));
    }

    #[test]
    fn bill_without_any_match_is_uncategorized() {
        let bill = RawBill {
            id: "1".into(),
            txn_date: Some("2024-04-03".into()),
            line: vec![RawLine {
                description: Some("Widget restock".into()),
                amount: Some(Money::from_cents(1200)),
            }],
            ..RawBill::default()
        };
        let tx = bill_to_transaction(&bill, "u1", &categorizer()).unwrap();
        assert_eq!(tx.amount, Money::from_cents(-1200));
        assert_eq!(tx.category, "Uncategorized");
    }

    #[test]
    fn null_lines_and_refs_read_as_empty() {
        let bill: RawBill = serde_json::from_str(
            r#"{"Id": 3, "TxnDate": "2024-05-01", "TotalAmt": null, "VendorRef": null,
                "Line": null, "Balance": null}"#,
        )
        .unwrap();
        assert!(bill.line.is_empty());
        assert!(bill.total().is_zero());

        let invoice: RawInvoice = serde_json::from_str(
            r#"{"Id": "4", "TxnDate": "2024-05-02", "CustomerRef": {"value": null, "name": null},
                "Line": [{"Description": null, "Amount": 80}]}"#,
        )
        .unwrap();
        assert!(invoice.customer_key().is_none());
        let tx = invoice_to_transaction(&invoice, "u1", &categorizer()).unwrap();
        assert_eq!(tx.amount, Money::from_cents(8000));
        assert_eq!(tx.description, "Invoice 4");
    }

    #[test]
    fn undated_records_are_skipped() {
        assert!(invoices_to_transactions(&[RawInvoice::default()], "u1", &categorizer()).is_empty());
        assert!(bills_to_transactions(&[RawBill::default()], "u1", &categorizer()).is_empty());
    }
}
