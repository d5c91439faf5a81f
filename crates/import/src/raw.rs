use serde::{Deserialize, Deserializer};

pub use cashpilot_core::transaction::null_as_default;

/// Connector ids arrive as JSON numbers (Shopify REST) or strings (QuickBooks,
/// GraphQL gids). Both become strings; `null` becomes empty.
pub fn flexible_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Num(u64),
        Signed(i64),
        Text(String),
    }

    Ok(match Option::<RawId>::deserialize(deserializer)? {
        Some(RawId::Num(n)) => n.to_string(),
        Some(RawId::Signed(n)) => n.to_string(),
        Some(RawId::Text(s)) => s,
        None => String::new(),
    })
}
