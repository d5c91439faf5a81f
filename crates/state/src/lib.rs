//! Client-side application state: an explicit [`AppState`] changed through
//! [`Action`]s, an optimistic [`EditLog`] overlay, and push-style [`Feed`]s.

pub mod feed;
pub mod overlay;
pub mod store;

pub use feed::{Feed, Subscription};
pub use overlay::{EditLog, PendingEdit, TransactionPatch};
pub use store::{follow, Action, AppState, SharedState, UiFlags};
