//! Identifiers shared by every layer of the customer service.

mod types;

pub use types::{ChildId, ChildKind, CustomerId};
