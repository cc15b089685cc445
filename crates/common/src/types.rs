use serde::{Deserialize, Serialize};

/// Identifier of a customer, assigned by the store on creation.
///
/// Wraps the raw row key so customer IDs cannot be mixed up with
/// child record IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerId(i64);

impl CustomerId {
    /// Creates a customer ID from a raw key.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the raw key.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for CustomerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for CustomerId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<CustomerId> for i64 {
    fn from(id: CustomerId) -> Self {
        id.0
    }
}

/// Identifier of a child record (email, phone number or address row).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChildId(i64);

impl ChildId {
    /// Creates a child ID from a raw key.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the raw key.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for ChildId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The three collections a customer owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChildKind {
    Email,
    PhoneNumber,
    Address,
}

impl ChildKind {
    /// All kinds, in the order children are written during multi-entity creation.
    pub const ALL: [ChildKind; 3] = [ChildKind::Email, ChildKind::PhoneNumber, ChildKind::Address];

    /// Name of the relation holding this kind of child.
    pub fn table(&self) -> &'static str {
        match self {
            ChildKind::Email => "emails",
            ChildKind::PhoneNumber => "phone_numbers",
            ChildKind::Address => "addresses",
        }
    }

    /// Name of the value column within [`ChildKind::table`].
    pub fn value_column(&self) -> &'static str {
        match self {
            ChildKind::Email => "email",
            ChildKind::PhoneNumber => "phone_number",
            ChildKind::Address => "address",
        }
    }

    /// Whether a value of this kind may belong to at most one customer.
    ///
    /// Emails and phone numbers identify their owner (lookup by value), so
    /// they are unique across all customers. Addresses are only unique
    /// within one customer's collection.
    pub fn is_globally_unique(&self) -> bool {
        matches!(self, ChildKind::Email | ChildKind::PhoneNumber)
    }

    /// Human-readable name used in error messages and logs.
    pub fn label(&self) -> &'static str {
        match self {
            ChildKind::Email => "email",
            ChildKind::PhoneNumber => "phone number",
            ChildKind::Address => "address",
        }
    }
}

impl std::fmt::Display for ChildKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
