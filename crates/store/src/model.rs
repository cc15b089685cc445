use common::{ChildId, ChildKind, CustomerId};

/// Fields of a customer that does not exist yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCustomer {
    pub name: String,
    pub date_of_birth: Option<String>,
}

impl NewCustomer {
    /// Creates a new customer with the given name and no date of birth.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            date_of_birth: None,
        }
    }

    /// Sets the date of birth.
    pub fn date_of_birth(mut self, date_of_birth: impl Into<String>) -> Self {
        self.date_of_birth = Some(date_of_birth.into());
        self
    }
}

/// A row of the `customers` relation, without children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerRecord {
    pub id: CustomerId,
    pub name: String,
    pub date_of_birth: Option<String>,
}

/// A row of one of the child relations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildRecord {
    pub id: ChildId,
    pub customer_id: CustomerId,
    pub kind: ChildKind,
    pub value: String,
}

/// A customer together with its owned collections.
///
/// Each collection is kept in insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Customer {
    pub id: CustomerId,
    pub name: String,
    pub date_of_birth: Option<String>,
    pub emails: Vec<ChildRecord>,
    pub phone_numbers: Vec<ChildRecord>,
    pub addresses: Vec<ChildRecord>,
}

impl Customer {
    /// Creates a customer with empty collections from its row.
    pub fn from_record(record: CustomerRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            date_of_birth: record.date_of_birth,
            emails: Vec::new(),
            phone_numbers: Vec::new(),
            addresses: Vec::new(),
        }
    }

    /// Returns the collection holding children of `kind`.
    pub fn children(&self, kind: ChildKind) -> &[ChildRecord] {
        match kind {
            ChildKind::Email => &self.emails,
            ChildKind::PhoneNumber => &self.phone_numbers,
            ChildKind::Address => &self.addresses,
        }
    }

    /// Returns the bare values of the collection holding `kind`.
    pub fn values(&self, kind: ChildKind) -> Vec<String> {
        self.children(kind)
            .iter()
            .map(|child| child.value.clone())
            .collect()
    }

    /// Appends a child to the matching collection.
    pub fn push_child(&mut self, child: ChildRecord) {
        match child.kind {
            ChildKind::Email => self.emails.push(child),
            ChildKind::PhoneNumber => self.phone_numbers.push(child),
            ChildKind::Address => self.addresses.push(child),
        }
    }
}

/// A partial update of a customer's own fields.
///
/// `Some` marks a field as present (assign it), `None` as absent (leave it).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomerPatch {
    pub name: Option<String>,
    pub date_of_birth: Option<String>,
}

impl CustomerPatch {
    /// Creates an empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the name as present.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Marks the date of birth as present.
    pub fn date_of_birth(mut self, date_of_birth: impl Into<String>) -> Self {
        self.date_of_birth = Some(date_of_birth.into());
        self
    }

    /// Returns true if no field is present.
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.date_of_birth.is_none()
    }

    /// Applies the present fields to a record.
    pub fn apply_to(&self, record: &mut CustomerRecord) {
        if let Some(name) = &self.name {
            record.name = name.clone();
        }
        if let Some(date_of_birth) = &self.date_of_birth {
            record.date_of_birth = Some(date_of_birth.clone());
        }
    }
}
