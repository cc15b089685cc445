//! Inputs to customer operations and their validation.

use common::ChildKind;
use store::{CustomerPatch, NewCustomer};

use crate::error::DomainError;

/// A new customer plus at most one child of each kind, created atomically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerDetails {
    pub customer: NewCustomer,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub address: Option<String>,
}

impl CustomerDetails {
    /// Creates details with no children.
    pub fn new(customer: NewCustomer) -> Self {
        Self {
            customer,
            email: None,
            phone_number: None,
            address: None,
        }
    }

    /// Adds an email.
    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Adds a phone number.
    pub fn phone_number(mut self, phone_number: impl Into<String>) -> Self {
        self.phone_number = Some(phone_number.into());
        self
    }

    /// Adds an address.
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Returns the supplied children in write order.
    pub fn children(&self) -> impl Iterator<Item = (ChildKind, &str)> {
        ChildKind::ALL.into_iter().filter_map(move |kind| {
            let value = match kind {
                ChildKind::Email => self.email.as_deref(),
                ChildKind::PhoneNumber => self.phone_number.as_deref(),
                ChildKind::Address => self.address.as_deref(),
            };
            value.map(|value| (kind, value))
        })
    }
}

pub(crate) fn require_name(name: &str) -> Result<(), DomainError> {
    if name.trim().is_empty() {
        return Err(DomainError::Validation("name is required".to_string()));
    }
    Ok(())
}

pub(crate) fn require_value(kind: ChildKind, value: &str) -> Result<(), DomainError> {
    if value.trim().is_empty() {
        return Err(DomainError::Validation(format!("{kind} must not be empty")));
    }
    Ok(())
}

/// Validates a new customer and drops an empty date of birth.
pub(crate) fn validate_new_customer(mut customer: NewCustomer) -> Result<NewCustomer, DomainError> {
    require_name(&customer.name)?;
    customer.date_of_birth = customer
        .date_of_birth
        .filter(|date_of_birth| !date_of_birth.is_empty());
    Ok(customer)
}

/// Validates a patch and drops an empty date of birth.
///
/// A present name must not be empty.
pub(crate) fn validate_patch(mut patch: CustomerPatch) -> Result<CustomerPatch, DomainError> {
    if let Some(name) = &patch.name {
        require_name(name)?;
    }
    patch.date_of_birth = patch
        .date_of_birth
        .filter(|date_of_birth| !date_of_birth.is_empty());
    Ok(patch)
}

/// Validates a new customer and every supplied child.
pub(crate) fn validate_details(mut details: CustomerDetails) -> Result<CustomerDetails, DomainError> {
    details.customer = validate_new_customer(details.customer)?;
    for (kind, value) in details.children() {
        require_value(kind, value)?;
    }
    Ok(details)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn children_are_yielded_in_write_order() {
        let details = CustomerDetails::new(NewCustomer::new("Alice"))
            .address("123 Main St")
            .email("alice@x.com");

        let children: Vec<_> = details.children().collect();
        assert_eq!(
            children,
            vec![
                (ChildKind::Email, "alice@x.com"),
                (ChildKind::Address, "123 Main St")
            ]
        );
    }

    #[test]
    fn blank_name_is_rejected() {
        let err = validate_new_customer(NewCustomer::new("   ")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn empty_date_of_birth_is_dropped() {
        let customer = validate_new_customer(NewCustomer::new("Alice").date_of_birth("")).unwrap();
        assert!(customer.date_of_birth.is_none());

        let patch = validate_patch(CustomerPatch::new().date_of_birth("")).unwrap();
        assert!(patch.is_empty());
    }

    #[test]
    fn empty_name_in_patch_is_rejected() {
        let err = validate_patch(CustomerPatch::new().name("")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn empty_child_in_details_is_rejected() {
        let details = CustomerDetails::new(NewCustomer::new("Dana")).phone_number("");
        let err = validate_details(details).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("phone number"));
    }
}
