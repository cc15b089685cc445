//! Customer service enforcing the aggregate's invariants.

use std::future::Future;
use std::time::Instant;

use common::{ChildKind, CustomerId};
use store::{ChildRecord, Customer, CustomerPatch, CustomerStore, NewCustomer, UnitOfWork};

use super::commands::{
    CustomerDetails, require_value, validate_details, validate_new_customer, validate_patch,
};
use crate::deadline::Deadline;
use crate::error::DomainError;

/// Service for managing customers and their owned collections.
///
/// Holds no mutable state of its own; every rule that spans more than one
/// statement runs inside a single unit of work of the underlying store.
///
/// Spans record customer IDs and child kinds, never names or child values.
pub struct CustomerService<S: CustomerStore> {
    store: S,
}

impl<S: CustomerStore> CustomerService<S> {
    /// Creates a new customer service over the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Creates a customer with no children.
    #[tracing::instrument(skip_all)]
    pub async fn create_customer(
        &self,
        deadline: Deadline,
        customer: NewCustomer,
    ) -> Result<Customer, DomainError> {
        self.observe_write("create_customer", deadline, async {
            let customer = validate_new_customer(customer)?;

            let mut uow = self.store.begin().await?;
            let record = uow.insert_customer(&customer).await?;

            tracing::debug!(customer_id = %record.id, "customer created");
            Ok((uow, Customer::from_record(record)))
        })
        .await
    }

    /// Loads a customer with its children.
    #[tracing::instrument(skip(self, deadline))]
    pub async fn get_customer(
        &self,
        deadline: Deadline,
        id: CustomerId,
    ) -> Result<Customer, DomainError> {
        self.observe("get_customer", deadline, async {
            self.store
                .get_customer(id)
                .await?
                .ok_or_else(|| no_such_customer(id))
        })
        .await
    }

    /// Loads every customer with its children.
    #[tracing::instrument(skip(self, deadline))]
    pub async fn list_customers(&self, deadline: Deadline) -> Result<Vec<Customer>, DomainError> {
        self.observe("list_customers", deadline, async {
            Ok(self.store.list_customers().await?)
        })
        .await
    }

    /// Assigns the present fields of `patch` and returns the updated customer.
    ///
    /// An empty patch writes nothing.
    #[tracing::instrument(skip(self, deadline, patch))]
    pub async fn update_customer(
        &self,
        deadline: Deadline,
        id: CustomerId,
        patch: CustomerPatch,
    ) -> Result<Customer, DomainError> {
        self.observe_write("update_customer", deadline, async {
            let patch = validate_patch(patch)?;

            let mut uow = self.store.begin().await?;
            if !patch.is_empty() {
                uow.update_customer(id, &patch)
                    .await?
                    .ok_or_else(|| no_such_customer(id))?;
            }
            let customer = uow
                .load_customer(id)
                .await?
                .ok_or_else(|| no_such_customer(id))?;

            Ok((uow, customer))
        })
        .await
    }

    /// Deletes a customer together with all of its children.
    #[tracing::instrument(skip(self, deadline))]
    pub async fn delete_customer(&self, deadline: Deadline, id: CustomerId) -> Result<(), DomainError> {
        self.observe_write("delete_customer", deadline, async {
            let mut uow = self.store.begin().await?;
            if !uow.delete_customer(id).await? {
                return Err(no_such_customer(id));
            }

            tracing::debug!(customer_id = %id, "customer deleted");
            Ok((uow, ()))
        })
        .await
    }

    /// Adds a value to one of a customer's collections.
    ///
    /// The parent row is locked before the duplicate check, so concurrent
    /// additions to the same customer cannot both pass it.
    #[tracing::instrument(skip(self, deadline, value))]
    pub async fn add_child(
        &self,
        deadline: Deadline,
        kind: ChildKind,
        id: CustomerId,
        value: &str,
    ) -> Result<ChildRecord, DomainError> {
        self.observe_write(ChildAction::Add.operation(kind), deadline, async {
            require_value(kind, value)?;

            let mut uow = self.store.begin().await?;
            uow.lock_customer(id)
                .await?
                .ok_or_else(|| no_such_customer(id))?;
            ensure_available(&mut uow, kind, id, value).await?;
            let child = uow.insert_child(kind, id, value).await?;

            Ok((uow, child))
        })
        .await
    }

    /// Removes the first occurrence of a value from one of a customer's
    /// collections.
    #[tracing::instrument(skip(self, deadline, value))]
    pub async fn delete_child(
        &self,
        deadline: Deadline,
        kind: ChildKind,
        id: CustomerId,
        value: &str,
    ) -> Result<(), DomainError> {
        self.observe_write(ChildAction::Delete.operation(kind), deadline, async {
            let mut uow = self.store.begin().await?;
            uow.lock_customer(id)
                .await?
                .ok_or_else(|| no_such_customer(id))?;
            if !uow.delete_child(kind, id, value).await? {
                return Err(DomainError::NotFound(format!(
                    "{kind} {value:?} not found for customer {id}"
                )));
            }

            Ok((uow, ()))
        })
        .await
    }

    /// Returns the values of one of a customer's collections in insertion
    /// order.
    #[tracing::instrument(skip(self, deadline))]
    pub async fn list_children(
        &self,
        deadline: Deadline,
        kind: ChildKind,
        id: CustomerId,
    ) -> Result<Vec<String>, DomainError> {
        self.observe(ChildAction::List.operation(kind), deadline, async {
            let mut uow = self.store.begin().await?;
            uow.fetch_customer(id)
                .await?
                .ok_or_else(|| no_such_customer(id))?;
            let values = uow.child_values(kind, id).await?;
            uow.rollback().await?;

            Ok(values)
        })
        .await
    }

    /// Loads the customer owning a child value.
    #[tracing::instrument(skip(self, deadline, value))]
    pub async fn find_customer_by_child(
        &self,
        deadline: Deadline,
        kind: ChildKind,
        value: &str,
    ) -> Result<Customer, DomainError> {
        self.observe(ChildAction::Find.operation(kind), deadline, async {
            self.store
                .find_customer_by_child(kind, value)
                .await?
                .ok_or_else(|| DomainError::NotFound(format!("no customer owns {kind} {value:?}")))
        })
        .await
    }

    /// Creates a customer and its supplied children in one transaction.
    ///
    /// Every field is validated before the first write. If any insert
    /// fails, nothing is persisted, including the customer row.
    #[tracing::instrument(skip_all)]
    pub async fn create_customer_with_details(
        &self,
        deadline: Deadline,
        details: CustomerDetails,
    ) -> Result<Customer, DomainError> {
        self.observe_write("create_customer_with_details", deadline, async {
            let details = validate_details(details)?;

            let mut uow = self.store.begin().await?;
            let record = uow.insert_customer(&details.customer).await?;
            let mut customer = Customer::from_record(record);

            for (kind, value) in details.children() {
                ensure_available(&mut uow, kind, customer.id, value).await?;
                let child = uow.insert_child(kind, customer.id, value).await?;
                customer.push_child(child);
            }

            tracing::debug!(customer_id = %customer.id, "customer created with details");
            Ok((uow, customer))
        })
        .await
    }

    // Per-collection convenience methods

    /// Adds an email to a customer.
    pub async fn add_email(
        &self,
        deadline: Deadline,
        id: CustomerId,
        email: &str,
    ) -> Result<ChildRecord, DomainError> {
        self.add_child(deadline, ChildKind::Email, id, email).await
    }

    /// Adds a phone number to a customer.
    pub async fn add_phone_number(
        &self,
        deadline: Deadline,
        id: CustomerId,
        phone_number: &str,
    ) -> Result<ChildRecord, DomainError> {
        self.add_child(deadline, ChildKind::PhoneNumber, id, phone_number)
            .await
    }

    /// Adds an address to a customer.
    pub async fn add_address(
        &self,
        deadline: Deadline,
        id: CustomerId,
        address: &str,
    ) -> Result<ChildRecord, DomainError> {
        self.add_child(deadline, ChildKind::Address, id, address)
            .await
    }

    /// Removes an email from a customer.
    pub async fn delete_email(
        &self,
        deadline: Deadline,
        id: CustomerId,
        email: &str,
    ) -> Result<(), DomainError> {
        self.delete_child(deadline, ChildKind::Email, id, email)
            .await
    }

    /// Removes a phone number from a customer.
    pub async fn delete_phone_number(
        &self,
        deadline: Deadline,
        id: CustomerId,
        phone_number: &str,
    ) -> Result<(), DomainError> {
        self.delete_child(deadline, ChildKind::PhoneNumber, id, phone_number)
            .await
    }

    /// Removes an address from a customer.
    pub async fn delete_address(
        &self,
        deadline: Deadline,
        id: CustomerId,
        address: &str,
    ) -> Result<(), DomainError> {
        self.delete_child(deadline, ChildKind::Address, id, address)
            .await
    }

    /// Lists a customer's emails.
    pub async fn list_emails(
        &self,
        deadline: Deadline,
        id: CustomerId,
    ) -> Result<Vec<String>, DomainError> {
        self.list_children(deadline, ChildKind::Email, id).await
    }

    /// Lists a customer's phone numbers.
    pub async fn list_phone_numbers(
        &self,
        deadline: Deadline,
        id: CustomerId,
    ) -> Result<Vec<String>, DomainError> {
        self.list_children(deadline, ChildKind::PhoneNumber, id)
            .await
    }

    /// Lists a customer's addresses.
    pub async fn list_addresses(
        &self,
        deadline: Deadline,
        id: CustomerId,
    ) -> Result<Vec<String>, DomainError> {
        self.list_children(deadline, ChildKind::Address, id).await
    }

    /// Loads the customer owning an email.
    pub async fn get_customer_by_email(
        &self,
        deadline: Deadline,
        email: &str,
    ) -> Result<Customer, DomainError> {
        self.find_customer_by_child(deadline, ChildKind::Email, email)
            .await
    }

    /// Loads the customer owning a phone number.
    pub async fn get_customer_by_phone_number(
        &self,
        deadline: Deadline,
        phone_number: &str,
    ) -> Result<Customer, DomainError> {
        self.find_customer_by_child(deadline, ChildKind::PhoneNumber, phone_number)
            .await
    }

    /// Runs an operation under its deadline and records its outcome.
    async fn observe<T, F>(
        &self,
        operation: &'static str,
        deadline: Deadline,
        future: F,
    ) -> Result<T, DomainError>
    where
        F: Future<Output = Result<T, DomainError>>,
    {
        record(operation, deadline.run(operation, future)).await
    }

    /// Runs the writes of an operation under its deadline, then commits.
    ///
    /// The commit itself is not bounded, so `Timeout` is only reported for
    /// writes that were rolled back. A deadline that passes before the
    /// commit starts drops the unit of work.
    async fn observe_write<T, F>(
        &self,
        operation: &'static str,
        deadline: Deadline,
        work: F,
    ) -> Result<T, DomainError>
    where
        F: Future<Output = Result<(S::UnitOfWork, T), DomainError>>,
    {
        record(operation, async move {
            let (uow, value) = deadline.run(operation, work).await?;
            if deadline.is_expired() {
                return Err(DomainError::Timeout { operation });
            }
            uow.commit().await?;
            Ok(value)
        })
        .await
    }
}

/// Awaits an operation and records its outcome and duration.
async fn record<T, F>(operation: &'static str, future: F) -> Result<T, DomainError>
where
    F: Future<Output = Result<T, DomainError>>,
{
    let started = Instant::now();
    let result = future.await;

    let outcome = match &result {
        Ok(_) => "ok",
        Err(err) => err.kind().as_str(),
    };
    metrics::counter!("customer_operations_total", "operation" => operation, "outcome" => outcome)
        .increment(1);
    metrics::histogram!("customer_operation_duration_seconds", "operation" => operation)
        .record(started.elapsed().as_secs_f64());

    if let Err(DomainError::Timeout { .. }) = &result {
        tracing::warn!(operation, "deadline exceeded");
    }
    result
}

/// Fails with `Conflict` if `value` is already taken for this customer.
///
/// Emails and phone numbers are also checked against every other customer.
async fn ensure_available<U: UnitOfWork>(
    uow: &mut U,
    kind: ChildKind,
    id: CustomerId,
    value: &str,
) -> Result<(), DomainError> {
    if uow.has_child(kind, id, value).await? {
        return Err(DomainError::Conflict(format!(
            "{kind} {value:?} already belongs to customer {id}"
        )));
    }
    if kind.is_globally_unique() && uow.child_owner(kind, value).await?.is_some() {
        return Err(DomainError::Conflict(format!(
            "{kind} {value:?} already belongs to another customer"
        )));
    }
    Ok(())
}

fn no_such_customer(id: CustomerId) -> DomainError {
    DomainError::NotFound(format!("no such customer: {id}"))
}

#[derive(Debug, Clone, Copy)]
enum ChildAction {
    Add,
    Delete,
    List,
    Find,
}

impl ChildAction {
    /// Operation name used for metrics and timeout errors.
    fn operation(self, kind: ChildKind) -> &'static str {
        match (self, kind) {
            (ChildAction::Add, ChildKind::Email) => "add_email",
            (ChildAction::Add, ChildKind::PhoneNumber) => "add_phone_number",
            (ChildAction::Add, ChildKind::Address) => "add_address",
            (ChildAction::Delete, ChildKind::Email) => "delete_email",
            (ChildAction::Delete, ChildKind::PhoneNumber) => "delete_phone_number",
            (ChildAction::Delete, ChildKind::Address) => "delete_address",
            (ChildAction::List, ChildKind::Email) => "list_emails",
            (ChildAction::List, ChildKind::PhoneNumber) => "list_phone_numbers",
            (ChildAction::List, ChildKind::Address) => "list_addresses",
            (ChildAction::Find, ChildKind::Email) => "get_customer_by_email",
            (ChildAction::Find, ChildKind::PhoneNumber) => "get_customer_by_phone_number",
            (ChildAction::Find, ChildKind::Address) => "get_customer_by_address",
        }
    }
}
