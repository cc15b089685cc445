use async_trait::async_trait;
use common::{ChildKind, CustomerId};

use crate::{ChildRecord, Customer, CustomerPatch, CustomerRecord, NewCustomer, Result};

/// Core trait for customer store implementations.
///
/// Reads issued directly on the store run against the ambient connection.
/// Anything that must be consistent across several statements goes through
/// a [`UnitOfWork`] obtained from [`CustomerStore::begin`].
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait CustomerStore: Send + Sync {
    /// The transaction handle this store hands out.
    type UnitOfWork: UnitOfWork;

    /// Opens a new unit of work.
    async fn begin(&self) -> Result<Self::UnitOfWork>;

    /// Loads a customer with all of its children.
    ///
    /// Returns None if the customer doesn't exist.
    async fn get_customer(&self, id: CustomerId) -> Result<Option<Customer>>;

    /// Loads every customer with its children, in ascending ID order.
    async fn list_customers(&self) -> Result<Vec<Customer>>;

    /// Loads the customer owning a child value.
    ///
    /// If several customers hold the value (possible for addresses), the
    /// owner of the oldest row wins.
    async fn find_customer_by_child(
        &self,
        kind: ChildKind,
        value: &str,
    ) -> Result<Option<Customer>>;
}

/// A group of storage operations that commits or rolls back atomically.
///
/// Every call is scoped to the transaction it is invoked on. Dropping a
/// unit of work without calling [`UnitOfWork::commit`] rolls it back.
#[async_trait]
pub trait UnitOfWork: Send + Sized {
    /// Inserts a customer row and returns it with its assigned ID.
    ///
    /// The ID is visible to later calls on the same unit of work.
    async fn insert_customer(&mut self, customer: &NewCustomer) -> Result<CustomerRecord>;

    /// Reads a customer row without locking it.
    async fn fetch_customer(&mut self, id: CustomerId) -> Result<Option<CustomerRecord>>;

    /// Reads a customer row and locks it until the unit of work ends.
    ///
    /// Concurrent units of work locking the same customer are serialized.
    async fn lock_customer(&mut self, id: CustomerId) -> Result<Option<CustomerRecord>>;

    /// Loads a customer with all of its children.
    async fn load_customer(&mut self, id: CustomerId) -> Result<Option<Customer>>;

    /// Assigns the present fields of `patch`.
    ///
    /// Returns the updated row, or None if the customer doesn't exist.
    async fn update_customer(
        &mut self,
        id: CustomerId,
        patch: &CustomerPatch,
    ) -> Result<Option<CustomerRecord>>;

    /// Deletes a customer and, by cascade, all of its children.
    ///
    /// Returns false if the customer doesn't exist.
    async fn delete_customer(&mut self, id: CustomerId) -> Result<bool>;

    /// Inserts a child row.
    ///
    /// Fails with `UniqueViolation` or `ForeignKeyViolation` when the
    /// store's constraints reject it.
    async fn insert_child(
        &mut self,
        kind: ChildKind,
        customer_id: CustomerId,
        value: &str,
    ) -> Result<ChildRecord>;

    /// Deletes the oldest child of `kind` with `value` owned by the customer.
    ///
    /// Returns false if there was no such child.
    async fn delete_child(
        &mut self,
        kind: ChildKind,
        customer_id: CustomerId,
        value: &str,
    ) -> Result<bool>;

    /// Returns the values of a customer's collection in insertion order.
    async fn child_values(&mut self, kind: ChildKind, customer_id: CustomerId)
    -> Result<Vec<String>>;

    /// Returns true if the customer's collection already holds `value`.
    async fn has_child(
        &mut self,
        kind: ChildKind,
        customer_id: CustomerId,
        value: &str,
    ) -> Result<bool>;

    /// Returns the customer owning the oldest child of `kind` with `value`.
    async fn child_owner(&mut self, kind: ChildKind, value: &str) -> Result<Option<CustomerId>>;

    /// Makes every write of this unit of work durable.
    async fn commit(self) -> Result<()>;

    /// Discards every write of this unit of work.
    async fn rollback(self) -> Result<()>;
}
