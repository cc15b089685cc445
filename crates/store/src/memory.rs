use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    ChildId, ChildKind, ChildRecord, Customer, CustomerId, CustomerPatch, CustomerRecord,
    NewCustomer, Result, StoreError,
    store::{CustomerStore, UnitOfWork},
};

/// The four relations, held in memory.
#[derive(Debug, Clone, Default)]
struct Tables {
    last_customer_id: i64,
    last_child_id: i64,
    customers: BTreeMap<CustomerId, CustomerRecord>,
    // Insertion order doubles as ID order.
    children: Vec<ChildRecord>,
}

impl Tables {
    fn load(&self, id: CustomerId) -> Option<Customer> {
        let record = self.customers.get(&id)?;
        let mut customer = Customer::from_record(record.clone());
        for child in self.children.iter().filter(|c| c.customer_id == id) {
            customer.push_child(child.clone());
        }
        Some(customer)
    }

    fn load_all(&self) -> Vec<Customer> {
        self.customers
            .keys()
            .filter_map(|id| self.load(*id))
            .collect()
    }

    fn owner_of(&self, kind: ChildKind, value: &str) -> Option<CustomerId> {
        self.children
            .iter()
            .find(|c| c.kind == kind && c.value == value)
            .map(|c| c.customer_id)
    }

    fn insert_customer(&mut self, customer: &NewCustomer) -> CustomerRecord {
        self.last_customer_id += 1;
        let record = CustomerRecord {
            id: CustomerId::new(self.last_customer_id),
            name: customer.name.clone(),
            date_of_birth: customer.date_of_birth.clone(),
        };
        self.customers.insert(record.id, record.clone());
        record
    }

    fn insert_child(
        &mut self,
        kind: ChildKind,
        customer_id: CustomerId,
        value: &str,
    ) -> Result<ChildRecord> {
        if !self.customers.contains_key(&customer_id) {
            return Err(StoreError::ForeignKeyViolation {
                constraint: format!("{}_customer_id_fkey", kind.table()),
            });
        }

        // Same constraint names as the PostgreSQL schema.
        let duplicate = self.children.iter().any(|c| {
            c.kind == kind
                && c.value == value
                && (kind.is_globally_unique() || c.customer_id == customer_id)
        });
        if duplicate {
            let constraint = if kind.is_globally_unique() {
                format!("{}_{}_key", kind.table(), kind.value_column())
            } else {
                format!("{}_customer_id_{}_key", kind.table(), kind.value_column())
            };
            return Err(StoreError::UniqueViolation { constraint });
        }

        self.last_child_id += 1;
        let child = ChildRecord {
            id: ChildId::new(self.last_child_id),
            customer_id,
            kind,
            value: value.to_string(),
        };
        self.children.push(child.clone());
        Ok(child)
    }
}

/// Failures and delays injected by tests.
#[derive(Debug, Default)]
struct Faults {
    fail_next_insert: HashSet<ChildKind>,
    latency: Option<Duration>,
    insert_latency: Option<Duration>,
    commit_latency: Option<Duration>,
}

fn lock_faults(faults: &StdMutex<Faults>) -> MutexGuard<'_, Faults> {
    faults.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-memory customer store implementation for testing.
///
/// Enforces the same foreign key, uniqueness and cascade rules as the
/// PostgreSQL schema. Units of work are fully serialized: `begin` takes the
/// store lock and works on a private copy of the tables that replaces the
/// shared copy on commit.
#[derive(Clone, Default)]
pub struct InMemoryCustomerStore {
    tables: Arc<Mutex<Tables>>,
    faults: Arc<StdMutex<Faults>>,
}

impl InMemoryCustomerStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next insert of `kind` fail with a backend error.
    pub fn fail_next_insert(&self, kind: ChildKind) {
        self.faults().fail_next_insert.insert(kind);
    }

    /// Delays opening units of work and every ambient read by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.faults().latency = latency;
    }

    /// Delays every child insert by `latency`.
    ///
    /// The delay happens inside the unit of work, after any earlier writes
    /// of that unit of work have been applied to its working set.
    pub fn set_insert_latency(&self, latency: Option<Duration>) {
        self.faults().insert_latency = latency;
    }

    /// Delays every commit by `latency` before the working set is published.
    pub fn set_commit_latency(&self, latency: Option<Duration>) {
        self.faults().commit_latency = latency;
    }

    /// Returns the number of stored customers.
    pub async fn customer_count(&self) -> usize {
        self.tables.lock().await.customers.len()
    }

    /// Returns the number of stored child rows of every kind.
    pub async fn child_count(&self) -> usize {
        self.tables.lock().await.children.len()
    }

    fn faults(&self) -> MutexGuard<'_, Faults> {
        lock_faults(&self.faults)
    }

    async fn delay(&self) {
        let latency = self.faults().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl CustomerStore for InMemoryCustomerStore {
    type UnitOfWork = InMemoryUnitOfWork;

    async fn begin(&self) -> Result<InMemoryUnitOfWork> {
        self.delay().await;
        let guard = self.tables.clone().lock_owned().await;
        let working = guard.clone();
        Ok(InMemoryUnitOfWork {
            guard,
            working,
            faults: self.faults.clone(),
        })
    }

    async fn get_customer(&self, id: CustomerId) -> Result<Option<Customer>> {
        self.delay().await;
        Ok(self.tables.lock().await.load(id))
    }

    async fn list_customers(&self) -> Result<Vec<Customer>> {
        self.delay().await;
        Ok(self.tables.lock().await.load_all())
    }

    async fn find_customer_by_child(
        &self,
        kind: ChildKind,
        value: &str,
    ) -> Result<Option<Customer>> {
        self.delay().await;
        let tables = self.tables.lock().await;
        Ok(tables.owner_of(kind, value).and_then(|id| tables.load(id)))
    }
}

/// Unit of work over [`InMemoryCustomerStore`].
///
/// Holds the store lock for its whole lifetime.
pub struct InMemoryUnitOfWork {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
    faults: Arc<StdMutex<Faults>>,
}

impl InMemoryUnitOfWork {
    fn take_injected_failure(&self, kind: ChildKind) -> bool {
        lock_faults(&self.faults).fail_next_insert.remove(&kind)
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn insert_customer(&mut self, customer: &NewCustomer) -> Result<CustomerRecord> {
        Ok(self.working.insert_customer(customer))
    }

    async fn fetch_customer(&mut self, id: CustomerId) -> Result<Option<CustomerRecord>> {
        Ok(self.working.customers.get(&id).cloned())
    }

    async fn lock_customer(&mut self, id: CustomerId) -> Result<Option<CustomerRecord>> {
        // The whole store is already locked.
        Ok(self.working.customers.get(&id).cloned())
    }

    async fn load_customer(&mut self, id: CustomerId) -> Result<Option<Customer>> {
        Ok(self.working.load(id))
    }

    async fn update_customer(
        &mut self,
        id: CustomerId,
        patch: &CustomerPatch,
    ) -> Result<Option<CustomerRecord>> {
        Ok(self.working.customers.get_mut(&id).map(|record| {
            patch.apply_to(record);
            record.clone()
        }))
    }

    async fn delete_customer(&mut self, id: CustomerId) -> Result<bool> {
        if self.working.customers.remove(&id).is_none() {
            return Ok(false);
        }
        self.working.children.retain(|c| c.customer_id != id);
        Ok(true)
    }

    async fn insert_child(
        &mut self,
        kind: ChildKind,
        customer_id: CustomerId,
        value: &str,
    ) -> Result<ChildRecord> {
        if self.take_injected_failure(kind) {
            tracing::debug!(%kind, "injected insert failure");
            return Err(StoreError::Backend(format!("injected failure inserting {kind}")));
        }
        let latency = lock_faults(&self.faults).insert_latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        self.working.insert_child(kind, customer_id, value)
    }

    async fn delete_child(
        &mut self,
        kind: ChildKind,
        customer_id: CustomerId,
        value: &str,
    ) -> Result<bool> {
        let position = self
            .working
            .children
            .iter()
            .position(|c| c.kind == kind && c.customer_id == customer_id && c.value == value);
        match position {
            Some(index) => {
                self.working.children.remove(index);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn child_values(
        &mut self,
        kind: ChildKind,
        customer_id: CustomerId,
    ) -> Result<Vec<String>> {
        Ok(self
            .working
            .children
            .iter()
            .filter(|c| c.kind == kind && c.customer_id == customer_id)
            .map(|c| c.value.clone())
            .collect())
    }

    async fn has_child(
        &mut self,
        kind: ChildKind,
        customer_id: CustomerId,
        value: &str,
    ) -> Result<bool> {
        Ok(self
            .working
            .children
            .iter()
            .any(|c| c.kind == kind && c.customer_id == customer_id && c.value == value))
    }

    async fn child_owner(&mut self, kind: ChildKind, value: &str) -> Result<Option<CustomerId>> {
        Ok(self.working.owner_of(kind, value))
    }

    async fn commit(self) -> Result<()> {
        let latency = lock_faults(&self.faults).commit_latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        let Self {
            mut guard, working, ..
        } = self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}
