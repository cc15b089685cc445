pub mod error;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod store;

pub use common::{ChildId, ChildKind, CustomerId};
pub use error::{Result, StoreError};
pub use memory::InMemoryCustomerStore;
pub use model::{ChildRecord, Customer, CustomerPatch, CustomerRecord, NewCustomer};
pub use postgres::{PostgresCustomerStore, PostgresUnitOfWork};
pub use store::{CustomerStore, UnitOfWork};
