//! Domain layer for the customer service.
//!
//! This crate provides the customer aggregate service, which enforces the
//! aggregate's invariants over a [`store::CustomerStore`]:
//! - Non-empty names and child values
//! - Uniqueness of emails and phone numbers across customers
//! - Atomic creation of a customer together with its details
//! - Caller deadlines on every operation

pub mod customer;
pub mod deadline;
pub mod error;

pub use customer::{CustomerDetails, CustomerService};
pub use deadline::Deadline;
pub use error::{DomainError, ErrorKind};
pub use store::{
    ChildKind, ChildRecord, Customer, CustomerId, CustomerPatch, CustomerStore,
    InMemoryCustomerStore, NewCustomer,
};
