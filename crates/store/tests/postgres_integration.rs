//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container and truncate the tables
//! before each test, so they are serialized. Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration
//! ```

use std::sync::Arc;

use serial_test::serial;
use sqlx::PgPool;
use store::{
    ChildKind, CustomerId, CustomerPatch, CustomerStore, NewCustomer, PostgresCustomerStore,
    StoreError, UnitOfWork,
};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            PostgresCustomerStore::new(temp_pool.clone())
                .run_migrations()
                .await
                .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresCustomerStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE customers, emails, phone_numbers, addresses RESTART IDENTITY")
        .execute(&pool)
        .await
        .unwrap();

    PostgresCustomerStore::new(pool)
}

async fn seed_customer(store: &PostgresCustomerStore, name: &str) -> CustomerId {
    let mut uow = store.begin().await.unwrap();
    let record = uow
        .insert_customer(&NewCustomer::new(name).date_of_birth("2000-01-01"))
        .await
        .unwrap();
    uow.commit().await.unwrap();
    record.id
}

async fn add_child(store: &PostgresCustomerStore, kind: ChildKind, id: CustomerId, value: &str) {
    let mut uow = store.begin().await.unwrap();
    uow.insert_child(kind, id, value).await.unwrap();
    uow.commit().await.unwrap();
}

#[tokio::test]
#[serial]
async fn insert_and_load_customer_with_children() {
    let store = get_test_store().await;
    let id = seed_customer(&store, "Alice").await;

    add_child(&store, ChildKind::Email, id, "alice@x.com").await;
    add_child(&store, ChildKind::PhoneNumber, id, "111111111").await;
    add_child(&store, ChildKind::Address, id, "123 Main St").await;

    let customer = store.get_customer(id).await.unwrap().unwrap();
    assert_eq!(customer.name, "Alice");
    assert_eq!(customer.date_of_birth.as_deref(), Some("2000-01-01"));
    assert_eq!(customer.values(ChildKind::Email), vec!["alice@x.com"]);
    assert_eq!(customer.values(ChildKind::PhoneNumber), vec!["111111111"]);
    assert_eq!(customer.values(ChildKind::Address), vec!["123 Main St"]);
}

#[tokio::test]
#[serial]
async fn get_missing_customer_returns_none() {
    let store = get_test_store().await;

    let customer = store.get_customer(CustomerId::new(12345)).await.unwrap();
    assert!(customer.is_none());
}

#[tokio::test]
#[serial]
async fn list_customers_groups_children_by_owner() {
    let store = get_test_store().await;
    let alice = seed_customer(&store, "Alice").await;
    let bob = seed_customer(&store, "Bob").await;

    add_child(&store, ChildKind::Email, alice, "alice@example.com").await;
    add_child(&store, ChildKind::Email, bob, "bob@example.com").await;
    add_child(&store, ChildKind::Email, alice, "alice.work@example.com").await;

    let customers = store.list_customers().await.unwrap();
    assert_eq!(customers.len(), 2);
    assert_eq!(customers[0].id, alice);
    assert_eq!(
        customers[0].values(ChildKind::Email),
        vec!["alice@example.com", "alice.work@example.com"]
    );
    assert_eq!(customers[1].values(ChildKind::Email), vec!["bob@example.com"]);
}

#[tokio::test]
#[serial]
async fn dropped_unit_of_work_rolls_back() {
    let store = get_test_store().await;

    {
        let mut uow = store.begin().await.unwrap();
        let record = uow.insert_customer(&NewCustomer::new("Dana")).await.unwrap();
        uow.insert_child(ChildKind::Email, record.id, "dana@x.com")
            .await
            .unwrap();
    }

    assert!(store.list_customers().await.unwrap().is_empty());
}

#[tokio::test]
#[serial]
async fn email_unique_constraint_is_classified() {
    let store = get_test_store().await;
    let alice = seed_customer(&store, "Alice").await;
    let bob = seed_customer(&store, "Bob").await;
    add_child(&store, ChildKind::Email, alice, "shared@x.com").await;

    let mut uow = store.begin().await.unwrap();
    let result = uow.insert_child(ChildKind::Email, bob, "shared@x.com").await;

    assert!(matches!(
        result,
        Err(StoreError::UniqueViolation { ref constraint }) if constraint == "emails_email_key"
    ));
}

#[tokio::test]
#[serial]
async fn addresses_may_repeat_across_customers() {
    let store = get_test_store().await;
    let alice = seed_customer(&store, "Alice").await;
    let bob = seed_customer(&store, "Bob").await;

    add_child(&store, ChildKind::Address, alice, "1 Shared Rd").await;
    add_child(&store, ChildKind::Address, bob, "1 Shared Rd").await;

    let mut uow = store.begin().await.unwrap();
    let duplicate = uow
        .insert_child(ChildKind::Address, alice, "1 Shared Rd")
        .await;
    assert!(matches!(duplicate, Err(StoreError::UniqueViolation { .. })));
}

#[tokio::test]
#[serial]
async fn foreign_key_violation_is_classified() {
    let store = get_test_store().await;

    let mut uow = store.begin().await.unwrap();
    let result = uow
        .insert_child(ChildKind::PhoneNumber, CustomerId::new(999), "000")
        .await;

    assert!(matches!(result, Err(StoreError::ForeignKeyViolation { .. })));
}

#[tokio::test]
#[serial]
async fn update_customer_assigns_present_fields_only() {
    let store = get_test_store().await;
    let id = seed_customer(&store, "Alice").await;

    let mut uow = store.begin().await.unwrap();
    let updated = uow
        .update_customer(id, &CustomerPatch::new().name("Alicia"))
        .await
        .unwrap()
        .unwrap();
    let unchanged = uow
        .update_customer(id, &CustomerPatch::new())
        .await
        .unwrap()
        .unwrap();
    uow.commit().await.unwrap();

    assert_eq!(updated.name, "Alicia");
    assert_eq!(updated.date_of_birth.as_deref(), Some("2000-01-01"));
    assert_eq!(unchanged, updated);
}

#[tokio::test]
#[serial]
async fn delete_customer_cascades_to_children() {
    let store = get_test_store().await;
    let id = seed_customer(&store, "Alice").await;
    add_child(&store, ChildKind::Email, id, "alice@x.com").await;

    let mut uow = store.begin().await.unwrap();
    assert!(uow.delete_customer(id).await.unwrap());
    uow.commit().await.unwrap();

    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM emails")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(remaining, 0);
    assert!(
        store
            .find_customer_by_child(ChildKind::Email, "alice@x.com")
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
#[serial]
async fn delete_child_and_list_values() {
    let store = get_test_store().await;
    let id = seed_customer(&store, "Charlie").await;
    add_child(&store, ChildKind::PhoneNumber, id, "333333333").await;
    add_child(&store, ChildKind::PhoneNumber, id, "444444444").await;

    let mut uow = store.begin().await.unwrap();
    assert!(
        uow.delete_child(ChildKind::PhoneNumber, id, "333333333")
            .await
            .unwrap()
    );
    assert!(
        !uow.delete_child(ChildKind::PhoneNumber, id, "333333333")
            .await
            .unwrap()
    );
    assert!(
        uow.has_child(ChildKind::PhoneNumber, id, "444444444")
            .await
            .unwrap()
    );
    assert_eq!(
        uow.child_values(ChildKind::PhoneNumber, id).await.unwrap(),
        vec!["444444444"]
    );
    uow.commit().await.unwrap();
}

#[tokio::test]
#[serial]
async fn find_customer_by_phone_number() {
    let store = get_test_store().await;
    let id = seed_customer(&store, "Charlie").await;
    add_child(&store, ChildKind::PhoneNumber, id, "333333333").await;

    let found = store
        .find_customer_by_child(ChildKind::PhoneNumber, "333333333")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, id);
    assert_eq!(found.values(ChildKind::PhoneNumber), vec!["333333333"]);
}

#[tokio::test]
#[serial]
async fn lock_customer_reads_row() {
    let store = get_test_store().await;
    let id = seed_customer(&store, "Alice").await;

    let mut uow = store.begin().await.unwrap();
    let locked = uow.lock_customer(id).await.unwrap().unwrap();
    let missing = uow.lock_customer(CustomerId::new(999)).await.unwrap();
    uow.rollback().await.unwrap();

    assert_eq!(locked.name, "Alice");
    assert!(missing.is_none());
}

#[tokio::test]
#[serial]
async fn lock_customer_serializes_duplicate_checks() {
    let store = get_test_store().await;
    let id = seed_customer(&store, "Alice").await;

    let mut first = store.begin().await.unwrap();
    first.lock_customer(id).await.unwrap().unwrap();
    assert!(
        !first
            .has_child(ChildKind::Address, id, "1 Shared Rd")
            .await
            .unwrap()
    );

    let contender = store.clone();
    let second = tokio::spawn(async move {
        let mut uow = contender.begin().await.unwrap();
        uow.lock_customer(id).await.unwrap().unwrap();
        let duplicate = uow
            .has_child(ChildKind::Address, id, "1 Shared Rd")
            .await
            .unwrap();
        uow.rollback().await.unwrap();
        duplicate
    });

    // The second unit of work must wait on the row lock.
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    assert!(!second.is_finished());

    first
        .insert_child(ChildKind::Address, id, "1 Shared Rd")
        .await
        .unwrap();
    first.commit().await.unwrap();

    assert!(second.await.unwrap());
}

#[tokio::test]
#[serial]
async fn fetch_customer_does_not_block_on_lock() {
    let store = get_test_store().await;
    let id = seed_customer(&store, "Alice").await;

    let mut locker = store.begin().await.unwrap();
    locker.lock_customer(id).await.unwrap().unwrap();

    let mut reader = store.begin().await.unwrap();
    let fetched = tokio::time::timeout(
        std::time::Duration::from_secs(2),
        reader.fetch_customer(id),
    )
    .await
    .expect("plain read waited on the row lock")
    .unwrap();
    assert_eq!(fetched.unwrap().name, "Alice");

    reader.rollback().await.unwrap();
    locker.rollback().await.unwrap();
}
