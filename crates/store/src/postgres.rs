use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::{
    PgConnection, PgPool, Postgres, Row, Transaction,
    postgres::{PgPoolOptions, PgRow},
};

use crate::{
    ChildId, ChildKind, ChildRecord, Customer, CustomerId, CustomerPatch, CustomerRecord,
    NewCustomer, Result,
    store::{CustomerStore, UnitOfWork},
};

/// PostgreSQL-backed customer store implementation.
#[derive(Clone)]
pub struct PostgresCustomerStore {
    pool: PgPool,
}

impl PostgresCustomerStore {
    /// Creates a new PostgreSQL customer store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool to `url` and wraps it in a store.
    ///
    /// Acquiring a connection fails with [`crate::StoreError::Timeout`] once
    /// `acquire_timeout` has passed.
    pub async fn connect(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(url)
            .await?;
        tracing::info!(max_connections, "connected to PostgreSQL");
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        tracing::info!("database migrations applied");
        Ok(())
    }
}

#[async_trait]
impl CustomerStore for PostgresCustomerStore {
    type UnitOfWork = PostgresUnitOfWork;

    async fn begin(&self) -> Result<PostgresUnitOfWork> {
        // READ COMMITTED (the server default); child mutations add a row
        // lock on the parent customer.
        let tx = self.pool.begin().await?;
        Ok(PostgresUnitOfWork { tx })
    }

    async fn get_customer(&self, id: CustomerId) -> Result<Option<Customer>> {
        let mut conn = self.pool.acquire().await?;
        load_customer(&mut conn, id).await
    }

    async fn list_customers(&self) -> Result<Vec<Customer>> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query("SELECT id, name, date_of_birth FROM customers ORDER BY id ASC")
            .fetch_all(&mut *conn)
            .await?;
        let records = rows
            .iter()
            .map(row_to_customer)
            .collect::<Result<Vec<_>>>()?;
        attach_children(&mut conn, records).await
    }

    async fn find_customer_by_child(
        &self,
        kind: ChildKind,
        value: &str,
    ) -> Result<Option<Customer>> {
        let mut conn = self.pool.acquire().await?;
        match child_owner(&mut conn, kind, value).await? {
            Some(id) => load_customer(&mut conn, id).await,
            None => Ok(None),
        }
    }
}

/// Unit of work backed by a PostgreSQL transaction.
///
/// Dropping it without committing rolls the transaction back.
pub struct PostgresUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PostgresUnitOfWork {
    async fn insert_customer(&mut self, customer: &NewCustomer) -> Result<CustomerRecord> {
        let row = sqlx::query(
            r#"
            INSERT INTO customers (name, date_of_birth)
            VALUES ($1, $2)
            RETURNING id, name, date_of_birth
            "#,
        )
        .bind(&customer.name)
        .bind(&customer.date_of_birth)
        .fetch_one(&mut *self.tx)
        .await?;

        row_to_customer(&row)
    }

    async fn fetch_customer(&mut self, id: CustomerId) -> Result<Option<CustomerRecord>> {
        fetch_customer_record(&mut self.tx, id).await
    }

    async fn lock_customer(&mut self, id: CustomerId) -> Result<Option<CustomerRecord>> {
        let row = sqlx::query("SELECT id, name, date_of_birth FROM customers WHERE id = $1 FOR UPDATE")
            .bind(id.as_i64())
            .fetch_optional(&mut *self.tx)
            .await?;

        row.as_ref().map(row_to_customer).transpose()
    }

    async fn load_customer(&mut self, id: CustomerId) -> Result<Option<Customer>> {
        load_customer(&mut self.tx, id).await
    }

    async fn update_customer(
        &mut self,
        id: CustomerId,
        patch: &CustomerPatch,
    ) -> Result<Option<CustomerRecord>> {
        let mut assignments = Vec::new();
        let mut param_count = 0;

        if patch.name.is_some() {
            param_count += 1;
            assignments.push(format!("name = ${param_count}"));
        }
        if patch.date_of_birth.is_some() {
            param_count += 1;
            assignments.push(format!("date_of_birth = ${param_count}"));
        }

        if assignments.is_empty() {
            return fetch_customer_record(&mut self.tx, id).await;
        }

        param_count += 1;
        let sql = format!(
            "UPDATE customers SET {} WHERE id = ${param_count} RETURNING id, name, date_of_birth",
            assignments.join(", ")
        );

        let mut query = sqlx::query(&sql);
        if let Some(name) = &patch.name {
            query = query.bind(name);
        }
        if let Some(date_of_birth) = &patch.date_of_birth {
            query = query.bind(date_of_birth);
        }

        let row = query
            .bind(id.as_i64())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(row_to_customer).transpose()
    }

    async fn delete_customer(&mut self, id: CustomerId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM customers WHERE id = $1")
            .bind(id.as_i64())
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_child(
        &mut self,
        kind: ChildKind,
        customer_id: CustomerId,
        value: &str,
    ) -> Result<ChildRecord> {
        let sql = format!(
            "INSERT INTO {table} (customer_id, {column}) VALUES ($1, $2) RETURNING id",
            table = kind.table(),
            column = kind.value_column(),
        );

        let id: i64 = sqlx::query_scalar(&sql)
            .bind(customer_id.as_i64())
            .bind(value)
            .fetch_one(&mut *self.tx)
            .await?;

        Ok(ChildRecord {
            id: ChildId::new(id),
            customer_id,
            kind,
            value: value.to_string(),
        })
    }

    async fn delete_child(
        &mut self,
        kind: ChildKind,
        customer_id: CustomerId,
        value: &str,
    ) -> Result<bool> {
        let sql = format!(
            r#"
            DELETE FROM {table}
            WHERE id = (
                SELECT id FROM {table}
                WHERE customer_id = $1 AND {column} = $2
                ORDER BY id ASC
                LIMIT 1
            )
            "#,
            table = kind.table(),
            column = kind.value_column(),
        );

        let result = sqlx::query(&sql)
            .bind(customer_id.as_i64())
            .bind(value)
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn child_values(
        &mut self,
        kind: ChildKind,
        customer_id: CustomerId,
    ) -> Result<Vec<String>> {
        let sql = format!(
            "SELECT {column} FROM {table} WHERE customer_id = $1 ORDER BY id ASC",
            table = kind.table(),
            column = kind.value_column(),
        );

        let values: Vec<String> = sqlx::query_scalar(&sql)
            .bind(customer_id.as_i64())
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(values)
    }

    async fn has_child(
        &mut self,
        kind: ChildKind,
        customer_id: CustomerId,
        value: &str,
    ) -> Result<bool> {
        let sql = format!(
            "SELECT EXISTS (SELECT 1 FROM {table} WHERE customer_id = $1 AND {column} = $2)",
            table = kind.table(),
            column = kind.value_column(),
        );

        let exists: bool = sqlx::query_scalar(&sql)
            .bind(customer_id.as_i64())
            .bind(value)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(exists)
    }

    async fn child_owner(&mut self, kind: ChildKind, value: &str) -> Result<Option<CustomerId>> {
        child_owner(&mut self.tx, kind, value).await
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

// Queries shared by pooled connections and transactions.

fn row_to_customer(row: &PgRow) -> Result<CustomerRecord> {
    Ok(CustomerRecord {
        id: CustomerId::new(row.try_get("id")?),
        name: row.try_get("name")?,
        date_of_birth: row.try_get("date_of_birth")?,
    })
}

async fn fetch_customer_record(
    conn: &mut PgConnection,
    id: CustomerId,
) -> Result<Option<CustomerRecord>> {
    let row = sqlx::query("SELECT id, name, date_of_birth FROM customers WHERE id = $1")
        .bind(id.as_i64())
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(row_to_customer).transpose()
}

async fn load_customer(conn: &mut PgConnection, id: CustomerId) -> Result<Option<Customer>> {
    match fetch_customer_record(conn, id).await? {
        Some(record) => Ok(attach_children(conn, vec![record]).await?.pop()),
        None => Ok(None),
    }
}

/// Loads the children of every record, one query per child relation.
async fn attach_children(
    conn: &mut PgConnection,
    records: Vec<CustomerRecord>,
) -> Result<Vec<Customer>> {
    if records.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<i64> = records.iter().map(|r| r.id.as_i64()).collect();
    let mut customers: Vec<Customer> = records.into_iter().map(Customer::from_record).collect();
    let positions: HashMap<CustomerId, usize> = customers
        .iter()
        .enumerate()
        .map(|(position, customer)| (customer.id, position))
        .collect();

    for kind in ChildKind::ALL {
        let sql = format!(
            "SELECT id, customer_id, {column} AS value FROM {table} WHERE customer_id = ANY($1) ORDER BY id ASC",
            table = kind.table(),
            column = kind.value_column(),
        );
        let rows = sqlx::query(&sql)
            .bind(ids.clone())
            .fetch_all(&mut *conn)
            .await?;

        for row in rows {
            let child = ChildRecord {
                id: ChildId::new(row.try_get("id")?),
                customer_id: CustomerId::new(row.try_get("customer_id")?),
                kind,
                value: row.try_get("value")?,
            };
            if let Some(&position) = positions.get(&child.customer_id) {
                customers[position].push_child(child);
            }
        }
    }

    Ok(customers)
}

async fn child_owner(
    conn: &mut PgConnection,
    kind: ChildKind,
    value: &str,
) -> Result<Option<CustomerId>> {
    let sql = format!(
        "SELECT customer_id FROM {table} WHERE {column} = $1 ORDER BY id ASC LIMIT 1",
        table = kind.table(),
        column = kind.value_column(),
    );

    let owner: Option<i64> = sqlx::query_scalar(&sql)
        .bind(value)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(owner.map(CustomerId::new))
}
