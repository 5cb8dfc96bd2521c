//! Handle database requests.

use async_trait::async_trait;
use sqlx::{Pool, Postgres};

use crate::account::{Account, Customer};
use crate::error::{Entity, Result, ServerError};

const MOBILE_NUMBER_CONSTRAINT: &str = "customer_mobile_number_key";

const CUSTOMER_COLUMNS: &str = "customer_id, name, email, mobile_number, \
    created_at, created_by, updated_at, updated_by";
const ACCOUNT_COLUMNS: &str = "account_number, customer_id, account_type, \
    branch_address, communication_sw, created_at, created_by, updated_at, updated_by";

/// Persistence of the customer and account tables.
///
/// Every write touching both tables is a single unit of work: either both
/// rows change or neither does.
#[async_trait]
pub trait Store: Send + Sync {
    /// Find a customer by its unique mobile number.
    async fn find_customer_by_mobile_number(
        &self,
        mobile_number: &str,
    ) -> Result<Option<Customer>>;

    /// Find a customer by primary key.
    async fn find_customer_by_id(&self, customer_id: i64) -> Result<Option<Customer>>;

    /// Find an account by primary key.
    async fn find_account_by_number(&self, account_number: i64) -> Result<Option<Account>>;

    /// Find the account owned by a customer.
    async fn find_account_by_customer_id(&self, customer_id: i64) -> Result<Option<Account>>;

    /// Insert a customer and its account. The store assigns `customer_id`
    /// and links the account to it.
    async fn insert(&self, customer: Customer, account: Account) -> Result<(Customer, Account)>;

    /// Persist both rows of an existing pair.
    async fn update(&self, customer: &Customer, account: &Account) -> Result<()>;

    /// Persist a single account row.
    async fn save_account(&self, account: &Account) -> Result<()>;

    /// Delete the account owned by `customer_id`, then the customer.
    async fn delete(&self, customer_id: i64) -> Result<()>;
}

/// [`Store`] backed by PostgreSQL.
#[derive(Clone)]
pub struct PostgresStore {
    pool: Pool<Postgres>,
}

impl PostgresStore {
    /// Create a new [`PostgresStore`].
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

/// Map a unique violation on the mobile number to [`ServerError::DuplicateCustomer`].
fn unique_mobile_number(err: sqlx::Error, mobile_number: &str) -> ServerError {
    let duplicate = err.as_database_error().is_some_and(|db_err| {
        db_err.is_unique_violation()
            && db_err.constraint() == Some(MOBILE_NUMBER_CONSTRAINT)
    });

    if duplicate {
        ServerError::DuplicateCustomer {
            mobile_number: mobile_number.to_owned(),
        }
    } else {
        err.into()
    }
}

/// A write that matched no row means the record vanished since its lookup.
fn single_row(rows_affected: u64, entity: Entity, field: &'static str, value: i64) -> Result<()> {
    if rows_affected == 0 {
        Err(ServerError::not_found(entity, field, value))
    } else {
        Ok(())
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn find_customer_by_mobile_number(
        &self,
        mobile_number: &str,
    ) -> Result<Option<Customer>> {
        let query = format!("SELECT {CUSTOMER_COLUMNS} FROM customer WHERE mobile_number = $1");

        Ok(sqlx::query_as::<_, Customer>(&query)
            .bind(mobile_number)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_customer_by_id(&self, customer_id: i64) -> Result<Option<Customer>> {
        let query = format!("SELECT {CUSTOMER_COLUMNS} FROM customer WHERE customer_id = $1");

        Ok(sqlx::query_as::<_, Customer>(&query)
            .bind(customer_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_account_by_number(&self, account_number: i64) -> Result<Option<Account>> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE account_number = $1");

        Ok(sqlx::query_as::<_, Account>(&query)
            .bind(account_number)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_account_by_customer_id(&self, customer_id: i64) -> Result<Option<Account>> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE customer_id = $1");

        Ok(sqlx::query_as::<_, Account>(&query)
            .bind(customer_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn insert(
        &self,
        mut customer: Customer,
        mut account: Account,
    ) -> Result<(Customer, Account)> {
        let mut tx = self.pool.begin().await?;

        customer.customer_id = sqlx::query_scalar::<_, i64>(
            r#"INSERT INTO customer (name, email, mobile_number, created_at, created_by)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING customer_id"#,
        )
        .bind(&customer.name)
        .bind(&customer.email)
        .bind(&customer.mobile_number)
        .bind(customer.audit.created_at)
        .bind(&customer.audit.created_by)
        .fetch_one(&mut *tx)
        .await
        .map_err(|err| unique_mobile_number(err, &customer.mobile_number))?;

        account.customer_id = customer.customer_id;
        sqlx::query(
            r#"INSERT INTO accounts (account_number, customer_id, account_type, branch_address,
                    communication_sw, created_at, created_by)
                VALUES ($1, $2, $3, $4, $5, $6, $7)"#,
        )
        .bind(account.account_number)
        .bind(account.customer_id)
        .bind(&account.account_type)
        .bind(&account.branch_address)
        .bind(account.communication_sw)
        .bind(account.audit.created_at)
        .bind(&account.audit.created_by)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok((customer, account))
    }

    async fn update(&self, customer: &Customer, account: &Account) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"UPDATE accounts
                SET account_type = $1, branch_address = $2, communication_sw = $3,
                    updated_at = $4, updated_by = $5
                WHERE account_number = $6"#,
        )
        .bind(&account.account_type)
        .bind(&account.branch_address)
        .bind(account.communication_sw)
        .bind(account.audit.updated_at)
        .bind(&account.audit.updated_by)
        .bind(account.account_number)
        .execute(&mut *tx)
        .await?;
        single_row(
            updated.rows_affected(),
            Entity::Account,
            "accountNumber",
            account.account_number,
        )?;

        let updated = sqlx::query(
            r#"UPDATE customer
                SET name = $1, email = $2, mobile_number = $3, updated_at = $4, updated_by = $5
                WHERE customer_id = $6"#,
        )
        .bind(&customer.name)
        .bind(&customer.email)
        .bind(&customer.mobile_number)
        .bind(customer.audit.updated_at)
        .bind(&customer.audit.updated_by)
        .bind(customer.customer_id)
        .execute(&mut *tx)
        .await
        .map_err(|err| unique_mobile_number(err, &customer.mobile_number))?;
        single_row(
            updated.rows_affected(),
            Entity::Customer,
            "customerId",
            customer.customer_id,
        )?;

        tx.commit().await?;

        Ok(())
    }

    async fn save_account(&self, account: &Account) -> Result<()> {
        let updated = sqlx::query(
            r#"UPDATE accounts
                SET account_type = $1, branch_address = $2, communication_sw = $3,
                    updated_at = $4, updated_by = $5
                WHERE account_number = $6"#,
        )
        .bind(&account.account_type)
        .bind(&account.branch_address)
        .bind(account.communication_sw)
        .bind(account.audit.updated_at)
        .bind(&account.audit.updated_by)
        .bind(account.account_number)
        .execute(&self.pool)
        .await?;

        single_row(
            updated.rows_affected(),
            Entity::Account,
            "accountNumber",
            account.account_number,
        )
    }

    async fn delete(&self, customer_id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(r#"DELETE FROM accounts WHERE customer_id = $1"#)
            .bind(customer_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(r#"DELETE FROM customer WHERE customer_id = $1"#)
            .bind(customer_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(())
    }
}
