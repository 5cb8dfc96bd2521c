//! In-process [`Store`], used when no database is configured.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::account::{Account, Customer, Store};
use crate::error::{Entity, Result, ServerError};

#[derive(Default)]
struct Tables {
    next_customer_id: i64,
    customers: HashMap<i64, Customer>,
    accounts: HashMap<i64, Account>,
}

impl Tables {
    fn mobile_number_taken(&self, mobile_number: &str, except: Option<i64>) -> bool {
        self.customers.values().any(|customer| {
            customer.mobile_number == mobile_number
                && Some(customer.customer_id) != except
        })
    }
}

/// [`Store`] keeping both tables in memory behind a single lock, so every
/// unit of work is atomic.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of customer and account rows.
    pub async fn row_counts(&self) -> (usize, usize) {
        let tables = self.tables.read().await;
        (tables.customers.len(), tables.accounts.len())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_customer_by_mobile_number(
        &self,
        mobile_number: &str,
    ) -> Result<Option<Customer>> {
        let tables = self.tables.read().await;
        Ok(tables
            .customers
            .values()
            .find(|customer| customer.mobile_number == mobile_number)
            .cloned())
    }

    async fn find_customer_by_id(&self, customer_id: i64) -> Result<Option<Customer>> {
        Ok(self.tables.read().await.customers.get(&customer_id).cloned())
    }

    async fn find_account_by_number(&self, account_number: i64) -> Result<Option<Account>> {
        Ok(self.tables.read().await.accounts.get(&account_number).cloned())
    }

    async fn find_account_by_customer_id(&self, customer_id: i64) -> Result<Option<Account>> {
        let tables = self.tables.read().await;
        Ok(tables
            .accounts
            .values()
            .find(|account| account.customer_id == customer_id)
            .cloned())
    }

    async fn insert(
        &self,
        mut customer: Customer,
        mut account: Account,
    ) -> Result<(Customer, Account)> {
        let mut tables = self.tables.write().await;

        if tables.mobile_number_taken(&customer.mobile_number, None) {
            return Err(ServerError::DuplicateCustomer {
                mobile_number: customer.mobile_number,
            });
        }
        if tables.accounts.contains_key(&account.account_number) {
            return Err(ServerError::Internal {
                details: format!("account number {} already used", account.account_number),
                source: None,
            });
        }

        tables.next_customer_id += 1;
        customer.customer_id = tables.next_customer_id;
        account.customer_id = customer.customer_id;

        tables.customers.insert(customer.customer_id, customer.clone());
        tables.accounts.insert(account.account_number, account.clone());

        Ok((customer, account))
    }

    async fn update(&self, customer: &Customer, account: &Account) -> Result<()> {
        let mut tables = self.tables.write().await;

        if !tables.accounts.contains_key(&account.account_number) {
            return Err(ServerError::not_found(
                Entity::Account,
                "accountNumber",
                account.account_number,
            ));
        }
        if !tables.customers.contains_key(&customer.customer_id) {
            return Err(ServerError::not_found(
                Entity::Customer,
                "customerId",
                customer.customer_id,
            ));
        }
        if tables.mobile_number_taken(&customer.mobile_number, Some(customer.customer_id)) {
            return Err(ServerError::DuplicateCustomer {
                mobile_number: customer.mobile_number.clone(),
            });
        }

        tables.accounts.insert(account.account_number, account.clone());
        tables.customers.insert(customer.customer_id, customer.clone());

        Ok(())
    }

    async fn save_account(&self, account: &Account) -> Result<()> {
        let mut tables = self.tables.write().await;

        match tables.accounts.get_mut(&account.account_number) {
            Some(row) => {
                *row = account.clone();
                Ok(())
            },
            None => Err(ServerError::not_found(
                Entity::Account,
                "accountNumber",
                account.account_number,
            )),
        }
    }

    async fn delete(&self, customer_id: i64) -> Result<()> {
        let mut tables = self.tables.write().await;

        tables
            .accounts
            .retain(|_, account| account.customer_id != customer_id);
        tables.customers.remove(&customer_id);

        Ok(())
    }
}
