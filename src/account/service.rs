//! Account provisioning, query, update, delete and communication toggle.

use std::sync::Arc;

use axum::extract::FromRef;
use rand::Rng;

use crate::AppState;
use crate::account::mapper::to_composite;
use crate::account::{Account, AccountsMessage, Audit, Customer, CustomerDto, Store};
use crate::config::AccountDefaults;
use crate::error::{Entity, Result, ServerError};
use crate::messaging::{Publisher, Topic};

/// Lowest generated account number.
pub const ACCOUNT_NUMBER_BASE: i64 = 1_000_000_000;
/// Width of the generated range: numbers fall in `[1000000000, 1899999999]`.
pub const ACCOUNT_NUMBER_SPAN: i64 = 900_000_000;
const ACCOUNT_NUMBER_ATTEMPTS: usize = 10;

/// Draw a candidate account number.
pub fn generate_account_number<R: Rng>(rng: &mut R) -> i64 {
    ACCOUNT_NUMBER_BASE + rng.gen_range(0..ACCOUNT_NUMBER_SPAN)
}

/// Account workflows over a [`Store`] and a [`Publisher`].
#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn Store>,
    publisher: Arc<dyn Publisher>,
    defaults: AccountDefaults,
}

impl FromRef<AppState> for AccountService {
    fn from_ref(state: &AppState) -> AccountService {
        state.accounts.clone()
    }
}

impl AccountService {
    /// Create a new [`AccountService`].
    pub fn new(
        store: Arc<dyn Store>,
        publisher: Arc<dyn Publisher>,
        defaults: AccountDefaults,
    ) -> Self {
        Self {
            store,
            publisher,
            defaults,
        }
    }

    /// Create a customer and its account.
    ///
    /// Fails with [`ServerError::DuplicateCustomer`] when the mobile number is
    /// already registered. Events are dispatched in the background and never
    /// affect the result.
    pub async fn create(&self, dto: CustomerDto) -> Result<Account> {
        if self
            .store
            .find_customer_by_mobile_number(&dto.mobile_number)
            .await?
            .is_some()
        {
            return Err(ServerError::DuplicateCustomer {
                mobile_number: dto.mobile_number,
            });
        }

        let mut customer = Customer {
            audit: Audit::created(),
            ..Default::default()
        };
        customer.apply(&dto);

        let account = Account {
            account_number: self.unused_account_number().await?,
            account_type: self.defaults.account_type.clone(),
            branch_address: self.defaults.branch_address.clone(),
            communication_sw: true,
            audit: Audit::created(),
            ..Default::default()
        };

        let (customer, account) = self.store.insert(customer, account).await?;
        tracing::info!(
            customer_id = customer.customer_id,
            account_number = account.account_number,
            "account created"
        );
        metrics::counter!("accounts_created_total").increment(1);

        self.send_communication(&account, &customer);
        self.dispatch(
            Topic::AccountCreated,
            format!(
                "Account created with account number: {}",
                account.account_number
            )
            .into_bytes(),
        );

        Ok(account)
    }

    /// Draw account numbers until one is free.
    async fn unused_account_number(&self) -> Result<i64> {
        for _ in 0..ACCOUNT_NUMBER_ATTEMPTS {
            let candidate = generate_account_number(&mut rand::thread_rng());
            if self.store.find_account_by_number(candidate).await?.is_none() {
                return Ok(candidate);
            }
            tracing::debug!(candidate, "account number collision");
        }

        Err(ServerError::Internal {
            details: "no free account number".to_owned(),
            source: None,
        })
    }

    /// Records are already stored: failures here are logged, never returned.
    fn send_communication(&self, account: &Account, customer: &Customer) {
        if !account.communication_sw {
            return;
        }

        let message = AccountsMessage::new(account, customer);
        tracing::info!(?message, "sending communication request");
        match serde_json::to_vec(&message) {
            Ok(payload) => self.dispatch(Topic::Communication, payload),
            Err(err) => {
                tracing::error!(error = %err, ?message, "cannot encode communication request")
            },
        }
    }

    /// Publish on a detached task. Only the log sees the outcome.
    fn dispatch(&self, topic: Topic, payload: Vec<u8>) {
        let publisher = Arc::clone(&self.publisher);
        tokio::spawn(async move {
            let delivered = publisher.publish(topic, payload).await;
            metrics::counter!(
                "communication_events_total",
                "delivered" => delivered.to_string()
            )
            .increment(1);
            tracing::info!(?topic, delivered, "is the event successfully triggered?");
        });
    }

    /// Fetch the composite record of the customer owning `mobile_number`.
    pub async fn fetch(&self, mobile_number: &str) -> Result<CustomerDto> {
        let customer = self
            .store
            .find_customer_by_mobile_number(mobile_number)
            .await?
            .ok_or_else(|| {
                ServerError::not_found(Entity::Customer, "mobileNumber", mobile_number)
            })?;
        let account = self
            .store
            .find_account_by_customer_id(customer.customer_id)
            .await?
            .ok_or_else(|| {
                ServerError::not_found(Entity::Account, "customerId", customer.customer_id)
            })?;

        Ok(to_composite(&customer, &account))
    }

    /// Update an account and its owner.
    ///
    /// Returns `false` without touching the store when the account part is
    /// absent.
    pub async fn update(&self, dto: CustomerDto) -> Result<bool> {
        let Some(accounts_dto) = &dto.accounts_dto else {
            return Ok(false);
        };

        let mut account = self
            .store
            .find_account_by_number(accounts_dto.account_number)
            .await?
            .ok_or_else(|| {
                ServerError::not_found(
                    Entity::Account,
                    "accountNumber",
                    accounts_dto.account_number,
                )
            })?;
        let mut customer = self
            .store
            .find_customer_by_id(account.customer_id)
            .await?
            .ok_or_else(|| {
                ServerError::not_found(Entity::Customer, "customerId", account.customer_id)
            })?;

        account.apply(accounts_dto);
        account.audit.touch();
        customer.apply(&dto);
        customer.audit.touch();

        self.store.update(&customer, &account).await?;
        tracing::info!(account_number = account.account_number, "account updated");

        Ok(true)
    }

    /// Delete the customer owning `mobile_number` together with its account.
    pub async fn delete(&self, mobile_number: &str) -> Result<bool> {
        let customer = self
            .store
            .find_customer_by_mobile_number(mobile_number)
            .await?
            .ok_or_else(|| {
                ServerError::not_found(Entity::Customer, "mobileNumber", mobile_number)
            })?;

        self.store.delete(customer.customer_id).await?;
        tracing::info!(customer_id = customer.customer_id, "account deleted");

        Ok(true)
    }

    /// Flip the communication switch of an account.
    pub async fn update_communication_status(&self, account_number: i64) -> Result<()> {
        let mut account = self
            .store
            .find_account_by_number(account_number)
            .await?
            .ok_or_else(|| {
                ServerError::not_found(Entity::Account, "accountNumber", account_number)
            })?;

        account.communication_sw = !account.communication_sw;
        account.audit.touch();
        self.store.save_account(&account).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::time::timeout;

    use super::*;
    use crate::account::{AccountsDto, MemoryStore};
    use crate::messaging::testing::RecordingPublisher;

    const MOBILE_NUMBER: &str = "4354437687";

    /// Store holding at most one row per table, with no link enforced
    /// between them.
    #[derive(Default)]
    struct OrphanStore {
        customer: Option<Customer>,
        account: Option<Account>,
    }

    #[async_trait::async_trait]
    impl Store for OrphanStore {
        async fn find_customer_by_mobile_number(
            &self,
            mobile_number: &str,
        ) -> Result<Option<Customer>> {
            Ok(self
                .customer
                .clone()
                .filter(|customer| customer.mobile_number == mobile_number))
        }

        async fn find_customer_by_id(&self, customer_id: i64) -> Result<Option<Customer>> {
            Ok(self
                .customer
                .clone()
                .filter(|customer| customer.customer_id == customer_id))
        }

        async fn find_account_by_number(&self, account_number: i64) -> Result<Option<Account>> {
            Ok(self
                .account
                .clone()
                .filter(|account| account.account_number == account_number))
        }

        async fn find_account_by_customer_id(
            &self,
            customer_id: i64,
        ) -> Result<Option<Account>> {
            Ok(self
                .account
                .clone()
                .filter(|account| account.customer_id == customer_id))
        }

        async fn insert(
            &self,
            customer: Customer,
            account: Account,
        ) -> Result<(Customer, Account)> {
            Ok((customer, account))
        }

        async fn update(&self, _customer: &Customer, _account: &Account) -> Result<()> {
            Ok(())
        }

        async fn save_account(&self, _account: &Account) -> Result<()> {
            Ok(())
        }

        async fn delete(&self, _customer_id: i64) -> Result<()> {
            Ok(())
        }
    }

    fn orphan_service(store: OrphanStore) -> AccountService {
        let (publisher, _) = RecordingPublisher::new(true);
        AccountService::new(
            Arc::new(store),
            Arc::new(publisher),
            AccountDefaults::default(),
        )
    }

    struct Fixture {
        service: AccountService,
        store: Arc<MemoryStore>,
        events: UnboundedReceiver<(Topic, Vec<u8>)>,
    }

    fn fixture(delivered: bool) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let (publisher, events) = RecordingPublisher::new(delivered);
        let service = AccountService::new(
            store.clone(),
            Arc::new(publisher),
            AccountDefaults::default(),
        );

        Fixture {
            service,
            store,
            events,
        }
    }

    fn customer(mobile_number: &str) -> CustomerDto {
        CustomerDto {
            name: "Madan Reddy".into(),
            email: "tutor@eazybytes.com".into(),
            mobile_number: mobile_number.into(),
            accounts_dto: None,
        }
    }

    #[test]
    fn test_generated_account_numbers_are_ten_digits() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..10_000 {
            let number = generate_account_number(&mut rng);
            assert!((1_000_000_000..1_900_000_000).contains(&number));
            assert_eq!(number.to_string().len(), 10);
        }
    }

    #[tokio::test]
    async fn test_create_then_fetch() {
        let Fixture { service, .. } = fixture(true);

        let account = service.create(customer(MOBILE_NUMBER)).await.unwrap();
        assert!(account.communication_sw);

        let dto = service.fetch(MOBILE_NUMBER).await.unwrap();
        assert_eq!(dto.name, "Madan Reddy");
        assert_eq!(dto.mobile_number, MOBILE_NUMBER);

        let accounts_dto = dto.accounts_dto.unwrap();
        assert_eq!(accounts_dto.account_number, account.account_number);
        assert_eq!(accounts_dto.account_type, "Savings");
        assert!(!accounts_dto.branch_address.is_empty());
        assert_eq!(accounts_dto.communication_sw, Some(true));
    }

    #[tokio::test]
    async fn test_create_duplicate_leaves_store_unchanged() {
        let Fixture { service, store, .. } = fixture(true);
        service.create(customer(MOBILE_NUMBER)).await.unwrap();

        let err = service.create(customer(MOBILE_NUMBER)).await.unwrap_err();

        assert!(matches!(
            err,
            ServerError::DuplicateCustomer { ref mobile_number } if mobile_number == MOBILE_NUMBER
        ));
        assert_eq!(store.row_counts().await, (1, 1));
    }

    #[tokio::test]
    async fn test_create_emits_events() {
        let Fixture {
            service,
            mut events,
            ..
        } = fixture(true);
        let account = service.create(customer(MOBILE_NUMBER)).await.unwrap();

        let mut received = Vec::new();
        for _ in 0..2 {
            let event = timeout(Duration::from_secs(1), events.recv())
                .await
                .unwrap()
                .unwrap();
            received.push(event);
        }

        let (_, payload) = received
            .iter()
            .find(|(topic, _)| *topic == Topic::Communication)
            .unwrap();
        let message: AccountsMessage = serde_json::from_slice(payload).unwrap();
        assert_eq!(message.account_number, account.account_number);
        assert_eq!(message.email, "tutor@eazybytes.com");
        assert_eq!(message.mobile_number, MOBILE_NUMBER);

        let (_, payload) = received
            .iter()
            .find(|(topic, _)| *topic == Topic::AccountCreated)
            .unwrap();
        assert_eq!(
            String::from_utf8_lossy(payload),
            format!(
                "Account created with account number: {}",
                account.account_number
            )
        );
    }

    #[tokio::test]
    async fn test_undelivered_event_keeps_records() {
        let Fixture { service, store, .. } = fixture(false);

        service.create(customer(MOBILE_NUMBER)).await.unwrap();

        assert_eq!(store.row_counts().await, (1, 1));
    }

    #[tokio::test]
    async fn test_fetch_unknown_customer() {
        let Fixture { service, .. } = fixture(true);

        let err = service.fetch(MOBILE_NUMBER).await.unwrap_err();

        assert!(matches!(
            err,
            ServerError::NotFound {
                entity: Entity::Customer,
                field: "mobileNumber",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_update_without_account_is_noop() {
        let Fixture { service, store, .. } = fixture(true);
        service.create(customer(MOBILE_NUMBER)).await.unwrap();

        let mut dto = customer(MOBILE_NUMBER);
        dto.name = "Someone Else".into();

        assert!(!service.update(dto).await.unwrap());
        assert_eq!(service.fetch(MOBILE_NUMBER).await.unwrap().name, "Madan Reddy");
        assert_eq!(store.row_counts().await, (1, 1));
    }

    #[tokio::test]
    async fn test_update_persists_both_records() {
        let Fixture { service, .. } = fixture(true);
        let account = service.create(customer(MOBILE_NUMBER)).await.unwrap();

        let dto = CustomerDto {
            name: "Madan Reddy Jr".into(),
            email: "junior@eazybytes.com".into(),
            mobile_number: "4354437688".into(),
            accounts_dto: Some(AccountsDto {
                account_number: account.account_number,
                account_type: "Current".into(),
                branch_address: "1 Bank Street".into(),
                communication_sw: None,
            }),
        };
        assert!(service.update(dto).await.unwrap());

        let fetched = service.fetch("4354437688").await.unwrap();
        assert_eq!(fetched.name, "Madan Reddy Jr");
        assert_eq!(fetched.email, "junior@eazybytes.com");
        let accounts_dto = fetched.accounts_dto.unwrap();
        assert_eq!(accounts_dto.account_type, "Current");
        assert_eq!(accounts_dto.branch_address, "1 Bank Street");
        assert_eq!(accounts_dto.communication_sw, Some(true));

        assert!(matches!(
            service.fetch(MOBILE_NUMBER).await.unwrap_err(),
            ServerError::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_update_unknown_account() {
        let Fixture { service, .. } = fixture(true);
        let mut dto = customer(MOBILE_NUMBER);
        dto.accounts_dto = Some(AccountsDto {
            account_number: 1_234_567_890,
            account_type: "Savings".into(),
            branch_address: "123 Main Street, New York".into(),
            communication_sw: None,
        });

        let err = service.update(dto).await.unwrap_err();

        assert!(matches!(
            err,
            ServerError::NotFound {
                entity: Entity::Account,
                field: "accountNumber",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_delete_removes_both_records() {
        let Fixture { service, store, .. } = fixture(true);
        service.create(customer(MOBILE_NUMBER)).await.unwrap();

        assert!(service.delete(MOBILE_NUMBER).await.unwrap());

        assert_eq!(store.row_counts().await, (0, 0));
        assert!(matches!(
            service.fetch(MOBILE_NUMBER).await.unwrap_err(),
            ServerError::NotFound {
                entity: Entity::Customer,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_delete_unknown_customer() {
        let Fixture { service, .. } = fixture(true);

        assert!(matches!(
            service.delete(MOBILE_NUMBER).await.unwrap_err(),
            ServerError::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_toggle_is_not_idempotent() {
        let Fixture { service, .. } = fixture(true);
        let account = service.create(customer(MOBILE_NUMBER)).await.unwrap();
        let switch = |dto: CustomerDto| dto.accounts_dto.unwrap().communication_sw;

        // Once flips the switch.
        service
            .update_communication_status(account.account_number)
            .await
            .unwrap();
        assert_eq!(switch(service.fetch(MOBILE_NUMBER).await.unwrap()), Some(false));

        // Twice restores it.
        service
            .update_communication_status(account.account_number)
            .await
            .unwrap();
        assert_eq!(switch(service.fetch(MOBILE_NUMBER).await.unwrap()), Some(true));
    }

    #[tokio::test]
    async fn test_toggle_unknown_account() {
        let Fixture { service, .. } = fixture(true);

        assert!(matches!(
            service.update_communication_status(1_234_567_890).await.unwrap_err(),
            ServerError::NotFound {
                entity: Entity::Account,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_fetch_customer_without_account() {
        let service = orphan_service(OrphanStore {
            customer: Some(Customer {
                customer_id: 7,
                mobile_number: MOBILE_NUMBER.into(),
                ..Default::default()
            }),
            account: None,
        });

        let err = service.fetch(MOBILE_NUMBER).await.unwrap_err();

        assert!(matches!(
            err,
            ServerError::NotFound {
                entity: Entity::Account,
                field: "customerId",
                ref value,
            } if value == "7"
        ));
    }

    #[tokio::test]
    async fn test_update_account_without_owner() {
        let service = orphan_service(OrphanStore {
            customer: None,
            account: Some(Account {
                account_number: 1_234_567_890,
                customer_id: 7,
                ..Default::default()
            }),
        });
        let mut dto = customer(MOBILE_NUMBER);
        dto.accounts_dto = Some(AccountsDto {
            account_number: 1_234_567_890,
            account_type: "Savings".into(),
            branch_address: "123 Main Street, New York".into(),
            communication_sw: None,
        });

        let err = service.update(dto).await.unwrap_err();

        assert!(matches!(
            err,
            ServerError::NotFound {
                entity: Entity::Customer,
                field: "customerId",
                ref value,
            } if value == "7"
        ));
    }
}
