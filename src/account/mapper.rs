//! Field-by-field transcription between wire and storage records.

use super::{Account, AccountsDto, AccountsMessage, Customer, CustomerDto};

impl From<&Customer> for CustomerDto {
    fn from(customer: &Customer) -> Self {
        Self {
            name: customer.name.clone(),
            email: customer.email.clone(),
            mobile_number: customer.mobile_number.clone(),
            accounts_dto: None,
        }
    }
}

impl From<&Account> for AccountsDto {
    fn from(account: &Account) -> Self {
        Self {
            account_number: account.account_number,
            account_type: account.account_type.clone(),
            branch_address: account.branch_address.clone(),
            communication_sw: Some(account.communication_sw),
        }
    }
}

impl Customer {
    /// Copy caller-supplied attributes, keeping identity and audit.
    pub fn apply(&mut self, dto: &CustomerDto) {
        self.name.clone_from(&dto.name);
        self.email.clone_from(&dto.email);
        self.mobile_number.clone_from(&dto.mobile_number);
    }
}

impl Account {
    /// Copy caller-supplied attributes. The account number is the lookup key
    /// and the owner never changes.
    pub fn apply(&mut self, dto: &AccountsDto) {
        self.account_type.clone_from(&dto.account_type);
        self.branch_address.clone_from(&dto.branch_address);
        if let Some(communication_sw) = dto.communication_sw {
            self.communication_sw = communication_sw;
        }
    }
}

impl AccountsMessage {
    pub fn new(account: &Account, customer: &Customer) -> Self {
        Self {
            account_number: account.account_number,
            name: customer.name.clone(),
            email: customer.email.clone(),
            mobile_number: customer.mobile_number.clone(),
        }
    }
}

/// Build the composite view of a customer and its account.
pub fn to_composite(customer: &Customer, account: &Account) -> CustomerDto {
    CustomerDto {
        accounts_dto: Some(AccountsDto::from(account)),
        ..CustomerDto::from(customer)
    }
}
