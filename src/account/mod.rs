mod dto;
mod mapper;
mod memory;
mod repository;
mod service;

pub use dto::*;
pub use memory::*;
pub use repository::*;
pub use service::*;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Name written in the audit columns.
pub const AUDITOR: &str = "ACCOUNTS_MS";

/// Audit columns shared by every table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Audit {
    pub created_at: NaiveDateTime,
    pub created_by: String,
    pub updated_at: Option<NaiveDateTime>,
    pub updated_by: Option<String>,
}

impl Audit {
    /// Audit of a row inserted now.
    pub fn created() -> Self {
        Self {
            created_at: chrono::Utc::now().naive_utc(),
            created_by: AUDITOR.to_owned(),
            updated_at: None,
            updated_by: None,
        }
    }

    /// Mark the row as modified now.
    pub fn touch(&mut self) {
        self.updated_at = Some(chrono::Utc::now().naive_utc());
        self.updated_by = Some(AUDITOR.to_owned());
    }
}

impl Default for Audit {
    fn default() -> Self {
        Self::created()
    }
}

/// Customer as saved on database.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Customer {
    /// Assigned by the store on insert.
    pub customer_id: i64,
    pub name: String,
    pub email: String,
    pub mobile_number: String,
    #[sqlx(flatten)]
    #[serde(skip)]
    pub audit: Audit,
}

/// Account owned by exactly one [`Customer`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Account {
    pub account_number: i64,
    pub customer_id: i64,
    pub account_type: String,
    pub branch_address: String,
    pub communication_sw: bool,
    #[sqlx(flatten)]
    #[serde(skip)]
    pub audit: Audit,
}
