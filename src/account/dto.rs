//! Wire-facing records.

use std::sync::LazyLock;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

pub const STATUS_201: &str = "201";
pub const MESSAGE_201: &str = "Account created successfully";
pub const STATUS_200: &str = "200";
pub const MESSAGE_200: &str = "Request processed successfully";
pub const STATUS_500: &str = "500";
pub const MESSAGE_500: &str =
    "An error occurred. Please try again or contact Dev team";

static MOBILE_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]{10}$").expect("mobile number pattern must compile")
});

/// Mobile numbers are exactly ten digits.
pub fn validate_mobile_number(value: &str) -> Result<(), ValidationError> {
    if MOBILE_NUMBER.is_match(value) {
        Ok(())
    } else {
        Err(ValidationError::new("mobile_number")
            .with_message("Mobile Number should have 10 digits".into()))
    }
}

/// Customer details paired with the details of its single account.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CustomerDto {
    #[validate(length(
        min = 5,
        max = 30,
        message = "The length of the customer name should be between 5 and 30"
    ))]
    pub name: String,
    #[validate(email(message = "Email address should be a valid value"))]
    pub email: String,
    #[validate(custom(function = "validate_mobile_number"))]
    pub mobile_number: String,
    #[validate(nested)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accounts_dto: Option<AccountsDto>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AccountsDto {
    #[validate(range(
        min = 1_000_000_000_i64,
        max = 9_999_999_999_i64,
        message = "AccountNumber must be 10 digits"
    ))]
    pub account_number: i64,
    #[validate(length(min = 1, message = "AccountType can not be a null or empty"))]
    pub account_type: String,
    #[validate(length(min = 1, message = "BranchAddress can not be a null or empty"))]
    pub branch_address: String,
    /// Left untouched on update when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub communication_sw: Option<bool>,
}

/// `?mobileNumber=` query parameter.
#[derive(Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MobileNumberQuery {
    #[validate(custom(function = "validate_mobile_number"))]
    pub mobile_number: String,
}

/// Message emitted towards the communication channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountsMessage {
    pub account_number: i64,
    pub name: String,
    pub email: String,
    pub mobile_number: String,
}

/// Body of every successful write.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseDto {
    pub status_code: String,
    pub status_message: String,
}

impl ResponseDto {
    pub fn new(status_code: &str, status_message: &str) -> Self {
        Self {
            status_code: status_code.to_owned(),
            status_message: status_message.to_owned(),
        }
    }
}
