use axum::Json;
use axum::extract::State;

use crate::account::{AccountService, CustomerDto, MobileNumberQuery};
use crate::error::Result;
use crate::router::ValidQuery;

/// Handler returning the customer and account behind a mobile number.
pub async fn handler(
    State(accounts): State<AccountService>,
    ValidQuery(query): ValidQuery<MobileNumberQuery>,
) -> Result<Json<CustomerDto>> {
    Ok(Json(accounts.fetch(&query.mobile_number).await?))
}
