use axum::Json;
use axum::extract::State;

use crate::account::{AccountService, MESSAGE_200, ResponseDto, STATUS_200};
use crate::error::Result;
use crate::router::PathParam;

/// Handler flipping the communication switch of an account.
pub async fn handler(
    State(accounts): State<AccountService>,
    PathParam(account_number): PathParam<i64>,
) -> Result<Json<ResponseDto>> {
    accounts.update_communication_status(account_number).await?;

    Ok(Json(ResponseDto::new(STATUS_200, MESSAGE_200)))
}
