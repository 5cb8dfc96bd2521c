use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;

use crate::account::{AccountService, CustomerDto, MESSAGE_201, ResponseDto, STATUS_201};
use crate::error::Result;
use crate::router::Valid;

/// Handler to create a customer and its account.
pub async fn handler(
    State(accounts): State<AccountService>,
    Valid(body): Valid<CustomerDto>,
) -> Result<(StatusCode, Json<ResponseDto>)> {
    accounts.create(body).await?;

    Ok((
        StatusCode::CREATED,
        Json(ResponseDto::new(STATUS_201, MESSAGE_201)),
    ))
}
