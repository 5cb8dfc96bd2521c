use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;

use crate::account::{
    AccountService, CustomerDto, MESSAGE_200, MESSAGE_500, ResponseDto, STATUS_200, STATUS_500,
};
use crate::error::Result;
use crate::router::Valid;

/// Handler to update a customer and its account, located by account number.
pub async fn handler(
    State(accounts): State<AccountService>,
    Valid(body): Valid<CustomerDto>,
) -> Result<(StatusCode, Json<ResponseDto>)> {
    if accounts.update(body).await? {
        Ok((StatusCode::OK, Json(ResponseDto::new(STATUS_200, MESSAGE_200))))
    } else {
        Ok((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ResponseDto::new(STATUS_500, MESSAGE_500)),
        ))
    }
}
