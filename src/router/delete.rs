use axum::Json;
use axum::extract::State;

use crate::account::{AccountService, MESSAGE_200, MobileNumberQuery, ResponseDto, STATUS_200};
use crate::error::Result;
use crate::router::ValidQuery;

/// Handler to delete the customer behind a mobile number, and its account.
pub async fn handler(
    State(accounts): State<AccountService>,
    ValidQuery(query): ValidQuery<MobileNumberQuery>,
) -> Result<Json<ResponseDto>> {
    accounts.delete(&query.mobile_number).await?;

    Ok(Json(ResponseDto::new(STATUS_200, MESSAGE_200)))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use crate::router::create::tests::body;
    use crate::*;

    #[tokio::test]
    async fn test_delete_handler() {
        let app = app(router::state(None));

        make_request(
            None,
            app.clone(),
            Method::POST,
            "/api/create",
            body("4354437687"),
        )
        .await;

        let response = make_request(
            None,
            app.clone(),
            Method::DELETE,
            "/api/delete?mobileNumber=4354437687",
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        // Customer must be deleted.
        let response = make_request(
            None,
            app.clone(),
            Method::GET,
            "/api/fetch?mobileNumber=4354437687",
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        // And the mobile number is free again.
        let response =
            make_request(None, app, Method::POST, "/api/create", body("4354437687")).await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_delete_unknown_customer() {
        let response = make_request(
            None,
            app(router::state(None)),
            Method::DELETE,
            "/api/delete?mobileNumber=4354437687",
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
