//! Accounts HTTP API.
pub mod communication;
pub mod create;
pub mod delete;
pub mod fetch;
pub mod status;
pub mod update;

use axum::extract::{FromRequest, FromRequestParts, Path, Query, Request};
use axum::http::request::Parts;
use axum::routing::{delete, get, patch, post, put};
use axum::{Json, Router, middleware};
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::error::ServerError;
use crate::{AppState, gateway};

/// JSON body deserialized then validated.
#[derive(Debug, Clone, Copy, Default)]
pub struct Valid<T>(pub T);

impl<T, S> FromRequest<S> for Valid<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        value.validate()?;
        Ok(Valid(value))
    }
}

/// Query string deserialized then validated.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidQuery<T>(pub T);

impl<T, S> FromRequestParts<S> for ValidQuery<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
        value.validate()?;
        Ok(ValidQuery(value))
    }
}

/// Path parameters, rejected as a JSON problem body.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathParam<T>(pub T);

impl<T, S> FromRequestParts<S> for PathParam<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state).await?;
        Ok(PathParam(value))
    }
}

pub fn router(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        // `POST /api/create` goes to `create`. Role required.
        .route("/create", post(create::handler))
        // `PUT /api/update` goes to `update`. Role required.
        .route("/update", put(update::handler))
        // `DELETE /api/delete` goes to `delete`. Role required.
        .route("/delete", delete(delete::handler))
        // `PATCH /api/communication/:ACCOUNT_NUMBER` goes to `communication`.
        .route(
            "/communication/{account_number}",
            patch(communication::handler),
        )
        .route_layer(middleware::from_fn_with_state(state, gateway::require_role));

    Router::new()
        // `GET /api/fetch` goes to `fetch`.
        .route("/fetch", get(fetch::handler))
        .merge(protected)
}

/// State over an in-memory store. Events are recorded and dropped.
#[cfg(test)]
pub fn state(gateway: Option<crate::config::Gateway>) -> AppState {
    use std::sync::Arc;

    use crate::account::{AccountService, MemoryStore};
    use crate::config::Configuration;
    use crate::gateway::TokenVerifier;
    use crate::messaging::testing::RecordingPublisher;

    let (publisher, _) = RecordingPublisher::new(true);
    let mut config = Configuration::default();
    config.gateway = gateway.clone();

    AppState {
        accounts: AccountService::new(
            Arc::new(MemoryStore::new()),
            Arc::new(publisher),
            config.account.clone(),
        ),
        gateway: gateway.map(|gateway| TokenVerifier::new(&gateway).unwrap()),
        metrics: None,
        config: Arc::new(config),
    }
}
