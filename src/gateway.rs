//! Convert identity-token realm roles into authorities and guard write
//! routes with them.

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde_json::{Map, Value};

use crate::AppState;
use crate::config::{DEFAULT_REQUIRED_ROLE, Gateway};
use crate::error::{Result, ServerError};

pub const ROLE_PREFIX: &str = "ROLE_";
const REALM_ACCESS: &str = "realm_access";
const ROLES: &str = "roles";
const BEARER: &str = "Bearer ";

/// Token claims, kept untyped.
pub type Claims = Map<String, Value>;

/// Authorities granted by `realm_access.roles`, in claim order.
///
/// Any shape mismatch along the way yields an empty list. Duplicates are
/// kept and non-string entries are skipped.
pub fn extract_authorities(claims: &Claims) -> Vec<String> {
    claims
        .get(REALM_ACCESS)
        .and_then(Value::as_object)
        .and_then(|realm_access| realm_access.get(ROLES))
        .and_then(Value::as_array)
        .map(|roles| {
            roles
                .iter()
                .filter_map(Value::as_str)
                .map(|role| format!("{ROLE_PREFIX}{role}"))
                .collect()
        })
        .unwrap_or_default()
}

/// Verify bearer tokens issued by the identity provider.
#[derive(Clone)]
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
    required_authority: String,
}

impl TokenVerifier {
    /// Create a new [`TokenVerifier`]. An RSA public key selects RS256,
    /// otherwise the shared secret selects HS256.
    pub fn new(config: &Gateway) -> Result<Self> {
        let (key, algorithm) = match (&config.public_key_pem, &config.secret) {
            (Some(pem), _) => (DecodingKey::from_rsa_pem(pem.as_bytes())?, Algorithm::RS256),
            (None, Some(secret)) => {
                (DecodingKey::from_secret(secret.as_bytes()), Algorithm::HS256)
            },
            (None, None) => {
                return Err(ServerError::Internal {
                    details: "gateway requires `public_key_pem` or `secret`".to_owned(),
                    source: None,
                });
            },
        };

        let mut validation = Validation::new(algorithm);
        match &config.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }
        if let Some(issuer) = &config.issuer {
            validation.set_issuer(&[issuer]);
        }

        let role = config
            .required_role
            .as_deref()
            .unwrap_or(DEFAULT_REQUIRED_ROLE);

        Ok(Self {
            key,
            validation,
            required_authority: format!("{ROLE_PREFIX}{role}"),
        })
    }

    /// Decode and check a token.
    pub fn decode(&self, token: &str) -> Result<Claims> {
        Ok(decode::<Claims>(token, &self.key, &self.validation)?.claims)
    }

    /// Check the `Authorization` header value grants the required role.
    pub fn authorize(&self, authorization: Option<&str>) -> Result<Vec<String>> {
        let token = authorization
            .and_then(|value| value.strip_prefix(BEARER))
            .ok_or(ServerError::Unauthorized)?;
        let authorities = extract_authorities(&self.decode(token)?);

        if authorities.contains(&self.required_authority) {
            Ok(authorities)
        } else {
            tracing::debug!(?authorities, required = self.required_authority, "access denied");
            Err(ServerError::Forbidden)
        }
    }
}

/// Middleware rejecting requests without the required realm role. A no-op
/// when no gateway is configured.
pub async fn require_role(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response> {
    if let Some(verifier) = &state.gateway {
        let authorization = req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok());
        verifier.authorize(authorization)?;
    }

    Ok(next.run(req).await)
}
