//! Caller identity extraction
//!
//! Authentication is handled by the platform gateway upstream; by the
//! time a request reaches this service the validated caller id arrives
//! as a trusted header. A missing or unparseable header means a
//! system-scope (anonymous) call.

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

/// Header carrying the authenticated user id
pub const USER_ID_HEADER: &str = "x-user-id";

/// Caller identity extracted from the trusted gateway header
#[derive(Debug, Clone, Copy)]
pub struct CallerId(pub Option<i64>);

impl<S> FromRequestParts<S> for CallerId
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok());

        Ok(Self(user_id))
    }
}
