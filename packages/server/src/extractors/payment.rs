use std::convert::Infallible;

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::payment::PAYMENT_HEADER;

/// Raw `X-PAYMENT` header, if the client attached one.
pub struct PaymentHeader(pub Option<String>);

impl<S> FromRequestParts<S> for PaymentHeader
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(PAYMENT_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_owned);

        Ok(PaymentHeader(value))
    }
}
