//! Request extractors

use agentdesk_common::errors::AppError;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::Json;
use validator::Validate;

/// JSON body that is validated on extraction.
///
/// Malformed JSON, missing fields and failed validation rules all become
/// [`AppError::Validation`], so they answer with the error envelope.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    T: Validate,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;

        value.validate().map_err(|e| AppError::Validation {
            message: e.to_string(),
        })?;

        Ok(Self(value))
    }
}
