use axum::{extract::FromRequestParts, http::request::Parts, response::{IntoResponse, Response}};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use crate::{appresult::AppError, error::Error, session::{ROLE, USER_ID}};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Client,
    Provider,
}

/// The signed-in caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: String,
    pub role: Role,
}

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(IntoResponse::into_response)?;

        let reject = |err: Error| AppError(err).into_response();
        let user_id = session.get::<String>(USER_ID).await.map_err(|e| reject(e.into()))?;
        let role = session.get::<Role>(ROLE).await.map_err(|e| reject(e.into()))?;

        match (user_id, role) {
            (Some(user_id), Some(role)) => Ok(Identity { user_id, role }),
            _ => Err(reject(Error::Unauthorized)),
        }
    }
}
