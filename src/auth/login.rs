use std::sync::Arc;

use axum::{debug_handler, extract::State, Json};
use serde::Deserialize;
use tower_sessions::Session;

use crate::{config::Config, error::Error, session::{ROLE, USER_ID}, store::Store, AppResult, AppState};

use super::{Identity, Role};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[serde(alias = "user_id")]
    user_id: String,
}

/// Binds an identity to the session. The production sign-in flow calls this
/// once it has verified the user.
pub async fn remember(session: &Session, identity: &Identity) -> Result<(), Error> {
    session.cycle_id().await?;
    session.insert(USER_ID, &identity.user_id).await?;
    session.insert(ROLE, identity.role).await?;
    Ok(())
}

/// Development sign-in: trusts the posted user id as long as a profile exists.
/// Disabled unless `ALLOW_DEV_LOGIN` is set.
#[debug_handler(state = AppState)]
pub async fn login(
    State(config): State<Arc<Config>>,
    State(store): State<Store>,
    session: Session,
    Json(LoginRequest { user_id }): Json<LoginRequest>,
) -> AppResult<Json<Identity>> {
    if !config.allow_dev_login {
        return Err(Error::not_found("dev sign-in is disabled").into());
    }

    let Some((role,)): Option<(String,)> = sqlx::query_as("SELECT role FROM profiles WHERE user_id=?")
        .bind(&user_id)
        .fetch_optional(store.pool())
        .await?
    else {
        return Err(Error::Unauthorized.into());
    };

    let role = match role.as_str() {
        "client" => Role::Client,
        "provider" => Role::Provider,
        other => return Err(Error::invalid(format!("profile has unknown role {other:?}")).into()),
    };

    let identity = Identity { user_id, role };
    remember(&session, &identity).await?;
    tracing::info!(user_id = %identity.user_id, "signed in");

    Ok(Json(identity))
}
