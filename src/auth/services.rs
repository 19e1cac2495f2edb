use anyhow::Context;
use tracing::{info, warn};

use crate::{
    auth::{
        dto::{LoginInput, ProfilePatch, SignupInput},
        repo_types::{NewUser, User, UserChanges},
        verification,
    },
    error::{AppError, AppResult},
    mail,
    state::AppState,
};

fn invalid_credentials() -> AppError {
    AppError::Unauthorized("Invalid credentials".into())
}

/// Creates an unverified account and mails its verification link.
pub async fn signup(st: &AppState, input: SignupInput) -> AppResult<User> {
    let passwords = st.passwords.clone();
    let plain = input.password;
    let password_hash = tokio::task::spawn_blocking(move || passwords.hash(&plain))
        .await
        .context("hash task")??;

    let token = verification::generate_token();
    let user = st
        .users
        .create_user(NewUser {
            username: input.username,
            email: input.email,
            password_hash,
            is_artisan: input.is_artisan,
            verification_token: Some(token.clone()),
        })
        .await
        .map_err(|e| {
            warn!(error = %e, "signup rejected");
            AppError::from(e)
        })?;

    let link = verification::verification_link(&st.config.public_base_url, &token);
    let (subject, body) = verification::verification_email(&user.username, &link);
    mail::dispatch(st.mailer.clone(), user.email.clone(), subject, body);

    info!(user_id = user.id, email = %user.email, "user registered");
    Ok(user)
}

/// Consumes a verification token. A token works exactly once.
pub async fn verify_email(st: &AppState, token: &str) -> AppResult<User> {
    let user = st
        .users
        .consume_verification_token(token)
        .await?
        .ok_or_else(|| {
            warn!("unknown verification token");
            AppError::InvalidToken
        })?;

    info!(user_id = user.id, "email verified");
    Ok(user)
}

/// Checks credentials and issues an identity token.
pub async fn login(st: &AppState, input: LoginInput) -> AppResult<(String, User)> {
    let Some(user) = st.users.find_by_email(&input.email).await? else {
        warn!(email = %input.email, "login unknown email");
        return Err(invalid_credentials());
    };

    let passwords = st.passwords.clone();
    let (plain, hash) = (input.password, user.password_hash.clone());
    let ok = tokio::task::spawn_blocking(move || passwords.verify(&plain, &hash))
        .await
        .context("verify task")??;
    if !ok {
        warn!(user_id = user.id, "login invalid password");
        return Err(invalid_credentials());
    }

    if !user.is_verified {
        warn!(user_id = user.id, "login before verification");
        return Err(AppError::Unverified);
    }

    let token = st.jwt.issue(user.id)?;
    info!(user_id = user.id, "user logged in");
    Ok((token, user))
}

pub async fn profile(st: &AppState, user_id: i64) -> AppResult<User> {
    st.users
        .find_by_id(user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User not found".into()))
}

pub async fn update_profile(st: &AppState, user_id: i64, patch: ProfilePatch) -> AppResult<User> {
    let changes = UserChanges {
        username: patch.username,
        is_artisan: patch.is_artisan,
    };
    let user = st
        .users
        .update(user_id, changes)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User not found".into()))?;
    info!(user_id, "profile updated");
    Ok(user)
}
