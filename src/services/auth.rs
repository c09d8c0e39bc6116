use crate::{
    error::Result,
    models::{
        role::Role,
        session::{DelegatedTokens, IssuedSession},
        user::{LoginProfile, NewUser, User},
    },
    repositories::UserRepository,
    services::{identity_provider::IdentityProvider, sessions::SessionManager},
};

/// Where the browser goes after sign-in when no usable return URL was given.
pub const DEFAULT_RETURN_PATH: &str = "/dashboard";

/// A completed sign-in.
#[derive(Debug)]
pub struct LoginOutcome {
    pub user: User,
    pub session: IssuedSession,
}

/// Finds the local user for a provider profile, creating one if needed.
///
/// Matches on the provider subject first, then on email. A new user is
/// `Pending` unless their email is the configured administrator's.
///
/// # Arguments
///
/// * `users` - The user repository.
/// * `profile` - The normalised provider profile.
/// * `admin_email` - The lower-cased administrator email, if configured.
pub async fn resolve_user(
    users: &dyn UserRepository,
    profile: &LoginProfile,
    admin_email: Option<&str>,
) -> Result<User> {
    let existing = match users.find_by_external_id(&profile.external_id).await? {
        Some(user) => Some(user),
        None => users.find_by_email(&profile.email).await?,
    };

    if let Some(user) = existing {
        tracing::debug!("Known user {} signed in", user.id);
        return users.record_login(user.id, profile).await;
    }

    let is_admin = admin_email.is_some_and(|a| a.eq_ignore_ascii_case(&profile.email));
    let role = if is_admin { Role::Admin } else { Role::Pending };

    let created = users
        .create(&NewUser {
            email: profile.email.clone(),
            display_name: profile.display_name.clone(),
            external_id: Some(profile.external_id.clone()),
            role,
            is_approved: role.is_approved(),
        })
        .await?;
    tracing::info!("New user created: {} ({})", created.email, role);

    users.record_login(created.id, profile).await
}

/// Runs the callback half of the authorization-code flow.
pub async fn complete_login(
    identity: &dyn IdentityProvider,
    users: &dyn UserRepository,
    sessions: &SessionManager,
    admin_email: Option<&str>,
    code: &str,
) -> Result<LoginOutcome> {
    let tokens = identity.exchange_code(code).await?;
    let profile = identity
        .fetch_profile(&tokens.access_token)
        .await?
        .into_login_profile()?;

    let user = resolve_user(users, &profile, admin_email).await?;
    let session = sessions
        .create_session(
            user.id,
            DelegatedTokens {
                access_token: Some(tokens.access_token),
                refresh_token: tokens.refresh_token,
            },
        )
        .await?;

    tracing::info!("User logged in: {}", user.email);
    Ok(LoginOutcome { user, session })
}

/// Accepts a return URL only if it is a path on this site.
pub fn safe_return_path(candidate: Option<&str>) -> &str {
    match candidate {
        Some(path) if path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') => {
            path
        }
        _ => DEFAULT_RETURN_PATH,
    }
}
