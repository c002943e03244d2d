//! Role gate: the single authorization check in front of privileged operations.

use std::sync::Arc;

use crate::auth::Identity;
use crate::db::Repository;
use crate::errors::AppError;
use crate::models::{Role, User};

#[derive(Clone)]
pub struct RoleGate {
    repo: Arc<Repository>,
}

impl RoleGate {
    pub fn new(repo: Arc<Repository>) -> Self {
        Self { repo }
    }

    /// The caller's account. Callers without one hold no role at all.
    pub async fn caller(&self, identity: &Identity) -> Result<User, AppError> {
        self.repo
            .get_user_by_email(&identity.email)
            .await?
            .ok_or_else(|| {
                tracing::warn!(email = %identity.email, "Caller has no account");
                AppError::Forbidden("Forbidden Access".to_string())
            })
    }

    /// The caller's role, `None` when they have not logged in yet.
    pub async fn role_of(&self, identity: &Identity) -> Result<Option<Role>, AppError> {
        Ok(self
            .repo
            .get_user_by_email(&identity.email)
            .await?
            .map(|user| user.role))
    }

    pub async fn require(&self, identity: &Identity, role: Role) -> Result<User, AppError> {
        let user = self.caller(identity).await?;
        if user.role != role {
            tracing::warn!(
                email = %identity.email,
                required = role.as_str(),
                actual = user.role.as_str(),
                "Role check failed"
            );
            return Err(AppError::Forbidden("Forbidden Access".to_string()));
        }
        Ok(user)
    }

    pub async fn require_admin(&self, identity: &Identity) -> Result<User, AppError> {
        self.require(identity, Role::Admin).await
    }

    /// Owner-scoped access: the caller acts on their own records, or is an admin.
    ///
    /// Returns the caller's role, `None` when the caller has no account yet.
    pub async fn require_self_or_admin(
        &self,
        identity: &Identity,
        email: &str,
    ) -> Result<Option<Role>, AppError> {
        let role = self.role_of(identity).await?;

        if identity.email.eq_ignore_ascii_case(email) || role == Some(Role::Admin) {
            return Ok(role);
        }

        tracing::warn!(email = %identity.email, target = email, "Ownership check failed");
        Err(AppError::Forbidden("Forbidden Access".to_string()))
    }
}
