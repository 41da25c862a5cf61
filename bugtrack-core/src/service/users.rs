//! User use cases.

use tracing::{info, warn};
use validator::Validate;

use super::{require_actor, BugTracker, UserRemoval, UserSummary};
use crate::error::CoreError;
use crate::model::{now, Actor, Caller, NewUser, UserId, UserPatch};
use crate::policy::{self, Action, Target};

impl BugTracker {
    /// Register a new account. Needs no caller.
    pub async fn register_user(&self, user: NewUser) -> Result<UserSummary, CoreError> {
        let user = user.normalized();
        user.validate()?;

        let user = self.repo.insert_user(user).await.map_err(|err| {
            warn!("Registration failed: {}", err);
            CoreError::from(err)
        })?;
        info!("Registered user {} as {}", user.id, user.role);
        Ok(UserSummary::from(&user))
    }

    /// Log in: resolve the actor behind `email` if `verify` accepts the
    /// stored password hash.
    ///
    /// The hashing scheme belongs to the shell, which checks the supplied
    /// password inside `verify`. An unknown email and a wrong password fail
    /// the same way.
    pub async fn authenticate(
        &self,
        email: &str,
        verify: impl FnOnce(&str) -> bool,
    ) -> Result<Actor, CoreError> {
        let Some(user) = self.repo.find_user_by_email(email.trim()).await? else {
            warn!("Rejected login for unknown email");
            return Err(CoreError::Unauthenticated);
        };

        if !verify(&user.password_hash) {
            warn!("Rejected login for user {}: wrong password", user.id);
            return Err(CoreError::Unauthenticated);
        }

        info!("User {} logged in as {}", user.id, user.role);
        Ok(user.actor())
    }

    /// The caller's own profile.
    pub async fn current_user(&self, caller: &Caller) -> Result<UserSummary, CoreError> {
        let actor = require_actor(caller)?;
        let user = self.load_user(actor.id).await?;
        Ok(UserSummary::from(&user))
    }

    /// A single profile: the caller's own, or anyone's for admins.
    pub async fn get_user(&self, caller: &Caller, id: UserId) -> Result<UserSummary, CoreError> {
        require_actor(caller)?;
        policy::authorize(caller, Action::ViewUser, Target::User(id)).into_result()?;
        let user = self.load_user(id).await?;
        Ok(UserSummary::from(&user))
    }

    /// Every user except the caller. Admin only.
    pub async fn list_users(&self, caller: &Caller) -> Result<Vec<UserSummary>, CoreError> {
        let actor = require_actor(caller)?;
        policy::authorize(caller, Action::ListUsers, Target::None).into_result()?;

        Ok(self
            .repo
            .list_users()
            .await?
            .iter()
            .filter(|user| user.id != actor.id)
            .map(UserSummary::from)
            .collect())
    }

    /// Edit a profile's name and/or email.
    pub async fn update_user(
        &self,
        caller: &Caller,
        id: UserId,
        patch: UserPatch,
    ) -> Result<UserSummary, CoreError> {
        let actor = require_actor(caller)?;
        policy::authorize(caller, Action::UpdateUser, Target::User(id)).into_result()?;
        let mut user = self.load_user(id).await?;

        let patch = patch.normalized();
        patch.validate()?;

        let mut changed = false;
        if let Some(name) = patch.name.filter(|n| *n != user.name) {
            user.name = name;
            changed = true;
        }
        if let Some(email) = patch.email.filter(|e| *e != user.email) {
            user.email = email;
            changed = true;
        }

        if changed {
            user.updated_at = now();
            if !self.repo.update_user(&user).await? {
                return Err(CoreError::not_found("user", id));
            }
            info!("User {} updated profile of user {}", actor.id, id);
        }
        Ok(UserSummary::from(&user))
    }

    /// Delete a user. Bugs assigned to them go back to open and unassigned;
    /// bugs and comments they wrote stay.
    pub async fn delete_user(&self, caller: &Caller, id: UserId) -> Result<UserRemoval, CoreError> {
        let actor = require_actor(caller)?;
        policy::authorize(caller, Action::DeleteUser, Target::User(id)).into_result()?;
        let user = self.load_user(id).await?;

        let unassigned_bugs = self.repo.unassign_bugs(id).await?;
        let user = self
            .repo
            .delete_user(id)
            .await?
            .unwrap_or(user);

        info!(
            "User {} deleted user {} ({} bugs unassigned)",
            actor.id,
            id,
            unassigned_bugs.len()
        );
        Ok(UserRemoval {
            user: UserSummary::from(&user),
            unassigned_bugs,
        })
    }
}
