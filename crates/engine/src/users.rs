//! Account management and the login session.
//!
//! Exactly one session exists per engine. Accounts live in the working
//! copy like everything else, so user changes are subject to the same
//! commit/rollback cycle as the records they guard.

use tallybook_core::{Permission, auth, record::User};

use crate::{Engine, EngineError};

pub const DEFAULT_ROOT_USER: &str = "root";
pub const DEFAULT_ROOT_PASSWORD: &str = "root";

impl Engine {
    /// Seed the default root account into an empty user table so a fresh
    /// store is never unreachable.
    pub(crate) fn ensure_root_user(&mut self) {
        if !self.state.users.is_empty() {
            return;
        }
        let salt = auth::generate_salt();
        let id = self.next_user_id;
        self.next_user_id += 1;
        self.state.users.insert(
            id,
            User {
                id,
                username: DEFAULT_ROOT_USER.to_owned(),
                password_hash: auth::hash_password(DEFAULT_ROOT_PASSWORD, &salt),
                salt,
                permission: Permission::ROOT,
                active: true,
            },
        );
    }

    /// Start a session. Unknown names, wrong passwords and deactivated
    /// accounts all fail the same way.
    pub fn login(&mut self, username: &str, password: &str) -> Result<(), EngineError> {
        let user = self
            .state
            .users
            .values()
            .find(|user| user.username == username)
            .ok_or(EngineError::InvalidCredentials)?;
        if !user.active || !auth::verify_password(password, &user.salt, &user.password_hash) {
            return Err(EngineError::InvalidCredentials);
        }
        self.current_user = Some(user.id);
        Ok(())
    }

    /// End the session. Harmless when nobody is logged in.
    pub fn logout(&mut self) {
        self.current_user = None;
    }

    pub fn current_user(&self) -> Option<&User> {
        self.current_user.and_then(|id| self.state.users.get(&id))
    }

    /// Fail unless the session holds every bit in `required`.
    pub fn require_permission(&self, required: Permission) -> Result<(), EngineError> {
        let user = self.current_user().ok_or(EngineError::NotLoggedIn)?;
        if !user.permission.contains(required) {
            return Err(EngineError::PermissionDenied { required });
        }
        Ok(())
    }

    fn require_root(&self) -> Result<(), EngineError> {
        self.require_permission(Permission::ROOT)
    }

    pub fn users(&self) -> impl Iterator<Item = &User> {
        self.state.users.values()
    }

    pub fn user(&self, username: &str) -> Option<&User> {
        self.state
            .users
            .values()
            .find(|user| user.username == username)
    }

    fn user_mut(&mut self, username: &str) -> Result<&mut User, EngineError> {
        self.state
            .users
            .values_mut()
            .find(|user| user.username == username)
            .ok_or_else(|| EngineError::UserNotFound(username.to_owned()))
    }

    /// Add an account. Root only; usernames are unique.
    pub fn create_user(
        &mut self,
        username: &str,
        password: &str,
        permission: Permission,
    ) -> Result<i64, EngineError> {
        self.require_root()?;
        if self.state.users.values().any(|user| user.username == username) {
            return Err(EngineError::UsernameTaken(username.to_owned()));
        }
        let salt = auth::generate_salt();
        let id = self.next_user_id;
        self.next_user_id += 1;
        self.state.users.insert(
            id,
            User {
                id,
                username: username.to_owned(),
                password_hash: auth::hash_password(password, &salt),
                salt,
                permission,
                active: true,
            },
        );
        Ok(id)
    }

    /// Remove an account. Root only; the logged-in account is protected.
    pub fn delete_user(&mut self, username: &str) -> Result<(), EngineError> {
        self.require_root()?;
        let id = self
            .user(username)
            .map(|user| user.id)
            .ok_or_else(|| EngineError::UserNotFound(username.to_owned()))?;
        if self.current_user == Some(id) {
            return Err(EngineError::CurrentUserProtected("delete"));
        }
        self.state.users.remove(&id);
        Ok(())
    }

    /// Replace an account's permission bits. Root only.
    pub fn set_user_permission(
        &mut self,
        username: &str,
        permission: Permission,
    ) -> Result<(), EngineError> {
        self.require_root()?;
        let user = self.user_mut(username)?;
        user.permission = permission;
        Ok(())
    }

    /// Activate or deactivate an account. Root only; the logged-in
    /// account cannot deactivate itself.
    pub fn set_user_active(&mut self, username: &str, active: bool) -> Result<(), EngineError> {
        self.require_root()?;
        let id = self
            .user(username)
            .map(|user| user.id)
            .ok_or_else(|| EngineError::UserNotFound(username.to_owned()))?;
        if !active && self.current_user == Some(id) {
            return Err(EngineError::CurrentUserProtected("deactivate"));
        }
        if let Some(user) = self.state.users.get_mut(&id) {
            user.active = active;
        }
        Ok(())
    }

    /// Change a password. The logged-in account must present its old
    /// password; root may reset anyone else without it. A fresh salt is
    /// drawn either way.
    pub fn change_password(
        &mut self,
        username: &str,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), EngineError> {
        let is_own_account = self
            .current_user()
            .is_some_and(|user| user.username == username);
        if is_own_account {
            let user = self.user_mut(username)?;
            if !auth::verify_password(old_password, &user.salt, &user.password_hash) {
                return Err(EngineError::InvalidCredentials);
            }
        } else {
            self.require_root()?;
        }
        let user = self.user_mut(username)?;
        let salt = auth::generate_salt();
        user.password_hash = auth::hash_password(new_password, &salt);
        user.salt = salt;
        Ok(())
    }
}
