//! In-process user directory.
//!
//! Holds every account together with its argon2 password hash. Emails are
//! unique and compared after trimming and lowercasing. Admin accounts are
//! protected: they can be neither deleted nor have their role changed, not
//! even by themselves.

use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::auth::{hash_password, verify_password, PasswordError};
use crate::error::{Result, ServerError};
use crate::types::{CustomerSummary, Role, User};

/// Input for creating an account.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    pub store_id: Option<Uuid>,
}

impl NewUser {
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
        role: Role,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            password: password.into(),
            role,
            store_id: None,
        }
    }

    pub fn with_store(mut self, store_id: Uuid) -> Self {
        self.store_id = Some(store_id);
        self
    }
}

/// Canonical form of an email address.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Debug)]
struct Account {
    user: User,
    password_hash: String,
}

#[derive(Debug, Default)]
struct Directory {
    accounts: HashMap<Uuid, Account>,
    by_email: HashMap<String, Uuid>,
}

impl Directory {
    fn remove(&mut self, id: Uuid) -> Option<User> {
        let account = self.accounts.remove(&id)?;
        self.by_email.remove(&account.user.email);
        Some(account.user)
    }
}

/// Thread-safe user directory.
#[derive(Debug, Default)]
pub struct UserDirectory {
    inner: RwLock<Directory>,
}

impl UserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an account.
    ///
    /// # Errors
    ///
    /// - [`ServerError::Validation`] if a field is blank
    /// - [`ServerError::Conflict`] if the email is taken
    /// - [`ServerError::Internal`] if hashing fails
    pub async fn create(&self, new_user: NewUser) -> Result<User> {
        let name = new_user.name.trim();
        let email = normalize_email(&new_user.email);
        if name.is_empty() || email.is_empty() || new_user.password.is_empty() {
            return Err(ServerError::validation("All fields are required"));
        }

        // Hash before taking the lock; argon2 is deliberately slow.
        let password_hash = hash_password(&new_user.password)
            .map_err(|e| ServerError::internal(e.to_string()))?;

        let mut dir = self.inner.write().await;
        if dir.by_email.contains_key(&email) {
            return Err(ServerError::conflict("Email already in use"));
        }

        let user = User {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: email.clone(),
            role: new_user.role,
            store_id: new_user.store_id,
            created_at: Utc::now(),
        };
        dir.by_email.insert(email, user.id);
        dir.accounts.insert(
            user.id,
            Account {
                user: user.clone(),
                password_hash,
            },
        );

        debug!(user_id = %user.id, role = %user.role, "Account created");
        Ok(user)
    }

    /// Checks credentials and returns the account.
    ///
    /// Unknown email and wrong password are indistinguishable to the caller.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<User> {
        let email = normalize_email(email);
        let (user, password_hash) = {
            let dir = self.inner.read().await;
            let account = dir
                .by_email
                .get(&email)
                .and_then(|id| dir.accounts.get(id))
                .ok_or_else(|| ServerError::unauthenticated("Invalid credentials"))?;
            (account.user.clone(), account.password_hash.clone())
        };

        match verify_password(password, &password_hash) {
            Ok(()) => Ok(user),
            Err(PasswordError::Mismatch) => {
                debug!(user_id = %user.id, "Password mismatch");
                Err(ServerError::unauthenticated("Invalid credentials"))
            }
            Err(e) => Err(ServerError::internal(e.to_string())),
        }
    }

    pub async fn get(&self, id: Uuid) -> Result<User> {
        self.inner
            .read()
            .await
            .accounts
            .get(&id)
            .map(|a| a.user.clone())
            .ok_or_else(|| ServerError::not_found("User not found"))
    }

    /// Name and email of the accounts among `ids` that still exist.
    pub async fn customer_summaries(
        &self,
        ids: impl IntoIterator<Item = Uuid>,
    ) -> HashMap<Uuid, CustomerSummary> {
        let dir = self.inner.read().await;
        ids.into_iter()
            .filter_map(|id| {
                dir.accounts
                    .get(&id)
                    .map(|a| (id, CustomerSummary::from(&a.user)))
            })
            .collect()
    }

    /// All accounts, newest first.
    pub async fn list(&self) -> Vec<User> {
        let mut users: Vec<User> = self
            .inner
            .read()
            .await
            .accounts
            .values()
            .map(|a| a.user.clone())
            .collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        users
    }

    /// Staff accounts attached to `store_id`.
    pub async fn list_staff(&self, store_id: Uuid) -> Vec<User> {
        let mut staff: Vec<User> = self
            .inner
            .read()
            .await
            .accounts
            .values()
            .map(|a| &a.user)
            .filter(|u| u.role == Role::Staff && u.store_id == Some(store_id))
            .cloned()
            .collect();
        staff.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        staff
    }

    pub async fn has_admin(&self) -> bool {
        self.inner
            .read()
            .await
            .accounts
            .values()
            .any(|a| a.user.role.is_admin())
    }

    /// Attaches an account to a store.
    pub async fn assign_store(&self, id: Uuid, store_id: Uuid) -> Result<User> {
        let mut dir = self.inner.write().await;
        let account = dir
            .accounts
            .get_mut(&id)
            .ok_or_else(|| ServerError::not_found("User not found"))?;
        account.user.store_id = Some(store_id);
        Ok(account.user.clone())
    }

    /// Deletes an account on behalf of `actor_id`.
    ///
    /// # Errors
    ///
    /// - [`ServerError::Conflict`] if the actor targets itself
    /// - [`ServerError::NotFound`] if the account does not exist
    /// - [`ServerError::Forbidden`] if the target is an admin
    pub async fn delete(&self, actor_id: Uuid, id: Uuid) -> Result<User> {
        if actor_id == id {
            return Err(ServerError::conflict("Cannot delete your own account"));
        }

        let mut dir = self.inner.write().await;
        let role = dir
            .accounts
            .get(&id)
            .map(|a| a.user.role)
            .ok_or_else(|| ServerError::not_found("User not found"))?;
        if role.is_admin() {
            return Err(ServerError::forbidden("Cannot delete admin accounts"));
        }

        let user = dir
            .remove(id)
            .ok_or_else(|| ServerError::not_found("User not found"))?;
        info!(user_id = %id, actor_id = %actor_id, "Account deleted");
        Ok(user)
    }

    /// Removes an account without actor checks. Rolls back a registration
    /// whose later steps failed.
    pub async fn discard(&self, id: Uuid) -> Option<User> {
        let user = self.inner.write().await.remove(id)?;
        debug!(user_id = %id, "Account discarded");
        Some(user)
    }

    /// Removes a staff member of `store_id`.
    ///
    /// Accounts that are not staff of that store are reported as not found.
    pub async fn remove_staff(&self, store_id: Uuid, staff_id: Uuid) -> Result<User> {
        let mut dir = self.inner.write().await;
        let is_member = dir.accounts.get(&staff_id).is_some_and(|a| {
            a.user.role == Role::Staff && a.user.store_id == Some(store_id)
        });
        if !is_member {
            return Err(ServerError::not_found("Staff member not found"));
        }
        dir.remove(staff_id)
            .ok_or_else(|| ServerError::not_found("Staff member not found"))
    }

    /// Changes an account's role. Only customer and staff can be assigned.
    ///
    /// # Errors
    ///
    /// - [`ServerError::Validation`] if `role` is not assignable
    /// - [`ServerError::NotFound`] if the account does not exist
    /// - [`ServerError::Forbidden`] if the target is an admin
    pub async fn set_role(&self, id: Uuid, role: Role) -> Result<User> {
        if !role.is_assignable() {
            return Err(ServerError::validation("Invalid role"));
        }

        let mut dir = self.inner.write().await;
        let account = dir
            .accounts
            .get_mut(&id)
            .ok_or_else(|| ServerError::not_found("User not found"))?;
        if account.user.role.is_admin() {
            return Err(ServerError::forbidden("Cannot modify admin accounts"));
        }

        account.user.role = role;
        info!(user_id = %id, role = %role, "Role changed");
        Ok(account.user.clone())
    }

    /// Creates the bootstrap admin unless an admin already exists.
    ///
    /// Returns the new account, or `None` if seeding was skipped.
    pub async fn seed_admin(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<Option<User>> {
        if self.has_admin().await {
            debug!("Admin account already exists, skipping seed");
            return Ok(None);
        }
        let admin = self
            .create(NewUser::new(name, email, password, Role::Admin))
            .await?;
        info!(user_id = %admin.id, "Seeded admin account");
        Ok(Some(admin))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn directory_with(role: Role, email: &str) -> (UserDirectory, User) {
        let dir = UserDirectory::new();
        let user = dir
            .create(NewUser::new("Someone", email, "secret123", role))
            .await
            .unwrap();
        (dir, user)
    }

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(normalize_email("  Alice@Example.COM "), "alice@example.com");
    }

    #[tokio::test]
    async fn create_normalizes_and_rejects_duplicates() {
        let (dir, user) = directory_with(Role::Customer, " Alice@Example.com").await;
        assert_eq!(user.email, "alice@example.com");

        let err = dir
            .create(NewUser::new("Other", "ALICE@example.com", "pw", Role::Customer))
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::Conflict(_)));
    }

    #[tokio::test]
    async fn create_requires_all_fields() {
        let dir = UserDirectory::new();
        for (name, email, password) in [("", "a@b.c", "pw"), ("A", "  ", "pw"), ("A", "a@b.c", "")] {
            let err = dir
                .create(NewUser::new(name, email, password, Role::Customer))
                .await
                .unwrap_err();
            assert!(matches!(err, ServerError::Validation(_)));
        }
    }

    #[tokio::test]
    async fn authenticate_checks_password() {
        let (dir, user) = directory_with(Role::Customer, "bob@example.com").await;

        let found = dir.authenticate("BOB@example.com ", "secret123").await.unwrap();
        assert_eq!(found.id, user.id);

        let err = dir.authenticate("bob@example.com", "nope").await.unwrap_err();
        assert!(matches!(err, ServerError::Unauthenticated(ref m) if m == "Invalid credentials"));

        let err = dir.authenticate("nobody@example.com", "secret123").await.unwrap_err();
        assert!(matches!(err, ServerError::Unauthenticated(ref m) if m == "Invalid credentials"));
    }

    #[tokio::test]
    async fn admin_accounts_are_protected() {
        let (dir, admin) = directory_with(Role::Admin, "root@example.com").await;
        let other_admin = dir
            .create(NewUser::new("Second", "two@example.com", "pw", Role::Admin))
            .await
            .unwrap();

        let err = dir.delete(admin.id, admin.id).await.unwrap_err();
        assert!(matches!(err, ServerError::Conflict(_)));

        let err = dir.delete(admin.id, other_admin.id).await.unwrap_err();
        assert!(matches!(err, ServerError::Forbidden(_)));

        let err = dir.set_role(admin.id, Role::Customer).await.unwrap_err();
        assert!(matches!(err, ServerError::Forbidden(_)));

        assert_eq!(dir.get(admin.id).await.unwrap().role, Role::Admin);
        assert_eq!(dir.list().await.len(), 2);
    }

    #[tokio::test]
    async fn set_role_only_between_customer_and_staff() {
        let (dir, user) = directory_with(Role::Customer, "c@example.com").await;

        let promoted = dir.set_role(user.id, Role::Staff).await.unwrap();
        assert_eq!(promoted.role, Role::Staff);

        for role in [Role::Admin, Role::StoreOwner] {
            let err = dir.set_role(user.id, role).await.unwrap_err();
            assert!(matches!(err, ServerError::Validation(_)));
        }
    }

    #[tokio::test]
    async fn delete_frees_the_email() {
        let (dir, admin) = directory_with(Role::Admin, "root@example.com").await;
        let user = dir
            .create(NewUser::new("C", "c@example.com", "pw", Role::Customer))
            .await
            .unwrap();

        dir.delete(admin.id, user.id).await.unwrap();
        assert!(matches!(dir.get(user.id).await, Err(ServerError::NotFound(_))));
        assert!(dir
            .create(NewUser::new("C", "c@example.com", "pw", Role::Customer))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn staff_are_scoped_to_their_store() {
        let dir = UserDirectory::new();
        let store = Uuid::new_v4();
        let mine = dir
            .create(NewUser::new("S1", "s1@example.com", "pw", Role::Staff).with_store(store))
            .await
            .unwrap();
        let theirs = dir
            .create(NewUser::new("S2", "s2@example.com", "pw", Role::Staff).with_store(Uuid::new_v4()))
            .await
            .unwrap();

        let staff = dir.list_staff(store).await;
        assert_eq!(staff.len(), 1);
        assert_eq!(staff[0].id, mine.id);

        let err = dir.remove_staff(store, theirs.id).await.unwrap_err();
        assert!(matches!(err, ServerError::NotFound(_)));
        assert!(dir.remove_staff(store, mine.id).await.is_ok());
        assert!(dir.list_staff(store).await.is_empty());
    }

    #[tokio::test]
    async fn seed_admin_runs_once() {
        let dir = UserDirectory::new();
        let seeded = dir
            .seed_admin("System Administrator", "admin@example.com", "pw")
            .await
            .unwrap();
        assert!(seeded.is_some());

        let again = dir
            .seed_admin("Other", "other@example.com", "pw")
            .await
            .unwrap();
        assert!(again.is_none());
        assert_eq!(dir.list().await.len(), 1);
    }

    #[tokio::test]
    async fn discarded_email_can_register_again() {
        let (dir, user) = directory_with(Role::StoreOwner, "owner@example.com").await;

        assert_eq!(dir.discard(user.id).await.map(|u| u.id), Some(user.id));
        assert!(dir.discard(user.id).await.is_none());
        assert!(dir.get(user.id).await.is_err());

        let again = dir
            .create(NewUser::new("Owner", "owner@example.com", "secret123", Role::StoreOwner))
            .await
            .unwrap();
        assert_ne!(again.id, user.id);
    }

    #[tokio::test]
    async fn customer_summaries_resolve_existing_accounts() {
        let (dir, user) = directory_with(Role::Customer, "alice@example.com").await;

        let summaries = dir.customer_summaries([user.id, Uuid::new_v4()]).await;
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[&user.id].name, "Someone");
        assert_eq!(summaries[&user.id].email, "alice@example.com");
    }
}
