use async_trait::async_trait;
use parcelwatch_model::{User, UserId};

use crate::error::Result;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a user; a duplicate username is a conflict.
    async fn insert(&self, user: &User) -> Result<()>;

    async fn get(&self, id: UserId) -> Result<Option<User>>;

    async fn find_by_username(&self, username: &str) -> Result<Option<User>>;

    async fn list(&self) -> Result<Vec<User>>;

    /// Deletion cascades to everything the user owns.
    async fn delete(&self, id: UserId) -> Result<bool>;
}
