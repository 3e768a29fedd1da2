use crate::errors::{RepoError, StorageError};
use crate::models::{NewPost, Post, PostChanges, Reaction};
use async_trait::async_trait;
use uuid::Uuid;

/// Operations on the post document store.
#[async_trait]
pub trait PostRepository: Send + Sync + 'static { // Send+Sync+'static required for Arc<dyn>
    /// Lists every stored post. No filtering or pagination.
    async fn list_all(&self) -> Result<Vec<Post>, RepoError>;

    /// Returns Ok(None) if no post has this id.
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Post>, RepoError>;

    /// Assigns an id and timestamps, stores the post and returns it.
    async fn create(&self, new_post: NewPost) -> Result<Post, RepoError>;

    /// Applies `changes` and returns the updated post, or Ok(None) if it does not exist.
    async fn update(&self, id: Uuid, changes: PostChanges) -> Result<Option<Post>, RepoError>;

    /// Adds one to the like or dislike counter atomically.
    async fn increment(&self, id: Uuid, reaction: Reaction) -> Result<Option<Post>, RepoError>;

    /// Hard delete. Returns the removed post, or Ok(None) if it did not exist.
    async fn delete(&self, id: Uuid) -> Result<Option<Post>, RepoError>;
}

/// Operations for storing and retrieving uploaded files.
#[async_trait]
pub trait FileStorage: Send + Sync + 'static {
    async fn upload(&self, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Returns the file bytes and a guessed content type.
    async fn download(&self, key: &str) -> Result<(Vec<u8>, String), StorageError>;

    /// Succeeds if the file is already gone.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}
