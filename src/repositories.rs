use crate::{
    domain::PostRepository,
    errors::RepoError,
    models::{NewPost, Post, PostChanges, Reaction},
};
use async_trait::async_trait;
use aws_sdk_dynamodb::{
    Client as DynamoDbClient,
    error::SdkError,
    types::{AttributeValue, ReturnValue},
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{self, info};
use uuid::Uuid;

/// Partition key attribute of the posts table.
pub const POST_ID_ATTR: &str = "post_id";

#[derive(Debug, Clone)]
pub struct DynamoDbPostRepository {
    client: DynamoDbClient,
    table_name: String,
}

impl DynamoDbPostRepository {
    /// Creates a new repository instance configured for a specific table.
    pub fn new(client: DynamoDbClient, table_name: String) -> Self {
        info!(%table_name, "Initializing DynamoDbPostRepository");
        Self { client, table_name }
    }

    fn decode(&self, item: &HashMap<String, AttributeValue>) -> Result<Post, RepoError> {
        item_to_post(item).ok_or_else(|| {
            let item_id = item.get(POST_ID_ATTR).and_then(|v| v.as_s().ok());
            tracing::error!(item.id = ?item_id, table_name = %self.table_name, "DynamoDB: Failed to parse item into Post");
            RepoError::DataCorruption(format!(
                "item {:?} in table '{}' is not a valid post",
                item_id, self.table_name
            ))
        })
    }
}

#[async_trait]
impl PostRepository for DynamoDbPostRepository {
    /// Lists all posts using Scan, following LastEvaluatedKey pages.
    async fn list_all(&self) -> Result<Vec<Post>, RepoError> {
        tracing::debug!("DynamoDB: Scanning table '{}' for all posts", self.table_name);
        let mut posts: Vec<Post> = Vec::new();
        let mut last_evaluated_key: Option<HashMap<String, AttributeValue>> = None;

        loop {
            let resp = self
                .client
                .scan()
                .table_name(&self.table_name)
                .set_exclusive_start_key(last_evaluated_key.take())
                .send()
                .await
                .map_err(|e| sdk_error(e, format!("DynamoDB: Failed to scan table '{}'", self.table_name)))?;

            for item in resp.items.unwrap_or_default() {
                posts.push(self.decode(&item)?);
            }

            last_evaluated_key = resp.last_evaluated_key;
            if last_evaluated_key.is_none() {
                break;
            }
            tracing::debug!("DynamoDB Scan (table: {}): Continuing with LastEvaluatedKey...", self.table_name);
        }

        tracing::info!("DynamoDB (table: {}): Listed {} posts", self.table_name, posts.len());
        Ok(posts)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Post>, RepoError> {
        let resp = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key(POST_ID_ATTR, AttributeValue::S(id.to_string()))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| sdk_error(e, format!("DynamoDB (table: {}): Failed to get post (id: {})", self.table_name, id)))?;

        resp.item.as_ref().map(|item| self.decode(item)).transpose()
    }

    /// Stores a new post with PutItem; the condition guards against id reuse.
    async fn create(&self, new_post: NewPost) -> Result<Post, RepoError> {
        let post = Post::from_new(new_post);
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(post_to_item(&post)))
            .condition_expression("attribute_not_exists(#pk)")
            .expression_attribute_names("#pk", POST_ID_ATTR)
            .send()
            .await
            .map_err(|e| sdk_error(e, format!("DynamoDB (table: {}): Failed to put post (id: {})", self.table_name, post.id)))?;
        tracing::debug!(post_id = %post.id, "DynamoDB: Post stored");
        Ok(post)
    }

    async fn update(&self, id: Uuid, changes: PostChanges) -> Result<Option<Post>, RepoError> {
        let mut request = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .key(POST_ID_ATTR, AttributeValue::S(id.to_string()))
            .condition_expression("attribute_exists(#pk)")
            .expression_attribute_names("#pk", POST_ID_ATTR)
            .expression_attribute_names("#updatedAt", "updatedAt")
            .expression_attribute_values(":now", AttributeValue::S(Utc::now().to_rfc3339()))
            .return_values(ReturnValue::AllNew);

        let mut assignments = vec!["#updatedAt = :now".to_string()];
        let fields = [
            ("title", changes.title),
            ("content", changes.content),
            ("imageUrl", changes.image_url),
        ];
        for (attr, value) in fields {
            if let Some(value) = value {
                assignments.push(format!("#{attr} = :{attr}"));
                request = request
                    .expression_attribute_names(format!("#{attr}"), attr)
                    .expression_attribute_values(format!(":{attr}"), AttributeValue::S(value));
            }
        }

        let result = request
            .update_expression(format!("SET {}", assignments.join(", ")))
            .send()
            .await;

        match result {
            Ok(resp) => resp.attributes.as_ref().map(|item| self.decode(item)).transpose(),
            Err(SdkError::ServiceError(se)) if se.err().is_conditional_check_failed_exception() => {
                tracing::debug!(post_id = %id, "DynamoDB: Update skipped, post does not exist");
                Ok(None)
            }
            Err(e) => Err(sdk_error(e, format!("DynamoDB (table: {}): Failed to update post (id: {})", self.table_name, id))),
        }
    }

    /// Increments a counter with an ADD expression so concurrent calls never lose updates.
    async fn increment(&self, id: Uuid, reaction: Reaction) -> Result<Option<Post>, RepoError> {
        let result = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .key(POST_ID_ATTR, AttributeValue::S(id.to_string()))
            .condition_expression("attribute_exists(#pk)")
            .update_expression("ADD #counter :one SET #updatedAt = :now")
            .expression_attribute_names("#pk", POST_ID_ATTR)
            .expression_attribute_names("#counter", reaction.attribute())
            .expression_attribute_names("#updatedAt", "updatedAt")
            .expression_attribute_values(":one", AttributeValue::N("1".to_string()))
            .expression_attribute_values(":now", AttributeValue::S(Utc::now().to_rfc3339()))
            .return_values(ReturnValue::AllNew)
            .send()
            .await;

        match result {
            Ok(resp) => resp.attributes.as_ref().map(|item| self.decode(item)).transpose(),
            Err(SdkError::ServiceError(se)) if se.err().is_conditional_check_failed_exception() => Ok(None),
            Err(e) => Err(sdk_error(
                e,
                format!("DynamoDB (table: {}): Failed to increment {} (id: {})", self.table_name, reaction.attribute(), id),
            )),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<Option<Post>, RepoError> {
        tracing::debug!(post_id = %id, table_name = %self.table_name, "DynamoDB: Deleting item");
        let result = self
            .client
            .delete_item()
            .table_name(&self.table_name)
            .key(POST_ID_ATTR, AttributeValue::S(id.to_string()))
            .condition_expression("attribute_exists(#pk)")
            .expression_attribute_names("#pk", POST_ID_ATTR)
            .return_values(ReturnValue::AllOld)
            .send()
            .await;

        match result {
            Ok(resp) => resp.attributes.as_ref().map(|item| self.decode(item)).transpose(),
            Err(SdkError::ServiceError(se)) if se.err().is_conditional_check_failed_exception() => Ok(None),
            Err(e) => Err(sdk_error(e, format!("DynamoDB (table: {}): Failed to delete post (id: {})", self.table_name, id))),
        }
    }
}

/// Classifies an SDK failure: transport-level failures mean the store is unreachable.
fn sdk_error<E, R>(err: SdkError<E, R>, context: String) -> RepoError
where
    E: std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    let unavailable = matches!(err, SdkError::DispatchFailure(_) | SdkError::TimeoutError(_));
    let err = anyhow::Error::new(err).context(context);
    if unavailable {
        RepoError::Unavailable(err)
    } else {
        RepoError::BackendError(err)
    }
}

fn post_to_item(post: &Post) -> HashMap<String, AttributeValue> {
    HashMap::from([
        (POST_ID_ATTR.to_string(), AttributeValue::S(post.id.to_string())),
        ("title".to_string(), AttributeValue::S(post.title.clone())),
        ("content".to_string(), AttributeValue::S(post.content.clone())),
        ("imageUrl".to_string(), AttributeValue::S(post.image_url.clone())),
        ("likes".to_string(), AttributeValue::N(post.likes.to_string())),
        ("dislikes".to_string(), AttributeValue::N(post.dislikes.to_string())),
        ("createdAt".to_string(), AttributeValue::S(post.created_at.to_rfc3339())),
        ("updatedAt".to_string(), AttributeValue::S(post.updated_at.to_rfc3339())),
    ])
}

fn item_to_post(item: &HashMap<String, AttributeValue>) -> Option<Post> {
    let string = |name: &str| item.get(name).and_then(|v| v.as_s().ok()).cloned();
    let number = |name: &str| -> Option<u64> {
        match item.get(name) {
            None => Some(0),
            Some(v) => v.as_n().ok()?.parse().ok(),
        }
    };
    let timestamp = |name: &str| -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(item.get(name)?.as_s().ok()?)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    };

    let id = Uuid::parse_str(item.get(POST_ID_ATTR)?.as_s().ok()?).ok()?;
    Some(Post {
        id,
        title: string("title").unwrap_or_default(),
        content: string("content").unwrap_or_default(),
        image_url: string("imageUrl").unwrap_or_default(),
        likes: number("likes")?,
        dislikes: number("dislikes")?,
        created_at: timestamp("createdAt")?,
        updated_at: timestamp("updatedAt")?,
    })
}

/// Process-local store. Posts live in a map guarded by one lock, so counter
/// increments are atomic with respect to each other.
#[derive(Debug, Default)]
pub struct InMemoryPostRepository {
    posts: RwLock<HashMap<Uuid, Post>>,
}

impl InMemoryPostRepository {
    pub fn new() -> Self {
        info!("Initializing InMemoryPostRepository");
        Self::default()
    }
}

#[async_trait]
impl PostRepository for InMemoryPostRepository {
    async fn list_all(&self) -> Result<Vec<Post>, RepoError> {
        let mut posts: Vec<Post> = self.posts.read().await.values().cloned().collect();
        posts.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(posts)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Post>, RepoError> {
        Ok(self.posts.read().await.get(&id).cloned())
    }

    async fn create(&self, new_post: NewPost) -> Result<Post, RepoError> {
        let post = Post::from_new(new_post);
        self.posts.write().await.insert(post.id, post.clone());
        Ok(post)
    }

    async fn update(&self, id: Uuid, changes: PostChanges) -> Result<Option<Post>, RepoError> {
        let mut posts = self.posts.write().await;
        Ok(posts.get_mut(&id).map(|post| {
            post.apply(changes);
            post.clone()
        }))
    }

    async fn increment(&self, id: Uuid, reaction: Reaction) -> Result<Option<Post>, RepoError> {
        let mut posts = self.posts.write().await;
        Ok(posts.get_mut(&id).map(|post| {
            *post.counter_mut(reaction) += 1;
            post.updated_at = Utc::now();
            post.clone()
        }))
    }

    async fn delete(&self, id: Uuid) -> Result<Option<Post>, RepoError> {
        Ok(self.posts.write().await.remove(&id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn new_post(title: &str) -> NewPost {
        NewPost {
            title: title.to_string(),
            content: format!("{} body", title),
            image_url: String::new(),
        }
    }

    #[test]
    fn items_decode_back_into_posts() {
        let post = Post::from_new(new_post("first"));
        let item = post_to_item(&post);
        let decoded = item_to_post(&item).unwrap();
        assert_eq!(decoded.id, post.id);
        assert_eq!(decoded.title, "first");
        assert_eq!(decoded.likes, 0);
        // RFC 3339 keeps sub-second precision
        assert_eq!(decoded.created_at, post.created_at);
    }

    #[test]
    fn items_missing_counters_default_to_zero() {
        let post = Post::from_new(new_post("legacy"));
        let mut item = post_to_item(&post);
        item.remove("likes");
        item.remove("dislikes");
        let decoded = item_to_post(&item).unwrap();
        assert_eq!((decoded.likes, decoded.dislikes), (0, 0));
    }

    #[test]
    fn corrupt_items_are_rejected() {
        let post = Post::from_new(new_post("bad"));
        let mut item = post_to_item(&post);
        item.insert("likes".into(), AttributeValue::N("-3".into()));
        assert!(item_to_post(&item).is_none());

        let mut item = post_to_item(&post);
        item.insert(POST_ID_ATTR.into(), AttributeValue::S("not-a-uuid".into()));
        assert!(item_to_post(&item).is_none());
    }

    #[tokio::test]
    async fn memory_store_crud() {
        let repo = InMemoryPostRepository::new();
        let created = repo.create(new_post("one")).await.unwrap();
        assert_eq!(repo.get_by_id(created.id).await.unwrap(), Some(created.clone()));

        let updated = repo
            .update(
                created.id,
                PostChanges {
                    content: Some("edited".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.title, "one");
        assert_eq!(updated.content, "edited");

        let removed = repo.delete(created.id).await.unwrap();
        assert_eq!(removed.map(|p| p.id), Some(created.id));
        assert!(repo.get_by_id(created.id).await.unwrap().is_none());
        assert!(repo.delete(created.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn memory_store_missing_ids_yield_none() {
        let repo = InMemoryPostRepository::new();
        let id = Uuid::new_v4();
        assert!(repo.update(id, PostChanges::default()).await.unwrap().is_none());
        assert!(repo.increment(id, Reaction::Like).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_increments_are_not_lost() {
        let repo = Arc::new(InMemoryPostRepository::new());
        let id = repo.create(new_post("popular")).await.unwrap().id;

        let tasks: Vec<_> = (0..50)
            .map(|i| {
                let repo = repo.clone();
                let reaction = if i % 5 == 0 { Reaction::Dislike } else { Reaction::Like };
                tokio::spawn(async move { repo.increment(id, reaction).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let post = repo.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(post.likes, 40);
        assert_eq!(post.dislikes, 10);
    }

    #[tokio::test]
    async fn memory_store_lists_every_post() {
        let repo = InMemoryPostRepository::new();
        let a = repo.create(new_post("a")).await.unwrap();
        let b = repo.create(new_post("b")).await.unwrap();
        let ids: Vec<Uuid> = repo.list_all().await.unwrap().iter().map(|p| p.id).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&a.id) && ids.contains(&b.id));
    }
}
