use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A blog post as stored and as returned by the API.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub image_url: String,
    pub likes: u64,
    pub dislikes: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Post {
    /// Builds a fresh document with a new id, zeroed counters and matching timestamps.
    pub fn from_new(new_post: NewPost) -> Self {
        let now = Utc::now();
        Post {
            id: Uuid::new_v4(),
            title: new_post.title,
            content: new_post.content,
            image_url: new_post.image_url,
            likes: 0,
            dislikes: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Overwrites the fields present in `changes` and bumps `updated_at`.
    pub fn apply(&mut self, changes: PostChanges) {
        if let Some(title) = changes.title {
            self.title = title;
        }
        if let Some(content) = changes.content {
            self.content = content;
        }
        if let Some(image_url) = changes.image_url {
            self.image_url = image_url;
        }
        self.updated_at = Utc::now();
    }

    pub fn counter_mut(&mut self, reaction: Reaction) -> &mut u64 {
        match reaction {
            Reaction::Like => &mut self.likes,
            Reaction::Dislike => &mut self.dislikes,
        }
    }
}

/// Fields supplied when creating a post.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub image_url: String,
}

/// Partial update; `None` keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostChanges {
    pub title: Option<String>,
    pub content: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaction {
    Like,
    Dislike,
}

impl Reaction {
    /// Name of the counter attribute this reaction increments.
    pub fn attribute(self) -> &'static str {
        match self {
            Reaction::Like => "likes",
            Reaction::Dislike => "dislikes",
        }
    }
}

#[derive(Serialize, Debug)]
pub struct MessageResponse {
    pub message: String,
}
