use crate::{
    AppState,
    errors::AppError,
    forms::{PostForm, UploadedFile},
    models::{MessageResponse, NewPost, Post, PostChanges, Reaction},
    storage::{key_from_url, upload_key, url_for_key},
};
use axum::{
    Json,
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use std::sync::Arc;
use tracing;
use uuid::Uuid;

/// Ids that are not UUIDs cannot name a stored post.
fn parse_post_id(id_str: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(id_str).map_err(|_| {
        tracing::debug!(invalid_id = %id_str, "Post id is not a UUID");
        AppError::PostNotFound(id_str.to_string())
    })
}

/// Writes the uploaded file and returns its storage key.
async fn store_upload(state: &AppState, file: &UploadedFile) -> Result<String, AppError> {
    let key = upload_key(&file.file_name, Utc::now().timestamp_millis(), Uuid::new_v4());
    state.file_storage.upload(&key, &file.data).await?;
    tracing::info!(file_key = %key, bytes = file.data.len(), "Stored uploaded image");
    Ok(key)
}

/// Best-effort removal of an uploaded file; failures are only logged.
async fn discard_upload(state: &AppState, key: &str) {
    if let Err(e) = state.file_storage.delete(key).await {
        tracing::warn!(file_key = %key, error = %e, "Failed to remove uploaded image");
    }
}

/// Removes the uploaded file behind `image_url` once no stored post points at it.
/// Several posts can share one upload through a body-supplied `imageUrl`.
async fn release_image(state: &AppState, image_url: &str) {
    let Some(key) = key_from_url(image_url) else {
        return;
    };
    match state.post_repo.list_all().await {
        Ok(posts) if posts.iter().any(|post| post.image_url == image_url) => {
            tracing::debug!(file_key = %key, "Image still referenced, keeping it");
        }
        Ok(_) => discard_upload(state, key).await,
        Err(e) => {
            tracing::warn!(file_key = %key, error = %e, "Could not check image references, keeping it");
        }
    }
}

pub async fn list_posts(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    let posts = state.post_repo.list_all().await?;
    tracing::debug!("Listed {} posts", posts.len());
    Ok(Json(posts))
}

pub async fn get_post(
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
) -> Result<Json<Post>, AppError> {
    let post_id = parse_post_id(&id_str)?;
    state
        .post_repo
        .get_by_id(post_id)
        .await?
        .map(Json)
        .ok_or(AppError::PostNotFound(id_str))
}

/// POST /posts. Missing title or content are stored as empty strings.
pub async fn create_post(
    State(state): State<Arc<AppState>>,
    form: PostForm,
) -> Result<Json<Post>, AppError> {
    let image_key = match &form.image {
        Some(file) => Some(store_upload(&state, file).await?),
        None => None,
    };

    let new_post = NewPost {
        title: form.title.unwrap_or_default(),
        content: form.content.unwrap_or_default(),
        image_url: image_key.as_deref().map(url_for_key).unwrap_or_default(),
    };

    match state.post_repo.create(new_post).await {
        Ok(post) => {
            tracing::info!(post_id = %post.id, "Post created");
            Ok(Json(post))
        }
        Err(e) => {
            if let Some(key) = &image_key {
                discard_upload(&state, key).await;
            }
            Err(e.into())
        }
    }
}

/// PUT /posts/{id}. Absent fields keep their stored values; a new file
/// takes precedence over an `imageUrl` sent in the body.
pub async fn update_post(
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
    form: PostForm,
) -> Result<Json<Post>, AppError> {
    let post_id = parse_post_id(&id_str)?;
    let existing = state
        .post_repo
        .get_by_id(post_id)
        .await?
        .ok_or_else(|| AppError::PostNotFound(id_str.clone()))?;

    let new_key = match &form.image {
        Some(file) => Some(store_upload(&state, file).await?),
        None => None,
    };
    let changes = PostChanges {
        title: form.title,
        content: form.content,
        image_url: new_key.as_deref().map(url_for_key).or(form.image_url),
    };
    let image_changed = changes
        .image_url
        .as_ref()
        .is_some_and(|url| *url != existing.image_url);

    let updated = match state.post_repo.update(post_id, changes).await {
        Ok(Some(post)) => post,
        Ok(None) => {
            // Deleted between the lookup and the write.
            if let Some(key) = &new_key {
                discard_upload(&state, key).await;
            }
            return Err(AppError::PostNotFound(id_str));
        }
        Err(e) => {
            if let Some(key) = &new_key {
                discard_upload(&state, key).await;
            }
            return Err(e.into());
        }
    };

    if image_changed {
        release_image(&state, &existing.image_url).await;
    }

    tracing::info!(post_id = %post_id, "Post updated");
    Ok(Json(updated))
}

pub async fn delete_post(
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    let post_id = parse_post_id(&id_str)?;
    let removed = state
        .post_repo
        .delete(post_id)
        .await?
        .ok_or(AppError::PostNotFound(id_str))?;

    release_image(&state, &removed.image_url).await;

    tracing::info!(%post_id, "Post deleted");
    Ok(Json(MessageResponse {
        message: "Post deleted successfully".to_string(),
    }))
}

async fn react(state: &AppState, id_str: String, reaction: Reaction) -> Result<Json<Post>, AppError> {
    let post_id = parse_post_id(&id_str)?;
    let post = state
        .post_repo
        .increment(post_id, reaction)
        .await?
        .ok_or(AppError::PostNotFound(id_str))?;
    tracing::debug!(%post_id, counter = reaction.attribute(), "Counter incremented");
    Ok(Json(post))
}

pub async fn like_post(
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
) -> Result<Json<Post>, AppError> {
    react(&state, id_str, Reaction::Like).await
}

pub async fn dislike_post(
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
) -> Result<Json<Post>, AppError> {
    react(&state, id_str, Reaction::Dislike).await
}

/// Handler for GET /uploads/{filename}
pub async fn get_upload(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> Result<Response, AppError> {
    let (data, content_type) = state.file_storage.download(&filename).await?;
    Ok(([(header::CONTENT_TYPE, content_type)], data).into_response())
}
