use crate::errors::AppError;
use axum::{
    Json,
    body::Bytes,
    extract::{FromRequest, Multipart, Request},
    http::header,
};
use serde::Deserialize;
use tracing;

/// Multipart field carrying the attached image.
pub const IMAGE_FIELD: &str = "image";

/// A file received in the `image` field.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub data: Bytes,
}

/// Typed body of `POST /posts` and `PUT /posts/{id}`.
///
/// Accepts `multipart/form-data`, `application/json` or an empty body.
/// Every field is optional; the handlers decide the defaults.
#[derive(Debug, Default)]
pub struct PostForm {
    pub title: Option<String>,
    pub content: Option<String>,
    pub image_url: Option<String>,
    pub image: Option<UploadedFile>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct PostFields {
    title: Option<String>,
    content: Option<String>,
    image_url: Option<String>,
}

impl<S> FromRequest<S> for PostForm
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if content_type.starts_with("multipart/form-data") {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| AppError::RequestRejected(e.status(), e.body_text()))?;
            return read_multipart(multipart).await;
        }

        if content_type.starts_with("application/json") {
            let Json(fields) = Json::<PostFields>::from_request(req, state)
                .await
                .map_err(|e| AppError::RequestRejected(e.status(), e.body_text()))?;
            return Ok(PostForm {
                title: fields.title,
                content: fields.content,
                image_url: fields.image_url,
                image: None,
            });
        }

        let body = Bytes::from_request(req, state)
            .await
            .map_err(|e| AppError::RequestRejected(e.status(), e.body_text()))?;
        if !body.is_empty() {
            tracing::debug!(%content_type, bytes = body.len(), "Ignoring body with unsupported content type");
        }
        Ok(PostForm::default())
    }
}

async fn read_multipart(mut multipart: Multipart) -> Result<PostForm, AppError> {
    let mut form = PostForm::default();

    while let Some(field) = multipart.next_field().await? {
        let field_name = match field.name() {
            Some(name) => name.to_string(),
            None => continue,
        };
        match field_name.as_str() {
            "title" => form.title = Some(field.text().await?),
            "content" => form.content = Some(field.text().await?),
            "imageUrl" => form.image_url = Some(field.text().await?),
            IMAGE_FIELD => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let data = field.bytes().await?;
                // Browsers send an empty part when no file was picked.
                if file_name.is_empty() && data.is_empty() {
                    continue;
                }
                if form.image.is_some() {
                    return Err(AppError::InvalidInput(format!(
                        "Only one file may be sent in the '{}' field",
                        IMAGE_FIELD
                    )));
                }
                form.image = Some(UploadedFile { file_name, data });
            }
            _ => tracing::debug!("Ignoring unknown multipart field: {}", field_name),
        }
    }

    Ok(form)
}
