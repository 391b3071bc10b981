//! Instagram platform implementation
//!
//! Publishes through the Graph API content-publishing flow. The Graph API
//! only accepts images by public URL, so every file is first pushed to an
//! image host (imgbb-compatible) and the returned URL is handed to Instagram.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{cancellable, ProviderClient, ProviderResult};
use crate::error::PlatformError;
use crate::types::{EngagementStats, ImageMimeType, PublishedPost, SocialPlatform};

/// Carousel containers accept at most ten children
pub const MAX_CAROUSEL_SIZE: usize = 10;

pub struct InstagramCredentials {
    pub access_token: SecretString,
    /// Instagram business account id
    pub user_id: String,
    pub image_host_key: SecretString,
}

impl InstagramCredentials {
    pub fn new(access_token: &str, user_id: &str, image_host_key: &str) -> Self {
        Self {
            access_token: SecretString::from(access_token.trim().to_string()),
            user_id: user_id.trim().to_string(),
            image_host_key: SecretString::from(image_host_key.trim().to_string()),
        }
    }
}

impl std::fmt::Debug for InstagramCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstagramCredentials")
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct ImageHostResponse {
    data: ImageHostData,
}

#[derive(Debug, Deserialize)]
struct ImageHostData {
    url: String,
}

#[derive(Debug, Deserialize)]
struct IdResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct PermalinkResponse {
    permalink: String,
}

#[derive(Debug, Deserialize)]
struct MediaFieldsResponse {
    like_count: Option<i64>,
    comments_count: Option<i64>,
}

/// Turn a response into `T`, failing on non-2xx or an unexpected body
async fn parse_response<T: DeserializeOwned>(context: &str, response: Response) -> ProviderResult<T> {
    let status = response.status();
    let body = response.text().await?;

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(PlatformError::Authentication(format!(
            "{} rejected the access token ({}): {}",
            context,
            status.as_u16(),
            body
        )));
    }
    if !status.is_success() {
        return Err(PlatformError::remote(context, status.as_u16(), body));
    }

    serde_json::from_str(&body).map_err(|e| {
        PlatformError::remote(
            context,
            status.as_u16(),
            format!("unexpected response body ({}): {}", e, body),
        )
    })
}

/// Graph API media ids are decimal numbers
fn is_media_id(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit())
}

fn non_empty_id(context: &str, response: IdResponse) -> ProviderResult<String> {
    let id = response.id.trim();
    if id.is_empty() {
        return Err(PlatformError::remote(context, 200, "response contained an empty id"));
    }
    Ok(id.to_string())
}

pub struct InstagramClient {
    http: reqwest::Client,
    graph_api_url: String,
    image_host_url: String,
    credentials: InstagramCredentials,
}

impl InstagramClient {
    pub fn new(
        http: reqwest::Client,
        graph_api_url: &str,
        image_host_url: &str,
        credentials: InstagramCredentials,
    ) -> Self {
        Self {
            http,
            graph_api_url: graph_api_url.trim_end_matches('/').to_string(),
            image_host_url: image_host_url.to_string(),
            credentials,
        }
    }

    fn graph_url(&self, path: &str) -> String {
        format!("{}/{}", self.graph_api_url, path)
    }

    fn access_token(&self) -> &str {
        self.credentials.access_token.expose_secret()
    }

    /// Push one file to the image host and return its public URL
    async fn host_image(&self, path: &Path, cancel: &CancellationToken) -> ProviderResult<String> {
        let mime = ImageMimeType::from_path(path).ok_or_else(|| {
            PlatformError::Validation(format!("{} is not a supported image", path.display()))
        })?;
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| PlatformError::UploadFailed(format!("{}: {}", path.display(), e)))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());

        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(mime.as_str())
            .map_err(|e| PlatformError::UploadFailed(e.to_string()))?;
        let form = Form::new().part("image", part);

        let response = cancellable(cancel, async {
            Ok(self
                .http
                .post(&self.image_host_url)
                .query(&[("key", self.credentials.image_host_key.expose_secret())])
                .multipart(form)
                .send()
                .await?)
        })
        .await?;

        let hosted: ImageHostResponse = parse_response("Image upload", response)
            .await
            .map_err(|e| match e {
                PlatformError::Network(_) | PlatformError::Timeout(_) => e,
                other => PlatformError::UploadFailed(format!("{}: {}", path.display(), other)),
            })?;

        if hosted.data.url.trim().is_empty() {
            return Err(PlatformError::UploadFailed(format!(
                "{}: image host returned an empty url",
                path.display()
            )));
        }

        debug!("Hosted {} at {}", path.display(), hosted.data.url);
        Ok(hosted.data.url)
    }

    /// `POST /{user}/media` with the given parameters; returns the container id
    async fn create_container(
        &self,
        context: &str,
        params: &[(&str, &str)],
        cancel: &CancellationToken,
    ) -> ProviderResult<String> {
        let url = self.graph_url(&format!("{}/media", self.credentials.user_id));
        let response = cancellable(cancel, async {
            Ok(self
                .http
                .post(&url)
                .query(params)
                .query(&[("access_token", self.access_token())])
                .send()
                .await?)
        })
        .await?;

        non_empty_id(context, parse_response(context, response).await?)
    }

    async fn publish_container(
        &self,
        creation_id: &str,
        cancel: &CancellationToken,
    ) -> ProviderResult<String> {
        let url = self.graph_url(&format!("{}/media_publish", self.credentials.user_id));
        let response = cancellable(cancel, async {
            Ok(self
                .http
                .post(&url)
                .query(&[("creation_id", creation_id), ("access_token", self.access_token())])
                .send()
                .await?)
        })
        .await?;

        non_empty_id("Publish media", parse_response("Publish media", response).await?)
    }

    /// GET `{media_id}?fields=...`; the id becomes a path segment
    async fn media_fields<T: DeserializeOwned>(
        &self,
        context: &str,
        media_id: &str,
        fields: &str,
        cancel: &CancellationToken,
    ) -> ProviderResult<T> {
        let media_id = media_id.trim();
        if !is_media_id(media_id) {
            return Err(PlatformError::Validation(format!(
                "'{}' is not an Instagram media id",
                media_id
            )));
        }

        let url = self.graph_url(media_id);
        let response = cancellable(cancel, async {
            Ok(self
                .http
                .get(&url)
                .query(&[("fields", fields), ("access_token", self.access_token())])
                .send()
                .await?)
        })
        .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(PlatformError::NotFound(format!("Instagram media {}", media_id)));
        }
        parse_response(context, response).await
    }
}

#[async_trait]
impl ProviderClient for InstagramClient {
    fn platform(&self) -> SocialPlatform {
        SocialPlatform::Instagram
    }

    async fn create_post(
        &self,
        text: &str,
        files: &[PathBuf],
        cancel: &CancellationToken,
    ) -> ProviderResult<PublishedPost> {
        if files.is_empty() {
            return Err(PlatformError::Validation(
                "Instagram posts need at least one image".to_string(),
            ));
        }
        if files.len() > MAX_CAROUSEL_SIZE {
            return Err(PlatformError::Validation(format!(
                "Instagram carousels hold at most {} images (got {})",
                MAX_CAROUSEL_SIZE,
                files.len()
            )));
        }

        let mut urls = Vec::with_capacity(files.len());
        for path in files {
            urls.push(self.host_image(path, cancel).await?);
        }

        let creation_id = if let [url] = urls.as_slice() {
            self.create_container(
                "Create media container",
                &[("image_url", url.as_str()), ("caption", text)],
                cancel,
            )
            .await?
        } else {
            let mut children = Vec::with_capacity(urls.len());
            for url in &urls {
                let child = self
                    .create_container(
                        "Create carousel item",
                        &[("image_url", url.as_str()), ("is_carousel_item", "true")],
                        cancel,
                    )
                    .await?;
                children.push(child);
            }

            let children = children.join(",");
            self.create_container(
                "Create carousel container",
                &[
                    ("media_type", "CAROUSEL"),
                    ("children", children.as_str()),
                    ("caption", text),
                ],
                cancel,
            )
            .await?
        };

        let media_id = self.publish_container(&creation_id, cancel).await?;

        info!(
            "Published {} image(s) to Instagram account {} as media {}",
            files.len(),
            self.credentials.user_id,
            media_id
        );

        Ok(PublishedPost {
            channel_id: self.credentials.user_id.clone(),
            remote_id: media_id,
            platform: SocialPlatform::Instagram,
        })
    }

    async fn engagement_stats(
        &self,
        post_id: &str,
        cancel: &CancellationToken,
    ) -> ProviderResult<EngagementStats> {
        let fields: MediaFieldsResponse = self
            .media_fields("Fetch media insights", post_id, "like_count,comments_count", cancel)
            .await?;

        // Views and forwards are not exposed for feed media
        Ok(EngagementStats {
            views: -1,
            reactions: fields.like_count.unwrap_or(-1),
            comments: fields.comments_count.unwrap_or(-1),
            forwards: -1,
        })
    }

    async fn post_link(&self, post_id: &str, cancel: &CancellationToken) -> ProviderResult<String> {
        let response: PermalinkResponse = self
            .media_fields("Fetch permalink", post_id, "permalink", cancel)
            .await?;

        if response.permalink.trim().is_empty() {
            return Err(PlatformError::remote(
                "Fetch permalink",
                200,
                "response contained an empty permalink",
            ));
        }
        Ok(response.permalink)
    }
}
