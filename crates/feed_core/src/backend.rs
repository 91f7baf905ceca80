use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use shared::{
    domain::{AuthorSummary, Post, PostId, UserId},
    error::ApiError,
    protocol::{CreatePostRequest, CreatePostResponse, FeedMutation, FeedPage},
};
use tracing::debug;

use crate::config::FeedSettings;

/// Source of the initial feed and confirmer of local mutations.
#[async_trait]
pub trait FeedBackend: Send + Sync {
    async fn load_feed(&self) -> Result<Vec<Post>>;
    async fn confirm(&self, mutation: &FeedMutation) -> Result<()>;
    async fn create_post(&self, request: &CreatePostRequest) -> Result<PostId>;
}

/// Accepts every mutation after a fixed delay.
pub struct SimulatedBackend {
    confirmation_delay: Duration,
    publish_delay: Duration,
    posts: Vec<Post>,
}

impl SimulatedBackend {
    pub fn new(confirmation_delay: Duration, publish_delay: Duration, posts: Vec<Post>) -> Self {
        Self {
            confirmation_delay,
            publish_delay,
            posts,
        }
    }

    pub fn from_settings(settings: &FeedSettings, posts: Vec<Post>) -> Self {
        Self::new(
            settings.confirmation_delay(),
            settings.publish_delay(),
            posts,
        )
    }
}

#[async_trait]
impl FeedBackend for SimulatedBackend {
    async fn load_feed(&self) -> Result<Vec<Post>> {
        Ok(self.posts.clone())
    }

    async fn confirm(&self, mutation: &FeedMutation) -> Result<()> {
        debug!(kind = mutation.kind().as_str(), post_id = %mutation.post_id(), "simulating confirmation");
        tokio::time::sleep(self.confirmation_delay).await;
        Ok(())
    }

    async fn create_post(&self, _request: &CreatePostRequest) -> Result<PostId> {
        tokio::time::sleep(self.publish_delay).await;
        Ok(PostId::generate())
    }
}

pub struct HttpFeedBackend {
    http: Client,
    server_url: String,
}

impl HttpFeedBackend {
    pub fn new(server_url: impl Into<String>) -> Self {
        let server_url: String = server_url.into();
        Self {
            http: Client::new(),
            server_url: server_url.trim_end_matches('/').to_string(),
        }
    }

    async fn check(res: Response) -> Result<Response> {
        if res.status().is_success() {
            return Ok(res);
        }
        let status = res.status();
        let body = res.text().await.unwrap_or_default();
        match serde_json::from_str::<ApiError>(&body) {
            Ok(api_error) => Err(api_error.into()),
            Err(_) => Err(anyhow::anyhow!("feed backend returned {status}: {body}")),
        }
    }
}

#[async_trait]
impl FeedBackend for HttpFeedBackend {
    async fn load_feed(&self) -> Result<Vec<Post>> {
        let res = self
            .http
            .get(format!("{}/feed", self.server_url))
            .send()
            .await
            .context("failed to request feed")?;
        let page: FeedPage = Self::check(res).await?.json().await?;
        Ok(page.posts)
    }

    async fn confirm(&self, mutation: &FeedMutation) -> Result<()> {
        let res = self
            .http
            .post(format!("{}/mutations", self.server_url))
            .json(mutation)
            .send()
            .await
            .with_context(|| format!("failed to send {} mutation", mutation.kind().as_str()))?;
        Self::check(res).await?;
        Ok(())
    }

    async fn create_post(&self, request: &CreatePostRequest) -> Result<PostId> {
        let res = self
            .http
            .post(format!("{}/posts", self.server_url))
            .json(request)
            .send()
            .await
            .context("failed to send new post")?;
        let body: CreatePostResponse = Self::check(res).await?.json().await?;
        Ok(body.post_id)
    }
}

pub fn demo_posts() -> Vec<Post> {
    vec![Post {
        id: PostId::new("1"),
        author: AuthorSummary {
            user_id: UserId::new("user1"),
            full_name: "John Doe".into(),
            username: "johndoe".into(),
            avatar_url: "https://example.com/profile.jpg".into(),
            verified: true,
        },
        caption: "This is a demo post".into(),
        images: vec!["https://example.com/image.jpg".into()],
        like_count: 15,
        save_count: 3,
        comment_count: 5,
        is_liked: false,
        is_saved: false,
        is_owned_by_viewer: true,
        created_at_label: "2h ago".into(),
    }]
}

pub fn demo_viewer() -> AuthorSummary {
    AuthorSummary {
        user_id: UserId::new("user1"),
        full_name: "John Doe".into(),
        username: "johndoe".into(),
        avatar_url: "https://example.com/profile.jpg".into(),
        verified: true,
    }
}

#[cfg(test)]
#[path = "tests/backend_tests.rs"]
mod tests;
