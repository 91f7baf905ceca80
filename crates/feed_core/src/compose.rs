use chrono::Utc;
use shared::{
    domain::{age_label, Post},
    protocol::{CreatePostRequest, Notification},
};
use tracing::{info, warn};

use crate::{FeedController, FeedError, FeedEvent};

const MSG_PERMISSION_DENIED: &str = "Permission to access gallery was denied";
const MSG_PUBLISHED: &str = "Post Created Successfully!";
const MSG_PUBLISH_FAILED: &str = "Post Creation Failed!";

/// Text and image the viewer is preparing to post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeDraft {
    caption: String,
    image: Option<String>,
    max_chars: usize,
}

impl ComposeDraft {
    pub fn new(max_chars: usize) -> Self {
        Self {
            caption: String::new(),
            image: None,
            max_chars,
        }
    }

    pub fn caption(&self) -> &str {
        &self.caption
    }

    pub fn image(&self) -> Option<&str> {
        self.image.as_deref()
    }

    pub fn set_caption(&mut self, caption: impl Into<String>) -> Result<(), FeedError> {
        let caption = caption.into();
        let len = caption.chars().count();
        if len > self.max_chars {
            return Err(FeedError::Validation(format!(
                "caption is {len} characters, limit is {}",
                self.max_chars
            )));
        }
        self.caption = caption;
        Ok(())
    }

    pub fn attach_image(&mut self, uri: impl Into<String>) {
        self.image = Some(uri.into());
    }

    pub fn remove_image(&mut self) -> Option<String> {
        self.image.take()
    }

    pub fn is_empty(&self) -> bool {
        self.caption.trim().is_empty() && self.image.is_none()
    }

    pub fn clear(&mut self) {
        self.caption.clear();
        self.image = None;
    }

    fn to_request(&self) -> CreatePostRequest {
        CreatePostRequest {
            caption: self.caption.trim().to_string(),
            images: self.image.iter().cloned().collect(),
        }
    }
}

impl FeedController {
    pub fn new_draft(&self) -> ComposeDraft {
        ComposeDraft::new(self.settings.caption_max_chars)
    }

    /// Returns whether an image was attached; a dismissed picker leaves the draft as is.
    pub async fn pick_image(&self, draft: &mut ComposeDraft) -> Result<bool, FeedError> {
        let granted = self.media.request_permission().await.unwrap_or_else(|err| {
            warn!(error = %err, "media permission request failed");
            false
        });
        if !granted {
            self.notify(Notification::error(MSG_PERMISSION_DENIED));
            return Err(FeedError::PermissionDenied);
        }

        match self.media.pick_image().await {
            Ok(Some(uri)) => {
                draft.attach_image(uri);
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(err) => {
                warn!(error = %err, "image picker failed");
                Ok(false)
            }
        }
    }

    /// Creates the post, puts it at the top of the feed and clears the draft.
    pub async fn publish(&self, draft: &mut ComposeDraft) -> Result<Post, FeedError> {
        if draft.is_empty() {
            return Err(FeedError::Validation(
                "post needs a caption or an image".into(),
            ));
        }
        let request = draft.to_request();

        let post_id = match self.backend.create_post(&request).await {
            Ok(post_id) => post_id,
            Err(err) => {
                warn!(error = %err, "post creation failed");
                self.notify(Notification::error(MSG_PUBLISH_FAILED));
                return Err(FeedError::PublishFailed(err));
            }
        };

        let now = Utc::now();
        let post = Post {
            id: post_id,
            author: self.viewer.clone(),
            caption: request.caption,
            images: request.images,
            like_count: 0,
            save_count: 0,
            comment_count: 0,
            is_liked: false,
            is_saved: false,
            is_owned_by_viewer: true,
            created_at_label: age_label(now, now),
        };

        {
            let mut state = self.state.lock().await;
            if state.entries.contains_key(&post.id) {
                warn!(post_id = %post.id, "backend returned an id already in the feed");
                drop(state);
                self.notify(Notification::error(MSG_PUBLISH_FAILED));
                return Err(FeedError::PublishFailed(anyhow::anyhow!(
                    "duplicate post id {}",
                    post.id
                )));
            }
            state.insert_front(post.clone());
        }

        draft.clear();
        info!(post_id = %post.id, "post published");
        self.emit(FeedEvent::PostAdded(post.clone()));
        self.notify(Notification::success(MSG_PUBLISHED));
        Ok(post)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caption_over_limit_is_rejected_and_previous_text_kept() {
        let mut draft = ComposeDraft::new(5);
        draft.set_caption("hello").expect("fits");
        let err = draft.set_caption("hello!").expect_err("too long");
        assert!(matches!(err, FeedError::Validation(_)));
        assert_eq!(draft.caption(), "hello");
    }

    #[test]
    fn limit_counts_characters_not_bytes() {
        let mut draft = ComposeDraft::new(3);
        draft.set_caption("héé").expect("three chars");
    }

    #[test]
    fn draft_with_only_image_is_not_empty() {
        let mut draft = ComposeDraft::new(500);
        assert!(draft.is_empty());
        draft.set_caption("   ").expect("caption");
        assert!(draft.is_empty());
        draft.attach_image("file:///tmp/cat.jpg");
        assert!(!draft.is_empty());
        assert_eq!(draft.remove_image().as_deref(), Some("file:///tmp/cat.jpg"));
        assert!(draft.is_empty());
    }

    #[test]
    fn request_trims_caption_and_carries_image() {
        let mut draft = ComposeDraft::new(500);
        draft.set_caption("  sunset  ").expect("caption");
        draft.attach_image("file:///tmp/sunset.jpg");
        let request = draft.to_request();
        assert_eq!(request.caption, "sunset");
        assert_eq!(request.images, vec!["file:///tmp/sunset.jpg".to_string()]);
    }
}
