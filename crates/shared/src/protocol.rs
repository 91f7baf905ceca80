use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{Post, PostId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Like,
    Save,
    Delete,
}

impl MutationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Like => "like",
            Self::Save => "save",
            Self::Delete => "delete",
        }
    }
}

/// A change the backend is asked to confirm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum FeedMutation {
    SetLiked { post_id: PostId, liked: bool },
    SetSaved { post_id: PostId, saved: bool },
    DeletePost { post_id: PostId },
}

impl FeedMutation {
    pub fn kind(&self) -> MutationKind {
        match self {
            Self::SetLiked { .. } => MutationKind::Like,
            Self::SetSaved { .. } => MutationKind::Save,
            Self::DeletePost { .. } => MutationKind::Delete,
        }
    }

    pub fn post_id(&self) -> &PostId {
        match self {
            Self::SetLiked { post_id, .. }
            | Self::SetSaved { post_id, .. }
            | Self::DeletePost { post_id } => post_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePostRequest {
    pub caption: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePostResponse {
    pub post_id: PostId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedPage {
    pub posts: Vec<Post>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Success,
    Error,
}

/// Transient toast shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
}

impl Notification {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Error,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Screen {
    Home,
    Profile,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NavigationRequest {
    Navigate {
        screen: Screen,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        params: BTreeMap<String, String>,
    },
    Reset {
        screen: Screen,
    },
    ExitApp,
}

impl NavigationRequest {
    pub fn profile(username: impl Into<String>) -> Self {
        let mut params = BTreeMap::new();
        params.insert("username".to_string(), username.into());
        Self::Navigate {
            screen: Screen::Profile,
            params,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharePayload {
    pub title: String,
    pub message: String,
}
