use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

id_newtype!(PostId);
id_newtype!(UserId);

impl PostId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorSummary {
    pub user_id: UserId,
    pub full_name: String,
    pub username: String,
    pub avatar_url: String,
    #[serde(default)]
    pub verified: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub author: AuthorSummary,
    pub caption: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub like_count: u64,
    #[serde(default)]
    pub save_count: u64,
    #[serde(default)]
    pub comment_count: u64,
    #[serde(default)]
    pub is_liked: bool,
    #[serde(default)]
    pub is_saved: bool,
    #[serde(default)]
    pub is_owned_by_viewer: bool,
    pub created_at_label: String,
}

impl Post {
    /// Flips `is_liked` and moves `like_count` in the same direction.
    pub fn toggle_like(&mut self) {
        self.set_liked(!self.is_liked);
    }

    pub fn toggle_save(&mut self) {
        self.set_saved(!self.is_saved);
    }

    /// Applies the like flag, adjusting the count only when the flag changes.
    pub fn set_liked(&mut self, liked: bool) {
        if self.is_liked == liked {
            return;
        }
        self.is_liked = liked;
        self.like_count = if liked {
            self.like_count.saturating_add(1)
        } else {
            self.like_count.saturating_sub(1)
        };
    }

    pub fn set_saved(&mut self, saved: bool) {
        if self.is_saved == saved {
            return;
        }
        self.is_saved = saved;
        self.save_count = if saved {
            self.save_count.saturating_add(1)
        } else {
            self.save_count.saturating_sub(1)
        };
    }

    pub fn cover_image(&self) -> Option<&str> {
        self.images.first().map(String::as_str)
    }
}

/// Short relative label ("just now", "5m ago", "2h ago", "3d ago").
pub fn age_label(created_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(created_at);
    if elapsed.num_minutes() < 1 {
        "just now".to_string()
    } else if elapsed.num_hours() < 1 {
        format!("{}m ago", elapsed.num_minutes())
    } else if elapsed.num_days() < 1 {
        format!("{}h ago", elapsed.num_hours())
    } else {
        format!("{}d ago", elapsed.num_days())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn post(like_count: u64, is_liked: bool) -> Post {
        Post {
            id: PostId::new("1"),
            author: AuthorSummary {
                user_id: UserId::new("user1"),
                full_name: "John Doe".into(),
                username: "johndoe".into(),
                avatar_url: "https://example.com/profile.jpg".into(),
                verified: true,
            },
            caption: "This is a demo post".into(),
            images: vec![],
            like_count,
            save_count: 0,
            comment_count: 0,
            is_liked,
            is_saved: false,
            is_owned_by_viewer: false,
            created_at_label: "2h ago".into(),
        }
    }

    #[test]
    fn toggle_like_pairs_flag_and_count() {
        let mut p = post(15, false);
        p.toggle_like();
        assert!(p.is_liked);
        assert_eq!(p.like_count, 16);
        p.toggle_like();
        assert!(!p.is_liked);
        assert_eq!(p.like_count, 15);
    }

    #[test]
    fn unlike_never_underflows() {
        let mut p = post(0, true);
        p.toggle_like();
        assert!(!p.is_liked);
        assert_eq!(p.like_count, 0);
    }

    #[test]
    fn set_saved_is_noop_when_flag_matches() {
        let mut p = post(0, false);
        p.set_saved(false);
        assert_eq!(p.save_count, 0);
        p.set_saved(true);
        p.set_saved(true);
        assert_eq!(p.save_count, 1);
    }

    #[test]
    fn cover_image_is_the_first_image() {
        let mut p = post(0, false);
        p.images = vec!["a.jpg".into(), "b.jpg".into()];
        assert_eq!(p.cover_image(), Some("a.jpg"));
        p.images.clear();
        assert_eq!(p.cover_image(), None);
    }

    #[test]
    fn age_labels_cover_each_bucket() {
        let now = Utc::now();
        assert_eq!(age_label(now, now), "just now");
        assert_eq!(age_label(now - Duration::minutes(5), now), "5m ago");
        assert_eq!(age_label(now - Duration::hours(2), now), "2h ago");
        assert_eq!(age_label(now - Duration::days(3), now), "3d ago");
    }

    #[test]
    fn post_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&PostId::new("abc")).expect("json");
        assert_eq!(json, "\"abc\"");
    }
}
