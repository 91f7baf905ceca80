//! Outward-facing seams the controller talks to: toasts, navigation, share sheet,
//! clipboard and the media library.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::protocol::{NavigationRequest, Notification, NotificationKind, SharePayload};
use tracing::{info, warn};

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Advisory only; the controller never waits on navigation.
pub trait Navigator: Send + Sync {
    fn navigate(&self, request: NavigationRequest);
}

#[async_trait]
pub trait ShareTarget: Send + Sync {
    async fn share(&self, payload: SharePayload) -> Result<()>;
}

#[async_trait]
pub trait Clipboard: Send + Sync {
    async fn set_text(&self, text: &str) -> Result<()>;
}

#[async_trait]
pub trait MediaPicker: Send + Sync {
    async fn request_permission(&self) -> Result<bool>;
    /// `None` when the user dismissed the picker.
    async fn pick_image(&self) -> Result<Option<String>>;
}

pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: Notification) {
        match notification.kind {
            NotificationKind::Success => info!(message = %notification.message, "notification"),
            NotificationKind::Error => warn!(message = %notification.message, "notification"),
        }
    }
}

pub struct TracingNavigator;

impl Navigator for TracingNavigator {
    fn navigate(&self, request: NavigationRequest) {
        info!(?request, "navigation requested");
    }
}

pub struct MissingShareTarget;

#[async_trait]
impl ShareTarget for MissingShareTarget {
    async fn share(&self, _payload: SharePayload) -> Result<()> {
        Err(anyhow!("share sheet is unavailable"))
    }
}

pub struct MissingClipboard;

#[async_trait]
impl Clipboard for MissingClipboard {
    async fn set_text(&self, _text: &str) -> Result<()> {
        Err(anyhow!("clipboard is unavailable"))
    }
}

pub struct MissingMediaPicker;

#[async_trait]
impl MediaPicker for MissingMediaPicker {
    async fn request_permission(&self) -> Result<bool> {
        Ok(false)
    }

    async fn pick_image(&self) -> Result<Option<String>> {
        Err(anyhow!("media library is unavailable"))
    }
}
