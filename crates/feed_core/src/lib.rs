use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use anyhow::{anyhow, Result};
use shared::{
    domain::{AuthorSummary, Post, PostId},
    protocol::{FeedMutation, MutationKind, NavigationRequest, Notification, SharePayload},
};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};
use url::Url;

pub mod backend;
pub mod collaborators;
pub mod compose;
pub mod config;
pub mod error;
pub mod session;

use backend::{FeedBackend, SimulatedBackend};
use collaborators::{
    Clipboard, MediaPicker, MissingClipboard, MissingMediaPicker, MissingShareTarget, Navigator,
    Notifier, ShareTarget, TracingNavigator, TracingNotifier,
};
use config::FeedSettings;
pub use compose::ComposeDraft;
pub use error::FeedError;

const EVENT_BUFFER: usize = 256;
const OWN_PROFILE_USERNAME: &str = "me";

const MSG_DELETED: &str = "Post deleted successfully";
const MSG_DELETE_FAILED: &str = "Failed to delete post";
const MSG_SHARE_FAILED: &str = "Error sharing post";
const MSG_LINK_COPIED: &str = "Link copied to clipboard";
const MSG_COPY_FAILED: &str = "Error copying link";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionState {
    Active,
    PendingDeletion,
    Deleting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostAction {
    Edit,
    Delete,
    CopyLink,
    Share,
    Save,
}

/// A post as the feed should render it: committed state with any pending
/// like/save toggles applied on top.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostView {
    pub post: Post,
    pub like_pending: bool,
    pub save_pending: bool,
    pub deletion: DeletionState,
}

#[derive(Debug, Clone)]
pub enum FeedEvent {
    PostUpdated(Post),
    PostAdded(Post),
    PostRemoved(PostId),
    InFlightChanged {
        kind: MutationKind,
        post_id: PostId,
        in_flight: bool,
    },
    DeletionStaged(PostId),
    DeletionCleared(PostId),
    Notification(Notification),
}

pub struct FeedDependencies {
    pub backend: Arc<dyn FeedBackend>,
    pub notifier: Arc<dyn Notifier>,
    pub navigator: Arc<dyn Navigator>,
    pub share: Arc<dyn ShareTarget>,
    pub clipboard: Arc<dyn Clipboard>,
    pub media: Arc<dyn MediaPicker>,
}

impl FeedDependencies {
    pub fn with_backend(backend: Arc<dyn FeedBackend>) -> Self {
        Self {
            backend,
            notifier: Arc::new(TracingNotifier),
            navigator: Arc::new(TracingNavigator),
            share: Arc::new(MissingShareTarget),
            clipboard: Arc::new(MissingClipboard),
            media: Arc::new(MissingMediaPicker),
        }
    }

    pub fn simulated(settings: &FeedSettings, posts: Vec<Post>) -> Self {
        Self::with_backend(Arc::new(SimulatedBackend::from_settings(settings, posts)))
    }
}

/// Which boolean of a post a toggle flips.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ToggleField {
    Like,
    Save,
}

impl ToggleField {
    fn kind(self) -> MutationKind {
        match self {
            Self::Like => MutationKind::Like,
            Self::Save => MutationKind::Save,
        }
    }

    fn current(self, post: &Post) -> bool {
        match self {
            Self::Like => post.is_liked,
            Self::Save => post.is_saved,
        }
    }

    fn apply(self, post: &mut Post, value: bool) {
        match self {
            Self::Like => post.set_liked(value),
            Self::Save => post.set_saved(value),
        }
    }

    fn mutation(self, post_id: PostId, value: bool) -> FeedMutation {
        match self {
            Self::Like => FeedMutation::SetLiked {
                post_id,
                liked: value,
            },
            Self::Save => FeedMutation::SetSaved {
                post_id,
                saved: value,
            },
        }
    }

    fn failure_message(self) -> &'static str {
        match self {
            Self::Like => "Could not update like",
            Self::Save => "Could not update save",
        }
    }
}

struct PostEntry {
    post: Post,
    like_revision: u64,
    save_revision: u64,
}

impl PostEntry {
    fn new(post: Post) -> Self {
        Self {
            post,
            like_revision: 0,
            save_revision: 0,
        }
    }

    fn revision(&self, field: ToggleField) -> u64 {
        match field {
            ToggleField::Like => self.like_revision,
            ToggleField::Save => self.save_revision,
        }
    }

    fn bump(&mut self, field: ToggleField) {
        match field {
            ToggleField::Like => self.like_revision += 1,
            ToggleField::Save => self.save_revision += 1,
        }
    }
}

struct PendingMutation {
    post_id: PostId,
    field: ToggleField,
    target: bool,
    base_revision: u64,
}

#[derive(Default)]
struct FeedState {
    entries: HashMap<PostId, PostEntry>,
    order: Vec<PostId>,
    in_flight: HashMap<(MutationKind, PostId), usize>,
    pending: HashMap<u64, PendingMutation>,
    next_op: u64,
    pending_deletion: Option<Post>,
}

impl FeedState {
    fn from_posts(posts: Vec<Post>) -> Self {
        let mut state = Self::default();
        for post in posts {
            if state.entries.contains_key(&post.id) {
                warn!(post_id = %post.id, "skipping duplicate post in feed");
                continue;
            }
            state.order.push(post.id.clone());
            state.entries.insert(post.id.clone(), PostEntry::new(post));
        }
        state
    }

    fn ordered_posts(&self) -> Vec<Post> {
        self.order
            .iter()
            .filter_map(|id| self.entries.get(id))
            .map(|entry| entry.post.clone())
            .collect()
    }

    fn is_in_flight(&self, kind: MutationKind, post_id: &PostId) -> bool {
        self.in_flight.contains_key(&(kind, post_id.clone()))
    }

    /// Returns true when the post was not in flight for `kind` before.
    fn mark_in_flight(&mut self, kind: MutationKind, post_id: &PostId) -> bool {
        let count = self.in_flight.entry((kind, post_id.clone())).or_insert(0);
        *count += 1;
        *count == 1
    }

    /// Returns true when the last pending operation of `kind` on the post finished.
    fn clear_in_flight(&mut self, kind: MutationKind, post_id: &PostId) -> bool {
        let key = (kind, post_id.clone());
        match self.in_flight.get_mut(&key) {
            Some(count) if *count > 1 => {
                *count -= 1;
                false
            }
            Some(_) => {
                self.in_flight.remove(&key);
                true
            }
            None => false,
        }
    }

    fn deleting(&self) -> Option<&PostId> {
        self.pending_deletion
            .as_ref()
            .map(|post| &post.id)
            .filter(|id| self.is_in_flight(MutationKind::Delete, id))
    }

    fn deletion_state(&self, post_id: &PostId) -> DeletionState {
        match &self.pending_deletion {
            Some(staged) if &staged.id == post_id => {
                if self.is_in_flight(MutationKind::Delete, post_id) {
                    DeletionState::Deleting
                } else {
                    DeletionState::PendingDeletion
                }
            }
            _ => DeletionState::Active,
        }
    }

    fn commit_toggle(
        &mut self,
        field: ToggleField,
        post_id: &PostId,
        target: bool,
        base_revision: u64,
    ) -> Result<Post, FeedError> {
        let entry = self
            .entries
            .get_mut(post_id)
            .ok_or_else(|| FeedError::PostRemoved(post_id.clone()))?;
        if entry.revision(field) != base_revision {
            return Err(FeedError::Conflict {
                post_id: post_id.clone(),
                kind: field.kind(),
            });
        }
        field.apply(&mut entry.post, target);
        entry.bump(field);
        Ok(entry.post.clone())
    }

    fn view(&self, entry: &PostEntry) -> PostView {
        let mut post = entry.post.clone();
        for pending in self.pending.values() {
            if pending.post_id == post.id && pending.base_revision == entry.revision(pending.field)
            {
                pending.field.apply(&mut post, pending.target);
            }
        }
        PostView {
            like_pending: self.is_in_flight(MutationKind::Like, &post.id),
            save_pending: self.is_in_flight(MutationKind::Save, &post.id),
            deletion: self.deletion_state(&post.id),
            post,
        }
    }

    fn remove_post(&mut self, post_id: &PostId) -> Option<Post> {
        let entry = self.entries.remove(post_id)?;
        self.order.retain(|id| id != post_id);
        Some(entry.post)
    }

    fn insert_front(&mut self, post: Post) {
        self.order.insert(0, post.id.clone());
        self.entries.insert(post.id.clone(), PostEntry::new(post));
    }
}

/// Owns the feed and applies like/save/delete through a confirmation step.
pub struct FeedController {
    settings: FeedSettings,
    share_base: Url,
    viewer: AuthorSummary,
    backend: Arc<dyn FeedBackend>,
    notifier: Arc<dyn Notifier>,
    navigator: Arc<dyn Navigator>,
    share: Arc<dyn ShareTarget>,
    clipboard: Arc<dyn Clipboard>,
    media: Arc<dyn MediaPicker>,
    state: Mutex<FeedState>,
    events: broadcast::Sender<FeedEvent>,
}

impl FeedController {
    pub fn new(
        settings: FeedSettings,
        viewer: AuthorSummary,
        posts: Vec<Post>,
        deps: FeedDependencies,
    ) -> Result<Arc<Self>> {
        let share_base = settings.share_base()?;
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Ok(Arc::new(Self {
            settings,
            share_base,
            viewer,
            backend: deps.backend,
            notifier: deps.notifier,
            navigator: deps.navigator,
            share: deps.share,
            clipboard: deps.clipboard,
            media: deps.media,
            state: Mutex::new(FeedState::from_posts(posts)),
            events,
        }))
    }

    /// Builds a controller seeded from the backend's feed.
    pub async fn load(
        settings: FeedSettings,
        viewer: AuthorSummary,
        deps: FeedDependencies,
    ) -> Result<Arc<Self>> {
        let posts = deps.backend.load_feed().await?;
        info!(count = posts.len(), "feed loaded");
        Self::new(settings, viewer, posts, deps)
    }

    pub fn settings(&self) -> &FeedSettings {
        &self.settings
    }

    pub fn viewer(&self) -> &AuthorSummary {
        &self.viewer
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<FeedEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: FeedEvent) {
        let _ = self.events.send(event);
    }

    fn notify(&self, notification: Notification) {
        self.notifier.notify(notification.clone());
        self.emit(FeedEvent::Notification(notification));
    }

    pub async fn posts(&self) -> Vec<Post> {
        self.state.lock().await.ordered_posts()
    }

    pub async fn post(&self, post_id: &PostId) -> Option<Post> {
        self.state
            .lock()
            .await
            .entries
            .get(post_id)
            .map(|entry| entry.post.clone())
    }

    pub async fn feed_view(&self) -> Vec<PostView> {
        let state = self.state.lock().await;
        state
            .order
            .iter()
            .filter_map(|id| state.entries.get(id))
            .map(|entry| state.view(entry))
            .collect()
    }

    pub async fn is_in_flight(&self, kind: MutationKind, post_id: &PostId) -> bool {
        self.state.lock().await.is_in_flight(kind, post_id)
    }

    pub async fn in_flight(&self, kind: MutationKind) -> HashSet<PostId> {
        self.state
            .lock()
            .await
            .in_flight
            .keys()
            .filter(|(k, _)| *k == kind)
            .map(|(_, id)| id.clone())
            .collect()
    }

    pub async fn pending_deletion(&self) -> Option<Post> {
        self.state.lock().await.pending_deletion.clone()
    }

    /// `None` once the post is gone from the feed.
    pub async fn deletion_state(&self, post_id: &PostId) -> Option<DeletionState> {
        let state = self.state.lock().await;
        state
            .entries
            .contains_key(post_id)
            .then(|| state.deletion_state(post_id))
    }

    pub async fn post_actions(&self, post_id: &PostId) -> Result<Vec<PostAction>, FeedError> {
        let state = self.state.lock().await;
        let entry = state
            .entries
            .get(post_id)
            .ok_or_else(|| FeedError::NotFound(post_id.clone()))?;
        let mut actions = Vec::with_capacity(5);
        if entry.post.is_owned_by_viewer {
            actions.extend([PostAction::Edit, PostAction::Delete]);
        }
        actions.extend([PostAction::CopyLink, PostAction::Share, PostAction::Save]);
        Ok(actions)
    }

    pub async fn toggle_like(self: &Arc<Self>, post_id: &PostId) -> Result<Post, FeedError> {
        self.toggle(ToggleField::Like, post_id).await
    }

    pub async fn toggle_save(self: &Arc<Self>, post_id: &PostId) -> Result<Post, FeedError> {
        self.toggle(ToggleField::Save, post_id).await
    }

    /// Confirmation and commit run on a spawned task; dropping the returned future does not
    /// abandon the change.
    async fn toggle(
        self: &Arc<Self>,
        field: ToggleField,
        post_id: &PostId,
    ) -> Result<Post, FeedError> {
        let kind = field.kind();
        let (op_id, target, base_revision) = {
            let mut state = self.state.lock().await;
            let entry = state
                .entries
                .get(post_id)
                .ok_or_else(|| FeedError::NotFound(post_id.clone()))?;
            let target = !field.current(&entry.post);
            let base_revision = entry.revision(field);

            let op_id = state.next_op;
            state.next_op += 1;
            state.pending.insert(
                op_id,
                PendingMutation {
                    post_id: post_id.clone(),
                    field,
                    target,
                    base_revision,
                },
            );
            if state.mark_in_flight(kind, post_id) {
                self.emit(FeedEvent::InFlightChanged {
                    kind,
                    post_id: post_id.clone(),
                    in_flight: true,
                });
            }
            (op_id, target, base_revision)
        };

        debug!(op_id, kind = kind.as_str(), post_id = %post_id, target, "awaiting confirmation");
        let controller = Arc::clone(self);
        let task_post_id = post_id.clone();
        let task = tokio::spawn(async move {
            let mutation = field.mutation(task_post_id.clone(), target);
            let outcome = controller.backend.confirm(&mutation).await;
            controller
                .finish_toggle(op_id, field, &task_post_id, target, base_revision, outcome)
                .await
        });
        task.await.unwrap_or_else(|err| {
            Err(FeedError::ConfirmationFailed {
                post_id: post_id.clone(),
                kind,
                source: err.into(),
            })
        })
    }

    async fn finish_toggle(
        &self,
        op_id: u64,
        field: ToggleField,
        post_id: &PostId,
        target: bool,
        base_revision: u64,
        outcome: Result<()>,
    ) -> Result<Post, FeedError> {
        let kind = field.kind();
        let result = {
            let mut state = self.state.lock().await;
            state.pending.remove(&op_id);
            if state.clear_in_flight(kind, post_id) {
                self.emit(FeedEvent::InFlightChanged {
                    kind,
                    post_id: post_id.clone(),
                    in_flight: false,
                });
            }
            match outcome {
                Ok(()) => state.commit_toggle(field, post_id, target, base_revision),
                Err(source) => Err(FeedError::ConfirmationFailed {
                    post_id: post_id.clone(),
                    kind,
                    source,
                }),
            }
        };

        match &result {
            Ok(post) => {
                info!(kind = kind.as_str(), post_id = %post_id, value = target, "change committed");
                self.emit(FeedEvent::PostUpdated(post.clone()));
            }
            Err(err) => {
                warn!(kind = kind.as_str(), post_id = %post_id, error = %err, "change not committed");
                self.notify(Notification::error(field.failure_message()));
            }
        }
        result
    }

    /// Stages an own post for deletion, replacing any previously staged one.
    pub async fn request_delete(&self, post_id: &PostId) -> Result<Post, FeedError> {
        let (post, previous) = {
            let mut state = self.state.lock().await;
            if let Some(deleting) = state.deleting() {
                return Err(FeedError::DeletionInProgress(deleting.clone()));
            }
            let entry = state
                .entries
                .get(post_id)
                .ok_or_else(|| FeedError::NotFound(post_id.clone()))?;
            if !entry.post.is_owned_by_viewer {
                return Err(FeedError::NotOwner(post_id.clone()));
            }
            let post = entry.post.clone();
            let previous = state.pending_deletion.replace(post.clone());
            (post, previous)
        };

        if let Some(previous) = previous {
            if previous.id != post.id {
                self.emit(FeedEvent::DeletionCleared(previous.id));
            }
        }
        debug!(post_id = %post.id, "deletion staged");
        self.emit(FeedEvent::DeletionStaged(post.id.clone()));
        Ok(post)
    }

    /// Returns the post that was staged, if any.
    pub async fn cancel_delete(&self) -> Result<Option<Post>, FeedError> {
        let cleared = {
            let mut state = self.state.lock().await;
            if let Some(deleting) = state.deleting() {
                return Err(FeedError::DeletionInProgress(deleting.clone()));
            }
            state.pending_deletion.take()
        };
        if let Some(post) = &cleared {
            debug!(post_id = %post.id, "deletion cancelled");
            self.emit(FeedEvent::DeletionCleared(post.id.clone()));
        }
        Ok(cleared)
    }

    /// Once started, the confirmation runs to completion on a spawned task.
    pub async fn confirm_delete(self: &Arc<Self>) -> Result<Post, FeedError> {
        let staged = {
            let mut state = self.state.lock().await;
            if let Some(deleting) = state.deleting() {
                return Err(FeedError::DeletionInProgress(deleting.clone()));
            }
            let staged = state
                .pending_deletion
                .clone()
                .ok_or(FeedError::NoPendingDeletion)?;
            state.mark_in_flight(MutationKind::Delete, &staged.id);
            staged
        };
        let post_id = staged.id.clone();
        self.emit(FeedEvent::InFlightChanged {
            kind: MutationKind::Delete,
            post_id: post_id.clone(),
            in_flight: true,
        });

        let controller = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mutation = FeedMutation::DeletePost {
                post_id: staged.id.clone(),
            };
            let outcome = controller.backend.confirm(&mutation).await;
            controller.finish_delete(staged, outcome).await
        });
        task.await.unwrap_or_else(|err| {
            Err(FeedError::DeletionFailed {
                post_id,
                source: err.into(),
            })
        })
    }

    async fn finish_delete(&self, staged: Post, outcome: Result<()>) -> Result<Post, FeedError> {
        let post_id = staged.id.clone();
        let removed = {
            let mut state = self.state.lock().await;
            state.clear_in_flight(MutationKind::Delete, &post_id);
            if state
                .pending_deletion
                .as_ref()
                .is_some_and(|post| post.id == post_id)
            {
                state.pending_deletion = None;
            }
            outcome.map(|()| state.remove_post(&post_id))
        };

        self.emit(FeedEvent::InFlightChanged {
            kind: MutationKind::Delete,
            post_id: post_id.clone(),
            in_flight: false,
        });
        self.emit(FeedEvent::DeletionCleared(post_id.clone()));

        match removed {
            Ok(removed) => {
                info!(post_id = %post_id, "post deleted");
                self.emit(FeedEvent::PostRemoved(post_id));
                self.notify(Notification::success(MSG_DELETED));
                Ok(removed.unwrap_or(staged))
            }
            Err(source) => {
                warn!(post_id = %post_id, error = %source, "post deletion failed");
                self.notify(Notification::error(MSG_DELETE_FAILED));
                Err(FeedError::DeletionFailed { post_id, source })
            }
        }
    }

    /// Canonical link for a post; does not require the post to be loaded.
    pub fn post_link(&self, post_id: &PostId) -> Result<Url, FeedError> {
        let mut url = self.share_base.clone();
        url.path_segments_mut()
            .map_err(|_| FeedError::ShareFailure(anyhow!("share base url cannot hold a path")))?
            .pop_if_empty()
            .push(post_id.as_str());
        Ok(url)
    }

    pub async fn share_link(&self, post_id: &PostId) -> Result<Url, FeedError> {
        let url = self.post_link(post_id)?;
        let payload = SharePayload {
            title: self.settings.share_title.clone(),
            message: url.to_string(),
        };
        if let Err(err) = self.share.share(payload).await {
            warn!(post_id = %post_id, error = %err, "share failed");
            self.notify(Notification::error(MSG_SHARE_FAILED));
            return Err(FeedError::ShareFailure(err));
        }
        Ok(url)
    }

    pub async fn copy_link(&self, post_id: &PostId) -> Result<Url, FeedError> {
        let url = self.post_link(post_id)?;
        if let Err(err) = self.clipboard.set_text(url.as_str()).await {
            warn!(post_id = %post_id, error = %err, "copy link failed");
            self.notify(Notification::error(MSG_COPY_FAILED));
            return Err(FeedError::ShareFailure(err));
        }
        self.notify(Notification::success(MSG_LINK_COPIED));
        Ok(url)
    }

    /// Own posts open the viewer's profile as `me`.
    pub async fn open_author_profile(
        &self,
        post_id: &PostId,
    ) -> Result<NavigationRequest, FeedError> {
        let username = {
            let state = self.state.lock().await;
            let entry = state
                .entries
                .get(post_id)
                .ok_or_else(|| FeedError::NotFound(post_id.clone()))?;
            if entry.post.is_owned_by_viewer {
                OWN_PROFILE_USERNAME.to_string()
            } else {
                entry.post.author.username.clone()
            }
        };
        let request = NavigationRequest::profile(username);
        self.navigator.navigate(request.clone());
        Ok(request)
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
