use shared::{
    domain::PostId,
    error::{ApiError, ErrorCode},
    protocol::MutationKind,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("post {0} not found")]
    NotFound(PostId),
    #[error("post {0} is not owned by the viewer")]
    NotOwner(PostId),
    #[error("no post is staged for deletion")]
    NoPendingDeletion,
    #[error("deletion of post {0} is already being confirmed")]
    DeletionInProgress(PostId),
    #[error("{kind:?} on post {post_id} was superseded by a newer change")]
    Conflict { post_id: PostId, kind: MutationKind },
    #[error("post {0} was removed before the change was confirmed")]
    PostRemoved(PostId),
    #[error("{kind:?} on post {post_id} was rejected: {source}")]
    ConfirmationFailed {
        post_id: PostId,
        kind: MutationKind,
        source: anyhow::Error,
    },
    #[error("failed to delete post {post_id}: {source}")]
    DeletionFailed {
        post_id: PostId,
        source: anyhow::Error,
    },
    #[error("failed to share post link: {0}")]
    ShareFailure(anyhow::Error),
    #[error("media library permission was denied")]
    PermissionDenied,
    #[error("invalid post draft: {0}")]
    Validation(String),
    #[error("failed to publish post: {0}")]
    PublishFailed(anyhow::Error),
}

impl FeedError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) | Self::PostRemoved(_) | Self::NoPendingDeletion => {
                ErrorCode::NotFound
            }
            Self::NotOwner(_) | Self::PermissionDenied => ErrorCode::Forbidden,
            Self::DeletionInProgress(_) | Self::Conflict { .. } => ErrorCode::Conflict,
            Self::Validation(_) => ErrorCode::Validation,
            Self::ConfirmationFailed { .. }
            | Self::DeletionFailed { .. }
            | Self::PublishFailed(_) => ErrorCode::Unavailable,
            Self::ShareFailure(_) => ErrorCode::Internal,
        }
    }
}

impl From<&FeedError> for ApiError {
    fn from(value: &FeedError) -> Self {
        ApiError::new(value.code(), value.to_string())
    }
}
