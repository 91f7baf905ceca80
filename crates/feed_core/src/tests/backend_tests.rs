use super::*;
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use shared::{error::ErrorCode, protocol::MutationKind};
use std::sync::Arc;
use tokio::{net::TcpListener, sync::Mutex};

#[derive(Clone, Default)]
struct ServerState {
    mutations: Arc<Mutex<Vec<FeedMutation>>>,
    created: Arc<Mutex<Vec<String>>>,
}

async fn handle_feed() -> Json<FeedPage> {
    Json(FeedPage {
        posts: demo_posts(),
    })
}

async fn handle_mutation(
    State(state): State<ServerState>,
    Json(mutation): Json<FeedMutation>,
) -> Result<StatusCode, (StatusCode, Json<ApiError>)> {
    if mutation.kind() == MutationKind::Delete && mutation.post_id().as_str() == "locked" {
        return Err((
            StatusCode::CONFLICT,
            Json(ApiError::new(ErrorCode::Conflict, "post is locked")),
        ));
    }
    state.mutations.lock().await.push(mutation);
    Ok(StatusCode::NO_CONTENT)
}

async fn handle_create(
    State(state): State<ServerState>,
    Json(request): Json<CreatePostRequest>,
) -> Json<CreatePostResponse> {
    state.created.lock().await.push(request.caption);
    Json(CreatePostResponse {
        post_id: PostId::new("srv-42"),
    })
}

async fn spawn_feed_server() -> anyhow::Result<(String, ServerState)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let state = ServerState::default();
    let app = Router::new()
        .route("/feed", get(handle_feed))
        .route("/mutations", post(handle_mutation))
        .route("/posts", post(handle_create))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}/"), state))
}

#[tokio::test]
async fn http_backend_loads_feed() {
    let (url, _) = spawn_feed_server().await.expect("server");
    let backend = HttpFeedBackend::new(url);

    let posts = backend.load_feed().await.expect("feed");

    assert_eq!(posts, demo_posts());
}

#[tokio::test]
async fn http_backend_posts_tagged_mutations() {
    let (url, state) = spawn_feed_server().await.expect("server");
    let backend = HttpFeedBackend::new(url);
    let mutation = FeedMutation::SetSaved {
        post_id: PostId::new("1"),
        saved: true,
    };

    backend.confirm(&mutation).await.expect("confirm");

    assert_eq!(state.mutations.lock().await.clone(), vec![mutation]);
}

#[tokio::test]
async fn http_backend_surfaces_api_error_body() {
    let (url, state) = spawn_feed_server().await.expect("server");
    let backend = HttpFeedBackend::new(url);

    let err = backend
        .confirm(&FeedMutation::DeletePost {
            post_id: PostId::new("locked"),
        })
        .await
        .expect_err("rejected");

    let api_error = err.downcast_ref::<ApiError>().expect("api error");
    assert_eq!(api_error.code, ErrorCode::Conflict);
    assert!(state.mutations.lock().await.is_empty());
}

#[tokio::test]
async fn http_backend_creates_posts() {
    let (url, state) = spawn_feed_server().await.expect("server");
    let backend = HttpFeedBackend::new(url);

    let post_id = backend
        .create_post(&CreatePostRequest {
            caption: "hello".into(),
            images: Vec::new(),
        })
        .await
        .expect("create");

    assert_eq!(post_id, PostId::new("srv-42"));
    assert_eq!(state.created.lock().await.clone(), vec!["hello".to_string()]);
}

#[tokio::test]
async fn unreachable_backend_reports_context() {
    let backend = HttpFeedBackend::new("http://127.0.0.1:9");
    let err = backend.load_feed().await.expect_err("unreachable");
    assert!(err.to_string().contains("failed to request feed"));
}

#[tokio::test(start_paused = true)]
async fn simulated_backend_waits_for_the_confirmation_delay() {
    let backend = SimulatedBackend::new(
        std::time::Duration::from_secs(1),
        std::time::Duration::from_secs(2),
        Vec::new(),
    );
    let started = tokio::time::Instant::now();

    backend
        .confirm(&FeedMutation::DeletePost {
            post_id: PostId::new("1"),
        })
        .await
        .expect("confirm");

    assert!(started.elapsed() >= std::time::Duration::from_secs(1));
}
