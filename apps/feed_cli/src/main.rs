use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use feed_core::{
    backend::{demo_posts, demo_viewer, FeedBackend, HttpFeedBackend, SimulatedBackend},
    collaborators::{Clipboard, Navigator, Notifier, ShareTarget},
    config::{load_settings_from, FeedSettings, DEFAULT_SETTINGS_FILE},
    session::FocusedSession,
    FeedController, FeedDependencies, FeedError, FeedEvent, PostView,
};
use shared::{
    domain::{Post, PostId},
    error::ApiError,
    protocol::{NavigationRequest, Notification, NotificationKind, SharePayload},
};
use tokio_stream::{wrappers::BroadcastStream, StreamExt};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Drive the local feed controller from the terminal")]
struct Args {
    #[arg(long, default_value = DEFAULT_SETTINGS_FILE)]
    config: PathBuf,
    /// JSON file with an array of posts to seed the feed with.
    #[arg(long)]
    feed: Option<PathBuf>,
    #[arg(long)]
    backend_url: Option<String>,
    #[arg(long)]
    delay_ms: Option<u64>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    List,
    Like { post_id: String },
    Save { post_id: String },
    Delete { post_id: String },
    Share { post_id: String },
    CopyLink { post_id: String },
    Profile { post_id: String },
    Post {
        #[arg(long)]
        caption: String,
        #[arg(long)]
        image: Option<String>,
    },
    Demo,
}

struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, notification: Notification) {
        let tag = match notification.kind {
            NotificationKind::Success => "ok",
            NotificationKind::Error => "error",
        };
        println!("[{tag}] {}", notification.message);
    }
}

struct ConsoleNavigator;

impl Navigator for ConsoleNavigator {
    fn navigate(&self, request: NavigationRequest) {
        match serde_json::to_string(&request) {
            Ok(json) => println!("navigate: {json}"),
            Err(_) => println!("navigate: {request:?}"),
        }
    }
}

struct ConsoleShare;

#[async_trait]
impl ShareTarget for ConsoleShare {
    async fn share(&self, payload: SharePayload) -> Result<()> {
        println!("share [{}]: {}", payload.title, payload.message);
        Ok(())
    }
}

#[derive(Default)]
struct MemoryClipboard {
    text: Mutex<Option<String>>,
}

#[async_trait]
impl Clipboard for MemoryClipboard {
    async fn set_text(&self, text: &str) -> Result<()> {
        let mut guard = self
            .text
            .lock()
            .map_err(|_| anyhow::anyhow!("clipboard lock poisoned"))?;
        *guard = Some(text.to_string());
        println!("clipboard: {text}");
        Ok(())
    }
}

fn read_feed_file(path: &Path) -> Result<Vec<Post>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read feed file '{}'", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("feed file '{}' is not a JSON array of posts", path.display()))
}

async fn build_controller(args: &Args, settings: FeedSettings) -> Result<Arc<FeedController>> {
    let seed = match &args.feed {
        Some(path) => read_feed_file(path)?,
        None => demo_posts(),
    };
    let backend: Arc<dyn FeedBackend> = match &settings.backend_url {
        Some(url) => Arc::new(HttpFeedBackend::new(url.clone())),
        None => Arc::new(SimulatedBackend::from_settings(&settings, seed.clone())),
    };
    let deps = FeedDependencies {
        notifier: Arc::new(ConsoleNotifier),
        navigator: Arc::new(ConsoleNavigator),
        share: Arc::new(ConsoleShare),
        clipboard: Arc::new(MemoryClipboard::default()),
        ..FeedDependencies::with_backend(backend)
    };

    if settings.backend_url.is_some() && args.feed.is_none() {
        FeedController::load(settings, demo_viewer(), deps).await
    } else {
        FeedController::new(settings, demo_viewer(), seed, deps)
    }
}

fn print_feed(views: &[PostView]) {
    if views.is_empty() {
        println!("(feed is empty)");
    }
    for view in views {
        let post = &view.post;
        let pending = match (view.like_pending, view.save_pending) {
            (true, true) => " [like+save pending]",
            (true, false) => " [like pending]",
            (false, true) => " [save pending]",
            (false, false) => "",
        };
        println!(
            "#{} @{} ({}): {} | {} {} | {} comments | {} saved{}",
            post.id,
            post.author.username,
            post.created_at_label,
            post.caption,
            post.like_count,
            if post.is_liked { "Liked" } else { "Like" },
            post.comment_count,
            post.save_count,
            pending
        );
        if let Some(cover) = post.cover_image() {
            println!("    cover: {cover}");
        }
    }
}

async fn run_demo(controller: &Arc<FeedController>) -> Result<()> {
    let Some(first) = controller.posts().await.into_iter().next() else {
        println!("(feed is empty)");
        return Ok(());
    };
    let post_id = first.id;

    println!("-- double tap on like");
    let results = futures::future::join_all((0..2).map(|_| controller.toggle_like(&post_id))).await;
    for result in results {
        match result {
            Ok(post) => println!("committed: {} likes", post.like_count),
            Err(err) => println!("rejected: {err}"),
        }
    }

    println!("-- save, share and copy");
    controller.toggle_save(&post_id).await?;
    controller.share_link(&post_id).await?;
    controller.copy_link(&post_id).await?;
    controller.open_author_profile(&post_id).await?;

    if first.is_owned_by_viewer {
        println!("-- delete, cancel, delete");
        controller.request_delete(&post_id).await?;
        controller.cancel_delete().await?;
        controller.request_delete(&post_id).await?;
        controller.confirm_delete().await?;
    }

    print_feed(&controller.feed_view().await);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    let mut settings = load_settings_from(&args.config);
    if let Some(url) = &args.backend_url {
        settings.backend_url = Some(url.clone());
    }
    if let Some(delay) = args.delay_ms {
        settings.confirmation_delay_ms = delay;
        settings.publish_delay_ms = delay;
    }
    info!(backend = ?settings.backend_url, "starting feed client");

    let controller = build_controller(&args, settings).await?;

    let mut events = BroadcastStream::new(controller.subscribe_events());
    let event_log = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            match event {
                Ok(FeedEvent::Notification(_)) => {}
                Ok(event) => debug!(?event, "feed event"),
                Err(err) => debug!(error = %err, "feed event stream lagged"),
            }
        }
    });

    let mut session = FocusedSession::new(Arc::new(ConsoleNavigator), controller.settings());
    session.set_focused(true);

    let outcome = run(args.command, &controller).await;
    session.set_focused(false);
    event_log.abort();

    if let Err(err) = outcome {
        let Some(feed_err) = err.downcast_ref::<FeedError>() else {
            return Err(err);
        };
        let api_error = ApiError::from(feed_err);
        eprintln!("error: {api_error}");
        if api_error.code.is_retryable() {
            eprintln!("the change was not applied; try again");
        }
        std::process::exit(1);
    }
    Ok(())
}

async fn run(command: Command, controller: &Arc<FeedController>) -> Result<()> {
    match command {
        Command::List => print_feed(&controller.feed_view().await),
        Command::Like { post_id } => {
            let post = controller.toggle_like(&PostId::new(post_id)).await?;
            print_feed(&[view_of(post)]);
        }
        Command::Save { post_id } => {
            let post = controller.toggle_save(&PostId::new(post_id)).await?;
            print_feed(&[view_of(post)]);
        }
        Command::Delete { post_id } => {
            controller.request_delete(&PostId::new(post_id)).await?;
            controller.confirm_delete().await?;
            print_feed(&controller.feed_view().await);
        }
        Command::Share { post_id } => {
            controller.share_link(&PostId::new(post_id)).await?;
        }
        Command::CopyLink { post_id } => {
            controller.copy_link(&PostId::new(post_id)).await?;
        }
        Command::Profile { post_id } => {
            controller.open_author_profile(&PostId::new(post_id)).await?;
        }
        Command::Post { caption, image } => {
            let mut draft = controller.new_draft();
            draft.set_caption(caption)?;
            if let Some(image) = image {
                draft.attach_image(image);
            }
            controller.publish(&mut draft).await?;
            print_feed(&controller.feed_view().await);
        }
        Command::Demo => run_demo(controller).await?,
    }
    Ok(())
}

fn view_of(post: Post) -> PostView {
    PostView {
        post,
        like_pending: false,
        save_pending: false,
        deletion: feed_core::DeletionState::Active,
    }
}
