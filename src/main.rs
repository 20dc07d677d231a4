//! Splatline CLI
//!
//! Uploads a video, follows the processing pipeline and manages scenes
//! through the scene REST API.

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use splatline::adapters::auth::{EnvTokenProvider, StaticTokenProvider};
use splatline::adapters::viewer::AnnounceViewer;
use splatline::application::{
    PipelineStatusPoller, PollUpdate, ProgressTracker, SessionEvent, SessionEvents,
};
use splatline::domain::progress::{Observation, Outcome, StageProgressView};
use splatline::domain::scene::{JobOptions, Scene, SceneStatus};
use splatline::ports::auth::TokenProvider;
use splatline::ports::scenes::SceneRepository;
use splatline::{
    ClientConfig, HttpObjectStore, HttpSceneClient, Result, SceneError, UploadRequest,
    UploadSessionController,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "splatline")]
#[command(about = "Turn videos into 3D gaussian splat scenes")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Scene API base URL (overrides SPLATLINE_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Bearer token. Without it SPLATLINE_TOKEN is re-read before every authenticated call
    #[arg(long, global = true)]
    token: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Upload a video and follow it until the scene is ready
    Upload {
        /// Video file to upload
        video: PathBuf,

        /// Scene name (defaults to the file name)
        #[arg(short, long)]
        name: Option<String>,

        /// Frames sampled per second of video (1-10)
        #[arg(long)]
        fps: Option<u32>,

        /// Training iterations (1000-100000)
        #[arg(long)]
        iterations: Option<u32>,

        /// Stop densifying after this iteration (1000-50000)
        #[arg(long)]
        densify_until_iter: Option<u32>,

        /// Iterations between densification passes (50-500)
        #[arg(long)]
        densification_interval: Option<u32>,
    },
    /// List scenes, newest first
    List {
        /// Only scenes that finished processing
        #[arg(long)]
        completed: bool,
    },
    /// Print one scene as JSON
    Show { id: String },
    /// Follow a scene that is already processing
    Watch { id: String },
    /// Delete a scene you own
    Delete { id: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = ClientConfig::from_env();
    if let Some(api_url) = &cli.api_url {
        config.api_url = api_url.clone();
    }

    match run(cli, config).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            if e.requires_reauth() {
                eprintln!("Sign in again and export a fresh {}", EnvTokenProvider::DEFAULT_VAR);
            } else if e.is_retryable() {
                eprintln!("The request can be retried.");
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, config: ClientConfig) -> Result<ExitCode> {
    let repo = Arc::new(HttpSceneClient::new(&config)?);
    let tokens: Arc<dyn TokenProvider> = match cli.token {
        Some(token) => Arc::new(StaticTokenProvider::new(token)),
        None => Arc::new(EnvTokenProvider::default()),
    };

    match cli.command {
        Command::Upload {
            video,
            name,
            fps,
            iterations,
            densify_until_iter,
            densification_interval,
        } => {
            let options = JobOptions {
                fps,
                iterations,
                densify_until_iter,
                densification_interval,
            };
            let request = UploadRequest::from_path(&video, name)
                .await?
                .with_options(options);
            upload(&config, repo, tokens, request).await
        }
        Command::List { completed } => {
            list(&config, repo.as_ref(), completed).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Show { id } => {
            let scene = repo.get(&id).await?;
            println!("{}", serde_json::to_string_pretty(&scene)?);
            if let Some(url) = scene.viewable_key().and_then(|k| config.asset_url(k)) {
                println!("Viewer: {}", url);
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Watch { id } => watch(&config, repo, &id).await,
        Command::Delete { id } => {
            let token = tokens.current_token().await?;
            repo.delete(&id, &token).await?;
            println!("Deleted {}", id);
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn upload(
    config: &ClientConfig,
    repo: Arc<HttpSceneClient>,
    tokens: Arc<dyn TokenProvider>,
    request: UploadRequest,
) -> Result<ExitCode> {
    let store = Arc::new(HttpObjectStore::new(config)?);
    let viewer = Arc::new(AnnounceViewer::new(config.cdn_url.clone()));
    let controller =
        UploadSessionController::new(repo, store, tokens, config).with_viewer(viewer);

    let display = display(controller.subscribe());
    let result = tokio::select! {
        result = controller.submit(request) => result,
        _ = tokio::signal::ctrl_c() => {
            controller.cancel();
            Err(SceneError::Cancelled)
        }
    };
    drop(controller);
    let _ = display.await;

    let outcome = result?;
    Ok(report(&outcome.scene))
}

async fn watch(config: &ClientConfig, repo: Arc<HttpSceneClient>, id: &str) -> Result<ExitCode> {
    let events = SessionEvents::new();
    let display = display(events.subscribe());
    let mut tracker = ProgressTracker::new(config.advance_delay, events.clone());
    // Everything before processing is already done for an existing scene.
    tracker.apply(&Observation::upload(100)).await;

    let poller =
        PipelineStatusPoller::new(repo, config.poll_interval, config.max_poll_failures);
    let mut updates = poller.start(id);

    let result = loop {
        let update = tokio::select! {
            update = updates.next() => update,
            _ = tokio::signal::ctrl_c() => {
                updates.stop();
                None
            }
        };
        match update {
            Some(PollUpdate::Snapshot(scene)) => {
                tracker.apply(&Observation::from(&scene)).await;
            }
            Some(PollUpdate::Terminal(scene)) => {
                tracker.apply(&Observation::from(&scene)).await;
                break Ok(scene);
            }
            Some(PollUpdate::Failed(e)) => break Err(e),
            None => break Err(SceneError::Cancelled),
        }
    };
    drop(tracker);
    drop(events);
    let _ = display.await;

    let scene = result?;
    if let Some(url) = scene.viewable_key().and_then(|k| config.asset_url(k)) {
        println!("Viewer: {}", url);
    }
    Ok(report(&scene))
}

async fn list(config: &ClientConfig, repo: &HttpSceneClient, completed: bool) -> Result<()> {
    let scenes: Vec<Scene> = repo
        .list()
        .await?
        .into_iter()
        .filter(|s| !completed || s.status == SceneStatus::Completed)
        .collect();

    if scenes.is_empty() {
        println!("No scenes yet.");
        return Ok(());
    }
    for scene in &scenes {
        let stage = scene
            .processing_stage
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<38} {:<11} {:<18} {}",
            scene.id,
            format!("{:?}", scene.status).to_lowercase(),
            stage,
            scene.name
        );
        if let Some(url) = scene.viewable_key().and_then(|k| config.asset_url(k)) {
            println!("{:<38} {}", "", url);
        }
    }
    Ok(())
}

/// Print the terminal state of a scene. Pipeline failures exit non-zero.
fn report(scene: &Scene) -> ExitCode {
    match scene.status {
        SceneStatus::Completed => {
            let gaussians = scene
                .gaussian_count
                .map(|n| format!(" ({} gaussians)", n))
                .unwrap_or_default();
            println!("Scene {} is ready{}", scene.id, gaussians);
            ExitCode::SUCCESS
        }
        SceneStatus::Failed => {
            println!(
                "Scene {} failed: {}",
                scene.id,
                scene.error.as_deref().unwrap_or("unknown error")
            );
            ExitCode::FAILURE
        }
        _ => {
            println!("Scene {} is {:?}", scene.id, scene.status);
            ExitCode::FAILURE
        }
    }
}

/// Draw session events on a progress bar until the event source goes away.
fn display(mut events: broadcast::Receiver<SessionEvent>) -> JoinHandle<()> {
    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(SessionEvent::Phase(phase)) => pb.set_message(phase.to_string()),
                Ok(SessionEvent::UploadProgress(percent)) => {
                    pb.set_message(format!("uploading {}%", percent));
                }
                Ok(SessionEvent::Progress(view)) => draw(&pb, &view),
                Ok(SessionEvent::Snapshot(_)) => {}
                Ok(SessionEvent::Failed(error)) => {
                    pb.abandon_with_message(error);
                    return;
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        if !pb.is_finished() {
            pb.finish();
        }
    })
}

fn draw(pb: &ProgressBar, view: &StageProgressView) {
    pb.set_position(view.overall_percent() as u64);
    match view.outcome() {
        Outcome::InProgress => pb.set_message(format!(
            "{}: {}",
            view.current().label(),
            view.current().description()
        )),
        Outcome::Completed => pb.finish_with_message(view.current().description()),
        Outcome::Failed { error } => pb.abandon_with_message(error.clone()),
    }
}
