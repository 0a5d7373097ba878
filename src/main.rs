use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::time::Duration;

use story_publisher::batch::BatchPipeline;
use story_publisher::config::{self, Config};
use story_publisher::coordinator::PublishCoordinator;
use story_publisher::logging;
use story_publisher::platforms::youtube::YouTubeUpload;
use story_publisher::platforms::{self, AutomationPublisher, TikTokPublisher, YouTubePublisher};
use story_publisher::render::CommandRenderer;
use story_publisher::schedule_store::ScheduleStore;
use story_publisher::scheduler::Scheduler;
use story_publisher::single_instance;
use story_publisher::story::OllamaStoryGenerator;
use story_publisher::uploader::youtube_client::VideoMetadata;
use story_publisher::uploader::TokioSleeper;

#[derive(Parser)]
#[command(name = "story-publisher")]
#[command(version)]
#[command(about = "Generate short story videos, schedule them and publish them to video platforms")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate, render and schedule a batch of videos
    Batch {
        /// Number of videos to generate
        #[arg(long, default_value_t = 1)]
        count: u32,
    },
    /// Run the publishing scheduler until interrupted
    Scheduler,
    /// Print the schedule
    Status,
    /// Write a configuration file with default values
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Upload one video to YouTube
    UploadYoutube(YouTubeArgs),
    /// Post one video to Instagram
    UploadInstagram(CaptionArgs),
    /// Post one video to TikTok
    UploadTiktok {
        #[command(flatten)]
        post: CaptionArgs,
        /// Use the relay webhook instead of browser automation
        #[arg(long)]
        alternative: bool,
    },
}

#[derive(Args)]
struct YouTubeArgs {
    /// Video file to upload
    #[arg(long)]
    file: String,
    #[arg(long)]
    title: String,
    #[arg(long, default_value = "")]
    description: String,
    /// Numeric video category
    #[arg(long)]
    category: Option<String>,
    /// Comma-separated tags
    #[arg(long)]
    keywords: Option<String>,
    #[arg(long, value_parser = ["public", "private", "unlisted"])]
    privacy_status: Option<String>,
    /// Custom thumbnail image
    #[arg(long)]
    thumbnail: Option<PathBuf>,
    /// Playlist to add the video to
    #[arg(long)]
    playlist: Option<String>,
}

#[derive(Args)]
struct CaptionArgs {
    /// Video file to post
    #[arg(long)]
    file: String,
    #[arg(long)]
    caption: String,
}

fn component_name(command: &Command) -> &'static str {
    match command {
        Command::Batch { .. } => "batch",
        Command::Scheduler => "scheduler",
        Command::Status | Command::InitConfig { .. } => "cli",
        Command::UploadYoutube(_) => "youtube",
        Command::UploadInstagram(_) => "instagram",
        Command::UploadTiktok { .. } => "tiktok",
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            log::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<bool> {
    let config_path = config::resolve_config_path(cli.config.as_deref())?;

    if let Command::InitConfig { force } = cli.command {
        if config_path.exists() && !force {
            bail!("{} already exists, pass --force to overwrite", config_path.display());
        }
        config::save_config(&Config::default(), &config_path)?;
        println!("Wrote default configuration to {}", config_path.display());
        return Ok(true);
    }

    let config = config::load_config(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    logging::init_logging(component_name(&cli.command), &config.logs_dir);
    log::info!("Using configuration {}", config_path.display());

    match cli.command {
        Command::Batch { count } => run_batch(&config, count).await,
        Command::Scheduler => run_scheduler(&config).await,
        Command::Status => print_status(&config),
        Command::InitConfig { .. } => Ok(true),
        Command::UploadYoutube(args) => upload_youtube(&config, args).await,
        Command::UploadInstagram(args) => {
            let publisher = AutomationPublisher::instagram(config.instagram.clone());
            report_post(publisher.post(&args.file, &args.caption).await, "Instagram")
        }
        Command::UploadTiktok { post, alternative } => {
            let publisher = TikTokPublisher::new(config.tiktok.clone())?;
            report_post(
                publisher.post(&post.file, &post.caption, alternative).await,
                "TikTok",
            )
        }
    }
}

fn build_store(config: &Config) -> Result<ScheduleStore> {
    Ok(ScheduleStore::new(config.schedule_file.clone(), config.publish_time()?)
        .with_catch_up(config.catch_up_missed))
}

fn build_batch(config: &Config) -> Result<BatchPipeline> {
    let sleeper = Arc::new(TokioSleeper);
    let generator = OllamaStoryGenerator::new(
        config.story.clone(),
        config.stories_dir.clone(),
        sleeper.clone(),
    )?;
    let renderer = CommandRenderer::new(config.renderer.clone(), config.videos_dir.clone());

    Ok(BatchPipeline::new(
        Box::new(generator),
        Box::new(renderer),
        build_store(config)?,
        Duration::from_secs(config.item_pause_secs),
        sleeper,
    ))
}

async fn run_batch(config: &Config, count: u32) -> Result<bool> {
    let report = build_batch(config)?
        .run(count, Local::now().date_naive())
        .await?;
    Ok(count == 0 || !report.scheduled.is_empty())
}

async fn run_scheduler(config: &Config) -> Result<bool> {
    let lock_file = single_instance::lock_path_for(&config.schedule_file);
    let _lock = single_instance::acquire(&lock_file)?;

    let shutdown = Arc::new(Notify::new());
    single_instance::register_shutdown_handler(lock_file, shutdown.clone())?;

    let coordinator =
        PublishCoordinator::new(build_store(config)?, platforms::build_publishers(config)?);
    let mut scheduler = Scheduler::new(config, coordinator, build_batch(config)?, Local::now())?;

    scheduler.run(shutdown).await?;
    Ok(true)
}

fn print_status(config: &Config) -> Result<bool> {
    let store = build_store(config)?;
    let schedule = store.load()?;

    if schedule.videos.is_empty() {
        println!("No videos scheduled ({})", store.path().display());
        return Ok(true);
    }

    for job in &schedule.videos {
        println!(
            "[{}] {} {}  {}  ({})",
            if job.published { "x" } else { " " },
            job.date,
            job.time.format("%H:%M"),
            job.title,
            job.video_file
        );
    }
    println!(
        "{} scheduled, {} pending",
        schedule.videos.len(),
        schedule.unpublished_count()
    );
    Ok(true)
}

async fn upload_youtube(config: &Config, args: YouTubeArgs) -> Result<bool> {
    let settings = &config.youtube;
    let upload = YouTubeUpload {
        file: args.file,
        metadata: VideoMetadata {
            title: args.title,
            description: args.description,
            tags: args
                .keywords
                .map(|k| {
                    k.split(',')
                        .map(str::trim)
                        .filter(|t| !t.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            category_id: args.category.unwrap_or_else(|| settings.category_id.clone()),
            privacy_status: args
                .privacy_status
                .unwrap_or_else(|| settings.privacy_status.clone()),
        },
        thumbnail: args.thumbnail.or_else(|| settings.thumbnail.clone()),
        playlist_id: args.playlist.or_else(|| settings.playlist_id.clone()),
    };

    match YouTubePublisher::new(settings.clone()).upload(&upload).await {
        Ok(video_id) => {
            println!("{}", video_id);
            Ok(true)
        }
        Err(e) => {
            log::error!("YouTube upload failed: {}", e);
            Ok(false)
        }
    }
}

fn report_post(result: story_publisher::AppResult<()>, platform: &str) -> Result<bool> {
    match result {
        Ok(()) => {
            log::info!("{} post succeeded", platform);
            Ok(true)
        }
        Err(e) => {
            log::error!("{} post failed: {}", platform, e);
            Ok(false)
        }
    }
}
