//! ABOUTME: shellwatch entry point: terrarium motion monitoring over a Pi camera
//! ABOUTME: Builds the capture pipeline, artifact worker, and delivery adapters

mod adapters;

use adapters::{LogOnlyAlertSink, SqliteDetectionStore, TelegramAlertSink};
use clap::{Parser, Subcommand};
use std::process;
use std::sync::Arc;
use sw_capture::{StillCommandConfig, StillCommandSource};
use sw_config::Config;
use sw_core::telemetry;
use sw_db::{Db, DetectionRepository};
use sw_notify::{Notifier, TelegramConfig, TelegramNotifier};
use sw_pipeline::{
    spawn_artifact_worker, AggregatorConfig, AlertSink, MotionEventAggregator, PipelineRunner,
    RunnerConfig,
};
use sw_vision::{ComparatorConfig, CropConfig, FrameComparator, TrackerConfig, TurtleTracker};
use tokio::sync::{mpsc, watch};

#[derive(Parser)]
#[command(name = "shellwatch", about = "Tortoise terrarium motion monitor")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the monitor (default)
    Run,
    /// Load and validate configuration, then print it
    CheckConfig,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    match cli.command.unwrap_or(Command::Run) {
        Command::CheckConfig => {
            println!("{:#?}", config);
            println!("configuration valid");
        }
        Command::Run => {
            telemetry::init_tracing(&config.environment, "shellwatch");
            tracing::info!("shellwatch starting");
            tracing::debug!(?config, "Configuration loaded");

            if let Err(e) = run(config).await {
                tracing::error!("Fatal: {}", e);
                process::exit(1);
            }
        }
    }
}

async fn run(config: Config) -> sw_core::Result<()> {
    let db = Db::new(&config.database.path).await?;
    db.health_check().await?;
    prune_old_detections(&db, config.database.retention_days).await;

    let source = Arc::new(StillCommandSource::new(StillCommandConfig {
        program: config.camera.program.clone(),
        args: config.camera.args.clone(),
        timeout_secs: config.camera.timeout_secs,
        source_name: config.camera.name.clone(),
    }));

    let comparator = FrameComparator::new(ComparatorConfig {
        comparison_width: config.motion.comparison_width,
        comparison_height: config.motion.comparison_height,
        diff_threshold: config.motion.pixel_threshold,
        change_percent_threshold: config.motion.min_change_percent,
        min_blob_area: config.motion.min_blob_area,
        morph_kernel_size: config.motion.kernel_size,
    });
    let tracker = TurtleTracker::new(
        comparator,
        TrackerConfig {
            match_threshold: config.tracker.match_threshold,
            smoothing_weight: config.tracker.smoothing_weight,
            confidence_decay: config.tracker.confidence_decay,
            confidence_gain: config.tracker.confidence_gain,
            confidence_floor: config.tracker.confidence_floor,
            ..TrackerConfig::default()
        },
    );
    let aggregator = MotionEventAggregator::new(AggregatorConfig {
        inactivity_timeout_secs: config.events.inactivity_timeout_secs,
        max_frames: config.events.max_frames,
    });
    let crop_config = CropConfig {
        margin_percent: config.crop.margin_percent,
        min_size: config.crop.min_size,
        max_width: config.crop.max_width,
    };

    let output_dir = std::path::PathBuf::from(&config.artifact.output_dir);
    let builder = Arc::new(sw_artifact::ArtifactBuilder::new(
        sw_artifact::ArtifactConfig {
            output_dir: output_dir.clone(),
            max_frames: config.events.max_frames,
            fps: config.artifact.fps,
            video: sw_artifact::VideoConfig {
                enabled: config.artifact.video.enabled,
                program: config.artifact.video.program.clone(),
                crf: config.artifact.video.crf,
                timeout_secs: config.artifact.video.timeout_secs,
            },
        },
        sw_artifact::CropStore::new(output_dir.join("frames")),
    ));

    let store = Arc::new(SqliteDetectionStore::new(db.clone()));
    let sink = build_sink(&config).await;

    let (jobs_tx, jobs_rx) = mpsc::channel(config.runner.job_queue_depth);
    let worker = spawn_artifact_worker(jobs_rx, builder, store, sink);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received, shutting down");
            let _ = shutdown_tx.send(true);
        }
    });

    let runner = PipelineRunner::new(
        source,
        tracker,
        aggregator,
        crop_config,
        RunnerConfig {
            capture_interval_ms: config.runner.capture_interval_ms,
            idle_interval_ms: config.runner.idle_interval_ms,
            max_consecutive_failures: config.runner.max_consecutive_failures,
        },
        jobs_tx,
        shutdown_rx,
    );

    // Runner owns the only job sender; when it returns, the worker drains
    // whatever is queued and exits
    let outcome = runner.run().await;
    if let Err(e) = worker.await {
        tracing::error!("Artifact worker panicked: {}", e);
    }
    tracing::info!("shellwatch stopped");
    outcome
}

async fn build_sink(config: &Config) -> Arc<dyn AlertSink> {
    match config.telegram.as_ref() {
        Some(section) => match TelegramNotifier::new(TelegramConfig {
            token: section.token.clone(),
            chat_id: section.chat_id.clone(),
            ..TelegramConfig::default()
        }) {
            Ok(notifier) => {
                if let Err(e) = notifier.send_message("shellwatch online, watching the terrarium").await {
                    tracing::warn!("Startup message failed: {}", e);
                }
                Arc::new(TelegramAlertSink::new(Box::new(notifier)))
            }
            Err(e) => {
                tracing::error!("Telegram client failed to build, alerts disabled: {}", e);
                Arc::new(LogOnlyAlertSink)
            }
        },
        None => {
            tracing::warn!("No Telegram credentials configured, alerts will only be logged");
            Arc::new(LogOnlyAlertSink)
        }
    }
}

async fn prune_old_detections(db: &Db, retention_days: u32) {
    let cutoff = (chrono::Utc::now() - chrono::Duration::days(retention_days as i64))
        .to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    match DetectionRepository::new(db.pool())
        .cleanup_older_than(&cutoff)
        .await
    {
        Ok(0) => {}
        Ok(removed) => tracing::info!(removed, retention_days, "Pruned old detections"),
        Err(e) => tracing::warn!("Detection pruning failed: {}", e),
    }
}
