use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use anyhow::{Context, Result};

use playback_core::media::{
    FrameMetadata, Mailbox, MailboxHolder, PixelFormat, Size, SyncToken, TextureTarget,
    VideoFrame, VideoResourceUpdater,
};
use playback_core::pipeline::{ControllerCallbacks, Pipeline, PipelineController};
use playback_core::player::{PlayerRegistry, PlayerSession};
use playback_core::settings::MediaSettings;
use playback_core::sim::{
    LoggingClient, MemoryResourceProvider, RecordingDemuxer, RecordingGpuContext,
    ScriptedPipeline, renderer_factory, synthetic_frame,
};

#[derive(Default)]
struct Args {
    settings: Option<PathBuf>,
    save_settings: bool,
}

fn parse_args() -> Result<Args> {
    let mut parsed = Args::default();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--settings" => {
                let path = args.next().context("--settings needs a path")?;
                parsed.settings = Some(PathBuf::from(path));
            }
            "--save-settings" => parsed.save_settings = true,
            other => log::warn!("Ignoring unknown argument {}", other),
        }
    }
    Ok(parsed)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = parse_args()?;
    let settings = match &args.settings {
        Some(path) => MediaSettings::load_from(path)?,
        None => MediaSettings::load(),
    };
    if args.save_settings {
        settings.save();
    }
    log::info!(
        "Settings v{}: {} compositing, max texture {}, half-float {}",
        settings.version,
        if settings.use_gpu_compositing { "GPU" } else { "software" },
        settings.max_texture_size,
        settings.allow_half_float
    );

    let pipeline = ScriptedPipeline::new();
    let demuxer = RecordingDemuxer::new();
    let controller = PipelineController::new(
        pipeline.clone(),
        renderer_factory("sim"),
        ControllerCallbacks {
            seeked: Box::new(|time_updated| log::info!("Seeked (time updated: {})", time_updated)),
            suspended: Box::new(|| log::info!("Suspended")),
            error: Box::new(|status| log::error!("Playback failed: {}", status)),
        },
    );
    controller.start(demuxer.clone(), Rc::new(LoggingClient), false, true);

    let context = settings.use_gpu_compositing.then(RecordingGpuContext::new);
    let mut updater =
        VideoResourceUpdater::new(MemoryResourceProvider::from_settings(&settings), context);
    updater.set_force_texture_copy(settings.copy_hardware_textures);

    let mut registry = PlayerRegistry::new();
    let id = registry.create(PlayerSession::new(controller, updater));
    pipeline.run_until_idle();

    {
        let session = registry.get(id).context("player missing")?;
        // Overlapping seeks collapse into the last one.
        for secs in [2, 5, 5] {
            session.controller().seek(Duration::from_secs(secs), true);
        }
        let completed = pipeline.run_until_idle();
        log::info!(
            "Seeks settled after {} operation(s) at {:.1}s",
            completed,
            pipeline.media_time().as_secs_f64()
        );
    }

    {
        let session = registry.get_mut(id).context("player missing")?;
        let first = synthetic_frame(PixelFormat::I420, Size::new(64, 48), 1);
        let deep = synthetic_frame(PixelFormat::Yuv420p10, Size::new(64, 48), 2);
        for frame in [&first, &first, &deep] {
            let resources = session.present_frame(frame);
            log::info!(
                "Frame {} -> {:?} with {} resource(s)",
                frame.unique_id(),
                resources.kind,
                resources.resources.len()
            );
            resources.release_all(SyncToken::EMPTY, false);
        }

        let texture = std::sync::Arc::new(
            VideoFrame::wrap_textures(
                PixelFormat::Argb,
                Size::new(64, 48),
                vec![MailboxHolder::new(
                    Mailbox::from_u64(0xfeed),
                    SyncToken {
                        namespace: 1,
                        release_count: 1,
                    },
                    TextureTarget::Texture2D,
                )],
                Duration::ZERO,
            )?
            .with_metadata(FrameMetadata {
                allow_overlay: true,
                ..FrameMetadata::default()
            }),
        );
        let resources = session.present_frame(&texture);
        log::info!("Texture frame -> {:?}", resources.kind);

        // The compositor hands resources back from its own thread.
        std::thread::spawn(move || {
            resources.release_all(
                SyncToken {
                    namespace: 2,
                    release_count: 5,
                },
                false,
            );
        })
        .join()
        .map_err(|_| anyhow::anyhow!("compositor thread panicked"))?;
        let returned = session.updater_mut().process_returned_resources();
        log::info!(
            "{} release(s) returned; frame release token {:?}",
            returned,
            texture.release_sync_token()
        );
    }

    registry.suspend_all();
    pipeline.run_until_idle();
    registry.resume_all();
    pipeline.run_until_idle();

    if let Some(session) = registry.remove(id) {
        let stats = session.stats();
        let provider = session.updater().provider().stats();
        log::info!(
            "Presented {} frame(s), dropped {}; {} resource(s) created, {} upload(s), pool {}",
            stats.presented,
            stats.dropped,
            provider.created,
            provider.uploads,
            session.updater().pool_len()
        );
    }
    log::info!("Demuxer saw {} seek notification(s)", demuxer.calls().len());

    Ok(())
}
