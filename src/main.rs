use framescrub::cli::{Args, Command};
use framescrub::config::Settings;
use framescrub::core::VideoProcessor;
use framescrub::decoder::DecoderBackend;
use framescrub::extract::{ExtractProgress, FrameExtractor};
use framescrub::paths::PathConfig;

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{debug, info, warn};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn main() -> Result<()> {
    let args = Args::parse();

    let path_config = PathConfig::from_env_and_cli(args.config_dir.clone());
    if let Err(e) = path_config.ensure_dirs() {
        eprintln!("Warning: Failed to create application directories: {}", e);
    }

    init_logging(&args, &path_config)?;
    debug!("Command-line args: {:?}", args);

    let settings_path = path_config.settings_file();
    let mut settings = Settings::load(&settings_path);
    let backend = select_backend(&args)?;
    info!("Video backend: {}", backend.name());

    let file = args.command.file().clone();
    match args.command {
        Command::Info { .. } => cmd_info(backend, &settings, &file)?,
        Command::Grab {
            frame, time, output, ..
        } => {
            cmd_grab(backend, &settings, &file, frame, time, &output)?;
            settings.last_export_dir = output.parent().map(Path::to_path_buf);
        }
        Command::Extract {
            start,
            end,
            fps,
            output,
            ..
        } => {
            let rate = fps.unwrap_or(settings.extract_fps);
            cmd_extract(backend, &file, start, end, rate, &output)?;
            settings.last_export_dir = Some(output);
        }
        Command::Scrub { from, to, loops, .. } => cmd_scrub(backend, &settings, &file, from, to, loops)?,
    }

    settings.last_video_dir = file.parent().map(Path::to_path_buf);
    if let Err(e) = settings.save(&settings_path) {
        warn!("Failed to save settings: {:#}", e);
    }
    Ok(())
}

/// 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
fn init_logging(args: &Args, path_config: &PathConfig) -> Result<()> {
    let log_level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    if let Some(log_path_opt) = &args.log_file {
        let log_path = log_path_opt
            .clone()
            .unwrap_or_else(|| path_config.log_file());
        let file = std::fs::File::create(&log_path)
            .with_context(|| format!("Failed to create log file: {}", log_path.display()))?;

        // File logging always records at least debug
        env_logger::Builder::new()
            .filter_level(log_level.max(log::LevelFilter::Debug))
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();
        info!("Logging to file: {}", log_path.display());
    } else {
        // Respects RUST_LOG if set
        env_logger::Builder::from_env(
            env_logger::Env::default().default_filter_or(log_level.as_str().to_lowercase()),
        )
        .format_timestamp_millis()
        .init();
    }
    Ok(())
}

fn select_backend(args: &Args) -> Result<Arc<dyn DecoderBackend>> {
    if let Some(synthetic) = &args.synthetic {
        return Ok(Arc::new(synthetic.clone()));
    }
    default_backend()
}

#[cfg(feature = "ffmpeg")]
fn default_backend() -> Result<Arc<dyn DecoderBackend>> {
    Ok(Arc::new(framescrub::decoder::FfmpegBackend))
}

#[cfg(not(feature = "ffmpeg"))]
fn default_backend() -> Result<Arc<dyn DecoderBackend>> {
    bail!("No video backend: rebuild with --features ffmpeg or pass --synthetic")
}

fn open_processor(backend: Arc<dyn DecoderBackend>, settings: &Settings, file: &Path) -> Result<VideoProcessor> {
    let mut processor =
        VideoProcessor::with_settings(backend, settings.cache.clone(), settings.preload.clone());
    processor
        .load_video(file)
        .with_context(|| format!("Failed to load {}", file.display()))?;
    Ok(processor)
}

fn cmd_info(backend: Arc<dyn DecoderBackend>, settings: &Settings, file: &Path) -> Result<()> {
    let processor = open_processor(backend, settings, file)?;
    let (Some(info), Some(mode), Some(policy)) =
        (processor.video_info(), processor.seek_mode(), processor.policy())
    else {
        bail!("Video not loaded");
    };

    println!("File:       {}", info.path.display());
    println!("Resolution: {}", info.resolution());
    println!("FPS:        {:.3}", info.fps);
    println!("Frames:     {}", info.frame_count);
    println!("Duration:   {}", info.format_duration());
    println!("Codec:      {}", info.codec);
    println!("Seek mode:  {:?}", mode);
    println!(
        "Cache:      {:?} tier, {} frames, prefetch batch {}",
        policy.tier, policy.capacity, policy.prefetch_batch
    );
    Ok(())
}

fn cmd_grab(
    backend: Arc<dyn DecoderBackend>,
    settings: &Settings,
    file: &Path,
    frame: Option<i64>,
    time: Option<f64>,
    output: &Path,
) -> Result<()> {
    let processor = open_processor(backend, settings, file)?;
    let (label, result) = match (frame, time) {
        (Some(index), _) => (format!("frame {}", index), processor.get_frame_by_index(index)),
        (None, Some(t)) => (format!("time {:.3}s", t), processor.get_frame_at(t)),
        (None, None) => bail!("Either --frame or --time is required"),
    };
    let Some(frame) = result else {
        bail!("No frame at {} (out of range or undecodable)", label);
    };

    frame
        .to_image()
        .save(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!(
        "Wrote {} ({}x{}) to {}",
        label,
        frame.width(),
        frame.height(),
        output.display()
    );
    Ok(())
}

fn cmd_extract(
    backend: Arc<dyn DecoderBackend>,
    file: &Path,
    start: f64,
    end: Option<f64>,
    rate: f64,
    output: &Path,
) -> Result<()> {
    std::fs::create_dir_all(output)
        .with_context(|| format!("Failed to create output directory: {}", output.display()))?;

    let end = match end {
        Some(end) => end,
        None => {
            let stream = backend
                .open(file)
                .with_context(|| format!("Failed to open {}", file.display()))?
                .info();
            stream.frame_count as f64 / stream.fps.max(f64::EPSILON)
        }
    };

    let extractor = FrameExtractor::new(backend);
    let (tx, rx) = crossbeam_channel::unbounded::<ExtractProgress>();

    let frames = thread::scope(|scope| {
        let printer = scope.spawn(move || {
            for p in rx {
                eprint!("\rExtracting {}/{} ({:.0}%)", p.current, p.total, p.percent);
            }
            eprintln!();
        });
        let result = extractor.extract(file, start, end, rate, Some(&tx));
        drop(tx);
        let _ = printer.join();
        result
    })
    .with_context(|| format!("Extraction from {} failed", file.display()))?;

    for f in &frames {
        let name = output.join(format!("frame_{:05}_{:06}.png", f.ordinal, f.frame_index));
        f.frame
            .to_image()
            .save(&name)
            .with_context(|| format!("Failed to write {}", name.display()))?;
    }
    println!("Extracted {} frames to {}", frames.len(), output.display());
    Ok(())
}

fn cmd_scrub(
    backend: Arc<dyn DecoderBackend>,
    settings: &Settings,
    file: &Path,
    from: i64,
    to: Option<i64>,
    loops: u32,
) -> Result<()> {
    let mut processor = open_processor(backend, settings, file)?;
    let (Some(info), Some(policy), Some(stats)) =
        (processor.video_info(), processor.policy(), processor.stats())
    else {
        bail!("Video not loaded");
    };

    let from = from.clamp(0, (info.frame_count - 1).max(0));
    let to = to.unwrap_or(info.frame_count - 1).clamp(from, (info.frame_count - 1).max(0));
    let frame_time = Duration::from_secs_f64(1.0 / info.fps.max(1.0));
    let lookahead = policy.prefetch_batch as i64 * 2;

    processor.start_preload();

    let mut shown = 0u64;
    let mut missing = 0u64;
    let mut slowest = Duration::ZERO;
    let started = Instant::now();

    for pass in 0..loops {
        debug!("Scrub pass {}", pass + 1);
        for index in from..=to {
            let tick = Instant::now();
            if (index - from) % policy.prefetch_batch as i64 == 0 {
                processor.preload_range(index + 1, (index + lookahead).min(to));
            }
            match processor.get_frame_by_index(index) {
                Some(_) => shown += 1,
                None => missing += 1,
            }
            let spent = tick.elapsed();
            slowest = slowest.max(spent);
            if spent < frame_time {
                thread::sleep(frame_time - spent);
            }
        }
    }

    let stopped = processor.stop_preload();
    let elapsed = started.elapsed();
    processor.release();

    println!("Frames shown:   {} ({} missing)", shown, missing);
    println!(
        "Cache:          {} hits, {} misses, {:.1}% hit rate, {} evictions",
        stats.hits(),
        stats.misses(),
        stats.hit_rate() * 100.0,
        stats.evictions()
    );
    println!("Slowest fetch:  {:.2} ms", slowest.as_secs_f64() * 1000.0);
    println!(
        "Wall time:      {:.2}s ({:.1} fps effective)",
        elapsed.as_secs_f64(),
        shown as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
    );
    if !stopped {
        warn!("Preloader was still busy at shutdown");
    }
    Ok(())
}
