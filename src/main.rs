// Command line entry point. The conversion engine lives in the library crate.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use anyhow::{Context, bail};
use clap::Parser;
use tokio::fs;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use image_converter_lib::core::{DEFAULT_MAX_CONCURRENT, JobState};
use image_converter_lib::processing::ARCHIVE_NAME;
use image_converter_lib::utils::{format_file_size, mime_from_extension, read_source_file};
use image_converter_lib::{
    ConversionPipeline, ConverterConfig, ImageCodec, JobEvent, OptionResolver, RawOptions,
    SettingsStore, SourceFile, WorkerPool,
};

#[derive(Parser)]
#[command(name = "image-converter")]
#[command(version, about = "Convert batches of images to WebP, JPEG, PNG, GIF or AVIF", long_about = None)]
struct Cli {
    /// Files or directories to convert
    #[arg(value_name = "INPUT", required = true)]
    inputs: Vec<PathBuf>,

    /// Output format: webp, jpeg (jpg), png, gif, avif
    #[arg(short, long)]
    format: Option<String>,

    /// Quality percentage for lossy formats
    #[arg(short, long)]
    quality: Option<u32>,

    #[arg(long)]
    lossless: bool,

    /// Aim each output at this size (WebP, JPEG, AVIF)
    #[arg(long, value_name = "KB")]
    target_size_kb: Option<u64>,

    #[arg(long)]
    width: Option<u32>,

    #[arg(long)]
    height: Option<u32>,

    /// Uniform scale in percent; wins over --width/--height
    #[arg(long)]
    scale: Option<u32>,

    /// Do not derive the missing side from the aspect ratio
    #[arg(long)]
    no_aspect: bool,

    /// PNG compression level, 0-9
    #[arg(long)]
    png_compression: Option<u32>,

    #[arg(long)]
    progressive: bool,

    /// Drop the alpha channel from WebP output
    #[arg(long)]
    no_alpha: bool,

    /// Faster AVIF encoding
    #[arg(long)]
    low_data_mode: bool,

    #[arg(long)]
    preserve_metadata: bool,

    /// Files converted at the same time
    #[arg(short = 'j', long, default_value_t = DEFAULT_MAX_CONCURRENT)]
    max_concurrent: usize,

    #[arg(short, long, default_value = "converted")]
    output_dir: PathBuf,

    /// Also write every output into converted_images.zip
    #[arg(long)]
    zip: bool,

    /// Retry every failed file once after the batch
    #[arg(long)]
    retry_failed: bool,

    /// Remember these options for the next run
    #[arg(long)]
    save_settings: bool,

    #[arg(long, default_value = "image-converter.json")]
    settings: PathBuf,

    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// Saved options overlaid with whatever was given on the command line.
    fn options(&self, saved: RawOptions) -> RawOptions {
        let mut options = saved;
        if self.format.is_some() {
            options.format = self.format.clone();
        }
        if self.quality.is_some() {
            options.quality = self.quality;
        }
        if self.target_size_kb.is_some() {
            options.size_optimization = true;
            options.target_size_kb = self.target_size_kb;
        }
        if self.width.is_some() || self.height.is_some() || self.scale.is_some() {
            options.resize = true;
            options.width = self.width;
            options.height = self.height;
            options.scale_percent = self.scale;
        }
        if self.no_aspect {
            options.maintain_aspect_ratio = Some(false);
        }
        if self.png_compression.is_some() {
            options.png_compression = self.png_compression;
        }
        if self.no_alpha {
            options.webp_alpha = Some(false);
        }
        options.lossless |= self.lossless;
        options.jpeg_progressive |= self.progressive;
        options.avif_low_data_mode |= self.low_data_mode;
        options.preserve_metadata |= self.preserve_metadata;
        options
    }
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

/// Expands directories (one level) and reads every image file.
async fn collect_sources(inputs: &[PathBuf]) -> anyhow::Result<Vec<SourceFile>> {
    let mut paths = Vec::new();
    for input in inputs {
        if fs::metadata(input).await.with_context(|| format!("Cannot access {}", input.display()))?.is_dir() {
            let mut entries = fs::read_dir(input).await?;
            let mut found = Vec::new();
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_file() && is_image(&path) {
                    found.push(path);
                }
            }
            found.sort();
            paths.extend(found);
        } else {
            paths.push(input.clone());
        }
    }

    let mut sources = Vec::with_capacity(paths.len());
    for path in paths {
        match read_source_file(&path).await {
            Ok(source) => sources.push(source),
            Err(e) => warn!("Skipping {}: {}", path.display(), e),
        }
    }
    Ok(sources)
}

fn is_image(path: &Path) -> bool {
    path.to_str().and_then(mime_from_extension).is_some()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let store = SettingsStore::new(&cli.settings);
    let saved = store.load().await.context("Failed to load saved settings")?;
    let options = cli.options(saved.unwrap_or_default());

    let config = ConverterConfig {
        max_concurrent: cli.max_concurrent,
        ..ConverterConfig::default()
    };
    let request = OptionResolver::new(config.defaults).resolve(&options)?;
    debug!("Resolved request: {:?}", request);

    if cli.save_settings {
        store.save(&options).await.context("Failed to save settings")?;
        info!("Settings saved to {}", store.path().display());
    }

    let sources = collect_sources(&cli.inputs).await?;
    if sources.is_empty() {
        bail!("No image files to convert");
    }

    let (pool, mut events) = WorkerPool::new(&config, ConversionPipeline::with_codec(ImageCodec));
    let reporter = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                JobEvent::Queued { job_id, file_name, .. } => debug!("Queued {} {}", job_id, file_name),
                JobEvent::Progress { job_id, state, progress } => {
                    debug!("Job {} {:?} {}%", job_id, state, progress)
                }
                JobEvent::Succeeded { result, .. } => info!(
                    "✓ {} ({} -> {}, {}% smaller)",
                    result.file_name,
                    format_file_size(result.original_size),
                    format_file_size(result.output_size),
                    result.size_reduction()
                ),
                JobEvent::Failed { file_name, error, .. } => warn!("✗ {}: {}", file_name, error),
            }
        }
    });

    info!("Converting {} files to {}", sources.len(), request.format);
    pool.enqueue(sources, request).await;
    pool.wait_idle().await;

    if cli.retry_failed {
        let failed: Vec<_> = pool
            .jobs()
            .await
            .into_iter()
            .filter(|job| job.state == JobState::Failed)
            .map(|job| job.id)
            .collect();
        if !failed.is_empty() {
            info!("Retrying {} failed files", failed.len());
            for id in failed {
                if let Err(e) = pool.retry(id).await {
                    warn!("Cannot retry job {}: {}", id, e);
                }
            }
            pool.wait_idle().await;
        }
    }

    fs::create_dir_all(&cli.output_dir)
        .await
        .with_context(|| format!("Cannot create {}", cli.output_dir.display()))?;

    let jobs = pool.jobs().await;
    let mut written = 0u64;
    for result in jobs.iter().filter_map(|job| job.result.as_ref()) {
        let path = cli.output_dir.join(&result.file_name);
        fs::write(&path, &result.bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        written += result.output_size;
    }

    if cli.zip {
        match pool.archive_results().await {
            Ok(archive) => {
                let path = cli.output_dir.join(ARCHIVE_NAME);
                fs::write(&path, archive).await?;
                info!("Archive written to {}", path.display());
            }
            Err(e) => warn!("{}", e),
        }
    }

    let stats = pool.snapshot().await;
    drop(pool);
    reporter.await?;
    info!("{} ({} written)", stats.status_line(), format_file_size(written));

    // A retried failure is judged by its retry.
    let retried: HashSet<_> = jobs.iter().filter_map(|job| job.retry_of).collect();
    let unrecovered = jobs
        .iter()
        .filter(|job| job.state == JobState::Failed && !retried.contains(&job.id))
        .count();
    if unrecovered > 0 {
        bail!("{} files could not be converted", unrecovered);
    }
    Ok(())
}
