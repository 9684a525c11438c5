use anyhow::{bail, Context};
use clap::Parser;
use img_tinify::cli::{Args, Commands, ConfigAction, ConfigSetArgs};
use img_tinify::constants::{
    COMPRESSED_SIZE_PREFIX, COMPRESSION_RATIO_PREFIX, INFO_PREFIX, ORIGINAL_SIZE_PREFIX,
    SUCCESS_PREFIX,
};
use img_tinify::progress::BatchProgress;
use img_tinify::{
    collect_image_files, format_file_size, logger, BatchRunner, CompressionError, ImageJob,
    JobHandle, JobState, PlacementPolicy, QuotaTracker, SettingsStore, TinifyClient,
};
use img_tinify::{error, info, verbose, warn};
use std::path::PathBuf;
use std::sync::Arc;

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    logger::set_quiet_mode(args.quiet);
    logger::set_verbose_mode(args.verbose);
    logger::init_tracing(args.verbose);

    let runtime = tokio::runtime::Runtime::new().context("failed to start the async runtime")?;
    runtime.block_on(run(args))
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config_path = args.config.unwrap_or_else(SettingsStore::default_path);
    let mut store = SettingsStore::load(&config_path)
        .await
        .with_context(|| format!("failed to read settings from {}", config_path.display()))?;

    match args.command {
        Commands::Optimize {
            inputs,
            api_key,
            override_original,
            output,
            recursive,
        } => {
            let policy = if override_original {
                PlacementPolicy::OverrideInPlace
            } else if let Some(dir) = output {
                PlacementPolicy::Directory(dir)
            } else {
                store.settings.placement_policy()
            };
            let token = api_key.unwrap_or_else(|| store.settings.api_token.clone());
            optimize(&mut store, token, policy, &inputs, recursive).await
        }
        Commands::Config {
            action: ConfigAction::Show,
        } => {
            show_settings(&store);
            Ok(())
        }
        Commands::Config {
            action: ConfigAction::Set(set),
        } => update_settings(&mut store, set).await,
        Commands::Quota => {
            println!("{}", store.settings.compressed_count);
            Ok(())
        }
    }
}

async fn optimize(
    store: &mut SettingsStore,
    token: String,
    policy: PlacementPolicy,
    inputs: &[String],
    recursive: bool,
) -> anyhow::Result<()> {
    if token.trim().is_empty() {
        return Err(CompressionError::MissingApiKey.into());
    }
    policy
        .validate()
        .context("pass --output DIR, --override, or run `img-tinify config set --output DIR`")?;

    let files = collect_image_files(inputs, recursive)?;
    if files.is_empty() {
        warn!("No image files found in the input path");
        return Ok(());
    }

    let jobs = files
        .iter()
        .map(|path| ImageJob::new(path).map(ImageJob::into_handle))
        .collect::<Result<Vec<JobHandle>, _>>()?;

    info!("🚀 Optimizing {} images...", jobs.len());
    match &policy {
        PlacementPolicy::OverrideInPlace => {
            info!("📁 Output: replacing originals");
        }
        PlacementPolicy::Directory(dir) => {
            info!("📁 Output: {:?}", dir);
        }
    }

    let quota = QuotaTracker::global();
    let client = TinifyClient::new(token, Arc::clone(&quota))?;
    let progress = BatchProgress::new(&jobs, logger::is_quiet());
    let runner = BatchRunner::new(Arc::new(client), policy).with_observer(progress.observer());

    let summary = runner.run_batch(&jobs).await;

    info!("\n{} Batch Summary:", INFO_PREFIX);
    info!("  {} images optimized", summary.finished);
    info!("  {} {}", ORIGINAL_SIZE_PREFIX, format_file_size(summary.total_original));
    info!("  {} {}", COMPRESSED_SIZE_PREFIX, format_file_size(summary.total_optimized));
    info!("  {} {:.1}%", COMPRESSION_RATIO_PREFIX, summary.compression_ratio());
    info!("  ⏱️  Total time: {:.2?}", summary.elapsed);

    for job in &jobs {
        let job = job.lock();
        match job.state() {
            JobState::Error(err) => {
                error!("{}: {}", job.source_path().display(), err);
            }
            JobState::Finished(path) => {
                verbose!("{} -> {}", job.source_path().display(), path.display());
            }
            _ => {}
        }
    }

    if let Some(count) = quota.current() {
        store.settings.compressed_count = count;
        store
            .save()
            .await
            .with_context(|| format!("failed to save settings to {}", store.path().display()))?;
        info!("  🔢 Compressions this month: {}", count);
    }

    if summary.failed > 0 {
        bail!("{} of {} images failed", summary.failed, summary.total());
    }
    info!("{} Done", SUCCESS_PREFIX);
    Ok(())
}

fn show_settings(store: &SettingsStore) {
    let settings = &store.settings;
    println!("{} Settings ({})", INFO_PREFIX, store.path().display());
    println!("  api_token:         {}", settings.masked_token());
    println!("  override_original: {}", settings.override_original);
    println!(
        "  directory_to_save: {}",
        settings
            .directory_to_save
            .as_ref()
            .map(|dir| dir.display().to_string())
            .unwrap_or_else(|| "(not set)".to_string())
    );
    println!("  auto_processing:   {}", settings.auto_processing);
    println!("  compressed_count:  {}", settings.compressed_count);
}

async fn update_settings(store: &mut SettingsStore, set: ConfigSetArgs) -> anyhow::Result<()> {
    if set.is_empty() {
        bail!("nothing to update; see `img-tinify config set --help`");
    }

    if let Some(key) = set.api_key {
        store.settings.api_token = key.trim().to_string();
    }
    if let Some(override_original) = set.override_original {
        store.settings.override_original = override_original;
    }
    if let Some(dir) = set.output {
        store.settings.directory_to_save = Some(absolute(dir));
    }
    if let Some(auto_processing) = set.auto_processing {
        store.settings.auto_processing = auto_processing;
    }

    store
        .save()
        .await
        .with_context(|| format!("failed to save settings to {}", store.path().display()))?;
    info!("{} Settings saved to {}", SUCCESS_PREFIX, store.path().display());
    Ok(())
}

fn absolute(dir: PathBuf) -> PathBuf {
    if dir.is_absolute() {
        return dir;
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(&dir))
        .unwrap_or(dir)
}
