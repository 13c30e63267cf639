use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use likeness_core::{
    CaptureOutcome, EnrollmentSession, FaceService, FaceStore, ImageArchive, OnnxExtractor,
};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "likeness", about = "Enroll and identify faces from image files")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll a person from a series of photos
    Enroll {
        /// Name to enroll the face under
        #[arg(short, long)]
        label: String,
        /// Accepted samples needed (defaults to the configured quota)
        #[arg(short, long)]
        quota: Option<usize>,
        /// Photos to try, in order, until the quota is met
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
    /// Identify the face in each photo
    Identify {
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
    /// List enrolled labels and their sample counts
    List,
    /// Print the effective configuration
    Config,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load().context("failed to load configuration")?;

    match cli.command {
        Commands::Enroll { label, quota, images } => {
            enroll(&config, &label, quota.unwrap_or(config.sample_quota), &images)
        }
        Commands::Identify { images } => identify(&config, &images),
        Commands::List => list(&config),
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn open_store(config: &Config) -> Result<FaceStore> {
    FaceStore::open(&config.data_file, config.embedding_dim)
        .with_context(|| format!("cannot use face store {}", config.data_file.display()))
}

fn open_service(config: &Config) -> Result<FaceService<OnnxExtractor>> {
    let store = open_store(config)?;
    let extractor = OnnxExtractor::load(&config.model_dir)
        .with_context(|| format!("cannot load models from {}", config.model_dir.display()))?;
    let service = FaceService::new(extractor, store, config.service_options()?)?
        .with_archive(ImageArchive::new(&config.image_dir));
    Ok(service)
}

fn load_image(path: &Path) -> Result<image::RgbImage> {
    let image = image::open(path).with_context(|| format!("cannot read image {}", path.display()))?;
    Ok(image.to_rgb8())
}

/// Visit each readable photo in order. Unreadable ones are reported and
/// skipped; returns how many were skipped.
fn each_image(
    images: &[PathBuf],
    mut visit: impl FnMut(&Path, image::RgbImage) -> Result<()>,
) -> Result<usize> {
    let mut skipped = 0;
    for path in images {
        match load_image(path) {
            Ok(image) => visit(path, image)?,
            Err(err) => {
                eprintln!("{}: {err:#}", path.display());
                skipped += 1;
            }
        }
    }
    Ok(skipped)
}

fn enroll(config: &Config, label: &str, quota: usize, images: &[PathBuf]) -> Result<()> {
    let mut service = open_service(config)?;
    let mut session = EnrollmentSession::new(label, quota)?;
    println!("Enrolling {:?}: {} photo(s) needed", session.label(), quota);

    each_image(images, |path, image| {
        match session.submit(&mut service, &image)? {
            CaptureOutcome::Accepted { remaining, .. } => {
                println!("{}: captured, {remaining} remaining", path.display());
            }
            CaptureOutcome::Rejected(rejection) => {
                println!("{}: failed to capture: {rejection}", path.display());
            }
            CaptureOutcome::AlreadyComplete => {
                println!("{}: skipped, enrollment already complete", path.display());
            }
        }
        Ok(())
    })?;

    let complete = session.is_complete();
    service.close();
    if complete {
        println!("Registration complete!");
        Ok(())
    } else {
        anyhow::bail!(
            "enrollment incomplete: {} of {} photo(s) accepted",
            session.accepted(),
            session.quota()
        )
    }
}

fn identify(config: &Config, images: &[PathBuf]) -> Result<()> {
    let mut service = open_service(config)?;
    let skipped = each_image(images, |path, image| {
        let outcome = service.identify(&image)?;
        match outcome.label() {
            Some(label) => println!("{}: {label} ({})", path.display(), outcome.reason()),
            None => println!("{}: {}", path.display(), outcome.reason()),
        }
        Ok(())
    })?;
    service.close();
    if skipped > 0 {
        tracing::warn!(skipped, "some photos could not be read");
    }
    Ok(())
}

fn list(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    if store.is_empty() {
        println!("No faces enrolled");
        return Ok(());
    }
    for label in store.labels() {
        println!("{label}\t{} sample(s)", store.embeddings_for(label).count());
    }
    store.close();
    Ok(())
}
