use crate::{
    error::Result,
    logger::RunLogger,
    model::Generator,
    training::{
        CONFIG_FILE, GENERATOR_PREFIX, TrainingConfig, checkpoint_path, checkpoint_recorder,
        sample_noise,
    },
    visualize::save_image_grid,
};
use burn::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Samples `num_images` images from the generator saved after `epoch` and writes them as a
/// grid to `generated_<epoch>.png` in the artifact directory.
pub fn generate<B: Backend>(
    artifact_dir: &Path,
    epoch: usize,
    num_images: usize,
    device: B::Device,
) -> Result<PathBuf> {
    let _logger = RunLogger::install(artifact_dir)?;

    let result = sample::<B>(artifact_dir, epoch, num_images, device);
    if let Err(err) = &result {
        error!("Generation failed: {err}");
    }

    result
}

fn sample<B: Backend>(
    artifact_dir: &Path,
    epoch: usize,
    num_images: usize,
    device: B::Device,
) -> Result<PathBuf> {
    let config = TrainingConfig::load(artifact_dir.join(CONFIG_FILE))?;
    if let Some(seed) = config.seed {
        B::seed(seed);
    }

    let checkpoint = checkpoint_path(artifact_dir, GENERATOR_PREFIX, epoch);
    info!("Loading generator from {}", checkpoint.display());
    let generator: Generator<B> = config
        .model
        .init_generator::<B>(&device)
        .load_file(checkpoint, &checkpoint_recorder(), &device)?;

    let noise = sample_noise::<B>(num_images, config.model.latent_dim, &device);
    let images = generator.forward(noise);

    let path = artifact_dir.join(format!("generated_{epoch}.png"));
    save_image_grid(images, &path)?;
    info!("Saved {num_images} generated images to {}", path.display());

    Ok(path)
}
