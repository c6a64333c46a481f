use crate::{
    data::{EpochLoader, ImageSource},
    error::Error,
    logger::RunLogger,
    loss::{BinaryCrossEntropy, BinaryCrossEntropyConfig},
    model::{Discriminator, Generator, ModelConfig},
    visualize::save_image_grid,
};
use burn::{
    module::AutodiffModule,
    optim::{AdamConfig, GradientsAccumulator, GradientsParams, Optimizer},
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkFileRecorder},
    tensor::{Distribution, backend::AutodiffBackend},
};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info, warn};

/// Saved next to the artifacts so a run can be inspected and sampled later.
pub const CONFIG_FILE: &str = "config.json";
/// Latest real batch, overwritten at every report.
pub const REAL_SAMPLES_FILE: &str = "real_samples.png";
pub const GENERATOR_PREFIX: &str = "netG";
pub const DISCRIMINATOR_PREFIX: &str = "netD";

#[derive(Config)]
pub struct TrainingConfig {
    pub model: ModelConfig,
    pub optimizer: AdamConfig,

    /// Folder of class subfolders, MNIST is used when it does not exist.
    #[config(default = "String::from(\"input\")")]
    pub input_dir: String,
    #[config(default = 25)]
    pub num_epochs: usize,
    #[config(default = 128)]
    pub batch_size: usize,
    /// Threads decoding images, 0 decodes them on the training thread.
    #[config(default = 4)]
    pub num_workers: usize,
    /// A random seed is drawn and logged when unset.
    #[config(default = "Some(1)")]
    pub seed: Option<u64>,
    #[config(default = 2e-4)]
    pub lr: f64,
    #[config(default = 1.0)]
    pub real_label: f32,
    #[config(default = 0.0)]
    pub fake_label: f32,
    /// Losses are logged and sample grids saved every `log_interval` batches.
    #[config(default = 100)]
    pub log_interval: usize,
}

impl TrainingConfig {
    /// Standard DCGAN setup: Adam with `beta_1 = 0.5`.
    pub fn dcgan() -> Self {
        Self::new(
            ModelConfig::new(),
            AdamConfig::new().with_beta_1(0.5).with_beta_2(0.999),
        )
    }

    pub fn validate(&self) -> crate::Result<()> {
        self.model.validate()?;

        if self.real_label == self.fake_label {
            return Err(Error::InvalidConfig(format!(
                "real and fake labels must differ, both are {}",
                self.real_label
            )));
        }
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch size must be positive".to_string()));
        }
        if self.log_interval == 0 {
            return Err(Error::InvalidConfig(
                "log interval must be positive".to_string(),
            ));
        }

        Ok(())
    }

    pub fn labels(&self) -> Labels {
        Labels {
            real: self.real_label,
            fake: self.fake_label,
        }
    }
}

/// Target values of the real and fake branches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Labels {
    pub real: f32,
    pub fake: f32,
}

impl Labels {
    pub fn real<B: Backend>(&self, batch_size: usize, device: &B::Device) -> Tensor<B, 1> {
        Tensor::full([batch_size], self.real, device)
    }

    pub fn fake<B: Backend>(&self, batch_size: usize, device: &B::Device) -> Tensor<B, 1> {
        Tensor::full([batch_size], self.fake, device)
    }
}

/// Samples `[batch_size, latent_dim, 1, 1]` standard normal noise.
pub fn sample_noise<B: Backend>(
    batch_size: usize,
    latent_dim: usize,
    device: &B::Device,
) -> Tensor<B, 4> {
    Tensor::random(
        [batch_size, latent_dim, 1, 1],
        Distribution::Normal(0.0, 1.0),
        device,
    )
}

/// Losses of one training step.
#[derive(Clone, Debug)]
pub struct StepLosses<B: Backend> {
    pub discriminator_real: Tensor<B, 1>,
    pub discriminator_fake: Tensor<B, 1>,
    pub generator: Tensor<B, 1>,
}

impl<B: Backend> StepLosses<B> {
    /// Reads the losses back from the device as `(D real, D fake, G)`.
    pub fn values(self) -> (f32, f32, f32) {
        (
            self.discriminator_real.into_scalar().elem::<f32>(),
            self.discriminator_fake.into_scalar().elem::<f32>(),
            self.generator.into_scalar().elem::<f32>(),
        )
    }
}

/// Alternating updates of a generator and a discriminator.
pub struct GanTrainer<B, OG, OD>
where
    B: AutodiffBackend,
    OG: Optimizer<Generator<B>, B>,
    OD: Optimizer<Discriminator<B>, B>,
{
    pub generator: Generator<B>,
    pub discriminator: Discriminator<B>,
    optimizer_g: OG,
    optimizer_d: OD,
    accumulator: GradientsAccumulator<Discriminator<B>>,
    criterion: BinaryCrossEntropy,
    labels: Labels,
    latent_dim: usize,
    lr: f64,
}

impl<B, OG, OD> GanTrainer<B, OG, OD>
where
    B: AutodiffBackend,
    OG: Optimizer<Generator<B>, B>,
    OD: Optimizer<Discriminator<B>, B>,
{
    pub fn new(
        generator: Generator<B>,
        discriminator: Discriminator<B>,
        optimizer_g: OG,
        optimizer_d: OD,
        config: &TrainingConfig,
    ) -> Self {
        Self {
            generator,
            discriminator,
            optimizer_g,
            optimizer_d,
            accumulator: GradientsAccumulator::new(),
            criterion: BinaryCrossEntropyConfig::new().init(),
            labels: config.labels(),
            latent_dim: config.model.latent_dim,
            lr: config.lr,
        }
    }

    /// Trains both networks on one batch of real images.
    ///
    /// The discriminator is updated once from the sum of its real and fake gradients, then
    /// the generator is updated once from the updated discriminator's verdict on the same
    /// fake images.
    pub fn step(&mut self, real_images: Tensor<B, 4>) -> StepLosses<B::InnerBackend> {
        let device = real_images.device();
        let batch_size = real_images.dims()[0];

        let noise = sample_noise::<B>(batch_size, self.latent_dim, &device);
        let fake_images = self.generator.forward(noise);

        let (discriminator_real, discriminator_fake) =
            self.discriminator_step(real_images, fake_images.clone());
        let generator = self.generator_step(fake_images);

        StepLosses {
            discriminator_real,
            discriminator_fake,
            generator,
        }
    }

    /// Updates the discriminator, the generated images are detached so the generator gets
    /// no gradient from this step.
    pub fn discriminator_step(
        &mut self,
        real_images: Tensor<B, 4>,
        fake_images: Tensor<B, 4>,
    ) -> (Tensor<B::InnerBackend, 1>, Tensor<B::InnerBackend, 1>) {
        let device = real_images.device();
        let batch_size = real_images.dims()[0];

        let output = self.discriminator.forward(real_images);
        let loss_real = self
            .criterion
            .forward(output, self.labels.real(batch_size, &device));
        let grads = GradientsParams::from_grads(loss_real.backward(), &self.discriminator);
        self.accumulator.accumulate(&self.discriminator, grads);

        let output = self.discriminator.forward(fake_images.detach());
        let loss_fake = self
            .criterion
            .forward(output, self.labels.fake(batch_size, &device));
        let grads = GradientsParams::from_grads(loss_fake.backward(), &self.discriminator);
        self.accumulator.accumulate(&self.discriminator, grads);

        let grads = self.accumulator.grads();
        self.discriminator = self
            .optimizer_d
            .step(self.lr, self.discriminator.clone(), grads);

        (loss_real.inner(), loss_fake.inner())
    }

    /// Updates the generator so the discriminator labels its images as real.
    pub fn generator_step(&mut self, fake_images: Tensor<B, 4>) -> Tensor<B::InnerBackend, 1> {
        let device = fake_images.device();
        let batch_size = fake_images.dims()[0];

        let output = self.discriminator.forward(fake_images);
        let loss = self
            .criterion
            .forward(output, self.labels.real(batch_size, &device));

        // The discriminator receives gradients too, only the generator ones are applied.
        let grads = GradientsParams::from_grads(loss.backward(), &self.generator);
        self.generator = self.optimizer_g.step(self.lr, self.generator.clone(), grads);

        loss.inner()
    }
}

/// Path of a checkpoint without extension, the recorder appends its own.
pub fn checkpoint_path<P: AsRef<Path>>(artifact_dir: P, prefix: &str, epoch: usize) -> PathBuf {
    artifact_dir.as_ref().join(format!("{prefix}_{epoch}"))
}

pub fn fake_samples_path<P: AsRef<Path>>(artifact_dir: P, epoch: usize) -> PathBuf {
    artifact_dir.as_ref().join(format!("fake_samples_{epoch}.png"))
}

/// Full precision recorder used for every checkpoint.
pub fn checkpoint_recorder() -> NamedMpkFileRecorder<FullPrecisionSettings> {
    NamedMpkFileRecorder::new()
}

// Create the directory to save the artifacts of a run
fn create_artifact_dir(artifact_dir: &Path) -> crate::Result<()> {
    // Remove existing artifacts
    if artifact_dir.exists() {
        std::fs::remove_dir_all(artifact_dir)?;
    }
    std::fs::create_dir_all(artifact_dir)?;

    Ok(())
}

/// Trains a DCGAN, writing the run log, sample grids and checkpoints into `artifact_dir`.
///
/// The directory is cleared first. Every error ends the run and is logged before being
/// returned.
pub fn train<B: AutodiffBackend>(
    artifact_dir: &Path,
    config: TrainingConfig,
    device: B::Device,
) -> crate::Result<()> {
    create_artifact_dir(artifact_dir)?;
    let logger = RunLogger::install(artifact_dir)?;
    info!("Logging to {}", logger.path().display());

    let result = run::<B>(artifact_dir, config, device);
    if let Err(err) = &result {
        error!("Training failed: {err}");
    }

    result
}

fn run<B: AutodiffBackend>(
    artifact_dir: &Path,
    config: TrainingConfig,
    device: B::Device,
) -> crate::Result<()> {
    config.validate()?;

    info!("Device: {device:?}");
    let seed = config.seed.unwrap_or_else(|| rand::random_range(1..10_000));
    info!("Random seed: {seed}");
    B::seed(seed);

    info!("Learning rate: {}", config.lr);
    info!("Batch size: {}", config.batch_size);
    info!("Epochs: {}", config.num_epochs);

    let source = ImageSource::detect(&config.input_dir);
    if source == ImageSource::Mnist {
        warn!(
            "No data available in {}, using the MNIST dataset instead",
            config.input_dir
        );
    }
    let channels = source.image_channels(config.model.image_channels);
    let config = TrainingConfig {
        model: config.model.clone().with_image_channels(channels),
        seed: Some(seed),
        ..config
    };
    config.save(artifact_dir.join(CONFIG_FILE))?;

    let dataset = source.load(config.model.image_size, channels)?;

    let loader = EpochLoader::<B>::new(
        dataset,
        config.batch_size,
        config.num_workers,
        seed,
        device.clone(),
    );
    let num_batches = loader.num_batches();
    info!("Number of training images: {}", loader.num_items());

    let generator = config.model.init_generator::<B>(&device);
    info!("{generator}");
    let discriminator = config.model.init_discriminator::<B>(&device);
    info!("{discriminator}");

    // Fixed noise, so grids of different reports are comparable.
    let viz_noise = sample_noise::<B>(config.batch_size, config.model.latent_dim, &device);

    let mut trainer = GanTrainer::new(
        generator,
        discriminator,
        config.optimizer.init::<B, Generator<B>>(),
        config.optimizer.init::<B, Discriminator<B>>(),
        &config,
    );

    for epoch in 0..config.num_epochs {
        let start = Instant::now();

        let batches = loader.epoch(epoch);
        for (iteration, batch) in batches.iter().enumerate() {
            let losses = trainer.step(batch.images.clone());

            if iteration % config.log_interval == 0 {
                let (loss_d_real, loss_d_fake, loss_g) = losses.values();
                info!(
                    "Epoch {epoch} [{iteration}/{num_batches}] loss_D_real: {loss_d_real:.4} \
                     loss_D_fake: {loss_d_fake:.4} loss_G: {loss_g:.4}"
                );

                save_image_grid(batch.images, artifact_dir.join(REAL_SAMPLES_FILE))?;
                // Training mode forward, batch norm uses the statistics of the fixed noise.
                let samples = trainer.generator.forward(viz_noise.clone()).detach();
                save_image_grid(samples, fake_samples_path(artifact_dir, epoch))?;
            }
        }

        save_checkpoint::<B, _>(&trainer.generator, GENERATOR_PREFIX, artifact_dir, epoch)?;
        save_checkpoint::<B, _>(
            &trainer.discriminator,
            DISCRIMINATOR_PREFIX,
            artifact_dir,
            epoch,
        )?;

        info!(
            "Epoch {epoch} completed in {:.1}s",
            start.elapsed().as_secs_f32()
        );
    }

    Ok(())
}

fn save_checkpoint<B: AutodiffBackend, M: AutodiffModule<B>>(
    module: &M,
    prefix: &str,
    artifact_dir: &Path,
    epoch: usize,
) -> crate::Result<()> {
    module
        .clone()
        .save_file(checkpoint_path(artifact_dir, prefix, epoch), &checkpoint_recorder())?;

    Ok(())
}
