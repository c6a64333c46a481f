use burn::{
    backend::{Autodiff, NdArray},
    config::Config,
};
use dcgan::{
    generating::generate,
    logger::LOG_FILE,
    model::ModelConfig,
    training::{CONFIG_FILE, REAL_SAMPLES_FILE, TrainingConfig, train},
};
use image::{Rgb, RgbImage};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;

fn write_images(root: &Path, count: u32) {
    for (class, offset) in [("red", 0), ("blue", 128)] {
        let dir = root.join(class);
        std::fs::create_dir_all(&dir).unwrap();

        for index in 0..count {
            let image = RgbImage::from_fn(12, 10, |x, y| {
                Rgb([offset as u8, (x * 20) as u8, (y * 20 + index) as u8])
            });
            image.save(dir.join(format!("{index}.png"))).unwrap();
        }
    }
}

fn config(input_dir: &Path) -> TrainingConfig {
    let model = ModelConfig::new()
        .with_image_size(8)
        .with_latent_dim(4)
        .with_generator_width(4)
        .with_discriminator_width(4);

    TrainingConfig {
        model,
        ..TrainingConfig::dcgan()
    }
    .with_input_dir(input_dir.to_string_lossy().into_owned())
    .with_num_epochs(2)
    .with_batch_size(4)
    .with_num_workers(2)
    .with_log_interval(1)
}

#[test]
fn training_run_writes_every_artifact() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let artifact_dir = output.path().join("run");
    write_images(input.path(), 3);

    // Leftovers of a previous run are removed.
    std::fs::create_dir_all(&artifact_dir).unwrap();
    std::fs::write(artifact_dir.join("stale.txt"), "previous run").unwrap();

    train::<Autodiff<NdArray>>(&artifact_dir, config(input.path()), Default::default()).unwrap();

    assert!(!artifact_dir.join("stale.txt").exists());
    for file in [
        CONFIG_FILE,
        REAL_SAMPLES_FILE,
        LOG_FILE,
        "fake_samples_0.png",
        "fake_samples_1.png",
        "netG_0.mpk",
        "netD_0.mpk",
        "netG_1.mpk",
        "netD_1.mpk",
    ] {
        assert!(artifact_dir.join(file).exists(), "missing {file}");
    }

    // 6 images in batches of 4, the last batch is partial.
    let log = std::fs::read_to_string(artifact_dir.join(LOG_FILE)).unwrap();
    assert!(log.contains("Number of training images: 6"), "{log}");
    assert!(log.contains("Epoch 0 [0/2] loss_D_real:"), "{log}");
    assert!(log.contains("Epoch 1 [1/2] loss_D_real:"), "{log}");
    assert!(log.contains("loss_G:"), "{log}");

    // The last report holds the 2 leftover images, samples use the full noise batch.
    let real = image::open(artifact_dir.join(REAL_SAMPLES_FILE)).unwrap();
    assert_eq!((real.width(), real.height()), (2 * 10 + 2, 12));
    let fake = image::open(artifact_dir.join("fake_samples_1.png")).unwrap();
    assert_eq!((fake.width(), fake.height()), (4 * 10 + 2, 12));

    let saved = TrainingConfig::load(artifact_dir.join(CONFIG_FILE)).unwrap();
    assert_eq!(saved.model.image_size, 8);
    assert_eq!(saved.model.image_channels, 3);

    let path = generate::<NdArray>(&artifact_dir, 1, 10, Default::default()).unwrap();
    assert_eq!(path, artifact_dir.join("generated_1.png"));
    let generated = image::open(path).unwrap();
    assert_eq!((generated.width(), generated.height()), (8 * 10 + 2, 2 * 10 + 2));
}

#[test]
fn empty_image_folder_fails_and_is_logged() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();

    let result = train::<Autodiff<NdArray>>(output.path(), config(input.path()), Default::default());

    assert!(matches!(result, Err(dcgan::Error::EmptyDataset(_))));
    let log = std::fs::read_to_string(output.path().join(LOG_FILE)).unwrap();
    assert!(log.contains("Training failed"), "{log}");
}

#[test]
fn invalid_configuration_is_rejected_before_training() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_images(input.path(), 1);
    let config = config(input.path()).with_real_label(0.0);

    let result = train::<Autodiff<NdArray>>(output.path(), config, Default::default());

    assert!(matches!(result, Err(dcgan::Error::InvalidConfig(_))));
    assert!(!output.path().join("netG_0.mpk").exists());
}

#[test]
fn generating_without_checkpoint_fails() {
    let output = tempfile::tempdir().unwrap();
    TrainingConfig::dcgan()
        .save(output.path().join(CONFIG_FILE))
        .unwrap();

    let result = generate::<NdArray>(output.path(), 3, 4, Default::default());

    assert!(matches!(result, Err(dcgan::Error::Record(_))));
}

#[test]
fn corrupt_image_is_reported_in_the_run_log() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let class = input.path().join("a");
    std::fs::create_dir_all(&class).unwrap();
    for index in 0..4 {
        std::fs::write(class.join(format!("broken_{index}.png")), "not a png").unwrap();
    }
    let config = config(input.path()).with_batch_size(2);

    let result = catch_unwind(AssertUnwindSafe(|| {
        train::<Autodiff<NdArray>>(output.path(), config, Default::default())
    }));

    assert!(!matches!(result, Ok(Ok(()))));
    let log = std::fs::read_to_string(output.path().join(LOG_FILE)).unwrap();
    assert!(log.contains("PANIC"), "{log}");
    assert!(log.contains("broken_"), "{log}");
}

#[test]
fn unset_seed_is_drawn_and_saved() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_images(input.path(), 1);
    let config = config(input.path()).with_seed(None).with_num_epochs(1);

    train::<Autodiff<NdArray>>(output.path(), config, Default::default()).unwrap();

    let saved = TrainingConfig::load(output.path().join(CONFIG_FILE)).unwrap();
    let seed = saved.seed.unwrap();
    let log = std::fs::read_to_string(output.path().join(LOG_FILE)).unwrap();
    assert!(log.contains(&format!("Random seed: {seed}")), "{log}");
}
