use crate::error::{Error, Result};
use burn::{
    data::{
        dataloader::{DataLoader, DataLoaderBuilder, batcher::Batcher},
        dataset::{
            Dataset, InMemDataset,
            transform::{Mapper, MapperDataset, ShuffledDataset},
            vision::{MnistDataset, MnistItem},
        },
    },
    prelude::*,
};
use image::{DynamicImage, GrayImage, Luma, imageops::FilterType};
use std::fmt::Display;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const SUPPORTED_FILES: [&str; 4] = ["bmp", "jpg", "jpeg", "png"];

const MNIST_SIZE: u32 = 28;

/// Per-channel mean and standard deviation mapping `[0, 1]` pixels to `[-1, 1]`.
const PIXEL_MEAN: f32 = 0.5;
const PIXEL_STD: f32 = 0.5;

/// A square image already resized to the training resolution.
#[derive(Clone, Debug)]
pub struct ImageItem {
    /// Pixels in `[height, width, channels]` order.
    pub pixels: Vec<u8>,
    pub size: usize,
    pub channels: usize,
}

impl ImageItem {
    fn from_image(image: DynamicImage, channels: usize) -> Self {
        let size = image.width() as usize;
        let pixels = match channels {
            1 => image.into_luma8().into_raw(),
            _ => image.into_rgb8().into_raw(),
        };

        Self {
            pixels,
            size,
            channels,
        }
    }
}

/// Where the training images come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// A folder of class subfolders holding image files.
    Folder(PathBuf),
    /// The MNIST training set, downloaded on first use.
    Mnist,
}

impl ImageSource {
    /// Uses the image folder when it exists, MNIST otherwise.
    pub fn detect<P: AsRef<Path>>(input_dir: P) -> Self {
        let input_dir = input_dir.as_ref();

        if input_dir.is_dir() {
            Self::Folder(input_dir.to_path_buf())
        } else {
            Self::Mnist
        }
    }

    /// Channel count of the images this source yields.
    pub fn image_channels(&self, configured: usize) -> usize {
        match self {
            Self::Folder(_) => configured,
            Self::Mnist => 1,
        }
    }

    /// Builds the dataset, resizing every image to `image_size` with `channels` channels.
    ///
    /// Images are decoded lazily when the data loader requests them.
    pub fn load(&self, image_size: usize, channels: usize) -> Result<Arc<dyn Dataset<ImageItem>>> {
        let size = image_size as u32;
        let dataset: Arc<dyn Dataset<ImageItem>> = match self {
            Self::Folder(root) => {
                let paths = image_paths(root)?;
                Arc::new(MapperDataset::new(
                    InMemDataset::new(paths),
                    LoadImage { size, channels },
                ))
            }
            Self::Mnist => Arc::new(MapperDataset::new(
                MnistDataset::train(),
                MnistToImage { size },
            )),
        };

        if dataset.is_empty() {
            return Err(Error::EmptyDataset(self.to_string()));
        }

        Ok(dataset)
    }
}

impl Display for ImageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Folder(root) => write!(f, "{}", root.display()),
            Self::Mnist => f.write_str("MNIST"),
        }
    }
}

/// All supported image files under `root`, ordered by path.
fn image_paths(root: &Path) -> Result<Vec<PathBuf>> {
    let walker = globwalk::GlobWalkerBuilder::from_patterns(
        root,
        &[format!("*.{{{}}}", SUPPORTED_FILES.join(","))],
    )
    .follow_links(true)
    .case_insensitive(true)
    .build()
    .map_err(|err| Error::Dataset(format!("{err:?}")))?;

    let mut paths = walker
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.into_path())
        .collect::<Vec<_>>();
    paths.sort();

    Ok(paths)
}

/// Resizes the shorter side to `size`, then crops the center square.
pub fn resize_center_crop(image: DynamicImage, size: u32) -> DynamicImage {
    let (width, height) = (image.width(), image.height());
    let (new_width, new_height) = if width <= height {
        (size, scale_side(height, size, width))
    } else {
        (scale_side(width, size, height), size)
    };

    let resized = image.resize_exact(new_width, new_height, FilterType::Triangle);
    let left = (new_width - size) / 2;
    let top = (new_height - size) / 2;

    resized.crop_imm(left, top, size, size)
}

fn scale_side(side: u32, target: u32, shorter: u32) -> u32 {
    ((side as u64 * target as u64) / shorter as u64).max(target as u64) as u32
}

struct LoadImage {
    size: u32,
    channels: usize,
}

impl Mapper<PathBuf, ImageItem> for LoadImage {
    /// Decode an image file and bring it to the training resolution.
    fn map(&self, path: &PathBuf) -> ImageItem {
        // Dataset workers have no error channel, a broken file aborts the run.
        let image = image::open(path)
            .unwrap_or_else(|err| panic!("Failed to load image `{}`: {err}", path.display()));

        ImageItem::from_image(resize_center_crop(image, self.size), self.channels)
    }
}

struct MnistToImage {
    size: u32,
}

impl Mapper<MnistItem, ImageItem> for MnistToImage {
    fn map(&self, item: &MnistItem) -> ImageItem {
        let digit = GrayImage::from_fn(MNIST_SIZE, MNIST_SIZE, |x, y| {
            Luma([item.image[y as usize][x as usize] as u8])
        });
        let image = resize_center_crop(DynamicImage::ImageLuma8(digit), self.size);

        ImageItem::from_image(image, 1)
    }
}

/// Maps `[0, 1]` pixels to the `[-1, 1]` range shared with the generator output.
pub fn normalize<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Tensor<B, D> {
    tensor.sub_scalar(PIXEL_MEAN).div_scalar(PIXEL_STD)
}

#[derive(Clone, Debug, Default)]
pub struct ImageBatcher {}

#[derive(Clone, Debug)]
pub struct ImageBatch<B: Backend> {
    /// Images in `[batch_size, channels, height, width]` order, within `[-1, 1]`.
    pub images: Tensor<B, 4>,
}

impl<B: Backend> Batcher<B, ImageItem, ImageBatch<B>> for ImageBatcher {
    fn batch(&self, items: Vec<ImageItem>, device: &B::Device) -> ImageBatch<B> {
        let images = items
            .into_iter()
            .map(|item| {
                TensorData::new(
                    item.pixels,
                    Shape::new([item.size, item.size, item.channels]),
                )
            })
            .map(|data| {
                Tensor::<B, 3>::from_data(data.convert::<B::FloatElem>(), device)
                    // [H, W, C] -> [C, H, W]
                    .permute([2, 0, 1])
            })
            .map(|tensor| tensor / 255)
            .collect();

        let images = normalize(Tensor::stack(images, 0));

        ImageBatch { images }
    }
}

/// Batches of a dataset, reshuffled as a whole at every epoch.
///
/// Every batch of an epoch holds `batch_size` images except the last one. Full batches are
/// decoded by `num_workers` threads, the leftover images are batched last on the calling
/// thread.
pub struct EpochLoader<B: Backend> {
    dataset: Arc<dyn Dataset<ImageItem>>,
    batch_size: usize,
    num_workers: usize,
    seed: u64,
    device: B::Device,
}

impl<B: Backend> EpochLoader<B> {
    pub fn new(
        dataset: Arc<dyn Dataset<ImageItem>>,
        batch_size: usize,
        num_workers: usize,
        seed: u64,
        device: B::Device,
    ) -> Self {
        Self {
            dataset,
            batch_size,
            num_workers,
            seed,
            device,
        }
    }

    pub fn num_items(&self) -> usize {
        self.dataset.len()
    }

    pub fn num_batches(&self) -> usize {
        self.dataset.len().div_ceil(self.batch_size)
    }

    /// Shuffles the dataset for `epoch`, the order only depends on the seed and the epoch.
    pub fn epoch(&self, epoch: usize) -> EpochBatches<B> {
        let shuffled: Arc<dyn Dataset<ImageItem>> = Arc::new(ShuffledDataset::with_seed(
            self.dataset.clone(),
            self.seed.wrapping_add(epoch as u64),
        ));
        let num_full = shuffled.len() / self.batch_size;

        let groups = BatchGroups {
            dataset: shuffled.clone(),
            batch_size: self.batch_size,
            len: num_full,
        };
        // Each loader item is already a whole batch.
        let mut builder = DataLoaderBuilder::new(GroupBatcher::default())
            .batch_size(1)
            .set_device(self.device.clone());
        if self.num_workers > 0 {
            builder = builder.num_workers(self.num_workers);
        }

        EpochBatches {
            full: builder.build(groups),
            shuffled,
            leftover: num_full * self.batch_size..self.dataset.len(),
            device: self.device.clone(),
        }
    }
}

/// The batches of one epoch.
pub struct EpochBatches<B: Backend> {
    full: Arc<dyn DataLoader<B, ImageBatch<B>>>,
    shuffled: Arc<dyn Dataset<ImageItem>>,
    leftover: Range<usize>,
    device: B::Device,
}

impl<B: Backend> EpochBatches<B> {
    pub fn iter(&self) -> impl Iterator<Item = ImageBatch<B>> + '_ {
        let leftover = Some(self.leftover.clone()).filter(|range| !range.is_empty());

        self.full.iter().chain(leftover.into_iter().map(|range| {
            let items: Vec<ImageItem> = range
                .filter_map(|index| self.shuffled.get(index))
                .collect();
            ImageBatcher::default().batch(items, &self.device)
        }))
    }
}

/// Consecutive full batches of a shuffled dataset.
struct BatchGroups {
    dataset: Arc<dyn Dataset<ImageItem>>,
    batch_size: usize,
    len: usize,
}

impl Dataset<Vec<ImageItem>> for BatchGroups {
    fn get(&self, index: usize) -> Option<Vec<ImageItem>> {
        if index >= self.len {
            return None;
        }

        let start = index * self.batch_size;
        (start..start + self.batch_size)
            .map(|index| self.dataset.get(index))
            .collect()
    }

    fn len(&self) -> usize {
        self.len
    }
}

#[derive(Clone, Debug, Default)]
struct GroupBatcher {
    images: ImageBatcher,
}

impl<B: Backend> Batcher<B, Vec<ImageItem>, ImageBatch<B>> for GroupBatcher {
    fn batch(&self, groups: Vec<Vec<ImageItem>>, device: &B::Device) -> ImageBatch<B> {
        let items: Vec<ImageItem> = groups.into_iter().flatten().collect();

        self.images.batch(items, device)
    }
}
