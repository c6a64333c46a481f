use crate::error::{Error, Result};
use burn::prelude::*;
use image::{Rgb, RgbImage};
use std::path::Path;

/// Images per grid row.
pub const GRID_ROW_SIZE: usize = 8;
/// Black border between and around the grid cells, in pixels.
pub const GRID_PADDING: usize = 2;

/// Position of every cell in a grid of equally sized images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridLayout {
    pub columns: usize,
    pub rows: usize,
    cell_height: usize,
    cell_width: usize,
}

impl GridLayout {
    pub fn new(num_images: usize, height: usize, width: usize) -> Self {
        let columns = num_images.clamp(1, GRID_ROW_SIZE);

        Self {
            columns,
            rows: num_images.div_ceil(columns),
            cell_height: height + GRID_PADDING,
            cell_width: width + GRID_PADDING,
        }
    }

    /// Canvas `(width, height)` in pixels.
    pub fn dimensions(&self) -> (u32, u32) {
        (
            (self.columns * self.cell_width + GRID_PADDING) as u32,
            (self.rows * self.cell_height + GRID_PADDING) as u32,
        )
    }

    /// Top left `(x, y)` corner of the image at `index`.
    pub fn origin(&self, index: usize) -> (usize, usize) {
        let column = index % self.columns;
        let row = index / self.columns;

        (
            column * self.cell_width + GRID_PADDING,
            row * self.cell_height + GRID_PADDING,
        )
    }
}

/// Saves a batch of images as one PNG grid.
///
/// Values are min-max normalized over the whole batch, so both training images in `[-1, 1]`
/// and raw generator output render with full contrast. Single channel images are written as
/// gray levels.
///
/// # Shapes
///
/// - images: `[batch_size, channels, height, width]`
pub fn save_image_grid<B: Backend, P: AsRef<Path>>(images: Tensor<B, 4>, path: P) -> Result<()> {
    let [batch_size, channels, height, width] = images.dims();
    let values = images
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|err| Error::Data(format!("{err:?}")))?;
    let values = min_max_normalize(values);

    let layout = GridLayout::new(batch_size, height, width);
    let (canvas_width, canvas_height) = layout.dimensions();
    let mut canvas = RgbImage::new(canvas_width, canvas_height);
    let plane = height * width;

    for (index, image) in values.chunks(channels * plane).enumerate() {
        let (left, top) = layout.origin(index);

        for y in 0..height {
            for x in 0..width {
                let value = |channel: usize| to_u8(image[channel * plane + y * width + x]);
                let pixel = if channels >= 3 {
                    Rgb([value(0), value(1), value(2)])
                } else {
                    Rgb([value(0); 3])
                };
                canvas.put_pixel((left + x) as u32, (top + y) as u32, pixel);
            }
        }
    }

    if let Some(parent) = path.as_ref().parent() {
        std::fs::create_dir_all(parent)?;
    }
    canvas.save(path)?;

    Ok(())
}

fn min_max_normalize(values: Vec<f32>) -> Vec<f32> {
    let min = values.iter().copied().fold(f32::INFINITY, f32::min);
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = (max - min).max(1e-5);

    values
        .into_iter()
        .map(|value| (value - min) / range)
        .collect()
}

fn to_u8(value: f32) -> u8 {
    (value * 255.0 + 0.5).clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TestBackend;

    #[test]
    fn layout_wraps_after_eight_images() {
        let layout = GridLayout::new(10, 4, 4);

        assert_eq!((layout.columns, layout.rows), (8, 2));
        assert_eq!(layout.dimensions(), (50, 14));
        assert_eq!(layout.origin(0), (2, 2));
        assert_eq!(layout.origin(9), (8, 8));
    }

    #[test]
    fn layout_of_a_short_batch_is_a_single_row() {
        let layout = GridLayout::new(3, 4, 6);

        assert_eq!((layout.columns, layout.rows), (3, 1));
        assert_eq!(layout.dimensions(), (26, 8));
    }

    #[test]
    fn saved_grid_spans_the_full_intensity_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("samples/grid.png");
        let device = Default::default();
        let dark = Tensor::<TestBackend, 4>::full([1, 1, 4, 4], -1.0, &device);
        let bright = Tensor::<TestBackend, 4>::full([1, 1, 4, 4], 1.0, &device);

        save_image_grid(Tensor::cat(vec![dark, bright], 0), &path).unwrap();

        let grid = image::open(&path).unwrap().into_rgb8();
        assert_eq!(grid.dimensions(), (14, 8));
        assert_eq!(grid.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(grid.get_pixel(2, 2), &Rgb([0, 0, 0]));
        assert_eq!(grid.get_pixel(8, 2), &Rgb([255, 255, 255]));
    }

    #[test]
    fn constant_batch_does_not_divide_by_zero() {
        let values = min_max_normalize(vec![0.3; 8]);

        assert!(values.iter().all(|v| *v == 0.0));
    }
}
