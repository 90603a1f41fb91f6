use crate::{derivatives, image::GrayFloatImage};
use float_ord::FloatOrd;
use log::*;
use vo_core::{KeyPoint, KeyPoints};

/// Shi-Tomasi "good features to track" corner detector.
///
/// The corner quality of a pixel is the smaller eigenvalue of the structure
/// tensor summed over a `block_size` neighborhood. Pixels below
/// `quality_level` times the best quality in the image are discarded, the
/// rest go through 3x3 non-maximum suppression and are then taken strongest
/// first so long as no stronger corner lies within `min_distance`.
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct GoodFeatures {
    /// Maximum number of corners returned. Zero means no limit.
    pub num_features: usize,
    /// Fraction of the strongest corner quality a corner must exceed.
    pub quality_level: f32,
    /// Minimum euclidean distance in pixels between returned corners.
    pub min_distance: f32,
    /// Side length of the neighborhood the structure tensor is summed over.
    pub block_size: usize,
}

impl Default for GoodFeatures {
    fn default() -> Self {
        Self {
            num_features: 2000,
            quality_level: 0.01,
            min_distance: 3.0,
            block_size: 5,
        }
    }
}

impl GoodFeatures {
    /// Keep the defaults but change the number of corners returned.
    pub fn new(num_features: usize) -> Self {
        Self {
            num_features,
            ..Default::default()
        }
    }

    /// The minimum eigenvalue of the structure tensor at every pixel.
    pub fn response(&self, image: &GrayFloatImage) -> GrayFloatImage {
        let dx = derivatives::sobel_horizontal(image);
        let dy = derivatives::sobel_vertical(image);
        let (width, height) = (image.width(), image.height());
        let mut dxx = GrayFloatImage::new(width, height);
        let mut dxy = GrayFloatImage::new(width, height);
        let mut dyy = GrayFloatImage::new(width, height);
        for ((&gx, &gy), ((xx, xy), yy)) in dx
            .iter()
            .zip(dy.iter())
            .zip(dxx.iter_mut().zip(dxy.iter_mut()).zip(dyy.iter_mut()))
        {
            *xx = gx * gx;
            *xy = gx * gy;
            *yy = gy * gy;
        }
        let a = derivatives::box_sum(&dxx, self.block_size);
        let b = derivatives::box_sum(&dxy, self.block_size);
        let c = derivatives::box_sum(&dyy, self.block_size);
        let mut response = GrayFloatImage::new(width, height);
        for (((&a, &b), &c), out) in a.iter().zip(b.iter()).zip(c.iter()).zip(response.iter_mut()) {
            let half_trace = 0.5 * (a + c);
            let half_diff = 0.5 * (a - c);
            *out = (half_trace - (half_diff * half_diff + b * b).sqrt()).max(0.0);
        }
        response
    }

    /// Finds the strongest well separated corners in the image.
    ///
    /// Returns an empty set when nothing in the image qualifies as a corner.
    pub fn detect(&self, image: &GrayFloatImage) -> KeyPoints {
        let (width, height) = (image.width(), image.height());
        if width < 3 || height < 3 {
            return KeyPoints::new();
        }
        let response = self.response(image);
        let max_response = response.iter().copied().fold(0.0f32, f32::max);
        if max_response <= 0.0 {
            debug!("no corner response in a {}x{} image", width, height);
            return KeyPoints::new();
        }
        let threshold = max_response * self.quality_level;

        let mut candidates = vec![];
        for y in 1..height - 1 {
            for x in 1..width - 1 {
                let value = response.get(x, y);
                if value > threshold && is_local_maximum(&response, x, y) {
                    candidates.push((value, x, y));
                }
            }
        }
        candidates.sort_by_key(|&(value, _, _)| core::cmp::Reverse(FloatOrd(value)));
        trace!(
            "{} corner candidates above {} out of max {}",
            candidates.len(),
            threshold,
            max_response
        );

        let limit = if self.num_features == 0 {
            usize::MAX
        } else {
            self.num_features
        };
        let mut grid = OccupancyGrid::new(width, height, self.min_distance);
        let keypoints: KeyPoints = candidates
            .into_iter()
            .map(|(_, x, y)| (x as f32, y as f32))
            .filter(|&(x, y)| grid.try_insert(x, y))
            .take(limit)
            .map(|(x, y)| KeyPoint::new(x as f64, y as f64))
            .collect();
        debug!("detected {} corners", keypoints.len());
        keypoints
    }
}

fn is_local_maximum(response: &GrayFloatImage, x: usize, y: usize) -> bool {
    let value = response.get(x, y);
    (y - 1..=y + 1).all(|ny| (x - 1..=x + 1).all(|nx| response.get(nx, ny) <= value))
}

/// Buckets accepted corners so the distance check only visits nearby cells.
struct OccupancyGrid {
    min_distance: f32,
    cell_size: f32,
    columns: usize,
    rows: usize,
    cells: Vec<Vec<(f32, f32)>>,
}

impl OccupancyGrid {
    fn new(width: usize, height: usize, min_distance: f32) -> Self {
        let min_distance = min_distance.max(0.0);
        let cell_size = min_distance.max(1.0);
        let columns = (width as f32 / cell_size).ceil() as usize + 1;
        let rows = (height as f32 / cell_size).ceil() as usize + 1;
        Self {
            min_distance,
            cell_size,
            columns,
            rows,
            cells: vec![vec![]; columns * rows],
        }
    }

    /// Records the point unless an existing one is closer than the minimum distance.
    fn try_insert(&mut self, x: f32, y: f32) -> bool {
        if self.min_distance <= 0.0 {
            return true;
        }
        let column = (x / self.cell_size) as usize;
        let row = (y / self.cell_size) as usize;
        let min_distance_squared = self.min_distance * self.min_distance;
        for r in row.saturating_sub(1)..=(row + 1).min(self.rows - 1) {
            for c in column.saturating_sub(1)..=(column + 1).min(self.columns - 1) {
                let crowded = self.cells[r * self.columns + c].iter().any(|&(ox, oy)| {
                    let (dx, dy) = (ox - x, oy - y);
                    dx * dx + dy * dy < min_distance_squared
                });
                if crowded {
                    return false;
                }
            }
        }
        self.cells[row * self.columns + column].push((x, y));
        true
    }
}
