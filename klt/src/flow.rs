use crate::pyramid::{Pyramid, PyramidLevel};
use log::*;
use vo_core::{KeyPoint, KeyPoints};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Pyramidal Lucas-Kanade optical flow in the formulation of Bouguet.
///
/// Each point is tracked from the coarsest level down to full resolution. The
/// displacement found on one level seeds the search on the next finer level.
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct LucasKanade {
    /// Side length of the square search window. Even sizes are rounded up.
    pub window_size: usize,
    /// Index of the coarsest pyramid level used.
    pub max_level: usize,
    /// Iterations allowed per pyramid level.
    pub max_iterations: usize,
    /// Iteration on a level stops once the update is shorter than this (in pixels).
    pub epsilon: f32,
    /// Points whose window has a normalized spatial gradient matrix with a
    /// smaller minimum eigenvalue than this are lost.
    pub min_eigen_threshold: f32,
}

impl Default for LucasKanade {
    fn default() -> Self {
        Self {
            window_size: 21,
            max_level: 3,
            max_iterations: 30,
            epsilon: 0.01,
            min_eigen_threshold: 1e-4,
        }
    }
}

impl LucasKanade {
    /// Builds a pyramid of the depth this tracker searches.
    pub fn pyramid(&self, image: &crate::GrayFloatImage) -> Pyramid {
        Pyramid::new(image, self.max_level)
    }

    /// Tracks every keypoint from `previous` into `current`.
    ///
    /// The output has one entry per input keypoint in the same order. Points
    /// which left the image or could not be matched are `None`.
    pub fn track(
        &self,
        previous: &Pyramid,
        current: &Pyramid,
        keypoints: &KeyPoints,
    ) -> Vec<Option<KeyPoint>> {
        let levels = self
            .max_level
            .min(previous.max_level())
            .min(current.max_level());
        #[cfg(not(feature = "rayon"))]
        let tracked: Vec<Option<KeyPoint>> = keypoints
            .iter()
            .map(|keypoint| self.track_point(previous, current, levels, keypoint))
            .collect();
        #[cfg(feature = "rayon")]
        let tracked: Vec<Option<KeyPoint>> = keypoints
            .par_iter()
            .map(|keypoint| self.track_point(previous, current, levels, keypoint))
            .collect();
        debug!(
            "tracked {} of {} points over {} levels",
            tracked.iter().filter(|p| p.is_some()).count(),
            keypoints.len(),
            levels + 1
        );
        tracked
    }

    fn track_point(
        &self,
        previous: &Pyramid,
        current: &Pyramid,
        levels: usize,
        keypoint: &KeyPoint,
    ) -> Option<KeyPoint> {
        let full = &previous.level(0).image;
        let (x, y) = (keypoint.0.x as f32, keypoint.0.y as f32);
        if !inside(x, y, full.width(), full.height()) {
            return None;
        }
        let half = (self.window_size / 2) as isize;
        let mut guess = [0.0f32; 2];
        for level in (0..=levels).rev() {
            let scale = (1u32 << level) as f32;
            let point = [x / scale, y / scale];
            let flow = self.refine(
                previous.level(level),
                current.level(level),
                point,
                guess,
                half,
                level == 0,
            )?;
            guess = if level == 0 {
                flow
            } else {
                [2.0 * flow[0], 2.0 * flow[1]]
            };
        }
        let (tx, ty) = (x + guess[0], y + guess[1]);
        let current_full = &current.level(0).image;
        if !inside(tx, ty, current_full.width(), current_full.height()) {
            return None;
        }
        Some(KeyPoint::new(tx as f64, ty as f64))
    }

    /// Iteratively refines the displacement of one point on one level.
    ///
    /// Returns the total displacement on this level, or `None` if the point is
    /// lost. Textureless windows only lose the point on the finest level.
    fn refine(
        &self,
        previous: &PyramidLevel,
        current: &PyramidLevel,
        point: [f32; 2],
        guess: [f32; 2],
        half: isize,
        finest: bool,
    ) -> Option<[f32; 2]> {
        let side = (2 * half + 1) as usize;
        let mut patch = Vec::with_capacity(side * side);
        let (mut gxx, mut gxy, mut gyy) = (0.0f32, 0.0f32, 0.0f32);
        for dy in -half..=half {
            for dx in -half..=half {
                let (sx, sy) = (point[0] + dx as f32, point[1] + dy as f32);
                let intensity = previous.image.sample(sx, sy);
                let ix = previous.gradient_x.sample(sx, sy);
                let iy = previous.gradient_y.sample(sx, sy);
                gxx += ix * ix;
                gxy += ix * iy;
                gyy += iy * iy;
                patch.push((intensity, ix, iy));
            }
        }
        let area = patch.len() as f32;
        let min_eigenvalue = (gxx + gyy
            - ((gxx - gyy) * (gxx - gyy) + 4.0 * gxy * gxy).sqrt())
            / (2.0 * area);
        let determinant = gxx * gyy - gxy * gxy;
        if min_eigenvalue < self.min_eigen_threshold || determinant.abs() < f32::EPSILON {
            trace!(
                "window at ({}, {}) has minimum eigenvalue {}",
                point[0],
                point[1],
                min_eigenvalue
            );
            return if finest { None } else { Some(guess) };
        }

        let (width, height) = (current.image.width(), current.image.height());
        let mut flow = guess;
        for _ in 0..self.max_iterations {
            let (cx, cy) = (point[0] + flow[0], point[1] + flow[1]);
            if !inside(cx, cy, width, height) {
                return None;
            }
            let (mut bx, mut by) = (0.0f32, 0.0f32);
            let mut samples = patch.iter();
            for dy in -half..=half {
                for dx in -half..=half {
                    let &(intensity, ix, iy) = samples.next()?;
                    let difference =
                        intensity - current.image.sample(cx + dx as f32, cy + dy as f32);
                    bx += difference * ix;
                    by += difference * iy;
                }
            }
            let step = [
                (gyy * bx - gxy * by) / determinant,
                (gxx * by - gxy * bx) / determinant,
            ];
            flow[0] += step[0];
            flow[1] += step[1];
            if step[0] * step[0] + step[1] * step[1] < self.epsilon * self.epsilon {
                break;
            }
        }
        Some(flow)
    }
}

fn inside(x: f32, y: f32, width: usize, height: usize) -> bool {
    x >= 0.0 && y >= 0.0 && x <= (width - 1) as f32 && y <= (height - 1) as f32
}
