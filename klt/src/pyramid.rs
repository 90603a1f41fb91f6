use crate::{derivatives, image::GrayFloatImage};
use log::*;

/// One resolution of a [`Pyramid`] together with its spatial derivatives.
#[derive(Debug, Clone)]
pub struct PyramidLevel {
    pub image: GrayFloatImage,
    pub gradient_x: GrayFloatImage,
    pub gradient_y: GrayFloatImage,
}

impl PyramidLevel {
    fn new(image: GrayFloatImage) -> Self {
        #[cfg(not(feature = "rayon"))]
        let (gradient_x, gradient_y) = (
            derivatives::scharr_horizontal(&image),
            derivatives::scharr_vertical(&image),
        );
        #[cfg(feature = "rayon")]
        let (gradient_x, gradient_y) = rayon::join(
            || derivatives::scharr_horizontal(&image),
            || derivatives::scharr_vertical(&image),
        );
        Self {
            image,
            gradient_x,
            gradient_y,
        }
    }
}

/// A Gaussian image pyramid. Level `0` is the full resolution image and every
/// further level halves the resolution.
#[derive(Debug, Clone)]
pub struct Pyramid {
    levels: Vec<PyramidLevel>,
}

impl Pyramid {
    /// Levels stop being added once a side would shrink below this.
    pub const MIN_SIDE: usize = 8;

    /// Builds levels `0..=max_level`, stopping early for small images.
    pub fn new(image: &GrayFloatImage, max_level: usize) -> Self {
        let mut levels = Vec::with_capacity(max_level + 1);
        levels.push(PyramidLevel::new(image.clone()));
        for level in 1..=max_level {
            let previous = &levels[level - 1].image;
            if (previous.width() + 1) / 2 < Self::MIN_SIDE
                || (previous.height() + 1) / 2 < Self::MIN_SIDE
            {
                debug!("pyramid stopped at level {} for a {}x{} image", level - 1, image.width(), image.height());
                break;
            }
            let smaller = previous.pyr_down();
            trace!(
                "pyramid level {} is {}x{}",
                level,
                smaller.width(),
                smaller.height()
            );
            levels.push(PyramidLevel::new(smaller));
        }
        Self { levels }
    }

    pub fn levels(&self) -> &[PyramidLevel] {
        &self.levels
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// The index of the coarsest level.
    pub fn max_level(&self) -> usize {
        self.levels.len() - 1
    }

    pub fn level(&self, level: usize) -> &PyramidLevel {
        &self.levels[level]
    }
}
