use crate::image::{separable_filter, GrayFloatImage};

/// Normalized Scharr derivative in x, so a unit slope gives a unit response.
pub fn scharr_horizontal(image: &GrayFloatImage) -> GrayFloatImage {
    // similar to cv::Scharr with xorder=1, yorder=0, scale=1/32
    GrayFloatImage(separable_filter(
        &image.0,
        &[-0.5, 0., 0.5],
        &[3. / 16., 10. / 16., 3. / 16.],
    ))
}

/// Normalized Scharr derivative in y, so a unit slope gives a unit response.
pub fn scharr_vertical(image: &GrayFloatImage) -> GrayFloatImage {
    // similar to cv::Scharr with xorder=0, yorder=1, scale=1/32
    GrayFloatImage(separable_filter(
        &image.0,
        &[3. / 16., 10. / 16., 3. / 16.],
        &[-0.5, 0., 0.5],
    ))
}

pub fn sobel_horizontal(image: &GrayFloatImage) -> GrayFloatImage {
    // similar to cv::Sobel with xorder=1, yorder=0, ksize=3
    GrayFloatImage(separable_filter(&image.0, &[-1., 0., 1.], &[1., 2., 1.]))
}

pub fn sobel_vertical(image: &GrayFloatImage) -> GrayFloatImage {
    // similar to cv::Sobel with xorder=0, yorder=1, ksize=3
    GrayFloatImage(separable_filter(&image.0, &[1., 2., 1.], &[-1., 0., 1.]))
}

/// Sums every `size` by `size` neighborhood, replicating the edge pixels.
pub fn box_sum(image: &GrayFloatImage, size: usize) -> GrayFloatImage {
    let kernel = vec![1.0; size.max(1) | 1];
    GrayFloatImage(separable_filter(&image.0, &kernel, &kernel))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(width: usize, height: usize, dx: f32, dy: f32) -> GrayFloatImage {
        let mut image = GrayFloatImage::new(width, height);
        for y in 0..height {
            for x in 0..width {
                image.put(x, y, dx * x as f32 + dy * y as f32);
            }
        }
        image
    }

    #[test]
    fn scharr_measures_slope() {
        let image = ramp(9, 7, 0.02, -0.01);
        let gx = scharr_horizontal(&image);
        let gy = scharr_vertical(&image);
        // Away from the replicated border the derivative is exact.
        for y in 1..6 {
            for x in 1..8 {
                assert!((gx.get(x, y) - 0.02).abs() < 1e-6);
                assert!((gy.get(x, y) + 0.01).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn sobel_is_scaled_derivative() {
        let image = ramp(9, 7, 0.02, 0.0);
        let gx = sobel_horizontal(&image);
        let gy = sobel_vertical(&image);
        assert!((gx.get(4, 3) - 0.02 * 8.0).abs() < 1e-6);
        assert!(gy.get(4, 3).abs() < 1e-6);
    }

    #[test]
    fn box_sum_counts_pixels() {
        let mut image = GrayFloatImage::new(8, 8);
        for y in 0..8 {
            for x in 0..8 {
                image.put(x, y, 1.0);
            }
        }
        let summed = box_sum(&image, 5);
        assert!((summed.get(4, 4) - 25.0).abs() < 1e-4);
        assert!((summed.get(0, 0) - 25.0).abs() < 1e-4);
    }
}
