use derive_more::{Deref, DerefMut};
use image::{DynamicImage, ImageBuffer, Luma};
use log::*;
use ndarray::{Array2, ArrayView2};

type GrayImageBuffer = ImageBuffer<Luma<f32>, Vec<f32>>;

/// The image type we use in this library.
///
/// This is simply a wrapper around a contiguous f32 buffer with values between `0.0` and `1.0`.
/// Filters and sampling operate on the raw buffer directly. We continue to use the image
/// crate for loading images and for converting color images to grayscale.
#[derive(Debug, Clone, Deref, DerefMut)]
pub struct GrayFloatImage(pub GrayImageBuffer);

impl GrayFloatImage {
    /// Create a unit float image from the image crate's DynamicImage type.
    ///
    /// Color images are converted to luma first, so any frame source can be fed in directly.
    ///
    /// # Arguments
    /// * `input_image` - the input image.
    /// # Return value
    /// An image with pixel values between 0 and 1.
    pub fn from_dynamic(input_image: &DynamicImage) -> Self {
        trace!(
            "Converting a {} x {} {:?} image to gray float",
            input_image.width(),
            input_image.height(),
            input_image.color()
        );
        Self(input_image.to_luma32f())
    }

    pub fn from_array2(arr: Array2<f32>) -> Self {
        let (height, width) = arr.dim();
        let raw = if arr.is_standard_layout() {
            arr.into_raw_vec()
        } else {
            arr.iter().copied().collect()
        };
        Self(
            ImageBuffer::from_raw(width as u32, height as u32, raw)
                .expect("raw vector didn't have enough pixels for the image"),
        )
    }

    pub fn ref_array2(&self) -> ArrayView2<f32> {
        ArrayView2::from_shape((self.height(), self.width()), self.0.as_raw())
            .expect("image buffer always holds width * height pixels")
    }

    pub fn width(&self) -> usize {
        self.0.width() as usize
    }

    pub fn height(&self) -> usize {
        self.0.height() as usize
    }

    pub fn new(width: usize, height: usize) -> Self {
        Self(ImageBuffer::from_pixel(
            width as u32,
            height as u32,
            Luma([0.0]),
        ))
    }

    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.0.as_raw()[y * self.width() + x]
    }

    pub fn put(&mut self, x: usize, y: usize, pixel_value: f32) {
        let width = self.width();
        let raw: &mut [f32] = &mut self.0;
        raw[y * width + x] = pixel_value;
    }

    /// Reads a pixel, replicating the border for coordinates outside the image.
    pub fn get_clamped(&self, x: isize, y: isize) -> f32 {
        let x = x.clamp(0, self.width() as isize - 1) as usize;
        let y = y.clamp(0, self.height() as isize - 1) as usize;
        self.get(x, y)
    }

    /// Bilinear interpolation at a subpixel location with border replication.
    ///
    /// Pixel centers lie on integer coordinates.
    pub fn sample(&self, x: f32, y: f32) -> f32 {
        let x0 = x.floor();
        let y0 = y.floor();
        let ax = x - x0;
        let ay = y - y0;
        let (x0, y0) = (x0 as isize, y0 as isize);
        let top = self.get_clamped(x0, y0) * (1.0 - ax) + self.get_clamped(x0 + 1, y0) * ax;
        let bottom =
            self.get_clamped(x0, y0 + 1) * (1.0 - ax) + self.get_clamped(x0 + 1, y0 + 1) * ax;
        top * (1.0 - ay) + bottom * ay
    }

    /// Blurs with the 5-tap binomial kernel and drops every odd row and column.
    ///
    /// The result is `(width + 1) / 2` by `(height + 1) / 2`.
    pub fn pyr_down(&self) -> Self {
        let blurred = separable_filter(&self.0, &PYRAMID_KERNEL, &PYRAMID_KERNEL);
        let width = (self.width() + 1) / 2;
        let height = (self.height() + 1) / 2;
        let source = self.width();
        let raw = blurred.as_raw();
        Self(ImageBuffer::from_fn(width as u32, height as u32, |x, y| {
            Luma([raw[2 * y as usize * source + 2 * x as usize]])
        }))
    }
}

/// Gaussian approximation used between pyramid levels.
const PYRAMID_KERNEL: [f32; 5] = [1.0 / 16.0, 4.0 / 16.0, 6.0 / 16.0, 4.0 / 16.0, 1.0 / 16.0];

/// Correlates every row with `kernel`, replicating the edge pixels.
pub fn horizontal_filter(image: &GrayImageBuffer, kernel: &[f32]) -> GrayImageBuffer {
    let kernel_size = kernel.len();
    debug_assert!(kernel_size % 2 == 1);
    let half = kernel_size / 2;
    let width = image.width() as usize;
    let height = image.height() as usize;
    let mut output = vec![0.0; width * height];
    if width == 0 {
        return GrayImageBuffer::from_raw(0, height as u32, output).unwrap_or_default();
    }
    let mut scratch = vec![0f32; width + 2 * half];
    for (row_in, row_out) in image
        .as_raw()
        .chunks_exact(width)
        .zip(output.chunks_exact_mut(width))
    {
        scratch[..half].fill(row_in[0]);
        scratch[half..half + width].copy_from_slice(row_in);
        scratch[half + width..].fill(row_in[width - 1]);
        for (window, out) in scratch.windows(kernel_size).zip(row_out) {
            *out = window.iter().zip(kernel).map(|(a, b)| a * b).sum();
        }
    }
    GrayImageBuffer::from_raw(width as u32, height as u32, output).unwrap_or_default()
}

/// Correlates every column with `kernel`, replicating the edge pixels.
pub fn vertical_filter(image: &GrayImageBuffer, kernel: &[f32]) -> GrayImageBuffer {
    let kernel_size = kernel.len();
    debug_assert!(kernel_size % 2 == 1);
    let half = kernel_size as isize / 2;
    let width = image.width() as usize;
    let height = image.height() as isize;
    let raw = image.as_raw();
    let mut output = vec![0.0; raw.len()];
    for y in 0..height {
        let row_out = &mut output[y as usize * width..(y as usize + 1) * width];
        for (k, &weight) in kernel.iter().enumerate() {
            let source = (y + k as isize - half).clamp(0, height - 1) as usize;
            let row_in = &raw[source * width..(source + 1) * width];
            for (out, &pixel) in row_out.iter_mut().zip(row_in) {
                *out += weight * pixel;
            }
        }
    }
    GrayImageBuffer::from_raw(width as u32, height as u32, output).unwrap_or_default()
}

pub fn separable_filter(
    image: &GrayImageBuffer,
    h_kernel: &[f32],
    v_kernel: &[f32],
) -> GrayImageBuffer {
    let h = horizontal_filter(image, h_kernel);
    vertical_filter(&h, v_kernel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_pcg::Pcg64;

    fn noise(width: u32, height: u32) -> GrayImageBuffer {
        let mut rng = Pcg64::from_seed([9; 32]);
        ImageBuffer::from_fn(width, height, |_, _| Luma([rng.gen::<f32>()]))
    }

    #[test]
    fn horizontal_filter() {
        let image = noise(37, 23);
        let kernel = [0.1, 0.2, 0.4, 0.2, 0.1];
        let filtered_ours = super::horizontal_filter(&image, &kernel);
        let filtered_imageproc = imageproc::filter::horizontal_filter(&image, &kernel);
        imageproc::assert_pixels_eq_within!(filtered_ours, filtered_imageproc, 0.0001);
    }

    #[test]
    fn vertical_filter() {
        let image = noise(37, 23);
        let kernel = [0.1, 0.2, 0.4, 0.2, 0.1];
        let filtered_ours = super::vertical_filter(&image, &kernel);
        let filtered_imageproc = imageproc::filter::vertical_filter(&image, &kernel);
        imageproc::assert_pixels_eq_within!(filtered_ours, filtered_imageproc, 0.0001);
    }

    #[test]
    fn pyr_down_sizes() {
        for &(w, h) in &[(640, 480), (641, 481), (1, 1), (3, 2)] {
            let half = GrayFloatImage::new(w, h).pyr_down();
            assert_eq!(half.width(), (w + 1) / 2);
            assert_eq!(half.height(), (h + 1) / 2);
        }
    }

    #[test]
    fn pyr_down_keeps_constant_images() {
        let mut image = GrayFloatImage::new(16, 9);
        for y in 0..9 {
            for x in 0..16 {
                image.put(x, y, 0.25);
            }
        }
        let half = image.pyr_down();
        assert!(half.iter().all(|&p| (p - 0.25).abs() < 1e-6));
    }

    #[test]
    fn sample_interpolates_and_clamps() {
        let mut image = GrayFloatImage::new(2, 2);
        image.put(1, 0, 1.0);
        image.put(1, 1, 1.0);
        assert!((image.sample(0.5, 0.5) - 0.5).abs() < 1e-6);
        assert!((image.sample(0.25, 0.0) - 0.25).abs() < 1e-6);
        assert_eq!(image.sample(-3.0, 0.0), 0.0);
        assert_eq!(image.sample(7.0, 7.0), 1.0);
    }

    #[test]
    fn from_dynamic_is_unit_range() {
        let rgb = image::RgbImage::from_fn(4, 4, |x, _| {
            if x < 2 {
                image::Rgb([0, 0, 0])
            } else {
                image::Rgb([255, 255, 255])
            }
        });
        let gray = GrayFloatImage::from_dynamic(&DynamicImage::ImageRgb8(rgb));
        assert_eq!(gray.width(), 4);
        assert!(gray.get(0, 0).abs() < 1e-6);
        assert!((gray.get(3, 3) - 1.0).abs() < 1e-3);
        assert_eq!(gray.ref_array2().dim(), (4, 4));
    }
}
