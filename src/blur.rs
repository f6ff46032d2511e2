//! Frequency-domain Gaussian blur.
//!
//! The blur is a circular 2-D convolution computed as the pointwise product
//! of two 2-D FFTs followed by an inverse FFT. The kernel is wrapped so that
//! its centre sits at the origin, which keeps the blurred image aligned with
//! the input. The kernel spectrum depends only on the frame size, so
//! [`FrequencyBlur`] computes it once and reuses it for every frame.

use std::ops::RangeInclusive;
use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::error::StillcutError;

/// A normalized `size × size` Gaussian kernel.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianKernel {
    size: usize,
    sigma: f64,
    weights: Vec<f32>,
}

impl GaussianKernel {
    /// Sample a Gaussian with standard deviation `sigma` on the offsets
    /// `⌊-size/2⌋+1 ..= ⌊size/2⌋` in both axes and normalize it to sum to 1.
    ///
    /// # Errors
    ///
    /// Returns [`StillcutError::InvalidParameter`] if `size` is zero or
    /// `sigma` is not a positive finite number.
    pub fn new(size: usize, sigma: f64) -> Result<Self, StillcutError> {
        if size == 0 {
            return Err(StillcutError::invalid("kernel_size", "must be at least 1"));
        }
        if !sigma.is_finite() || sigma <= 0.0 {
            return Err(StillcutError::invalid(
                "sigma",
                format!("must be positive, got {sigma}"),
            ));
        }

        let offsets = Self::offsets_for(size);
        let two_sigma_sq = 2.0 * sigma * sigma;
        let raw: Vec<f64> = offsets
            .clone()
            .flat_map(|dy| {
                offsets.clone().map(move |dx| {
                    let distance_sq = (dx * dx + dy * dy) as f64;
                    (-distance_sq / two_sigma_sq).exp()
                })
            })
            .collect();
        let sum: f64 = raw.iter().sum();
        let weights = raw.iter().map(|w| (w / sum) as f32).collect();

        Ok(Self {
            size,
            sigma,
            weights,
        })
    }

    fn offsets_for(size: usize) -> RangeInclusive<isize> {
        let half = size as f64 / 2.0;
        ((-half).floor() as isize + 1)..=(half.floor() as isize)
    }

    /// Side length of the kernel.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Standard deviation the kernel was sampled with.
    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    /// Offsets covered along each axis, relative to the kernel centre.
    pub fn offsets(&self) -> RangeInclusive<isize> {
        Self::offsets_for(self.size)
    }

    /// Row-major weights; `weights()[row * size + col]`.
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }
}

/// A Gaussian blur bound to one frame size, with its kernel spectrum
/// precomputed.
///
/// `FrequencyBlur` is `Send + Sync`; [`apply`](FrequencyBlur::apply) only
/// reads shared state, so one instance can blur many frames in parallel.
pub struct FrequencyBlur {
    width: usize,
    height: usize,
    identity: bool,
    row_forward: Arc<dyn Fft<f32>>,
    row_inverse: Arc<dyn Fft<f32>>,
    column_forward: Arc<dyn Fft<f32>>,
    column_inverse: Arc<dyn Fft<f32>>,
    /// Kernel spectrum in column-major (transposed) layout.
    spectrum: Vec<Complex<f32>>,
}

impl std::fmt::Debug for FrequencyBlur {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrequencyBlur")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("identity", &self.identity)
            .finish()
    }
}

impl FrequencyBlur {
    /// Prepare a blur of `width × height` frames with `kernel`.
    pub fn new(kernel: &GaussianKernel, width: u32, height: u32) -> Self {
        let (width, height) = (width as usize, height as usize);
        let mut planner = FftPlanner::<f32>::new();
        let mut blur = Self {
            width,
            height,
            identity: kernel.size() == 1,
            row_forward: planner.plan_fft_forward(width),
            row_inverse: planner.plan_fft_inverse(width),
            column_forward: planner.plan_fft_forward(height),
            column_inverse: planner.plan_fft_inverse(height),
            spectrum: Vec::new(),
        };

        if !blur.identity {
            let mut padded = vec![Complex::new(0.0, 0.0); width * height];
            let offsets = kernel.offsets();
            let start = *offsets.start();
            for dy in offsets.clone() {
                for dx in offsets.clone() {
                    let row = dy.rem_euclid(height as isize) as usize;
                    let col = dx.rem_euclid(width as isize) as usize;
                    let weight = kernel.weights()
                        [(dy - start) as usize * kernel.size() + (dx - start) as usize];
                    padded[row * width + col].re += weight;
                }
            }
            blur.spectrum = blur.forward(padded);
        }

        log::debug!(
            "Prepared {width}x{height} blur (kernel {}, sigma {})",
            kernel.size(),
            kernel.sigma()
        );
        blur
    }

    /// Blur one luminance plane (row-major, `width × height` values).
    pub fn apply(&self, plane: &[f32]) -> Vec<f32> {
        debug_assert_eq!(plane.len(), self.width * self.height);
        if self.identity {
            return plane.to_vec();
        }

        let buffer = plane.iter().map(|&v| Complex::new(v, 0.0)).collect();
        let mut product = self.forward(buffer);
        for (value, weight) in product.iter_mut().zip(&self.spectrum) {
            *value *= *weight;
        }

        self.column_inverse.process(&mut product);
        let mut rows = transpose(&product, self.height, self.width);
        self.row_inverse.process(&mut rows);

        let scale = 1.0 / (self.width * self.height) as f32;
        rows.iter().map(|value| value.re * scale).collect()
    }

    /// Forward 2-D FFT of a row-major buffer; the result is column-major.
    fn forward(&self, mut buffer: Vec<Complex<f32>>) -> Vec<Complex<f32>> {
        self.row_forward.process(&mut buffer);
        let mut columns = transpose(&buffer, self.width, self.height);
        self.column_forward.process(&mut columns);
        columns
    }
}

/// Transpose a row-major `rows × cols` matrix into a row-major `cols × rows`
/// one.
fn transpose(data: &[Complex<f32>], cols: usize, rows: usize) -> Vec<Complex<f32>> {
    let mut out = vec![Complex::new(0.0, 0.0); data.len()];
    for row in 0..rows {
        for col in 0..cols {
            out[col * rows + row] = data[row * cols + col];
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn direct_circular(
        kernel: &GaussianKernel,
        plane: &[f32],
        width: usize,
        height: usize,
    ) -> Vec<f32> {
        let offsets = kernel.offsets();
        let start = *offsets.start();
        let mut out = vec![0.0f32; plane.len()];
        for y in 0..height {
            for x in 0..width {
                let mut acc = 0.0f32;
                for dy in offsets.clone() {
                    for dx in offsets.clone() {
                        let sy = (y as isize - dy).rem_euclid(height as isize) as usize;
                        let sx = (x as isize - dx).rem_euclid(width as isize) as usize;
                        let weight = kernel.weights()
                            [(dy - start) as usize * kernel.size() + (dx - start) as usize];
                        acc += weight * plane[sy * width + sx];
                    }
                }
                out[y * width + x] = acc;
            }
        }
        out
    }

    #[test]
    fn kernel_is_normalized() {
        for (size, sigma) in [(1, 1.0), (7, 3.0), (15, 7.0), (4, 1.5)] {
            let kernel = GaussianKernel::new(size, sigma).unwrap();
            let sum: f32 = kernel.weights().iter().sum();
            assert!((sum - 1.0).abs() < 1e-5, "size {size} sums to {sum}");
        }
    }

    #[test]
    fn kernel_offsets_follow_floor_convention() {
        assert_eq!(GaussianKernel::new(7, 3.0).unwrap().offsets(), -3..=3);
        assert_eq!(GaussianKernel::new(4, 1.0).unwrap().offsets(), -1..=2);
        assert_eq!(GaussianKernel::new(1, 1.0).unwrap().offsets(), 0..=0);
    }

    #[test]
    fn rejects_bad_parameters() {
        assert!(GaussianKernel::new(0, 1.0).is_err());
        assert!(GaussianKernel::new(3, 0.0).is_err());
        assert!(GaussianKernel::new(3, f64::NAN).is_err());
    }

    #[test]
    fn uniform_plane_is_unchanged() {
        let kernel = GaussianKernel::new(7, 3.0).unwrap();
        let blur = FrequencyBlur::new(&kernel, 16, 12);
        let plane = vec![80.0f32; 16 * 12];
        for value in blur.apply(&plane) {
            assert!((value - 80.0).abs() < 1e-2, "got {value}");
        }
    }

    #[test]
    fn matches_direct_circular_convolution() {
        let (width, height) = (6, 5);
        let kernel = GaussianKernel::new(3, 1.0).unwrap();
        let blur = FrequencyBlur::new(&kernel, width as u32, height as u32);
        let plane: Vec<f32> = (0..width * height).map(|i| ((i * 37) % 255) as f32).collect();

        let expected = direct_circular(&kernel, &plane, width, height);
        let actual = blur.apply(&plane);
        for (a, e) in actual.iter().zip(&expected) {
            assert!((a - e).abs() < 1e-2, "{a} != {e}");
        }
    }

    #[test]
    fn size_one_kernel_is_identity() {
        let kernel = GaussianKernel::new(1, 2.0).unwrap();
        let blur = FrequencyBlur::new(&kernel, 3, 2);
        let plane = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        assert_eq!(blur.apply(&plane), plane);
    }
}
