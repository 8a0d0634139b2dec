/// Precompute a 1D Gaussian kernel of the given size.
///
/// `kernel_size` must be odd and >= 1. Sigma is derived as `kernel_size / 6.0`
/// (matching OpenCV's sigma=0 convention).
pub fn gaussian_kernel_1d(kernel_size: usize) -> Vec<f32> {
    debug_assert!(kernel_size >= 1 && kernel_size % 2 == 1);
    let sigma = kernel_size as f64 / 6.0;
    let half = (kernel_size / 2) as f64;
    let mut kernel_f64: Vec<f64> = (0..kernel_size)
        .map(|i| {
            let x = i as f64 - half;
            (-x * x / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f64 = kernel_f64.iter().sum();
    for v in &mut kernel_f64 {
        *v /= sum;
    }
    kernel_f64.iter().map(|&v| v as f32).collect()
}

/// Apply a separable Gaussian blur to interleaved 8-bit pixels using a
/// pre-computed kernel, reusing `temp`. Borders replicate the edge pixel.
pub fn separable_gaussian_blur_with_kernel(
    data: &mut [u8],
    width: usize,
    height: usize,
    channels: usize,
    kernel: &[f32],
    temp: &mut Vec<f32>,
) {
    let kernel_size = kernel.len();
    if kernel_size <= 1 || width == 0 || height == 0 {
        return;
    }
    let half = kernel_size / 2;

    temp.resize(width * height * channels, 0.0);

    // Horizontal pass: data → temp
    for y in 0..height {
        for x in 0..width {
            for c in 0..channels {
                let mut sum = 0.0f32;
                for (k, &w) in kernel.iter().enumerate() {
                    let sx = clamp_index(x, k, half, width);
                    sum += data[(y * width + sx) * channels + c] as f32 * w;
                }
                temp[(y * width + x) * channels + c] = sum;
            }
        }
    }

    // Vertical pass: temp → data
    for y in 0..height {
        for x in 0..width {
            for c in 0..channels {
                let mut sum = 0.0f32;
                for (k, &w) in kernel.iter().enumerate() {
                    let sy = clamp_index(y, k, half, height);
                    sum += temp[(sy * width + x) * channels + c] * w;
                }
                data[(y * width + x) * channels + c] = sum.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
}

/// Separable Gaussian blur of a single-channel float plane, in place.
pub fn blur_plane(plane: &mut [f32], width: usize, height: usize, kernel_size: usize) {
    if kernel_size <= 1 || width == 0 || height == 0 {
        return;
    }
    let kernel = gaussian_kernel_1d(kernel_size);
    let half = kernel_size / 2;
    let mut temp = vec![0.0f32; width * height];

    for y in 0..height {
        for x in 0..width {
            temp[y * width + x] = kernel
                .iter()
                .enumerate()
                .map(|(k, &w)| plane[y * width + clamp_index(x, k, half, width)] * w)
                .sum();
        }
    }
    for y in 0..height {
        for x in 0..width {
            plane[y * width + x] = kernel
                .iter()
                .enumerate()
                .map(|(k, &w)| temp[clamp_index(y, k, half, height) * width + x] * w)
                .sum();
        }
    }
}

fn clamp_index(pos: usize, k: usize, half: usize, len: usize) -> usize {
    (pos as isize + k as isize - half as isize).clamp(0, (len - 1) as isize) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blur_u8(data: &mut [u8], width: usize, height: usize, channels: usize, kernel_size: usize) {
        let kernel = gaussian_kernel_1d(kernel_size);
        let mut temp = Vec::new();
        separable_gaussian_blur_with_kernel(data, width, height, channels, &kernel, &mut temp);
    }

    #[test]
    fn test_kernel_sums_to_one() {
        let k = gaussian_kernel_1d(21);
        let sum: f32 = k.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_kernel_is_symmetric_with_peak_in_center() {
        let k = gaussian_kernel_1d(7);
        for i in 0..k.len() / 2 {
            assert!((k[i] - k[k.len() - 1 - i]).abs() < 1e-6);
            assert!(k[3] >= k[i]);
        }
    }

    #[test]
    fn test_blur_uniform_image_unchanged() {
        let mut data = vec![128u8; 10 * 10 * 3];
        blur_u8(&mut data, 10, 10, 3, 5);
        assert!(data.iter().all(|&v| (v as i32 - 128).abs() <= 1));
    }

    #[test]
    fn test_blur_spreads_single_bright_pixel() {
        let mut data = vec![0u8; 10 * 10 * 3];
        let cx = 5 * 10 + 5;
        data[cx * 3..cx * 3 + 3].copy_from_slice(&[255, 255, 255]);

        blur_u8(&mut data, 10, 10, 3, 5);

        assert!(data[cx * 3] < 255);
        assert!(data[(5 * 10 + 6) * 3] > 0);
    }

    #[test]
    fn test_kernel_size_1_is_identity() {
        let mut data = vec![42u8; 5 * 5 * 3];
        let original = data.clone();
        blur_u8(&mut data, 5, 5, 3, 1);
        assert_eq!(data, original);

        let mut plane = vec![0.25f32; 9];
        blur_plane(&mut plane, 3, 3, 1);
        assert_eq!(plane, vec![0.25f32; 9]);
    }

    #[test]
    fn test_blur_plane_softens_step_and_stays_in_range() {
        let mut plane: Vec<f32> = (0..8 * 8)
            .map(|i| if i % 8 < 4 { 1.0 } else { 0.0 })
            .collect();
        blur_plane(&mut plane, 8, 8, 3);
        assert!(plane.iter().all(|&v| (-1e-6..=1.0 + 1e-6).contains(&v)));
        assert!(plane[3] < 1.0 && plane[3] > 0.5);
        assert!(plane[4] > 0.0 && plane[4] < 0.5);
        assert!(plane[0] > 0.999);
    }
}
