use ndarray::{ArrayView3, ArrayViewMut3};

/// BT.601 luma weights, in RGB order.
pub const LUMA_WEIGHTS: [f32; 3] = [0.299, 0.587, 0.114];

/// A single decoded video frame: contiguous RGB bytes in row-major order.
///
/// Frames are only held for the duration of one pipeline iteration. Format
/// conversion happens at the I/O boundary; everything downstream assumes
/// three 8-bit channels.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    index: usize,
}

impl Frame {
    pub const CHANNELS: usize = 3;

    pub fn new(data: Vec<u8>, width: u32, height: u32, index: usize) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * Self::CHANNELS,
            "data length must equal width * height * 3"
        );
        Self {
            data,
            width,
            height,
            index,
        }
    }

    /// Builds a frame by evaluating `f(x, y)` for every pixel.
    pub fn from_fn(width: u32, height: u32, index: usize, f: impl Fn(u32, u32) -> [u8; 3]) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize * Self::CHANNELS);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&f(x, y));
            }
        }
        Self::new(data, width, height, index)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let i = (y as usize * self.width as usize + x as usize) * Self::CHANNELS;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    /// Luminance plane in `[0, 255]`, one value per pixel.
    pub fn luminance(&self) -> Vec<f32> {
        self.data
            .chunks_exact(Self::CHANNELS)
            .map(|px| {
                px[0] as f32 * LUMA_WEIGHTS[0]
                    + px[1] as f32 * LUMA_WEIGHTS[1]
                    + px[2] as f32 * LUMA_WEIGHTS[2]
            })
            .collect()
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), &self.data)
            .expect("Frame data length must match dimensions")
    }

    pub fn as_ndarray_mut(&mut self) -> ArrayViewMut3<'_, u8> {
        let shape = self.shape();
        ArrayViewMut3::from_shape(shape, &mut self.data)
            .expect("Frame data length must match dimensions")
    }

    fn shape(&self) -> (usize, usize, usize) {
        (self.height as usize, self.width as usize, Self::CHANNELS)
    }
}
