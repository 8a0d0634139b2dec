/// Single-channel float image, row-major.
#[derive(Clone, Debug, PartialEq)]
pub struct LumaPlane {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
}

impl LumaPlane {
    pub fn new(width: u32, height: u32, data: Vec<f32>) -> Self {
        debug_assert_eq!(data.len(), width as usize * height as usize);
        Self {
            width,
            height,
            data,
        }
    }
}

/// Per-pixel displacement, `dx`/`dy` stored in separate planes.
#[derive(Clone, Debug, PartialEq)]
pub struct FlowField {
    pub width: u32,
    pub height: u32,
    pub dx: Vec<f32>,
    pub dy: Vec<f32>,
}

impl FlowField {
    pub fn zeros(width: u32, height: u32) -> Self {
        let n = width as usize * height as usize;
        Self {
            width,
            height,
            dx: vec![0.0; n],
            dy: vec![0.0; n],
        }
    }

    pub fn at(&self, x: u32, y: u32) -> (f32, f32) {
        let i = y as usize * self.width as usize + x as usize;
        (self.dx[i], self.dy[i])
    }
}

/// Dense optical flow between two luminance planes of equal size.
///
/// The returned field is backward flow: for every pixel `p` of `current`,
/// `current(p) ≈ previous(p + flow(p))`.
pub trait FlowEstimator: Send {
    fn estimate(
        &mut self,
        previous: &LumaPlane,
        current: &LumaPlane,
    ) -> Result<FlowField, Box<dyn std::error::Error>>;
}
