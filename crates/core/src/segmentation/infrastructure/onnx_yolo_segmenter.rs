/// YOLO instance segmentation using ONNX Runtime via `ort`.
///
/// Handles letterbox preprocessing, inference, person-class filtering, NMS
/// and prototype-mask assembly. Each kept instance becomes a binary
/// `RawMask` covering the letterboxed image area, never larger than the frame.
use std::path::Path;

use crate::segmentation::domain::person_segmenter::PersonSegmenter;
use crate::segmentation::domain::raw_mask::RawMask;
use crate::shared::constants::PERSON_CLASS_ID;
use crate::shared::frame::Frame;
use crate::shared::mask::Mask;

use super::execution_provider::preferred_execution_providers;

/// Fallback model input resolution when the model doesn't specify dimensions.
const DEFAULT_INPUT_SIZE: u32 = 640;

/// NMS IoU threshold.
const NMS_IOU_THRESH: f64 = 0.7;

/// Number of mask prototype coefficients per detection.
const NUM_MASK_COEFFS: usize = 32;

/// Box coordinates precede the class scores in every detection row.
const BOX_VALUES: usize = 4;

const MASK_THRESHOLD: f32 = 0.5;

/// YOLO-seg person segmenter backed by an ONNX Runtime session.
pub struct OnnxYoloSegmenter {
    session: ort::session::Session,
    input_size: u32,
}

impl OnnxYoloSegmenter {
    /// Load a YOLO-seg ONNX model and prepare for inference.
    ///
    /// The input resolution is read from the model's input shape (expecting NCHW).
    /// Falls back to 640 if the shape is dynamic or unreadable.
    pub fn new(model_path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let session = ort::session::Session::builder()?
            .with_execution_providers(preferred_execution_providers())?
            .commit_from_file(model_path)?;

        let input_size = session
            .inputs()
            .first()
            .and_then(|input| {
                if let ort::value::ValueType::Tensor { ref shape, .. } = input.dtype() {
                    if shape.len() >= 4 && shape[2] > 0 {
                        Some(shape[2] as u32)
                    } else {
                        None
                    }
                } else {
                    None
                }
            })
            .unwrap_or(DEFAULT_INPUT_SIZE);

        Ok(Self {
            session,
            input_size,
        })
    }
}

impl PersonSegmenter for OnnxYoloSegmenter {
    fn segment(
        &mut self,
        frame: &Frame,
        confidence: f32,
    ) -> Result<Vec<RawMask>, Box<dyn std::error::Error>> {
        let letterboxed = letterbox(frame, self.input_size);

        let input_value = ort::value::Tensor::from_array(letterboxed.tensor.clone())?;
        let outputs = self.session.run(ort::inputs![input_value])?;
        if outputs.len() < 2 {
            return Err("YOLO-seg model must produce detections and mask prototypes".into());
        }

        let det_tensor = outputs[0].try_extract_array::<f32>()?;
        let det_shape = det_tensor.shape().to_vec();
        let det_data = det_tensor.as_slice().ok_or("Cannot get detection tensor slice")?;
        let candidates = parse_detections(det_data, &det_shape, confidence as f64)?;
        let kept = nms(candidates, NMS_IOU_THRESH);
        if kept.is_empty() {
            return Ok(Vec::new());
        }

        let proto_tensor = outputs[1].try_extract_array::<f32>()?;
        let proto_shape = proto_tensor.shape().to_vec();
        if proto_shape.len() != 4 || proto_shape[1] != NUM_MASK_COEFFS {
            return Err(format!("Unexpected prototype shape: {proto_shape:?}").into());
        }
        let protos = Prototypes {
            data: proto_tensor
                .as_slice()
                .ok_or("Cannot get prototype tensor slice")?,
            height: proto_shape[2],
            width: proto_shape[3],
        };

        Ok(kept
            .iter()
            .map(|det| {
                RawMask::new(
                    assemble_mask(det, &protos, &letterboxed, self.input_size, frame),
                    det.confidence as f32,
                )
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Preprocessing
// ---------------------------------------------------------------------------

struct Letterboxed {
    tensor: ndarray::Array4<f32>,
    new_w: u32,
    new_h: u32,
    pad_x: u32,
    pad_y: u32,
}

/// Letterbox-resize a frame to `target_size` × `target_size` (NCHW float32).
fn letterbox(frame: &Frame, target_size: u32) -> Letterboxed {
    let fw = frame.width() as f64;
    let fh = frame.height() as f64;
    let target = target_size as f64;

    let scale = (target / fw).min(target / fh);
    let new_w = ((fw * scale).round() as u32).clamp(1, target_size);
    let new_h = ((fh * scale).round() as u32).clamp(1, target_size);
    let pad_x = (target_size - new_w) / 2;
    let pad_y = (target_size - new_h) / 2;

    // Padded with 114/255 gray, YOLO convention
    let gray = 114.0f32 / 255.0;
    let mut tensor =
        ndarray::Array4::<f32>::from_elem((1, 3, target_size as usize, target_size as usize), gray);

    let src = frame.as_ndarray();
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;

    for y in 0..new_h as usize {
        let src_y = ((y as f64 / scale) as usize).min(src_h - 1);
        for x in 0..new_w as usize {
            let src_x = ((x as f64 / scale) as usize).min(src_w - 1);
            let ty = pad_y as usize + y;
            let tx = pad_x as usize + x;
            for c in 0..3 {
                tensor[[0, c, ty, tx]] = src[[src_y, src_x, c]] as f32 / 255.0;
            }
        }
    }

    Letterboxed {
        tensor,
        new_w,
        new_h,
        pad_x,
        pad_y,
    }
}

// ---------------------------------------------------------------------------
// Postprocessing
// ---------------------------------------------------------------------------

/// Person detection in letterbox pixel coordinates.
#[derive(Clone, Debug)]
struct Candidate {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
    confidence: f64,
    coeffs: Vec<f32>,
}

/// Reads `[1, 4 + classes + 32, N]` (or its transpose) and keeps rows whose
/// person score reaches `confidence`.
fn parse_detections(
    data: &[f32],
    shape: &[usize],
    confidence: f64,
) -> Result<Vec<Candidate>, Box<dyn std::error::Error>> {
    if shape.len() != 3 {
        return Err(format!("Unexpected YOLO-seg output shape: {shape:?}").into());
    }
    // More anchors than features: the usual [1, features, anchors] layout.
    let transposed = shape[1] < shape[2];
    let (num_dets, num_feats) = if transposed {
        (shape[2], shape[1])
    } else {
        (shape[1], shape[2])
    };
    if num_feats <= BOX_VALUES + NUM_MASK_COEFFS {
        return Err(format!("YOLO-seg output has no class scores: {shape:?}").into());
    }
    let coeff_offset = num_feats - NUM_MASK_COEFFS;
    let value = |det: usize, feat: usize| -> f32 {
        if transposed {
            data[feat * num_dets + det]
        } else {
            data[det * num_feats + feat]
        }
    };

    let mut candidates = Vec::new();
    for i in 0..num_dets {
        let score = value(i, BOX_VALUES + PERSON_CLASS_ID) as f64;
        if score < confidence {
            continue;
        }
        let cx = value(i, 0) as f64;
        let cy = value(i, 1) as f64;
        let w = value(i, 2) as f64;
        let h = value(i, 3) as f64;
        candidates.push(Candidate {
            x1: cx - w / 2.0,
            y1: cy - h / 2.0,
            x2: cx + w / 2.0,
            y2: cy + h / 2.0,
            confidence: score,
            coeffs: (0..NUM_MASK_COEFFS).map(|k| value(i, coeff_offset + k)).collect(),
        });
    }
    Ok(candidates)
}

/// Greedy NMS: sort by confidence descending, suppress overlapping boxes.
fn nms(mut dets: Vec<Candidate>, iou_thresh: f64) -> Vec<Candidate> {
    dets.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<Candidate> = Vec::new();
    for det in dets {
        let overlaps = keep.iter().any(|k| {
            bbox_iou(&[k.x1, k.y1, k.x2, k.y2], &[det.x1, det.y1, det.x2, det.y2]) > iou_thresh
        });
        if !overlaps {
            keep.push(det);
        }
    }
    keep
}

fn bbox_iou(a: &[f64; 4], b: &[f64; 4]) -> f64 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter == 0.0 {
        return 0.0;
    }
    let area_a = (a[2] - a[0]) * (a[3] - a[1]);
    let area_b = (b[2] - b[0]) * (b[3] - b[1]);
    inter / (area_a + area_b - inter)
}

struct Prototypes<'a> {
    data: &'a [f32],
    height: usize,
    width: usize,
}

impl Prototypes<'_> {
    /// `sigmoid(coeffs · protos)` over the whole prototype grid.
    fn combine(&self, coeffs: &[f32]) -> Mask {
        let plane = self.height * self.width;
        let mut logits = vec![0.0f32; plane];
        for (k, &c) in coeffs.iter().enumerate() {
            let proto = &self.data[k * plane..(k + 1) * plane];
            for (l, &p) in logits.iter_mut().zip(proto) {
                *l += c * p;
            }
        }
        Mask::from_vec(
            self.width as u32,
            self.height as u32,
            logits.into_iter().map(sigmoid).collect(),
        )
    }
}

/// Binary instance mask over the un-padded image area, cropped to the box.
fn assemble_mask(
    det: &Candidate,
    protos: &Prototypes<'_>,
    lb: &Letterboxed,
    input_size: u32,
    frame: &Frame,
) -> Mask {
    let proto_mask = protos.combine(&det.coeffs);
    let proto_scale = protos.width as f32 / input_size as f32;

    let out_w = lb.new_w.min(frame.width());
    let out_h = lb.new_h.min(frame.height());
    let step_x = lb.new_w as f32 / out_w as f32;
    let step_y = lb.new_h as f32 / out_h as f32;

    Mask::from_fn(out_w, out_h, |ox, oy| {
        // Output pixel centre in letterbox coordinates.
        let lx = lb.pad_x as f32 + (ox as f32 + 0.5) * step_x;
        let ly = lb.pad_y as f32 + (oy as f32 + 0.5) * step_y;
        let inside = (lx as f64) >= det.x1
            && (lx as f64) < det.x2
            && (ly as f64) >= det.y1
            && (ly as f64) < det.y2;
        if !inside {
            return 0.0;
        }
        let px = (lx * proto_scale - 0.5).clamp(0.0, (protos.width - 1) as f32);
        let py = (ly * proto_scale - 0.5).clamp(0.0, (protos.height - 1) as f32);
        if proto_mask.sample_bilinear(px, py) > MASK_THRESHOLD {
            1.0
        } else {
            0.0
        }
    })
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
