//! YuNet detector post-processing.
//!
//! YuNet is anchor-free: every grid cell of each stride (8, 16, 32) predicts
//! a class score, an objectness score, box deltas `(dx, dy, dw, dh)` and five
//! landmark offsets. A cell `(i, j)` decodes as
//!
//! ```text
//! cx = (j + dx) * stride / input_size
//! cy = (i + dy) * stride / input_size
//! w  = dw * stride / input_size
//! h  = dh * stride / input_size
//! ```

use anyhow::{Context, Result};
use ndarray::{Array2, ArrayView2};

const STRIDES: [usize; 3] = [8, 16, 32];

/// Per-stride output heads, indexed like `STRIDES`.
#[derive(Debug, Clone)]
pub struct YunetHeads {
    /// cls * obj, shape `[cells, 1]`
    pub scores: Vec<Array2<f32>>,
    /// shape `[cells, 4]`
    pub boxes: Vec<Array2<f32>>,
    /// shape `[cells, 10]`
    pub landmarks: Vec<Array2<f32>>,
}

#[derive(Debug, Clone)]
pub struct RawDetection {
    pub bbox: [f32; 4], // x, y, w, h (normalized [0,1])
    pub score: f32,
    pub landmarks: [f32; 10], // normalized [0,1]
}

fn grid_cells(input_size: usize, stride: usize) -> usize {
    (input_size / stride) * (input_size / stride)
}

/// Pull one `[1, cells, width]` output tensor into a `[cells, width]` array.
fn take_head(
    outputs: &[(&[i64], &[f32])],
    index: usize,
    width: usize,
    cells: usize,
) -> Result<Array2<f32>> {
    let (shape, data) = outputs
        .get(index)
        .with_context(|| format!("missing YuNet output {}", index))?;

    let expected = [1, cells as i64, width as i64];
    if shape[..] != expected[..] {
        anyhow::bail!(
            "unexpected shape for YuNet output {}: {:?}, expected {:?}",
            index,
            shape,
            expected
        );
    }
    Ok(Array2::from_shape_vec((cells, width), data.to_vec())?)
}

/// Split the 12 YuNet outputs into score, box and landmark heads.
///
/// Output order: cls_8, cls_16, cls_32, obj_8, obj_16, obj_32,
/// bbox_8, bbox_16, bbox_32, kps_8, kps_16, kps_32
pub fn parse_yunet_outputs(outputs: &[(&[i64], &[f32])], input_size: usize) -> Result<YunetHeads> {
    let mut heads = YunetHeads {
        scores: Vec::with_capacity(STRIDES.len()),
        boxes: Vec::with_capacity(STRIDES.len()),
        landmarks: Vec::with_capacity(STRIDES.len()),
    };

    for (s, &stride) in STRIDES.iter().enumerate() {
        let cells = grid_cells(input_size, stride);
        let cls = take_head(outputs, s, 1, cells)?;
        let obj = take_head(outputs, s + 3, 1, cells)?;
        heads.scores.push(cls * obj);
        heads.boxes.push(take_head(outputs, s + 6, 4, cells)?);
        heads.landmarks.push(take_head(outputs, s + 9, 10, cells)?);
    }

    Ok(heads)
}

fn decode_cell(
    boxes: &ArrayView2<f32>,
    landmarks: &ArrayView2<f32>,
    idx: usize,
    (i, j): (usize, usize),
    stride: f32,
    input_size: f32,
) -> ([f32; 4], [f32; 10]) {
    let to_norm = |grid: usize, delta: f32| (grid as f32 + delta) * stride / input_size;

    let cx = to_norm(j, boxes[[idx, 0]]);
    let cy = to_norm(i, boxes[[idx, 1]]);
    let w = boxes[[idx, 2]] * stride / input_size;
    let h = boxes[[idx, 3]] * stride / input_size;

    let mut lms = [0.0f32; 10];
    for k in 0..5 {
        lms[k * 2] = to_norm(j, landmarks[[idx, k * 2]]);
        lms[k * 2 + 1] = to_norm(i, landmarks[[idx, k * 2 + 1]]);
    }

    ([cx - w / 2.0, cy - h / 2.0, w, h], lms)
}

/// Decode every cell whose score reaches `score_threshold`.
pub fn decode_detections(
    heads: &YunetHeads,
    score_threshold: f32,
    input_size: usize,
) -> Result<Vec<RawDetection>> {
    let mut detections = Vec::new();

    for (s, &stride) in STRIDES.iter().enumerate() {
        let (scores, boxes, landmarks) = match (
            heads.scores.get(s),
            heads.boxes.get(s),
            heads.landmarks.get(s),
        ) {
            (Some(a), Some(b), Some(c)) => (a, b.view(), c.view()),
            _ => anyhow::bail!("missing YuNet heads for stride {}", stride),
        };

        let side = input_size / stride;
        if scores.nrows() != side * side {
            anyhow::bail!(
                "expected {} cells for stride {}, got {}",
                side * side,
                stride,
                scores.nrows()
            );
        }

        for (idx, &score) in scores.column(0).iter().enumerate() {
            if score < score_threshold {
                continue;
            }
            let (bbox, landmarks) = decode_cell(
                &boxes,
                &landmarks,
                idx,
                (idx / side, idx % side),
                stride as f32,
                input_size as f32,
            );
            detections.push(RawDetection {
                bbox,
                score,
                landmarks,
            });
        }
    }

    Ok(detections)
}

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

pub fn apply_sigmoid_to_scores(scores: &mut [Array2<f32>]) {
    for score_map in scores {
        score_map.mapv_inplace(sigmoid);
    }
}
