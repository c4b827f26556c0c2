use crate::yunet;
use anyhow::Result;
use image::{DynamicImage, GenericImageView, RgbImage};
use ndarray::{Array2, Array4};
use ort::{session::Session, value::Value};

/// YuNet input edge length.
pub const DETECTOR_INPUT: u32 = 640;
/// SFace input edge length.
pub const ENCODER_INPUT: u32 = 112;

/// Detection result from YuNet, in source image pixels
#[derive(Debug, Clone)]
pub struct Detection {
    pub bbox: [f32; 4], // x, y, w, h
    pub score: f32,
    pub landmarks: [f32; 10], // 5 points: x1,y1,x2,y2,...,x5,y5
}

/// L2-normalized SFace output, shape `[1, dim]`
#[derive(Debug, Clone)]
pub struct FaceEmbedding {
    pub vector: Array2<f32>,
}

impl FaceEmbedding {
    pub fn dim(&self) -> usize {
        self.vector.len()
    }

    pub fn to_vec(&self) -> Vec<f32> {
        self.vector.iter().copied().collect()
    }
}

/// Square padding applied before detection, used to map results back.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    offset_x: f32,
    offset_y: f32,
}

impl Letterbox {
    /// Map a normalized canvas coordinate back to source pixels.
    fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        let side = DETECTOR_INPUT as f32;
        (
            (x * side - self.offset_x) / self.scale,
            (y * side - self.offset_y) / self.scale,
        )
    }

    fn unmap_len(&self, len: f32) -> f32 {
        len * DETECTOR_INPUT as f32 / self.scale
    }
}

fn letterbox(img: &DynamicImage) -> (RgbImage, Letterbox) {
    let (width, height) = img.dimensions();
    let scale = DETECTOR_INPUT as f32 / width.max(height) as f32;
    let new_width = ((width as f32 * scale) as u32).max(1);
    let new_height = ((height as f32 * scale) as u32).max(1);

    let resized = img.resize_exact(new_width, new_height, image::imageops::FilterType::Triangle);

    let mut canvas = DynamicImage::new_rgb8(DETECTOR_INPUT, DETECTOR_INPUT);
    let offset_x = (DETECTOR_INPUT - new_width) / 2;
    let offset_y = (DETECTOR_INPUT - new_height) / 2;
    image::imageops::overlay(&mut canvas, &resized, offset_x as i64, offset_y as i64);

    (
        canvas.to_rgb8(),
        Letterbox {
            scale,
            offset_x: offset_x as f32,
            offset_y: offset_y as f32,
        },
    )
}

/// Planar BGR tensor `[1, 3, H, W]` with values in [0, 255], the layout both models expect.
fn bgr_tensor(img: &RgbImage) -> Result<Array4<f32>> {
    let (width, height) = img.dimensions();
    let plane = (width * height) as usize;
    let mut data = vec![0.0f32; 3 * plane];

    let (b, rest) = data.split_at_mut(plane);
    let (g, r) = rest.split_at_mut(plane);
    for (i, px) in img.pixels().enumerate() {
        r[i] = px[0] as f32;
        g[i] = px[1] as f32;
        b[i] = px[2] as f32;
    }

    Ok(Array4::from_shape_vec(
        (1, 3, height as usize, width as usize),
        data,
    )?)
}

/// Detect faces in an image using YuNet detector
pub fn detect_faces(
    session: &mut Session,
    img: &DynamicImage,
    score_threshold: f32,
    nms_threshold: f32,
) -> Result<Vec<Detection>> {
    let (canvas, boxed) = letterbox(img);
    let input_tensor = Value::from_array(bgr_tensor(&canvas)?)?;

    let outputs = session.run(ort::inputs![input_tensor])?;

    let mut tensors: Vec<(Vec<i64>, Vec<f32>)> = Vec::new();
    for (_name, output) in outputs.iter() {
        let (shape, data) = output.try_extract_tensor::<f32>()?;
        tensors.push((shape.iter().copied().collect(), data.to_vec()));
    }
    let tensor_refs: Vec<(&[i64], &[f32])> = tensors
        .iter()
        .map(|(s, d)| (s.as_slice(), d.as_slice()))
        .collect();

    let mut heads = yunet::parse_yunet_outputs(&tensor_refs, DETECTOR_INPUT as usize)?;
    yunet::apply_sigmoid_to_scores(&mut heads.scores);

    let raw = yunet::decode_detections(&heads, score_threshold, DETECTOR_INPUT as usize)?;

    let mut detections: Vec<Detection> = raw
        .into_iter()
        .map(|d| {
            let (x, y) = boxed.unmap(d.bbox[0], d.bbox[1]);
            let mut landmarks = [0.0f32; 10];
            for k in 0..5 {
                let (lx, ly) = boxed.unmap(d.landmarks[k * 2], d.landmarks[k * 2 + 1]);
                landmarks[k * 2] = lx;
                landmarks[k * 2 + 1] = ly;
            }
            Detection {
                bbox: [x, y, boxed.unmap_len(d.bbox[2]), boxed.unmap_len(d.bbox[3])],
                score: d.score,
                landmarks,
            }
        })
        .collect();

    if nms_threshold < 1.0 {
        detections = nms(&detections, nms_threshold);
    }
    log::debug!("detected {} face(s)", detections.len());

    Ok(detections)
}

/// Apply non-maximum suppression to remove overlapping detections
pub fn nms(detections: &[Detection], iou_threshold: f32) -> Vec<Detection> {
    let mut sorted = detections.to_vec();
    sorted.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut keep: Vec<Detection> = Vec::new();
    for candidate in sorted {
        if keep
            .iter()
            .all(|kept| compute_iou(&kept.bbox, &candidate.bbox) <= iou_threshold)
        {
            keep.push(candidate);
        }
    }
    keep
}

fn compute_iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = (a[0] + a[2]).min(b[0] + b[2]);
    let y2 = (a[1] + a[3]).min(b[1] + b[3]);

    if x2 <= x1 || y2 <= y1 {
        return 0.0;
    }

    let inter = (x2 - x1) * (y2 - y1);
    inter / (a[2] * a[3] + b[2] * b[3] - inter)
}

/// Rotate, scale and crop so the eyes land on the ArcFace reference positions.
pub fn align_face(img: &DynamicImage, detection: &Detection, size: u32) -> Result<DynamicImage> {
    // Reference eye centres for a 112x112 crop
    const REF_LEFT: (f32, f32) = (38.3, 51.7);
    const REF_RIGHT: (f32, f32) = (73.5, 51.5);

    let left = (detection.landmarks[0], detection.landmarks[1]);
    let right = (detection.landmarks[2], detection.landmarks[3]);
    let (dx, dy) = (right.0 - left.0, right.1 - left.1);
    let eye_dist = (dx * dx + dy * dy).sqrt();
    if eye_dist <= f32::EPSILON {
        anyhow::bail!("degenerate landmarks: eyes coincide");
    }

    let ref_dist = ((REF_RIGHT.0 - REF_LEFT.0).powi(2) + (REF_RIGHT.1 - REF_LEFT.1).powi(2)).sqrt();
    let unit = size as f32 / ENCODER_INPUT as f32;
    let scale = unit * ref_dist / eye_dist;
    let angle = dy.atan2(dx);

    let center = ((left.0 + right.0) / 2.0, (left.1 + right.1) / 2.0);
    let target = (
        (REF_LEFT.0 + REF_RIGHT.0) / 2.0 * unit,
        (REF_LEFT.1 + REF_RIGHT.1) / 2.0 * unit,
    );

    // Forward map: out = M * in + t, with M = scale * R(-angle)
    let (a, b) = (scale * angle.cos(), scale * angle.sin());
    let (c, d) = (-b, a);
    let tx = target.0 - (a * center.0 + b * center.1);
    let ty = target.1 - (c * center.0 + d * center.1);
    let det = a * d - b * c;

    let (img_w, img_h) = img.dimensions();
    let src = img.to_rgb8();
    let mut output = RgbImage::new(size, size);

    for (out_x, out_y, px) in output.enumerate_pixels_mut() {
        let px_x = out_x as f32 - tx;
        let px_y = out_y as f32 - ty;
        let in_x = (d * px_x - b * px_y) / det;
        let in_y = (-c * px_x + a * px_y) / det;

        // outside the source stays black
        if in_x < 0.0 || in_y < 0.0 || in_x >= img_w as f32 || in_y >= img_h as f32 {
            continue;
        }

        let x0 = in_x.floor() as u32;
        let y0 = in_y.floor() as u32;
        let x1 = (x0 + 1).min(img_w - 1);
        let y1 = (y0 + 1).min(img_h - 1);
        let fx = in_x - x0 as f32;
        let fy = in_y - y0 as f32;

        let weights = [
            ((x0, y0), (1.0 - fx) * (1.0 - fy)),
            ((x1, y0), fx * (1.0 - fy)),
            ((x0, y1), (1.0 - fx) * fy),
            ((x1, y1), fx * fy),
        ];
        let mut acc = [0.0f32; 3];
        for ((sx, sy), w) in weights {
            let p = src.get_pixel(sx, sy);
            for ch in 0..3 {
                acc[ch] += p[ch] as f32 * w;
            }
        }
        *px = image::Rgb([acc[0] as u8, acc[1] as u8, acc[2] as u8]);
    }

    Ok(DynamicImage::ImageRgb8(output))
}

/// Encode an aligned face crop to an L2-normalized embedding using SFace
pub fn encode_face(session: &mut Session, face_img: &DynamicImage) -> Result<FaceEmbedding> {
    let crop = face_img
        .resize_exact(
            ENCODER_INPUT,
            ENCODER_INPUT,
            image::imageops::FilterType::Triangle,
        )
        .to_rgb8();
    let input_tensor = Value::from_array(bgr_tensor(&crop)?)?;

    let outputs = session.run(ort::inputs![input_tensor])?;
    let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;

    // Expecting shape [1, 128]
    let dim = if shape.len() == 2 {
        shape[1] as usize
    } else {
        data.len()
    };
    let mut values: Vec<f32> = data[0..dim].to_vec();

    let norm: f32 = values.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        values.iter_mut().for_each(|x| *x /= norm);
    }

    Ok(FaceEmbedding {
        vector: Array2::from_shape_vec((1, dim), values)?,
    })
}
