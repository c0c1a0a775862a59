use anyhow::{Context, Result, anyhow};
use fast_image_resize as fir;
use ndarray::Array4;
use rayon::prelude::*;

use crate::types::{Frame, LandmarkGroup, LandmarkPoint};

pub const HAND_INPUT_SIZE: u32 = 224;
pub const PALM_INPUT_SIZE: u32 = 192;
pub const POSE_INPUT_SIZE: u32 = 256;

/// Maps a point from model input pixels back to `[0, 1]` of the source
/// frame. Depth is scaled like x.
pub trait SourceProjection {
    fn normalize(&self, x: f32, y: f32, z: f32) -> (f32, f32, f32);
}

#[derive(Clone, Debug)]
pub struct LetterboxInfo {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub orig_w: u32,
    pub orig_h: u32,
}

impl LetterboxInfo {
    /// Model input pixels to source frame pixels.
    pub fn unpad(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

impl SourceProjection for LetterboxInfo {
    fn normalize(&self, x: f32, y: f32, z: f32) -> (f32, f32, f32) {
        let (px, py) = self.unpad(x, y);
        let w = self.orig_w.max(1) as f32;
        let h = self.orig_h.max(1) as f32;
        (px / w, py / h, z / self.scale / w)
    }
}

/// A square, rotated window of the source frame resampled to
/// `output_size` pixels. `angle` turns crop axes into frame axes.
#[derive(Clone, Debug)]
pub struct CropTransform {
    pub center: (f32, f32),
    pub side: f32,
    pub angle: f32,
    pub output_size: u32,
    pub orig_w: u32,
    pub orig_h: u32,
}

impl CropTransform {
    fn pixels_per_unit(&self) -> f32 {
        self.side / self.output_size as f32
    }

    /// Crop pixels to source frame pixels.
    pub fn to_frame(&self, x: f32, y: f32) -> (f32, f32) {
        let half = self.output_size as f32 / 2.0;
        let dx = (x - half) * self.pixels_per_unit();
        let dy = (y - half) * self.pixels_per_unit();
        let (sin, cos) = self.angle.sin_cos();
        (
            self.center.0 + dx * cos - dy * sin,
            self.center.1 + dx * sin + dy * cos,
        )
    }
}

impl SourceProjection for CropTransform {
    fn normalize(&self, x: f32, y: f32, z: f32) -> (f32, f32, f32) {
        let (px, py) = self.to_frame(x, y);
        let w = self.orig_w.max(1) as f32;
        let h = self.orig_h.max(1) as f32;
        (px / w, py / h, z * self.pixels_per_unit() / w)
    }
}

/// Letterboxes the frame into a `target_size` square and converts it to a
/// `(1, H, W, 3)` tensor in `[0, 1]`.
pub fn prepare_frame_with_size(
    frame: &Frame,
    target_size: u32,
) -> Result<(Array4<f32>, LetterboxInfo)> {
    check_frame(frame)?;

    let scale = target_size as f32 / (frame.width.max(frame.height) as f32);
    let new_w = ((frame.width as f32 * scale).round().max(1.0) as u32).min(target_size);
    let new_h = ((frame.height as f32 * scale).round().max(1.0) as u32).min(target_size);

    let src_image = fir::images::Image::from_vec_u8(
        frame.width,
        frame.height,
        frame.rgba.clone(),
        fir::PixelType::U8x4,
    )?;
    let mut dst_image = fir::images::Image::new(new_w, new_h, fir::PixelType::U8x4);
    let mut resizer = fir::Resizer::new();
    let resize_options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Interpolation(fir::FilterType::Bilinear));
    resizer
        .resize(&src_image, &mut dst_image, Some(&resize_options))
        .context("fast resize failed")?;
    let resized = dst_image.into_vec();

    let pad_x = ((target_size - new_w) / 2) as usize;
    let pad_y = ((target_size - new_h) / 2) as usize;
    let mut canvas = vec![0u8; (target_size as usize) * (target_size as usize) * 4];
    let dst_stride = target_size as usize * 4;
    let src_stride = new_w as usize * 4;
    for row in 0..(new_h as usize) {
        let dst_offset = (pad_y + row) * dst_stride + pad_x * 4;
        let src_offset = row * src_stride;
        canvas[dst_offset..dst_offset + src_stride]
            .copy_from_slice(&resized[src_offset..src_offset + src_stride]);
    }

    let normalized: Vec<f32> = canvas
        .par_chunks_exact(4)
        .flat_map_iter(|px| {
            [
                px[0] as f32 / 255.0,
                px[1] as f32 / 255.0,
                px[2] as f32 / 255.0,
            ]
        })
        .collect();
    let input = Array4::<f32>::from_shape_vec(
        (1, target_size as usize, target_size as usize, 3),
        normalized,
    )
    .map_err(|err| anyhow!("failed to build input tensor: {err}"))?;

    let letterbox = LetterboxInfo {
        scale,
        pad_x: pad_x as f32,
        pad_y: pad_y as f32,
        orig_w: frame.width,
        orig_h: frame.height,
    };

    Ok((input, letterbox))
}

/// Samples the rotated square described by `center`, `side` and `angle` into
/// a `(1, S, S, 3)` tensor. Pixels outside the frame are black.
pub fn prepare_rotated_crop(
    frame: &Frame,
    center: (f32, f32),
    side: f32,
    angle: f32,
    output_size: u32,
) -> Result<(Array4<f32>, CropTransform)> {
    check_frame(frame)?;

    let transform = CropTransform {
        center,
        side,
        angle,
        output_size,
        orig_w: frame.width,
        orig_h: frame.height,
    };

    let size = output_size as usize;
    let mut data = vec![0.0f32; size * size * 3];
    data.par_chunks_mut(size * 3).enumerate().for_each(|(y, row)| {
        for (x, px) in row.chunks_exact_mut(3).enumerate() {
            let (sx, sy) = transform.to_frame(x as f32 + 0.5, y as f32 + 0.5);
            px.copy_from_slice(&sample_bilinear(frame, sx - 0.5, sy - 0.5));
        }
    });

    let input = Array4::<f32>::from_shape_vec((1, size, size, 3), data)
        .map_err(|err| anyhow!("failed to build crop tensor: {err}"))?;
    Ok((input, transform))
}

fn check_frame(frame: &Frame) -> Result<()> {
    let expected_len = (frame.width as usize)
        .saturating_mul(frame.height as usize)
        .saturating_mul(4);
    if frame.rgba.len() != expected_len || expected_len == 0 {
        return Err(anyhow!(
            "frame buffer size mismatch: got {}, expected {}",
            frame.rgba.len(),
            expected_len
        ));
    }
    Ok(())
}

fn sample_bilinear(frame: &Frame, x: f32, y: f32) -> [f32; 3] {
    if !x.is_finite() || !y.is_finite() {
        return [0.0; 3];
    }
    let texel = |ix: i64, iy: i64| -> [f32; 3] {
        if ix < 0 || iy < 0 || ix >= frame.width as i64 || iy >= frame.height as i64 {
            return [0.0; 3];
        }
        let idx = (iy as usize * frame.width as usize + ix as usize) * 4;
        [
            frame.rgba[idx] as f32 / 255.0,
            frame.rgba[idx + 1] as f32 / 255.0,
            frame.rgba[idx + 2] as f32 / 255.0,
        ]
    };

    let (x0, y0) = (x.floor(), y.floor());
    let (fx, fy) = (x - x0, y - y0);
    let (ix, iy) = (x0 as i64, y0 as i64);
    let (c00, c10, c01, c11) = (
        texel(ix, iy),
        texel(ix + 1, iy),
        texel(ix, iy + 1),
        texel(ix + 1, iy + 1),
    );

    let mut out = [0.0; 3];
    for ch in 0..3 {
        let top = c00[ch] + (c10[ch] - c00[ch]) * fx;
        let bottom = c01[ch] + (c11[ch] - c01[ch]) * fx;
        out[ch] = top + (bottom - top) * fy;
    }
    out
}

/// A hand found in one palm region.
#[derive(Clone, Debug)]
pub struct HandDetection {
    pub landmarks: LandmarkGroup,
    /// Model score for "right hand"; below 0.5 reads as left.
    pub handedness: f32,
    pub confidence: f32,
}

/// Puts detections into `(left, right)` slots, most confident first. A hand
/// whose preferred slot is taken goes to the other one if it is free.
pub fn assign_hands(
    mut detections: Vec<HandDetection>,
) -> (Option<LandmarkGroup>, Option<LandmarkGroup>) {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let (mut left, mut right) = (None, None);
    for hand in detections {
        let (preferred, other) = if hand.handedness >= 0.5 {
            (&mut right, &mut left)
        } else {
            (&mut left, &mut right)
        };
        if preferred.is_none() {
            *preferred = Some(hand.landmarks);
        } else if other.is_none() {
            *other = Some(hand.landmarks);
        }
    }
    (left, right)
}

/// Reads `count` points of `stride` floats each (x, y, z first). When
/// `visibility_at` is set, that slot is a logit and becomes the point's
/// visibility.
pub fn decode_points(
    flat: &[f32],
    count: usize,
    stride: usize,
    visibility_at: Option<usize>,
    projection: &impl SourceProjection,
) -> Result<Vec<LandmarkPoint>> {
    if stride < 3 || flat.len() < count * stride {
        return Err(anyhow!(
            "unexpected landmarks length: got {}, need {}",
            flat.len(),
            count * stride
        ));
    }

    Ok(flat
        .chunks_exact(stride)
        .take(count)
        .map(|chunk| {
            let (x, y, z) = projection.normalize(chunk[0], chunk[1], chunk[2]);
            let point = LandmarkPoint::new(x, y, z);
            match visibility_at.and_then(|idx| chunk.get(idx)) {
                Some(raw) => point.with_visibility(sigmoid(*raw)),
                None => point,
            }
        })
        .collect())
}

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
