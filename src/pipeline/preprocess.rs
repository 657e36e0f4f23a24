//! Preprocessor: mirror/flip, color-space convert, resize (optionally
//! letterboxed), optional normalize. Operations run in a fixed order and
//! per-frame latency is always recorded by the caller (the
//! orchestrator's stage chain), which timestamps each stage transition.

use crate::error::PreprocessError;
use crate::model::{Frame, PreprocessedFrame};

#[derive(Debug, Clone, Copy)]
pub struct PreprocessOptions {
    pub mirror: bool,
    pub swap_to_rgb: bool,
    pub target_width: u32,
    pub target_height: u32,
    pub letterbox: bool,
    pub normalize: bool,
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        PreprocessOptions {
            mirror: true,
            swap_to_rgb: false,
            target_width: 224,
            target_height: 224,
            letterbox: true,
            normalize: false,
        }
    }
}

/// Applies the fixed-order transform chain to a raw frame. `pixels` is
/// assumed packed 3-channel (RGB or BGR per `source.channels`).
pub fn preprocess(
    source: &Frame,
    opts: &PreprocessOptions,
) -> Result<PreprocessedFrame, PreprocessError> {
    if opts.target_width == 0 || opts.target_height == 0 {
        return Err(PreprocessError::DegenerateSize(
            opts.target_width,
            opts.target_height,
        ));
    }
    if source.channels != 3 {
        return Err(PreprocessError::UnsupportedFormat(format!(
            "expected 3 channels, got {}",
            source.channels
        )));
    }

    let mut pixels = source.pixels.clone();
    let (w, h, c) = (source.width as usize, source.height as usize, 3usize);

    // (a) horizontal flip
    if opts.mirror {
        flip_horizontal(&mut pixels, w, h, c);
    }

    // (b) BGR -> RGB
    if opts.swap_to_rgb {
        swap_rb(&mut pixels);
    }

    // (c) resize: stretch or letterbox
    let (resized, scale_x, scale_y) = if opts.letterbox {
        letterbox_resize(&pixels, w, h, opts.target_width as usize, opts.target_height as usize)
    } else {
        let resized = stretch_resize(&pixels, w, h, opts.target_width as usize, opts.target_height as usize);
        let scale_x = opts.target_width as f32 / w as f32;
        let scale_y = opts.target_height as f32 / h as f32;
        (resized, scale_x, scale_y)
    };

    // (d) optional normalize: produce a parallel float32 buffer in [0, 1],
    // leaving `pixels` as the canonical uint8 bytes. The extractor adapter
    // de-normalizes back to uint8 from `pixels_f32` if the model expects that.
    let normalized = opts.normalize;
    let pixels_f32 = if normalized {
        Some(resized.iter().map(|&v| v as f32 / 255.0).collect())
    } else {
        None
    };

    Ok(PreprocessedFrame {
        pixels: resized,
        pixels_f32,
        original_width: source.width,
        original_height: source.height,
        processed_width: opts.target_width,
        processed_height: opts.target_height,
        scale_x,
        scale_y,
        normalized,
        capture_timestamp: source.capture_timestamp,
    })
}

fn flip_horizontal(pixels: &mut [u8], w: usize, h: usize, c: usize) {
    for row in 0..h {
        let row_start = row * w * c;
        for col in 0..w / 2 {
            let left = row_start + col * c;
            let right = row_start + (w - 1 - col) * c;
            for ch in 0..c {
                pixels.swap(left + ch, right + ch);
            }
        }
    }
}

fn swap_rb(pixels: &mut [u8]) {
    for px in pixels.chunks_exact_mut(3) {
        px.swap(0, 2);
    }
}

fn stretch_resize(pixels: &[u8], w: usize, h: usize, target_w: usize, target_h: usize) -> Vec<u8> {
    let mut out = vec![0u8; target_w * target_h * 3];
    for ty in 0..target_h {
        let sy = (ty * h) / target_h.max(1);
        for tx in 0..target_w {
            let sx = (tx * w) / target_w.max(1);
            let src = (sy * w + sx) * 3;
            let dst = (ty * target_w + tx) * 3;
            out[dst..dst + 3].copy_from_slice(&pixels[src..src + 3]);
        }
    }
    out
}

/// Resize preserving aspect ratio, centering the active region and
/// zero-filling the rest. Returns the (zero-filled) buffer and the
/// uniform scale factor applied on each axis.
fn letterbox_resize(
    pixels: &[u8],
    w: usize,
    h: usize,
    target_w: usize,
    target_h: usize,
) -> (Vec<u8>, f32, f32) {
    let scale = (target_w as f32 / w as f32).min(target_h as f32 / h as f32);
    let active_w = ((w as f32) * scale).round() as usize;
    let active_h = ((h as f32) * scale).round() as usize;
    let active_w = active_w.clamp(1, target_w);
    let active_h = active_h.clamp(1, target_h);

    let resized_active = stretch_resize(pixels, w, h, active_w, active_h);

    let mut out = vec![0u8; target_w * target_h * 3];
    let offset_x = (target_w - active_w) / 2;
    let offset_y = (target_h - active_h) / 2;

    for row in 0..active_h {
        let src_start = row * active_w * 3;
        let dst_row = offset_y + row;
        let dst_start = (dst_row * target_w + offset_x) * 3;
        out[dst_start..dst_start + active_w * 3]
            .copy_from_slice(&resized_active[src_start..src_start + active_w * 3]);
    }

    (out, scale, scale)
}
