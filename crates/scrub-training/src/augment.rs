//! Per-example augmentations on raw CHW pixel buffers
//!
//! Random crop with zero padding, horizontal flip, and cutout, applied
//! to the finetuning pass only. Evaluation and the ascent pass consume
//! examples as stored.

use rand::Rng;

/// Crop back to the original size after zero-padding `pad` pixels per side
pub fn random_crop(
    image: &[u8],
    c: usize,
    h: usize,
    w: usize,
    pad: usize,
    rng: &mut impl Rng,
) -> Vec<u8> {
    let top = rng.gen_range(0..=2 * pad);
    let left = rng.gen_range(0..=2 * pad);
    let mut out = vec![0u8; image.len()];
    for ch in 0..c {
        for y in 0..h {
            let sy = y + top;
            if sy < pad || sy >= h + pad {
                continue;
            }
            for x in 0..w {
                let sx = x + left;
                if sx < pad || sx >= w + pad {
                    continue;
                }
                out[(ch * h + y) * w + x] = image[(ch * h + (sy - pad)) * w + (sx - pad)];
            }
        }
    }
    out
}

/// Mirror across the vertical axis with probability 1/2
pub fn random_flip(image: &mut [u8], c: usize, h: usize, w: usize, rng: &mut impl Rng) {
    if rng.gen_bool(0.5) {
        for ch in 0..c {
            for y in 0..h {
                let row = (ch * h + y) * w;
                image[row..row + w].reverse();
            }
        }
    }
}

/// Zero a square patch around a uniformly chosen center, clipped to the
/// image; the patch spans `length / 2` pixels to each side (exclusive)
pub fn cutout(image: &mut [u8], c: usize, h: usize, w: usize, length: usize, rng: &mut impl Rng) {
    let cy = rng.gen_range(0..h);
    let cx = rng.gen_range(0..w);
    let y0 = cy.saturating_sub(length / 2);
    let y1 = (cy + length / 2).min(h);
    let x0 = cx.saturating_sub(length / 2);
    let x1 = (cx + length / 2).min(w);
    for ch in 0..c {
        for y in y0..y1 {
            let row = (ch * h + y) * w;
            for x in x0..x1 {
                image[row + x] = 0;
            }
        }
    }
}

/// The finetuning pipeline: crop with 4px padding, flip, 3px cutout
pub fn finetune_example(image: &[u8], c: usize, h: usize, w: usize, rng: &mut impl Rng) -> Vec<u8> {
    let mut out = random_crop(image, c, h, w, 4, rng);
    random_flip(&mut out, c, h, w, rng);
    cutout(&mut out, c, h, w, 3, rng);
    out
}
