//! Fitting raw model output to the fixed storage width.

use crate::config::PadStrategy;

/// In-place L2 normalization. Zero vectors are left untouched.
pub fn l2_normalize_in_place(v: &mut [f32]) {
    let norm_sq: f32 = v.iter().map(|x| x * x).sum();
    if norm_sq > 0.0 && norm_sq.is_finite() {
        let inv_norm = norm_sq.sqrt().recip();
        for x in v.iter_mut() {
            *x *= inv_norm;
        }
    }
}

/// Bring `raw` to exactly `dim` components.
///
/// * `len == dim`: returned unchanged.
/// * `len > dim`: truncated to the leading `dim` components.
/// * `len < dim`: widened per `strategy`, then L2-normalized.
/// * empty input: all zeros.
///
/// Non-finite components are zeroed before anything else so the output is
/// always finite.
pub fn fit_to_dimension(raw: Vec<f32>, dim: usize, strategy: PadStrategy, noise: f32) -> Vec<f32> {
    let mut raw = raw;
    for x in raw.iter_mut() {
        if !x.is_finite() {
            *x = 0.0;
        }
    }

    let len = raw.len();
    if len == 0 {
        return vec![0.0; dim];
    }
    if len == dim {
        return raw;
    }
    if len > dim {
        raw.truncate(dim);
        return raw;
    }

    let mut out = Vec::with_capacity(dim);
    match strategy {
        PadStrategy::ZeroFill => {
            out.extend_from_slice(&raw);
            out.resize(dim, 0.0);
        }
        PadStrategy::SeededNoise => {
            let repeats = dim / len;
            for _ in 0..repeats {
                out.extend_from_slice(&raw);
            }
            let remainder = dim - out.len();
            let mut rng = fastrand::Rng::with_seed(seed_for(&raw));
            for x in &raw[..remainder] {
                let jitter = (rng.f32() * 2.0 - 1.0) * noise;
                out.push(x * (1.0 + jitter));
            }
        }
    }
    l2_normalize_in_place(&mut out);
    out
}

fn seed_for(raw: &[f32]) -> u64 {
    let bits: Vec<u32> = raw.iter().map(|x| x.to_bits()).collect();
    fxhash::hash64(&bits)
}
