//! LSP (line spectral pair) to spectral envelope conversion.
//!
//! Floor 0 transmits its envelope as LSP filter roots. Rendering walks the
//! bark-mapped bins, evaluates the two root products at each mapped
//! frequency and converts the combined magnitude from dB, multiplying the
//! result onto the working spectrum.

/// Evaluates the LSP filter response and multiplies the envelope onto
/// `curve[..n]`. `map` translates linear bins to bark bins; consecutive
/// bins sharing a bark bin reuse one evaluation. `lsp[..m]` is clobbered
/// (moved to the cosine domain).
pub fn lsp_to_curve(
    curve: &mut [f32],
    map: &[usize],
    n: usize,
    ln: usize,
    lsp: &mut [f32],
    m: usize,
    amp: f32,
    ampoffset: f32,
) {
    let wdel = std::f32::consts::PI / ln as f32;
    for v in lsp[..m].iter_mut() {
        *v = 2.0 * v.cos();
    }
    let m2 = (m / 2) * 2;

    let mut i = 0;
    while i < n {
        let k = map[i];
        let mut p = 0.5f32;
        let mut q = 0.5f32;
        let w = 2.0 * (wdel * k as f32).cos();

        let mut j = 0;
        while j < m2 {
            q *= w - lsp[j];
            p *= w - lsp[j + 1];
            j += 2;
        }

        if m & 1 != 0 {
            // odd order filter; slightly asymmetric
            q *= w - lsp[m - 1];
            p *= p * (4.0 - w * w);
            q *= q;
        } else {
            // even order filter; still symmetric
            q *= q * (2.0 - w);
            p *= p * (2.0 + w);
        }

        let v = from_db(amp / (p + q).sqrt() - ampoffset);

        curve[i] *= v;
        i += 1;
        while i < n && map[i] == k {
            curve[i] *= v;
            i += 1;
        }
    }
}

#[inline(always)]
fn from_db(x: f32) -> f32 {
    (x * 0.115_129_25).exp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_db_anchors() {
        assert!((from_db(0.0) - 1.0).abs() < 1e-6);
        // -20 dB is a factor of 10
        assert!((from_db(-20.0) - 0.1).abs() < 1e-4);
    }

    #[test]
    fn flat_filter_attenuates_uniformly() {
        // order-2 filter with roots pinned at the band edges produces a
        // finite positive envelope over the whole map
        let mut lsp = vec![0.1f32, std::f32::consts::PI - 0.1];
        let map: Vec<usize> = (0..64).map(|j| j / 2).collect();
        let mut curve = vec![1.0f32; 64];
        lsp_to_curve(&mut curve, &map, 64, 32, &mut lsp, 2, 1.0, 0.5);
        assert!(curve.iter().all(|v| v.is_finite() && *v > 0.0));
        // bins sharing a bark slot get the identical factor
        for j in (0..64).step_by(2) {
            assert_eq!(curve[j], curve[j + 1]);
        }
    }

    #[test]
    fn even_order_envelope_matches_direct_evaluation() {
        // pin the even-order branch bin by bin: evaluate the root products
        // q^2(2-w) + p^2(2+w) by hand and compare the rendered magnitude
        let roots = [1.0f32, 2.2];
        let n = 8;
        let ln = 16;
        let map: Vec<usize> = (0..n).map(|j| 2 * j).collect();
        let (amp, ampoffset) = (1.0f32, 0.5f32);

        let mut lsp = roots.to_vec();
        let mut curve = vec![1.0f32; n];
        lsp_to_curve(&mut curve, &map, n, ln, &mut lsp, 2, amp, ampoffset);

        let wdel = std::f32::consts::PI / ln as f32;
        for (i, &k) in map.iter().enumerate() {
            let w = 2.0 * (wdel * k as f32).cos();
            let mut q = 0.5 * (w - 2.0 * roots[0].cos());
            let mut p = 0.5 * (w - 2.0 * roots[1].cos());
            q *= q * (2.0 - w);
            p *= p * (2.0 + w);
            let expected = from_db(amp / (p + q).sqrt() - ampoffset);

            assert!(
                (curve[i] - expected).abs() <= expected.abs() * 1e-6,
                "bin {i}: got {}, expected {expected}",
                curve[i]
            );
        }
    }
}
