//! Block overlap windows.
//!
//! Vorbis uses one window shape, `sin(pi/2 * sin^2(x))`, applied over slopes
//! whose lengths follow the adjacent block sizes. A long block next to a
//! short one gets a narrow slope centered on the quarter points with zero
//! lead-in and a flat top, so that consecutive windows always overlap-add
//! to unity.

use std::f64::consts::FRAC_PI_2;

/// One window of `window` samples with the given left/right slope lengths.
///
/// Slope lengths are half the adjacent block sizes. Samples before the left
/// slope stay zero; samples between the slopes are one.
pub fn vorbis_window(window: usize, left: usize, right: usize) -> Vec<f32> {
    let mut ret = vec![0.0f32; window];

    let leftbegin = window / 4 - left / 2;
    let rightbegin = window - window / 4 - right / 2;

    for i in 0..left {
        let mut x = (i as f64 + 0.5) / left as f64 * FRAC_PI_2;
        x = x.sin();
        x *= x;
        x *= FRAC_PI_2;
        ret[leftbegin + i] = x.sin() as f32;
    }

    for v in &mut ret[leftbegin + left..rightbegin] {
        *v = 1.0;
    }

    for i in 0..right {
        let mut x = (right - i) as f64 - 0.5;
        x = x / right as f64 * FRAC_PI_2;
        x = x.sin();
        x *= x;
        x *= FRAC_PI_2;
        ret[rightbegin + i] = x.sin() as f32;
    }

    ret
}

/// All windows a stream can select: the short block's single shape and the
/// long block's four previous/next combinations.
#[derive(Debug)]
pub struct WindowSet {
    short: Vec<f32>,
    long: [[Vec<f32>; 2]; 2],
}

impl WindowSet {
    pub fn new(blocksizes: [usize; 2]) -> Self {
        let [short_n, long_n] = blocksizes;
        let slope = |flag: usize| blocksizes[flag] / 2;

        Self {
            short: vorbis_window(short_n, short_n / 2, short_n / 2),
            long: [
                [
                    vorbis_window(long_n, slope(0), slope(0)),
                    vorbis_window(long_n, slope(0), slope(1)),
                ],
                [
                    vorbis_window(long_n, slope(1), slope(0)),
                    vorbis_window(long_n, slope(1), slope(1)),
                ],
            ],
        }
    }

    /// Window for block flag `w`; `lw`/`nw` select the long block's slopes
    /// and are ignored for short blocks.
    pub fn get(&self, w: usize, lw: usize, nw: usize) -> &[f32] {
        if w == 0 {
            &self.short
        } else {
            &self.long[lw][nw]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_window_shape() {
        let w = vorbis_window(256, 128, 128);
        assert_eq!(w.len(), 256);
        // full slopes meet at the quarter points; center region is the
        // slope peak approaching one
        assert!(w[0] > 0.0 && w[0] < 0.05);
        assert!(w[127] > 0.95);
        assert!(w[255] < 0.05);
        assert!(w.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn transition_window_shape() {
        // long block with short slopes: zero lead-in, flat top
        let w = vorbis_window(2048, 128, 128);
        let leftbegin = 2048 / 4 - 64;
        let rightbegin = 2048 - 2048 / 4 - 64;
        assert_eq!(w[0], 0.0);
        assert_eq!(w[leftbegin - 1], 0.0);
        assert_eq!(w[leftbegin + 128], 1.0);
        assert_eq!(w[1024], 1.0);
        assert_eq!(w[rightbegin - 1], 1.0);
    }

    #[test]
    fn overlap_adds_to_unity() {
        // right slope of one window plus left slope of the next,
        // power-complementary by construction
        let w = vorbis_window(256, 128, 128);
        for i in 0..128 {
            let sum = w[128 + i] * w[128 + i] + w[i] * w[i];
            assert!((sum - 1.0).abs() < 1e-5, "i={i} sum={sum}");
        }
    }
}
