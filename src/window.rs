//! Random windowing policy.
//!
//! All index arithmetic for carving fixed-length views out of
//! variable-length recordings lives here. Randomness enters through a
//! caller-supplied RNG, so the policy itself is deterministic and testable.

use rand::Rng;

/// Uniform random start offset for a `window_len` span inside `total_len`
/// samples. Both endpoints of `[0, total_len - window_len]` are possible.
///
/// # Panics
/// Panics if `total_len < window_len`. Call sites pad recordings up to the
/// window length first (see `Waveform::pad_to`).
pub fn random_start<R: Rng + ?Sized>(rng: &mut R, total_len: usize, window_len: usize) -> usize {
    assert!(
        total_len >= window_len,
        "recording shorter than window: {} < {}",
        total_len,
        window_len
    );
    rng.gen_range(0..=total_len - window_len)
}

/// Window placement for the overlapping three-view adapter.
///
/// One pick point is shared by all three views: the anchor is a plain
/// `window_len` span centered inside the margin, while both side windows
/// keep the full `window_len + margin` span so augmentation can crop
/// anywhere inside it and still overlap the anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlapWindows {
    /// Start of the un-augmented anchor window (`window_len` samples).
    pub anchor_start: usize,
    /// Start of both oversized side windows (`window_len + margin` samples).
    pub side_start: usize,
    /// Length of each side window.
    pub side_len: usize,
}

impl OverlapWindows {
    /// Draw a shared pick point uniformly from
    /// `[0, total_len - window_len - margin]` and derive the three windows.
    ///
    /// # Panics
    /// Panics if `total_len < window_len + margin` or `margin` is odd.
    pub fn draw<R: Rng + ?Sized>(
        rng: &mut R,
        total_len: usize,
        window_len: usize,
        margin: usize,
    ) -> Self {
        assert!(margin % 2 == 0, "overlap margin must be even");
        assert!(
            total_len >= window_len + margin,
            "recording shorter than window + margin: {} < {}",
            total_len,
            window_len + margin
        );
        let pick = rng.gen_range(0..=total_len - window_len - margin);
        Self {
            anchor_start: pick + margin / 2,
            side_start: pick,
            side_len: window_len + margin,
        }
    }

    /// Guaranteed overlap (in samples) between the anchor window and any
    /// `window_len` crop of a side window.
    pub fn min_overlap(&self, window_len: usize) -> usize {
        let margin = self.side_len - window_len;
        window_len.saturating_sub(margin / 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn start_covers_full_valid_range() {
        // window=4 in a length-10 recording: start must be uniform in [0, 6].
        let mut rng = StdRng::seed_from_u64(7);
        let mut seen = [false; 7];
        for _ in 0..500 {
            let s = random_start(&mut rng, 10, 4);
            assert!(s <= 6);
            seen[s] = true;
        }
        assert!(seen.iter().all(|&b| b), "not all offsets drawn: {:?}", seen);
    }

    #[test]
    fn start_is_zero_when_lengths_match() {
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(random_start(&mut rng, 8, 8), 0);
    }

    #[test]
    #[should_panic(expected = "shorter than window")]
    fn start_rejects_short_recordings() {
        let mut rng = StdRng::seed_from_u64(0);
        random_start(&mut rng, 3, 4);
    }

    #[test]
    fn overlap_windows_stay_in_bounds() {
        let mut rng = StdRng::seed_from_u64(42);
        let (total, window, margin) = (40000, 20480, 8000);
        for _ in 0..200 {
            let w = OverlapWindows::draw(&mut rng, total, window, margin);
            assert!(w.anchor_start + window <= total);
            assert!(w.side_start + w.side_len <= total);
            assert_eq!(w.anchor_start, w.side_start + margin / 2);
            assert_eq!(w.side_len, window + margin);
        }
    }

    #[test]
    fn anchor_overlaps_any_side_crop() {
        let mut rng = StdRng::seed_from_u64(3);
        let (total, window, margin) = (40000, 20480, 8000);
        let w = OverlapWindows::draw(&mut rng, total, window, margin);

        // Worst-case side crops sit at either end of the oversized span.
        let anchor = w.anchor_start..w.anchor_start + window;
        for crop_start in [w.side_start, w.side_start + margin] {
            let crop = crop_start..crop_start + window;
            let overlap = anchor.end.min(crop.end).saturating_sub(anchor.start.max(crop.start));
            assert!(overlap >= w.min_overlap(window));
        }
        assert_eq!(w.min_overlap(window), window - margin / 2);
    }

    #[test]
    fn tight_fit_pins_pick_point() {
        let mut rng = StdRng::seed_from_u64(1);
        // total == window + margin leaves exactly one valid pick.
        let w = OverlapWindows::draw(&mut rng, 28480, 20480, 8000);
        assert_eq!(w.side_start, 0);
        assert_eq!(w.anchor_start, 4000);
    }
}
