//! Line-level diff between a base and one derived version.
//!
//! Produces change hunks against the longest common subsequence of lines.
//! Hunks are maximal: consecutive changed lines collapse into one hunk, and
//! the lines between hunks are guaranteed identical on both sides.

/// One contiguous change: base lines `[base_start, base_start + base_len)`
/// were replaced by side lines `[side_start, side_start + side_len)`.
///
/// A pure insertion has `base_len == 0`; a pure deletion has `side_len == 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hunk {
    pub base_start: usize,
    pub base_len: usize,
    pub side_start: usize,
    pub side_len: usize,
}

impl Hunk {
    /// End of the hunk's base range (exclusive).
    pub fn base_end(&self) -> usize {
        self.base_start + self.base_len
    }
}

/// Computes change hunks turning `base` into `side`.
///
/// Dynamic-programming LCS, quadratic in line count. Coordination targets
/// source files, not bulk data, so the simple table wins over fancier
/// algorithms.
pub fn diff_hunks(base: &[&str], side: &[&str]) -> Vec<Hunk> {
    let n = base.len();
    let m = side.len();

    // dp[i][j] = LCS length of base[i..] and side[j..].
    let width = m + 1;
    let mut dp = vec![0u32; (n + 1) * width];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            dp[i * width + j] = if base[i] == side[j] {
                dp[(i + 1) * width + j + 1] + 1
            } else {
                dp[(i + 1) * width + j].max(dp[i * width + j + 1])
            };
        }
    }

    let mut hunks = Vec::new();
    let (mut i, mut j) = (0usize, 0usize);
    let mut run: Option<(usize, usize)> = None;

    while i < n || j < m {
        if i < n && j < m && base[i] == side[j] {
            if let Some((hi, hj)) = run.take() {
                hunks.push(Hunk {
                    base_start: hi,
                    base_len: i - hi,
                    side_start: hj,
                    side_len: j - hj,
                });
            }
            i += 1;
            j += 1;
        } else {
            if run.is_none() {
                run = Some((i, j));
            }
            // Prefer consuming the side line on ties for determinism.
            if j < m && (i >= n || dp[i * width + j + 1] >= dp[(i + 1) * width + j]) {
                j += 1;
            } else {
                i += 1;
            }
        }
    }

    if let Some((hi, hj)) = run {
        hunks.push(Hunk {
            base_start: hi,
            base_len: i - hi,
            side_start: hj,
            side_len: j - hj,
        });
    }

    hunks
}

/// Maps a base position used as a range *start* to the corresponding side
/// position. A pure insertion sitting exactly at `base_pos` maps after the
/// start, so its inserted lines fall inside the range.
pub fn map_start(hunks: &[Hunk], base_pos: usize) -> usize {
    let mut delta = 0isize;
    for h in hunks {
        let before = h.base_end() < base_pos || (h.base_end() == base_pos && h.base_len > 0);
        if before {
            delta += h.side_len as isize - h.base_len as isize;
        }
    }
    (base_pos as isize + delta) as usize
}

/// Maps a base position used as a range *end* to the corresponding side
/// position. A pure insertion sitting exactly at `base_pos` counts as inside
/// the range, the mirror of [`map_start`].
pub fn map_end(hunks: &[Hunk], base_pos: usize) -> usize {
    let mut delta = 0isize;
    for h in hunks {
        if h.base_end() <= base_pos {
            delta += h.side_len as isize - h.base_len as isize;
        }
    }
    (base_pos as isize + delta) as usize
}
