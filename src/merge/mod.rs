//! Three-way text merge for diverged file edits.
//!
//! Given the common base plus two derived versions, changes that touch
//! disjoint line regions combine automatically; overlapping changes that
//! disagree become conflict regions rendered with standard markers:
//!
//! ```text
//! <<<<<<< ours
//! our lines
//! ||||||| base
//! base lines
//! =======
//! their lines
//! >>>>>>> theirs
//! ```
//!
//! The merge is advisory tooling for resolving a CAS conflict after the
//! fact; nothing in the event log depends on it.

pub mod diff;

use diff::{diff_hunks, map_end, map_start, Hunk};

/// Upper bound on change regions before [`detect`] stops recommending an
/// automatic merge. Past this the versions have diverged enough that a human
/// should look.
pub const AUTO_MERGE_REGION_LIMIT: usize = 32;

/// Labels used in conflict markers.
#[derive(Debug, Clone)]
pub struct MarkerLabels {
    pub ours: String,
    pub theirs: String,
}

impl Default for MarkerLabels {
    fn default() -> Self {
        MarkerLabels {
            ours: "ours".into(),
            theirs: "theirs".into(),
        }
    }
}

impl MarkerLabels {
    pub fn new(ours: impl Into<String>, theirs: impl Into<String>) -> Self {
        MarkerLabels {
            ours: ours.into(),
            theirs: theirs.into(),
        }
    }
}

/// Result of a three-way merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// All changes combined cleanly.
    Merged(String),
    /// One or more regions conflicted; the text carries markers.
    Conflicted { text: String, conflicts: usize },
}

impl MergeOutcome {
    /// The merged text, markers and all.
    pub fn text(&self) -> &str {
        match self {
            MergeOutcome::Merged(text) => text,
            MergeOutcome::Conflicted { text, .. } => text,
        }
    }

    pub fn is_clean(&self) -> bool {
        matches!(self, MergeOutcome::Merged(_))
    }
}

/// How far two derived versions have drifted from their base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Divergence {
    /// Change regions across both sides (overlaps counted once).
    pub regions: usize,
    /// Regions where the sides made different overlapping changes.
    pub conflicts: usize,
    /// True when a merge would be clean and small enough to trust.
    pub can_merge: bool,
}

/// Merges two derived versions of a text against their common base.
pub fn merge(base: &str, ours: &str, theirs: &str, labels: &MarkerLabels) -> MergeOutcome {
    // Trivial cases need no diffing.
    if ours == theirs {
        return MergeOutcome::Merged(ours.to_string());
    }
    if ours == base {
        return MergeOutcome::Merged(theirs.to_string());
    }
    if theirs == base {
        return MergeOutcome::Merged(ours.to_string());
    }

    let base_l = split_lines(base);
    let ours_l = split_lines(ours);
    let theirs_l = split_lines(theirs);

    let o_hunks = diff_hunks(&base_l, &ours_l);
    let t_hunks = diff_hunks(&base_l, &theirs_l);
    let regions = coalesce(&o_hunks, &t_hunks);

    let mut out = String::new();
    let mut conflicts = 0usize;
    let mut cursor = 0usize;

    for region in &regions {
        for line in &base_l[cursor..region.lo] {
            out.push_str(line);
        }

        let o_seg = side_segment(&ours_l, &o_hunks, region);
        let t_seg = side_segment(&theirs_l, &t_hunks, region);

        match (region.ours_changed, region.theirs_changed) {
            (true, false) => push_lines(&mut out, o_seg),
            (false, true) => push_lines(&mut out, t_seg),
            _ => {
                if o_seg == t_seg {
                    // Both sides made the identical change.
                    push_lines(&mut out, o_seg);
                } else {
                    conflicts += 1;
                    let b_seg = &base_l[region.lo..region.hi];
                    push_marked(&mut out, labels, o_seg, b_seg, t_seg);
                }
            }
        }

        cursor = region.hi;
    }

    for line in &base_l[cursor..] {
        out.push_str(line);
    }

    if conflicts == 0 {
        MergeOutcome::Merged(out)
    } else {
        MergeOutcome::Conflicted {
            text: out,
            conflicts,
        }
    }
}

/// Measures divergence without producing merged text.
pub fn detect(base: &str, ours: &str, theirs: &str) -> Divergence {
    if ours == theirs || ours == base || theirs == base {
        return Divergence {
            regions: 0,
            conflicts: 0,
            can_merge: true,
        };
    }

    let base_l = split_lines(base);
    let ours_l = split_lines(ours);
    let theirs_l = split_lines(theirs);

    let o_hunks = diff_hunks(&base_l, &ours_l);
    let t_hunks = diff_hunks(&base_l, &theirs_l);
    let regions = coalesce(&o_hunks, &t_hunks);

    let conflicts = regions
        .iter()
        .filter(|r| {
            r.ours_changed
                && r.theirs_changed
                && side_segment(&ours_l, &o_hunks, r) != side_segment(&theirs_l, &t_hunks, r)
        })
        .count();

    Divergence {
        regions: regions.len(),
        conflicts,
        can_merge: conflicts == 0 && regions.len() <= AUTO_MERGE_REGION_LIMIT,
    }
}

/// Measures how far two versions have drifted from each other, with no
/// common base in hand.
///
/// Without a base there is nothing to merge against, so `conflicts` is
/// always zero; the verdict is purely the change-region count against
/// [`AUTO_MERGE_REGION_LIMIT`]. Many regions means the pair has diverged
/// enough that a human should reconcile them.
pub fn detect_pair(a: &str, b: &str) -> Divergence {
    if a == b {
        return Divergence {
            regions: 0,
            conflicts: 0,
            can_merge: true,
        };
    }

    let a_l = split_lines(a);
    let b_l = split_lines(b);
    let regions = diff_hunks(&a_l, &b_l).len();

    Divergence {
        regions,
        conflicts: 0,
        can_merge: regions <= AUTO_MERGE_REGION_LIMIT,
    }
}

/// A coalesced change region over the base, with which sides touched it.
#[derive(Debug, Clone, Copy)]
struct Region {
    lo: usize,
    hi: usize,
    ours_changed: bool,
    theirs_changed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Ours,
    Theirs,
}

/// Merges both sides' hunks into regions, combining hunks whose base ranges
/// overlap. Two insertions at the same base position also combine; disjoint
/// edits that merely touch stay separate so they can merge cleanly.
fn coalesce(o_hunks: &[Hunk], t_hunks: &[Hunk]) -> Vec<Region> {
    let mut tagged: Vec<(usize, usize, Side)> = o_hunks
        .iter()
        .map(|h| (h.base_start, h.base_end(), Side::Ours))
        .chain(t_hunks.iter().map(|h| (h.base_start, h.base_end(), Side::Theirs)))
        .collect();
    tagged.sort_by_key(|&(lo, hi, _)| (lo, hi));

    let mut regions: Vec<Region> = Vec::new();
    for (lo, hi, side) in tagged {
        if let Some(last) = regions.last_mut() {
            let overlaps = lo < last.hi;
            let insertion_at_same_point = lo == last.hi && (lo == hi || last.lo == last.hi);
            if overlaps || insertion_at_same_point {
                last.hi = last.hi.max(hi);
                match side {
                    Side::Ours => last.ours_changed = true,
                    Side::Theirs => last.theirs_changed = true,
                }
                continue;
            }
        }
        regions.push(Region {
            lo,
            hi,
            ours_changed: side == Side::Ours,
            theirs_changed: side == Side::Theirs,
        });
    }
    regions
}

/// The side's lines corresponding to a base region. Region bounds always lie
/// outside the side's hunks, so position mapping is well defined; insertion
/// hunks at a bound are attributed to the region whose end touches them.
fn side_segment<'a>(side: &'a [&'a str], hunks: &[Hunk], region: &Region) -> &'a [&'a str] {
    &side[map_start(hunks, region.lo)..map_end(hunks, region.hi)]
}

/// Lines split keeping their terminators, so concatenation reconstructs the
/// input exactly (trailing-newline differences included).
fn split_lines(s: &str) -> Vec<&str> {
    s.split_inclusive('\n').collect()
}

fn push_lines(out: &mut String, lines: &[&str]) {
    for line in lines {
        out.push_str(line);
    }
}

fn ensure_newline(out: &mut String) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

fn push_marked(
    out: &mut String,
    labels: &MarkerLabels,
    ours: &[&str],
    base: &[&str],
    theirs: &[&str],
) {
    ensure_newline(out);
    out.push_str(&format!("<<<<<<< {}\n", labels.ours));
    push_lines(out, ours);
    ensure_newline(out);
    out.push_str("||||||| base\n");
    push_lines(out, base);
    ensure_newline(out);
    out.push_str("=======\n");
    push_lines(out, theirs);
    ensure_newline(out);
    out.push_str(&format!(">>>>>>> {}\n", labels.theirs));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> MarkerLabels {
        MarkerLabels::default()
    }

    // ─── Clean merges ───

    #[test]
    fn identical_sides_merge_trivially() {
        let out = merge("base\n", "same\n", "same\n", &labels());
        assert_eq!(out, MergeOutcome::Merged("same\n".into()));
    }

    #[test]
    fn one_sided_change_takes_that_side() {
        let base = "a\nb\nc\n";
        let theirs = "a\nB\nc\n";
        assert_eq!(
            merge(base, base, theirs, &labels()),
            MergeOutcome::Merged(theirs.into())
        );
        assert_eq!(
            merge(base, theirs, base, &labels()),
            MergeOutcome::Merged(theirs.into())
        );
    }

    #[test]
    fn disjoint_changes_combine() {
        let base = "one\ntwo\nthree\nfour\nfive\n";
        let ours = "ONE\ntwo\nthree\nfour\nfive\n";
        let theirs = "one\ntwo\nthree\nfour\nFIVE\n";

        let out = merge(base, ours, theirs, &labels());
        assert_eq!(
            out,
            MergeOutcome::Merged("ONE\ntwo\nthree\nfour\nFIVE\n".into())
        );
    }

    #[test]
    fn insertion_and_change_combine() {
        let base = "fn main() {\n    body\n}\n";
        let ours = "use std::io;\n\nfn main() {\n    body\n}\n";
        let theirs = "fn main() {\n    other body\n}\n";

        let out = merge(base, ours, theirs, &labels());
        assert_eq!(
            out,
            MergeOutcome::Merged("use std::io;\n\nfn main() {\n    other body\n}\n".into())
        );
    }

    #[test]
    fn identical_overlapping_change_is_clean() {
        let base = "a\nb\nc\n";
        let ours = "a\nB\nc\n";
        let theirs = "a\nB\nc\n";

        // Caught by the quick path, but exercised through fold too.
        let out = merge(base, ours, theirs, &labels());
        assert!(out.is_clean());
    }

    #[test]
    fn both_delete_same_line_is_clean() {
        let base = "a\nb\nc\n";
        let ours = "a\nc\n";
        let theirs = "a\nc\n";
        assert_eq!(
            merge(base, ours, theirs, &labels()),
            MergeOutcome::Merged("a\nc\n".into())
        );
    }

    // ─── Conflicts ───

    #[test]
    fn overlapping_different_changes_conflict() {
        let base = "a\nmiddle\nz\n";
        let ours = "a\nours version\nz\n";
        let theirs = "a\ntheirs version\nz\n";

        let out = merge(base, ours, theirs, &labels());
        let MergeOutcome::Conflicted { text, conflicts } = out else {
            panic!("expected conflict, got {:?}", out);
        };
        assert_eq!(conflicts, 1);
        assert_eq!(
            text,
            "a\n<<<<<<< ours\nours version\n||||||| base\nmiddle\n=======\ntheirs version\n>>>>>>> theirs\nz\n"
        );
    }

    #[test]
    fn custom_labels_appear_in_markers() {
        let out = merge(
            "x\n",
            "y\n",
            "z\n",
            &MarkerLabels::new("agent-1", "agent-2"),
        );
        let MergeOutcome::Conflicted { text, .. } = out else {
            panic!("expected conflict");
        };
        assert!(text.contains("<<<<<<< agent-1\n"));
        assert!(text.contains(">>>>>>> agent-2\n"));
    }

    #[test]
    fn conflict_and_clean_change_in_one_file() {
        let base = "head\na\nb\nc\ntail\n";
        let ours = "HEAD\na\nOURS\nc\ntail\n";
        let theirs = "head\na\nTHEIRS\nc\ntail\n";

        let out = merge(base, ours, theirs, &labels());
        let MergeOutcome::Conflicted { text, conflicts } = out else {
            panic!("expected conflict");
        };
        assert_eq!(conflicts, 1);
        // The one-sided head change still merged.
        assert!(text.starts_with("HEAD\n"));
        assert!(text.contains("OURS\n"));
        assert!(text.contains("THEIRS\n"));
    }

    #[test]
    fn dueling_insertions_at_same_point_conflict() {
        let base = "a\nb\n";
        let ours = "a\nX\nb\n";
        let theirs = "a\nY\nb\n";

        let out = merge(base, ours, theirs, &labels());
        let MergeOutcome::Conflicted { text, conflicts } = out else {
            panic!("expected conflict, got {:?}", out);
        };
        assert_eq!(conflicts, 1);
        // Neither insertion may be dropped.
        assert!(text.contains("X\n"));
        assert!(text.contains("Y\n"));
    }

    #[test]
    fn lone_insertion_survives_a_clean_merge() {
        let base = "a\nb\n";
        let ours = "a\nX\nb\n";

        let out = merge(base, ours, "a\nb\nc\n", &labels());
        assert_eq!(out, MergeOutcome::Merged("a\nX\nb\nc\n".into()));
    }

    #[test]
    fn insertions_at_both_ends_combine() {
        let base = "middle\n";
        let ours = "top\nmiddle\n";
        let theirs = "middle\nbottom\n";

        let out = merge(base, ours, theirs, &labels());
        assert_eq!(out, MergeOutcome::Merged("top\nmiddle\nbottom\n".into()));
    }

    #[test]
    fn missing_trailing_newline_still_renders_markers_sanely() {
        let out = merge("line", "ours", "theirs", &labels());
        let MergeOutcome::Conflicted { text, .. } = out else {
            panic!("expected conflict");
        };
        assert!(text.contains("ours\n|||||||"));
        assert!(text.contains("theirs\n>>>>>>>"));
    }

    // ─── Divergence detection ───

    #[test]
    fn detect_trivial_cases_can_merge() {
        let d = detect("base\n", "base\n", "edit\n");
        assert_eq!(d.regions, 0);
        assert_eq!(d.conflicts, 0);
        assert!(d.can_merge);
    }

    #[test]
    fn detect_counts_disjoint_regions() {
        let base = "one\ntwo\nthree\nfour\nfive\n";
        let ours = "ONE\ntwo\nthree\nfour\nfive\n";
        let theirs = "one\ntwo\nthree\nfour\nFIVE\n";

        let d = detect(base, ours, theirs);
        assert_eq!(d.regions, 2);
        assert_eq!(d.conflicts, 0);
        assert!(d.can_merge);
    }

    #[test]
    fn detect_flags_conflicts() {
        let d = detect("a\nm\nz\n", "a\nx\nz\n", "a\ny\nz\n");
        assert_eq!(d.conflicts, 1);
        assert!(!d.can_merge);
    }

    #[test]
    fn detect_agrees_with_merge() {
        let cases = [
            ("a\nb\nc\n", "a\nB\nc\n", "a\nb\nC\n"),
            ("a\nb\nc\n", "a\nX\nc\n", "a\nY\nc\n"),
            ("a\nb\n", "a\nb\nnew\n", "a\nb\n"),
        ];
        for (base, ours, theirs) in cases {
            let d = detect(base, ours, theirs);
            let clean = merge(base, ours, theirs, &labels()).is_clean();
            assert_eq!(d.conflicts == 0, clean, "case {:?}", (base, ours, theirs));
        }
    }

    #[test]
    fn detect_pair_identical_versions() {
        let d = detect_pair("a\nb\n", "a\nb\n");
        assert_eq!(d.regions, 0);
        assert!(d.can_merge);
    }

    #[test]
    fn detect_pair_counts_change_regions() {
        let d = detect_pair("a\nb\nc\nd\ne\n", "A\nb\nc\nd\nE\n");
        assert_eq!(d.regions, 2);
        assert_eq!(d.conflicts, 0);
        assert!(d.can_merge);
    }

    #[test]
    fn detect_pair_heavy_divergence_refuses_auto_merge() {
        let a: String = (0..200).map(|i| format!("line {}\n", i)).collect();
        let b: String = (0..200)
            .map(|i| {
                if i % 3 == 0 {
                    format!("edited {}\n", i)
                } else {
                    format!("line {}\n", i)
                }
            })
            .collect();

        let d = detect_pair(&a, &b);
        assert!(d.regions > AUTO_MERGE_REGION_LIMIT);
        assert!(!d.can_merge);
    }

    #[test]
    fn detect_too_many_regions_refuses_auto_merge() {
        let base: String = (0..200).map(|i| format!("line {}\n", i)).collect();
        // Ours touches every third line, theirs none: clean but huge.
        let ours: String = (0..200)
            .map(|i| {
                if i % 3 == 0 {
                    format!("edited {}\n", i)
                } else {
                    format!("line {}\n", i)
                }
            })
            .collect();

        let d = detect(&base, &ours, &base);
        // Quick path: theirs == base merges trivially regardless of size.
        assert!(d.can_merge);

        // Force both sides to differ so the region count matters.
        let theirs = format!("{}extra\n", base);
        let d = detect(&base, &ours, &theirs);
        assert!(d.regions > AUTO_MERGE_REGION_LIMIT);
        assert_eq!(d.conflicts, 0);
        assert!(!d.can_merge);
    }
}
