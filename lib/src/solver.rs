//! Width/height inference from the number of pixel bytes a file holds.
//!
//! Every row of a BI_RGB bitmap is padded to a multiple of four bytes, so a
//! pair `(width, height)` fits a pixel array of `n` bytes exactly when
//! `row_stride(width) * height == n`. Candidates that leave bytes over are
//! rejected rather than truncated.

use std::collections::HashSet;
use std::fmt;
use std::ops::RangeInclusive;

use crate::{BitmapImageHeader, Error};

/// Largest value a width or height can take in the signed header fields.
const MAX_DIMENSION: u32 = i32::MAX as u32;

/// Bytes per row once padded to a 4-byte boundary.
pub fn row_stride(width: u32, bit_depth: u16) -> u64 {
    (width as u64 * bit_depth as u64).div_ceil(32) * 4
}

/// Widest row that pads out to exactly `stride` bytes.
fn widest_for_stride(stride: u64, bit_depth: u16) -> Option<u32> {
    if stride == 0 || stride % 4 != 0 || bit_depth == 0 {
        return None;
    }
    let width = stride * 8 / bit_depth as u64;
    if width == 0 || width > MAX_DIMENSION as u64 {
        return None;
    }
    let width = width as u32;
    (row_stride(width, bit_depth) == stride).then_some(width)
}

fn neighborhood(center: u32, radius: u32) -> RangeInclusive<u32> {
    center.saturating_sub(radius).max(1)..=center.saturating_add(radius).min(MAX_DIMENSION)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    /// Magnitudes of the declared width and height; row order is not a size.
    pub fn declared(header: &BitmapImageHeader) -> Dimensions {
        Dimensions {
            width: header.width.unsigned_abs(),
            height: header.height.unsigned_abs(),
        }
    }

    pub fn pixel_bytes(&self, bit_depth: u16) -> u64 {
        row_stride(self.width, bit_depth) * self.height as u64
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// The dimension a brute-force candidate was found by moving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Width,
    Height,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub dimensions: Dimensions,
    pub varied: Axis,
    /// How far the varied dimension moved from its declared value.
    pub distance: u32,
}

impl Candidate {
    /// Closest first; on a tie a moved height beats a moved width, then the smaller value wins.
    fn rank(&self) -> (u32, u8, u32) {
        match self.varied {
            Axis::Height => (self.distance, 0, self.dimensions.height),
            Axis::Width => (self.distance, 1, self.dimensions.width),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    /// Keep the declared pair if it already fits.
    Declared,
    /// Hold the declared height, back out the widest matching width.
    SolveWidth,
    /// Hold the declared width, divide out the height.
    SolveHeight,
}

const DEFAULT_CHAIN: [Stage; 3] = [Stage::Declared, Stage::SolveWidth, Stage::SolveHeight];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Found(Dimensions),
    NotFound,
}

impl From<Option<Dimensions>> for Outcome {
    fn from(found: Option<Dimensions>) -> Self {
        found.map_or(Outcome::NotFound, Outcome::Found)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Solver {
    pixel_bytes: u64,
    bit_depth: u16,
    declared: Dimensions,
}

impl Solver {
    pub fn new(pixel_bytes: u64, bit_depth: u16, declared: Dimensions) -> Solver {
        Solver {
            pixel_bytes,
            bit_depth,
            declared,
        }
    }

    pub fn declared(&self) -> Dimensions {
        self.declared
    }

    /// Whether `dimensions` consumes every pixel byte with nothing left over.
    pub fn fits(&self, dimensions: Dimensions) -> bool {
        (1..=MAX_DIMENSION).contains(&dimensions.width)
            && (1..=MAX_DIMENSION).contains(&dimensions.height)
            && dimensions.pixel_bytes(self.bit_depth) == self.pixel_bytes
    }

    pub fn height_for_width(&self, width: u32) -> Option<u32> {
        if !(1..=MAX_DIMENSION).contains(&width) {
            return None;
        }
        let stride = row_stride(width, self.bit_depth);
        if stride == 0 || self.pixel_bytes % stride != 0 {
            return None;
        }
        let height = self.pixel_bytes / stride;
        (1..=MAX_DIMENSION as u64)
            .contains(&height)
            .then_some(height as u32)
    }

    pub fn width_for_height(&self, height: u32) -> Option<u32> {
        if !(1..=MAX_DIMENSION).contains(&height) || self.pixel_bytes % height as u64 != 0 {
            return None;
        }
        widest_for_stride(self.pixel_bytes / height as u64, self.bit_depth)
    }

    fn run(&self, stage: Stage) -> Outcome {
        match stage {
            Stage::Declared => self.fits(self.declared).then_some(self.declared).into(),
            Stage::SolveWidth => {
                let height = self.declared.height.max(1);
                self.width_for_height(height)
                    .map(|width| Dimensions { width, height })
                    .into()
            }
            Stage::SolveHeight => {
                let width = self.declared.width.max(1);
                self.height_for_width(width)
                    .map(|height| Dimensions { width, height })
                    .into()
            }
        }
    }

    /// Default inference: declared pair, then solve width, then solve height.
    pub fn solve(&self) -> Result<Dimensions, Error> {
        for stage in DEFAULT_CHAIN {
            match self.run(stage) {
                Outcome::Found(dimensions) => {
                    tracing::debug!("{:?} stage settled on {}", stage, dimensions);
                    return Ok(dimensions);
                }
                Outcome::NotFound => tracing::debug!("{:?} stage found no exact fit", stage),
            }
        }
        Err(self.no_match())
    }

    /// Every exact fit within `radius` of the declared width and height.
    ///
    /// Lazy and side-effect free; clone it to walk the sequence again. Moved
    /// heights come first, then moved widths, each in ascending order. A fit
    /// found at the declared height counts as a width move.
    pub fn candidates(&self, radius: u32) -> impl Iterator<Item = Candidate> + Clone {
        let solver = *self;
        let declared = self.declared;

        let by_height = neighborhood(declared.height, radius).filter_map(move |height| {
            let width = solver.width_for_height(height)?;
            // held height: only the width moved
            let (varied, distance) = if height == declared.height {
                (Axis::Width, width.abs_diff(declared.width))
            } else {
                (Axis::Height, height.abs_diff(declared.height))
            };
            Some(Candidate {
                dimensions: Dimensions { width, height },
                varied,
                distance,
            })
        });
        let by_width = neighborhood(declared.width, radius).filter_map(move |width| {
            solver.height_for_width(width).map(|height| Candidate {
                dimensions: Dimensions { width, height },
                varied: Axis::Width,
                distance: width.abs_diff(declared.width),
            })
        });

        by_height.chain(by_width)
    }

    /// Brute mode: all candidates, ranked and without duplicate pairs.
    pub fn enumerate(&self, radius: u32) -> Result<Vec<Candidate>, Error> {
        let mut ranked: Vec<Candidate> = self.candidates(radius).collect();
        ranked.sort_by_key(Candidate::rank);

        let mut seen = HashSet::new();
        ranked.retain(|candidate| seen.insert(candidate.dimensions));

        if ranked.is_empty() {
            return Err(self.no_match());
        }
        Ok(ranked)
    }

    /// Closest pair to the declared one that needs no more than one row of padding.
    ///
    /// Used when nothing fits exactly. Keeps the declared width unless not even
    /// one row of it is present, then fills as many whole rows as exist.
    pub fn best_effort(&self) -> Dimensions {
        let mut width = self.declared.width.clamp(1, MAX_DIMENSION);
        if row_stride(width, self.bit_depth) > self.pixel_bytes {
            width = widest_for_stride(self.pixel_bytes / 4 * 4, self.bit_depth).unwrap_or(1);
        }
        let stride = row_stride(width, self.bit_depth).max(4);
        let height = (self.pixel_bytes / stride).clamp(1, MAX_DIMENSION as u64) as u32;
        Dimensions { width, height }
    }

    fn no_match(&self) -> Error {
        Error::NoConsistentDimensions {
            pixel_bytes: self.pixel_bytes,
            bit_depth: self.bit_depth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims(width: u32, height: u32) -> Dimensions {
        Dimensions { width, height }
    }

    #[test]
    fn stride_pads_rows_to_four_bytes() {
        assert_eq!(row_stride(10, 24), 32);
        assert_eq!(row_stride(8, 24), 24);
        assert_eq!(row_stride(1, 1), 4);
        assert_eq!(row_stride(33, 1), 8);
        assert_eq!(row_stride(9, 4), 8);
        assert_eq!(row_stride(3, 16), 8);
        assert_eq!(row_stride(5, 32), 20);
        assert_eq!(row_stride(0, 24), 0);
    }

    #[test]
    fn uneven_division_is_rejected() {
        let solver = Solver::new(1200, 24, dims(10, 37));
        // 10 px at 24 bpp pads to 32 bytes, 1200 / 32 = 37.5
        assert_eq!(solver.height_for_width(10), None);
        assert_eq!(solver.height_for_width(8), Some(50));
    }

    #[test]
    fn widest_width_is_backed_out_of_stride() {
        assert_eq!(widest_for_stride(32, 24), Some(10));
        assert_eq!(widest_for_stride(12, 8), Some(12));
        assert_eq!(widest_for_stride(4, 1), Some(32));
        assert_eq!(widest_for_stride(30, 24), None);
        assert_eq!(widest_for_stride(0, 24), None);
    }

    #[test]
    fn declared_pair_is_kept_when_it_fits() {
        let solver = Solver::new(1200, 24, dims(8, 50));
        assert_eq!(solver.solve(), Ok(dims(8, 50)));
    }

    #[test]
    fn width_is_solved_from_declared_height() {
        let solver = Solver::new(1200, 24, dims(999, 50));
        assert_eq!(solver.solve(), Ok(dims(8, 50)));
    }

    #[test]
    fn height_is_solved_from_declared_width() {
        let solver = Solver::new(1200, 24, dims(8, 7));
        assert_eq!(solver.solve(), Ok(dims(8, 50)));
    }

    #[test]
    fn zero_height_is_held_at_one() {
        // one row of 400 px at 24 bpp
        let solver = Solver::new(1200, 24, dims(5, 0));
        assert_eq!(solver.solve(), Ok(dims(400, 1)));
    }

    #[test]
    fn prime_byte_count_has_no_fit() {
        let solver = Solver::new(1201, 24, dims(8, 7));
        assert_eq!(
            solver.solve(),
            Err(Error::NoConsistentDimensions {
                pixel_bytes: 1201,
                bit_depth: 24
            })
        );
    }

    #[test]
    fn candidates_are_ranked_by_distance() {
        // 24990 = 2 * 3 * 5 * 7 * 7 * 17 four-byte pixels
        let solver = Solver::new(4 * 24990, 32, dims(100, 1000));
        assert!(solver.solve().is_err());

        let widths: Vec<u32> = solver
            .enumerate(5)
            .unwrap()
            .iter()
            .map(|c| c.dimensions.width)
            .collect();
        assert_eq!(widths, vec![98, 102, 105]);
    }

    #[test]
    fn moved_height_wins_a_tie() {
        let solver = Solver::new(96, 32, dims(10, 10));
        let ranked = solver.enumerate(2).unwrap();

        let order: Vec<(Dimensions, Axis)> =
            ranked.iter().map(|c| (c.dimensions, c.varied)).collect();
        assert_eq!(
            order,
            vec![
                (dims(3, 8), Axis::Height),
                (dims(2, 12), Axis::Height),
                (dims(8, 3), Axis::Width),
                (dims(12, 2), Axis::Width),
            ]
        );
        assert!(ranked.iter().all(|c| c.distance == 2));
    }

    #[test]
    fn held_height_is_labelled_as_a_width_move() {
        // 8x50 comes out of the height search at the declared height
        let solver = Solver::new(1200, 24, dims(7, 50));
        let ranked = solver.enumerate(2).unwrap();

        let found: Vec<(Dimensions, Axis, u32)> = ranked
            .iter()
            .map(|c| (c.dimensions, c.varied, c.distance))
            .collect();
        assert_eq!(
            found,
            vec![
                (dims(7, 50), Axis::Width, 0),
                (dims(6, 60), Axis::Width, 1),
                (dims(8, 50), Axis::Width, 1),
                (dims(5, 75), Axis::Width, 2),
            ]
        );
    }

    #[test]
    fn duplicate_pairs_keep_their_best_rank() {
        let solver = Solver::new(1200, 24, dims(7, 50));
        let ranked = solver.enumerate(1).unwrap();
        assert_eq!(
            ranked.iter().filter(|c| c.dimensions == dims(8, 50)).count(),
            1
        );
    }

    #[test]
    fn candidate_sequence_restarts() {
        let solver = Solver::new(96, 32, dims(10, 10));
        let sequence = solver.candidates(2);
        let first: Vec<Candidate> = sequence.clone().collect();
        let second: Vec<Candidate> = sequence.collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 4);
    }

    #[test]
    fn empty_neighborhood_has_no_match() {
        let solver = Solver::new(1201, 24, dims(8, 7));
        assert!(solver.enumerate(3).is_err());
    }

    #[test]
    fn best_effort_keeps_declared_width() {
        let solver = Solver::new(1201, 24, dims(8, 7));
        assert_eq!(solver.best_effort(), dims(8, 50));
    }

    #[test]
    fn best_effort_shrinks_width_to_available_bytes() {
        let solver = Solver::new(10, 24, dims(100, 100));
        assert_eq!(solver.best_effort(), dims(2, 1));

        let solver = Solver::new(2, 24, dims(100, 100));
        assert_eq!(solver.best_effort(), dims(1, 1));
    }
}
