// THEORY:
// The `microtest` module is the analytical core of the classifier. Where `Image` is
// a dumb container, a `MicrotestSpace` turns one fixed reference image into a huge,
// indexable universe of tiny boolean probes ("micro-tests"), each asking whether a
// hypothesis image agrees with the reference about the direction of brightness
// change between two pixel positions.
//
// Key architectural principles:
// 1.  **Relative, not absolute**: The atomic comparison is the clamped sign of
//     `brightness(b) - brightness(a)`: darker (-1), same (0) or brighter (+1). Two
//     handwritten samples of the same digit rarely share pixel values, but they do
//     share the shape of their strokes, and the sign captures exactly that.
// 2.  **Lazy combinatorial indexing**: A space over a `W x H` grid holds `(W*H)^2`
//     tests, one per ordered pair of positions (a position paired with itself
//     included). Nothing is materialised. A flat index is decoded on demand as a
//     four-digit mixed-radix number with bases `[W, H, W, H]`, least significant
//     digit first being `y2`:
//
//         y2 = k mod H
//         x2 = (k / H) mod W
//         y1 = (k / (H*W)) mod H
//         x1 = (k / (H*W*H)) mod W
//
//     This digit order is a contract: persisted or logged indices must keep
//     decoding to the same pair.
// 3.  **Pure evaluation**: A `Microtest` is a plain value holding the reference and
//     the two decoded positions. Evaluating it reads two immutable grids and nothing
//     else, so any number of workers may evaluate tests in any order.
// 4.  **Shape precondition**: A hypothesis must have the reference's dimensions. A
//     mismatch is reported as a shape error before any pixel is read.

use crate::core_modules::image::{Image, Position};
use crate::error::VisionError;
use tracing::trace;

/// The clamped brightness gradient between two positions: -1, 0 or +1.
pub type Relation = i8;

/// The relative-brightness relation of `image` going from `a` to `b`.
pub fn relation(image: &Image, a: Position, b: Position) -> Result<Relation, VisionError> {
    let a_level = i64::from(image.brightness(a)?);
    let b_level = i64::from(image.brightness(b)?);
    let diff = b_level - a_level;

    trace!(%a, a_level, %b, b_level, diff, "relation");

    Ok(diff.clamp(-1, 1) as Relation)
}

/// An indexable family of boolean tests over hypotheses of type `H`.
///
/// This is the contract the swarm driver consumes: it only ever asks how many
/// tests exist and whether test `index` passes for a given hypothesis.
pub trait Microtests<H> {
    fn size(&self) -> usize;

    fn run(&self, index: usize, hypothesis: &H) -> Result<bool, VisionError>;
}

/// All pairwise brightness tests against a fixed reference image.
#[derive(Debug, Clone)]
pub struct MicrotestSpace {
    reference: Image,
    width: usize,
    height: usize,
}

impl MicrotestSpace {
    pub fn new(reference: Image) -> Self {
        Self {
            width: reference.width(),
            height: reference.height(),
            reference,
        }
    }

    /// The image every test compares against.
    pub fn reference(&self) -> &Image {
        &self.reference
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// `(width * height)^2`: one test per ordered pair of positions.
    pub fn size(&self) -> usize {
        let area = self.width * self.height;
        area * area
    }

    fn check_index(&self, index: usize) -> Result<(), VisionError> {
        let size = self.size();
        if index >= size {
            return Err(VisionError::TestIndexOutOfRange { index, size });
        }
        Ok(())
    }

    /// Decodes a flat test index into its ordered position pair `(a, b)`.
    pub fn positions(&self, index: usize) -> Result<(Position, Position), VisionError> {
        self.check_index(index)?;

        let (w, h) = (self.width, self.height);
        let y2 = index % h;
        let x2 = index / h % w;
        let y1 = index / (h * w) % h;
        let x1 = index / (h * w * h) % w;

        Ok((Position::new(x1, y1), Position::new(x2, y2)))
    }

    /// Inverse of [`positions`](Self::positions).
    pub fn index_of(&self, a: Position, b: Position) -> Result<usize, VisionError> {
        for position in [a, b] {
            if !self.reference.contains(position) {
                return Err(VisionError::PositionOutOfBounds {
                    x: position.x,
                    y: position.y,
                    width: self.width,
                    height: self.height,
                });
            }
        }
        let (w, h) = (self.width, self.height);
        Ok(b.y + h * (b.x + w * (a.y + h * a.x)))
    }

    /// The test at `index`, bound to this space's reference image.
    pub fn test_at(&self, index: usize) -> Result<Microtest<'_>, VisionError> {
        let (a, b) = self.positions(index)?;
        Ok(Microtest {
            reference: &self.reference,
            a,
            b,
        })
    }
}

impl Microtests<Image> for MicrotestSpace {
    fn size(&self) -> usize {
        MicrotestSpace::size(self)
    }

    fn run(&self, index: usize, hypothesis: &Image) -> Result<bool, VisionError> {
        self.test_at(index)?.evaluate(hypothesis)
    }
}

/// A single pairwise brightness probe, bound to a reference image.
#[derive(Debug, Clone, Copy)]
pub struct Microtest<'a> {
    reference: &'a Image,
    a: Position,
    b: Position,
}

impl<'a> Microtest<'a> {
    pub fn a(&self) -> Position {
        self.a
    }

    pub fn b(&self) -> Position {
        self.b
    }

    /// True when `hypothesis` agrees with the reference about the direction of
    /// brightness change from `a` to `b`.
    pub fn evaluate(&self, hypothesis: &Image) -> Result<bool, VisionError> {
        if !hypothesis.same_shape(self.reference) {
            return Err(VisionError::ShapeMismatch {
                expected_width: self.reference.width(),
                expected_height: self.reference.height(),
                actual_width: hypothesis.width(),
                actual_height: hypothesis.height(),
            });
        }

        let hypothesis_relation = relation(hypothesis, self.a, self.b)?;
        let reference_relation = relation(self.reference, self.a, self.b)?;

        Ok(hypothesis_relation == reference_relation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashSet;

    fn reference() -> Image {
        Image::from_grid(vec![vec![0, 5], vec![10, 1]], Some(4), Some(0)).unwrap()
    }

    fn synthetic(width: usize, height: usize, seed: u64) -> Image {
        Image::synthetic(width, height, &mut StdRng::seed_from_u64(seed), None, None).unwrap()
    }

    #[test]
    fn size_is_area_squared() {
        for (width, height) in [(1, 1), (2, 2), (3, 2), (1, 5), (28, 28)] {
            let space = MicrotestSpace::new(synthetic(width, height, 0));
            assert_eq!(space.size(), (width * height).pow(2));
        }
    }

    #[test]
    fn index_decoding_is_a_bijection() {
        for (width, height) in [(2, 2), (3, 2), (2, 3), (1, 4)] {
            let space = MicrotestSpace::new(synthetic(width, height, 1));
            let mut seen = HashSet::new();
            for index in 0..space.size() {
                let (a, b) = space.positions(index).unwrap();
                assert!(a.x < width && a.y < height && b.x < width && b.y < height);
                assert!(seen.insert((a, b)), "{width}x{height}: duplicate pair at {index}");
                assert_eq!(space.index_of(a, b).unwrap(), index);
            }
            assert_eq!(seen.len(), (width * height).pow(2));
        }
    }

    #[test]
    fn digit_order_puts_y2_least_significant() {
        let space = MicrotestSpace::new(synthetic(3, 2, 2));
        // bases, least significant first: H=2 (y2), W=3 (x2), H=2 (y1), W=3 (x1)
        assert_eq!(space.positions(1).unwrap(), (Position::new(0, 0), Position::new(0, 1)));
        assert_eq!(space.positions(2).unwrap(), (Position::new(0, 0), Position::new(1, 0)));
        assert_eq!(space.positions(6).unwrap(), (Position::new(0, 1), Position::new(0, 0)));
        assert_eq!(space.positions(12).unwrap(), (Position::new(1, 0), Position::new(0, 0)));
        assert_eq!(space.positions(35).unwrap(), (Position::new(2, 1), Position::new(2, 1)));
    }

    #[test]
    fn relation_to_self_is_flat() {
        let image = synthetic(4, 4, 3);
        for y in 0..4 {
            for x in 0..4 {
                let p = Position::new(x, y);
                assert_eq!(relation(&image, p, p).unwrap(), 0);
            }
        }
    }

    #[test]
    fn relation_is_antisymmetric() {
        let image = synthetic(3, 3, 4);
        let space = MicrotestSpace::new(image.clone());
        for index in 0..space.size() {
            let (a, b) = space.positions(index).unwrap();
            assert_eq!(relation(&image, a, b).unwrap(), -relation(&image, b, a).unwrap());
        }
    }

    #[test]
    fn relation_ignores_brightness_scale() {
        let dim = Image::from_grid(vec![vec![1, 2, 2]], None, None).unwrap();
        let bright = Image::from_grid(vec![vec![10, 200, 200]], None, None).unwrap();
        let pairs = [(0, 1), (1, 2), (2, 0)];
        for (a, b) in pairs {
            let (a, b) = (Position::new(a, 0), Position::new(b, 0));
            assert_eq!(relation(&dim, a, b).unwrap(), relation(&bright, a, b).unwrap());
        }
    }

    #[test]
    fn every_test_passes_against_the_reference_itself() {
        let image = synthetic(4, 3, 5);
        let space = MicrotestSpace::new(image.clone());
        for index in 0..space.size() {
            assert!(space.test_at(index).unwrap().evaluate(&image).unwrap());
        }
    }

    #[test]
    fn two_by_two_round_trip() {
        let space = MicrotestSpace::new(reference());
        assert_eq!(space.size(), 16);

        let first = space.test_at(0).unwrap();
        assert_eq!((first.a(), first.b()), (Position::new(0, 0), Position::new(0, 0)));
        assert!(first.evaluate(&reference()).unwrap());

        // (0,0) -> (0,1) goes from brightness 0 to 10.
        let (a, b) = space.positions(1).unwrap();
        assert_eq!((a, b), (Position::new(0, 0), Position::new(0, 1)));
        assert_eq!(relation(space.reference(), a, b).unwrap(), 1);

        let flipped = Image::from_grid(vec![vec![10, 5], vec![0, 1]], None, None).unwrap();
        assert!(!space.test_at(1).unwrap().evaluate(&flipped).unwrap());
        assert!(!space.run(1, &flipped).unwrap());

        // (1,0) -> (1,1) goes from 5 to 1 in both images.
        let index = space.index_of(Position::new(1, 0), Position::new(1, 1)).unwrap();
        assert_eq!(relation(space.reference(), Position::new(1, 0), Position::new(1, 1)).unwrap(), -1);
        assert!(space.run(index, &flipped).unwrap());
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let space = MicrotestSpace::new(reference());
        let err = space.test_at(16).unwrap_err();
        assert_eq!(err, VisionError::TestIndexOutOfRange { index: 16, size: 16 });
        assert!(space.positions(usize::MAX).is_err());
        assert!(space.index_of(Position::new(2, 0), Position::new(0, 0)).is_err());
    }

    #[test]
    fn mismatched_hypothesis_is_a_shape_error() {
        let space = MicrotestSpace::new(reference());
        let wide = synthetic(3, 2, 6);
        let err = space.test_at(0).unwrap().evaluate(&wide).unwrap_err();
        assert!(err.is_shape_error());
    }

    #[test]
    fn tests_can_be_shared_across_threads() {
        let image = synthetic(3, 3, 7);
        let space = MicrotestSpace::new(image.clone());
        std::thread::scope(|scope| {
            for worker in 0..4 {
                let space = &space;
                let image = &image;
                scope.spawn(move || {
                    for index in (worker..space.size()).step_by(4) {
                        assert!(space.run(index, image).unwrap());
                    }
                });
            }
        });
    }
}
