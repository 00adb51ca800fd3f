// THEORY:
// The `Image` module is the leaf of the vision system. An `Image` is a "dumb",
// immutable rectangular grid of brightness values with an optional digit label and
// an optional provenance index (its position in the source dataset). It knows how to
// answer one question about itself, "how bright is this position?", and nothing
// about other images. Comparisons between positions and between images belong to
// the `microtest` module.
//
// Construction has two mutually exclusive modes:
// 1.  **From a grid**: the width and height are inferred from the rows. Every row
//     must have the same length; a ragged grid is rejected, never padded.
// 2.  **Synthetic**: given a width and height, every cell is drawn from an injected
//     random source in `[0, width * height)`. This is for fixtures only, and the
//     random source is always supplied by the caller so construction stays
//     reproducible under a seeded generator.
//
// Pixels are stored flat in row-major order; `rows()` gives back the 2D view.

use crate::error::VisionError;
use rand::Rng;
use std::fmt;

pub type Brightness = u32;
pub type Label = u8;
pub type Grid = Vec<Vec<Brightness>>;

/// A pixel coordinate. `x` is the column, `y` is the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Position {
    pub x: usize,
    pub y: usize,
}

impl Position {
    pub const fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }
}

impl From<(usize, usize)> for Position {
    fn from((x, y): (usize, usize)) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// An immutable grid of brightness values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    /// The number of columns.
    width: usize,
    /// The number of rows.
    height: usize,
    /// Row-major brightness values, `width * height` long.
    pixels: Vec<Brightness>,
    /// The digit class, when known.
    label: Option<Label>,
    /// The position of this image in the dataset it was decoded from.
    index: Option<usize>,
}

impl Image {
    /// Builds an image from a pre-built grid.
    pub fn from_grid(
        pixels: Grid,
        label: Option<Label>,
        index: Option<usize>,
    ) -> Result<Self, VisionError> {
        let mut builder = ImageBuilder::new().pixels(pixels);
        builder.label = label;
        builder.index = index;
        builder.build_without_rng()
    }

    /// Builds a `width x height` image filled from `rng`.
    pub fn synthetic<R: Rng + ?Sized>(
        width: usize,
        height: usize,
        rng: &mut R,
        label: Option<Label>,
        index: Option<usize>,
    ) -> Result<Self, VisionError> {
        let mut builder = ImageBuilder::new().dimensions(width, height);
        builder.label = label;
        builder.index = index;
        builder.build(rng)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn label(&self) -> Option<Label> {
        self.label
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }

    /// Total number of pixel positions.
    pub fn area(&self) -> usize {
        self.width * self.height
    }

    /// True when `other` has the same width and height.
    pub fn same_shape(&self, other: &Image) -> bool {
        self.width == other.width && self.height == other.height
    }

    pub fn contains(&self, position: Position) -> bool {
        position.x < self.width && position.y < self.height
    }

    /// The brightness at `position`, where `position` is (column, row).
    pub fn brightness(&self, position: Position) -> Result<Brightness, VisionError> {
        if !self.contains(position) {
            return Err(VisionError::PositionOutOfBounds {
                x: position.x,
                y: position.y,
                width: self.width,
                height: self.height,
            });
        }
        Ok(self.pixels[position.y * self.width + position.x])
    }

    /// One row of the grid.
    pub fn row(&self, row: usize) -> Option<&[Brightness]> {
        if row >= self.height {
            return None;
        }
        let start = row * self.width;
        Some(&self.pixels[start..start + self.width])
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Brightness]> {
        self.pixels.chunks(self.width)
    }

    /// The flat row-major pixel buffer.
    pub fn as_raw(&self) -> &[Brightness] {
        &self.pixels
    }
}

impl fmt::Display for Image {
    /// Renders the grid as aligned columns followed by the label.
    ///
    /// The column width is the digit count of the largest synthetic value,
    /// `width * height - 1`, so alignment does not depend on the actual values.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let column_width = (self.area().saturating_sub(1)).to_string().len();
        for row in self.rows() {
            let mut first = true;
            for value in row {
                if !first {
                    f.write_str(" ")?;
                }
                write!(f, "{value:>column_width$}")?;
                first = false;
            }
            f.write_str("\n")?;
        }
        match self.label {
            Some(label) => write!(f, "Label: {label}"),
            None => write!(f, "Label: None"),
        }
    }
}

/// Collects the construction inputs for an `Image` and checks that exactly one of
/// "grid" or "dimensions" was supplied.
#[derive(Debug, Default, Clone)]
pub struct ImageBuilder {
    grid: Option<Grid>,
    dimensions: Option<(usize, usize)>,
    label: Option<Label>,
    index: Option<usize>,
}

impl ImageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pixels(mut self, grid: Grid) -> Self {
        self.grid = Some(grid);
        self
    }

    pub fn dimensions(mut self, width: usize, height: usize) -> Self {
        self.dimensions = Some((width, height));
        self
    }

    pub fn label(mut self, label: Label) -> Self {
        self.label = Some(label);
        self
    }

    pub fn index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    /// Builds the image. `rng` is only drawn from in synthetic mode.
    pub fn build<R: Rng + ?Sized>(self, rng: &mut R) -> Result<Image, VisionError> {
        match (self.grid, self.dimensions) {
            (Some(grid), None) => Self::from_rows(grid, self.label, self.index),
            (None, Some((width, height))) => {
                Self::filled(width, height, rng, self.label, self.index)
            }
            (Some(_), Some(_)) => Err(VisionError::invalid_construction(
                "either pixels or width and height, not both",
            )),
            (None, None) => Err(VisionError::invalid_construction(
                "either pixels or width and height",
            )),
        }
    }

    /// Grid-mode build for callers that have no random source at hand.
    pub fn build_without_rng(self) -> Result<Image, VisionError> {
        match (self.grid, self.dimensions) {
            (Some(grid), None) => Self::from_rows(grid, self.label, self.index),
            (None, Some(_)) => Err(VisionError::invalid_construction(
                "synthetic images need a random source",
            )),
            (Some(_), Some(_)) => Err(VisionError::invalid_construction(
                "either pixels or width and height, not both",
            )),
            (None, None) => Err(VisionError::invalid_construction(
                "either pixels or width and height",
            )),
        }
    }

    fn from_rows(
        grid: Grid,
        label: Option<Label>,
        index: Option<usize>,
    ) -> Result<Image, VisionError> {
        let height = grid.len();
        let width = grid.first().map_or(0, Vec::len);
        if height == 0 || width == 0 {
            return Err(VisionError::invalid_construction("pixel grid is empty"));
        }

        let mut pixels = Vec::with_capacity(width * height);
        for (row_number, row) in grid.into_iter().enumerate() {
            if row.len() != width {
                return Err(VisionError::RaggedRow {
                    row: row_number,
                    expected: width,
                    actual: row.len(),
                });
            }
            pixels.extend(row);
        }

        Ok(Image { width, height, pixels, label, index })
    }

    fn filled<R: Rng + ?Sized>(
        width: usize,
        height: usize,
        rng: &mut R,
        label: Option<Label>,
        index: Option<usize>,
    ) -> Result<Image, VisionError> {
        if width == 0 || height == 0 {
            return Err(VisionError::invalid_construction(
                "width and height must be positive",
            ));
        }
        let area = width * height;
        let upper = Brightness::try_from(area).map_err(|_| {
            VisionError::invalid_construction(format!("{width}x{height} is too large"))
        })?;
        let pixels = (0..area).map(|_| rng.gen_range(0..upper)).collect();
        Ok(Image { width, height, pixels, label, index })
    }
}
