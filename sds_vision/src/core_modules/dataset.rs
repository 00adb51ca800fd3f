// THEORY:
// The `dataset` module decodes the classic handwritten-digit IDX files into `Image`s.
// It is the bridge between raw bytes on disk and the image-level API used by the
// rest of the system.
//
// Layout (all header integers big-endian u32):
// - image file: magic 0x00000803, count, rows, cols, then `count * rows * cols`
//   unsigned bytes, one per pixel, row-major.
// - label file: magic 0x00000801, count, then `count` unsigned bytes.
//
// Decoding is strict: a wrong magic number or a payload shorter than the header
// declares fails immediately rather than yielding a partial dataset. `max_items`
// caps how many records are decoded, so a short run never reads a whole file.
// Header counts and sizes are never trusted for allocation: buffers grow with the
// bytes that actually arrive.

use crate::core_modules::image::{Grid, Image, Label};
use crate::error::DatasetError;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const IMAGE_MAGIC: u32 = 0x0000_0803;
pub const LABEL_MAGIC: u32 = 0x0000_0801;

pub const TRAIN_IMAGES: &str = "train-images-idx3-ubyte";
pub const TRAIN_LABELS: &str = "train-labels-idx1-ubyte";
pub const TEST_IMAGES: &str = "t10k-images-idx3-ubyte";
pub const TEST_LABELS: &str = "t10k-labels-idx1-ubyte";

fn read_u32<R: Read>(reader: &mut R, what: &'static str) -> Result<u32, DatasetError> {
    let mut buf = [0u8; 4];
    read_exact_or_truncated(reader, &mut buf, what)?;
    Ok(u32::from_be_bytes(buf))
}

fn read_exact_or_truncated<R: Read>(
    reader: &mut R,
    buf: &mut [u8],
    what: &'static str,
) -> Result<(), DatasetError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(DatasetError::Truncated {
                    what,
                    expected: buf.len(),
                    actual: filled,
                });
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

fn check_magic(expected: u32, actual: u32) -> Result<(), DatasetError> {
    if actual != expected {
        return Err(DatasetError::BadMagic { expected, actual });
    }
    Ok(())
}

fn take(count: u32, max_items: Option<usize>) -> usize {
    let count = count as usize;
    max_items.map_or(count, |max| max.min(count))
}

// Upper bound on buffer space reserved from header values alone; anything larger
// grows only as bytes actually arrive.
const PREALLOC_LIMIT: usize = 1 << 16;

/// Reads exactly `len` bytes into `buf`, reserving at most `PREALLOC_LIMIT` up front.
fn read_record<R: Read>(
    reader: &mut R,
    len: usize,
    buf: &mut Vec<u8>,
    what: &'static str,
) -> Result<(), DatasetError> {
    buf.clear();
    buf.reserve(len.min(PREALLOC_LIMIT));
    reader.by_ref().take(len as u64).read_to_end(buf)?;
    if buf.len() < len {
        return Err(DatasetError::Truncated {
            what,
            expected: len,
            actual: buf.len(),
        });
    }
    Ok(())
}

fn record_size(rows: u32, cols: u32) -> Result<usize, DatasetError> {
    (rows as usize)
        .checked_mul(cols as usize)
        .filter(|&size| size > 0)
        .ok_or_else(|| DatasetError::BadHeader {
            what: "image dimensions",
            detail: format!("{rows}x{cols} is not a usable record size"),
        })
}

/// Decodes an IDX image stream into brightness grids.
pub fn read_images<R: Read>(
    reader: &mut R,
    max_items: Option<usize>,
) -> Result<Vec<Grid>, DatasetError> {
    check_magic(IMAGE_MAGIC, read_u32(reader, "image header")?)?;
    let count = read_u32(reader, "image header")?;
    let rows = read_u32(reader, "image header")?;
    let cols = read_u32(reader, "image header")?;
    let size = record_size(rows, cols)?;
    let wanted = take(count, max_items);

    debug!(count, rows, cols, wanted, "decoding image records");

    let mut record = Vec::new();
    let mut grids = Vec::with_capacity(wanted.min(PREALLOC_LIMIT / size).max(1));
    for _ in 0..wanted {
        read_record(reader, size, &mut record, "image record")?;
        let grid: Grid = record
            .chunks(cols as usize)
            .map(|row| row.iter().map(|&byte| u32::from(byte)).collect::<Vec<_>>())
            .collect();
        grids.push(grid);
    }
    Ok(grids)
}

/// Decodes an IDX label stream.
pub fn read_labels<R: Read>(
    reader: &mut R,
    max_items: Option<usize>,
) -> Result<Vec<Label>, DatasetError> {
    check_magic(LABEL_MAGIC, read_u32(reader, "label header")?)?;
    let count = read_u32(reader, "label header")?;
    let wanted = take(count, max_items);

    let mut labels = Vec::new();
    read_record(reader, wanted, &mut labels, "label records")?;
    Ok(labels)
}

fn open(path: &Path) -> Result<BufReader<File>, DatasetError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| DatasetError::Open {
            path: path.to_path_buf(),
            source,
        })
}

/// Loads a paired image/label file set. Each image's `index` is its record number.
pub fn load(
    images_path: &Path,
    labels_path: &Path,
    max_items: Option<usize>,
) -> Result<Vec<Image>, DatasetError> {
    let grids = read_images(&mut open(images_path)?, max_items)?;
    let labels = read_labels(&mut open(labels_path)?, max_items)?;

    if grids.len() != labels.len() {
        return Err(DatasetError::CountMismatch {
            images: grids.len(),
            labels: labels.len(),
        });
    }

    let images = grids
        .into_iter()
        .zip(labels)
        .enumerate()
        .map(|(number, (grid, label))| Image::from_grid(grid, Some(label), Some(number)))
        .collect::<Result<Vec<_>, _>>()?;

    info!(path = %images_path.display(), count = images.len(), "loaded images");
    Ok(images)
}

/// The standard training/testing file pair inside a dataset directory.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub images: PathBuf,
    pub labels: PathBuf,
}

impl Dataset {
    /// The 60k training split.
    pub fn training(dir: &Path) -> Self {
        Self {
            images: dir.join(TRAIN_IMAGES),
            labels: dir.join(TRAIN_LABELS),
        }
    }

    /// The 10k testing split.
    pub fn testing(dir: &Path) -> Self {
        Self {
            images: dir.join(TEST_IMAGES),
            labels: dir.join(TEST_LABELS),
        }
    }

    pub fn load(&self, max_items: Option<usize>) -> Result<Vec<Image>, DatasetError> {
        load(&self.images, &self.labels, max_items)
    }
}

fn header_field(value: usize, what: &'static str) -> Result<u32, DatasetError> {
    u32::try_from(value).map_err(|_| DatasetError::BadHeader {
        what,
        detail: format!("{value} does not fit in a u32 header field"),
    })
}

/// Serialises grids and labels in IDX layout. Used to build fixtures.
pub fn encode(grids: &[Grid], labels: &[Label]) -> Result<(Vec<u8>, Vec<u8>), DatasetError> {
    let rows = grids.first().map_or(0, Vec::len);
    let cols = grids.first().and_then(|g| g.first()).map_or(0, Vec::len);

    let mut images = Vec::with_capacity(16 + grids.len() * rows * cols);
    images.extend(IMAGE_MAGIC.to_be_bytes());
    images.extend(header_field(grids.len(), "image count")?.to_be_bytes());
    images.extend(header_field(rows, "image rows")?.to_be_bytes());
    images.extend(header_field(cols, "image columns")?.to_be_bytes());
    for grid in grids {
        for row in grid {
            images.extend(row.iter().map(|&value| value.min(255) as u8));
        }
    }

    let mut label_bytes = Vec::with_capacity(8 + labels.len());
    label_bytes.extend(LABEL_MAGIC.to_be_bytes());
    label_bytes.extend(header_field(labels.len(), "label count")?.to_be_bytes());
    label_bytes.extend_from_slice(labels);

    Ok((images, label_bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn fixture() -> (Vec<Grid>, Vec<Label>) {
        let grids = vec![
            vec![vec![0, 255, 3], vec![4, 5, 6]],
            vec![vec![9, 8, 7], vec![6, 5, 4]],
            vec![vec![1, 1, 1], vec![2, 2, 2]],
        ];
        (grids, vec![3, 1, 4])
    }

    #[test]
    fn decodes_header_and_records() {
        let (grids, labels) = fixture();
        let (image_bytes, label_bytes) = encode(&grids, &labels).unwrap();

        let decoded = read_images(&mut Cursor::new(image_bytes), None).unwrap();
        assert_eq!(decoded, grids);
        let decoded = read_labels(&mut Cursor::new(label_bytes), None).unwrap();
        assert_eq!(decoded, labels);
    }

    #[test]
    fn max_items_caps_the_records_read() {
        let (grids, labels) = fixture();
        let (image_bytes, label_bytes) = encode(&grids, &labels).unwrap();

        let decoded = read_images(&mut Cursor::new(image_bytes), Some(2)).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[1], grids[1]);
        let decoded = read_labels(&mut Cursor::new(label_bytes), Some(100)).unwrap();
        assert_eq!(decoded, labels);
    }

    #[test]
    fn wrong_magic_is_rejected() {
        let (grids, labels) = fixture();
        let (image_bytes, label_bytes) = encode(&grids, &labels).unwrap();

        let err = read_images(&mut Cursor::new(label_bytes), None).unwrap_err();
        assert!(matches!(
            err,
            DatasetError::BadMagic { expected: IMAGE_MAGIC, actual: LABEL_MAGIC }
        ));
        let err = read_labels(&mut Cursor::new(image_bytes), None).unwrap_err();
        assert!(matches!(err, DatasetError::BadMagic { .. }));
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let (grids, labels) = fixture();
        let (mut image_bytes, mut label_bytes) = encode(&grids, &labels).unwrap();
        image_bytes.truncate(image_bytes.len() - 1);
        label_bytes.truncate(9);

        let err = read_images(&mut Cursor::new(image_bytes), None).unwrap_err();
        assert!(matches!(err, DatasetError::Truncated { what: "image record", .. }));
        let err = read_labels(&mut Cursor::new(label_bytes), None).unwrap_err();
        assert!(matches!(err, DatasetError::Truncated { expected: 3, actual: 1, .. }));

        let err = read_images(&mut Cursor::new(vec![0, 0, 8]), None).unwrap_err();
        assert!(matches!(err, DatasetError::Truncated { what: "image header", .. }));
    }

    fn header(magic: u32, fields: &[u32]) -> Vec<u8> {
        std::iter::once(magic)
            .chain(fields.iter().copied())
            .flat_map(u32::to_be_bytes)
            .collect()
    }

    #[test]
    fn oversized_declarations_fail_without_reserving_them() {
        let mut bytes = header(IMAGE_MAGIC, &[u32::MAX, 28, 28]);
        bytes.extend([7u8; 100]);
        let err = read_images(&mut Cursor::new(bytes), None).unwrap_err();
        assert!(matches!(
            err,
            DatasetError::Truncated { what: "image record", expected: 784, actual: 100 }
        ));

        let mut bytes = header(LABEL_MAGIC, &[u32::MAX]);
        bytes.extend([1u8, 2, 3]);
        let err = read_labels(&mut Cursor::new(bytes), None).unwrap_err();
        assert!(matches!(err, DatasetError::Truncated { what: "label records", actual: 3, .. }));
    }

    #[test]
    fn unusable_record_size_is_rejected() {
        let bytes = header(IMAGE_MAGIC, &[1, 0, 28]);
        let err = read_images(&mut Cursor::new(bytes), None).unwrap_err();
        assert!(matches!(err, DatasetError::BadHeader { what: "image dimensions", .. }));

        // Fits in a 64-bit usize, so only the missing payload stops it.
        let bytes = header(IMAGE_MAGIC, &[1, u32::MAX, u32::MAX]);
        let err = read_images(&mut Cursor::new(bytes), None).unwrap_err();
        assert!(matches!(
            err,
            DatasetError::BadHeader { .. } | DatasetError::Truncated { actual: 0, .. }
        ));
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn header_fields_must_fit_in_u32() {
        assert_eq!(header_field(28, "image rows").unwrap(), 28);
        let err = header_field(u32::MAX as usize + 1, "image count").unwrap_err();
        assert!(matches!(err, DatasetError::BadHeader { what: "image count", .. }));
    }

    #[test]
    fn load_pairs_labels_and_indices() {
        let dir = tempfile::tempdir().unwrap();
        let (grids, labels) = fixture();
        let (image_bytes, label_bytes) = encode(&grids, &labels).unwrap();
        std::fs::write(dir.path().join(TEST_IMAGES), image_bytes).unwrap();
        std::fs::write(dir.path().join(TEST_LABELS), label_bytes).unwrap();

        let images = Dataset::testing(dir.path()).load(None).unwrap();
        assert_eq!(images.len(), 3);
        assert_eq!(images[2].label(), Some(4));
        assert_eq!(images[2].index(), Some(2));
        assert_eq!(images[0].width(), 3);
        assert_eq!(images[0].height(), 2);
        assert_eq!(images[0].row(0), Some(&[0, 255, 3][..]));
    }

    #[test]
    fn load_rejects_count_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let (grids, labels) = fixture();
        let (image_bytes, _) = encode(&grids, &labels).unwrap();
        let (_, label_bytes) = encode(&grids, &labels[..2]).unwrap();
        std::fs::write(dir.path().join(TRAIN_IMAGES), image_bytes).unwrap();
        std::fs::write(dir.path().join(TRAIN_LABELS), label_bytes).unwrap();

        let err = Dataset::training(dir.path()).load(None).unwrap_err();
        assert!(matches!(err, DatasetError::CountMismatch { images: 3, labels: 2 }));
    }

    #[test]
    fn missing_file_names_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = Dataset::training(dir.path()).load(None).unwrap_err();
        match err {
            DatasetError::Open { path, .. } => assert!(path.ends_with(TRAIN_IMAGES)),
            other => panic!("unexpected error: {other}"),
        }
    }
}
