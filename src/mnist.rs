use crate::error::{Error, Result};
use crate::sample::{TestSample, TrainingSample};
use flate2::read::GzDecoder;
use itertools::Itertools;
use std::{fs::File, io::Read, path::Path};
use tracing::debug;

pub const IMAGE_ROWS: usize = 28;
pub const IMAGE_COLUMNS: usize = 28;
pub const INPUT_NEURONS: usize = IMAGE_ROWS * IMAGE_COLUMNS;
pub const OUTPUT_NEURONS: usize = 10;

const IMAGE_MAGIC: u32 = 2051;
const LABEL_MAGIC: u32 = 2049;

pub const TRAINING_IMAGES: &str = "train-images-idx3-ubyte.gz";
pub const TRAINING_LABELS: &str = "train-labels-idx1-ubyte.gz";
pub const TEST_IMAGES: &str = "t10k-images-idx3-ubyte.gz";
pub const TEST_LABELS: &str = "t10k-labels-idx1-ubyte.gz";

pub struct MnistData {
    pub training_data: Vec<TrainingSample>,
    pub test_data: Vec<TestSample>,
}

impl MnistData {
    /// Loads the four gzip-compressed IDX files from `dir`, keeping at most `training_limit`
    /// training samples and `test_limit` test samples (all of them when `None`).
    pub fn load(
        dir: impl AsRef<Path>,
        training_limit: Option<usize>,
        test_limit: Option<usize>,
    ) -> Result<MnistData> {
        let dir = dir.as_ref();

        let training_data = read_set(
            &dir.join(TRAINING_IMAGES),
            &dir.join(TRAINING_LABELS),
            training_limit,
        )?
        .into_iter()
        .map(|sample| sample.into_training(OUTPUT_NEURONS))
        .collect::<Result<Vec<_>>>()?;

        let test_data = Self::load_test(dir, test_limit)?;

        debug!(
            training = training_data.len(),
            test = test_data.len(),
            "loaded MNIST data"
        );

        Ok(MnistData {
            training_data,
            test_data,
        })
    }

    /// Loads only the test split, for inference.
    pub fn load_test(dir: impl AsRef<Path>, limit: Option<usize>) -> Result<Vec<TestSample>> {
        let dir = dir.as_ref();
        read_set(&dir.join(TEST_IMAGES), &dir.join(TEST_LABELS), limit)
    }
}

fn read_set(images: &Path, labels: &Path, limit: Option<usize>) -> Result<Vec<TestSample>> {
    let image_bytes = read_gz(images)?;
    let label_bytes = read_gz(labels)?;
    let mut data = images_and_labels_to_samples(&image_bytes, &label_bytes)?;
    if let Some(limit) = limit {
        data.truncate(limit);
    }
    Ok(data)
}

fn read_gz(path: &Path) -> Result<Vec<u8>> {
    let file = File::open(path).map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("{}: {e}", path.display()),
        ))
    })?;
    let mut bytes = Vec::new();
    GzDecoder::new(file).read_to_end(&mut bytes)?;
    Ok(bytes)
}

// Reads `count` big-endian 32-bit header fields from the front of an IDX file.
fn read_header(bytes: &[u8], count: usize, what: &str) -> Result<Vec<u32>> {
    if bytes.len() < count * 4 {
        return Err(Error::MalformedData(format!(
            "{what} file is too short for its {}-byte header",
            count * 4
        )));
    }
    Ok(bytes[..count * 4]
        .chunks_exact(4)
        .map(|chunk| u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// Turns the decompressed bytes of an IDX image file and an IDX label file into samples with pixel
/// values scaled to [0, 1].
///
/// The image header is four 32-bit integers: the magic number (2051), the number of images, and the
/// rows and columns per image. The label header is the magic number (2049) and the number of labels.
pub fn images_and_labels_to_samples(
    image_bytes: &[u8],
    label_bytes: &[u8],
) -> Result<Vec<TestSample>> {
    let image_header = read_header(image_bytes, 4, "image")?;
    if image_header[0] != IMAGE_MAGIC {
        return Err(Error::MalformedData(format!(
            "image file magic number is {}, expected {IMAGE_MAGIC}",
            image_header[0]
        )));
    }
    let images = image_header[1] as usize;
    let pixels = image_header[2] as usize * image_header[3] as usize;

    let label_header = read_header(label_bytes, 2, "label")?;
    if label_header[0] != LABEL_MAGIC {
        return Err(Error::MalformedData(format!(
            "label file magic number is {}, expected {LABEL_MAGIC}",
            label_header[0]
        )));
    }
    let labels = label_header[1] as usize;

    if images != labels {
        return Err(Error::MalformedData(format!(
            "{images} images but {labels} labels"
        )));
    }
    if pixels != INPUT_NEURONS {
        return Err(Error::MalformedData(format!(
            "images have {pixels} pixels, expected {INPUT_NEURONS}"
        )));
    }

    let image_payload = &image_bytes[16..];
    let label_payload = &label_bytes[8..];
    if image_payload.len() < images * pixels || label_payload.len() < labels {
        return Err(Error::MalformedData(format!(
            "payload is truncated: expected {images} images and labels"
        )));
    }

    let mut data = Vec::with_capacity(images);

    // Chunk the pixels into one image per chunk and zip each with its label. Every image becomes a
    // [784 x 1] column with each byte scaled from 0..=255 down to 0.0..=1.0.
    for (image_chunk, &label) in image_payload[..images * pixels]
        .iter()
        .chunks(pixels)
        .into_iter()
        .zip(label_payload[..labels].iter())
    {
        let input = image_chunk
            .map(|&value| [value as f64 / 255.0])
            .collect::<Vec<_>>()
            .into();

        let expected_answer = label as usize;
        if expected_answer >= OUTPUT_NEURONS {
            return Err(Error::MalformedData(format!(
                "label {expected_answer} is not a digit"
            )));
        }

        data.push(TestSample {
            input,
            expected_answer,
        });
    }

    Ok(data)
}

// Renders a digit as ASCII shading, one text line per pixel row.
pub fn render(sample: &TestSample) -> String {
    let mut out = String::with_capacity(INPUT_NEURONS + IMAGE_ROWS);

    for (index, activation) in sample.input.iter().enumerate() {
        if index > 0 && index % IMAGE_COLUMNS == 0 {
            out.push('\n');
        }

        out.push(match activation {
            a if *a < 0.2 => ' ',
            a if *a < 0.4 => '░',
            a if *a < 0.6 => '▒',
            a if *a < 0.8 => '▓',
            _ => '█',
        });
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::argmax;
    use flate2::{Compression, write::GzEncoder};
    use std::io::Write;

    fn idx_images(count: u32, pixel: impl Fn(usize, usize) -> u8) -> Vec<u8> {
        let mut bytes = Vec::new();
        for field in [IMAGE_MAGIC, count, 28, 28] {
            bytes.extend_from_slice(&field.to_be_bytes());
        }
        for image in 0..count as usize {
            for p in 0..INPUT_NEURONS {
                bytes.push(pixel(image, p));
            }
        }
        bytes
    }

    fn idx_labels(labels: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&LABEL_MAGIC.to_be_bytes());
        bytes.extend_from_slice(&(labels.len() as u32).to_be_bytes());
        bytes.extend_from_slice(labels);
        bytes
    }

    fn write_gz(path: &Path, bytes: &[u8]) {
        let mut encoder = GzEncoder::new(File::create(path).unwrap(), Compression::fast());
        encoder.write_all(bytes).unwrap();
        encoder.finish().unwrap();
    }

    #[test]
    fn parses_images_and_scales_pixels() {
        let images = idx_images(2, |image, p| if p == image { 255 } else { 51 });
        let labels = idx_labels(&[7, 3]);

        let data = images_and_labels_to_samples(&images, &labels).unwrap();

        assert_eq!(data.len(), 2);
        assert_eq!(data[0].expected_answer, 7);
        assert_eq!(data[1].expected_answer, 3);
        assert_eq!(data[0].input.dim(), (INPUT_NEURONS, 1));
        assert_eq!(data[0].input[[0, 0]], 1.0);
        assert_eq!(data[0].input[[1, 0]], 0.2);
        assert_eq!(data[1].input[[1, 0]], 1.0);
    }

    #[test]
    fn rejects_wrong_magic_numbers() {
        let mut images = idx_images(1, |_, _| 0);
        images[3] = 0;
        let labels = idx_labels(&[1]);
        assert!(matches!(
            images_and_labels_to_samples(&images, &labels),
            Err(Error::MalformedData(_))
        ));

        let images = idx_images(1, |_, _| 0);
        assert!(images_and_labels_to_samples(&images, &images).is_err());
    }

    #[test]
    fn rejects_count_mismatch_and_truncation() {
        let images = idx_images(2, |_, _| 0);
        assert!(images_and_labels_to_samples(&images, &idx_labels(&[1])).is_err());

        let truncated = &images[..images.len() - 1];
        assert!(images_and_labels_to_samples(truncated, &idx_labels(&[1, 2])).is_err());

        assert!(images_and_labels_to_samples(&images[..10], &idx_labels(&[1, 2])).is_err());
    }

    #[test]
    fn rejects_labels_that_are_not_digits() {
        let images = idx_images(1, |_, _| 0);
        assert!(matches!(
            images_and_labels_to_samples(&images, &idx_labels(&[10])),
            Err(Error::MalformedData(_))
        ));
    }

    #[test]
    fn loads_gzipped_files_with_limits() {
        let dir = tempfile::tempdir().unwrap();
        write_gz(&dir.path().join(TRAINING_IMAGES), &idx_images(5, |_, _| 128));
        write_gz(&dir.path().join(TRAINING_LABELS), &idx_labels(&[0, 1, 2, 3, 4]));
        write_gz(&dir.path().join(TEST_IMAGES), &idx_images(3, |_, _| 0));
        write_gz(&dir.path().join(TEST_LABELS), &idx_labels(&[9, 8, 7]));

        let data = MnistData::load(dir.path(), Some(4), None).unwrap();

        assert_eq!(data.training_data.len(), 4);
        assert_eq!(data.test_data.len(), 3);
        assert_eq!(data.training_data[2].expected_output.dim(), (OUTPUT_NEURONS, 1));
        assert_eq!(argmax(&data.training_data[2].expected_output), Some(2));
        assert_eq!(data.test_data[0].expected_answer, 9);
    }

    #[test]
    fn missing_files_name_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = MnistData::load_test(dir.path(), None).unwrap_err();
        assert!(err.to_string().contains(TEST_IMAGES));
    }

    #[test]
    fn render_shades_by_intensity() {
        let images = idx_images(1, |_, p| if p < 28 { 255 } else { 0 });
        let data = images_and_labels_to_samples(&images, &idx_labels(&[1])).unwrap();
        let rendered = render(&data[0]);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), IMAGE_ROWS);
        assert_eq!(lines[0], "█".repeat(IMAGE_COLUMNS));
        assert_eq!(lines[1], " ".repeat(IMAGE_COLUMNS));
    }
}
