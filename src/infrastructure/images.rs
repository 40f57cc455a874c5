//! Image fetch, normalization and storage
//!
//! Downloads a source observation's image reference, detects the actual
//! encoded format, normalizes webp payloads to jpeg, and stores the bytes
//! under `<root>/<source_id>/<part_id>/<n>.<ext>` where `n` is the next
//! unused positive integer in that directory. Every failure mode here is
//! soft: the acquirer logs and reports no-path, never propagating to the
//! reconciler.

use std::path::{Path, PathBuf};
use std::time::Duration;

use image::{ImageFormat, ImageReader};
use tracing::{debug, info, warn};

use crate::domain::models::{Part, Source};

/// Backend column ceiling for both the source URL and the stored path.
pub const PATH_MAX_CHARS: usize = 255;

/// Fetches and stores observation pictures.
#[derive(Debug, Clone)]
pub struct ImageAcquirer {
    client: reqwest::Client,
    root_dir: PathBuf,
}

impl ImageAcquirer {
    pub fn new(root_dir: impl Into<PathBuf>, download_timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(download_timeout)
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Self {
            client,
            root_dir: root_dir.into(),
        })
    }

    /// Fetch `url` and store it for `(source, part)`.
    ///
    /// Returns the stored local path, or `None` when anything along the
    /// way failed; the caller then treats the picture as absent.
    pub async fn acquire(&self, url: &str, source: &Source, part: &Part) -> Option<String> {
        if url.chars().count() > PATH_MAX_CHARS {
            warn!(
                source = %source.source_name,
                part_id = part.id,
                "image url longer than {PATH_MAX_CHARS} characters, skipping"
            );
            return None;
        }

        let bytes = match self.download(url).await {
            Some(bytes) => bytes,
            None => return None,
        };

        let dir = self.root_dir.join(source.id.to_string()).join(part.id.to_string());
        match store_normalized(&dir, &bytes) {
            Ok(Some(path)) => {
                let path_str = path.to_string_lossy().into_owned();
                debug!(source = %source.source_name, part_id = part.id, path = %path_str, "image stored");
                Some(path_str)
            }
            Ok(None) => {
                warn!(
                    source = %source.source_name,
                    part_id = part.id,
                    "stored path would exceed {PATH_MAX_CHARS} characters, skipping"
                );
                None
            }
            Err(e) => {
                info!("Can't process image with url {url}: {e:#}");
                None
            }
        }
    }

    async fn download(&self, url: &str) -> Option<Vec<u8>> {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                info!("Download image from {url} failed: {e}");
                return None;
            }
        };
        if !response.status().is_success() {
            info!("Download image from {url} failed: {}", response.status());
            return None;
        }
        match response.bytes().await {
            Ok(bytes) => Some(bytes.to_vec()),
            Err(e) => {
                info!("Download image from {url} failed mid-body: {e}");
                None
            }
        }
    }
}

/// Decode, normalize and write image bytes into `dir`, returning the
/// stored path. Webp payloads are re-encoded as jpeg; every other format
/// is stored verbatim under its detected extension. `Ok(None)` means the
/// prospective path would exceed the backend ceiling; nothing is written
/// or created in that case.
fn store_normalized(dir: &Path, bytes: &[u8]) -> anyhow::Result<Option<PathBuf>> {
    let reader = ImageReader::new(std::io::Cursor::new(bytes)).with_guessed_format()?;
    let format = reader
        .format()
        .ok_or_else(|| anyhow::anyhow!("unrecognized image format"))?;

    let stem = if dir.is_dir() { next_file_stem(dir)? } else { 1 };
    let ext = if format == ImageFormat::WebP {
        "jpg"
    } else {
        format.extensions_str().first().copied().unwrap_or("bin")
    };
    let path = dir.join(format!("{stem}.{ext}"));
    if path.to_string_lossy().chars().count() > PATH_MAX_CHARS {
        return Ok(None);
    }

    std::fs::create_dir_all(dir)?;
    if format == ImageFormat::WebP {
        let decoded = reader.decode()?;
        // Jpeg has no alpha channel; flatten before encoding.
        decoded.to_rgb8().save_with_format(&path, ImageFormat::Jpeg)?;
    } else {
        // Decode once to reject truncated or mislabeled payloads.
        reader.decode()?;
        std::fs::write(&path, bytes)?;
    }
    Ok(Some(path))
}

/// Next unused positive integer among the numeric file stems in `dir`,
/// starting at 1 for an empty directory. Each (source, part) pair owns
/// its directory, so concurrent acquisitions for different parts cannot
/// collide.
fn next_file_stem(dir: &Path) -> std::io::Result<u32> {
    let mut max = 0u32;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(stem) = Path::new(&name).file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if let Ok(n) = stem.parse::<u32>() {
            max = max.max(n);
        }
    }
    Ok(max + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"x").unwrap();
    }

    #[test]
    fn empty_directory_starts_at_one() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(next_file_stem(dir.path()).unwrap(), 1);
    }

    #[test]
    fn gaps_are_not_reused() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "1.jpg");
        touch(dir.path(), "2.png");
        touch(dir.path(), "5.jpg");
        assert_eq!(next_file_stem(dir.path()).unwrap(), 6);
    }

    #[test]
    fn non_numeric_stems_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "3.jpg");
        touch(dir.path(), "thumbnail.jpg");
        touch(dir.path(), "readme.txt");
        assert_eq!(next_file_stem(dir.path()).unwrap(), 4);
    }

    #[test]
    fn png_bytes_are_stored_verbatim_with_png_extension() {
        let dir = tempfile::tempdir().unwrap();
        let mut bytes = Vec::new();
        let img = image::RgbImage::from_pixel(4, 4, image::Rgb([120, 10, 200]));
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut std::io::Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();

        let path = store_normalized(dir.path(), &bytes).unwrap().unwrap();
        assert_eq!(path, dir.path().join("1.png"));
        assert_eq!(std::fs::read(&path).unwrap(), bytes);
    }

    #[test]
    fn webp_bytes_are_reencoded_as_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let mut bytes = Vec::new();
        let img = image::RgbaImage::from_pixel(4, 4, image::Rgba([0, 128, 255, 255]));
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut std::io::Cursor::new(&mut bytes), ImageFormat::WebP)
            .unwrap();

        let path = store_normalized(dir.path(), &bytes).unwrap().unwrap();
        assert_eq!(path, dir.path().join("1.jpg"));
        let stored = ImageReader::open(&path)
            .unwrap()
            .with_guessed_format()
            .unwrap();
        assert_eq!(stored.format(), Some(ImageFormat::Jpeg));
    }

    #[test]
    fn garbage_bytes_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(store_normalized(dir.path(), b"definitely not an image").is_err());
        // Nothing may be left behind on failure.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn overlong_prospective_path_writes_nothing() {
        let base = tempfile::tempdir().unwrap();
        let dir = base
            .path()
            .join("a".repeat(200))
            .join("b".repeat(100));

        let mut bytes = Vec::new();
        let img = image::RgbImage::from_pixel(4, 4, image::Rgb([1, 2, 3]));
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut std::io::Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();

        let stored = store_normalized(&dir, &bytes).unwrap();
        assert!(stored.is_none());
        // The length check happens before any filesystem mutation.
        assert!(!dir.exists());
        assert_eq!(std::fs::read_dir(base.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn overlong_url_reports_no_path_without_touching_disk() {
        let dir = tempfile::tempdir().unwrap();
        let acquirer =
            ImageAcquirer::new(dir.path().join("store"), Duration::from_secs(5)).unwrap();
        let source = Source {
            id: 3,
            source_name: "src".to_string(),
            base_url: "https://example.com".to_string(),
            confidence: 1,
            active: true,
        };
        let part = Part {
            id: 7,
            main_part_number: Some("12345".to_string()),
            part_name: None,
            replaces: None,
            pic: None,
            photo_status: None,
            status: crate::domain::models::PartStatus::Pending,
        };

        let url = format!("https://example.com/{}", "a".repeat(300));
        let result = acquirer.acquire(&url, &source, &part).await;
        assert!(result.is_none());
        assert!(!dir.path().join("store").exists());
    }
}
