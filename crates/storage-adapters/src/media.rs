//! # ThumbnailCache
//!
//! Lazily generated square JPEG thumbnails of uploaded images, persisted in a
//! directory that doubles as the cache. A single process-wide lock covers the
//! "open or generate" decision, so two requests can never generate the same
//! thumbnail at once. Files are written under a temporary name and renamed
//! into place, so a reader never sees a partial file.
//!
//! The lock is global rather than per key: generation happens once per image
//! and is dwarfed by decode/resize cost, so serialising it is cheap.

use chrono::{DateTime, Utc};
use domains::{DomainError, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};
use std::io::{Cursor, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Where originals come from, where thumbnails go, and how they look.
#[derive(Debug, Clone)]
pub struct ThumbnailConfig {
    pub uploads_dir: PathBuf,
    pub thumbnail_dir: PathBuf,
    /// Edge length of the square thumbnail, in pixels
    pub size: u32,
    /// JPEG quality, 1..=100
    pub jpeg_quality: u8,
}

/// An open thumbnail, ready to stream after the cache lock is released.
#[derive(Debug)]
pub struct ThumbnailFile {
    pub file: fs::File,
    pub path: PathBuf,
    /// True when this request produced the file
    pub generated: bool,
}

pub struct ThumbnailCache {
    config: ThumbnailConfig,
    lock: Mutex<()>,
    started: DateTime<Utc>,
    generated: AtomicU64,
    hits: AtomicU64,
}

impl ThumbnailCache {
    /// Creates the thumbnail directory if needed. Failing here should stop
    /// the process; nothing can be served without it.
    pub fn new(config: ThumbnailConfig) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&config.thumbnail_dir).map_err(|e| {
            anyhow::anyhow!(
                "Failed to create thumbnail directory {:?}: {e}",
                config.thumbnail_dir
            )
        })?;
        Ok(Self {
            config,
            lock: Mutex::new(()),
            started: Utc::now(),
            generated: AtomicU64::new(0),
            hits: AtomicU64::new(0),
        })
    }

    /// Validators are based on process start, not file mtime: thumbnails
    /// never change while the process runs.
    pub fn last_modified(&self) -> DateTime<Utc> {
        self.started
    }

    pub fn etag(&self, key: &str) -> String {
        format!("\"{}-{key}\"", self.started.timestamp())
    }

    pub fn generated_count(&self) -> u64 {
        self.generated.load(Ordering::Relaxed)
    }

    pub fn hit_count(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Opens the thumbnail for `key`, generating it from the upload of the
    /// same name on first request.
    #[instrument(skip(self))]
    pub async fn get_or_create(&self, key: &str) -> Result<ThumbnailFile> {
        validate_key(key)?;
        let path = self.config.thumbnail_dir.join(key);

        let _guard = self.lock.lock().await;

        match fs::File::open(&path).await {
            Ok(file) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(ThumbnailFile {
                    file,
                    path,
                    generated: false,
                });
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(DomainError::internal(e)),
        }

        self.generate(key, &path).await?;
        self.generated.fetch_add(1, Ordering::Relaxed);

        let file = fs::File::open(&path).await.map_err(DomainError::internal)?;
        Ok(ThumbnailFile {
            file,
            path,
            generated: true,
        })
    }

    async fn generate(&self, key: &str, path: &Path) -> Result<()> {
        let original = self.config.uploads_dir.join(key);
        let data = match fs::read(&original).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(DomainError::NotFound(format!("no upload named {key}")));
            }
            Err(e) => return Err(DomainError::internal(e)),
        };
        debug!(bytes = data.len(), "generating thumbnail");

        let (size, quality) = (self.config.size, self.config.jpeg_quality);
        let encoded = tokio::task::spawn_blocking(move || render_thumbnail(&data, size, quality))
            .await
            .map_err(DomainError::internal)??;

        let tmp = path.with_extension("tmp");
        if let Err(e) = write_then_rename(&tmp, path, &encoded).await {
            if let Err(cleanup) = fs::remove_file(&tmp).await {
                warn!(error = %cleanup, "couldn't remove partial thumbnail");
            }
            return Err(e);
        }

        info!(key, bytes = encoded.len(), "thumbnail generated");
        Ok(())
    }
}

async fn write_then_rename(tmp: &Path, path: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(tmp, bytes).await.map_err(DomainError::internal)?;
    fs::rename(tmp, path).await.map_err(DomainError::internal)
}

/// Decodes (format sniffed from the bytes), crops to a centred square and
/// encodes as JPEG.
fn render_thumbnail(data: &[u8], size: u32, quality: u8) -> Result<Vec<u8>> {
    let img = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(DomainError::internal)?
        .decode()
        .map_err(|e| DomainError::Internal(format!("can't decode upload: {e}")))?;

    // JPEG has no alpha channel
    let thumb = DynamicImage::ImageRgb8(img.resize_to_fill(size, size, FilterType::Lanczos3).to_rgb8());

    let mut out = Vec::new();
    thumb
        .write_with_encoder(JpegEncoder::new_with_quality(&mut out, quality))
        .map_err(DomainError::internal)?;
    Ok(out)
}

/// Keys are upload slugs: lowercase letters, digits, `_` and `-`. Anything
/// else could escape the directories, and is reported as not found since no
/// upload can carry such a name.
fn validate_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && key
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-');
    if valid {
        Ok(())
    } else {
        Err(DomainError::NotFound(format!("no upload named {key:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    struct Fixture {
        _dir: TempDir,
        uploads: PathBuf,
        cache: Arc<ThumbnailCache>,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let uploads = dir.path().join("uploads");
        std::fs::create_dir_all(&uploads).unwrap();
        let cache = ThumbnailCache::new(ThumbnailConfig {
            uploads_dir: uploads.clone(),
            thumbnail_dir: dir.path().join("thumbnails"),
            size: 32,
            jpeg_quality: 80,
        })
        .unwrap();
        Fixture {
            _dir: dir,
            uploads,
            cache: Arc::new(cache),
        }
    }

    fn write_png(dir: &Path, key: &str) {
        let img = RgbImage::from_fn(80, 40, |x, y| Rgb([x as u8 * 3, y as u8 * 5, 128]));
        img.save_with_format(dir.join(key), ImageFormat::Png).unwrap();
    }

    async fn read_all(mut thumb: ThumbnailFile) -> Vec<u8> {
        let mut bytes = Vec::new();
        thumb.file.read_to_end(&mut bytes).await.unwrap();
        bytes
    }

    #[tokio::test]
    async fn test_generates_once_then_hits() {
        let fx = fixture();
        write_png(&fx.uploads, "cat");

        let first = fx.cache.get_or_create("cat").await.unwrap();
        assert!(first.generated);
        let bytes = read_all(first).await;
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);

        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 32));

        let second = fx.cache.get_or_create("cat").await.unwrap();
        assert!(!second.generated);
        assert_eq!(read_all(second).await, bytes);
        assert_eq!(fx.cache.generated_count(), 1);
        assert_eq!(fx.cache.hit_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_requests_generate_once() {
        let fx = fixture();
        write_png(&fx.uploads, "dog");

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&fx.cache);
                tokio::spawn(async move { read_all(cache.get_or_create("dog").await.unwrap()).await })
            })
            .collect();

        let mut outputs = Vec::new();
        for task in tasks {
            outputs.push(task.await.unwrap());
        }
        assert_eq!(fx.cache.generated_count(), 1);
        assert!(outputs.windows(2).all(|pair| pair[0] == pair[1]));
    }

    #[tokio::test]
    async fn test_missing_upload_is_not_found() {
        let fx = fixture();
        let err = fx.cache.get_or_create("ghost").await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_undecodable_upload_leaves_nothing_behind() {
        let fx = fixture();
        std::fs::write(fx.uploads.join("junk"), b"definitely not an image").unwrap();

        let err = fx.cache.get_or_create("junk").await.unwrap_err();
        assert!(matches!(err, DomainError::Internal(_)));

        let leftovers = std::fs::read_dir(&fx.cache.config.thumbnail_dir).unwrap().count();
        assert_eq!(leftovers, 0);
        assert_eq!(fx.cache.generated_count(), 0);
    }

    #[tokio::test]
    async fn test_path_like_keys_not_found() {
        let fx = fixture();
        // an upload that exists under the dotted name still can't be reached
        write_png(&fx.uploads, "x.jpg");
        for key in ["../etc", "a/b", "UPPER", "", "x.jpg"] {
            let err = fx.cache.get_or_create(key).await.unwrap_err();
            assert!(matches!(err, DomainError::NotFound(_)), "{key}");
        }
        assert_eq!(fx.cache.generated_count(), 0);
    }

    #[test]
    fn test_etag_stable_per_key() {
        let fx = fixture();
        assert_eq!(fx.cache.etag("a"), fx.cache.etag("a"));
        assert_ne!(fx.cache.etag("a"), fx.cache.etag("b"));
    }
}
