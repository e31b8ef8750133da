//! Preview card rendering.
//!
//! A card is a 1200x630 PNG snapshot of [`template::card_html`]. The actual
//! rasterization is delegated to a [`RenderEngine`]; everything that can go
//! wrong there is logged and turned into `None`, so callers only ever see
//! "image" or "no image".

#[cfg(feature = "headless")]
pub mod chrome;
pub mod template;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{ensure, Context};
use bytes::Bytes;
use image::{GenericImageView, ImageFormat};

use crate::cache::{CacheKey, ResponseCache};
use crate::misskey::Note;

pub const CARD_WIDTH: u32 = 1200;
pub const CARD_HEIGHT: u32 = 630;

pub const DEFAULT_RENDER_TIMEOUT: Duration = Duration::from_secs(30);

/// Turns a self-contained html document into PNG bytes.
///
/// Implementations block; the renderer runs them on the blocking pool.
pub trait RenderEngine: Send + Sync {
    fn snapshot(&self, html: &str) -> anyhow::Result<Vec<u8>>;

    /// Releases any long-lived resources held by the engine.
    fn shutdown(&self) {}
}

/// Engine used when no browser backend is compiled in.
pub struct Unavailable;

impl RenderEngine for Unavailable {
    fn snapshot(&self, _html: &str) -> anyhow::Result<Vec<u8>> {
        anyhow::bail!("card rendering is not available in this build")
    }
}

/// Builds the browser backed engine when the `headless` feature is on.
pub fn default_engine(chromium_path: &std::path::Path) -> Arc<dyn RenderEngine> {
    #[cfg(feature = "headless")]
    {
        Arc::new(chrome::ChromeEngine::new(chromium_path.to_path_buf()))
    }

    #[cfg(not(feature = "headless"))]
    {
        log::warn!(
            "built without the headless feature, ignoring chromium path {}",
            chromium_path.display()
        );
        Arc::new(Unavailable)
    }
}

/// Checks that `png` decodes as a PNG of card size.
pub fn validate_png(png: &[u8]) -> anyhow::Result<()> {
    let img = image::load_from_memory_with_format(png, ImageFormat::Png)
        .context("Failed to decode card")?;
    let (width, height) = img.dimensions();
    ensure!(
        (width, height) == (CARD_WIDTH, CARD_HEIGHT),
        "card is {width}x{height}, expected {CARD_WIDTH}x{CARD_HEIGHT}"
    );
    Ok(())
}

#[derive(Clone)]
pub struct CardRenderer {
    enabled: bool,
    cache: ResponseCache,
    engine: Arc<dyn RenderEngine>,
    timeout: Duration,
}

impl CardRenderer {
    pub fn new(enabled: bool, cache: ResponseCache, engine: Arc<dyn RenderEngine>) -> Self {
        Self {
            enabled,
            cache,
            engine,
            timeout: DEFAULT_RENDER_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn render(&self, note: &Note, domain: &str) -> Option<Bytes> {
        if !self.enabled {
            return None;
        }

        let key = CacheKey::CardImage {
            domain: domain.to_string(),
            note_id: note.id.clone(),
        };
        if let Some(png) = self.cache.get(&key).await {
            return Some(png);
        }

        let html = template::card_html(note, domain);
        match self.snapshot(html).await {
            Ok(png) => {
                let png = Bytes::from(png);
                self.cache.insert(key, png.clone()).await;
                Some(png)
            }
            Err(err) => {
                log::warn!("{domain}: failed to render card for {}: {err:#}", note.id);
                None
            }
        }
    }

    async fn snapshot(&self, html: String) -> anyhow::Result<Vec<u8>> {
        let engine = self.engine.clone();
        let task = tokio::task::spawn_blocking(move || engine.snapshot(&html));

        let png = tokio::time::timeout(self.timeout, task)
            .await
            .context("render timed out")?
            .context("render task panicked")??;

        validate_png(&png)?;
        Ok(png)
    }

    pub fn shutdown(&self) {
        self.engine.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn blank_png(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::new(width, height);
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    struct Counting {
        calls: AtomicUsize,
        png: Vec<u8>,
    }

    impl RenderEngine for Counting {
        fn snapshot(&self, html: &str) -> anyhow::Result<Vec<u8>> {
            assert!(html.contains("<!DOCTYPE html>"));
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.png.clone())
        }
    }

    struct Panicking;

    impl RenderEngine for Panicking {
        fn snapshot(&self, _html: &str) -> anyhow::Result<Vec<u8>> {
            panic!("browser went away")
        }
    }

    struct Slow;

    impl RenderEngine for Slow {
        fn snapshot(&self, _html: &str) -> anyhow::Result<Vec<u8>> {
            std::thread::sleep(Duration::from_millis(300));
            Ok(blank_png(CARD_WIDTH, CARD_HEIGHT))
        }
    }

    fn note() -> Note {
        serde_json::from_value(serde_json::json!({
            "id": "n1",
            "text": "hi",
            "createdAt": "2024-05-01T12:00:00Z",
            "user": {"id": "u1", "username": "alice"}
        }))
        .unwrap()
    }

    #[test]
    fn test_validate_png() {
        assert!(validate_png(&blank_png(CARD_WIDTH, CARD_HEIGHT)).is_ok());
        assert!(validate_png(&blank_png(10, 10)).is_err());
        assert!(validate_png(b"<html></html>").is_err());
    }

    #[tokio::test]
    async fn test_disabled_never_calls_engine() {
        let engine = Arc::new(Counting {
            calls: AtomicUsize::new(0),
            png: blank_png(CARD_WIDTH, CARD_HEIGHT),
        });
        let renderer = CardRenderer::new(false, ResponseCache::default(), engine.clone());

        assert!(renderer.render(&note(), "example.social").await.is_none());
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_renders_once_then_serves_from_cache() {
        let engine = Arc::new(Counting {
            calls: AtomicUsize::new(0),
            png: blank_png(CARD_WIDTH, CARD_HEIGHT),
        });
        let renderer = CardRenderer::new(true, ResponseCache::default(), engine.clone());

        let first = renderer.render(&note(), "example.social").await.unwrap();
        let second = renderer.render(&note(), "example.social").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_wrong_size_is_rejected() {
        let cache = ResponseCache::default();
        let engine = Arc::new(Counting {
            calls: AtomicUsize::new(0),
            png: blank_png(100, 100),
        });
        let renderer = CardRenderer::new(true, cache.clone(), engine);

        assert!(renderer.render(&note(), "example.social").await.is_none());
        let key = CacheKey::CardImage {
            domain: "example.social".into(),
            note_id: "n1".into(),
        };
        assert!(cache.get(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_engine_failures_become_none() {
        let renderer = CardRenderer::new(true, ResponseCache::default(), Arc::new(Unavailable));
        assert!(renderer.render(&note(), "example.social").await.is_none());

        let renderer = CardRenderer::new(true, ResponseCache::default(), Arc::new(Panicking));
        assert!(renderer.render(&note(), "example.social").await.is_none());

        let renderer = CardRenderer::new(true, ResponseCache::default(), Arc::new(Slow))
            .with_timeout(Duration::from_millis(50));
        assert!(renderer.render(&note(), "example.social").await.is_none());
    }
}
