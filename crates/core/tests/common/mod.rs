#![allow(dead_code)]

use assetkeep_api::{AssetDecoder, AssetId, AssetObject, DecodeError};
use assetkeep_core::{AssetConfig, AssetEngine};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

pub const TIMEOUT: Duration = Duration::from_secs(10);

pub fn id(raw: &str) -> AssetId {
    AssetId::parse(raw).unwrap()
}

/// A throwaway project with an `assets/` folder.
pub struct Project {
    pub dir: TempDir,
}

impl Project {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("assets")).unwrap();
        Self { dir }
    }

    pub fn root(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    pub fn assets(&self) -> PathBuf {
        self.dir.path().join("assets")
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.assets().join(rel)
    }

    pub fn write(&self, rel: &str, content: impl AsRef<[u8]>) -> PathBuf {
        let path = self.path(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        path
    }

    pub fn mkdir(&self, rel: &str) -> PathBuf {
        let path = self.path(rel);
        std::fs::create_dir_all(&path).unwrap();
        path
    }

    pub fn read(&self, rel: &str) -> Vec<u8> {
        std::fs::read(self.path(rel)).unwrap()
    }

    /// Level scene that uses the sprites atlas, which uses its page image.
    pub fn with_level(self) -> Self {
        self.write(
            "scene/level1.scene",
            r#"{ "name": "Level 1", "atlas": "atlas/sprites.atlas" }"#,
        );
        self.write(
            "atlas/sprites.atlas",
            "\nsprites.png\nsize: 64,64\nformat: RGBA8888\nhero\n  xy: 0, 0\n",
        );
        self.write("atlas/sprites.png", [0x89, b'P', b'N', b'G']);
        self.write("gfx/hero.png", [0x89, b'P', b'N', b'G']);
        self
    }
}

pub fn test_config() -> AssetConfig {
    AssetConfig {
        debounce_ms: 50,
        failure_ttl_ms: 60_000,
        case_sensitive: Some(true),
        ..AssetConfig::default()
    }
}

/// Engine with the built-in text assets, already scanned.
pub async fn engine(project: &Project) -> Arc<AssetEngine> {
    engine_with(project, test_config()).await
}

pub async fn engine_with(project: &Project, config: AssetConfig) -> Arc<AssetEngine> {
    let engine = AssetEngine::builder(project.root())
        .with_config(config)
        .with_text_assets()
        .build()
        .unwrap();
    engine.scan().await.unwrap();
    Arc::new(engine)
}

pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}

pub fn text_of(object: &AssetObject) -> String {
    object.downcast_ref::<String>().cloned().unwrap_or_default()
}

/// Text decoder that counts its calls and can be slowed down.
#[derive(Default)]
pub struct CountingDecoder {
    pub calls: AtomicUsize,
    pub delay: Duration,
}

impl CountingDecoder {
    pub fn slow(delay: Duration) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl AssetDecoder for CountingDecoder {
    fn decode(&self, _id: &AssetId, bytes: &[u8]) -> Result<AssetObject, DecodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        let text = std::str::from_utf8(bytes).map_err(|e| DecodeError::new(e.to_string()))?;
        Ok(Arc::new(text.to_string()))
    }
}

/// Decoder whose first call reports itself and then blocks until released.
pub struct GatedDecoder {
    calls: AtomicUsize,
    armed: AtomicBool,
    started: mpsc::UnboundedSender<String>,
    gate: Mutex<std::sync::mpsc::Receiver<()>>,
}

impl GatedDecoder {
    pub fn new() -> (
        Arc<Self>,
        mpsc::UnboundedReceiver<String>,
        std::sync::mpsc::Sender<()>,
    ) {
        let (started_tx, started_rx) = mpsc::unbounded_channel();
        let (gate_tx, gate_rx) = std::sync::mpsc::channel();
        let decoder = Arc::new(Self {
            calls: AtomicUsize::new(0),
            armed: AtomicBool::new(true),
            started: started_tx,
            gate: Mutex::new(gate_rx),
        });
        (decoder, started_rx, gate_tx)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl AssetDecoder for GatedDecoder {
    fn decode(&self, _id: &AssetId, bytes: &[u8]) -> Result<AssetObject, DecodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let text = String::from_utf8_lossy(bytes).to_string();
        if self.armed.swap(false, Ordering::SeqCst) {
            let _ = self.started.send(text.clone());
            let _ = self.gate.lock().unwrap().recv();
        }
        Ok(Arc::new(text))
    }
}

pub fn exists(path: &Path) -> bool {
    path.exists()
}
