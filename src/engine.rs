//! Wires the five components together and owns their three recurring timers (§2, §5).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::cache_engine::{CacheEngine, CacheEngineConfig};
use crate::catalog::{self, Catalog, PhotoId};
use crate::config::Config;
use crate::display::{DisplayDispatcher, DisplaySink, Emission};
use crate::host::OutboundMessage;
use crate::provider::{self, ProviderHandle};
use crate::sync::{
    backoff::BackoffOptions, ConnectionState, ContainerConfig as SyncContainerConfig, StatusSink,
    StatusUpdate, SyncController, SyncControllerConfig,
};

const CACHE_TICK_INTERVAL: Duration = Duration::from_secs(30);
const FIRST_DISPLAY_DELAY: Duration = Duration::from_secs(2);

/// Forwards SyncController/DisplayDispatcher notifications onto the single outbound
/// channel that `main.rs` drains and writes to the host as JSON lines (§6).
struct HostBridge {
    outbound: mpsc::Sender<OutboundMessage>,
}

impl StatusSink for HostBridge {
    fn on_status(&self, update: StatusUpdate) {
        let _ = self.outbound.send(OutboundMessage::ConnectionStatus {
            status: update.state.as_wire_str(),
            message: update.message,
        });
    }

    fn on_terminal_error(&self, message: String) {
        let _ = self.outbound.send(OutboundMessage::Error { message, details: None });
    }
}

impl DisplaySink for HostBridge {
    fn on_emission(&self, emission: Emission) {
        let message = match emission {
            Emission::Photo(payload) => OutboundMessage::DisplayPhoto { payload },
            Emission::WaitingForPhotos => OutboundMessage::UpdateStatus {
                message: "Waiting for photos to cache...".into(),
            },
        };
        let _ = self.outbound.send(message);
    }
}

pub struct Engine {
    catalog: Catalog,
    cache_engine: Arc<CacheEngine>,
    sync_controller: Arc<SyncController>,
    display: Arc<DisplayDispatcher>,
    outbound_tx: mpsc::Sender<OutboundMessage>,
    outbound: mpsc::Receiver<OutboundMessage>,
    shutdown: Arc<AtomicBool>,
    handles: std::sync::Mutex<Vec<thread::JoinHandle<()>>>,
    scan_interval_ms: u64,
    update_interval_ms: u64,
}

impl Engine {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let catalog_path = catalog::default_path(&config.data_dir);
        let catalog = Catalog::init(&catalog_path, config.sort_mode)?;

        let provider = provider::build(&config.provider_key, &config.provider_config)?;
        let provider = Arc::new(ProviderHandle::new(provider));

        let (outbound_tx, outbound_rx) = mpsc::channel();
        let bridge = Arc::new(HostBridge { outbound: outbound_tx.clone() });

        let sync_controller = SyncController::new(
            catalog.clone(),
            Arc::clone(&provider),
            SyncControllerConfig {
                containers: config
                    .containers
                    .iter()
                    .map(|c| SyncContainerConfig { id: c.id.clone(), depth: c.depth })
                    .collect(),
                backoff: BackoffOptions {
                    max_delay_ms: config.max_auth_backoff_ms,
                    max_retries: config.max_auth_retries,
                },
            },
            bridge.clone(),
        );

        let cache_engine = Arc::new(CacheEngine::new(
            catalog.clone(),
            Arc::clone(&provider),
            CacheEngineConfig {
                max_cache_bytes: config.max_cache_bytes,
                batch_size: 5,
                display_width: config.display_width,
                display_height: config.display_height,
                jpeg_quality: config.jpeg_quality,
                use_blob_storage: config.use_blob_storage,
                cache_dir: config.data_dir.join("cache"),
            },
        ));

        let display = Arc::new(DisplayDispatcher::new(catalog.clone(), bridge));

        Ok(Self {
            catalog,
            cache_engine,
            sync_controller,
            display,
            outbound_tx,
            outbound: outbound_rx,
            shutdown: Arc::new(AtomicBool::new(false)),
            handles: std::sync::Mutex::new(Vec::new()),
            scan_interval_ms: config.scan_interval_ms,
            update_interval_ms: config.update_interval_ms,
        })
    }

    /// Performs the one synchronous init attempt (§4.4), then starts the three recurring
    /// timers (§5). Startup proceeds even if initialization failed — cached content is
    /// still served.
    pub fn start(self: &Arc<Self>) {
        self.sync_controller.initialize();

        self.spawn_timer(CACHE_TICK_INTERVAL, {
            let cache_engine = Arc::clone(&self.cache_engine);
            move || cache_engine.tick()
        });

        self.spawn_timer(Duration::from_millis(self.scan_interval_ms), {
            let sync_controller = Arc::clone(&self.sync_controller);
            move || sync_controller.periodic_sync()
        });

        let display = Arc::clone(&self.display);
        let shutdown = Arc::clone(&self.shutdown);
        self.handles.lock().unwrap().push(thread::spawn(move || {
            thread::sleep(FIRST_DISPLAY_DELAY);
            if !shutdown.load(Ordering::Acquire) {
                display.tick(now_ms());
            }
        }));

        self.spawn_timer(Duration::from_millis(self.update_interval_ms), {
            let display = Arc::clone(&self.display);
            move || display.tick(now_ms())
        });
    }

    /// Runs exactly one synchronous pass — init + sync, a cache tick, and a display
    /// tick — with no recurring timers spawned. Backs the CLI's `--once` mode (§6).
    pub fn run_once(self: &Arc<Self>) {
        self.sync_controller.initialize();
        self.cache_engine.tick();
        self.display.tick(now_ms());
    }

    fn spawn_timer<F>(self: &Arc<Self>, interval: Duration, callback: F)
    where
        F: Fn() + Send + 'static,
    {
        let shutdown = Arc::clone(&self.shutdown);
        let running = Arc::new(AtomicBool::new(false));
        self.handles.lock().unwrap().push(thread::spawn(move || {
            while !shutdown.load(Ordering::Acquire) {
                thread::sleep(interval);
                if shutdown.load(Ordering::Acquire) {
                    break;
                }
                // Re-entrancy guard (§5): an overlapping fire of the same timer is dropped.
                if running.swap(true, Ordering::AcqRel) {
                    continue;
                }
                callback();
                running.store(false, Ordering::Release);
            }
        }));
    }

    pub fn mark_image_loaded(&self, id: &str, now: i64) {
        self.catalog.mark_viewed(&PhotoId::new(id), now);
    }

    /// Answers `GET_CACHE_STATS` (§6) by pushing a `CACHE_STATS` message onto the same
    /// outbound channel as the recurring timers, so responses interleave correctly with
    /// display/status traffic instead of needing their own channel.
    pub fn push_cache_stats(&self) {
        match self.cache_engine.stats() {
            Ok(stats) => {
                let _ = self.outbound_tx.send(OutboundMessage::CacheStats { stats });
            }
            Err(err) => tracing::warn!(%err, "Failed to compute cache stats"),
        }
    }

    /// Drains the next queued outbound message, blocking until one is available or the
    /// sending side is gone.
    pub fn recv_outbound(&self) -> Option<OutboundMessage> {
        self.outbound.recv().ok()
    }

    /// Drains the next already-queued outbound message without blocking. Used by
    /// `--once` mode, which drives one pass synchronously and then prints whatever it
    /// produced instead of waiting on the (absent) recurring timers.
    pub fn try_recv_outbound(&self) -> Option<OutboundMessage> {
        self.outbound.try_recv().ok()
    }

    /// Cancels all three timers (§5 "Cancellation"). In-flight downloads are not forcibly
    /// interrupted — each is bounded by its own 30s timeout and simply finishes.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        for handle in self.handles.lock().unwrap().drain(..) {
            let _ = handle.join();
        }
    }
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
