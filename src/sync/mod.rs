//! Drives Provider initialization, periodic synchronization, and retry/offline handling
//! (§4.4).

pub mod backoff;
pub mod classify;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crate::catalog::{Catalog, EpochMs, Photo, PhotoId};
use crate::provider::{ContainerSpec, ProviderHandle};

use backoff::{Backoff, BackoffOptions, NextAttempt};
use classify::Classification;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Initializing,
    Online,
    Offline,
    Retrying,
    Error,
}

#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub state: ConnectionState,
    pub message: String,
}

/// Outward notifications the SyncController raises; `engine.rs` bridges these to §6's
/// `CONNECTION_STATUS`/`ERROR` host messages.
pub trait StatusSink: Send + Sync {
    fn on_status(&self, update: StatusUpdate);
    fn on_terminal_error(&self, message: String);
}

pub struct ContainerConfig {
    pub id: String,
    pub depth: i32,
}

pub struct SyncControllerConfig {
    pub containers: Vec<ContainerConfig>,
    pub backoff: BackoffOptions,
}

/// One `&mut`-owned-equivalent state object per §9: the retry flag and backoff tracker are
/// the only mutable state, and both are already behind their own synchronization so every
/// other method only reads shared references.
pub struct SyncController {
    catalog: Catalog,
    provider: Arc<ProviderHandle>,
    containers: Vec<ContainerConfig>,
    sink: Arc<dyn StatusSink>,
    backoff: parking_lot::Mutex<Backoff>,
    retry_pending: AtomicBool,
}

impl SyncController {
    pub fn new(
        catalog: Catalog,
        provider: Arc<ProviderHandle>,
        config: SyncControllerConfig,
        sink: Arc<dyn StatusSink>,
    ) -> Arc<Self> {
        Arc::new(Self {
            catalog,
            provider,
            containers: config.containers,
            sink,
            backoff: parking_lot::Mutex::new(Backoff::new(config.backoff)),
            retry_pending: AtomicBool::new(false),
        })
    }

    fn container_specs(&self) -> Vec<ContainerSpec<'_>> {
        self.containers
            .iter()
            .map(|c| ContainerSpec { id: &c.id, depth: c.depth })
            .collect()
    }

    /// One synchronous attempt at engine startup (§4.4). On failure the engine keeps
    /// starting; the DisplayDispatcher still serves cached content.
    pub fn initialize(self: &Arc<Self>) {
        self.sink.on_status(StatusUpdate {
            state: ConnectionState::Initializing,
            message: "Connecting...".into(),
        });
        match self.provider.init() {
            Ok(()) => {
                self.backoff.lock().record_success();
                self.sink.on_status(StatusUpdate {
                    state: ConnectionState::Online,
                    message: "Connected".into(),
                });
                if let Err(err) = self.sync_once() {
                    self.handle_failure(&err.to_string());
                }
            }
            Err(err) => self.handle_failure(&err.to_string()),
        }
    }

    /// Periodic sync timer callback (`scan_interval`, default 6h, §4.4). No-op if the
    /// Provider has not (yet) completed initialization.
    pub fn periodic_sync(self: &Arc<Self>) {
        if !self.provider.is_ready() {
            return;
        }
        if let Err(err) = self.sync_once() {
            self.handle_failure(&err.to_string());
        } else {
            self.backoff.lock().record_success();
        }
    }

    fn sync_once(&self) -> anyhow::Result<()> {
        let provider_key = self.provider.name();
        let token = self.catalog.get_delta_token(&provider_key)?;

        match token {
            Some(token) if self.provider.supports_delta() => {
                let delta = self.provider.delta(&token).map_err(|e| anyhow::anyhow!(e))?;
                let photos: Vec<Photo> = delta
                    .added_or_modified
                    .into_iter()
                    .map(|d| discovered_to_photo(d, &provider_key))
                    .collect();
                if !photos.is_empty() {
                    self.catalog.upsert_photos(&photos)?;
                }
                for id in delta.deleted_ids {
                    self.catalog.delete_photo(&PhotoId::new(id))?;
                }
                self.catalog.put_delta_token(&provider_key, &delta.next_token)?;
            }
            _ => {
                let discovered = self
                    .provider
                    .full_scan(&self.container_specs())
                    .map_err(|e| anyhow::anyhow!(e))?;
                let photos: Vec<Photo> = discovered
                    .into_iter()
                    .map(|d| discovered_to_photo(d, &provider_key))
                    .collect();
                if !photos.is_empty() {
                    self.catalog.upsert_photos(&photos)?;
                }
                if self.provider.supports_delta() {
                    if let Ok(start_token) = self.provider.delta_start_token() {
                        self.catalog.put_delta_token(&provider_key, &start_token)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// §4.4.1 / "on sync failure": classify, update connection state, and (for transient
    /// errors) schedule a retry.
    fn handle_failure(self: &Arc<Self>, message: &str) {
        self.provider.mark_unready();
        match classify::classify_message(message) {
            Classification::Permanent => {
                self.sink.on_status(StatusUpdate {
                    state: ConnectionState::Error,
                    message: message.to_owned(),
                });
                self.sink.on_terminal_error(message.to_owned());
            }
            Classification::Transient => {
                let cached = self.catalog.cached_count().unwrap_or(0);
                self.sink.on_status(StatusUpdate {
                    state: ConnectionState::Offline,
                    message: format!("{cached} cached photos"),
                });
                self.schedule_retry();
            }
        }
    }

    /// At most one retry may be scheduled at any time (§4.4 "retry de-duplication").
    fn schedule_retry(self: &Arc<Self>) {
        if self.retry_pending.swap(true, Ordering::AcqRel) {
            return;
        }
        let delay = match self.backoff.lock().record_failure() {
            NextAttempt::RetryAfter(d) => d,
            NextAttempt::Exhausted => {
                self.retry_pending.store(false, Ordering::Release);
                self.sink.on_status(StatusUpdate {
                    state: ConnectionState::Offline,
                    message: "max retries exceeded".into(),
                });
                self.sink
                    .on_terminal_error("offline — max retries exceeded".into());
                return;
            }
        };

        self.sink.on_status(StatusUpdate {
            state: ConnectionState::Retrying,
            message: format!("Retrying in {}s", delay.as_secs()),
        });

        let this = Arc::clone(self);
        thread::spawn(move || {
            thread::sleep(delay);
            this.retry_pending.store(false, Ordering::Release);
            this.initialize();
        });
    }
}

fn discovered_to_photo(d: crate::catalog::DiscoveredPhoto, provider_key: &str) -> Photo {
    let creation_time: EpochMs = d.creation_time;
    Photo {
        id: d.id,
        provider_key: provider_key.to_owned(),
        container_key: d.container_key,
        filename: d.filename,
        creation_time,
        width: d.width,
        height: d.height,
        latitude: d.latitude,
        longitude: d.longitude,
        location_name: None,
        last_viewed_at: None,
        cache_state: crate::catalog::CacheState::Unset,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{DiscoveredPhoto, SortMode};
    use crate::provider::{DeltaResult, DownloadStream, Provider, ProviderError};
    use parking_lot::Mutex as PMutex;
    use std::time::Duration;

    struct RecordingSink {
        updates: PMutex<Vec<StatusUpdate>>,
        terminal_errors: PMutex<Vec<String>>,
    }

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                updates: PMutex::new(Vec::new()),
                terminal_errors: PMutex::new(Vec::new()),
            })
        }
    }

    impl StatusSink for RecordingSink {
        fn on_status(&self, update: StatusUpdate) {
            self.updates.lock().push(update);
        }
        fn on_terminal_error(&self, message: String) {
            self.terminal_errors.lock().push(message);
        }
    }

    struct FlakyProvider {
        fail_with: Option<String>,
    }

    impl Provider for FlakyProvider {
        fn name(&self) -> &str {
            "mock"
        }
        fn init(&mut self) -> Result<(), ProviderError> {
            match &self.fail_with {
                Some(msg) => Err(ProviderError::Other(anyhow::anyhow!(msg.clone()))),
                None => Ok(()),
            }
        }
        fn full_scan(&self, _containers: &[ContainerSpec<'_>]) -> Result<Vec<DiscoveredPhoto>, ProviderError> {
            Ok(vec![])
        }
        fn download(&self, _id: &str, _timeout: Duration) -> Result<Box<dyn DownloadStream>, ProviderError> {
            unreachable!("not exercised in these tests")
        }
    }

    fn controller(provider: FlakyProvider, sink: Arc<RecordingSink>) -> Arc<SyncController> {
        let catalog = Catalog::init_in_memory(SortMode::Sequential).unwrap();
        let provider = Arc::new(ProviderHandle::new(Box::new(provider)));
        SyncController::new(
            catalog,
            provider,
            SyncControllerConfig {
                containers: vec![ContainerConfig { id: "root".into(), depth: -1 }],
                backoff: BackoffOptions::default(),
            },
            sink,
        )
    }

    #[test]
    fn permanent_error_emits_terminal_error_without_retry() {
        let sink = RecordingSink::new();
        let sc = controller(
            FlakyProvider {
                fail_with: Some("OAuth error: invalid_grant".into()),
            },
            sink.clone(),
        );
        sc.initialize();

        assert_eq!(sink.terminal_errors.lock().len(), 1);
        assert!(!sc.retry_pending.load(Ordering::Acquire));
    }

    #[test]
    fn transient_error_schedules_exactly_one_retry() {
        let sink = RecordingSink::new();
        let sc = controller(
            FlakyProvider {
                fail_with: Some("connect ETIMEDOUT".into()),
            },
            sink.clone(),
        );
        sc.initialize();
        sc.schedule_retry();
        sc.schedule_retry();

        assert!(sc.retry_pending.load(Ordering::Acquire));
        assert!(sink
            .updates
            .lock()
            .iter()
            .any(|u| u.state == ConnectionState::Offline));
    }

    #[test]
    fn successful_init_goes_online_and_resets_backoff() {
        let sink = RecordingSink::new();
        let sc = controller(FlakyProvider { fail_with: None }, sink.clone());
        sc.initialize();

        assert!(sink
            .updates
            .lock()
            .iter()
            .any(|u| u.state == ConnectionState::Online));
        assert_eq!(sink.terminal_errors.lock().len(), 0);
    }

    struct DeltaProvider {
        next_token: String,
    }

    impl Provider for DeltaProvider {
        fn name(&self) -> &str {
            "mock"
        }
        fn init(&mut self) -> Result<(), ProviderError> {
            Ok(())
        }
        fn full_scan(
            &self,
            _containers: &[ContainerSpec<'_>],
        ) -> Result<Vec<DiscoveredPhoto>, ProviderError> {
            Ok(vec![])
        }
        fn download(&self, _id: &str, _timeout: Duration) -> Result<Box<dyn DownloadStream>, ProviderError> {
            unreachable!("not exercised in this test")
        }
        fn supports_delta(&self) -> bool {
            true
        }
        fn delta_start_token(&self) -> Result<String, ProviderError> {
            Ok("T0".into())
        }
        fn delta(&self, token: &str) -> Result<DeltaResult, ProviderError> {
            assert_eq!(token, "T");
            Ok(DeltaResult {
                added_or_modified: vec![DiscoveredPhoto {
                    id: PhotoId::new("p11"),
                    container_key: "root".into(),
                    filename: "p11.jpg".into(),
                    creation_time: 1,
                    width: None,
                    height: None,
                    latitude: None,
                    longitude: None,
                }],
                deleted_ids: vec!["p3".into()],
                next_token: self.next_token.clone(),
            })
        }
    }

    fn seed_ten_photos(catalog: &Catalog) {
        let photos: Vec<Photo> = (0..10)
            .map(|i| {
                let id = format!("p{i}");
                Photo {
                    id: PhotoId::new(id.clone()),
                    provider_key: "mock".into(),
                    container_key: "root".into(),
                    filename: format!("{id}.jpg"),
                    creation_time: i as EpochMs,
                    width: None,
                    height: None,
                    latitude: None,
                    longitude: None,
                    location_name: None,
                    last_viewed_at: None,
                    cache_state: crate::catalog::CacheState::Unset,
                }
            })
            .collect();
        catalog.upsert_photos(&photos).unwrap();
    }

    #[test]
    fn delta_sync_adds_and_removes_photos_and_advances_the_token() {
        let catalog = Catalog::init_in_memory(SortMode::Sequential).unwrap();
        seed_ten_photos(&catalog);
        catalog.put_delta_token("mock", "T").unwrap();

        let sink = RecordingSink::new();
        let provider = Arc::new(ProviderHandle::new(Box::new(DeltaProvider {
            next_token: "T'".into(),
        })));
        let sc = SyncController::new(
            catalog.clone(),
            provider,
            SyncControllerConfig {
                containers: vec![ContainerConfig { id: "root".into(), depth: -1 }],
                backoff: BackoffOptions::default(),
            },
            sink,
        );

        sc.sync_once().unwrap();

        assert_eq!(catalog.total_count().unwrap(), 10);
        let ids: Vec<String> = catalog
            .list_fetch_candidates(20)
            .unwrap()
            .into_iter()
            .map(|p| p.id.as_str().to_owned())
            .collect();
        assert!(ids.contains(&"p11".to_owned()));
        assert!(!ids.contains(&"p3".to_owned()));
        assert_eq!(catalog.get_delta_token("mock").unwrap().as_deref(), Some("T'"));
    }
}
