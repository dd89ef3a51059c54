use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::{
    daemon::storage::{
        document_storage::{load_document, save_document, DocumentStorage},
        entities::ActivityState,
        TRACKING_KEY,
    },
    utils::clock::Clock,
};

/// What the heartbeat saw when it took a sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleWindow {
    pub previous: Option<DateTime<Utc>>,
    pub now: DateTime<Utc>,
    pub url: Option<String>,
    pub user_present: bool,
}

/// Single owner of [ActivityState]. Every mutation is written through to storage so a restarted
/// host continues from the last known state. Storage failures are logged and the in-memory state
/// stays authoritative for the rest of the process.
pub struct ActivityTracker<S> {
    storage: S,
    state: Mutex<ActivityState>,
    clock: Arc<dyn Clock>,
}

impl<S: DocumentStorage> ActivityTracker<S> {
    /// Restores the state persisted by a previous run. Missing or unreadable state starts fresh.
    pub async fn restore(storage: S, clock: Arc<dyn Clock>) -> Self {
        let state = match load_document::<ActivityState>(&storage, TRACKING_KEY).await {
            Ok(state) => {
                debug!("Restored tracking state {:?}", state);
                state
            }
            Err(e) => {
                warn!("Couldn't restore tracking state, starting fresh {e:?}");
                ActivityState::default()
            }
        };
        Self {
            storage,
            state: Mutex::new(state),
            clock,
        }
    }

    pub async fn snapshot(&self) -> ActivityState {
        self.state.lock().await.clone()
    }

    /// Switches to a new resource. The sample clock restarts so the time since the previous
    /// heartbeat isn't credited to the new resource.
    pub async fn set_active_resource(&self, url: Option<String>, tab_id: Option<u32>) {
        let now = self.clock.time();
        self.update(|state| {
            state.current_domain_url = url;
            if tab_id.is_some() {
                state.active_tab_id = tab_id;
            }
            state.last_sample_timestamp = Some(now);
        })
        .await;
    }

    /// Navigation only matters when it happens in the viewed tab. When the active tab is unknown,
    /// e.g. right after a restart, the navigating tab is assumed to be the viewed one.
    pub async fn navigate(&self, tab_id: u32, url: String) {
        let now = self.clock.time();
        self.update(|state| {
            if state.active_tab_id.is_some_and(|active| active != tab_id) {
                debug!("Ignoring navigation in background tab {tab_id}");
                return;
            }
            state.current_domain_url = Some(url);
            state.active_tab_id = Some(tab_id);
            state.last_sample_timestamp = Some(now);
        })
        .await;
    }

    /// Losing focus means nothing in the browser is being viewed. Regaining it either names the
    /// resource in the focused window or only restarts the sample clock.
    pub async fn set_window_focus(&self, has_focus: bool, url: Option<String>, tab_id: Option<u32>) {
        let now = self.clock.time();
        self.update(|state| {
            match (has_focus, url) {
                (false, _) => state.current_domain_url = None,
                (true, Some(url)) => {
                    state.current_domain_url = Some(url);
                    if tab_id.is_some() {
                        state.active_tab_id = tab_id;
                    }
                }
                (true, None) => {}
            }
            state.last_sample_timestamp = Some(now);
        })
        .await;
    }

    /// Becoming present restarts the sample clock so the absent interval is dropped rather than
    /// attributed. Repeated deliveries of the same presence change nothing.
    pub async fn set_presence(&self, present: bool) {
        let now = self.clock.time();
        self.update(|state| {
            if present && !state.user_present {
                state.last_sample_timestamp = Some(now);
            }
            state.user_present = present;
        })
        .await;
    }

    /// Reads the state and moves the sample clock to `now` under one lock, so no signal can slip
    /// in between.
    pub async fn advance_sample(&self, now: DateTime<Utc>) -> SampleWindow {
        self.update(|state| {
            let window = SampleWindow {
                previous: state.last_sample_timestamp,
                now,
                url: state.current_domain_url.clone(),
                user_present: state.user_present,
            };
            state.last_sample_timestamp = Some(now);
            window
        })
        .await
    }

    async fn update<T>(&self, change: impl FnOnce(&mut ActivityState) -> T) -> T {
        let mut state = self.state.lock().await;
        let before = state.clone();
        let result = change(&mut state);
        if *state != before {
            if let Err(e) = save_document(&self.storage, TRACKING_KEY, &*state).await {
                error!("Failed to persist tracking state {e:?}");
            }
        }
        result
    }
}
