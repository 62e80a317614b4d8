// Paged workflow fetching.
//
// `WorkflowPager` pulls one page at a time from a `WorkflowPageSource`,
// publishes its `LoadState` on a watch channel and advances the cursor only
// after a successful page. A request made while another is outstanding is
// refused, and nothing is published once `cancel` has returned.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use pdm_api::CloudClient;
use pdm_api::models::{Workflow, WorkflowPage};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::CoreError;
use crate::load_state::LoadState;

/// Network page size used when the configuration has none.
pub const NETWORK_PAGE_SIZE: u32 = 50;

// ── Seams ────────────────────────────────────────────────────────────

/// Where pages come from.
pub trait WorkflowPageSource: Send + Sync {
    fn fetch_page(
        &self,
        page_size: u32,
        after: Option<String>,
    ) -> impl Future<Output = Result<WorkflowPage, pdm_api::Error>> + Send;
}

/// Reports whether the host currently has a network route.
pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> bool;
}

/// Connectivity check for hosts that cannot tell; transport errors still
/// classify as offline.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeOnline;

impl Connectivity for AssumeOnline {
    fn is_online(&self) -> bool {
        true
    }
}

/// Workflows assigned to one user.
#[derive(Debug, Clone)]
pub struct AssignedWorkflows {
    client: CloudClient,
    assignee_id: String,
}

impl AssignedWorkflows {
    pub fn new(client: CloudClient, assignee_id: impl Into<String>) -> Self {
        Self {
            client,
            assignee_id: assignee_id.into(),
        }
    }
}

impl WorkflowPageSource for AssignedWorkflows {
    async fn fetch_page(
        &self,
        page_size: u32,
        after: Option<String>,
    ) -> Result<WorkflowPage, pdm_api::Error> {
        self.client
            .get_assigned_workflows(page_size, &self.assignee_id, after.as_deref())
            .await
    }
}

/// Every workflow in the account.
#[derive(Debug, Clone)]
pub struct AllWorkflows {
    client: CloudClient,
}

impl AllWorkflows {
    pub fn new(client: CloudClient) -> Self {
        Self { client }
    }
}

impl WorkflowPageSource for AllWorkflows {
    async fn fetch_page(
        &self,
        page_size: u32,
        after: Option<String>,
    ) -> Result<WorkflowPage, pdm_api::Error> {
        self.client
            .get_all_workflows(page_size, after.as_deref())
            .await
    }
}

// ── Pager ────────────────────────────────────────────────────────────

/// Result of a page request that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    Items(Vec<Workflow>),
    /// Another request is outstanding; this one was not sent.
    Busy,
    /// The last page was already delivered.
    Exhausted,
    /// A refresh happened while this request was in flight; its result was dropped.
    Superseded,
}

#[derive(Debug, Default)]
struct Cursor {
    after: Option<String>,
    in_flight: bool,
    exhausted: bool,
    generation: u64,
}

/// Clears `in_flight` when a request future is dropped before it finishes.
struct InFlight<'a> {
    cursor: &'a Mutex<Cursor>,
    armed: bool,
}

impl InFlight<'_> {
    fn finish(&mut self, cursor: &mut Cursor) {
        cursor.in_flight = false;
        self.armed = false;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.cursor
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .in_flight = false;
        }
    }
}

pub struct WorkflowPager<S> {
    source: S,
    connectivity: Arc<dyn Connectivity>,
    page_size: u32,
    cursor: Mutex<Cursor>,
    state: watch::Sender<Option<LoadState>>,
    cancel: CancellationToken,
}

impl<S: WorkflowPageSource> WorkflowPager<S> {
    pub fn new(source: S, page_size: u32) -> Self {
        Self::with_connectivity(source, page_size, Arc::new(AssumeOnline))
    }

    pub fn with_connectivity(
        source: S,
        page_size: u32,
        connectivity: Arc<dyn Connectivity>,
    ) -> Self {
        let (state, _) = watch::channel(None);
        Self {
            source,
            connectivity,
            page_size: page_size.max(1),
            cursor: Mutex::new(Cursor::default()),
            state,
            cancel: CancellationToken::new(),
        }
    }

    /// `None` until the first request.
    pub fn state(&self) -> Option<LoadState> {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<LoadState>> {
        self.state.subscribe()
    }

    /// Cursor the next request will use.
    pub fn cursor(&self) -> Option<String> {
        self.lock().after.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Cursor> {
        self.cursor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Request the next page.
    ///
    /// Failures come back classified and are also reflected in the load
    /// state. The cursor stays put on failure, so calling again retries the
    /// same page.
    pub async fn load_next(&self) -> Result<PageOutcome, CoreError> {
        let (after, generation) = {
            let mut cursor = self.lock();
            if self.cancel.is_cancelled() {
                return Err(CoreError::CancelledByClient);
            }
            if cursor.in_flight {
                debug!("page request ignored, one is outstanding");
                return Ok(PageOutcome::Busy);
            }
            if cursor.exhausted {
                return Ok(PageOutcome::Exhausted);
            }
            cursor.in_flight = true;
            self.state.send_replace(Some(LoadState::Loading));
            (cursor.after.clone(), cursor.generation)
        };
        let mut in_flight = InFlight {
            cursor: &self.cursor,
            armed: true,
        };

        let first_page = after.is_none();
        let fetched = tokio::select! {
            biased;
            () = self.cancel.cancelled() => None,
            result = self.source.fetch_page(self.page_size, after) => Some(result),
        };

        let mut cursor = self.lock();
        in_flight.finish(&mut cursor);
        let Some(result) = fetched.filter(|_| !self.cancel.is_cancelled()) else {
            return Err(CoreError::CancelledByClient);
        };
        if cursor.generation != generation {
            return Ok(PageOutcome::Superseded);
        }

        match result {
            Ok(page) => {
                let next = page.next_cursor();
                let state = if first_page && page.data.is_empty() {
                    LoadState::Empty
                } else if next.is_some() {
                    LoadState::Loaded
                } else {
                    LoadState::Downloaded
                };
                match next {
                    Some(next) => cursor.after = Some(next),
                    None => cursor.exhausted = true,
                }
                debug!(items = page.data.len(), %state, "workflow page loaded");
                self.state.send_replace(Some(state));
                Ok(PageOutcome::Items(page.data))
            }
            Err(e) => {
                let err = if self.connectivity.is_online() {
                    CoreError::from(e)
                } else {
                    CoreError::NetworkUnavailable
                };
                let state = LoadState::for_error(&err);
                warn!(%state, "workflow page failed: {err}");
                self.state.send_replace(Some(state));
                Err(err)
            }
        }
    }

    /// Start over from the first page. A request in flight keeps running but
    /// its result is dropped.
    pub fn refresh(&self) {
        let mut cursor = self.lock();
        cursor.after = None;
        cursor.exhausted = false;
        cursor.generation += 1;
        if !self.cancel.is_cancelled() {
            self.state.send_replace(None);
        }
    }

    /// Cancel every outstanding and future request. Once this returns no
    /// further state is published.
    pub fn cancel(&self) {
        let _cursor = self.lock();
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tokio::sync::Notify;

    use super::*;

    fn page(ids: &[&str], has_more: Option<bool>) -> WorkflowPage {
        let data: Vec<_> = ids
            .iter()
            .map(|id| json!({ "id": id, "name": id, "status": "PENDING" }))
            .collect();
        serde_json::from_value(json!({ "data": data, "has_more": has_more })).unwrap()
    }

    fn server_error() -> pdm_api::Error {
        pdm_api::Error::Api {
            status: 500,
            message: "boom".into(),
            code: Some(500),
            error_type: Some("internal_server_error".into()),
        }
    }

    /// Hands out scripted responses, optionally holding each one until released.
    #[derive(Default)]
    struct Scripted {
        responses: Mutex<VecDeque<Result<WorkflowPage, pdm_api::Error>>>,
        cursors: Mutex<Vec<Option<String>>>,
        calls: AtomicUsize,
        gate: Option<Arc<Notify>>,
    }

    impl Scripted {
        fn new(responses: Vec<Result<WorkflowPage, pdm_api::Error>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                ..Self::default()
            }
        }

        fn gated(mut self, gate: Arc<Notify>) -> Self {
            self.gate = Some(gate);
            self
        }
    }

    impl WorkflowPageSource for Arc<Scripted> {
        async fn fetch_page(
            &self,
            _page_size: u32,
            after: Option<String>,
        ) -> Result<WorkflowPage, pdm_api::Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.cursors.lock().unwrap().push(after);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(page(&[], Some(false))))
        }
    }

    struct Offline(AtomicBool);

    impl Connectivity for Offline {
        fn is_online(&self) -> bool {
            !self.0.load(Ordering::SeqCst)
        }
    }

    #[tokio::test]
    async fn cursor_follows_each_response() {
        let source = Arc::new(Scripted::new(vec![
            Ok(page(&["w1", "w2"], Some(true))),
            Ok(page(&["w3", "w4"], None)),
            Ok(page(&["w5"], Some(false))),
        ]));
        let pager = WorkflowPager::new(Arc::clone(&source), 2);
        assert_eq!(pager.state(), None);

        let mut ids = Vec::new();
        for expected in [LoadState::Loaded, LoadState::Loaded, LoadState::Downloaded] {
            let PageOutcome::Items(items) = pager.load_next().await.unwrap() else {
                panic!("expected items");
            };
            ids.extend(items.into_iter().map(|w| w.id));
            assert_eq!(pager.state(), Some(expected));
        }

        assert_eq!(ids, vec!["w1", "w2", "w3", "w4", "w5"]);
        assert_eq!(
            *source.cursors.lock().unwrap(),
            vec![None, Some("w2".to_owned()), Some("w4".to_owned())]
        );
        assert_eq!(pager.load_next().await.unwrap(), PageOutcome::Exhausted);
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn empty_first_page() {
        let source = Arc::new(Scripted::new(vec![Ok(page(&[], None))]));
        let pager = WorkflowPager::new(source, 10);

        assert_eq!(pager.load_next().await.unwrap(), PageOutcome::Items(vec![]));
        assert_eq!(pager.state(), Some(LoadState::Empty));
        assert_eq!(pager.load_next().await.unwrap(), PageOutcome::Exhausted);
    }

    #[tokio::test]
    async fn failure_keeps_cursor_for_retry() {
        let source = Arc::new(Scripted::new(vec![
            Ok(page(&["w1"], Some(true))),
            Err(server_error()),
            Ok(page(&["w2"], Some(false))),
        ]));
        let pager = WorkflowPager::new(Arc::clone(&source), 1);

        pager.load_next().await.unwrap();
        let err = pager.load_next().await.unwrap_err();
        assert!(matches!(err, CoreError::ServerError { status: Some(500), .. }));
        assert_eq!(pager.state(), Some(LoadState::Failed));
        assert_eq!(pager.cursor().as_deref(), Some("w1"));

        pager.load_next().await.unwrap();
        assert_eq!(pager.state(), Some(LoadState::Downloaded));
        assert_eq!(
            *source.cursors.lock().unwrap(),
            vec![None, Some("w1".to_owned()), Some("w1".to_owned())]
        );
    }

    #[tokio::test]
    async fn unauthorized_is_its_own_state() {
        let source = Arc::new(Scripted::new(vec![Err(pdm_api::Error::Unauthorized {
            status: 401,
            message: "expired".into(),
        })]));
        let pager = WorkflowPager::new(source, 10);

        assert!(matches!(
            pager.load_next().await,
            Err(CoreError::Unauthorized)
        ));
        assert_eq!(pager.state(), Some(LoadState::Unauthorized));
    }

    #[tokio::test]
    async fn offline_takes_precedence_over_other_failures() {
        let source = Arc::new(Scripted::new(vec![Err(pdm_api::Error::Unauthorized {
            status: 401,
            message: "expired".into(),
        })]));
        let offline = Arc::new(Offline(AtomicBool::new(true)));
        let pager = WorkflowPager::with_connectivity(source, 10, offline);

        assert!(matches!(
            pager.load_next().await,
            Err(CoreError::NetworkUnavailable)
        ));
        assert_eq!(pager.state(), Some(LoadState::NoNetwork));
    }

    #[tokio::test]
    async fn concurrent_request_is_refused() {
        let gate = Arc::new(Notify::new());
        let source = Arc::new(
            Scripted::new(vec![Ok(page(&["w1"], Some(true)))]).gated(Arc::clone(&gate)),
        );
        let pager = Arc::new(WorkflowPager::new(Arc::clone(&source), 1));

        let first = tokio::spawn({
            let pager = Arc::clone(&pager);
            async move { pager.load_next().await }
        });
        while source.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(pager.state(), Some(LoadState::Loading));

        assert_eq!(pager.load_next().await.unwrap(), PageOutcome::Busy);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        gate.notify_one();
        assert!(matches!(first.await.unwrap(), Ok(PageOutcome::Items(_))));
        assert_eq!(pager.state(), Some(LoadState::Loaded));
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_request_does_not_block_the_next() {
        let gate = Arc::new(Notify::new());
        let source = Arc::new(
            Scripted::new(vec![Ok(page(&["w1"], Some(false)))]).gated(Arc::clone(&gate)),
        );
        let pager = WorkflowPager::new(Arc::clone(&source), 1);

        let abandoned =
            tokio::time::timeout(std::time::Duration::from_millis(10), pager.load_next()).await;
        assert!(abandoned.is_err());

        gate.notify_one();
        let PageOutcome::Items(items) = pager.load_next().await.unwrap() else {
            panic!("expected items");
        };
        assert_eq!(items[0].id, "w1");
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert_eq!(pager.state(), Some(LoadState::Downloaded));
    }

    #[tokio::test]
    async fn nothing_published_after_cancel() {
        let gate = Arc::new(Notify::new());
        let source = Arc::new(
            Scripted::new(vec![Ok(page(&["w1"], Some(true)))]).gated(Arc::clone(&gate)),
        );
        let pager = Arc::new(WorkflowPager::new(Arc::clone(&source), 1));
        let mut states = pager.subscribe();

        let pending = tokio::spawn({
            let pager = Arc::clone(&pager);
            async move { pager.load_next().await }
        });
        while source.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        states.mark_unchanged();

        pager.cancel();
        gate.notify_one();

        assert!(matches!(
            pending.await.unwrap(),
            Err(CoreError::CancelledByClient)
        ));
        assert!(!states.has_changed().unwrap());
        assert_eq!(pager.state(), Some(LoadState::Loading));
        assert!(matches!(
            pager.load_next().await,
            Err(CoreError::CancelledByClient)
        ));
    }

    #[tokio::test]
    async fn refresh_drops_in_flight_result() {
        let gate = Arc::new(Notify::new());
        let source = Arc::new(
            Scripted::new(vec![
                Ok(page(&["stale"], Some(true))),
                Ok(page(&["fresh"], Some(false))),
            ])
            .gated(Arc::clone(&gate)),
        );
        let pager = Arc::new(WorkflowPager::new(Arc::clone(&source), 1));

        let pending = tokio::spawn({
            let pager = Arc::clone(&pager);
            async move { pager.load_next().await }
        });
        while source.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        pager.refresh();
        gate.notify_one();
        assert_eq!(pending.await.unwrap().unwrap(), PageOutcome::Superseded);
        assert_eq!(pager.cursor(), None);

        gate.notify_one();
        let PageOutcome::Items(items) = pager.load_next().await.unwrap() else {
            panic!("expected items");
        };
        assert_eq!(items[0].id, "fresh");
    }
}
