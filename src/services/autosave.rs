//! # 자동 저장 코디네이터
//!
//! 편집기에서 들어오는 잦은 저장 요청을 페이지별로 모아서(debounce) 한 번에 저장합니다.
//!
//! 동작 방식:
//! - 페이지마다 워커 태스크가 하나씩 있고, 요청은 mpsc 채널로 전달됩니다.
//! - 디바운스 창 안에 새 요청이 오면 이전 요청은 버리고 창을 다시 시작합니다 (trailing).
//! - 같은 페이지의 저장은 절대 겹치지 않습니다. 오래된 저장이 새 저장을 덮어쓰지 못합니다.
//! - 일시적 오류(`ErrorKind::Transient`)만 `retry_backoff` 후 최대 `max_retries`번 재시도합니다.
//! - 워커는 `idle_timeout` 동안 요청이 없고 밀린 저장도 없으면 슬롯을 반납하고 끝납니다.
//!   반납된 페이지의 상태는 다시 Idle로 보입니다.
//!
//! 상태 흐름 (저장 시도 하나당):
//! ```text
//! Idle → Saving{1} → Saved{at}
//!                  ↘ Saving{2} (재시도) → Saved{at} | Error
//!                  ↘ Error
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::SqlitePool;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::timeout;

use crate::{
    db,
    error::{AppError, ErrorKind},
    models::{ChangeEvent, Document, Page, Table},
    services::{codec, realtime::ChangeFeed},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutosaveConfig {
    /// 마지막 편집 후 이 시간 동안 조용하면 저장합니다.
    pub debounce: Duration,
    /// 일시적 오류 후 재시도 전 대기 시간
    pub retry_backoff: Duration,
    pub max_retries: u32,
    /// 이 시간 동안 요청이 없으면 페이지 워커를 정리합니다.
    pub idle_timeout: Duration,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(100),
            retry_backoff: Duration::from_millis(500),
            max_retries: 1,
            idle_timeout: Duration::from_secs(60),
        }
    }
}

/// UI에 보여줄 저장 상태
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SaveStatus {
    Idle,
    /// `attempt`가 2 이상이면 재시도 중입니다.
    Saving { attempt: u32 },
    Saved { at: DateTime<Utc> },
    Error { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaveStatusEvent {
    pub page_id: String,
    pub status: SaveStatus,
}

/// 저장 요청 한 건. `seq`는 코디네이터 전체에서 단조 증가합니다.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveRequest {
    pub seq: u64,
    pub owner_id: String,
    pub page_id: String,
    pub title: Option<String>,
    pub document: Document,
}

/// 저장소 경계. 실제 구현은 `SqlitePageStore`, 테스트에서는 가짜 저장소를 씁니다.
pub trait PageStore: Send + Sync + 'static {
    fn save_page(&self, request: &SaveRequest) -> impl Future<Output = Result<(), AppError>> + Send;
}

impl<T: PageStore> PageStore for Arc<T> {
    fn save_page(&self, request: &SaveRequest) -> impl Future<Output = Result<(), AppError>> + Send {
        (**self).save_page(request)
    }
}

/// `pages` 테이블에 저장하고 변경 피드에 UPDATE 이벤트를 발행합니다.
#[derive(Clone)]
pub struct SqlitePageStore {
    pool: SqlitePool,
    feed: ChangeFeed,
}

impl SqlitePageStore {
    pub fn new(pool: SqlitePool, feed: ChangeFeed) -> Self {
        Self { pool, feed }
    }
}

impl PageStore for SqlitePageStore {
    async fn save_page(&self, request: &SaveRequest) -> Result<(), AppError> {
        let row = db::save_page_content(
            &self.pool,
            &request.owner_id,
            &request.page_id,
            request.title.as_deref(),
            &request.document,
        )
        .await?;
        self.feed
            .publish(ChangeEvent::update(Table::Pages, &Page::from(row)));
        Ok(())
    }
}

pub struct AutosaveCoordinator<S: PageStore> {
    inner: Arc<Inner<S>>,
}

impl<S: PageStore> Clone for AutosaveCoordinator<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<S> {
    store: S,
    config: AutosaveConfig,
    slots: Mutex<HashMap<String, PageSlot>>,
    status_tx: broadcast::Sender<SaveStatusEvent>,
    seq: AtomicU64,
    next_worker: AtomicU64,
}

struct PageSlot {
    /// 이 슬롯을 맡은 워커. 워커가 남의 슬롯을 지우지 않도록 구분합니다.
    worker: u64,
    queue: mpsc::UnboundedSender<SaveRequest>,
    status: SaveStatus,
    /// 마지막으로 예약된 요청의 seq
    scheduled: u64,
    /// 워커가 마지막으로 처리를 끝낸 요청의 seq
    settled: watch::Receiver<u64>,
}

impl<S: PageStore> AutosaveCoordinator<S> {
    pub fn new(store: S, config: AutosaveConfig) -> Self {
        let (status_tx, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(Inner {
                store,
                config,
                slots: Mutex::new(HashMap::new()),
                status_tx,
                seq: AtomicU64::new(0),
                next_worker: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> AutosaveConfig {
        self.inner.config
    }

    /// 원본 JSON 페이로드로 저장을 예약합니다.
    ///
    /// 페이지 ID가 비었거나 문서 모양이 잘못되면 즉시 `BadRequest`를 돌려주며,
    /// 이런 요청은 저장소로 보내지도 재시도하지도 않습니다.
    pub fn schedule_save(
        &self,
        owner_id: &str,
        page_id: &str,
        content: &Value,
        title: Option<String>,
    ) -> Result<(), AppError> {
        let document = codec::decode_strict(content).map_err(|e| {
            tracing::warn!(page_id, "autosave payload rejected: {}", e);
            AppError::from(e)
        })?;
        self.schedule_document(owner_id, page_id, document, title)
    }

    /// 이미 타입이 있는 문서로 저장을 예약합니다. 편집기 세션이 이 경로를 씁니다.
    pub fn schedule_document(
        &self,
        owner_id: &str,
        page_id: &str,
        document: Document,
        title: Option<String>,
    ) -> Result<(), AppError> {
        if page_id.trim().is_empty() {
            return Err(AppError::BadRequest("autosave requires a page id".to_string()));
        }

        let seq = self.inner.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let request = SaveRequest {
            seq,
            owner_id: owner_id.to_string(),
            page_id: page_id.to_string(),
            title,
            document: document.normalize(),
        };

        let mut slots = lock(&self.inner.slots);
        let slot = slots
            .entry(page_id.to_string())
            .or_insert_with(|| self.spawn_worker(page_id));
        slot.scheduled = seq;

        // 워커가 사라졌으면(패닉 등) 새로 띄워서 다시 보냅니다.
        if let Err(mpsc::error::SendError(request)) = slot.queue.send(request) {
            tracing::warn!(page_id, "autosave worker gone, restarting");
            *slot = self.spawn_worker(page_id);
            slot.scheduled = seq;
            slot.queue.send(request).map_err(|_| {
                AppError::Internal(format!("autosave worker for {} unavailable", page_id))
            })?;
        }

        tracing::debug!(page_id, seq, "autosave scheduled");
        Ok(())
    }

    /// 현재 저장 상태. 한 번도 예약되지 않은 페이지는 Idle.
    pub fn status(&self, page_id: &str) -> SaveStatus {
        lock(&self.inner.slots)
            .get(page_id)
            .map(|slot| slot.status.clone())
            .unwrap_or(SaveStatus::Idle)
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<SaveStatusEvent> {
        self.inner.status_tx.subscribe()
    }

    /// 호출 시점까지 예약된 저장이 모두 끝날 때까지 기다리고, 최종 상태를 돌려줍니다.
    pub async fn flush(&self, page_id: &str) -> SaveStatus {
        let waiting = {
            let slots = lock(&self.inner.slots);
            slots
                .get(page_id)
                .map(|slot| (slot.scheduled, slot.settled.clone()))
        };
        let Some((target, mut settled)) = waiting else {
            return SaveStatus::Idle;
        };

        if settled.wait_for(|done| *done >= target).await.is_err() {
            tracing::warn!(page_id, "autosave worker stopped before flush completed");
        }
        self.status(page_id)
    }

    /// 페이지 슬롯을 없앱니다 (페이지 삭제 시). 남은 요청은 워커가 마저 처리합니다.
    pub fn forget(&self, page_id: &str) {
        if lock(&self.inner.slots).remove(page_id).is_some() {
            tracing::debug!(page_id, "autosave slot released");
        }
    }

    fn spawn_worker(&self, page_id: &str) -> PageSlot {
        let (queue, receiver) = mpsc::unbounded_channel();
        let (settled_tx, settled) = watch::channel(0);
        let worker = self.inner.next_worker.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(run_worker(
            Arc::clone(&self.inner),
            page_id.to_string(),
            worker,
            receiver,
            settled_tx,
        ));
        PageSlot {
            worker,
            queue,
            status: SaveStatus::Idle,
            scheduled: 0,
            settled,
        }
    }
}

async fn run_worker<S: PageStore>(
    inner: Arc<Inner<S>>,
    page_id: String,
    worker: u64,
    mut queue: mpsc::UnboundedReceiver<SaveRequest>,
    settled: watch::Sender<u64>,
) {
    loop {
        let mut latest = match timeout(inner.config.idle_timeout, queue.recv()).await {
            Ok(Some(request)) => request,
            Ok(None) => break,
            Err(_) => {
                let done = *settled.borrow();
                if inner.release_if_idle(&page_id, worker, done) {
                    break;
                }
                continue;
            }
        };
        let mut open = true;
        // trailing debounce: 창 안에 새 요청이 오면 이전 것을 버리고 창을 다시 엽니다.
        loop {
            match timeout(inner.config.debounce, queue.recv()).await {
                Ok(Some(newer)) => {
                    tracing::trace!(page_id = %page_id, dropped = latest.seq, "autosave coalesced");
                    latest = newer;
                }
                Ok(None) => {
                    open = false;
                    break;
                }
                Err(_) => break,
            }
        }

        inner.save_with_retry(&latest).await;
        settled.send_replace(latest.seq);

        if !open {
            break;
        }
    }
    tracing::debug!(page_id = %page_id, "autosave worker finished");
}

impl<S: PageStore> Inner<S> {
    /// 마지막으로 예약된 요청까지 모두 처리했으면 슬롯을 지웁니다. 워커가 끝나도 되면 true.
    ///
    /// 예약(`schedule_document`)도 같은 잠금 안에서 `scheduled`를 올리고 보내므로,
    /// 잠금을 잡은 상태에서 `scheduled == settled`이면 큐에 남은 요청이 없습니다.
    fn release_if_idle(&self, page_id: &str, worker: u64, settled: u64) -> bool {
        let mut slots = lock(&self.slots);
        match slots.get(page_id).map(|slot| (slot.worker, slot.scheduled)) {
            Some((owner, scheduled)) if owner == worker => {
                if scheduled != settled {
                    return false;
                }
                slots.remove(page_id);
                tracing::debug!(page_id, "autosave worker idle, slot released");
                true
            }
            // 이미 forget 되었거나 다른 워커로 교체됨
            _ => true,
        }
    }

    async fn save_with_retry(&self, request: &SaveRequest) {
        let mut attempt = 1;
        loop {
            self.set_status(&request.page_id, SaveStatus::Saving { attempt });

            match self.store.save_page(request).await {
                Ok(()) => {
                    tracing::debug!(page_id = %request.page_id, attempt, "autosave succeeded");
                    self.set_status(&request.page_id, SaveStatus::Saved { at: Utc::now() });
                    return;
                }
                Err(err) if err.is_retryable() && attempt <= self.config.max_retries => {
                    tracing::warn!(
                        page_id = %request.page_id,
                        attempt,
                        "autosave hit transient error, retrying: {}",
                        err
                    );
                    tokio::time::sleep(self.config.retry_backoff).await;
                    attempt += 1;
                }
                Err(err) => {
                    tracing::error!(
                        page_id = %request.page_id,
                        attempt,
                        operation = "autosave",
                        at = %Utc::now(),
                        "save failed: {}",
                        err
                    );
                    self.set_status(
                        &request.page_id,
                        SaveStatus::Error {
                            message: status_message(&err),
                        },
                    );
                    return;
                }
            }
        }
    }

    fn set_status(&self, page_id: &str, status: SaveStatus) {
        if let Some(slot) = lock(&self.slots).get_mut(page_id) {
            slot.status = status.clone();
        }
        let _ = self.status_tx.send(SaveStatusEvent {
            page_id: page_id.to_string(),
            status,
        });
    }
}

// 사용자에게 보여줄 메시지. 예상 외 오류의 내부 내용은 드러내지 않습니다.
fn status_message(err: &AppError) -> String {
    match err.kind() {
        ErrorKind::Validation | ErrorKind::Conflict => err.to_string(),
        ErrorKind::Authorization => "You are not authorized to edit this page".to_string(),
        ErrorKind::NotFound => "This page no longer exists".to_string(),
        ErrorKind::Transient => "Could not save, the server is temporarily unavailable".to_string(),
        ErrorKind::Unexpected => "Could not save your changes".to_string(),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Block, Document};
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use tokio::time::{sleep, Instant};

    #[derive(Debug, Clone, Copy)]
    enum Outcome {
        SchemaCache,
        Forbidden,
    }

    #[derive(Default)]
    struct ScriptedStore {
        script: Mutex<VecDeque<Outcome>>,
        calls: Mutex<Vec<SaveRequest>>,
        saved: Mutex<Vec<SaveRequest>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        latency: Duration,
    }

    impl ScriptedStore {
        fn with_script(script: impl IntoIterator<Item = Outcome>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into_iter().collect()),
                ..Default::default()
            })
        }

        fn with_latency(latency: Duration) -> Arc<Self> {
            Arc::new(Self {
                latency,
                ..Default::default()
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        fn saved_titles(&self) -> Vec<Option<String>> {
            self.saved.lock().unwrap().iter().map(|r| r.title.clone()).collect()
        }
    }

    impl PageStore for ScriptedStore {
        async fn save_page(&self, request: &SaveRequest) -> Result<(), AppError> {
            self.calls.lock().unwrap().push(request.clone());
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if !self.latency.is_zero() {
                sleep(self.latency).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(Outcome::SchemaCache) => Err(AppError::Transient(
                    "Could not find the 'content_json' column in the schema cache".into(),
                )),
                Some(Outcome::Forbidden) => Err(AppError::Forbidden("row-level policy".into())),
                None => {
                    self.saved.lock().unwrap().push(request.clone());
                    Ok(())
                }
            }
        }
    }

    fn two_paragraphs() -> Document {
        Document::new(vec![
            Block::paragraph("Cells are the basic unit of life."),
            Block::paragraph("Mitochondria produce ATP."),
        ])
    }

    fn drain(rx: &mut broadcast::Receiver<SaveStatusEvent>) -> Vec<SaveStatus> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event.status);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_edits_coalesce_into_one_save_with_newest_payload() {
        let store = ScriptedStore::with_script([]);
        let autosave = AutosaveCoordinator::new(Arc::clone(&store), AutosaveConfig::default());

        for i in 0..5 {
            autosave
                .schedule_document("u1", "p1", two_paragraphs(), Some(format!("draft {}", i)))
                .unwrap();
            sleep(Duration::from_millis(40)).await;
        }

        let status = autosave.flush("p1").await;
        assert!(matches!(status, SaveStatus::Saved { .. }));
        assert_eq!(store.saved_titles(), vec![Some("draft 4".to_string())]);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_input_fails_fast_without_touching_store() {
        let store = ScriptedStore::with_script([]);
        let autosave = AutosaveCoordinator::new(Arc::clone(&store), AutosaveConfig::default());

        let doc = json!({ "type": "doc", "content": [] });
        let missing_page = autosave.schedule_save("u1", "  ", &doc, None).unwrap_err();
        assert_eq!(missing_page.kind(), ErrorKind::Validation);

        let malformed = json!({ "type": "paragraph" });
        let bad_doc = autosave.schedule_save("u1", "p1", &malformed, None).unwrap_err();
        assert_eq!(bad_doc.kind(), ErrorKind::Validation);
        assert!(!bad_doc.is_retryable());

        sleep(Duration::from_secs(1)).await;
        assert_eq!(store.call_count(), 0);
        assert_eq!(autosave.status("p1"), SaveStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn schema_cache_error_is_retried_once_then_saved() {
        let store = ScriptedStore::with_script([Outcome::SchemaCache]);
        let config = AutosaveConfig::default();
        let autosave = AutosaveCoordinator::new(Arc::clone(&store), config);
        let mut events = autosave.subscribe_status();

        let started = Instant::now();
        autosave
            .schedule_document("u1", "p1", two_paragraphs(), Some("Biology Notes".into()))
            .unwrap();
        let status = autosave.flush("p1").await;

        assert!(matches!(status, SaveStatus::Saved { .. }));
        assert!(started.elapsed() >= config.debounce + config.retry_backoff);
        assert_eq!(store.call_count(), 2);
        assert_eq!(store.saved_titles(), vec![Some("Biology Notes".to_string())]);

        let seen = drain(&mut events);
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0], SaveStatus::Saving { attempt: 1 });
        assert_eq!(seen[1], SaveStatus::Saving { attempt: 2 });
        assert!(matches!(seen[2], SaveStatus::Saved { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn authorization_error_is_surfaced_without_retry() {
        let store = ScriptedStore::with_script([Outcome::Forbidden]);
        let autosave = AutosaveCoordinator::new(Arc::clone(&store), AutosaveConfig::default());
        let mut events = autosave.subscribe_status();

        autosave
            .schedule_document("u1", "p1", two_paragraphs(), None)
            .unwrap();
        let status = autosave.flush("p1").await;

        assert_eq!(
            status,
            SaveStatus::Error {
                message: "You are not authorized to edit this page".into()
            }
        );
        assert_eq!(store.call_count(), 1);
        assert_eq!(
            drain(&mut events),
            vec![SaveStatus::Saving { attempt: 1 }, status]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn retry_that_fails_again_becomes_error() {
        let store = ScriptedStore::with_script([Outcome::SchemaCache, Outcome::SchemaCache]);
        let autosave = AutosaveCoordinator::new(Arc::clone(&store), AutosaveConfig::default());

        autosave
            .schedule_document("u1", "p1", two_paragraphs(), None)
            .unwrap();
        let status = autosave.flush("p1").await;

        assert!(matches!(status, SaveStatus::Error { .. }));
        assert_eq!(store.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn saves_for_one_page_never_overlap_and_land_in_order() {
        let store = ScriptedStore::with_latency(Duration::from_millis(300));
        let autosave = AutosaveCoordinator::new(Arc::clone(&store), AutosaveConfig::default());

        autosave
            .schedule_document("u1", "p1", two_paragraphs(), Some("older".into()))
            .unwrap();
        // 첫 저장이 진행 중일 때 새 편집이 들어옵니다.
        sleep(Duration::from_millis(150)).await;
        autosave
            .schedule_document("u1", "p1", two_paragraphs(), Some("newer".into()))
            .unwrap();

        autosave.flush("p1").await;
        assert_eq!(store.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(
            store.saved_titles(),
            vec![Some("older".to_string()), Some("newer".to_string())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn pages_are_debounced_independently() {
        let store = ScriptedStore::with_script([]);
        let autosave = AutosaveCoordinator::new(Arc::clone(&store), AutosaveConfig::default());

        autosave.schedule_document("u1", "p1", two_paragraphs(), Some("a".into())).unwrap();
        autosave.schedule_document("u1", "p2", two_paragraphs(), Some("b".into())).unwrap();
        autosave.flush("p1").await;
        autosave.flush("p2").await;

        assert_eq!(store.call_count(), 2);
        assert_eq!(autosave.flush("unknown").await, SaveStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_worker_releases_its_slot_and_page_can_save_again() {
        let store = ScriptedStore::with_script([]);
        let config = AutosaveConfig {
            idle_timeout: Duration::from_secs(5),
            ..AutosaveConfig::default()
        };
        let autosave = AutosaveCoordinator::new(Arc::clone(&store), config);

        autosave.schedule_document("u1", "p1", two_paragraphs(), Some("a".into())).unwrap();
        assert!(matches!(autosave.flush("p1").await, SaveStatus::Saved { .. }));
        assert_eq!(lock(&autosave.inner.slots).len(), 1);

        sleep(Duration::from_secs(10)).await;
        assert!(lock(&autosave.inner.slots).is_empty());
        assert_eq!(autosave.status("p1"), SaveStatus::Idle);

        autosave.schedule_document("u1", "p1", two_paragraphs(), Some("b".into())).unwrap();
        assert!(matches!(autosave.flush("p1").await, SaveStatus::Saved { .. }));
        assert_eq!(
            store.saved_titles(),
            vec![Some("a".to_string()), Some("b".to_string())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn worker_is_kept_while_edits_keep_arriving() {
        let store = ScriptedStore::with_script([]);
        let config = AutosaveConfig {
            idle_timeout: Duration::from_secs(5),
            ..AutosaveConfig::default()
        };
        let autosave = AutosaveCoordinator::new(Arc::clone(&store), config);

        for i in 0..4 {
            autosave
                .schedule_document("u1", "p1", two_paragraphs(), Some(format!("edit {}", i)))
                .unwrap();
            sleep(Duration::from_secs(3)).await;
            assert_eq!(lock(&autosave.inner.slots).len(), 1);
        }
        assert_eq!(store.call_count(), 4);
    }
}
