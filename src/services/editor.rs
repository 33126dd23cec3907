//! # 편집기 세션 컨트롤러
//!
//! 한 세션은 한 번에 정확히 하나의 페이지에 묶입니다. 페이지를 바꿀 때 이전 페이지의
//! 내용이 새 페이지 쪽으로 새어 나가면 안 됩니다.
//!
//! ```text
//! Idle ─begin_open→ Loading(tag) ─acknowledge→ Bound(tag) ─begin_open→ Loading(tag') ...
//!                                                        └─close→ Closed (종료)
//! ```
//!
//! - `begin_open`은 `&mut self` 안에서 모델을 통째로 교체하므로 중간 상태(빈 문서)가
//!   관찰자에게 보이지 않습니다.
//! - `Loading` 동안 들어오는 편집은 렌더링 결과의 메아리이므로 무시합니다(Suppressed).
//!   렌더 계층이 `acknowledge`로 적용 완료를 알려야 `Bound`가 됩니다.
//! - 모든 편집에는 `SessionTag { page_id, epoch }`가 붙고, 현재 태그와 다르면 버립니다.

use std::collections::HashMap;
use std::future::Future;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::{
    error::AppError,
    models::{Document, EditRequest, OpenEditorResponse, Page},
    services::{
        autosave::{AutosaveCoordinator, PageStore, SaveStatus, SqlitePageStore},
        codec,
    },
};

/// 세션이 특정 페이지에 묶인 한 번의 바인딩을 식별합니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SessionTag {
    pub page_id: String,
    pub epoch: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "session", rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Loading(SessionTag),
    Bound(SessionTag),
    Closed,
}

/// `begin_open`이 돌려주는 표. 렌더링이 끝나면 이 태그로 `acknowledge` 합니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenTicket {
    pub tag: SessionTag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EditOutcome {
    /// 모델이 바뀌었고 관찰자에게 알렸습니다.
    Applied,
    /// 구조적으로 같은 내용이라 아무 일도 하지 않았습니다.
    Unchanged,
    /// 프로그램적 교체(Loading) 중이라 무시했습니다.
    Suppressed,
    /// 이전 바인딩의 편집이라 버렸습니다.
    Stale,
    Closed,
}

/// 사용자 편집 한 건. 관찰자(자동 저장 등)에게 전달됩니다.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalEdit {
    pub tag: SessionTag,
    pub title: String,
    pub document: Document,
}

/// 렌더 계층. 내용을 화면에 적용한 뒤에야 완료됩니다.
pub trait RenderSurface {
    fn render(
        &self,
        tag: &SessionTag,
        title: &str,
        document: &Document,
    ) -> impl Future<Output = Result<(), AppError>> + Send;
}

type Observer = Box<dyn Fn(&LocalEdit) + Send + Sync>;

pub struct EditorSession {
    state: SessionState,
    epoch: u64,
    title: String,
    document: Document,
    observers: Vec<Observer>,
}

impl Default for EditorSession {
    fn default() -> Self {
        Self::new()
    }
}

impl EditorSession {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            epoch: 0,
            title: String::new(),
            document: Document::empty(),
            observers: Vec::new(),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn current_tag(&self) -> Option<&SessionTag> {
        match &self.state {
            SessionState::Loading(tag) | SessionState::Bound(tag) => Some(tag),
            SessionState::Idle | SessionState::Closed => None,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn on_local_edit(&mut self, observer: impl Fn(&LocalEdit) + Send + Sync + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// 모델을 새 페이지 내용으로 한 번에 교체하고 `Loading`으로 들어갑니다.
    pub fn begin_open(
        &mut self,
        page_id: &str,
        title: &str,
        content: Document,
    ) -> Result<OpenTicket, AppError> {
        if self.state == SessionState::Closed {
            return Err(AppError::BadRequest("editor session is closed".to_string()));
        }
        if page_id.trim().is_empty() {
            return Err(AppError::BadRequest("page id is required".to_string()));
        }

        self.epoch += 1;
        let tag = SessionTag {
            page_id: page_id.to_string(),
            epoch: self.epoch,
        };
        self.title = title.to_string();
        self.document = content.normalize();
        self.state = SessionState::Loading(tag.clone());

        tracing::debug!(page_id, epoch = self.epoch, "editor loading page");
        Ok(OpenTicket { tag })
    }

    /// 렌더 완료 확인. 현재 진행 중인 `Loading`과 태그가 같을 때만 `Bound`로 넘어갑니다.
    pub fn acknowledge(&mut self, tag: &SessionTag) -> bool {
        match &self.state {
            SessionState::Loading(current) if current == tag => {
                self.state = SessionState::Bound(tag.clone());
                true
            }
            _ => {
                tracing::debug!(page_id = %tag.page_id, epoch = tag.epoch, "ignored stale render ack");
                false
            }
        }
    }

    /// 내용을 교체하고 렌더 계층의 적용 완료를 기다린 뒤 `Bound`가 됩니다.
    /// 렌더가 실패하면 세션은 `Loading`에 머물러 편집을 계속 억제합니다.
    pub async fn open(
        &mut self,
        page_id: &str,
        title: &str,
        content: Document,
        surface: &impl RenderSurface,
    ) -> Result<SessionTag, AppError> {
        let ticket = self.begin_open(page_id, title, content)?;
        surface
            .render(&ticket.tag, &self.title, &self.document)
            .await?;
        self.acknowledge(&ticket.tag);
        Ok(ticket.tag)
    }

    pub fn apply_local_edit(
        &mut self,
        tag: &SessionTag,
        title: Option<String>,
        document: Document,
    ) -> EditOutcome {
        let current = match &self.state {
            SessionState::Closed => return EditOutcome::Closed,
            SessionState::Idle => return EditOutcome::Stale,
            SessionState::Loading(current) => {
                return if current == tag {
                    EditOutcome::Suppressed
                } else {
                    EditOutcome::Stale
                };
            }
            SessionState::Bound(current) => current,
        };
        if current != tag {
            return EditOutcome::Stale;
        }

        let document = document.normalize();
        let title = title.unwrap_or_else(|| self.title.clone());
        if document.equals(&self.document) && title == self.title {
            return EditOutcome::Unchanged;
        }

        self.title = title;
        self.document = document;

        let edit = LocalEdit {
            tag: tag.clone(),
            title: self.title.clone(),
            document: self.document.clone(),
        };
        for observer in &self.observers {
            observer(&edit);
        }
        EditOutcome::Applied
    }

    /// 세션을 끝냅니다. 이후의 모든 편집은 `Closed`로 거부됩니다.
    pub fn close(&mut self) -> Option<SessionTag> {
        let last = self.current_tag().cloned();
        self.state = SessionState::Closed;
        self.document = Document::empty();
        self.title.clear();
        self.observers.clear();
        last
    }
}

// ── 서버 측: 사용자별 세션 ──

#[derive(Debug, Clone, Serialize)]
pub struct EditorStatus {
    pub session: SessionState,
    pub save: SaveStatus,
}

/// 인증된 사용자마다 편집기 세션 하나를 두고, 적용된 편집을 자동 저장으로 넘깁니다.
pub struct EditorHub<S: PageStore = SqlitePageStore> {
    sessions: Mutex<HashMap<String, EditorSession>>,
    autosave: AutosaveCoordinator<S>,
}

impl<S: PageStore> EditorHub<S> {
    pub fn new(autosave: AutosaveCoordinator<S>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            autosave,
        }
    }

    pub fn autosave(&self) -> &AutosaveCoordinator<S> {
        &self.autosave
    }

    /// 페이지를 세션에 엽니다. 호출자는 이미 페이지 접근 권한을 확인했어야 합니다.
    pub async fn open(&self, user_id: &str, page: Page) -> Result<OpenEditorResponse, AppError> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions
            .entry(user_id.to_string())
            .or_insert_with(|| self.new_session(user_id));
        if *session.state() == SessionState::Closed {
            *session = self.new_session(user_id);
        }

        let ticket = session.begin_open(&page.id, &page.title, page.content_json)?;
        Ok(OpenEditorResponse {
            page_id: ticket.tag.page_id,
            epoch: ticket.tag.epoch,
            title: session.title().to_string(),
            content_json: session.document().clone(),
        })
    }

    pub async fn acknowledge(&self, user_id: &str, tag: &SessionTag) -> Result<bool, AppError> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions.get_mut(user_id).ok_or(AppError::NotFound)?;
        Ok(session.acknowledge(tag))
    }

    pub async fn edit(&self, user_id: &str, request: EditRequest) -> Result<EditOutcome, AppError> {
        let document = codec::decode_strict(&request.content_json)?;
        let tag = SessionTag {
            page_id: request.page_id,
            epoch: request.epoch,
        };

        let mut sessions = self.sessions.lock().await;
        let session = sessions.get_mut(user_id).ok_or(AppError::NotFound)?;
        let outcome = session.apply_local_edit(&tag, request.title, document);
        if outcome != EditOutcome::Applied {
            tracing::debug!(user_id, page_id = %tag.page_id, ?outcome, "local edit not propagated");
        }
        Ok(outcome)
    }

    pub async fn status(&self, user_id: &str) -> EditorStatus {
        let sessions = self.sessions.lock().await;
        let session = sessions
            .get(user_id)
            .map(|s| s.state().clone())
            .unwrap_or(SessionState::Idle);
        let save = match &session {
            SessionState::Loading(tag) | SessionState::Bound(tag) => self.autosave.status(&tag.page_id),
            _ => SaveStatus::Idle,
        };
        EditorStatus { session, save }
    }

    /// 세션을 닫고, 마지막 페이지의 남은 저장이 끝날 때까지 기다립니다.
    pub async fn close(&self, user_id: &str) -> SaveStatus {
        let last = {
            let mut sessions = self.sessions.lock().await;
            sessions.remove(user_id).and_then(|mut s| s.close())
        };
        match last {
            Some(tag) => self.autosave.flush(&tag.page_id).await,
            None => SaveStatus::Idle,
        }
    }

    fn new_session(&self, user_id: &str) -> EditorSession {
        let mut session = EditorSession::new();
        let autosave = self.autosave.clone();
        let owner = user_id.to_string();
        session.on_local_edit(move |edit| {
            if let Err(e) = autosave.schedule_document(
                &owner,
                &edit.tag.page_id,
                edit.document.clone(),
                Some(edit.title.clone()),
            ) {
                tracing::warn!(page_id = %edit.tag.page_id, "autosave not scheduled: {}", e);
            }
        });
        session
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Block, Visibility};
    use crate::services::autosave::{AutosaveConfig, SaveRequest};
    use serde_json::json;
    use std::sync::{Arc, Mutex as StdMutex};

    struct InstantSurface {
        rendered: StdMutex<Vec<(SessionTag, String)>>,
    }

    impl RenderSurface for InstantSurface {
        async fn render(&self, tag: &SessionTag, _title: &str, document: &Document) -> Result<(), AppError> {
            tokio::task::yield_now().await;
            self.rendered
                .lock()
                .unwrap()
                .push((tag.clone(), document.extract_plain_text()));
            Ok(())
        }
    }

    struct FailingSurface;

    impl RenderSurface for FailingSurface {
        async fn render(&self, _: &SessionTag, _: &str, _: &Document) -> Result<(), AppError> {
            Err(AppError::Internal("renderer crashed".into()))
        }
    }

    #[derive(Default)]
    struct RecordingStore {
        saved: StdMutex<Vec<SaveRequest>>,
    }

    impl PageStore for RecordingStore {
        async fn save_page(&self, request: &SaveRequest) -> Result<(), AppError> {
            self.saved.lock().unwrap().push(request.clone());
            Ok(())
        }
    }

    fn doc(text: &str) -> Document {
        Document::new(vec![Block::paragraph(text)])
    }

    fn page(id: &str, text: &str) -> Page {
        Page {
            id: id.to_string(),
            user_id: "u1".to_string(),
            section_id: "s1".to_string(),
            parent_page_id: None,
            title: format!("Page {}", id),
            content: text.to_string(),
            content_json: doc(text),
            visibility: Visibility::Private,
            created_at: "2026-01-01T00:00:00.000Z".to_string(),
            updated_at: "2026-01-01T00:00:00.000Z".to_string(),
        }
    }

    fn recorder(session: &mut EditorSession) -> Arc<StdMutex<Vec<LocalEdit>>> {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        session.on_local_edit(move |edit| sink.lock().unwrap().push(edit.clone()));
        seen
    }

    #[tokio::test]
    async fn open_waits_for_render_ack_before_binding() {
        let mut session = EditorSession::new();
        let surface = InstantSurface {
            rendered: StdMutex::new(Vec::new()),
        };

        let tag = session.open("a", "Alpha", doc("alpha"), &surface).await.unwrap();
        assert_eq!(*session.state(), SessionState::Bound(tag.clone()));
        assert_eq!(surface.rendered.lock().unwrap()[0], (tag, "alpha".to_string()));
    }

    #[tokio::test]
    async fn failed_render_keeps_edits_suppressed() {
        let mut session = EditorSession::new();
        let seen = recorder(&mut session);

        assert!(session.open("a", "Alpha", doc("alpha"), &FailingSurface).await.is_err());
        let tag = session.current_tag().cloned().unwrap();
        assert!(matches!(session.state(), SessionState::Loading(_)));
        assert_eq!(session.apply_local_edit(&tag, None, doc("echo")), EditOutcome::Suppressed);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn edits_during_loading_are_suppressed() {
        let mut session = EditorSession::new();
        let seen = recorder(&mut session);

        let ticket = session.begin_open("a", "Alpha", doc("alpha")).unwrap();
        // 렌더러가 내용 적용 중에 내보낸 변경
        assert_eq!(
            session.apply_local_edit(&ticket.tag, None, doc("alpha")),
            EditOutcome::Suppressed
        );
        assert!(seen.lock().unwrap().is_empty());

        assert!(session.acknowledge(&ticket.tag));
        assert_eq!(
            session.apply_local_edit(&ticket.tag, None, doc("alpha edited")),
            EditOutcome::Applied
        );
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn switching_pages_never_bleeds_content() {
        let mut session = EditorSession::new();
        let seen = recorder(&mut session);

        let a = session.begin_open("a", "Alpha", doc("alpha")).unwrap().tag;
        session.acknowledge(&a);
        session.apply_local_edit(&a, None, doc("unsaved alpha edit"));

        let b = session.begin_open("b", "Beta", doc("beta")).unwrap().tag;
        // A의 편집이 늦게 도착해도 B에는 들어가지 않습니다.
        assert_eq!(session.apply_local_edit(&a, None, doc("late alpha")), EditOutcome::Stale);
        assert_eq!(session.document().extract_plain_text(), "beta");

        // A 렌더의 늦은 확인도 무시됩니다.
        assert!(!session.acknowledge(&a));
        assert!(session.acknowledge(&b));
        assert_eq!(session.title(), "Beta");
        assert!(!session.document().extract_plain_text().contains("alpha"));

        let edits = seen.lock().unwrap();
        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].tag.page_id, "a");
    }

    #[test]
    fn reopening_same_page_gets_new_epoch() {
        let mut session = EditorSession::new();
        let first = session.begin_open("a", "Alpha", doc("one")).unwrap().tag;
        session.acknowledge(&first);
        let second = session.begin_open("a", "Alpha", doc("two")).unwrap().tag;
        session.acknowledge(&second);

        assert_ne!(first, second);
        assert_eq!(session.apply_local_edit(&first, None, doc("x")), EditOutcome::Stale);
    }

    #[test]
    fn identical_content_is_unchanged() {
        let mut session = EditorSession::new();
        let seen = recorder(&mut session);
        let tag = session.begin_open("a", "Alpha", doc("same")).unwrap().tag;
        session.acknowledge(&tag);

        assert_eq!(session.apply_local_edit(&tag, None, doc("same")), EditOutcome::Unchanged);
        assert_eq!(
            session.apply_local_edit(&tag, Some("Renamed".into()), doc("same")),
            EditOutcome::Applied
        );
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn closed_session_rejects_everything() {
        let mut session = EditorSession::new();
        let tag = session.begin_open("a", "Alpha", doc("alpha")).unwrap().tag;
        session.acknowledge(&tag);

        assert_eq!(session.close(), Some(tag.clone()));
        assert_eq!(session.apply_local_edit(&tag, None, doc("x")), EditOutcome::Closed);
        assert!(session.begin_open("b", "Beta", doc("beta")).is_err());
        assert!(session.document().is_empty());
    }

    #[test]
    fn empty_page_id_is_rejected() {
        let mut session = EditorSession::new();
        assert!(matches!(
            session.begin_open("", "Untitled", Document::empty()),
            Err(AppError::BadRequest(_))
        ));
        assert_eq!(*session.state(), SessionState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn hub_routes_edits_to_the_page_they_were_made_on() {
        let store = Arc::new(RecordingStore::default());
        let hub = EditorHub::new(AutosaveCoordinator::new(
            Arc::clone(&store),
            AutosaveConfig::default(),
        ));

        let a = hub.open("u1", page("a", "alpha")).await.unwrap();
        let a_tag = SessionTag { page_id: a.page_id.clone(), epoch: a.epoch };
        assert!(hub.acknowledge("u1", &a_tag).await.unwrap());

        let edit = EditRequest {
            page_id: "a".into(),
            epoch: a.epoch,
            title: None,
            content_json: json!({
                "type": "doc",
                "content": [{ "type": "paragraph", "content": [{ "type": "text", "text": "alpha v2" }] }]
            }),
        };
        assert_eq!(hub.edit("u1", edit).await.unwrap(), EditOutcome::Applied);

        let b = hub.open("u1", page("b", "beta")).await.unwrap();
        assert_eq!(b.content_json.extract_plain_text(), "beta");

        let late = EditRequest {
            page_id: "a".into(),
            epoch: a.epoch,
            title: None,
            content_json: json!({ "type": "doc", "content": [] }),
        };
        assert_eq!(hub.edit("u1", late).await.unwrap(), EditOutcome::Stale);

        let malformed = EditRequest {
            page_id: "b".into(),
            epoch: b.epoch,
            title: None,
            content_json: json!("not a document"),
        };
        assert!(matches!(hub.edit("u1", malformed).await, Err(AppError::BadRequest(_))));

        hub.autosave().flush("a").await;
        let status = hub.close("u1").await;
        assert_eq!(status, SaveStatus::Idle);

        let saved = store.saved.lock().unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].page_id, "a");
        assert_eq!(saved[0].owner_id, "u1");
        assert_eq!(saved[0].document.extract_plain_text(), "alpha v2");
    }
}
