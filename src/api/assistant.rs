//! AI assistant endpoints
//!
//! The widget works without JavaScript through the form posts; the JSON
//! endpoints back the enhanced, in-place version.

use axum::{
    extract::{Extension, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{
    append_cookie, read_cookie, redirect_back, set_cookie, ApiError, AppState, CookieOptions,
    CurrentSession, ONE_YEAR_SECS,
};
use crate::config::QuickPrompt;
use crate::models::ChatMessage;
use crate::services::assistant::{
    load_or_create_conversation_id, parse_panel_width, resize, speech_bubble_dismissed, Conversation,
    PanelLayout, CONVERSATION_COOKIE, PANEL_WIDTH_COOKIE, SPEECH_BUBBLE_COOKIE,
};
use crate::services::toast::ToastKind;

/// Form routes
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/assistant/send", post(send_message_form))
        .route("/assistant/clear", post(clear_conversation_form))
        .route("/assistant/bubble/dismiss", post(dismiss_bubble_form))
}

/// JSON routes, nested under `/api`
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/assistant/history", get(get_history))
        .route("/assistant/chat", post(chat))
        .route("/assistant/clear", post(clear_conversation))
        .route("/assistant/prompts", get(get_prompts))
        .route("/assistant/panel", put(resize_panel))
}

/// Panel toggles carried in the page query string
#[derive(Debug, Default, Deserialize)]
pub struct PanelQuery {
    #[serde(default)]
    pub assistant: Option<String>,
    #[serde(default)]
    pub maximized: bool,
    /// Viewport width reported by the client, if known
    #[serde(default)]
    pub viewport: Option<u32>,
}

impl PanelQuery {
    pub fn is_open(&self) -> bool {
        self.assistant.as_deref() == Some("open")
    }
}

/// Everything `base.html` needs to draw the widget
#[derive(Debug, Serialize)]
pub struct AssistantView {
    pub open: bool,
    pub maximized: bool,
    pub width: u32,
    pub conversation_id: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub loading: bool,
    pub error: Option<String>,
    pub quick_prompts: Vec<QuickPrompt>,
    /// Greeting bubble beside the closed panel's button
    pub show_bubble: bool,
}

/// Build the widget state for a page. History is only fetched while the
/// panel is open.
pub async fn assistant_view(
    state: &AppState,
    headers: &HeaderMap,
    query: &PanelQuery,
    token: Option<&str>,
) -> AssistantView {
    let mut layout = PanelLayout::initial(read_cookie(headers, PANEL_WIDTH_COOKIE).as_deref(), query.viewport);
    if query.maximized && !layout.maximized {
        layout.toggle_maximize();
    }

    let mut conversation = Conversation::default();
    if query.is_open() {
        let (id, created) = load_or_create_conversation_id(read_cookie(headers, CONVERSATION_COOKIE).as_deref());
        if !created {
            conversation = state.assistant.conversation(&id).await;
            if conversation.messages.is_empty() {
                conversation = state.assistant.load_history(token, &id).await;
            }
        }
    }

    let bubble_dismissed = speech_bubble_dismissed(read_cookie(headers, SPEECH_BUBBLE_COOKIE).as_deref());

    AssistantView {
        open: query.is_open(),
        maximized: layout.maximized,
        width: layout.width,
        conversation_id: (!conversation.id.is_empty()).then_some(conversation.id),
        messages: conversation.messages,
        loading: conversation.loading,
        error: conversation.error,
        quick_prompts: state.assistant.quick_prompts().to_vec(),
        show_bubble: !query.is_open() && !bubble_dismissed,
    }
}

fn conversation_cookie(state: &AppState, id: &str) -> String {
    set_cookie(
        CONVERSATION_COOKIE,
        id,
        CookieOptions {
            http_only: true,
            secure: state.config.server.secure_cookies,
            max_age_secs: Some(ONE_YEAR_SECS),
        },
    )
}

#[derive(Debug, Deserialize)]
pub struct SendMessageForm {
    pub message: String,
    #[serde(default)]
    pub return_to: Option<String>,
}

async fn send_message_form(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    headers: HeaderMap,
    Form(form): Form<SendMessageForm>,
) -> Response {
    let (id, created) = load_or_create_conversation_id(read_cookie(&headers, CONVERSATION_COOKIE).as_deref());

    let mut session = current.0.lock().await;
    let token = state.auth.access_token(&mut session).await;
    if let Err(e) = state.assistant.send(token.as_deref(), &id, &form.message).await {
        session.toast(e.to_string(), ToastKind::Warning, state.config.toast.auto_hide_ms);
    }
    drop(session);

    let mut response = redirect_back(form.return_to.as_deref(), "/?assistant=open").into_response();
    if created {
        append_cookie(&mut response, conversation_cookie(&state, &id));
    }
    response
}

#[derive(Debug, Deserialize)]
pub struct ReturnForm {
    #[serde(default)]
    pub return_to: Option<String>,
}

async fn clear_conversation_form(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<ReturnForm>,
) -> Response {
    let current_id = read_cookie(&headers, CONVERSATION_COOKIE).unwrap_or_default();
    let fresh_id = state.assistant.clear(&current_id).await;

    let mut response = redirect_back(form.return_to.as_deref(), "/?assistant=open").into_response();
    append_cookie(&mut response, conversation_cookie(&state, &fresh_id));
    response
}

async fn dismiss_bubble_form(State(state): State<AppState>, Form(form): Form<ReturnForm>) -> Response {
    let mut response = redirect_back(form.return_to.as_deref(), "/").into_response();
    append_cookie(
        &mut response,
        set_cookie(
            SPEECH_BUBBLE_COOKIE,
            "true",
            CookieOptions {
                http_only: false,
                secure: state.config.server.secure_cookies,
                max_age_secs: Some(ONE_YEAR_SECS),
            },
        ),
    );
    response
}

async fn get_history(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    headers: HeaderMap,
) -> Json<Conversation> {
    let Some(id) = read_cookie(&headers, CONVERSATION_COOKIE) else {
        return Json(Conversation::default());
    };
    let token = {
        let mut session = current.0.lock().await;
        state.auth.access_token(&mut session).await
    };
    Json(state.assistant.load_history(token.as_deref(), &id).await)
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub reply: String,
    pub conversation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

async fn chat(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    let (id, created) = load_or_create_conversation_id(read_cookie(&headers, CONVERSATION_COOKIE).as_deref());
    let token = {
        let mut session = current.0.lock().await;
        state.auth.access_token(&mut session).await
    };

    let reply = state.assistant.send(token.as_deref(), &id, &request.message).await?;
    let error = state.assistant.conversation(&id).await.error;

    let mut response = Json(ChatResponse {
        reply,
        conversation_id: id.clone(),
        error,
    })
    .into_response();
    if created {
        append_cookie(&mut response, conversation_cookie(&state, &id));
    }
    Ok(response)
}

async fn clear_conversation(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let current_id = read_cookie(&headers, CONVERSATION_COOKIE).unwrap_or_default();
    let fresh_id = state.assistant.clear(&current_id).await;

    let mut response = Json(serde_json::json!({ "conversation_id": fresh_id })).into_response();
    append_cookie(&mut response, conversation_cookie(&state, &fresh_id));
    response
}

async fn get_prompts(State(state): State<AppState>) -> Json<Vec<QuickPrompt>> {
    Json(state.assistant.quick_prompts().to_vec())
}

#[derive(Debug, Deserialize)]
pub struct PanelResizeRequest {
    /// Width when the drag started; the stored width when absent
    #[serde(default)]
    pub start_width: Option<u32>,
    pub start_x: i32,
    pub current_x: i32,
    pub viewport_width: u32,
}

async fn resize_panel(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<PanelResizeRequest>,
) -> Response {
    let start_width = request
        .start_width
        .unwrap_or_else(|| parse_panel_width(read_cookie(&headers, PANEL_WIDTH_COOKIE).as_deref()));
    let width = resize(start_width, request.start_x, request.current_x, request.viewport_width);

    let mut response = Json(serde_json::json!({ "width": width })).into_response();
    append_cookie(
        &mut response,
        set_cookie(
            PANEL_WIDTH_COOKIE,
            &width.to_string(),
            CookieOptions {
                http_only: false,
                secure: state.config.server.secure_cookies,
                max_age_secs: Some(ONE_YEAR_SECS),
            },
        ),
    );
    response
}
