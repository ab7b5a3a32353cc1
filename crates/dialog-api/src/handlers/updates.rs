// ============================================================================
// Dialog API - Update Handler
// File: crates/dialog-api/src/handlers/updates.rs
// ============================================================================
//! Incoming chat messages: commands and conversation turns

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use validator::Validate;

use dialog_core::{ChatId, DialogError};

use crate::commands::Command;
use crate::mode_store::UserId;
use crate::replies;
use crate::response::ApiResponse;
use crate::state::AppState;

/// One message delivered by the chat transport
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateRequest {
    pub chat_id: ChatId,
    pub user_id: UserId,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[validate(length(min = 1, max = 8192))]
    pub text: String,
}

impl UpdateRequest {
    /// Label recorded as the session owner.
    fn owner(&self) -> String {
        self.username
            .clone()
            .or_else(|| self.full_name.clone())
            .unwrap_or_else(|| self.user_id.to_string())
    }

    /// Name used when greeting the user.
    fn display_name(&self) -> String {
        self.full_name
            .clone()
            .or_else(|| self.username.clone())
            .unwrap_or_else(|| "friend".to_string())
    }
}

/// Text to send back to the chat
#[derive(Debug, Serialize)]
pub struct ReplyDto {
    pub chat_id: ChatId,
    pub text: String,
}

/// Update handler - POST /api/v1/updates
pub async fn handle_update(
    State(state): State<AppState>,
    Json(payload): Json<UpdateRequest>,
) -> Result<Json<ApiResponse<ReplyDto>>, (StatusCode, Json<ApiResponse<()>>)> {
    if let Err(e) = payload.validate() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("VALIDATION_ERROR", &e.to_string())),
        ));
    }

    let text = match Command::parse(&payload.text) {
        Some(command) => run_command(&state, &payload, command).await,
        None => converse(&state, &payload).await,
    };

    Ok(Json(ApiResponse::success(ReplyDto {
        chat_id: payload.chat_id,
        text,
    })))
}

async fn run_command(state: &AppState, payload: &UpdateRequest, command: Command) -> String {
    let chat_id = payload.chat_id;
    let user_id = payload.user_id;

    match command {
        Command::Start => {
            state
                .modes
                .set_mode(chat_id, user_id, dialog_core::Mode::Window)
                .await;
            match state
                .dispatcher
                .start_session(chat_id, &payload.owner())
                .await
            {
                Ok(()) => {
                    info!(chat_id, user_id, "Conversation started");
                    replies::hello(&payload.display_name())
                }
                Err(e) => reply_for_error(chat_id, &e),
            }
        }
        Command::ResetContext => match state.dispatcher.reset_session(chat_id).await {
            Ok(()) => replies::RESET_CHAT_TEXT.to_string(),
            Err(e) => reply_for_error(chat_id, &e),
        },
        Command::Help => replies::HELP_TEXT.to_string(),
        Command::Window | Command::Inline => {
            let mode = if command == Command::Window {
                dialog_core::Mode::Window
            } else {
                dialog_core::Mode::Inline
            };
            state.modes.set_mode(chat_id, user_id, mode).await;
            replies::mode_selected(mode).to_string()
        }
        Command::CurrentMode => {
            replies::current_mode(state.modes.get_mode(chat_id, user_id).await)
        }
    }
}

async fn converse(state: &AppState, payload: &UpdateRequest) -> String {
    let mode = state.modes.get_mode(payload.chat_id, payload.user_id).await;

    let result = {
        let _timer = state.metrics.start_request_timer();
        state
            .dispatcher
            .answer(payload.chat_id, &payload.text, mode)
            .await
    };

    match result {
        Ok(answer) => answer,
        Err(e) => reply_for_error(payload.chat_id, &e),
    }
}

fn reply_for_error(chat_id: ChatId, err: &DialogError) -> String {
    let text = match err {
        DialogError::SessionAlreadyExists(_) => replies::EXIST_CHAT_TEXT,
        DialogError::NoSession(_) => replies::NO_EXIST_CHAT_TEXT,
        DialogError::UndeterminedMode => replies::NO_MODE_TEXT,
        e if e.is_out_of_memory() => replies::OUT_OF_MEMORY_TEXT,
        e => {
            error!(chat_id, error = ?e, "Failed to process message");
            replies::CONFUSED_TEXT
        }
    };
    text.to_string()
}
