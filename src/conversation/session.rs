//! Per-chat session state and input validation

use std::collections::HashMap;
use std::num::{IntErrorKind, ParseIntError};

use parking_lot::Mutex;
use thiserror::Error;

/// Shortest accepted prompt, in characters after trimming
pub const MIN_PROMPT_CHARS: usize = 5;

/// Longest accepted prompt, in characters after trimming
pub const MAX_PROMPT_CHARS: usize = 200;

/// Most images one batch may request
pub const MAX_IMAGES: u8 = 3;

/// Rejected user input. The chat stays in its current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please enter a valid prompt.")]
    EmptyPrompt,

    #[error("Your prompt is too short. Please provide more details.")]
    PromptTooShort,

    #[error("Your prompt is too long. Please shorten it to under 200 characters.")]
    PromptTooLong,

    #[error("Please enter a valid number.")]
    InvalidNumber,

    #[error("Please enter a number between 1 and 3.")]
    CountOutOfRange,
}

/// Trim and length-check a prompt
pub fn validate_prompt(text: &str) -> Result<String, ValidationError> {
    let prompt = text.trim();
    let len = prompt.chars().count();

    if len == 0 {
        Err(ValidationError::EmptyPrompt)
    } else if len < MIN_PROMPT_CHARS {
        Err(ValidationError::PromptTooShort)
    } else if len > MAX_PROMPT_CHARS {
        Err(ValidationError::PromptTooLong)
    } else {
        Ok(prompt.to_string())
    }
}

/// Parse the requested number of images
pub fn parse_image_count(text: &str) -> Result<u8, ValidationError> {
    // Integers too large for i64 are still integers, just out of range
    let count: i64 = text.trim().parse().map_err(|e: ParseIntError| {
        match e.kind() {
            IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => {
                ValidationError::CountOutOfRange
            }
            _ => ValidationError::InvalidNumber,
        }
    })?;

    if (1..=i64::from(MAX_IMAGES)).contains(&count) {
        Ok(count as u8)
    } else {
        Err(ValidationError::CountOutOfRange)
    }
}

/// Conversation state of one chat
///
/// A session only exists once a prompt has been accepted, so a count can
/// never be present without a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub prompt: String,
    pub image_count: Option<u8>,
}

/// Where a chat is in the prompt -> count -> generate cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatState {
    NoSession,
    AwaitingCount,
    Generating,
}

/// In-memory sessions keyed by chat id
///
/// The lock is only held for map access, never across an await.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<i64, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state of a chat
    pub fn state(&self, chat_id: i64) -> ChatState {
        match self.sessions.lock().get(&chat_id) {
            None => ChatState::NoSession,
            Some(Session {
                image_count: None, ..
            }) => ChatState::AwaitingCount,
            Some(_) => ChatState::Generating,
        }
    }

    /// Snapshot of a chat's session
    pub fn get(&self, chat_id: i64) -> Option<Session> {
        self.sessions.lock().get(&chat_id).cloned()
    }

    /// Open a session with an accepted prompt
    pub fn start(&self, chat_id: i64, prompt: String) {
        self.sessions.lock().insert(
            chat_id,
            Session {
                prompt,
                image_count: None,
            },
        );
    }

    /// Record the image count; returns the completed session
    pub fn set_count(&self, chat_id: i64, count: u8) -> Option<Session> {
        let mut sessions = self.sessions.lock();
        let session = sessions.get_mut(&chat_id)?;
        session.image_count = Some(count);
        Some(session.clone())
    }

    /// Delete a chat's session
    pub fn remove(&self, chat_id: i64) -> Option<Session> {
        self.sessions.lock().remove(&chat_id)
    }

    /// Number of open sessions
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
