//! Multi-turn session state and prompt continuation.

use crate::prompt::{EffectivePrompt, Prompt, Role, Turn};
use crate::types::SessionId;
use std::time::SystemTime;
use tracing::{debug, info, trace};

/// Accumulated conversation reused across generation calls.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub created_at: SystemTime,
    last_prompt: Prompt,
    transcript: Vec<Turn>,
    /// Assistant turn being streamed; `None` between turns.
    response: Option<String>,
}

impl Session {
    fn new(prompt: Prompt) -> Self {
        let mut session = Self {
            id: SessionId::new(),
            created_at: SystemTime::now(),
            last_prompt: prompt.clone(),
            transcript: Vec::new(),
            response: None,
        };
        session.begin_turn(prompt);
        session
    }

    pub fn last_prompt(&self) -> &Prompt {
        &self.last_prompt
    }

    /// Completed turns, oldest first.
    pub fn transcript(&self) -> &[Turn] {
        &self.transcript
    }

    /// Text of the assistant turn currently being streamed.
    pub fn in_progress_response(&self) -> Option<&str> {
        self.response.as_deref()
    }

    /// Callers close any unfinished response first.
    fn begin_turn(&mut self, prompt: Prompt) {
        self.transcript
            .push(Turn::new(Role::User, prompt.as_str().to_string()));
        self.last_prompt = prompt;
        self.response = Some(String::new());
    }

    /// Append streamed text to the in-progress assistant turn.
    pub fn record_delta(&mut self, text: &str) {
        match &mut self.response {
            Some(response) => response.push_str(text),
            None => {
                trace!("Session {}: delta recorded outside a turn, opening one", self.id);
                self.response = Some(text.to_string());
            }
        }
    }

    /// Close the in-progress assistant turn so later prompts include it.
    pub fn end_turn(&mut self) {
        if let Some(response) = self.response.take() {
            trace!(
                "Session {}: closing assistant turn ({} chars)",
                self.id,
                response.len()
            );
            self.transcript.push(Turn::new(Role::Assistant, response));
        }
    }
}

/// Holder for the optional session of one generator.
///
/// Owned exclusively by the generator, so only one generation at a time can
/// touch it.
#[derive(Debug, Default)]
pub struct SessionSlot {
    session: Option<Session>,
}

impl SessionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute the effective prompt for a call and record the new user turn.
    ///
    /// With sessions disabled the prompt is returned as is and any existing
    /// session is discarded.
    pub fn prepare(&mut self, prompt: Prompt, session_enabled: bool) -> EffectivePrompt {
        if !session_enabled {
            self.reset_session();
            return EffectivePrompt::standalone(prompt);
        }

        match &mut self.session {
            None => {
                let session = Session::new(prompt.clone());
                info!("Created new session: {}", session.id);
                self.session = Some(session);
                EffectivePrompt::standalone(prompt)
            }
            Some(session) => {
                if session.response.is_some() {
                    debug!("Session {}: closing unfinished turn", session.id);
                    session.end_turn();
                }
                let history = session.transcript.clone();
                debug!(
                    "Session {}: continuing with {} prior turn(s)",
                    session.id,
                    history.len()
                );
                session.begin_turn(prompt.clone());
                EffectivePrompt { history, prompt }
            }
        }
    }

    /// Drop the session and its history. Returns whether one existed.
    pub fn reset_session(&mut self) -> bool {
        match self.session.take() {
            Some(session) => {
                info!(
                    "Discarding session {} with {} turn(s)",
                    session.id,
                    session.transcript.len()
                );
                true
            }
            None => false,
        }
    }

    pub fn record_delta(&mut self, text: &str) {
        if let Some(session) = &mut self.session {
            session.record_delta(text);
        }
    }

    pub fn end_turn(&mut self) {
        if let Some(session) = &mut self.session {
            session.end_turn();
        }
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }
}
