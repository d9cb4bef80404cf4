use crate::error::StreamError;
use crate::protocol::{Citation, StreamEvent};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Streaming,
    Completed,
    Errored,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Completed | Phase::Errored)
    }
}

/// Everything accumulated for the current query.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionState {
    pub text: String,
    pub citations: Vec<Citation>,
    pub confidence_score: Option<f64>,
    pub phase: Phase,
    pub error_message: Option<String>,
    pub result_id: Option<String>,
    pub context_used: Option<bool>,
    generation: u64,
}

/// Result of a successfully completed stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryOutcome {
    pub text: String,
    pub citations: Vec<Citation>,
    pub confidence_score: Option<f64>,
    pub result_id: Option<String>,
    pub context_used: Option<bool>,
}

/// What the driver should do after an event has been applied.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Step {
    Continue,
    Completed(QueryOutcome),
    Failed(StreamError),
}

impl SessionState {
    pub fn is_streaming(&self) -> bool {
        self.phase == Phase::Streaming
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Clear everything and enter `Streaming` for a new run.
    pub(crate) fn begin(&mut self, generation: u64) {
        *self = SessionState {
            phase: Phase::Streaming,
            generation,
            ..SessionState::default()
        };
    }

    pub(crate) fn clear(&mut self) {
        *self = SessionState {
            generation: self.generation,
            ..SessionState::default()
        };
    }

    /// Apply one inbound event. Events arriving outside `Streaming` are
    /// ignored so a terminal phase can never be left or overwritten.
    pub(crate) fn apply(&mut self, event: StreamEvent) -> Step {
        if self.phase != Phase::Streaming {
            return Step::Continue;
        }

        match event {
            StreamEvent::Token { content } => {
                self.text.push_str(&content);
                Step::Continue
            }
            StreamEvent::Citations {
                sources,
                confidence_score,
            } => {
                self.citations = sources;
                if confidence_score.is_some() {
                    self.confidence_score = confidence_score;
                }
                Step::Continue
            }
            StreamEvent::Done {
                confidence_score,
                query_id,
                context_used,
            } => {
                self.phase = Phase::Completed;
                if confidence_score.is_some() {
                    self.confidence_score = confidence_score;
                }
                self.result_id = query_id;
                self.context_used = context_used;
                Step::Completed(self.outcome())
            }
            StreamEvent::Error { message } => self.fail(StreamError::Application(message)),
        }
    }

    pub(crate) fn fail(&mut self, err: StreamError) -> Step {
        if self.phase != Phase::Streaming {
            return Step::Continue;
        }
        self.phase = Phase::Errored;
        self.error_message = Some(err.to_string());
        Step::Failed(err)
    }

    fn outcome(&self) -> QueryOutcome {
        QueryOutcome {
            text: self.text.clone(),
            citations: self.citations.clone(),
            confidence_score: self.confidence_score,
            result_id: self.result_id.clone(),
            context_used: self.context_used,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn streaming() -> SessionState {
        let mut state = SessionState::default();
        state.begin(1);
        state
    }

    fn token(content: &str) -> StreamEvent {
        StreamEvent::Token {
            content: content.to_string(),
        }
    }

    #[test]
    fn tokens_concatenate_in_order() {
        let mut state = streaming();
        for piece in ["The ", "", "answer ", "", "is 42."] {
            assert_eq!(state.apply(token(piece)), Step::Continue);
        }
        assert_eq!(state.text, "The answer is 42.");
        assert!(state.is_streaming());
    }

    #[test]
    fn citations_replace_previous_set() {
        let mut state = streaming();
        state.apply(StreamEvent::Citations {
            sources: vec![Citation::new(json!({"id": "a"})), Citation::new(json!({"id": "b"}))],
            confidence_score: Some(0.4),
        });
        state.apply(StreamEvent::Citations {
            sources: vec![Citation::new(json!({"id": "c"}))],
            confidence_score: None,
        });

        assert_eq!(state.citations, vec![Citation::new(json!({"id": "c"}))]);
        assert_eq!(state.confidence_score, Some(0.4));
    }

    #[test]
    fn done_completes_and_reports_outcome() {
        let mut state = streaming();
        state.apply(token("42"));
        let step = state.apply(StreamEvent::Done {
            confidence_score: Some(0.9),
            query_id: Some("q-1".to_string()),
            context_used: Some(true),
        });

        assert_eq!(state.phase, Phase::Completed);
        assert_eq!(
            step,
            Step::Completed(QueryOutcome {
                text: "42".to_string(),
                citations: Vec::new(),
                confidence_score: Some(0.9),
                result_id: Some("q-1".to_string()),
                context_used: Some(true),
            })
        );
    }

    #[test]
    fn terminal_phases_are_exclusive() {
        let mut state = streaming();
        state.apply(StreamEvent::Done {
            confidence_score: None,
            query_id: None,
            context_used: None,
        });
        assert_eq!(
            state.apply(StreamEvent::Error {
                message: "late".to_string()
            }),
            Step::Continue
        );
        assert_eq!(state.fail(StreamError::Transport("late".into())), Step::Continue);
        assert_eq!(state.phase, Phase::Completed);
        assert_eq!(state.error_message, None);

        let mut state = streaming();
        let step = state.apply(StreamEvent::Error {
            message: "upstream timeout".to_string(),
        });
        assert_eq!(
            step,
            Step::Failed(StreamError::Application("upstream timeout".to_string()))
        );
        state.apply(token("ignored"));
        state.apply(StreamEvent::Done {
            confidence_score: Some(1.0),
            query_id: None,
            context_used: None,
        });
        assert_eq!(state.phase, Phase::Errored);
        assert_eq!(state.error_message.as_deref(), Some("upstream timeout"));
        assert_eq!(state.text, "");
    }

    #[test]
    fn begin_resets_previous_run() {
        let mut state = streaming();
        state.apply(token("old"));
        state.fail(StreamError::Protocol("bad".into()));

        state.begin(2);
        assert_eq!(state.text, "");
        assert_eq!(state.phase, Phase::Streaming);
        assert_eq!(state.error_message, None);
        assert_eq!(state.generation(), 2);

        state.clear();
        assert_eq!(state.phase, Phase::Idle);
        assert_eq!(state.generation(), 2);
    }
}
