//! User-facing message output.
//!
//! The compiler driver and the runtime controllers report through this
//! trait instead of talking to a UI directly, so the same code runs under
//! a GUI shell, a headless host, or a test.

/// Trait for reporting to the user and asking for decisions.
pub trait MessageSink: Send + Sync {
    /// Show an informational message.
    fn info(&self, text: &str);

    /// Show an error message.
    fn error(&self, text: &str);

    /// Ask the user a question with up to three answers.
    fn confirm(&self, request: &ConfirmRequest) -> ConfirmAnswer;
}

/// A question posed to the user.
#[derive(Debug, Clone)]
pub struct ConfirmRequest {
    pub title: String,
    pub body: String,
}

impl ConfirmRequest {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
        }
    }
}

/// Answer to a [`ConfirmRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmAnswer {
    Yes,
    No,
    Cancel,
}

/// A no-op sink that discards messages and answers yes to every question.
///
/// Useful for testing or when no user is attached.
pub struct NullMessageSink;

impl MessageSink for NullMessageSink {
    fn info(&self, _text: &str) {}

    fn error(&self, _text: &str) {}

    fn confirm(&self, _request: &ConfirmRequest) -> ConfirmAnswer {
        ConfirmAnswer::Yes
    }
}

/// Entry recorded by [`VecMessageSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEntry {
    Info(String),
    Error(String),
}

/// A vector-based sink that collects messages.
///
/// Useful for testing to verify what was reported to the user.
pub struct VecMessageSink {
    entries: std::sync::Mutex<Vec<SinkEntry>>,
    confirm_answer: std::sync::Mutex<ConfirmAnswer>,
}

impl VecMessageSink {
    pub fn new() -> Self {
        Self {
            entries: std::sync::Mutex::new(Vec::new()),
            confirm_answer: std::sync::Mutex::new(ConfirmAnswer::Yes),
        }
    }

    /// Set the answer returned by subsequent `confirm` calls.
    pub fn set_confirm_answer(&self, answer: ConfirmAnswer) {
        *self.confirm_answer.lock().unwrap() = answer;
    }

    /// All recorded entries, in order.
    pub fn entries(&self) -> Vec<SinkEntry> {
        self.entries.lock().unwrap().clone()
    }

    /// Only the recorded info messages.
    pub fn infos(&self) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter_map(|e| match e {
                SinkEntry::Info(s) => Some(s),
                SinkEntry::Error(_) => None,
            })
            .collect()
    }

    /// Only the recorded error messages.
    pub fn errors(&self) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter_map(|e| match e {
                SinkEntry::Error(s) => Some(s),
                SinkEntry::Info(_) => None,
            })
            .collect()
    }

    /// Clear all recorded entries.
    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

impl Default for VecMessageSink {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageSink for VecMessageSink {
    fn info(&self, text: &str) {
        self.entries
            .lock()
            .unwrap()
            .push(SinkEntry::Info(text.to_string()));
    }

    fn error(&self, text: &str) {
        self.entries
            .lock()
            .unwrap()
            .push(SinkEntry::Error(text.to_string()));
    }

    fn confirm(&self, _request: &ConfirmRequest) -> ConfirmAnswer {
        *self.confirm_answer.lock().unwrap()
    }
}
