//! # Collaborator Clients
//!
//! The two narrow contracts the VM calls out to while suspended on I/O:
//! knowledge lookup and voice synthesis/transcription. Implementations are
//! injected into the VM at construction time as capability objects - the VM
//! core has zero knowledge of HTTP, model selection, or credentials.
//!
//! ## Implementations
//! - `StaticKnowledge` / `MockVoice`: deterministic, offline, used in tests
//!   and as the CLI default
//! - `ConsoleVoice`: `say` prints, `listen` reads a line from stdin
//! - `HttpKnowledgeClient` / `HttpVoiceClient`: network-backed (see `http`)
//!
//! Timeouts are the client's responsibility; they surface to the VM as a
//! `CollaboratorTimeout` fault.

pub mod http;

pub use http::{CollaboratorConfig, HttpKnowledgeClient, HttpVoiceClient};

use crate::error::{self, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::BufRead;
use std::sync::Mutex;
use std::time::Duration;

/// Answer from a knowledge query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeAnswer {
    pub summary: String,
    #[serde(default)]
    pub related_topics: Vec<String>,
}

impl KnowledgeAnswer {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            related_topics: Vec::new(),
        }
    }

    pub fn with_related(mut self, topics: Vec<String>) -> Self {
        self.related_topics = topics;
        self
    }
}

/// Handle to synthesized audio. The VM never inspects the payload; it only
/// forwards the handle to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioHandle {
    pub id: String,
    #[serde(default)]
    pub duration_ms: u64,
}

/// Knowledge lookup contract.
pub trait KnowledgeClient: Send {
    /// Query the knowledge backend. Synchronous from the VM's viewpoint.
    fn query(&self, text: &str) -> Result<KnowledgeAnswer>;
}

/// Voice I/O contract.
pub trait VoiceClient: Send {
    /// Synthesize speech for `text` in the given emotion.
    fn synthesize(&self, text: &str, emotion: &str) -> Result<AudioHandle>;

    /// Capture and transcribe speech. `timeout` is enforced by the client.
    fn transcribe(&self, timeout: Option<Duration>) -> Result<String>;
}

// Shared handles work as clients too; tests keep one end to assert on the
// recorded traffic after the VM consumed the other.
impl<T: KnowledgeClient + Sync> KnowledgeClient for std::sync::Arc<T> {
    fn query(&self, text: &str) -> Result<KnowledgeAnswer> {
        (**self).query(text)
    }
}

impl<T: VoiceClient + Sync> VoiceClient for std::sync::Arc<T> {
    fn synthesize(&self, text: &str, emotion: &str) -> Result<AudioHandle> {
        (**self).synthesize(text, emotion)
    }

    fn transcribe(&self, timeout: Option<Duration>) -> Result<String> {
        (**self).transcribe(timeout)
    }
}

// =============================================================================
// Offline implementations
// =============================================================================

/// Map-backed knowledge client. Deterministic, no network. Records every
/// query so tests can assert on collaborator traffic.
#[derive(Default)]
pub struct StaticKnowledge {
    answers: HashMap<String, KnowledgeAnswer>,
    queries: Mutex<Vec<String>>,
}

impl StaticKnowledge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a canned answer for an exact query string.
    pub fn with_answer(mut self, query: impl Into<String>, answer: KnowledgeAnswer) -> Self {
        self.answers.insert(query.into(), answer);
        self
    }

    /// Queries received so far, in order.
    pub fn recorded_queries(&self) -> Vec<String> {
        self.queries.lock().expect("query log poisoned").clone()
    }
}

impl KnowledgeClient for StaticKnowledge {
    fn query(&self, text: &str) -> Result<KnowledgeAnswer> {
        self.queries
            .lock()
            .expect("query log poisoned")
            .push(text.to_string());
        Ok(self
            .answers
            .get(text)
            .cloned()
            .unwrap_or_else(|| KnowledgeAnswer::new(format!("no knowledge about '{}'", text))))
    }
}

/// Scripted voice client for tests: records synthesize calls and replays a
/// queue of canned transcripts. An empty queue simulates a timeout.
#[derive(Default)]
pub struct MockVoice {
    spoken: Mutex<Vec<(String, String)>>,
    transcripts: Mutex<Vec<String>>,
}

impl MockVoice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a transcript for the next `transcribe` call.
    pub fn with_transcript(self, text: impl Into<String>) -> Self {
        self.transcripts
            .lock()
            .expect("transcript queue poisoned")
            .push(text.into());
        self
    }

    /// (text, emotion) pairs passed to `synthesize`, in order.
    pub fn spoken(&self) -> Vec<(String, String)> {
        self.spoken.lock().expect("spoken log poisoned").clone()
    }
}

impl VoiceClient for MockVoice {
    fn synthesize(&self, text: &str, emotion: &str) -> Result<AudioHandle> {
        let mut spoken = self.spoken.lock().expect("spoken log poisoned");
        spoken.push((text.to_string(), emotion.to_string()));
        Ok(AudioHandle {
            id: format!("mock-audio-{}", spoken.len()),
            duration_ms: (text.len() as u64) * 60,
        })
    }

    fn transcribe(&self, _timeout: Option<Duration>) -> Result<String> {
        let mut queue = self.transcripts.lock().expect("transcript queue poisoned");
        if queue.is_empty() {
            return Err(error::collaborator_timeout("voice.transcribe"));
        }
        Ok(queue.remove(0))
    }
}

/// Interactive voice client for the CLI: `say` prints to stdout, `listen`
/// reads one line from stdin.
#[derive(Debug, Default)]
pub struct ConsoleVoice;

impl ConsoleVoice {
    pub fn new() -> Self {
        Self
    }
}

impl VoiceClient for ConsoleVoice {
    fn synthesize(&self, text: &str, emotion: &str) -> Result<AudioHandle> {
        if emotion == "neutral" {
            println!("[say] {}", text);
        } else {
            println!("[say:{}] {}", emotion, text);
        }
        Ok(AudioHandle {
            id: "console".to_string(),
            duration_ms: 0,
        })
    }

    fn transcribe(&self, _timeout: Option<Duration>) -> Result<String> {
        let mut line = String::new();
        std::io::stdin()
            .lock()
            .read_line(&mut line)
            .map_err(|e| error::collaborator_failed("voice.transcribe", e.to_string()))?;
        Ok(line.trim_end_matches(['\n', '\r']).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_static_knowledge_canned_answer() {
        let client = StaticKnowledge::new().with_answer(
            "closures",
            KnowledgeAnswer::new("functions capturing their environment")
                .with_related(vec!["scope".into(), "lambda".into()]),
        );

        let answer = client.query("closures").unwrap();
        assert_eq!(answer.summary, "functions capturing their environment");
        assert_eq!(answer.related_topics.len(), 2);
        assert_eq!(client.recorded_queries(), vec!["closures"]);
    }

    #[test]
    fn test_static_knowledge_fallback() {
        let client = StaticKnowledge::new();
        let answer = client.query("anything").unwrap();
        assert!(answer.summary.contains("anything"));
    }

    #[test]
    fn test_mock_voice_records_and_replays() {
        let voice = MockVoice::new().with_transcript("hello vm");

        voice.synthesize("hi", "cheerful").unwrap();
        assert_eq!(voice.spoken(), vec![("hi".to_string(), "cheerful".to_string())]);

        assert_eq!(voice.transcribe(None).unwrap(), "hello vm");
    }

    #[test]
    fn test_mock_voice_empty_queue_times_out() {
        let voice = MockVoice::new();
        let err = voice.transcribe(Some(Duration::from_millis(10))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CollaboratorTimeout);
    }
}
