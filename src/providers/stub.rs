// Deterministic placeholder backend
//
// Used whenever no model endpoint is configured, so the UI and persistence
// layers can be exercised without a live model.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::error::ProviderError;
use super::types::{BackendReply, ProviderRequest};
use super::{ChatBackend, DeltaReceiver};
use crate::config::constants::STUB_MODEL_ID;

/// Words per streamed segment
const WORDS_PER_SEGMENT: usize = 3;

#[derive(Debug, Clone, Default)]
pub struct StubBackend;

impl StubBackend {
    pub fn new() -> Self {
        Self
    }

    /// The placeholder reply. Depends only on the subject and the latest question.
    pub fn placeholder(request: &ProviderRequest) -> String {
        let subject = if request.subject_name.is_empty() {
            "tutoring"
        } else {
            request.subject_name.as_str()
        };
        let question = request
            .latest_user_content()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .unwrap_or("(no question received)");

        format!(
            "(Stub mode) No language model is configured, so this is a placeholder {subject} answer.\n\n\
             I would normally answer using the {subject} teaching style: step by step, with hints before final answers.\n\n\
             To enable a real tutor, start an OpenAI-compatible server (for example LM Studio) and set \
             OPENAI_BASE_URL (e.g. http://localhost:1234/v1) and OPENAI_MODEL.\n\n\
             Your latest question was:\n\n{question}"
        )
    }

    /// Split text into word-sized segments whose concatenation is the original text
    pub fn segments(text: &str) -> Vec<String> {
        let words: Vec<&str> = text.split_inclusive(char::is_whitespace).collect();
        words
            .chunks(WORDS_PER_SEGMENT)
            .map(|chunk| chunk.concat())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

#[async_trait]
impl ChatBackend for StubBackend {
    async fn complete(&self, request: &ProviderRequest) -> Result<BackendReply, ProviderError> {
        Ok(BackendReply {
            content: Self::placeholder(request),
            model: STUB_MODEL_ID.to_string(),
        })
    }

    async fn stream(
        &self,
        request: &ProviderRequest,
        cancel: CancellationToken,
    ) -> Result<DeltaReceiver, ProviderError> {
        let segments = Self::segments(&Self::placeholder(request));
        let (tx, rx) = mpsc::channel(8);

        tokio::spawn(async move {
            for segment in segments {
                if cancel.is_cancelled() {
                    break;
                }
                if tx.send(Ok(segment)).await.is_err() {
                    break;
                }
                tokio::task::yield_now().await;
            }
        });

        Ok(rx)
    }

    fn name(&self) -> &str {
        "stub"
    }

    fn model(&self) -> &str {
        STUB_MODEL_ID
    }

    fn is_stub(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ChatMessage;

    fn request(question: &str) -> ProviderRequest {
        ProviderRequest::new(vec![
            ChatMessage::system("system prompt"),
            ChatMessage::user(question),
        ])
        .with_subject("math", "Math")
    }

    #[test]
    fn test_placeholder_is_subject_aware_and_deterministic() {
        let a = StubBackend::placeholder(&request("What is a prime?"));
        let b = StubBackend::placeholder(&request("What is a prime?"));
        assert_eq!(a, b);
        assert!(a.contains("placeholder Math answer"));
        assert!(a.ends_with("What is a prime?"));
    }

    #[test]
    fn test_segments_reconstruct_text() {
        let text = StubBackend::placeholder(&request("Explain\nfactoring  please"));
        let segments = StubBackend::segments(&text);
        assert!(segments.len() > 1);
        assert_eq!(segments.concat(), text);
    }

    #[tokio::test]
    async fn test_stream_matches_complete() {
        let backend = StubBackend::new();
        let req = request("Why is the sky blue?");
        let full = backend.complete(&req).await.unwrap().content;

        let mut rx = backend.stream(&req, CancellationToken::new()).await.unwrap();
        let mut streamed = String::new();
        let mut count = 0;
        while let Some(delta) = rx.recv().await {
            streamed.push_str(&delta.unwrap());
            count += 1;
        }
        assert_eq!(streamed, full);
        assert!(count > 1);
    }
}
