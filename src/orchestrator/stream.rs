// Streaming turn wrapper
//
// Forwards gateway segments to the caller and closes the turn out (skill
// events, metrics) once the terminal segment has been seen.

use chrono::Utc;
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::metrics;
use crate::providers::{ReplySource, SegmentStream, StreamSegment};
use crate::skills::{SkillExtractor, SkillRecorder};

/// What's needed to record skill events once the reply is complete
pub(crate) struct TurnRecording {
    pub extractor: SkillExtractor,
    pub recorder: SkillRecorder,
    pub user_id: String,
    pub subject_id: String,
    pub user_text: String,
}

enum Source {
    Refusal(std::vec::IntoIter<StreamSegment>),
    Live(SegmentStream),
}

/// Segments of one streamed turn: `Delta`s then exactly one `End` or `Error`.
///
/// Dropping the stream cancels the backend call.
pub struct ChatStream {
    source: Source,
    model: String,
    is_stub: bool,
    reply_source: ReplySource,
    recording: Option<TurnRecording>,
    reply: String,
    finished: bool,
    /// The turn's span; closing the turn logs inside it
    span: tracing::Span,
}

impl ChatStream {
    pub(crate) fn refusal(message: &str) -> Self {
        let segments = vec![StreamSegment::Delta(message.to_string()), StreamSegment::End];
        Self {
            source: Source::Refusal(segments.into_iter()),
            model: crate::config::constants::MODERATION_MODEL_ID.to_string(),
            is_stub: false,
            reply_source: ReplySource::Moderation,
            recording: None,
            reply: String::new(),
            finished: false,
            span: tracing::Span::none(),
        }
    }

    pub(crate) fn live(inner: SegmentStream, recording: Option<TurnRecording>) -> Self {
        let is_stub = inner.is_stub();
        Self {
            model: inner.model().to_string(),
            is_stub,
            reply_source: if is_stub {
                ReplySource::Stub
            } else {
                ReplySource::Backend
            },
            // Stub replies teach nothing about the learner
            recording: if is_stub { None } else { recording },
            source: Source::Live(inner),
            reply: String::new(),
            finished: false,
            span: tracing::Span::none(),
        }
    }

    pub(crate) fn in_span(mut self, span: tracing::Span) -> Self {
        self.span = span;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn is_stub(&self) -> bool {
        self.is_stub
    }

    pub fn source(&self) -> ReplySource {
        self.reply_source
    }

    /// Abort the backend call. The stream yields nothing afterwards.
    pub fn cancel(&mut self) {
        if let Source::Live(inner) = &self.source {
            inner.cancel();
        }
        self.source = Source::Refusal(Vec::new().into_iter());
        self.finish("cancelled");
    }

    fn finish(&mut self, outcome: &str) {
        if self.finished {
            return;
        }
        self.finished = true;
        let span = self.span.clone();
        let _entered = span.enter();
        metrics::record_turn("stream", outcome);
        tracing::debug!(state = outcome, chars = self.reply.len(), "Stream turn closed");
    }

    fn complete(&mut self) {
        let span = self.span.clone();
        let _entered = span.enter();
        if let Some(rec) = self.recording.take() {
            let events = rec.extractor.extract(
                &rec.user_id,
                &rec.subject_id,
                &rec.user_text,
                &self.reply,
                Utc::now(),
            );
            rec.recorder.record(events);
        }
        let outcome = match self.reply_source {
            ReplySource::Moderation => "blocked",
            _ => "completed",
        };
        self.finish(outcome);
    }
}

impl Stream for ChatStream {
    type Item = StreamSegment;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let polled = match &mut this.source {
            Source::Refusal(segments) => Poll::Ready(segments.next()),
            Source::Live(inner) => Pin::new(inner).poll_next(cx),
        };

        match polled {
            Poll::Ready(Some(segment)) => {
                match &segment {
                    StreamSegment::Delta(delta) => {
                        if this.recording.is_some() {
                            this.reply.push_str(delta);
                        }
                    }
                    StreamSegment::End => this.complete(),
                    StreamSegment::Error(e) => {
                        this.recording = None;
                        this.finish(e.kind.as_str());
                    }
                }
                Poll::Ready(Some(segment))
            }
            Poll::Ready(None) => {
                this.finish("cancelled");
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for ChatStream {
    fn drop(&mut self) {
        // Client went away before the terminal segment
        self.finish("cancelled");
    }
}
