//! Note-card harvesting.
//!
//! A model turn that asks something, followed by the user's reply, becomes a
//! note card once both sides are summarized.

use crate::Conversation;
use crate::backend::Backend;
use crate::types::{ChatTurn, NoteCard, Role};
use futures::future::join_all;

const QUESTION_FALLBACK_CHARS: usize = 30;
const ANSWER_FALLBACK_CHARS: usize = 40;

/// A model question and the user's answer, with the answer's index in the
/// transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QaPair<'a> {
    pub question: &'a ChatTurn,
    pub answer: &'a ChatTurn,
    pub answer_index: usize,
}

/// Find every (model question, user answer) pair in `turns`.
pub fn qa_pairs(turns: &[ChatTurn]) -> Vec<QaPair<'_>> {
    turns
        .windows(2)
        .enumerate()
        .filter_map(|(i, pair)| {
            let (question, answer) = (&pair[0], &pair[1]);
            let asks = question.text.contains('?') || question.text.contains('？');
            (question.role == Role::Model && answer.role == Role::User && asks).then_some(QaPair {
                question,
                answer,
                answer_index: i + 1,
            })
        })
        .collect()
}

/// Cut `text` to `max` characters, marking the cut.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((byte, _)) => format!("{}...", &text[..byte]),
        None => text.to_string(),
    }
}

impl<B: Backend> Conversation<B> {
    /// Summarize every pair concurrently into note cards, in input order.
    ///
    /// A pair whose summary call fails still yields a card, with truncated
    /// text standing in for the summaries.
    pub async fn harvest_notes(&self, pairs: &[QaPair<'_>]) -> Vec<NoteCard> {
        let calls = pairs.iter().map(|pair| async move {
            let question = &pair.question.text;
            let answer = &pair.answer.text;
            match self.summarize(question, answer).await {
                Ok(summary) => NoteCard {
                    question: question.clone(),
                    question_summary: summary.question_summary,
                    answer: answer.clone(),
                    answer_summary: summary.answer_summary,
                },
                Err(e) => {
                    tracing::warn!(answer_index = pair.answer_index, "note summary failed, using excerpt: {e}");
                    NoteCard {
                        question: question.clone(),
                        question_summary: truncate_chars(question, QUESTION_FALLBACK_CHARS),
                        answer: answer.clone(),
                        answer_summary: truncate_chars(answer, ANSWER_FALLBACK_CHARS),
                    }
                }
            }
        });
        join_all(calls).await
    }
}
