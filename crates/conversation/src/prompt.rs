//! Prompt text.
//!
//! The conversational system prompt is a value handed to [`Conversation`]
//! rather than a global, so tests and callers can swap it.
//!
//! [`Conversation`]: crate::Conversation

use crate::types::{NoteCard, OutlineSection};
use serde::Serialize;

/// User text sent when the model should produce the session's opening turn.
pub const OPENING_FILLER: &str = "Hello";

/// Shown when a backend answers with an empty reply.
pub const EMPTY_REPLY_FALLBACK: &str =
    "Threadball dropped the thread for a moment. Could you say that again, boss?";

const DEFAULT_SYSTEM_PROMPT: &str = r#"# Role: Threadball, the creative midwife

You are Threadball, a nimble little creature who helps the user (whom you call "boss") pull one taut, resonant string out of a tangled ball of ideas.

## Rules
1. Open with a warm greeting, quote the motto "Every idea starts as a tangle and ends as a single string", and invite the boss to share raw material or a loose thread of inspiration.
2. Do not ask any of the Five Threads questions until the boss has shared concrete material.
3. Once material arrives, walk the Five Threads strictly in order, one thread and one question at a time:
   - Direction: why are we pulling this thread at all?
   - Trace: who is tied to the other end?
   - Need: which piece of thread does that reader lack right now?
   - Resonance: what sound should the reader make when the string is plucked?
   - Tuning: is the pitch right for an ordinary reader?
4. Never dump several questions at once.

## Suggested options
After the boss answers one of the Five Threads questions, if the next step has clear structured choices, you may end your reply with a block fenced by ~~~json and ~~~ holding:

~~~json
{
  "suggestedOptions": ["first option", "second option", "third option"]
}
~~~

Keep each option short, clear and tied to the current thread. The boss can click one or type freely.
"#;

/// The persona and behavioural rules attached to every conversational call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemPrompt(String);

impl SystemPrompt {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SystemPrompt {
    fn default() -> Self {
        Self::new(DEFAULT_SYSTEM_PROMPT)
    }
}

#[derive(Serialize)]
struct TemplateSlot<'a> {
    id: &'a str,
    title: &'a str,
    content: &'static str,
}

/// Prompt asking the model to fill `template` from the note cards.
pub fn outline_prompt(template: &[OutlineSection], notes: &[NoteCard]) -> String {
    let slots: Vec<TemplateSlot<'_>> = template
        .iter()
        .map(|s| TemplateSlot {
            id: &s.id,
            title: &s.title,
            content: "...",
        })
        .collect();
    let structure = serde_json::to_string_pretty(&slots).unwrap_or_else(|_| "[]".to_string());

    let ideas = notes
        .iter()
        .map(|n| format!("Q: {}\nA: {}", n.question, n.answer))
        .collect::<Vec<_>>()
        .join("\n\n---\n\n");

    format!(
        r#"You are an expert content strategist named "Threadball". Your task is to populate a given content outline structure using key information from a question-and-answer session.

**The Goal Outline Structure is:**
{structure}

**The User's Core Ideas (from Q&A) are:**
{ideas}

**Your Task:**
1. Carefully read the user's core ideas.
2. Fill in the 'content' field for each section in the outline. Use the user's original answers as much as possible, placing each relevant answer into the most appropriate section. You may lightly edit for flow or combine answers, but prioritize the user's original phrasing.
3. The 'id' and 'title' of each section MUST remain exactly the same as in the provided structure.
4. You MUST return a single valid JSON array of sections matching the goal structure. Do not include any other text, explanations, or markdown fences.
"#
    )
}

/// Chat message asking the model to write a first draft from an outline.
pub fn draft_request(outline_markdown: &str) -> String {
    format!(
        "Boss, here is the string we untangled together. Please weave it into a first draft \
         of the article with a clear structure and smooth flow. Keep the Markdown formatting \
         so I can edit it afterwards. Here is the outline:\n\n{outline_markdown}"
    )
}

/// Prompt asking for a two-field summary of one question/answer pair.
pub fn summary_prompt(question: &str, answer: &str) -> String {
    format!(
        r#"You are a summarization expert. Provide a very concise summary for a question and its answer. The user is a creator organizing their thoughts; the summaries are for quick reference.

**Question:**
"""
{question}
"""

**Answer:**
"""
{answer}
"""

**Your Task:**
Respond with a single valid JSON object with two keys: "questionSummary" and "answerSummary".
- "questionSummary": a very short summary of the question's core intent (e.g. "writing purpose", "target reader").
- "answerSummary": a very short summary of the key information in the answer.
- Do not include any other text, explanations, or markdown fences.
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_prompt_mentions_option_marker() {
        let prompt = SystemPrompt::default();
        assert!(prompt.as_str().contains("~~~json"));
        assert!(prompt.as_str().contains("suggestedOptions"));
    }

    #[test]
    fn outline_prompt_lists_ids_and_answers() {
        let template = vec![OutlineSection::new("sec-1", "Hook", "placeholder text")];
        let notes = vec![NoteCard {
            question: "Who reads this?".into(),
            question_summary: "reader".into(),
            answer: "New managers".into(),
            answer_summary: "new managers".into(),
        }];
        let prompt = outline_prompt(&template, &notes);
        assert!(prompt.contains("\"id\": \"sec-1\""));
        assert!(prompt.contains("Q: Who reads this?\nA: New managers"));
        assert!(!prompt.contains("placeholder text"));
    }

    #[test]
    fn draft_request_ends_with_outline() {
        let request = draft_request("## Hook\n\nTabs.");
        assert!(request.starts_with("Boss,"));
        assert!(request.ends_with("Here is the outline:\n\n## Hook\n\nTabs."));
    }
}
