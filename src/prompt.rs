//! Prompt assembly
//!
//! Deterministic construction of the request text: fixed preamble, recent
//! conversation turns, document context, then the new question, under a
//! total character budget. When space runs out, history goes first, context
//! second; the question itself is never truncated.

use thiserror::Error;

use crate::conversation::ConversationTurn;
use crate::document::{ContextSnippet, char_len, take_chars_at_whitespace};

/// Fixed instructions explaining the prompt layout to the model. The
/// user-configurable system prompt rides separately in the request payload.
pub const PREAMBLE: &str = "You are a reading companion. The reader is viewing a PDF; an excerpt \
around the currently visible pages follows, possibly preceded by text the \
reader selected. Ground your answer in that excerpt and say so when it does \
not contain the answer.";

const SECTION_SEP: &str = "\n\n";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AssembleError {
    /// Preamble plus question alone overflow the budget. User-visible;
    /// recoverable by shortening the question.
    #[error("question too long for the prompt budget of {budget} characters")]
    BudgetExceeded { budget: usize },
}

/// Assemble the full prompt text.
///
/// `turns` is the window of history the caller is willing to replay (most
/// recent last); the largest suffix of it that fits is included. Identical
/// inputs always produce an identical prompt.
pub fn assemble(
    snippet: &ContextSnippet,
    turns: &[ConversationTurn],
    question: &str,
    max_total_chars: usize,
) -> Result<String, AssembleError> {
    let question_block = format!("Question: {question}");
    let sep = char_len(SECTION_SEP);

    let base = char_len(PREAMBLE) + sep + char_len(&question_block);
    if base > max_total_chars {
        return Err(AssembleError::BudgetExceeded {
            budget: max_total_chars,
        });
    }
    let mut avail = max_total_chars - base;

    let context_header = match &snippet.pages {
        Some(pages) => format!(
            "Document excerpt (pages {}-{}):",
            pages.start() + 1,
            pages.end() + 1
        ),
        // No page contributed (e.g. the snippet is selection only)
        None => "Document excerpt:".to_string(),
    };

    let mut context_block = None;
    let mut context_fits_whole = true;

    if !snippet.is_empty() {
        let full_context = format!("{context_header}\n{}", snippet.text);
        if sep + char_len(&full_context) <= avail {
            avail -= sep + char_len(&full_context);
            context_block = Some(full_context);
        } else {
            // Context must shrink before any history is considered
            context_fits_whole = false;
            let header_cost = sep + char_len(&context_header) + 1;
            if avail > header_cost {
                let text = take_chars_at_whitespace(&snippet.text, avail - header_cost);
                if !text.is_empty() {
                    context_block = Some(format!("{context_header}\n{text}"));
                }
            }
        }
    }

    // History claims what remains once the context, possibly empty, is in
    // whole; a truncated context means the budget is already exhausted
    let mut history: Vec<&ConversationTurn> = Vec::new();
    if context_fits_whole {
        for turn in turns.iter().rev() {
            let block_len = sep
                + char_len("Q: ")
                + char_len(&turn.question)
                + char_len("\nA: ")
                + char_len(&turn.answer);
            if block_len > avail {
                break;
            }
            avail -= block_len;
            history.push(turn);
        }
    }

    let mut prompt = String::from(PREAMBLE);
    for turn in history.iter().rev() {
        prompt.push_str(SECTION_SEP);
        prompt.push_str("Q: ");
        prompt.push_str(&turn.question);
        prompt.push_str("\nA: ");
        prompt.push_str(&turn.answer);
    }
    if let Some(context) = context_block {
        prompt.push_str(SECTION_SEP);
        prompt.push_str(&context);
    }
    prompt.push_str(SECTION_SEP);
    prompt.push_str(&question_block);

    debug_assert!(char_len(&prompt) <= max_total_chars);
    Ok(prompt)
}
