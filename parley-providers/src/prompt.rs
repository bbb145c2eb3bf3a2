//! Prompt rendering for completion-style models

use crate::base::ContextWindow;

const GENERAL_PREAMBLE: &str = "You are a friendly assistant for the organisation's staff. \
Have a natural, helpful conversation with users. Keep responses concise and conversational.";

const GROUNDED_PREAMBLE: &str = "You are an expert assistant answering questions about the \
organisation's software and processes. Help users navigate the system and understand \
processes using the reference material below.

INSTRUCTIONS:

1. Answer using the information provided below.

2. If the question is ambiguous or could apply to several modules or contexts, ask the user \
to clarify which area they mean.

3. If the question has several parts, address all of them completely.

4. Give clear, step-by-step instructions for processes. Use the exact terminology and field \
names from the reference material.

5. If the reference material does not fully answer the question, use your own knowledge but \
stay consistent with it.

6. Keep answers complete. Do not refer to \"the documentation\" in answers.";

/// Strings after which a completion is cut off
pub const STOP_SEQUENCES: &[&str] = &[
    "USER QUESTION",
    "ANSWER:",
    "YOUR RESPONSE",
    "\nHuman:",
    "\nUser:",
    "\n\nHow do",
    "\n\nWhat is",
    "\n\nCan I",
    "\n\nWhere can",
    "\n\nIs there",
    "\n\nAre there",
    "\nRemember,",
];

fn history_lines(window: &ContextWindow) -> String {
    window
        .history
        .iter()
        .map(|turn| turn.transcript_line())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render a window into a single prompt.
///
/// A grounded window gets the numbered `[SOURCE n: id]` layout with a
/// `CONVERSATION HISTORY` section; otherwise a plain conversational prompt.
pub fn render_prompt(window: &ContextWindow) -> String {
    let history = history_lines(window);

    if !window.is_grounded() {
        let history_section = if history.is_empty() {
            String::new()
        } else {
            format!("\n{}\n", history)
        };
        return format!(
            "{}\n{}Human: {}\nAssistant:",
            GENERAL_PREAMBLE, history_section, window.query
        );
    }

    let mut sources = String::new();
    for (i, passage) in window.passages.iter().enumerate() {
        sources.push_str(&format!(
            "\n[SOURCE {}: {}]\n{}\n",
            i + 1,
            passage.source_id,
            passage.text
        ));
    }

    let history_section = if history.is_empty() {
        String::new()
    } else {
        format!("\nCONVERSATION HISTORY:\n{}\n", history)
    };

    format!(
        "{}\n\nTHIS IS THE INFORMATION YOU HAVE: {}{}\n\nANSWER THIS QUESTION: {}\n\nYOUR ANSWER:",
        GROUNDED_PREAMBLE, sources, history_section, window.query
    )
}

/// Cut generated text at the first stop sequence and trim it
pub fn trim_completion(text: &str) -> String {
    let end = STOP_SEQUENCES
        .iter()
        .filter_map(|stop| text.find(stop))
        .min()
        .unwrap_or(text.len());
    text[..end].trim().to_string()
}
