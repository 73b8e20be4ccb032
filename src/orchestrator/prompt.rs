//! Outgoing message list assembly and prompt augmentation.

use crate::core::{Message, Role, SearchResult};

/// Instruction sent to the auxiliary vision model.
pub const OCR_PROMPT: &str = "Describe the attached image(s) in detail. \
Transcribe any visible text verbatim, keeping its layout where it matters. \
Do not add commentary beyond what the image shows.";

const SEARCH_INSTRUCTION: &str = "Answer using the search results above where they are relevant, \
and cite the URLs you rely on.";

/// Prepend the image description produced by the vision pre-pass.
pub fn with_image_analysis(prompt: &str, analysis: &str) -> String {
    format!("[image analysis result]\n{}\n\n{prompt}", analysis.trim())
}

/// Append a numbered block of search results plus an instruction to use them.
pub fn with_search_results(prompt: &str, results: &[SearchResult]) -> String {
    if results.is_empty() {
        return prompt.to_string();
    }

    let mut augmented = format!("{prompt}\n\n[search results]\n");
    for (index, result) in results.iter().enumerate() {
        augmented.push_str(&format!("{}. {}\n   {}\n", index + 1, result.title, result.url));
        if !result.snippet.trim().is_empty() {
            augmented.push_str(&format!("   {}\n", result.snippet.trim()));
        }
    }
    augmented.push('\n');
    augmented.push_str(SEARCH_INSTRUCTION);
    augmented
}

/// Render a quoted passage ahead of the turn text.
fn with_quote(text: &str, quoted: Option<&str>) -> String {
    match quoted.map(str::trim).filter(|quoted| !quoted.is_empty()) {
        Some(quoted) => {
            let block: Vec<String> = quoted.lines().map(|line| format!("> {line}")).collect();
            format!("{}\n\n{text}", block.join("\n"))
        }
        None => text.to_string(),
    }
}

/// Whether a stored message may be replayed as conversation context.
fn is_context_turn(message: &Message) -> bool {
    message.role != Role::System
        && !message.is_sentinel()
        && !message.pending
        && !(message.role == Role::Assistant && message.text.trim().is_empty())
}

pub struct PromptInputs<'a> {
    pub history: &'a [Message],
    pub current: &'a Message,
    /// Fully augmented text for the current turn.
    pub current_text: String,
    pub system_prompt: Option<&'a str>,
    pub history_turns: usize,
    pub supports_vision: bool,
}

/// Build the list sent to the answering model: system context, the most
/// recent history turns, then the current turn.
pub fn assemble(inputs: PromptInputs<'_>) -> Vec<Message> {
    let mut messages = Vec::new();

    match inputs.system_prompt.filter(|prompt| !prompt.trim().is_empty()) {
        Some(prompt) => messages.push(Message::system(prompt)),
        None => messages.extend(
            inputs
                .history
                .iter()
                .filter(|m| m.role == Role::System && !m.is_sentinel() && !m.text.trim().is_empty())
                .cloned(),
        ),
    }

    let context: Vec<&Message> = inputs
        .history
        .iter()
        .filter(|m| m.id != inputs.current.id && is_context_turn(m))
        .collect();
    let skip = context.len().saturating_sub(inputs.history_turns);
    for message in context.into_iter().skip(skip) {
        let mut turn = message.clone();
        turn.text = with_quote(&message.text, message.quoted_text.as_deref());
        if !inputs.supports_vision {
            turn.images.clear();
        }
        messages.push(turn);
    }

    let mut current = inputs.current.clone();
    current.text = with_quote(&inputs.current_text, inputs.current.quoted_text.as_deref());
    if !inputs.supports_vision {
        current.images.clear();
    }
    messages.push(current);

    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ImageRef, MessageMarker};

    fn inputs<'a>(history: &'a [Message], current: &'a Message) -> PromptInputs<'a> {
        PromptInputs {
            history,
            current,
            current_text: current.text.clone(),
            system_prompt: None,
            history_turns: 10,
            supports_vision: true,
        }
    }

    #[test]
    fn search_block_is_numbered() {
        let results = vec![
            SearchResult {
                title: "Tokio".into(),
                url: "https://tokio.rs".into(),
                snippet: "An async runtime".into(),
            },
            SearchResult {
                title: "Docs".into(),
                url: "https://docs.rs".into(),
                snippet: String::new(),
            },
        ];
        let prompt = with_search_results("what is tokio?", &results);
        assert!(prompt.starts_with("what is tokio?\n\n[search results]\n1. Tokio\n   https://tokio.rs\n   An async runtime\n2. Docs"));
        assert!(prompt.ends_with(SEARCH_INSTRUCTION));
        assert_eq!(with_search_results("plain", &[]), "plain");
    }

    #[test]
    fn image_analysis_is_prepended() {
        let prompt = with_image_analysis("what breed?", " a corgi \n");
        assert_eq!(prompt, "[image analysis result]\na corgi\n\nwhat breed?");
    }

    #[test]
    fn history_skips_sentinels_placeholders_and_empty_answers() {
        let mut pending = Message::assistant_placeholder("m");
        pending.text = "half".into();
        let history = vec![
            Message::user("one"),
            Message::assistant("answer one"),
            Message::sentinel(MessageMarker::Cancelled, "Generation cancelled."),
            Message::user("two"),
            Message::assistant(""),
            pending,
        ];
        let current = Message::user("three");

        let texts: Vec<String> = assemble(inputs(&history, &current))
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(texts, vec!["one", "answer one", "two", "three"]);
    }

    #[test]
    fn keeps_only_the_most_recent_turns() {
        let history: Vec<Message> = (0..6).map(|i| Message::user(format!("m{i}"))).collect();
        let current = Message::user("now");
        let mut inputs = inputs(&history, &current);
        inputs.history_turns = 2;

        let texts: Vec<String> = assemble(inputs).into_iter().map(|m| m.text).collect();
        assert_eq!(texts, vec!["m4", "m5", "now"]);
    }

    #[test]
    fn current_turn_in_history_is_not_duplicated() {
        let current = Message::user("hi");
        let history = vec![current.clone()];
        assert_eq!(assemble(inputs(&history, &current)).len(), 1);
    }

    #[test]
    fn configured_system_prompt_replaces_inherited_ones() {
        let history = vec![Message::system("inherited"), Message::user("q")];
        let current = Message::user("now");

        let inherited = assemble(inputs(&history, &current));
        assert_eq!(inherited[0].role, Role::System);
        assert_eq!(inherited[0].text, "inherited");

        let mut configured = inputs(&history, &current);
        configured.system_prompt = Some("be brief");
        let messages = assemble(configured);
        assert_eq!(messages[0].text, "be brief");
        assert_eq!(messages.iter().filter(|m| m.role == Role::System).count(), 1);
    }

    #[test]
    fn images_are_stripped_for_text_only_models() {
        let current = Message::user("look").with_images(vec![ImageRef::Inline("AAAA".into())]);
        let mut text_only = inputs(&[], &current);
        text_only.supports_vision = false;
        assert!(!assemble(text_only).last().unwrap().has_images());
        assert!(assemble(inputs(&[], &current)).last().unwrap().has_images());
    }

    #[test]
    fn quote_precedes_the_augmented_text() {
        let current = Message::user("why?").with_quote("line one\nline two");
        let mut inputs = inputs(&[], &current);
        inputs.current_text = "why? (augmented)".into();
        let last = assemble(inputs).pop().unwrap();
        assert_eq!(last.text, "> line one\n> line two\n\nwhy? (augmented)");
    }
}
