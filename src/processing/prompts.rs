//! Prompt templates for the two stages of the question-answering chain.

use super::types::{ChatRole, ChatTurn};

/// Only the most recent turns are sent to the model.
pub(crate) const MAX_HISTORY_TURNS: usize = 12;

/// Render the condensation prompt that turns a follow-up into a standalone question.
pub(crate) fn condense_prompt(history: &[ChatTurn], question: &str) -> String {
    format!(
        "Given the conversation below and a follow-up question, rewrite the follow-up so it can \
         be understood without the conversation. Keep its meaning and language. Reply with the \
         rewritten question only.\n\n\
         Conversation:\n{history}\n\n\
         Follow-up question: {question}\n\
         Standalone question:",
        history = format_history(history),
    )
}

/// Render the answering prompt over retrieved context and recent history.
pub(crate) fn answer_prompt(context: &str, history: &[ChatTurn], question: &str) -> String {
    let history = if history.is_empty() {
        "(no previous messages)".to_string()
    } else {
        format_history(history)
    };
    format!(
        "You answer questions about the user's uploaded documents. Use only the context and the \
         conversation below. If the context does not contain the answer, say that you don't \
         know instead of guessing. If the question has nothing to do with the context, politely \
         explain that you can only answer questions about the uploaded documents.\n\n\
         Context:\n{context}\n\n\
         Conversation:\n{history}\n\n\
         Question: {question}\n\
         Answer:"
    )
}

/// One `Role: text` line per turn, limited to the last [`MAX_HISTORY_TURNS`].
pub(crate) fn format_history(history: &[ChatTurn]) -> String {
    let start = history.len().saturating_sub(MAX_HISTORY_TURNS);
    history[start..]
        .iter()
        .map(|turn| {
            let speaker = match turn.role {
                ChatRole::User => "User",
                ChatRole::Assistant => "Assistant",
            };
            format!("{speaker}: {}", turn.text.trim())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Join retrieved passages into one context block.
pub(crate) fn combine_documents(passages: &[String]) -> String {
    passages.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(role: ChatRole, text: &str) -> ChatTurn {
        ChatTurn {
            role,
            text: text.into(),
        }
    }

    #[test]
    fn history_keeps_only_recent_turns() {
        let history: Vec<ChatTurn> = (0..20)
            .map(|i| turn(ChatRole::User, &format!("message {i}")))
            .collect();

        let rendered = format_history(&history);

        assert_eq!(rendered.lines().count(), MAX_HISTORY_TURNS);
        assert!(rendered.starts_with("User: message 8"));
        assert!(rendered.ends_with("User: message 19"));
    }

    #[test]
    fn condense_prompt_includes_history_and_question() {
        let history = vec![
            turn(ChatRole::User, "What does the report cover?"),
            turn(ChatRole::Assistant, "Third quarter revenue."),
        ];
        let prompt = condense_prompt(&history, "How much did it grow?");

        assert!(prompt.contains("User: What does the report cover?"));
        assert!(prompt.contains("Assistant: Third quarter revenue."));
        assert!(prompt.contains("Follow-up question: How much did it grow?"));
    }

    #[test]
    fn answer_prompt_embeds_context_and_refusal_rules() {
        let prompt = answer_prompt("alpha\n\nbeta", &[], "What is alpha?");

        assert!(prompt.contains("Context:\nalpha\n\nbeta"));
        assert!(prompt.contains("(no previous messages)"));
        assert!(prompt.contains("don't know"));
        assert!(prompt.ends_with("Question: What is alpha?\nAnswer:"));
    }

    #[test]
    fn documents_are_joined_by_blank_lines() {
        let passages = vec!["one".to_string(), "two".to_string()];
        assert_eq!(combine_documents(&passages), "one\n\ntwo");
    }
}
