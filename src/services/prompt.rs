// Prompt assembly for the tutoring turn: persona/language policy in the
// system instruction, retrieved context + short-term memory in the prompt.

/// Maximum characters of the incoming message kept as the session's
/// last-message preview.
pub const PREVIEW_CHARS: usize = 50;

/// One prior exchange line for short-term conversational memory.
#[derive(Debug, Clone)]
pub struct HistoryLine {
    pub sender: String,
    pub text: String,
}

/// Persona and language policy. English-medium students get an
/// English-only tutor; everyone else gets the Tanglish (Bangla/English)
/// register.
pub fn build_system_instruction(class_level: &str, medium: Option<&str>) -> String {
    let lang_inst = match medium {
        Some(m) if m.contains("English") => "You are a Tutor for English Version.",
        _ => "Speak in Tanglish (Bangla/English).",
    };

    format!(
        "You are a friendly BD Tutor for {}. {} Strictly use Book Context.",
        class_level, lang_inst
    )
}

/// The user prompt: retrieved book context, recent history, and the new
/// question, in the fixed layout the tutor persona expects.
pub fn build_prompt(context: &str, history: &[HistoryLine], question: &str) -> String {
    let history_text = history
        .iter()
        .map(|line| {
            let speaker = if line.sender == "user" { "Student" } else { "Tutor" };
            format!("{}: {}", speaker, line.text)
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "BOOK CONTEXT: {}\nHISTORY: {}\nQUESTION: {}",
        context, history_text, question
    )
}

/// Session preview of an incoming message, truncated on a char boundary.
pub fn message_preview(message: &str) -> String {
    crate::services::retrieval::truncate_chars(message, PREVIEW_CHARS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_policy_english_medium() {
        let system = build_system_instruction("Class 10", Some("English Medium"));
        assert!(system.contains("English Version"));
        assert!(system.contains("Class 10"));
    }

    #[test]
    fn test_language_policy_default_tanglish() {
        assert!(build_system_instruction("Class 9", Some("Bangla Medium")).contains("Tanglish"));
        assert!(build_system_instruction("Class 9", None).contains("Tanglish"));
    }

    #[test]
    fn test_prompt_embeds_context_and_question() {
        let history = vec![
            HistoryLine { sender: "user".to_string(), text: "what is force".to_string() },
            HistoryLine { sender: "ai".to_string(), text: "A push or pull.".to_string() },
        ];
        let prompt = build_prompt("Gravity is a force...", &history, "what is gravity");

        assert!(prompt.contains("BOOK CONTEXT: Gravity is a force..."));
        assert!(prompt.contains("Student: what is force"));
        assert!(prompt.contains("Tutor: A push or pull."));
        assert!(prompt.ends_with("QUESTION: what is gravity"));
    }

    #[test]
    fn test_prompt_with_empty_history() {
        let prompt = build_prompt("No context found.", &[], "hello");
        assert!(prompt.contains("BOOK CONTEXT: No context found."));
        assert!(prompt.contains("HISTORY: \n"));
    }

    #[test]
    fn test_message_preview_truncates() {
        let long = "x".repeat(80);
        assert_eq!(message_preview(&long).chars().count(), PREVIEW_CHARS);
        assert_eq!(message_preview("short"), "short");
    }
}
