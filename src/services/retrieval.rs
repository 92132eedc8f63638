// Retrieval context for a chat turn: canonical content keys, the
// single-document textbook lookup, and chunking for the vector path.

use sqlx::PgPool;

/// Default character budget for retrieved context embedded in a prompt.
/// Overridable via CONTEXT_CHAR_BUDGET.
pub const DEFAULT_CONTEXT_CHAR_BUDGET: usize = 12_000;

/// Returned verbatim when no textbook content exists for the requested
/// chapter.
pub const FALLBACK_CONTEXT: &str = "No context found.";

/// Target chunk size (chars) when splitting uploaded chapter text for the
/// vector store.
pub const CHUNK_TARGET_CHARS: usize = 1_500;

/// Structured identifier for one chapter's textbook content.
///
/// `encode` is injective: distinct (class_level, subject, chapter_id)
/// triples always produce distinct keys, unlike naive `join("_")` which
/// collides on embedded separators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentKey {
    pub class_level: String,
    pub subject: String,
    pub chapter_id: String,
}

impl ContentKey {
    pub fn new(class_level: &str, subject: &str, chapter_id: &str) -> Self {
        Self {
            class_level: class_level.to_string(),
            subject: subject.to_string(),
            chapter_id: chapter_id.to_string(),
        }
    }

    /// Canonical storage key. Fields are escaped then joined with `::`;
    /// spaces render as `_` for readability, with literal underscores
    /// escaped so the mapping stays reversible.
    pub fn encode(&self) -> String {
        [&self.class_level, &self.subject, &self.chapter_id]
            .iter()
            .map(|f| escape_field(f))
            .collect::<Vec<_>>()
            .join("::")
    }

    /// Reverse of `encode`. None for malformed keys.
    pub fn decode(key: &str) -> Option<Self> {
        let parts: Vec<&str> = key.split("::").collect();
        if parts.len() != 3 {
            return None;
        }

        Some(Self {
            class_level: unescape_field(parts[0])?,
            subject: unescape_field(parts[1])?,
            chapter_id: unescape_field(parts[2])?,
        })
    }
}

fn escape_field(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    for ch in field.chars() {
        match ch {
            '%' => out.push_str("%25"),
            ':' => out.push_str("%3A"),
            '_' => out.push_str("%5F"),
            ' ' => out.push('_'),
            _ => out.push(ch),
        }
    }
    out
}

fn unescape_field(field: &str) -> Option<String> {
    let mut out = String::with_capacity(field.len());
    let mut chars = field.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '_' => out.push(' '),
            '%' => {
                let hi = chars.next()?;
                let lo = chars.next()?;
                match (hi, lo) {
                    ('2', '5') => out.push('%'),
                    ('3', 'A') => out.push(':'),
                    ('5', 'F') => out.push('_'),
                    _ => return None,
                }
            }
            _ => out.push(ch),
        }
    }
    Some(out)
}

/// Fetch the chapter's textbook text for prompt grounding. A missing row
/// and a database failure both degrade to the fallback string; retrieval
/// problems never fail a chat turn.
pub async fn fetch_context(pool: &PgPool, key: &ContentKey, char_budget: usize) -> String {
    let row = sqlx::query_scalar::<_, String>(
        "SELECT text_content FROM textbook_content WHERE content_key = $1",
    )
    .bind(key.encode())
    .fetch_optional(pool)
    .await;

    match row {
        Ok(Some(text)) => truncate_chars(&text, char_budget),
        Ok(None) => {
            tracing::debug!("No textbook content at key {}", key.encode());
            FALLBACK_CONTEXT.to_string()
        }
        Err(e) => {
            tracing::warn!("Context lookup failed for {}: {}", key.encode(), e);
            FALLBACK_CONTEXT.to_string()
        }
    }
}

/// Truncate to at most `budget` characters, never splitting a code point.
pub fn truncate_chars(text: &str, budget: usize) -> String {
    match text.char_indices().nth(budget) {
        Some((byte_index, _)) => text[..byte_index].to_string(),
        None => text.to_string(),
    }
}

/// Split chapter text into chunks of roughly CHUNK_TARGET_CHARS, breaking
/// on whitespace so words stay intact.
pub fn chunk_text(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if !current.is_empty() && current.chars().count() + word.chars().count() + 1 > CHUNK_TARGET_CHARS {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_key_round_trip() {
        let key = ContentKey::new("Class 10", "Physics", "ch1");
        let encoded = key.encode();
        assert_eq!(encoded, "Class_10::Physics::ch1");
        assert_eq!(ContentKey::decode(&encoded), Some(key));
    }

    #[test]
    fn test_content_key_injective_on_separators() {
        // Space vs literal underscore must not collide
        let spaced = ContentKey::new("Class 10", "Physics", "ch1").encode();
        let underscored = ContentKey::new("Class_10", "Physics", "ch1").encode();
        assert_ne!(spaced, underscored);

        // A colon inside a field must not shift the field boundary
        let tricky = ContentKey::new("Class", "10::Physics", "ch1");
        let plain = ContentKey::new("Class", "10", "Physics::ch1");
        assert_ne!(tricky.encode(), plain.encode());
        assert_eq!(ContentKey::decode(&tricky.encode()), Some(tricky));
    }

    #[test]
    fn test_content_key_decode_rejects_malformed() {
        assert_eq!(ContentKey::decode("only::two"), None);
        assert_eq!(ContentKey::decode("bad%zz::b::c"), None);
    }

    #[test]
    fn test_truncate_respects_budget() {
        assert_eq!(truncate_chars("hello world", 5), "hello");
        assert_eq!(truncate_chars("short", 100), "short");
    }

    #[test]
    fn test_truncate_multibyte_safe() {
        // Bengali text: each char is multiple bytes
        let text = "মাধ্যাকর্ষণ একটি বল";
        let truncated = truncate_chars(text, 5);
        assert_eq!(truncated.chars().count(), 5);
    }

    #[test]
    fn test_chunk_text_respects_target() {
        let word = "gravity";
        let text = vec![word; 1000].join(" ");
        let chunks = chunk_text(&text);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= CHUNK_TARGET_CHARS);
        }
        // No words lost
        let rejoined = chunks.join(" ");
        assert_eq!(rejoined, text);
    }

    #[test]
    fn test_chunk_text_empty() {
        assert!(chunk_text("").is_empty());
        assert!(chunk_text("   \n  ").is_empty());
    }
}
