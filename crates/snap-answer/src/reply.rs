//! Reply cleaning - model output to an [`Answer`]
//!
//! Vision models do not reliably follow the JSON-only instruction. Replies
//! may carry `<|...|>` control tokens, code fences, prose around the JSON, or
//! typographic quotes inside it. Anything that cannot be read as
//! `{question, answer}` is kept as free text; the consensus side knows how
//! to pull an answer out of prose.

use std::sync::LazyLock;

use quorum::{Answer, InferenceError};
use regex::Regex;
use serde::Deserialize;

static MARKUP_TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<\|[^|]*\|>").unwrap());

static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"```(?:json)?\s*").unwrap());

/// Last-resort field extraction for JSON with unescaped inner quotes
static LOOSE_FIELDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)"question"\s*:\s*"(.*?)"\s*,\s*"answer"\s*:\s*"(.*?)"\s*\}"#).unwrap()
});

#[derive(Deserialize)]
struct QuestionAnswer {
    question: String,
    answer: String,
}

/// Strip control tokens and code fences
pub fn clean(content: &str) -> String {
    let without_tokens = MARKUP_TOKEN.replace_all(content, "");
    CODE_FENCE.replace_all(&without_tokens, "").trim().to_string()
}

/// Turn raw message content into an answer
pub fn parse_reply(content: &str) -> Result<Answer, InferenceError> {
    let cleaned = clean(content);
    if cleaned.is_empty() {
        return Err(InferenceError::Provider(
            "model returned no usable content".to_string(),
        ));
    }

    if let Some(answer) = structured(&cleaned) {
        return Ok(answer);
    }
    Ok(Answer::text(cleaned))
}

fn structured(cleaned: &str) -> Option<Answer> {
    let start = cleaned.find('{')?;
    let end = cleaned.rfind('}')?;
    if end < start {
        return None;
    }
    let candidate = cleaned[start..=end].replace(['\u{201c}', '\u{201d}'], "\"");

    let (question, answer) = match serde_json::from_str::<QuestionAnswer>(&candidate) {
        Ok(qa) => (qa.question, qa.answer),
        Err(_) => {
            let caps = LOOSE_FIELDS.captures(&candidate)?;
            (
                caps[1].replace("\\\"", "\""),
                caps[2].replace("\\\"", "\""),
            )
        }
    };

    if answer.trim().is_empty() {
        return None;
    }
    Some(Answer::structured(question.trim(), answer.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_json() {
        let answer = parse_reply(r#"{"question": "3×4?", "answer": "12"}"#).unwrap();
        assert_eq!(answer, Answer::structured("3×4?", "12"));
    }

    #[test]
    fn test_fenced_json_with_tokens() {
        let content = "<|begin_of_box|>```json\n{\"question\": \"水的化学式\", \"answer\": \"H₂O\"}\n```<|end_of_box|>";
        assert_eq!(
            parse_reply(content).unwrap(),
            Answer::structured("水的化学式", "H₂O")
        );
    }

    #[test]
    fn test_json_inside_prose() {
        let content = "Sure! Here it is: {\"question\": \"1+1?\", \"answer\": \"B.2\"} Hope that helps.";
        assert_eq!(
            parse_reply(content).unwrap(),
            Answer::structured("1+1?", "B.2")
        );
    }

    #[test]
    fn test_typographic_and_unescaped_quotes() {
        let curly = "{“question”: “Who wrote it?”, “answer”: “李白”}";
        assert_eq!(
            parse_reply(curly).unwrap(),
            Answer::structured("Who wrote it?", "李白")
        );

        let unescaped = r#"{"question": "What does "ad hoc" mean?", "answer": "for this purpose"}"#;
        assert_eq!(
            parse_reply(unescaped).unwrap(),
            Answer::structured("What does \"ad hoc\" mean?", "for this purpose")
        );
    }

    #[test]
    fn test_free_text_kept() {
        let answer = parse_reply("<|thinking|>The answer: Paris.").unwrap();
        assert_eq!(answer, Answer::text("The answer: Paris."));
    }

    #[test]
    fn test_empty_after_cleaning_is_error() {
        assert!(matches!(
            parse_reply("<|observation|>  ```"),
            Err(InferenceError::Provider(_))
        ));
        assert!(parse_reply("").is_err());
    }
}
