//! Parsing of the structured answers the triage prompts ask the model for.

use serde_json::Value;

/// How the published user reply relates to the assistant's generated reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictType {
    /// Same meaning, similar completeness.
    Equivalent,
    /// The user reply is clearly more complete.
    UserReplyRicher,
    /// The user reply is clearly less complete.
    UserReplyPoorer,
    /// The generated reply does not answer the comment.
    GeneratedOffTopic,
}

impl ConflictType {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Equivalent),
            2 => Some(Self::UserReplyRicher),
            3 => Some(Self::UserReplyPoorer),
            4 => Some(Self::GeneratedOffTopic),
            _ => None,
        }
    }

    /// The knowledge base already covers the comment; nothing to add.
    pub fn is_consistent(self) -> bool {
        matches!(self, Self::Equivalent | Self::UserReplyPoorer)
    }
}

/// Parse `{"Conflict_Type": n, "Reason": "..."}`.
pub fn parse_conflict(text: &str) -> Result<(ConflictType, String), String> {
    let value: Value = serde_json::from_str(strip_code_fence(text))
        .map_err(|e| format!("classification is not JSON: {e}"))?;
    let raw = value
        .get("Conflict_Type")
        .ok_or_else(|| "classification lacks Conflict_Type".to_string())?;
    let code = match raw {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
    .ok_or_else(|| format!("Conflict_Type is not an integer: {raw}"))?;
    let conflict =
        ConflictType::from_code(code).ok_or_else(|| format!("unknown Conflict_Type {code}"))?;
    let reason = value
        .get("Reason")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Ok((conflict, reason))
}

/// Parse a JSON array of strings, e.g. `["a", "b"]`.
pub fn parse_string_list(text: &str) -> Result<Vec<String>, String> {
    serde_json::from_str::<Vec<String>>(strip_code_fence(text))
        .map_err(|e| format!("expected a JSON list of strings: {e}"))
}

/// Count `yes` / `no` verdicts, ignoring case and surrounding whitespace.
pub fn count_verdicts(verdicts: &[String]) -> (usize, usize) {
    verdicts.iter().fold((0, 0), |(yes, no), v| {
        match v.trim().to_ascii_lowercase().as_str() {
            "yes" => (yes + 1, no),
            "no" => (yes, no + 1),
            _ => (yes, no),
        }
    })
}

/// Models sometimes wrap JSON in a ```json fence despite being told not to.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_conflict_classification() {
        let (kind, reason) =
            parse_conflict(r#"{"Conflict_Type": 2, "Reason": "more detail"}"#).unwrap();
        assert_eq!(kind, ConflictType::UserReplyRicher);
        assert_eq!(reason, "more detail");
        assert!(!kind.is_consistent());
        assert!(ConflictType::UserReplyPoorer.is_consistent());
    }

    #[test]
    fn accepts_fenced_and_stringly_typed_codes() {
        let (kind, _) = parse_conflict("```json\n{\"Conflict_Type\": \"4\"}\n```").unwrap();
        assert_eq!(kind, ConflictType::GeneratedOffTopic);
    }

    #[test]
    fn accepts_whole_float_codes() {
        let (kind, _) = parse_conflict(r#"{"Conflict_Type": 2.0, "Reason": "r"}"#).unwrap();
        assert_eq!(kind, ConflictType::UserReplyRicher);
        assert!(parse_conflict(r#"{"Conflict_Type": 2.5}"#).is_err());
    }

    #[test]
    fn rejects_out_of_range_codes() {
        assert!(parse_conflict(r#"{"Conflict_Type": 7}"#).is_err());
        assert!(parse_conflict("not json").is_err());
        assert!(parse_conflict(r#"{"Reason": "x"}"#).is_err());
    }

    #[test]
    fn parses_lists_and_counts_verdicts() {
        let list = parse_string_list(r#"["yes", "No", " yes ", "maybe", "no"]"#).unwrap();
        assert_eq!(count_verdicts(&list), (2, 2));
        assert!(parse_string_list(r#"[1, 2]"#).is_err());
    }
}
