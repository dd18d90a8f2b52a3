//! Prompt text for the three completion calls the triage run makes.

pub const CONFLICT_SYSTEM_PROMPT: &str = r#"You compare a published support reply with a reply generated by an assistant.
Decide which of these relations holds between the USER REPLY and the GENERATED REPLY:
1. Same meaning and similar completeness.
2. The USER REPLY is clearly more complete, with the same meaning.
3. The USER REPLY is clearly less complete, with the same meaning.
4. The USER REPLY answers the COMMENT and the GENERATED REPLY does not.
Output only JSON, without any other text or code fence, shaped as
{"Conflict_Type": <1-4>, "Reason": "<why>"}"#;

pub fn conflict_prompt(comment: &str, user_reply: &str, generated: &str) -> String {
    format!(
        "COMMENT: {comment}\nUSER REPLY: {user_reply}\nGENERATED REPLY: {generated}\nAnswer in JSON only."
    )
}

pub fn reformulate_system_prompt(count: usize) -> String {
    format!(
        "You are a helpful assistant. Reply with a JSON array of exactly {count} strings, \
         e.g. [\"Response1\", \"Response2\"], and nothing else."
    )
}

pub fn reformulate_prompt(count: usize, comment: &str) -> String {
    format!(
        "Rephrase the following sentence {count} times, keeping its language and tone: {comment}"
    )
}

pub fn check_system_prompt(count: usize) -> String {
    format!(
        "You are a helpful assistant. Reply only with a JSON array of {count} strings, each \
         \"yes\" or \"no\", one per candidate reply in order."
    )
}

pub fn check_prompt(replies: &[String], user_reply: &str) -> String {
    let listed = replies
        .iter()
        .enumerate()
        .map(|(i, r)| format!("{}. {r}", i + 1))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "For each candidate reply, does it contain the key information of the USER REPLY?\n\
         CANDIDATES:\n{listed}\nUSER REPLY: {user_reply}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_prompt_numbers_candidates() {
        let prompt = check_prompt(&["a".to_string(), "b".to_string()], "restart");
        assert!(prompt.contains("1. a\n2. b"));
        assert!(prompt.ends_with("USER REPLY: restart"));
    }

    #[test]
    fn counts_flow_into_prompts() {
        assert!(reformulate_prompt(5, "x").contains("5 times"));
        assert!(check_system_prompt(3).contains("3 strings"));
    }
}
