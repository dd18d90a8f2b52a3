use std::sync::LazyLock;

use regex::Regex;
use storeai_contracts::{Annotation, MessageText};

static BOLD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*(.*?)\*\*").expect("valid regex"));
static ITALIC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*(.*?)\*").expect("valid regex"));
static LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(.*?)\]\(.*?\)").expect("valid regex"));

/// Remove bold, italic and inline-link markup, keeping the inner text.
///
/// Passes repeat until the text stops changing, so nested constructs such as
/// `[[a](b)](c)` collapse fully and a second call is always a no-op. Every
/// substitution shortens the text, which bounds the loop.
pub fn strip_markdown(text: &str) -> String {
    let mut current = text.to_string();
    loop {
        let next = strip_once(&current);
        if next == current {
            return next;
        }
        current = next;
    }
}

fn strip_once(text: &str) -> String {
    let text = BOLD_RE.replace_all(text, "$1");
    let text = ITALIC_RE.replace_all(&text, "$1");
    LINK_RE.replace_all(&text, "$1").into_owned()
}

/// Delete every annotation placeholder (citation markers and the like) the
/// remote attached to a reply.
pub fn remove_annotations(text: &str, annotations: &[Annotation]) -> String {
    annotations
        .iter()
        .filter(|a| !a.text.is_empty())
        .fold(text.to_string(), |acc, a| acc.replace(&a.text, ""))
}

/// Annotations first, then markdown: an annotation may itself look like a link.
pub fn clean_reply(text: &MessageText) -> String {
    strip_markdown(&remove_annotations(&text.value, &text.annotations))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_bold_italic_and_links() {
        assert_eq!(strip_markdown("**a**"), "a");
        assert_eq!(strip_markdown("*a*"), "a");
        assert_eq!(strip_markdown("[x](y)"), "x");
        assert_eq!(
            strip_markdown("Tap **Settings**, then *Account* or see [help](https://h)."),
            "Tap Settings, then Account or see help."
        );
    }

    #[test]
    fn leaves_plain_text_and_lone_markers_alone() {
        assert_eq!(strip_markdown("2 * 3 = 6"), "2 * 3 = 6");
        assert_eq!(strip_markdown(""), "");
    }

    #[test]
    fn stripping_is_idempotent() {
        for input in [
            "**Hi** [link](url)",
            "[[a](b)](c)",
            "***both***",
            "[*x*](y) and **[z](w)**",
            "*[a](b)*",
        ] {
            let once = strip_markdown(input);
            assert_eq!(strip_markdown(&once), once, "input: {input}");
        }
    }

    #[test]
    fn annotations_are_removed_before_markdown() {
        let text = MessageText {
            value: "**Hi** [link](url)".to_string(),
            annotations: vec![Annotation {
                text: "[link](url)".to_string(),
            }],
        };
        assert_eq!(clean_reply(&text), "Hi ");
    }

    #[test]
    fn empty_annotation_text_is_ignored() {
        let out = remove_annotations(
            "abc【4:0†source】",
            &[
                Annotation {
                    text: String::new(),
                },
                Annotation {
                    text: "【4:0†source】".to_string(),
                },
            ],
        );
        assert_eq!(out, "abc");
    }
}
