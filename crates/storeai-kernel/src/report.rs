use storeai_contracts::TriageRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedReport {
    pub subject: String,
    pub text: String,
    pub html: String,
}

pub fn render_report(records: &[TriageRecord]) -> RenderedReport {
    let subject = format!("StoreAI triage report: {} issue(s)", records.len());

    let mut text = format!("{} issue(s) need review.\n", records.len());
    for record in records {
        text.push_str(&format!(
            "\n#{} [{}] {}\nComment: {}\nUser reply: {}\n",
            record.original_index, record.platform, record.title, record.comment, record.user_reply
        ));
        for (i, reply) in record.reformulated_reply.iter().enumerate() {
            let verdict = record.yes_no_list.get(i).map(String::as_str).unwrap_or("-");
            text.push_str(&format!("  {}. [{}] {}\n", i + 1, verdict, reply));
        }
        text.push_str(&format!(
            "Yes: {} / No: {}\n",
            record.yes_times, record.no_times
        ));
    }

    let mut html = String::from(
        "<html><body><p>The following issues need review.</p>\
         <table border=\"1\" cellpadding=\"4\" cellspacing=\"0\">\
         <tr><th>#</th><th>Platform</th><th>Title</th><th>Comment</th>\
         <th>User reply</th><th>Reformulated replies</th><th>Yes/No</th><th>Yes</th></tr>",
    );
    for record in records {
        let replies = record
            .reformulated_reply
            .iter()
            .map(|r| format!("<li>{}</li>", escape_html(r)))
            .collect::<String>();
        html.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td>\
             <td><ol>{}</ol></td><td>{}</td><td>{}</td></tr>",
            record.original_index,
            escape_html(&record.platform),
            escape_html(&record.title),
            escape_html(&record.comment),
            escape_html(&record.user_reply),
            replies,
            escape_html(&record.yes_no_list.join(", ")),
            record.yes_times,
        ));
    }
    html.push_str("</table></body></html>");

    RenderedReport {
        subject,
        text,
        html,
    }
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> TriageRecord {
        TriageRecord {
            original_index: 1,
            title: "Issue with <Login>".to_string(),
            comment: "Cannot login & retry".to_string(),
            platform: "iOS".to_string(),
            user_reply: "Please check your credentials".to_string(),
            reformulated_reply: vec!["Check username".to_string(), "Reset password".to_string()],
            yes_no_list: vec!["yes".to_string(), "no".to_string()],
            yes_times: 1,
            no_times: 1,
        }
    }

    #[test]
    fn subject_counts_records() {
        let report = render_report(&[record(), record()]);
        assert_eq!(report.subject, "StoreAI triage report: 2 issue(s)");
    }

    #[test]
    fn html_escapes_user_content() {
        let report = render_report(&[record()]);
        assert!(report.html.contains("Issue with &lt;Login&gt;"));
        assert!(report.html.contains("Cannot login &amp; retry"));
        assert!(!report.html.contains("<Login>"));
        assert!(report.html.contains("<li>Reset password</li>"));
    }

    #[test]
    fn text_pairs_replies_with_verdicts() {
        let report = render_report(&[record()]);
        assert!(report.text.contains("1. [yes] Check username"));
        assert!(report.text.contains("2. [no] Reset password"));
        assert!(report.text.contains("Yes: 1 / No: 1"));
    }
}
