use serde_json::Value;
use storeai_contracts::KnowledgeRow;

pub const IOS_WORKSHEET: &str = "Temp_IOS_KM";
pub const ANDROID_WORKSHEET: &str = "Temp_Android_KM";
pub const TEST_WORKSHEET: &str = "test_KM";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowAppend {
    pub worksheet: &'static str,
    pub cells: Vec<String>,
}

/// Worksheet and column layout for a knowledge row; `None` for platforms
/// without a temporary knowledge sheet.
pub fn layout_knowledge_row(row: &KnowledgeRow) -> Option<RowAppend> {
    let rank = value_text(&row.rank);
    let id = value_text(&row.id);
    match row.platform.to_lowercase().as_str() {
        "ios" => Some(RowAppend {
            worksheet: IOS_WORKSHEET,
            cells: ios_layout(row, rank, id),
        }),
        "test" => Some(RowAppend {
            worksheet: TEST_WORKSHEET,
            cells: ios_layout(row, rank, id),
        }),
        "android" => Some(RowAppend {
            worksheet: ANDROID_WORKSHEET,
            cells: vec![
                format!("{} {}", row.title, row.quest),
                rank,
                row.datetime.clone(),
                row.response.clone(),
                row.appversion.clone().unwrap_or_default(),
                row.brand.clone().unwrap_or_default(),
                String::new(),
                id,
            ],
        }),
        _ => None,
    }
}

fn ios_layout(row: &KnowledgeRow, rank: String, id: String) -> Vec<String> {
    vec![
        row.title.clone(),
        row.quest.clone(),
        rank,
        row.datetime.clone(),
        row.response.clone(),
        id,
    ]
}

/// Cell text for loosely typed JSON values (ratings arrive as numbers or strings).
pub fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(platform: &str) -> KnowledgeRow {
        serde_json::from_value(json!({
            "id": "00000016-432a",
            "title": "Login",
            "quest": "cannot sign in",
            "response": "reset password",
            "platform": platform,
            "datetime": "2024/10/22 09:42:48",
            "rank": 1,
            "brand": "Samsung"
        }))
        .unwrap()
    }

    #[test]
    fn ios_rows_use_six_columns() {
        let out = layout_knowledge_row(&row("iOS")).unwrap();
        assert_eq!(out.worksheet, IOS_WORKSHEET);
        assert_eq!(
            out.cells,
            vec![
                "Login",
                "cannot sign in",
                "1",
                "2024/10/22 09:42:48",
                "reset password",
                "00000016-432a"
            ]
        );
    }

    #[test]
    fn android_rows_merge_title_and_question() {
        let out = layout_knowledge_row(&row("android")).unwrap();
        assert_eq!(out.worksheet, ANDROID_WORKSHEET);
        assert_eq!(out.cells[0], "Login cannot sign in");
        assert_eq!(out.cells[4], "");
        assert_eq!(out.cells[5], "Samsung");
        assert_eq!(out.cells.len(), 8);
    }

    #[test]
    fn unknown_platforms_are_skipped() {
        assert_eq!(layout_knowledge_row(&row("web")), None);
        assert_eq!(
            layout_knowledge_row(&row("test")).unwrap().worksheet,
            TEST_WORKSHEET
        );
    }
}
