//! Naming and selection of locally staged worksheet exports.

/// Platform tag derived from a worksheet name.
pub fn platform_for_sheet(sheet_name: &str) -> &'static str {
    let lowered = sheet_name.to_lowercase();
    if lowered.contains("ios") {
        "ios"
    } else if lowered.contains("android") {
        "android"
    } else {
        "others"
    }
}

pub fn staged_file_name(platform: &str, stamp: &str) -> String {
    format!("{platform}_sheet_data_{stamp}.txt")
}

/// Cells are tab-joined, rows newline-joined.
pub fn render_sheet(rows: &[Vec<String>]) -> String {
    rows.iter()
        .map(|row| row.join("\t"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// The sort key of a staged file: its last `_`-separated token, without extension.
pub fn timestamp_key(file_name: &str) -> &str {
    let last = file_name.rsplit('_').next().unwrap_or(file_name);
    last.split('.').next().unwrap_or(last)
}

/// Newest staged file for `platform`, comparing timestamp keys lexicographically.
/// Among equal keys the earliest candidate wins.
pub fn pick_latest<'a, I>(file_names: I, platform: &str) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut best: Option<&'a str> = None;
    for name in file_names.into_iter().filter(|n| n.contains(platform)) {
        match best {
            Some(current) if timestamp_key(name) <= timestamp_key(current) => {}
            _ => best = Some(name),
        }
    }
    best
}

/// Staged exports of `platform` other than `latest`.
pub fn superseded_exports<'a, I>(file_names: I, platform: &str, latest: &str) -> Vec<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let prefix = format!("{platform}_sheet_data_");
    file_names
        .into_iter()
        .filter(|name| name.starts_with(&prefix) && *name != latest)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_detection_is_case_insensitive() {
        assert_eq!(platform_for_sheet("Temp_IOS_KM"), "ios");
        assert_eq!(platform_for_sheet("Temp_Android_KM"), "android");
        assert_eq!(platform_for_sheet("Sheet1"), "others");
    }

    #[test]
    fn picks_latest_by_timestamp_suffix() {
        let files = ["ios_x_20240101.txt", "ios_x_20240102.txt"];
        assert_eq!(pick_latest(files, "ios"), Some("ios_x_20240102.txt"));
    }

    #[test]
    fn ignores_other_platforms() {
        let files = [
            "android_sheet_data_2024-03-02-10-00-00.txt",
            "ios_sheet_data_2024-03-01-10-00-00.txt",
            "android_sheet_data_2024-03-03-10-00-00.txt",
        ];
        assert_eq!(
            pick_latest(files, "ios"),
            Some("ios_sheet_data_2024-03-01-10-00-00.txt")
        );
        assert_eq!(
            pick_latest(files, "android"),
            Some("android_sheet_data_2024-03-03-10-00-00.txt")
        );
        assert_eq!(pick_latest(files, "others"), None);
    }

    #[test]
    fn superseded_exports_keep_latest_and_other_platforms() {
        let files = [
            "ios_sheet_data_2024-03-01-10-00-00.txt",
            "ios_sheet_data_2024-03-02-10-00-00.txt",
            "android_sheet_data_2024-03-01-10-00-00.txt",
            "notes.txt",
        ];
        assert_eq!(
            superseded_exports(files, "ios", "ios_sheet_data_2024-03-02-10-00-00.txt"),
            vec!["ios_sheet_data_2024-03-01-10-00-00.txt"]
        );
        assert!(superseded_exports(files, "others", "x").is_empty());
    }

    #[test]
    fn timestamp_key_strips_prefix_and_extension() {
        assert_eq!(
            timestamp_key("ios_sheet_data_2024-03-01-10-00-00.txt"),
            "2024-03-01-10-00-00"
        );
        assert_eq!(timestamp_key("plain"), "plain");
    }

    #[test]
    fn renders_rows_as_tab_separated_lines() {
        let rows = vec![
            vec!["q".to_string(), "a".to_string()],
            vec!["q2".to_string(), "a2".to_string()],
        ];
        assert_eq!(render_sheet(&rows), "q\ta\nq2\ta2");
        assert_eq!(
            staged_file_name("ios", "2024-03-01-10-00-00"),
            "ios_sheet_data_2024-03-01-10-00-00.txt"
        );
    }
}
