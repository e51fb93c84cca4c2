//! Markdown 标题分节
//!
//! 按 ATX 标题（`# ` 到 `###### `）划分可单独翻译的章节。

use std::sync::OnceLock;

use regex::Regex;

const HEADING_PATTERN: &str = r"^(#+)\s";

/// 可翻译锚点的最大标题级别
pub const MAX_ANCHOR_LEVEL: usize = 2;

/// 可翻译锚点
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionAnchor {
    /// 从 0 开始的行号
    pub line: usize,
    /// 标题级别，整篇文档的锚点为 0
    pub level: usize,
    pub title: String,
}

impl SectionAnchor {
    pub fn is_document(&self) -> bool {
        self.level == 0
    }
}

fn heading_regex() -> &'static Regex {
    static HEADING: OnceLock<Regex> = OnceLock::new();
    HEADING.get_or_init(|| Regex::new(HEADING_PATTERN).expect("heading pattern is a valid regex"))
}

/// 标题级别，非标题行返回 `None`
pub fn heading_level(line: &str) -> Option<usize> {
    heading_regex()
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().len())
}

/// 提取从第 `line` 行（从 0 开始）标题开始的章节
///
/// 章节包含该标题以及其后的所有行，直到遇到同级或更高级的标题为止。
/// 指定行不是标题或超出范围时返回 `None`。
pub fn extract_section(content: &str, line: usize) -> Option<String> {
    let lines: Vec<&str> = content.lines().collect();
    let heading = *lines.get(line)?;
    let level = heading_level(heading)?;

    let mut section = vec![heading];
    for text in &lines[line + 1..] {
        if matches!(heading_level(text), Some(next) if next <= level) {
            break;
        }
        section.push(text);
    }

    Some(section.join("\n"))
}

/// 列出可翻译的锚点：整篇文档，以及所有一级和二级标题
pub fn section_anchors(content: &str) -> Vec<SectionAnchor> {
    let mut anchors = vec![SectionAnchor {
        line: 0,
        level: 0,
        title: content
            .lines()
            .find_map(|line| {
                heading_level(line).map(|level| line[level..].trim().to_string())
            })
            .unwrap_or_else(|| "文档".to_string()),
    }];

    anchors.extend(content.lines().enumerate().filter_map(|(index, line)| {
        let level = heading_level(line)?;
        (level <= MAX_ANCHOR_LEVEL).then(|| SectionAnchor {
            line: index,
            level,
            title: line[level..].trim().to_string(),
        })
    }));

    anchors
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPEC: &str = "\
# Feature Spec

Intro paragraph.

## Requirements

- FR-001
### Details

Nested text.
## Success Criteria

Done.
";

    #[test]
    fn heading_levels() {
        assert!(Regex::new(HEADING_PATTERN).is_ok());
        assert_eq!(heading_level("# Title"), Some(1));
        assert_eq!(heading_level("### Deep"), Some(3));
        assert_eq!(heading_level("#hashtag"), None);
        assert_eq!(heading_level("plain"), None);
        assert_eq!(heading_level(" # indented"), None);
    }

    #[test]
    fn section_stops_at_same_level() {
        let section = extract_section(SPEC, 4).unwrap();
        assert_eq!(
            section,
            "## Requirements\n\n- FR-001\n### Details\n\nNested text."
        );
    }

    #[test]
    fn nested_section_stops_at_higher_level() {
        let section = extract_section(SPEC, 7).unwrap();
        assert_eq!(section, "### Details\n\nNested text.");
    }

    #[test]
    fn top_level_section_runs_to_end() {
        let section = extract_section(SPEC, 0).unwrap();
        assert_eq!(section, SPEC.trim_end());
    }

    #[test]
    fn non_heading_line_has_no_section() {
        assert_eq!(extract_section(SPEC, 2), None);
        assert_eq!(extract_section(SPEC, 999), None);
    }

    #[test]
    fn anchors_cover_document_and_major_headings() {
        let anchors = section_anchors(SPEC);
        let summary: Vec<(usize, usize, &str)> = anchors
            .iter()
            .map(|a| (a.line, a.level, a.title.as_str()))
            .collect();

        assert_eq!(
            summary,
            vec![
                (0, 0, "Feature Spec"),
                (0, 1, "Feature Spec"),
                (4, 2, "Requirements"),
                (10, 2, "Success Criteria"),
            ]
        );
        assert!(anchors[0].is_document());
    }

    #[test]
    fn document_without_headings_has_one_anchor() {
        let anchors = section_anchors("just text\n");
        assert_eq!(anchors.len(), 1);
        assert_eq!(anchors[0].title, "文档");
    }
}
