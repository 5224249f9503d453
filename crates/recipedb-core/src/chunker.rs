//! Markdown heading splitter used to derive child chunks.

/// Deepest heading level that starts a new chunk.
pub const MAX_SPLIT_LEVEL: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Heading breadcrumb, e.g. `红烧肉 > 操作`. `None` for text before the first heading.
    pub heading_path: Option<String>,
    pub content: String,
}

/// Split on `#`, `##` and `###` headings outside fenced code blocks.
/// Each section keeps its own heading line; blank sections are dropped.
pub fn split_markdown(content: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut headings: Vec<Option<String>> = vec![None; MAX_SPLIT_LEVEL];
    let mut current = String::new();
    let mut current_path: Option<String> = None;
    let mut in_fence = false;

    for line in content.split_inclusive('\n') {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
        } else if !in_fence {
            if let Some((level, title)) = parse_heading(trimmed) {
                push_section(&mut sections, &mut current, current_path.take());
                headings[level - 1] = Some(title);
                for deeper in headings.iter_mut().skip(level) {
                    *deeper = None;
                }
                current_path = Some(
                    headings[..level].iter().flatten().cloned().collect::<Vec<_>>().join(" > "),
                );
            }
        }
        current.push_str(line);
    }
    push_section(&mut sections, &mut current, current_path);
    sections
}

fn parse_heading(line: &str) -> Option<(usize, String)> {
    let level = line.chars().take_while(|c| *c == '#').count();
    if level == 0 || level > MAX_SPLIT_LEVEL {
        return None;
    }
    let rest = &line[level..];
    if !(rest.is_empty() || rest.starts_with(' ') || rest.starts_with('\t') || rest.starts_with('\n') || rest.starts_with('\r')) {
        return None;
    }
    Some((level, rest.trim().trim_end_matches('#').trim().to_string()))
}

fn push_section(sections: &mut Vec<Section>, current: &mut String, heading_path: Option<String>) {
    let text = current.trim();
    if !text.is_empty() {
        sections.push(Section { heading_path, content: text.to_string() });
    }
    current.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_headings_and_keeps_breadcrumbs() {
        let md = "# 红烧肉\n\n简介\n\n## 必备原料\n\n- 五花肉\n\n## 操作\n\n### 焯水\n\n冷水下锅\n";
        let sections = split_markdown(md);
        let paths: Vec<Option<&str>> = sections.iter().map(|s| s.heading_path.as_deref()).collect();
        assert_eq!(
            paths,
            vec![Some("红烧肉"), Some("红烧肉 > 必备原料"), Some("红烧肉 > 操作"), Some("红烧肉 > 操作 > 焯水")]
        );
        assert!(sections[1].content.starts_with("## 必备原料"));
        assert!(sections[1].content.contains("五花肉"));
    }

    #[test]
    fn preamble_becomes_its_own_section() {
        let sections = split_markdown("intro text\n# Title\nbody\n");
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].heading_path, None);
        assert_eq!(sections[0].content, "intro text");
    }

    #[test]
    fn no_headings_yields_single_section() {
        let sections = split_markdown("just one paragraph\n\nand another");
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].content, "just one paragraph\n\nand another");
    }

    #[test]
    fn ignores_headings_in_code_fences_and_deep_levels() {
        let md = "# A\n```\n# not a heading\n```\n#### too deep\n#hashtag\n";
        let sections = split_markdown(md);
        assert_eq!(sections.len(), 1);
        assert!(sections[0].content.contains("# not a heading"));
        assert!(sections[0].content.contains("#### too deep"));
    }

    #[test]
    fn blank_input_yields_nothing() {
        assert!(split_markdown("  \n\n").is_empty());
    }
}
