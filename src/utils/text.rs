//! 文本处理工具
//!
//! 作业说明在数据库里是富文本 HTML，喂给模型之前需要先
//! 还原成普通文本并提取关键要求

use regex::Regex;
use std::sync::OnceLock;

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]+>").expect("HTML 标签正则不合法"))
}

fn requirement_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // 项目符号、编号，或含 must / should / need to / required 的句子
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(?:[-*•]\s+|\d+[.)]\s+)|\b(?i:must|should|need to|required)\b")
            .expect("要求行正则不合法")
    })
}

/// 去掉 HTML 标签，还原常见实体，并折叠多余空白
pub fn strip_html(input: &str) -> String {
    // 块级结束标签先替换成换行，保住行结构
    let with_breaks = input
        .replace("</p>", "\n")
        .replace("</li>", "\n")
        .replace("<br>", "\n")
        .replace("<br/>", "\n")
        .replace("<br />", "\n");

    let stripped = tag_re().replace_all(&with_breaks, " ");

    let decoded = stripped
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");

    // 逐行折叠空白，去掉空行
    decoded
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// 从作业说明中提取关键要求行
///
/// 识别项目符号行、编号行和带情态动词的句子，最多返回 `max_items` 条。
/// 说明文本应当已经过 `strip_html` 处理。
pub fn extract_key_requirements(instructions: &str, max_items: usize) -> Vec<String> {
    let mut requirements = Vec::new();

    for line in instructions.lines() {
        let trimmed = line.trim();
        if trimmed.chars().count() < 8 {
            continue;
        }
        if requirement_line_re().is_match(trimmed) {
            // 去掉行首的符号 / 编号
            let cleaned = trimmed
                .trim_start_matches(['-', '*', '•'])
                .trim_start_matches(|c: char| c.is_ascii_digit())
                .trim_start_matches(['.', ')'])
                .trim();
            if !cleaned.is_empty() {
                requirements.push(cleaned.to_string());
            }
        }
        if requirements.len() >= max_items {
            break;
        }
    }

    requirements
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_html_basic() {
        let html = "<p>Write a <b>prompt</b> that&nbsp;works.</p><p>Keep it short.</p>";
        assert_eq!(strip_html(html), "Write a prompt that works.\nKeep it short.");
    }

    #[test]
    fn test_strip_html_entities() {
        assert_eq!(strip_html("a &lt; b &amp;&amp; c &gt; d"), "a < b && c > d");
    }

    #[test]
    fn test_strip_html_plain_text_untouched() {
        assert_eq!(strip_html("no markup here"), "no markup here");
    }

    #[test]
    fn test_extract_key_requirements_bullets() {
        let text = "Overview line\n- Cover all three parts\n* Cite one source\n1. Stay under 300 words";
        let reqs = extract_key_requirements(text, 8);
        assert_eq!(
            reqs,
            vec![
                "Cover all three parts",
                "Cite one source",
                "Stay under 300 words"
            ]
        );
    }

    #[test]
    fn test_extract_key_requirements_modal_verbs() {
        let text = "You must include an example.\nThis is filler.\nThe answer should be concise.";
        let reqs = extract_key_requirements(text, 8);
        assert_eq!(reqs.len(), 2);
        assert!(reqs[0].contains("must include"));
    }

    #[test]
    fn test_extract_key_requirements_cap() {
        let text = "- a requirement line\n".repeat(20);
        let reqs = extract_key_requirements(&text, 5);
        assert_eq!(reqs.len(), 5);
    }

    #[test]
    fn test_extract_key_requirements_none() {
        let reqs = extract_key_requirements("just a plain description", 8);
        assert!(reqs.is_empty());
    }
}
