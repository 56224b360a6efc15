use once_cell::sync::Lazy;
use regex::Regex;

/// 匹配 `<think>...</think>` 及其后的空白，忽略大小写并跨行，非贪婪
static THINK_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<think>.*?</think>\s*").expect("think tag pattern is valid")
});

/// 去除部分模型输出的推理过程标签
pub fn strip_think_tags(content: &str) -> String {
    THINK_TAG.replace_all(content, "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_inline() {
        assert_eq!(strip_think_tags("a<think>x</think>b"), "ab");
    }

    #[test]
    fn test_strip_multiline_and_case_insensitive() {
        let raw = "<THINK>\nstep 1\nstep 2\n</Think>\n\nThe fix is `\\end{document}`.";
        assert_eq!(strip_think_tags(raw), "The fix is `\\end{document}`.");
    }

    #[test]
    fn test_absent_tags_untouched() {
        assert_eq!(strip_think_tags("no tags here"), "no tags here");
        assert_eq!(strip_think_tags("a < think > b"), "a < think > b");
    }

    #[test]
    fn test_multiple_blocks_non_greedy() {
        let raw = "<think>one</think>keep<think>two</think> tail";
        assert_eq!(strip_think_tags(raw), "keeptail");
    }

    #[test]
    fn test_nested_removes_first_closing_only() {
        // 非贪婪匹配在第一个闭合标签处结束，外层残留保持原样
        let raw = "x<think>a<think>b</think>c</think>y";
        assert_eq!(strip_think_tags(raw), "xc</think>y");
    }

    #[test]
    fn test_unclosed_tag_is_kept() {
        assert_eq!(strip_think_tags("<think>never closed"), "<think>never closed");
    }
}
