use ammonia::Builder;
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Sanitize HTML and strip all tags, leaving only text.
/// Script and style bodies are dropped along with their tags.
pub fn strip_html_tags(html: &str) -> String {
    let mut builder = Builder::default();
    builder.tags(HashSet::new()); // No tags allowed
    builder.clean(html).to_string()
}

/// Plain, lowercased, whitespace-collapsed text of an HTML page,
/// ready for keyword matching.
pub fn page_text(html: &str) -> String {
    let stripped = strip_html_tags(html);
    let decoded = stripped
        .replace("&amp;", "&")
        .replace("&nbsp;", " ")
        .replace("&#39;", "'")
        .replace("&quot;", "\"")
        .replace("&lt;", "<")
        .replace("&gt;", ">");
    normalize_text(&decoded)
}

pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn title_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("valid title regex"))
}

/// Contents of the `<title>` element, normalized like `page_text`.
pub fn page_title(html: &str) -> Option<String> {
    title_pattern()
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| page_text(m.as_str()))
        .filter(|t| !t.is_empty())
}

/// Whole-word (or whole-phrase) match of `needle` inside normalized `haystack`.
pub fn contains_phrase(haystack: &str, needle: &str) -> bool {
    let needle = normalize_text(needle);
    if needle.is_empty() {
        return false;
    }
    let pattern = format!(r"(^|[^\p{{L}}\p{{N}}]){}($|[^\p{{L}}\p{{N}}])", regex::escape(&needle));
    Regex::new(&pattern)
        .map(|re| re.is_match(haystack))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_html_tags() {
        let html = "<p>Hello <strong>world</strong></p>";
        let stripped = strip_html_tags(html);
        assert_eq!(stripped.trim(), "Hello world");
        assert!(!stripped.contains("<"));
    }

    #[test]
    fn test_page_text_drops_scripts() {
        let html = "<html><head><script>var brand = 'Ford';</script></head>\
                    <body><h1>Sunset   Toyota</h1><p>Parts &amp; Service</p></body></html>";
        let text = page_text(html);
        assert!(!text.contains("ford"));
        assert!(text.contains("sunset toyota"));
        assert!(text.contains("parts & service"));
    }

    #[test]
    fn test_page_title() {
        let html = "<html><head><TITLE>\n Sunset Toyota | New Cars </TITLE></head></html>";
        assert_eq!(page_title(html).as_deref(), Some("sunset toyota | new cars"));
        assert_eq!(page_title("<p>no title</p>"), None);
    }

    #[test]
    fn test_contains_phrase_respects_word_boundaries() {
        let text = "welcome to sunset toyota, your kia and vw specialists";
        assert!(contains_phrase(text, "Toyota"));
        assert!(contains_phrase(text, "VW"));
        assert!(contains_phrase(text, "sunset toyota"));
        assert!(!contains_phrase(text, "ram"));
        assert!(!contains_phrase(text, "ia"));
        assert!(!contains_phrase(text, ""));
    }
}
