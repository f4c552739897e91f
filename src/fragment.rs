//! Plain-text extraction from the bundle's message-HTML fragments, plus the
//! snippet builder the search overlay renders.

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Leading / trailing context sizes around a search match.
pub const SNIPPET_BEFORE: usize = 60;
pub const SNIPPET_AFTER: usize = 80;

static NAMED_ENTITIES: Lazy<HashMap<&'static str, char>> = Lazy::new(|| {
    HashMap::from([
        ("amp", '&'),
        ("lt", '<'),
        ("gt", '>'),
        ("quot", '"'),
        ("apos", '\''),
        ("nbsp", ' '),
        ("hellip", '…'),
        ("mdash", '—'),
        ("ndash", '–'),
    ])
});

/// Strips tags and decodes entities. Block-level closers and `<br>` become
/// newlines so the terminal rendering keeps the fragment's line structure.
pub fn html_to_text(fragment: &str) -> String {
    let mut out = String::with_capacity(fragment.len());
    let mut rest = fragment;
    while let Some(lt) = rest.find('<') {
        decode_entities_into(&rest[..lt], &mut out);
        rest = &rest[lt..];
        let Some(gt) = rest.find('>') else {
            // unterminated tag: drop the tail
            rest = "";
            break;
        };
        let tag = rest[1..gt].trim();
        if tag_breaks_line(tag) && !out.ends_with('\n') && !out.is_empty() {
            out.push('\n');
        }
        rest = &rest[gt + 1..];
    }
    decode_entities_into(rest, &mut out);
    out.trim().to_string()
}

fn tag_breaks_line(tag: &str) -> bool {
    let name = tag
        .trim_start_matches('/')
        .split(|c: char| c.is_whitespace() || c == '/')
        .next()
        .unwrap_or("")
        .to_ascii_lowercase();
    matches!(
        name.as_str(),
        "br" | "p" | "div" | "pre" | "li" | "ul" | "ol" | "details" | "summary" | "h1" | "h2"
            | "h3" | "h4" | "h5" | "h6" | "tr" | "blockquote"
    )
}

fn decode_entities_into(text: &str, out: &mut String) {
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        match decode_entity(rest) {
            Some((ch, consumed)) => {
                out.push(ch);
                rest = &rest[consumed..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
}

/// Decodes one entity at the start of `text` (which begins with `&`),
/// returning the character and the byte length consumed.
fn decode_entity(text: &str) -> Option<(char, usize)> {
    let semi = text[1..].find(';').map(|i| i + 1)?;
    if semi > 10 {
        return None;
    }
    let body = &text[1..semi];
    if let Some(num) = body.strip_prefix('#') {
        let code = if let Some(hex) = num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
            u32::from_str_radix(hex, 16).ok()?
        } else {
            num.parse::<u32>().ok()?
        };
        return char::from_u32(code).map(|c| (c, semi + 1));
    }
    NAMED_ENTITIES.get(body).map(|&c| (c, semi + 1))
}

/// One search result snippet: context around the first case-insensitive
/// match, with ellipsis flags for clipped edges. The matched span is kept
/// separate so the renderer can style it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snippet {
    pub before: String,
    pub matched: String,
    pub after: String,
    pub clipped_start: bool,
    pub clipped_end: bool,
}

impl Snippet {
    /// Fallback when the query matched only markup: the leading slice of the
    /// plain text with no highlighted span.
    pub fn leading(text: &str) -> Self {
        let chars: Vec<char> = text.chars().collect();
        let take = chars.len().min(SNIPPET_BEFORE + SNIPPET_AFTER);
        Self {
            before: chars[..take].iter().collect(),
            matched: String::new(),
            after: String::new(),
            clipped_start: false,
            clipped_end: take < chars.len(),
        }
    }
}

/// Builds a snippet around the first case-insensitive occurrence of `query`
/// in `text`, or `None` when the plain text does not contain it.
pub fn snippet_around(text: &str, query: &str) -> Option<Snippet> {
    if query.is_empty() {
        return None;
    }
    let lower = text.to_lowercase();
    let needle = query.to_lowercase();
    let byte = lower.find(&needle)?;
    let chars: Vec<char> = text.chars().collect();
    let match_start = lower[..byte].chars().count().min(chars.len());
    let match_len = needle.chars().count().min(chars.len() - match_start);
    let match_end = match_start + match_len;

    let begin = match_start.saturating_sub(SNIPPET_BEFORE);
    let stop = (match_end + SNIPPET_AFTER).min(chars.len());
    Some(Snippet {
        before: chars[begin..match_start].iter().collect(),
        matched: chars[match_start..match_end].iter().collect(),
        after: chars[match_end..stop].iter().collect(),
        clipped_start: begin > 0,
        clipped_end: stop < chars.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tags_and_decodes_entities() {
        let frag = r#"<div class="msg user"><p>if a &lt; b &amp;&amp; c &gt; d&hellip;</p></div>"#;
        assert_eq!(html_to_text(frag), "if a < b && c > d…");
    }

    #[test]
    fn keeps_line_structure_for_block_tags() {
        let frag = "<div><p>first</p><p>second</p><br>third</div>";
        assert_eq!(html_to_text(frag), "first\nsecond\nthird");
    }

    #[test]
    fn numeric_entities_and_broken_markup() {
        assert_eq!(html_to_text("a &#65; &#x42;"), "a A B");
        // an ampersand without a terminated entity survives as-is, and an
        // unterminated tag drops only the broken tail
        assert_eq!(html_to_text("fish &amp chips <em"), "fish &amp chips");
    }

    #[test]
    fn snippet_highlights_match_and_marks_clipping() {
        let text = format!("{}NEEDLE{}", "x".repeat(100), "y".repeat(120));
        let snip = snippet_around(&text, "needle").unwrap();
        assert_eq!(snip.matched, "NEEDLE");
        assert_eq!(snip.before.chars().count(), SNIPPET_BEFORE);
        assert_eq!(snip.after.chars().count(), SNIPPET_AFTER);
        assert!(snip.clipped_start && snip.clipped_end);
    }

    #[test]
    fn snippet_near_edges_has_no_ellipsis() {
        let snip = snippet_around("needle in a haystack", "needle").unwrap();
        assert_eq!(snip.before, "");
        assert_eq!(snip.matched, "needle");
        assert_eq!(snip.after, " in a haystack");
        assert!(!snip.clipped_start && !snip.clipped_end);
        assert!(snippet_around("nothing here", "needle").is_none());
    }

    #[test]
    fn leading_fallback_truncates() {
        let long = "z".repeat(400);
        let snip = Snippet::leading(&long);
        assert_eq!(snip.before.chars().count(), SNIPPET_BEFORE + SNIPPET_AFTER);
        assert!(snip.clipped_end);
        assert!(snip.matched.is_empty());
    }
}
