use std::sync::LazyLock;

use regex::Regex;

static BREAK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>|</p>|</div>|</li>|</tr>|</h[1-6]>").unwrap());
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());
static BLANKS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

/// Convert raw markup into plain text with normalized line breaks. Tags are
/// stripped, not parsed; block-closing tags become newlines so the line
/// structure of the source survives.
pub fn normalize(html: &str) -> String {
    let text = html.replace("\r\n", "\n").replace('\r', "\n");
    let text = BREAK_RE.replace_all(&text, "\n");
    let text = TAG_RE.replace_all(&text, "");
    let text = decode_entities(&text);
    let text = BLANKS_RE.replace_all(&text, "\n\n");
    text.trim().to_string()
}

/// Decode the entities that actually occur in the announcement pages. No DOM,
/// no full entity table.
fn decode_entities(s: &str) -> String {
    let mut out = s.to_string();
    for (entity, ch) in [
        ("&nbsp;", "\u{a0}"),
        ("&amp;", "&"),
        ("&lt;", "<"),
        ("&gt;", ">"),
        ("&quot;", "\""),
        ("&#39;", "'"),
        ("&auml;", "ä"),
        ("&ouml;", "ö"),
        ("&uuml;", "ü"),
        ("&Auml;", "Ä"),
        ("&Ouml;", "Ö"),
        ("&Uuml;", "Ü"),
        ("&szlig;", "ß"),
        ("&ndash;", "–"),
    ] {
        if out.contains(entity) {
            out = out.replace(entity, ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tags() {
        assert_eq!(normalize("<p>Hallo <b>Welt</b></p>"), "Hallo Welt");
    }

    #[test]
    fn br_becomes_newline() {
        let text = normalize("erste Zeile<br>zweite Zeile<br/>dritte");
        assert_eq!(text, "erste Zeile\nzweite Zeile\ndritte");
    }

    #[test]
    fn block_closers_become_newlines() {
        let text = normalize("<div>eins</div><div>zwei</div>");
        assert_eq!(text, "eins\nzwei");
    }

    #[test]
    fn decodes_umlauts_and_nbsp() {
        let text = normalize("S&uuml;d&nbsp;&amp;&nbsp;Ausf&auml;lle");
        assert_eq!(text, "Süd\u{a0}&\u{a0}Ausfälle");
    }

    #[test]
    fn collapses_blank_runs() {
        let text = normalize("a<br><br><br><br>b");
        assert_eq!(text, "a\n\nb");
    }

    #[test]
    fn crlf_normalized() {
        assert_eq!(normalize("a\r\nb\rc"), "a\nb\nc");
    }
}
