// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Minimal streaming HTML start-tag scanner.
//!
//! Yields start tags in document order without building a tree. Comments,
//! doctypes, processing instructions, end tags and the bodies of `script`
//! and `style` elements are skipped. Attribute values may contain `>` when
//! quoted.

/// A parsed start tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartTag {
    /// Lowercased element name.
    pub name: String,
    attrs: Vec<(String, Option<String>)>,
}

impl StartTag {
    /// Whether the attribute is present, with or without a value.
    pub fn has_attr(&self, key: &str) -> bool {
        self.attrs.iter().any(|(k, _)| k == key)
    }

    /// Value of the first attribute named `key`. A bare attribute yields `""`.
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_deref().unwrap_or(""))
    }

    /// Whether the whitespace-separated `rel` attribute contains `token`.
    pub fn has_rel(&self, token: &str) -> bool {
        self.attr("rel")
            .map(|rel| rel.split_ascii_whitespace().any(|t| t.eq_ignore_ascii_case(token)))
            .unwrap_or(false)
    }
}

/// Iterator over the start tags of a document.
pub struct StartTags<'a> {
    input: &'a str,
    pos: usize,
}

/// Scan `input` for start tags.
pub fn start_tags(input: &str) -> StartTags<'_> {
    StartTags { input, pos: 0 }
}

impl<'a> StartTags<'a> {
    fn skip_past(&mut self, needle: &str) {
        self.pos = match find_ascii_ci(&self.input[self.pos..], needle) {
            Some(idx) => self.pos + idx + needle.len(),
            None => self.input.len(),
        };
    }
}

impl<'a> Iterator for StartTags<'a> {
    type Item = StartTag;

    fn next(&mut self) -> Option<StartTag> {
        loop {
            let lt = self.pos + self.input[self.pos..].find('<')?;
            let rest = &self.input[lt + 1..];
            self.pos = lt + 1;

            if rest.starts_with("!--") {
                self.pos = lt + 4;
                self.skip_past("-->");
                continue;
            }

            let first = rest.as_bytes().first().copied()?;
            if matches!(first, b'!' | b'?' | b'/') {
                self.skip_past(">");
                continue;
            }
            if !first.is_ascii_alphabetic() {
                // Stray "<" in text.
                continue;
            }

            let end = tag_end(rest)?;
            let inner = &rest[..end];
            self.pos = lt + 1 + end + 1;

            let Some(tag) = parse_start_tag(inner) else {
                continue;
            };

            if matches!(tag.name.as_str(), "script" | "style") {
                let close = format!("</{}", tag.name);
                self.skip_past(&close);
                self.skip_past(">");
            }

            return Some(tag);
        }
    }
}

/// Offset of the `>` that closes a tag, honouring quoted attribute values.
fn tag_end(rest: &str) -> Option<usize> {
    let mut quote: Option<u8> = None;
    for (i, b) in rest.bytes().enumerate() {
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None if b == b'>' => return Some(i),
            None => {}
        }
    }
    None
}

fn find_ascii_ci(haystack: &str, needle: &str) -> Option<usize> {
    let h = haystack.as_bytes();
    let n = needle.as_bytes();
    if n.is_empty() || h.len() < n.len() {
        return None;
    }
    (0..=h.len() - n.len()).find(|&i| h[i..i + n.len()].eq_ignore_ascii_case(n))
}

fn parse_start_tag(inner: &str) -> Option<StartTag> {
    let bytes = inner.as_bytes();
    let mut i = 0usize;

    while i < bytes.len() && !bytes[i].is_ascii_whitespace() && bytes[i] != b'/' {
        i += 1;
    }
    if i == 0 {
        return None;
    }
    let name = inner[..i].to_ascii_lowercase();
    let mut attrs = Vec::new();

    while i < bytes.len() {
        while i < bytes.len() && (bytes[i].is_ascii_whitespace() || bytes[i] == b'/') {
            i += 1;
        }
        if i >= bytes.len() {
            break;
        }

        let key_start = i;
        while i < bytes.len()
            && !bytes[i].is_ascii_whitespace()
            && bytes[i] != b'='
            && bytes[i] != b'/'
        {
            i += 1;
        }
        if i == key_start {
            // Lone "=" with no key.
            i += 1;
            continue;
        }
        let key = inner[key_start..i].to_ascii_lowercase();

        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }

        let mut value = None;
        if i < bytes.len() && bytes[i] == b'=' {
            i += 1;
            while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            if i < bytes.len() && (bytes[i] == b'"' || bytes[i] == b'\'') {
                let quote = bytes[i];
                i += 1;
                let start = i;
                while i < bytes.len() && bytes[i] != quote {
                    i += 1;
                }
                value = Some(decode_entities(&inner[start..i]));
                if i < bytes.len() {
                    i += 1;
                }
            } else {
                // Unquoted values may contain "/" (e.g. href=/webmention).
                let start = i;
                while i < bytes.len() && !bytes[i].is_ascii_whitespace() {
                    i += 1;
                }
                value = Some(decode_entities(&inner[start..i]));
            }
        }

        attrs.push((key, value));
    }

    Some(StartTag { name, attrs })
}

fn decode_entities(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];

        let decoded = rest.find(';').and_then(|semi| {
            let entity = &rest[1..semi];
            let ch = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                    .and_then(char::from_u32),
            };
            ch.map(|c| (c, semi))
        });

        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(html: &str) -> Vec<String> {
        start_tags(html).map(|t| t.name).collect()
    }

    #[test]
    fn test_document_order() {
        let html = r#"<!DOCTYPE html><html><head><link rel="webmention" href="/wm"></head>
            <body><p>Hi <a href="https://x.example/">x</a></p></body></html>"#;
        assert_eq!(names(html), vec!["html", "head", "link", "body", "p", "a"]);
    }

    #[test]
    fn test_attributes() {
        let tag = start_tags(r#"<A HREF='https://x.example/?a=1&amp;b=2' webmention rel=me>"#)
            .next()
            .unwrap();
        assert_eq!(tag.name, "a");
        assert_eq!(tag.attr("href"), Some("https://x.example/?a=1&b=2"));
        assert!(tag.has_attr("webmention"));
        assert_eq!(tag.attr("webmention"), Some(""));
        assert!(tag.has_rel("me"));
        assert!(!tag.has_attr("src"));
    }

    #[test]
    fn test_unquoted_value_with_slashes() {
        let tag = start_tags("<link rel=webmention href=/api/webmention/>").next().unwrap();
        assert_eq!(tag.attr("href"), Some("/api/webmention/"));
        assert!(tag.has_rel("webmention"));
    }

    #[test]
    fn test_quoted_gt_does_not_close_tag() {
        let tag = start_tags(r#"<a title="a > b" href="/x">"#).next().unwrap();
        assert_eq!(tag.attr("title"), Some("a > b"));
        assert_eq!(tag.attr("href"), Some("/x"));
    }

    #[test]
    fn test_skips_comments_and_scripts() {
        let html = r#"<!-- <a href="/hidden"> --><script>var s = "<a href='/js'>";</script>
            <STYLE>a > b {}</STYLE><img src="/pic.png"/>"#;
        let tags: Vec<_> = start_tags(html).collect();
        assert_eq!(tags.len(), 3);
        assert_eq!(tags[0].name, "script");
        assert_eq!(tags[1].name, "style");
        assert_eq!(tags[2].attr("src"), Some("/pic.png"));
    }

    #[test]
    fn test_multi_token_rel() {
        let tag = start_tags(r#"<a rel="nofollow Webmention" href="/wm">"#).next().unwrap();
        assert!(tag.has_rel("webmention"));
    }

    #[test]
    fn test_text_and_truncated_input() {
        assert_eq!(names("1 < 2 and 3 > 2"), Vec::<String>::new());
        assert_eq!(names("<p>ok</p><a href=\"/unterminated"), vec!["p"]);
    }

    #[test]
    fn test_numeric_entities() {
        assert_eq!(decode_entities("a&#47;b&#x2F;c"), "a/b/c");
        assert_eq!(decode_entities("a & b"), "a & b");
        assert_eq!(decode_entities("&bogus;"), "&bogus;");
    }
}
