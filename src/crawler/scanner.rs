//! Tolerant HTML tag scanner
//!
//! A forward-only tokenizer that recognises just enough HTML to find tags and
//! their attributes, without building a document tree.
//!
//! # Grammar
//!
//! ```text
//! start-tag  = "<" name *(ws attribute) [ws] ["/"] ">"
//! end-tag    = "</" name *any ">"
//! attribute  = attr-name [ws] ["=" [ws] value]
//! value      = '"' *not-dquote '"' | "'" *not-squote "'" | *not-ws-or-gt
//! name       = ALPHA *(ALNUM | "-" | ":")
//! ```
//!
//! Comments (`<!-- -->`), doctypes/declarations (`<!...>`) and processing
//! instructions (`<?...?>`) are skipped. The bodies of `<script>` and `<style>`
//! are raw text and are never tokenized.
//!
//! # Known approximations
//!
//! - An attribute value with an unterminated quote ends at the next `>`.
//! - A `<` that does not begin a recognisable tag is treated as text.
//! - Tags are not balanced; the caller tracks any nesting it cares about.
//! - A tag with no closing `>` before end of input ends the scan.

/// A start tag with its attributes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag<'a> {
    /// Lowercase tag name
    pub name: String,
    /// Attributes in source order, names lowercased, values verbatim
    pub attrs: Vec<(String, &'a str)>,
    /// The tag exactly as written, from `<` through `>`
    pub raw: &'a str,
    /// Whether the tag ended in `/>`
    pub self_closing: bool,
}

impl<'a> Tag<'a> {
    /// Returns the first value for an attribute name (case-insensitive)
    pub fn attr(&self, name: &str) -> Option<&'a str> {
        self.attrs
            .iter()
            .find(|(attr, _)| attr.eq_ignore_ascii_case(name))
            .map(|(_, value)| *value)
    }
}

/// A token produced by the scanner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token<'a> {
    Start(Tag<'a>),
    End(String),
}

/// Iterator over the tags of an HTML document
pub struct Scanner<'a> {
    html: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    pub fn new(html: &'a str) -> Self {
        Self { html, pos: 0 }
    }

    fn bytes(&self) -> &'a [u8] {
        self.html.as_bytes()
    }

    /// Skips to just past the next occurrence of `needle`, or to end of input
    fn skip_past(&mut self, from: usize, needle: &str) {
        self.pos = match self.html[from..].find(needle) {
            Some(idx) => from + idx + needle.len(),
            None => self.html.len(),
        };
    }

    fn scan_end_tag(&mut self, start: usize) -> Option<Token<'a>> {
        let name_start = start + 2;
        let name_end = scan_name(self.bytes(), name_start);
        if name_end == name_start {
            // "</" followed by junk: treat as text
            self.pos = start + 1;
            return None;
        }

        let name = self.html[name_start..name_end].to_ascii_lowercase();
        self.skip_past(name_end, ">");
        Some(Token::End(name))
    }

    fn scan_start_tag(&mut self, start: usize) -> Option<Tag<'a>> {
        let bytes = self.bytes();
        let html = self.html;
        let name_end = scan_name(bytes, start + 1);
        let name = html[start + 1..name_end].to_ascii_lowercase();

        let mut attrs = Vec::new();
        let mut self_closing = false;
        let mut i = name_end;

        loop {
            i = skip_whitespace(bytes, i);
            let c = *bytes.get(i)?;

            match c {
                b'>' => {
                    i += 1;
                    break;
                }
                b'/' => {
                    self_closing = bytes.get(i + 1) == Some(&b'>');
                    i += 1;
                    continue;
                }
                _ => {}
            }

            let attr_start = i;
            while i < bytes.len() && !is_attr_name_terminator(bytes[i]) {
                i += 1;
            }
            if i == attr_start {
                // A stray '=' or quote where a name should be
                i += 1;
                continue;
            }
            let attr_name = html[attr_start..i].to_ascii_lowercase();

            i = skip_whitespace(bytes, i);
            if bytes.get(i) != Some(&b'=') {
                attrs.push((attr_name, ""));
                continue;
            }

            i = skip_whitespace(bytes, i + 1);
            let (value, next) = scan_attr_value(html, i)?;
            attrs.push((attr_name, value));
            i = next;
        }

        self.pos = i;
        Some(Tag {
            name,
            attrs,
            raw: &html[start..i],
            self_closing,
        })
    }

    /// Jumps over the raw-text body of `<script>`/`<style>`
    fn skip_raw_text(&mut self, tag_name: &str) {
        let closing = format!("</{}", tag_name);
        self.pos = find_ignore_ascii_case(self.html, self.pos, &closing).unwrap_or(self.html.len());
    }
}

impl<'a> Iterator for Scanner<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let start = self.pos + self.html.get(self.pos..)?.find('<')?;
            let rest = &self.bytes()[start + 1..];

            if rest.starts_with(b"!--") {
                self.skip_past(start + 4, "-->");
                continue;
            }

            match rest.first() {
                Some(b'!') | Some(b'?') => {
                    self.skip_past(start + 1, ">");
                }
                Some(b'/') => {
                    if let Some(token) = self.scan_end_tag(start) {
                        return Some(token);
                    }
                }
                Some(c) if c.is_ascii_alphabetic() => {
                    // An unterminated tag ends the document
                    let tag = self.scan_start_tag(start)?;
                    if !tag.self_closing && (tag.name == "script" || tag.name == "style") {
                        self.skip_raw_text(&tag.name);
                    }
                    return Some(Token::Start(tag));
                }
                _ => {
                    self.pos = start + 1;
                }
            }
        }
    }
}

fn scan_name(bytes: &[u8], from: usize) -> usize {
    let mut i = from;
    while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'-' || bytes[i] == b':')
    {
        i += 1;
    }
    i
}

fn skip_whitespace(bytes: &[u8], from: usize) -> usize {
    let mut i = from;
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    i
}

fn is_attr_name_terminator(b: u8) -> bool {
    b.is_ascii_whitespace() || matches!(b, b'=' | b'>' | b'/' | b'"' | b'\'')
}

/// Reads an attribute value starting at `from`; returns the value and the
/// index just past it
fn scan_attr_value(html: &str, from: usize) -> Option<(&str, usize)> {
    let bytes = html.as_bytes();
    let quote = *bytes.get(from)?;

    if quote == b'"' || quote == b'\'' {
        let body = from + 1;
        match bytes[body..].iter().position(|&b| b == quote) {
            Some(len) => Some((&html[body..body + len], body + len + 1)),
            None => {
                // Unterminated quote: the value runs to the next '>'
                let len = bytes[body..].iter().position(|&b| b == b'>')?;
                Some((&html[body..body + len], body + len))
            }
        }
    } else {
        let len = bytes[from..]
            .iter()
            .position(|&b| b.is_ascii_whitespace() || b == b'>')
            .unwrap_or(bytes.len() - from);
        Some((&html[from..from + len], from + len))
    }
}

fn find_ignore_ascii_case(haystack: &str, from: usize, needle: &str) -> Option<usize> {
    let hay = haystack.as_bytes();
    let needle = needle.as_bytes();
    if needle.is_empty() || hay.len() < needle.len() {
        return None;
    }

    (from..=hay.len() - needle.len()).find(|&i| hay[i..i + needle.len()].eq_ignore_ascii_case(needle))
}
