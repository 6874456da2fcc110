//! Math isolation for markdown cells
//!
//! LaTeX math spans (`$...$`, `$$...$$`, `\(...\)`, `\[...\]` and
//! `\begin{env}...\end{env}` blocks) use characters the markdown grammar
//! would otherwise interpret as formatting (underscores, asterisks, carets).
//! Before markdown conversion we extract each span into a placeholder token,
//! and after conversion we reinject the original markup into the HTML, left
//! un-rendered for a client-side math-typesetting pass.
//!
//! Fenced code blocks and inline code spans are never scanned for math, so
//! `` `$PATH` `` survives untouched.

use regex::Regex;
use std::sync::OnceLock;

/// Placeholder tokens look like `@@0@@`, `@@1@@`, ...
fn token_regex() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN.get_or_init(|| Regex::new(r"@@(\d+)@@").unwrap())
}

/// Extracted math spans, indexed by placeholder number.
///
/// Entry `n` holds the original source of the span that was replaced by the
/// token `@@n@@`, delimiters included.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MathTable {
    spans: Vec<String>,
}

impl MathTable {
    /// Number of extracted spans.
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    /// True if no math was extracted.
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Original source of span `n`, if it exists.
    pub fn get(&self, n: usize) -> Option<&str> {
        self.spans.get(n).map(String::as_str)
    }

    fn push(&mut self, span: String) -> usize {
        self.spans.push(span);
        self.spans.len() - 1
    }
}

/// Extracts math from raw text and reinjects it into rendered HTML.
///
/// Stateless; held by the render pipeline as an explicit dependency rather
/// than looked up from ambient state.
#[derive(Debug, Clone, Copy, Default)]
pub struct MathIsolator;

impl MathIsolator {
    /// Replace every math span in `text` with a unique placeholder token.
    ///
    /// Returns the stripped text and the table mapping token number to the
    /// original math source.
    pub fn extract(&self, text: &str) -> (String, MathTable) {
        let chars: Vec<char> = text.chars().collect();
        let len = chars.len();
        let mut out = String::with_capacity(text.len());
        let mut table = MathTable::default();
        let mut i = 0;

        while i < len {
            // Fenced code blocks (``` or ~~~) are copied verbatim.
            if at_fence(&chars, i) {
                i = copy_fenced_block(&chars, i, &mut out);
                continue;
            }

            // Inline code spans are copied verbatim.
            if chars[i] == '`' {
                i = copy_inline_code(&chars, i, &mut out);
                continue;
            }

            // Escaped dollar: copy both characters, never math.
            if chars[i] == '\\' && i + 1 < len && chars[i + 1] == '$' {
                out.push('\\');
                out.push('$');
                i += 2;
                continue;
            }

            // Display math: $$...$$ (may span lines).
            if chars[i] == '$' && i + 1 < len && chars[i + 1] == '$' {
                if let Some(end) = find_seq(&chars, i + 2, &['$', '$']) {
                    let span: String = chars[i..end + 2].iter().collect();
                    let n = table.push(span);
                    out.push_str(&format!("@@{}@@", n));
                    i = end + 2;
                } else {
                    // Unclosed $$, preserve as-is.
                    out.push('$');
                    out.push('$');
                    i += 2;
                }
                continue;
            }

            // \( ... \) and \[ ... \] delimiters.
            if chars[i] == '\\' && i + 1 < len && (chars[i + 1] == '(' || chars[i + 1] == '[') {
                let close = if chars[i + 1] == '(' { ')' } else { ']' };
                if let Some(end) = find_seq(&chars, i + 2, &['\\', close]) {
                    let span: String = chars[i..end + 2].iter().collect();
                    let n = table.push(span);
                    out.push_str(&format!("@@{}@@", n));
                    i = end + 2;
                } else {
                    out.push(chars[i]);
                    i += 1;
                }
                continue;
            }

            // LaTeX environments: \begin{env} ... \end{env}.
            if chars[i] == '\\' && starts_with(&chars, i + 1, "begin{") {
                if let Some((span_end, _env)) = match_environment(&chars, i) {
                    let span: String = chars[i..span_end].iter().collect();
                    let n = table.push(span);
                    out.push_str(&format!("@@{}@@", n));
                    i = span_end;
                } else {
                    out.push(chars[i]);
                    i += 1;
                }
                continue;
            }

            // Inline math: $...$ on a single line, non-empty, no surrounding
            // spaces directly inside the delimiters.
            if chars[i] == '$' {
                let has_content = i + 1 < len
                    && chars[i + 1] != '$'
                    && chars[i + 1] != ' '
                    && chars[i + 1] != '\n';
                if has_content {
                    if let Some(end) = find_inline_close(&chars, i + 1) {
                        let body: String = chars[i + 1..end].iter().collect();
                        if !body.ends_with(' ') {
                            let span: String = chars[i..end + 1].iter().collect();
                            let n = table.push(span);
                            out.push_str(&format!("@@{}@@", n));
                            i = end + 1;
                            continue;
                        }
                    }
                }
            }

            out.push(chars[i]);
            i += 1;
        }

        (out, table)
    }

    /// Replace every placeholder token found in `html` with its original
    /// math source. Tokens with no table entry are left in place.
    pub fn reinject(&self, html: &str, table: &MathTable) -> String {
        if table.is_empty() {
            return html.to_string();
        }
        token_regex()
            .replace_all(html, |caps: &regex::Captures<'_>| {
                let n: usize = caps[1].parse().unwrap_or(usize::MAX);
                match table.get(n) {
                    Some(span) => span.to_string(),
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Scanner Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn at_fence(chars: &[char], i: usize) -> bool {
    i + 2 < chars.len()
        && ((chars[i] == '`' && chars[i + 1] == '`' && chars[i + 2] == '`')
            || (chars[i] == '~' && chars[i + 1] == '~' && chars[i + 2] == '~'))
}

/// Copy a fenced code block starting at `i` (which points at the first
/// fence character) into `out`, returning the index one past the block.
/// An unclosed fence runs to the end of the text.
fn copy_fenced_block(chars: &[char], i: usize, out: &mut String) -> usize {
    let fence = chars[i];
    let open = [fence, fence, fence];

    // Skip past the opening fence and its info string line.
    let mut j = i + 3;
    while j < chars.len() && chars[j] != '\n' {
        j += 1;
    }

    let end = match find_seq(chars, j, &open) {
        Some(close) => {
            // Include the closing fence.
            let mut k = close + 3;
            // Trailing fence characters belong to the fence too.
            while k < chars.len() && chars[k] == fence {
                k += 1;
            }
            k
        }
        None => chars.len(),
    };
    out.extend(&chars[i..end]);
    end
}

/// Copy an inline code span starting at `i` (which points at the opening
/// backtick) into `out`, returning the index one past the span. The span is
/// delimited by a matching run of backticks; an unmatched opener is copied
/// as literal text.
fn copy_inline_code(chars: &[char], i: usize, out: &mut String) -> usize {
    let mut open = 0;
    while i + open < chars.len() && chars[i + open] == '`' {
        open += 1;
    }
    let delim: Vec<char> = vec!['`'; open];

    let mut j = i + open;
    while let Some(close) = find_seq(chars, j, &delim) {
        // The closing run must be exactly as long as the opener.
        let mut run = 0;
        while close + run < chars.len() && chars[close + run] == '`' {
            run += 1;
        }
        if run == open {
            let end = close + run;
            out.extend(&chars[i..end]);
            return end;
        }
        j = close + run;
    }

    // No closer; the backticks are literal.
    out.extend(&chars[i..i + open]);
    i + open
}

fn starts_with(chars: &[char], i: usize, s: &str) -> bool {
    let mut j = i;
    for c in s.chars() {
        if j >= chars.len() || chars[j] != c {
            return false;
        }
        j += 1;
    }
    true
}

/// Find the first occurrence of `seq` at or after `from`, returning its
/// starting index.
fn find_seq(chars: &[char], from: usize, seq: &[char]) -> Option<usize> {
    let len = chars.len();
    if seq.len() > len {
        return None;
    }
    let mut i = from;
    while i + seq.len() <= len {
        if chars[i..i + seq.len()] == *seq {
            return Some(i);
        }
        i += 1;
    }
    None
}

/// Find the closing `$` of an inline span started just before `from`.
/// Inline math never spans lines.
fn find_inline_close(chars: &[char], from: usize) -> Option<usize> {
    let mut i = from;
    while i < chars.len() {
        match chars[i] {
            '\n' => return None,
            '\\' => i += 2,
            '$' => return Some(i),
            _ => i += 1,
        }
    }
    None
}

/// Match `\begin{env}...\end{env}` starting at `start` (which points at the
/// backslash). Returns the index one past `\end{env}` and the env name.
fn match_environment(chars: &[char], start: usize) -> Option<(usize, String)> {
    // start + 1 points at "begin{"
    let name_start = start + 7;
    let mut i = name_start;
    while i < chars.len() && chars[i] != '}' {
        i += 1;
    }
    if i >= chars.len() {
        return None;
    }
    let env: String = chars[name_start..i].iter().collect();
    let closing: Vec<char> = format!("\\end{{{}}}", env).chars().collect();
    let end = find_seq(chars, i + 1, &closing)?;
    Some((end + closing.len(), env))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
