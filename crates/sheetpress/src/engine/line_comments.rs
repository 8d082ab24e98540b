//! Source-location comments for development builds.
//!
//! Each top-level style rule gets a loud comment naming the line and file it
//! came from. Loud comments survive expanded output, so the compiled CSS
//! points back at its source:
//!
//! ```text
//! /* line 3, theme/button.scss */
//! .button {
//!   color: red;
//! }
//! ```

/// Insert `/* line N, <file> */` before every top-level style rule.
///
/// At-rules, variable declarations and placeholder selectors are left alone.
/// A selector list split over several lines is annotated once, above its
/// first line.
pub fn annotate(source: &str, file: &str) -> String {
    let mut out = String::with_capacity(source.len() + 64);
    let mut scanner = Scanner::default();

    for (index, line) in source.split_inclusive('\n').enumerate() {
        if scanner.at_statement_start() && opens_style_rule(line) {
            out.push_str(&format!("/* line {}, {} */\n", index + 1, file));
        }
        scanner.feed(line);
        out.push_str(line);
    }
    out
}

fn opens_style_rule(line: &str) -> bool {
    let trimmed = line.trim_start();
    !trimmed.is_empty() && !trimmed.starts_with(['@', '$', '%', '/', '}', '{', ')'])
}

/// Tracks nesting across lines, ignoring strings and comments.
#[derive(Debug, Clone)]
struct Scanner {
    braces: usize,
    parens: usize,
    in_block_comment: bool,
    /// The previous top-level statement is complete.
    statement_start: bool,
}

impl Default for Scanner {
    fn default() -> Self {
        Self {
            braces: 0,
            parens: 0,
            in_block_comment: false,
            statement_start: true,
        }
    }
}

impl Scanner {
    fn at_statement_start(&self) -> bool {
        self.braces == 0 && self.parens == 0 && !self.in_block_comment && self.statement_start
    }

    fn feed(&mut self, line: &str) {
        let mut chars = line.chars().peekable();
        let mut quote: Option<char> = None;
        let mut last_code: Option<char> = None;

        while let Some(ch) = chars.next() {
            if self.in_block_comment {
                if ch == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    self.in_block_comment = false;
                }
                continue;
            }
            if let Some(q) = quote {
                if ch == '\\' {
                    chars.next();
                } else if ch == q {
                    quote = None;
                }
                last_code = Some(ch);
                continue;
            }
            match ch {
                '"' | '\'' => quote = Some(ch),
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    self.in_block_comment = true;
                    continue;
                }
                '/' if chars.peek() == Some(&'/') => break,
                '{' => self.braces += 1,
                '}' => self.braces = self.braces.saturating_sub(1),
                '(' => self.parens += 1,
                ')' => self.parens = self.parens.saturating_sub(1),
                _ => {}
            }
            if !ch.is_whitespace() {
                last_code = Some(ch);
            }
        }

        if let Some(last) = last_code {
            self.statement_start = last != ',';
        }
    }
}
