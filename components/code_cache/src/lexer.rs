//! Source tokenizer.
//!
//! Splits JavaScript source into the tokens the parser consumes:
//! identifiers, keywords, punctuators and literals. Whitespace and comments
//! are dropped; each token remembers whether a line break preceded it.

use core_types::{JsError, SourcePosition};

/// Reserved words recognised as keywords.
const KEYWORDS: &[&str] = &[
    "await", "break", "case", "catch", "class", "const", "continue", "debugger", "default",
    "delete", "do", "else", "export", "extends", "false", "finally", "for", "function", "if",
    "import", "in", "instanceof", "let", "new", "null", "return", "static", "super", "switch",
    "this", "throw", "true", "try", "typeof", "var", "void", "while", "with", "yield",
];

/// Punctuators, longest first so the scanner can take the first match.
const PUNCTUATORS: &[&str] = &[
    ">>>=", "...", "===", "!==", "**=", "<<=", ">>=", ">>>", "&&=", "||=", "??=", "=>", "==",
    "!=", "<=", ">=", "&&", "||", "??", "?.", "++", "--", "+=", "-=", "*=", "/=", "%=", "&=",
    "|=", "^=", "**", "<<", ">>", "{", "}", "(", ")", "[", "]", ";", ",", "<", ">", "+", "-",
    "*", "/", "%", "&", "|", "^", "!", "~", "?", ":", "=", ".", "@",
];

/// Keywords after which a `/` starts a regular expression.
const REGEX_PREFIX_KEYWORDS: &[&str] = &[
    "await", "case", "delete", "do", "else", "in", "instanceof", "new", "return", "throw",
    "typeof", "void", "yield",
];

/// Token category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// Identifier, including contextual words like `from` and `as`
    Identifier,
    /// Reserved word
    Keyword,
    /// Operator or delimiter
    Punctuator,
    /// Numeric literal
    Number,
    /// BigInt literal, without the `n` suffix
    BigInt,
    /// String literal, escapes resolved
    String,
    /// Template literal, raw text between the backticks
    Template,
    /// Regular expression literal
    RegExp,
}

/// One token.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// Category
    pub kind: TokenKind,
    /// Lexeme; the cooked value for strings
    pub text: String,
    /// Where the token starts
    pub position: SourcePosition,
    /// Whether a line terminator came between this token and the previous one
    pub newline_before: bool,
}

impl Token {
    /// Whether this is the punctuator `p`.
    pub fn is_punct(&self, p: &str) -> bool {
        self.kind == TokenKind::Punctuator && self.text == p
    }

    /// Whether this is the keyword `k`.
    pub fn is_keyword(&self, k: &str) -> bool {
        self.kind == TokenKind::Keyword && self.text == k
    }

    /// Whether this is the identifier `name`.
    pub fn is_ident(&self, name: &str) -> bool {
        self.kind == TokenKind::Identifier && self.text == name
    }
}

/// Tokenize all of `source`.
pub fn tokenize(source: &str) -> Result<Vec<Token>, JsError> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();
    while let Some(token) = lexer.next_token()? {
        tokens.push(token);
    }
    Ok(tokens)
}

/// Streaming tokenizer over one source text.
pub struct Lexer {
    chars: Vec<char>,
    position: usize,
    line: u32,
    column: u32,
    regex_allowed: bool,
}

impl Lexer {
    /// Create a lexer, skipping a leading hashbang line.
    pub fn new(source: &str) -> Self {
        let mut lexer = Lexer {
            chars: source.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
            regex_allowed: true,
        };
        if lexer.peek() == '#' && lexer.peek_next() == Some('!') {
            while !lexer.is_at_end() && !is_line_terminator(lexer.peek()) {
                lexer.advance();
            }
        }
        lexer
    }

    /// Next token, or `None` at the end of input.
    pub fn next_token(&mut self) -> Result<Option<Token>, JsError> {
        let line_before = self.line;
        self.skip_whitespace_and_comments()?;
        if self.is_at_end() {
            return Ok(None);
        }
        let newline_before = self.line > line_before;
        let start = self.current_position();
        let ch = self.peek();

        let (kind, text) = if ch == '"' || ch == '\'' {
            self.advance();
            (TokenKind::String, self.scan_string(ch, start)?)
        } else if ch == '`' {
            self.advance();
            (TokenKind::Template, self.scan_template(start)?)
        } else if ch.is_ascii_digit() || (ch == '.' && self.peek_next().is_some_and(|c| c.is_ascii_digit())) {
            self.scan_number(start)?
        } else if is_id_start(ch) || ch == '#' {
            let text = self.scan_identifier(start)?;
            if KEYWORDS.contains(&text.as_str()) {
                (TokenKind::Keyword, text)
            } else {
                (TokenKind::Identifier, text)
            }
        } else if ch == '/' && self.regex_allowed {
            self.advance();
            (TokenKind::RegExp, self.scan_regexp(start)?)
        } else {
            (TokenKind::Punctuator, self.scan_punctuator(start)?)
        };

        self.regex_allowed = match kind {
            TokenKind::Punctuator => !matches!(text.as_str(), ")" | "]" | "}" | "++" | "--"),
            TokenKind::Keyword => REGEX_PREFIX_KEYWORDS.contains(&text.as_str()),
            _ => false,
        };
        Ok(Some(Token {
            kind,
            text,
            position: start,
            newline_before,
        }))
    }

    fn scan_string(&mut self, quote: char, start: SourcePosition) -> Result<String, JsError> {
        let mut value = String::new();
        loop {
            if self.is_at_end() || is_line_terminator(self.peek()) {
                return Err(JsError::syntax("Invalid or unexpected token", start));
            }
            let ch = self.advance();
            if ch == quote {
                return Ok(value);
            }
            if ch != '\\' {
                value.push(ch);
                continue;
            }
            if self.is_at_end() {
                return Err(JsError::syntax("Invalid or unexpected token", start));
            }
            let escaped = self.advance();
            match escaped {
                'n' => value.push('\n'),
                't' => value.push('\t'),
                'r' => value.push('\r'),
                'b' => value.push('\u{0008}'),
                'f' => value.push('\u{000C}'),
                'v' => value.push('\u{000B}'),
                '0' if !self.peek().is_ascii_digit() => value.push('\0'),
                'x' => value.push(self.scan_hex_escape(2, start)?),
                'u' => value.push(self.scan_unicode_escape(start)?),
                '\r' => {
                    if self.peek() == '\n' {
                        self.advance();
                    }
                    self.new_line();
                }
                '\n' | '\u{2028}' | '\u{2029}' => self.new_line(),
                other => value.push(other),
            }
        }
    }

    fn scan_hex_escape(&mut self, digits: usize, start: SourcePosition) -> Result<char, JsError> {
        let mut code = 0u32;
        for _ in 0..digits {
            let digit = self
                .peek()
                .to_digit(16)
                .ok_or_else(|| JsError::syntax("Invalid hexadecimal escape sequence", start))?;
            self.advance();
            code = code * 16 + digit;
        }
        char::from_u32(code).ok_or_else(|| JsError::syntax("Invalid hexadecimal escape sequence", start))
    }

    fn scan_unicode_escape(&mut self, start: SourcePosition) -> Result<char, JsError> {
        let mut code = 0u32;
        if !self.match_char('{') {
            for _ in 0..4 {
                let digit = self
                    .peek()
                    .to_digit(16)
                    .ok_or_else(|| JsError::syntax("Invalid Unicode escape sequence", start))?;
                self.advance();
                code = code * 16 + digit;
            }
            // Lone surrogates have no `char`.
            return Ok(char::from_u32(code).unwrap_or('\u{FFFD}'));
        }
        let mut digits = 0;
        while let Some(digit) = self.peek().to_digit(16) {
            self.advance();
            code = code.saturating_mul(16).saturating_add(digit);
            digits += 1;
        }
        if digits == 0 || !self.match_char('}') || code > 0x10FFFF {
            return Err(JsError::syntax("Invalid Unicode escape sequence", start));
        }
        Ok(char::from_u32(code).unwrap_or('\u{FFFD}'))
    }

    /// Raw template text; `${...}` substitutions are kept verbatim.
    fn scan_template(&mut self, start: SourcePosition) -> Result<String, JsError> {
        let mut raw = String::new();
        let mut depth = 0usize;
        loop {
            if self.is_at_end() {
                return Err(JsError::syntax("Unterminated template literal", start));
            }
            let ch = self.advance();
            match ch {
                '`' if depth == 0 => return Ok(raw),
                '\\' => {
                    raw.push(ch);
                    if !self.is_at_end() {
                        let next = self.advance();
                        if is_line_terminator(next) {
                            self.new_line();
                        }
                        raw.push(next);
                    }
                    continue;
                }
                '$' if self.peek() == '{' => {
                    raw.push(ch);
                    raw.push(self.advance());
                    depth += 1;
                    continue;
                }
                '{' if depth > 0 => depth += 1,
                '}' if depth > 0 => depth -= 1,
                '\'' | '"' if depth > 0 => {
                    let from = self.position - 1;
                    let inner = self.current_position();
                    self.scan_string(ch, inner)?;
                    raw.extend(&self.chars[from..self.position]);
                    continue;
                }
                '\n' | '\u{2028}' | '\u{2029}' => self.new_line(),
                '\r' => {
                    if self.peek() != '\n' {
                        self.new_line();
                    }
                }
                _ => {}
            }
            raw.push(ch);
        }
    }

    fn scan_number(&mut self, start: SourcePosition) -> Result<(TokenKind, String), JsError> {
        let mut text = String::new();
        let first = self.advance();
        text.push(first);
        let radix_prefix = first == '0' && matches!(self.peek(), 'x' | 'X' | 'o' | 'O' | 'b' | 'B');
        if radix_prefix {
            text.push(self.advance());
            let radix = match text.as_str() {
                "0x" | "0X" => 16,
                "0o" | "0O" => 8,
                _ => 2,
            };
            let before = text.len();
            while self.peek().is_digit(radix) || self.peek() == '_' {
                text.push(self.advance());
            }
            if text.len() == before {
                return Err(JsError::syntax("Invalid or unexpected token", start));
            }
        } else {
            let mut seen_dot = first == '.';
            let mut seen_exponent = false;
            loop {
                let ch = self.peek();
                if ch.is_ascii_digit() || ch == '_' {
                    text.push(self.advance());
                } else if ch == '.' && !seen_dot && !seen_exponent {
                    seen_dot = true;
                    text.push(self.advance());
                } else if matches!(ch, 'e' | 'E') && !seen_exponent {
                    seen_exponent = true;
                    text.push(self.advance());
                    if matches!(self.peek(), '+' | '-') {
                        text.push(self.advance());
                    }
                    if !self.peek().is_ascii_digit() {
                        return Err(JsError::syntax("Invalid or unexpected token", start));
                    }
                } else {
                    break;
                }
            }
            if self.peek() == 'n' && (seen_dot || seen_exponent) {
                return Err(JsError::syntax("Invalid or unexpected token", start));
            }
        }
        let kind = if self.match_char('n') {
            TokenKind::BigInt
        } else {
            TokenKind::Number
        };
        if is_id_start(self.peek()) || self.peek().is_ascii_digit() {
            return Err(JsError::syntax("Invalid or unexpected token", start));
        }
        Ok((kind, text))
    }

    fn scan_identifier(&mut self, start: SourcePosition) -> Result<String, JsError> {
        let mut text = String::new();
        text.push(self.advance());
        while is_id_continue(self.peek()) {
            text.push(self.advance());
        }
        if text == "#" {
            return Err(JsError::syntax("Invalid or unexpected token", start));
        }
        Ok(text)
    }

    fn scan_regexp(&mut self, start: SourcePosition) -> Result<String, JsError> {
        let mut text = String::from("/");
        let mut in_class = false;
        loop {
            if self.is_at_end() || is_line_terminator(self.peek()) {
                return Err(JsError::syntax(
                    "Invalid regular expression: missing /",
                    start,
                ));
            }
            let ch = self.advance();
            text.push(ch);
            match ch {
                '\\' => {
                    if !self.is_at_end() && !is_line_terminator(self.peek()) {
                        text.push(self.advance());
                    }
                }
                '[' => in_class = true,
                ']' => in_class = false,
                '/' if !in_class => break,
                _ => {}
            }
        }
        while is_id_continue(self.peek()) {
            text.push(self.advance());
        }
        Ok(text)
    }

    fn scan_punctuator(&mut self, start: SourcePosition) -> Result<String, JsError> {
        for punct in PUNCTUATORS {
            let matches = punct
                .chars()
                .enumerate()
                .all(|(i, c)| self.chars.get(self.position + i) == Some(&c));
            if matches {
                for _ in 0..punct.chars().count() {
                    self.advance();
                }
                return Ok(punct.to_string());
            }
        }
        Err(JsError::syntax(
            format!("Invalid or unexpected token '{}'", self.peek()),
            start,
        ))
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<(), JsError> {
        while !self.is_at_end() {
            let ch = self.peek();
            if ch == '\r' {
                self.advance();
                self.match_char('\n');
                self.new_line();
            } else if is_line_terminator(ch) {
                self.advance();
                self.new_line();
            } else if ch.is_whitespace() || ch == '\u{FEFF}' {
                self.advance();
            } else if ch == '/' && self.peek_next() == Some('/') {
                while !self.is_at_end() && !is_line_terminator(self.peek()) {
                    self.advance();
                }
            } else if ch == '/' && self.peek_next() == Some('*') {
                let start = self.current_position();
                self.advance();
                self.advance();
                loop {
                    if self.is_at_end() {
                        return Err(JsError::syntax("Unterminated multi-line comment", start));
                    }
                    let ch = self.advance();
                    if ch == '*' && self.match_char('/') {
                        break;
                    }
                    if ch == '\r' {
                        self.match_char('\n');
                        self.new_line();
                    } else if is_line_terminator(ch) {
                        self.new_line();
                    }
                }
            } else {
                break;
            }
        }
        Ok(())
    }

    fn new_line(&mut self) {
        self.line += 1;
        self.column = 1;
    }

    fn is_at_end(&self) -> bool {
        self.position >= self.chars.len()
    }

    fn peek(&self) -> char {
        self.chars.get(self.position).copied().unwrap_or('\0')
    }

    fn peek_next(&self) -> Option<char> {
        self.chars.get(self.position + 1).copied()
    }

    fn advance(&mut self) -> char {
        let ch = self.peek();
        self.position += 1;
        self.column += 1;
        ch
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.is_at_end() || self.peek() != expected {
            false
        } else {
            self.advance();
            true
        }
    }

    fn current_position(&self) -> SourcePosition {
        SourcePosition {
            line: self.line,
            column: self.column,
            offset: self.position,
        }
    }
}

fn is_line_terminator(c: char) -> bool {
    matches!(c, '\n' | '\r' | '\u{2028}' | '\u{2029}')
}

fn is_id_start(ch: char) -> bool {
    ch == '$' || ch == '_' || ch.is_alphabetic()
}

fn is_id_continue(ch: char) -> bool {
    ch == '$' || ch == '_' || ch == '\u{200C}' || ch == '\u{200D}' || ch.is_alphanumeric()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<(TokenKind, String)> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| (t.kind, t.text))
            .collect()
    }

    #[test]
    fn test_lexer_empty_source() {
        assert!(tokenize("").unwrap().is_empty());
        assert!(tokenize("  // only a comment\n/* and another */").unwrap().is_empty());
    }

    #[test]
    fn test_lexer_declaration() {
        assert_eq!(
            kinds("let x = 1;"),
            vec![
                (TokenKind::Keyword, "let".to_string()),
                (TokenKind::Identifier, "x".to_string()),
                (TokenKind::Punctuator, "=".to_string()),
                (TokenKind::Number, "1".to_string()),
                (TokenKind::Punctuator, ";".to_string()),
            ]
        );
    }

    #[test]
    fn test_lexer_string_escapes() {
        let tokens = kinds(r#"'a\nb' "\x41B\u{43}""#);
        assert_eq!(tokens[0], (TokenKind::String, "a\nb".to_string()));
        assert_eq!(tokens[1], (TokenKind::String, "ABC".to_string()));
    }

    #[test]
    fn test_lexer_longest_punctuator() {
        let tokens = kinds("a >>>= b ?? c?.d");
        assert_eq!(tokens[1].1, ">>>=");
        assert_eq!(tokens[3].1, "??");
        assert_eq!(tokens[5].1, "?.");
    }

    #[test]
    fn test_lexer_bigint_and_radix() {
        let tokens = kinds("10n 0xff 0b1_0 1.5e-3");
        assert_eq!(tokens[0], (TokenKind::BigInt, "10".to_string()));
        assert_eq!(tokens[1], (TokenKind::Number, "0xff".to_string()));
        assert_eq!(tokens[2], (TokenKind::Number, "0b1_0".to_string()));
        assert_eq!(tokens[3], (TokenKind::Number, "1.5e-3".to_string()));
    }

    #[test]
    fn test_lexer_regex_versus_division() {
        let tokens = kinds("x = a / b; y = /ab+c/gi.test(s)");
        assert_eq!(tokens[3], (TokenKind::Punctuator, "/".to_string()));
        assert!(tokens.contains(&(TokenKind::RegExp, "/ab+c/gi".to_string())));
    }

    #[test]
    fn test_lexer_template_with_substitution() {
        let tokens = kinds("`a ${ {b: '}'}.b } c`");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].0, TokenKind::Template);
    }

    #[test]
    fn test_lexer_tracks_lines() {
        let tokens = tokenize("a\n  b").unwrap();
        assert_eq!(tokens[1].position.line, 2);
        assert_eq!(tokens[1].position.column, 3);
        assert!(tokens[1].newline_before);
        assert!(!tokens[0].newline_before);
    }

    #[test]
    fn test_lexer_hashbang() {
        assert_eq!(kinds("#!/usr/bin/env node\nx").len(), 1);
    }

    #[test]
    fn test_lexer_errors() {
        assert!(tokenize("'open").is_err());
        assert!(tokenize("/* open").is_err());
        assert!(tokenize("`open").is_err());
        assert!(tokenize("3in").is_err());
        let err = tokenize("x\n  'oops").unwrap_err();
        assert_eq!(err.source_position.map(|p| p.line), Some(2));
    }
}
