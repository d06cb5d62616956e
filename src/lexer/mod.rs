mod token;

pub use token::*;

use once_cell::sync::Lazy;
use std::{collections::HashMap, error::Error, fmt::Display, iter::Peekable, str::Chars};

static KEYWORDS: Lazy<HashMap<&'static str, TokenKind>> = Lazy::new(|| {
    use TokenKind::*;
    HashMap::from([
        ("let", Let),
        ("const", Const),
        ("var", Var),
        ("function", Function),
        ("class", Class),
        ("interface", Interface),
        ("extends", Extends),
        ("implements", Implements),
        ("new", New),
        ("return", Return),
        ("if", If),
        ("else", Else),
        ("while", While),
        ("for", For),
        ("in", In),
        ("break", Break),
        ("continue", Continue),
        ("switch", Switch),
        ("case", Case),
        ("default", Default),
        ("throw", Throw),
        ("try", Try),
        ("catch", Catch),
        ("finally", Finally),
        ("import", Import),
        ("export", Export),
        ("this", This),
        ("super", Super),
        ("null", Null),
        ("undefined", Undefined),
        ("true", True),
        ("false", False),
        ("typeof", Typeof),
        ("instanceof", Instanceof),
        ("delete", Delete),
        ("void", Void),
        ("yield", Yield),
        ("await", Await),
    ])
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    pub message: String,
    pub position: Position,
}

impl Display for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SyntaxError: {} ({}:{})",
            self.message, self.position.0, self.position.1
        )
    }
}

impl Error for LexError {}

pub type LexResult<T> = Result<T, LexError>;

/// Result of lexing one source file: the token stream plus the
/// triple-slash reference directives captured on the way.
#[derive(Debug, Clone, PartialEq)]
pub struct LexedSource {
    pub tokens: Vec<Token>,
    pub references: Vec<ReferenceDirective>,
}

#[derive(Debug, Clone)]
pub struct Lexer<'a> {
    iterator: Peekable<Chars<'a>>,
    line: usize,
    col: usize,
    prev_ends_expr: bool,
    references: Vec<ReferenceDirective>,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            iterator: input.chars().peekable(),
            line: 1,
            col: 1,
            prev_ends_expr: false,
            references: vec![],
        }
    }

    pub fn lex(mut self) -> LexResult<LexedSource> {
        let mut tokens = vec![];
        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }
        Ok(LexedSource {
            tokens,
            references: self.references,
        })
    }

    fn position(&self) -> Position {
        (self.line, self.col)
    }

    fn err(&self, message: impl Into<String>) -> LexError {
        LexError {
            message: message.into(),
            position: self.position(),
        }
    }

    /// Peek at the next character with `\r`/`\r\n` already mapped to `\n`.
    fn peek(&mut self) -> Option<char> {
        self.iterator.peek().map(|c| if *c == '\r' { '\n' } else { *c })
    }

    fn peek_second(&self) -> Option<char> {
        self.iterator.clone().nth(1)
    }

    fn bump(&mut self) -> Option<char> {
        let mut next = self.iterator.next()?;
        if next == '\r' {
            if self.iterator.peek() == Some(&'\n') {
                self.iterator.next();
            }
            next = '\n';
        }
        if next == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(next)
    }

    fn bump_if(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    /// Skip whitespace and comments, capturing triple-slash reference
    /// directives into the side channel.
    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') if self.peek_second() == Some('/') => {
                    let start = self.position();
                    self.bump();
                    self.bump();
                    let mut text = String::new();
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        text.push(c);
                        self.bump();
                    }
                    if let Some(rest) = text.strip_prefix('/') {
                        self.capture_reference(rest, start);
                    }
                }
                Some('/') if self.peek_second() == Some('*') => {
                    self.bump();
                    self.bump();
                    loop {
                        match self.bump() {
                            Some('*') if self.peek() == Some('/') => {
                                self.bump();
                                break;
                            }
                            Some(_) => {}
                            None => break,
                        }
                    }
                }
                _ => break,
            }
        }
    }

    /// Parse `<reference path="…" />` out of the text following `///`.
    fn capture_reference(&mut self, text: &str, start: Position) {
        let trimmed = text.trim();
        if !trimmed.starts_with("<reference") {
            return;
        }
        let Some(idx) = trimmed.find("path=") else {
            return;
        };
        let rest = &trimmed[idx + "path=".len()..];
        let mut chars = rest.chars();
        let Some(quote @ ('"' | '\'')) = chars.next() else {
            return;
        };
        let path: String = chars.take_while(|c| *c != quote).collect();
        self.references.push(ReferenceDirective {
            path,
            span: Span::at(start),
        });
    }

    fn next_token(&mut self) -> LexResult<Option<Token>> {
        self.skip_trivia();

        let start = self.position();
        let Some(next) = self.peek() else {
            return Ok(None);
        };

        let kind = match next {
            c if c.is_ascii_alphabetic() || c == '_' || c == '$' => self.lex_word(),
            c if c.is_ascii_digit() => self.lex_number()?,
            '"' | '\'' => self.lex_string()?,
            '`' => self.lex_template()?,
            '/' if !self.prev_ends_expr => self.lex_regex()?,
            _ => self.lex_punctuator()?,
        };

        self.prev_ends_expr = kind.ends_expression();
        let end = self.position();
        Ok(Some(Token {
            kind,
            span: Span::new(start, end),
        }))
    }

    fn lex_word(&mut self) -> TokenKind {
        let mut word = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' || c == '$' {
                word.push(c);
                self.bump();
            } else {
                break;
            }
        }

        match KEYWORDS.get(word.as_str()) {
            Some(kind) => kind.clone(),
            None => TokenKind::Ident(word),
        }
    }

    fn lex_number(&mut self) -> LexResult<TokenKind> {
        let mut digits = String::new();
        let first = self.bump().unwrap_or('0');
        digits.push(first);

        if first == '0' {
            match self.peek() {
                Some('x' | 'X') => {
                    self.bump();
                    return self.lex_radix_digits(16, |c| c.is_ascii_hexdigit());
                }
                Some('o' | 'O') => {
                    self.bump();
                    return self.lex_radix_digits(8, |c| ('0'..='7').contains(&c));
                }
                Some('b' | 'B') => {
                    self.bump();
                    return self.lex_radix_digits(2, |c| c == '0' || c == '1');
                }
                Some(c) if c.is_ascii_digit() => {
                    // legacy octal (0777) or non-octal decimal (08)
                    while let Some(c) = self.peek() {
                        if c.is_ascii_digit() || c == '_' {
                            digits.push(c);
                            self.bump();
                        } else {
                            break;
                        }
                    }
                    let cleaned: String = digits.chars().filter(|c| *c != '_').collect();
                    let value = if cleaned.chars().all(|c| ('0'..='7').contains(&c)) {
                        u64::from_str_radix(&cleaned, 8)
                            .map_err(|_| self.err(format!("invalid octal literal '{cleaned}'")))?
                            as f64
                    } else {
                        cleaned
                            .parse::<f64>()
                            .map_err(|_| self.err(format!("invalid number literal '{cleaned}'")))?
                    };
                    return Ok(TokenKind::Number {
                        value,
                        legacy_octal: true,
                    });
                }
                _ => {}
            }
        }

        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '_' {
                digits.push(c);
                self.bump();
            } else {
                break;
            }
        }
        if self.peek() == Some('.') && self.peek_second().is_some_and(|c| c.is_ascii_digit()) {
            digits.push('.');
            self.bump();
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() || c == '_' {
                    digits.push(c);
                    self.bump();
                } else {
                    break;
                }
            }
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            digits.push('e');
            self.bump();
            if matches!(self.peek(), Some('+' | '-')) {
                digits.push(self.bump().unwrap());
            }
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    digits.push(c);
                    self.bump();
                } else {
                    break;
                }
            }
        }

        let cleaned: String = digits.chars().filter(|c| *c != '_').collect();
        let value = cleaned
            .parse::<f64>()
            .map_err(|_| self.err(format!("invalid number literal '{cleaned}'")))?;
        Ok(TokenKind::Number {
            value,
            legacy_octal: false,
        })
    }

    fn lex_radix_digits(&mut self, radix: u32, valid: impl Fn(char) -> bool) -> LexResult<TokenKind> {
        let mut digits = String::new();
        while let Some(c) = self.peek() {
            if valid(c) {
                digits.push(c);
                self.bump();
            } else if c == '_' {
                self.bump();
            } else {
                break;
            }
        }
        if digits.is_empty() {
            return Err(self.err("missing digits after radix prefix"));
        }
        let value = u64::from_str_radix(&digits, radix)
            .map_err(|_| self.err(format!("invalid number literal '{digits}'")))?;
        Ok(TokenKind::Number {
            value: value as f64,
            legacy_octal: false,
        })
    }

    /// Decode one escape sequence after a `\`. Returns the decoded text (if
    /// any) and whether it was an octal escape.
    fn read_escape(&mut self) -> LexResult<(Option<char>, bool)> {
        let Some(escaped) = self.bump() else {
            return Err(self.err("unterminated escape sequence"));
        };
        let decoded = match escaped {
            'n' => Some('\n'),
            't' => Some('\t'),
            'r' => Some('\r'),
            'b' => Some('\u{8}'),
            'f' => Some('\u{c}'),
            'v' => Some('\u{b}'),
            '0' if !self.peek().is_some_and(|c| c.is_ascii_digit()) => Some('\0'),
            '0'..='7' => {
                // octal escape, up to three digits
                let mut value = escaped.to_digit(8).unwrap();
                for _ in 0..2 {
                    match self.peek().and_then(|c| c.to_digit(8)) {
                        Some(d) if value * 8 + d < 256 => {
                            value = value * 8 + d;
                            self.bump();
                        }
                        _ => break,
                    }
                }
                return Ok((char::from_u32(value), true));
            }
            '8' | '9' => return Ok((Some(escaped), true)),
            'x' => {
                let mut value = 0u32;
                for _ in 0..2 {
                    let Some(d) = self.peek().and_then(|c| c.to_digit(16)) else {
                        return Err(self.err("invalid hexadecimal escape sequence"));
                    };
                    value = value * 16 + d;
                    self.bump();
                }
                char::from_u32(value)
            }
            'u' => {
                let mut value = 0u32;
                if self.bump_if('{') {
                    while let Some(c) = self.peek() {
                        if c == '}' {
                            break;
                        }
                        let Some(d) = c.to_digit(16) else {
                            return Err(self.err("invalid unicode escape sequence"));
                        };
                        value = value * 16 + d;
                        self.bump();
                    }
                    if !self.bump_if('}') {
                        return Err(self.err("unterminated unicode escape sequence"));
                    }
                } else {
                    for _ in 0..4 {
                        let Some(d) = self.peek().and_then(|c| c.to_digit(16)) else {
                            return Err(self.err("invalid unicode escape sequence"));
                        };
                        value = value * 16 + d;
                        self.bump();
                    }
                }
                char::from_u32(value)
            }
            '\n' => None,
            other => Some(other),
        };
        Ok((decoded, false))
    }

    fn lex_string(&mut self) -> LexResult<TokenKind> {
        let quote = self.bump().unwrap();
        let mut value = String::new();
        let mut octal_escape = false;

        loop {
            match self.peek() {
                None => return Err(self.err("unterminated string literal")),
                Some('\n') => return Err(self.err("unterminated string literal")),
                Some(c) if c == quote => {
                    self.bump();
                    break;
                }
                Some('\\') => {
                    self.bump();
                    let (decoded, octal) = self.read_escape()?;
                    octal_escape |= octal;
                    if let Some(c) = decoded {
                        value.push(c);
                    }
                }
                Some(c) => {
                    value.push(c);
                    self.bump();
                }
            }
        }

        Ok(TokenKind::Str {
            value,
            octal_escape,
        })
    }

    fn lex_template(&mut self) -> LexResult<TokenKind> {
        self.bump(); // opening backtick
        let mut parts = vec![];
        let mut chunk = String::new();

        loop {
            match self.peek() {
                None => return Err(self.err("unterminated template literal")),
                Some('`') => {
                    self.bump();
                    parts.push(TemplatePart::Chunk(chunk));
                    break;
                }
                Some('$') if self.peek_second() == Some('{') => {
                    self.bump();
                    self.bump();
                    parts.push(TemplatePart::Chunk(std::mem::take(&mut chunk)));
                    parts.push(TemplatePart::Expr(self.lex_interpolation()?));
                }
                Some('\\') => {
                    self.bump();
                    let (decoded, _) = self.read_escape()?;
                    if let Some(c) = decoded {
                        chunk.push(c);
                    }
                }
                Some(c) => {
                    chunk.push(c);
                    self.bump();
                }
            }
        }

        Ok(TokenKind::Template { parts })
    }

    /// Lex the tokens of one `${…}` interpolation up to its closing brace.
    fn lex_interpolation(&mut self) -> LexResult<Vec<Token>> {
        let mut tokens = vec![];
        let mut depth = 0usize;
        self.prev_ends_expr = false;

        loop {
            let Some(token) = self.next_token()? else {
                return Err(self.err("unterminated template interpolation"));
            };
            match token.kind {
                TokenKind::LBrace => depth += 1,
                TokenKind::RBrace => {
                    if depth == 0 {
                        return Ok(tokens);
                    }
                    depth -= 1;
                }
                _ => {}
            }
            tokens.push(token);
        }
    }

    fn lex_regex(&mut self) -> LexResult<TokenKind> {
        self.bump(); // opening slash
        let mut pattern = String::new();
        let mut in_class = false;

        loop {
            match self.peek() {
                None | Some('\n') => return Err(self.err("unterminated regex literal")),
                Some('\\') => {
                    pattern.push(self.bump().unwrap());
                    if let Some(c) = self.bump() {
                        pattern.push(c);
                    }
                }
                Some('[') => {
                    in_class = true;
                    pattern.push(self.bump().unwrap());
                }
                Some(']') => {
                    in_class = false;
                    pattern.push(self.bump().unwrap());
                }
                Some('/') if !in_class => {
                    self.bump();
                    break;
                }
                Some(c) => {
                    pattern.push(c);
                    self.bump();
                }
            }
        }

        let mut flags = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphabetic() {
                flags.push(c);
                self.bump();
            } else {
                break;
            }
        }

        Ok(TokenKind::Regex { pattern, flags })
    }

    fn lex_punctuator(&mut self) -> LexResult<TokenKind> {
        use TokenKind::*;
        let c = self.bump().unwrap();
        let kind = match c {
            '(' => LParen,
            ')' => RParen,
            '[' => LBracket,
            ']' => RBracket,
            '{' => LBrace,
            '}' => RBrace,
            ';' => Semicolon,
            ',' => Comma,
            ':' => Colon,
            '.' => {
                if self.peek() == Some('.') && self.peek_second() == Some('.') {
                    self.bump();
                    self.bump();
                    Ellipsis
                } else {
                    Dot
                }
            }
            '?' => {
                if self.bump_if('?') {
                    QuestionQuestion
                } else {
                    Question
                }
            }
            '=' => {
                if self.bump_if('>') {
                    Arrow
                } else if self.bump_if('=') {
                    if self.bump_if('=') {
                        EqEqEq
                    } else {
                        EqEq
                    }
                } else {
                    Eq
                }
            }
            '+' => {
                if self.bump_if('+') {
                    PlusPlus
                } else if self.bump_if('=') {
                    PlusEq
                } else {
                    Plus
                }
            }
            '-' => {
                if self.bump_if('-') {
                    MinusMinus
                } else if self.bump_if('=') {
                    MinusEq
                } else {
                    Minus
                }
            }
            '*' => {
                if self.bump_if('=') {
                    StarEq
                } else {
                    Star
                }
            }
            '/' => {
                if self.bump_if('=') {
                    SlashEq
                } else {
                    Slash
                }
            }
            '%' => {
                if self.bump_if('=') {
                    PercentEq
                } else {
                    Percent
                }
            }
            '!' => {
                if self.bump_if('=') {
                    if self.bump_if('=') {
                        NotEqEq
                    } else {
                        NotEq
                    }
                } else {
                    Bang
                }
            }
            '<' => {
                if self.bump_if('=') {
                    LtEq
                } else {
                    Lt
                }
            }
            '>' => {
                if self.bump_if('=') {
                    GtEq
                } else {
                    Gt
                }
            }
            '&' => {
                if self.bump_if('&') {
                    AmpAmp
                } else {
                    Amp
                }
            }
            '|' => {
                if self.bump_if('|') {
                    PipePipe
                } else {
                    Pipe
                }
            }
            other => return Err(self.err(format!("failed to lex '{other}'"))),
        };
        Ok(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        Lexer::new(input)
            .lex()
            .unwrap()
            .tokens
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_lex_let_declaration() {
        assert_eq!(
            kinds("let foo = 42;"),
            vec![
                TokenKind::Let,
                TokenKind::Ident("foo".into()),
                TokenKind::Eq,
                TokenKind::Number {
                    value: 42.0,
                    legacy_octal: false
                },
                TokenKind::Semicolon,
            ]
        );
    }

    #[test]
    fn test_lex_positions() {
        let lexed = Lexer::new("let x").lex().unwrap();
        assert_eq!(lexed.tokens[0].span.start, (1, 1));
        assert_eq!(lexed.tokens[1].span.start, (1, 5));
    }

    #[test]
    fn test_lex_numeric_bases() {
        assert_eq!(
            kinds("0xff 0o17 0b101 1_000 1.5"),
            vec![
                TokenKind::Number {
                    value: 255.0,
                    legacy_octal: false
                },
                TokenKind::Number {
                    value: 15.0,
                    legacy_octal: false
                },
                TokenKind::Number {
                    value: 5.0,
                    legacy_octal: false
                },
                TokenKind::Number {
                    value: 1000.0,
                    legacy_octal: false
                },
                TokenKind::Number {
                    value: 1.5,
                    legacy_octal: false
                },
            ]
        );
    }

    #[test]
    fn test_lex_legacy_octal_is_flagged() {
        assert_eq!(
            kinds("0777"),
            vec![TokenKind::Number {
                value: 511.0,
                legacy_octal: true
            }]
        );
        assert_eq!(
            kinds("0 0.5"),
            vec![
                TokenKind::Number {
                    value: 0.0,
                    legacy_octal: false
                },
                TokenKind::Number {
                    value: 0.5,
                    legacy_octal: false
                },
            ]
        );
    }

    #[test]
    fn test_lex_octal_escape_is_flagged() {
        assert_eq!(
            kinds(r#""a\1b""#),
            vec![TokenKind::Str {
                value: "a\u{1}b".into(),
                octal_escape: true
            }]
        );
        assert_eq!(
            kinds(r#""a\0b""#),
            vec![TokenKind::Str {
                value: "a\0b".into(),
                octal_escape: false
            }]
        );
        assert_eq!(
            kinds(r#""\01""#),
            vec![TokenKind::Str {
                value: "\u{1}".into(),
                octal_escape: true
            }]
        );
    }

    #[test]
    fn test_lex_template_with_interpolation() {
        let lexed = Lexer::new("`a${x}b`").lex().unwrap();
        let TokenKind::Template { parts } = &lexed.tokens[0].kind else {
            panic!("expected template, got {:?}", lexed.tokens[0].kind);
        };
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], TemplatePart::Chunk("a".into()));
        let TemplatePart::Expr(tokens) = &parts[1] else {
            panic!("expected interpolation");
        };
        assert_eq!(tokens[0].kind, TokenKind::Ident("x".into()));
        assert_eq!(parts[2], TemplatePart::Chunk("b".into()));
    }

    #[test]
    fn test_lex_regex_vs_division() {
        assert_eq!(
            kinds("a / b"),
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::Slash,
                TokenKind::Ident("b".into()),
            ]
        );
        assert_eq!(
            kinds("x = /ab+/g"),
            vec![
                TokenKind::Ident("x".into()),
                TokenKind::Eq,
                TokenKind::Regex {
                    pattern: "ab+".into(),
                    flags: "g".into()
                },
            ]
        );
    }

    #[test]
    fn test_lex_reference_directive() {
        let lexed = Lexer::new("/// <reference path=\"./other.ts\" />\nlet x = 1;")
            .lex()
            .unwrap();
        assert_eq!(lexed.references.len(), 1);
        assert_eq!(lexed.references[0].path, "./other.ts");
        assert_eq!(lexed.tokens[0].kind, TokenKind::Let);
    }

    #[test]
    fn test_lex_comments_are_skipped() {
        assert_eq!(
            kinds("1 // comment\n/* block\ncomment */ 2"),
            vec![
                TokenKind::Number {
                    value: 1.0,
                    legacy_octal: false
                },
                TokenKind::Number {
                    value: 2.0,
                    legacy_octal: false
                },
            ]
        );
    }
}
