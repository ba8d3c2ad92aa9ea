// Lexer for the Ard language.
//
// Single pass over the source bytes with 1-based line/column tracking.
// String interpolation switches the lexer between string mode and
// normal mode: `"a {x} b"` produces `Str("a ") ExprOpen Identifier(x)
// ExprClose Str(" b")`. Module paths (`ard/io`) are recognized only
// immediately after the `use` keyword.
//
// The token stream is total: unexpected bytes become `Unknown` tokens
// and the stream always ends with `Eof`. The parser turns `Unknown`
// into diagnostics.

mod token;

pub use token::{Token, TokenKind};

pub struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
    line: usize,
    column: usize,
    tokens: Vec<Token>,
    modes: Vec<Mode>,
}

/// Lexing mode. `Interpolation` frames track brace nesting so that a
/// `}` inside an interpolated expression does not close the
/// interpolation early.
enum Mode {
    InString,
    Interpolation { depth: usize },
}

/// Tokenize `source`. Pure: same input, same token stream.
pub fn tokenize(source: &str) -> Vec<Token> {
    Lexer::new(source).run()
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            src: source.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
            tokens: Vec::new(),
            modes: Vec::new(),
        }
    }

    pub fn run(mut self) -> Vec<Token> {
        while self.pos < self.src.len() {
            match self.modes.last() {
                Some(Mode::InString) => self.string_chunk(),
                _ => self.normal_token(),
            }
        }
        // Unterminated string or interpolation at end of input: the
        // stream still ends with Eof and the parser reports it.
        self.push_at(TokenKind::Eof, String::new(), self.line, self.column);
        self.tokens
    }

    fn peek(&self) -> u8 {
        *self.src.get(self.pos).unwrap_or(&0)
    }

    fn peek_next(&self) -> u8 {
        *self.src.get(self.pos + 1).unwrap_or(&0)
    }

    fn bump(&mut self) -> u8 {
        let byte = self.peek();
        self.pos += 1;
        if byte == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        byte
    }

    fn push_at(&mut self, kind: TokenKind, text: String, line: usize, column: usize) {
        self.tokens.push(Token {
            kind,
            line,
            column,
            text,
        });
    }

    /// True when the previous significant token was `use`, which puts
    /// the next word into module-path position.
    fn after_use(&self) -> bool {
        self.tokens
            .iter()
            .rev()
            .find(|t| !matches!(t.kind, TokenKind::Comment | TokenKind::BlockComment))
            .map(|t| t.kind == TokenKind::Use)
            .unwrap_or(false)
    }

    fn normal_token(&mut self) {
        let byte = self.peek();
        let (line, column) = (self.line, self.column);

        match byte {
            b' ' | b'\t' | b'\r' => {
                self.bump();
            }
            b'\n' => {
                self.bump();
                self.push_at(TokenKind::NewLine, "\n".to_string(), line, column);
            }
            b'/' if self.peek_next() == b'/' => self.line_comment(),
            b'/' if self.peek_next() == b'*' => self.block_comment(),
            b'"' => {
                self.bump();
                self.modes.push(Mode::InString);
                // An immediately-closed `""` still yields one empty chunk.
                if self.peek() == b'"' {
                    self.bump();
                    self.modes.pop();
                    self.push_at(TokenKind::Str, String::new(), line, column);
                }
            }
            b'0'..=b'9' => self.number(),
            b'A'..=b'Z' | b'a'..=b'z' | b'_' | b'$' => self.word(),
            b'{' => {
                self.bump();
                if let Some(Mode::Interpolation { depth }) = self.modes.last_mut() {
                    *depth += 1;
                }
                self.push_at(TokenKind::LeftBrace, "{".to_string(), line, column);
            }
            b'}' => {
                self.bump();
                match self.modes.last_mut() {
                    Some(Mode::Interpolation { depth }) if *depth == 0 => {
                        self.modes.pop();
                        self.push_at(TokenKind::ExprClose, "}".to_string(), line, column);
                    }
                    Some(Mode::Interpolation { depth }) => {
                        *depth -= 1;
                        self.push_at(TokenKind::RightBrace, "}".to_string(), line, column);
                    }
                    _ => self.push_at(TokenKind::RightBrace, "}".to_string(), line, column),
                }
            }
            _ => self.punctuation(),
        }
    }

    fn line_comment(&mut self) {
        let (line, column) = (self.line, self.column);
        let start = self.pos;
        while self.pos < self.src.len() && self.peek() != b'\n' {
            self.bump();
        }
        let text = self.slice(start, self.pos);
        self.push_at(TokenKind::Comment, text, line, column);
    }

    fn block_comment(&mut self) {
        let (line, column) = (self.line, self.column);
        let start = self.pos;
        self.bump();
        self.bump();
        while self.pos < self.src.len() {
            if self.peek() == b'*' && self.peek_next() == b'/' {
                self.bump();
                self.bump();
                break;
            }
            self.bump();
        }
        let text = self.slice(start, self.pos);
        self.push_at(TokenKind::BlockComment, text, line, column);
    }

    fn number(&mut self) {
        let (line, column) = (self.line, self.column);
        let start = self.pos;
        while self.peek().is_ascii_digit() {
            self.bump();
        }
        // A single `.` continues the number only when followed by a
        // digit; `1..3` stays Number DotDot Number.
        if self.peek() == b'.' && self.peek_next().is_ascii_digit() {
            self.bump();
            while self.peek().is_ascii_digit() {
                self.bump();
            }
        }
        let text = self.slice(start, self.pos);
        self.push_at(TokenKind::Number, text, line, column);
    }

    fn word(&mut self) {
        let (line, column) = (self.line, self.column);

        if self.after_use() {
            return self.module_path(line, column);
        }

        let start = self.pos;
        if self.peek() == b'$' {
            self.bump();
        }
        while matches!(self.peek(), b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_') {
            self.bump();
        }
        let text = self.slice(start, self.pos);
        let kind = TokenKind::keyword(&text).unwrap_or(TokenKind::Identifier);
        self.push_at(kind, text, line, column);
    }

    /// Module path literal: identifier characters plus `/ . -`, one
    /// token. Only entered immediately after `use`.
    fn module_path(&mut self, line: usize, column: usize) {
        let start = self.pos;
        while matches!(
            self.peek(),
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_' | b'/' | b'.' | b'-'
        ) {
            self.bump();
        }
        let text = self.slice(start, self.pos);
        self.push_at(TokenKind::Path, text, line, column);
    }

    fn punctuation(&mut self) {
        let (line, column) = (self.line, self.column);
        let byte = self.bump();
        let two = |kind: TokenKind, lexer: &mut Self, text: &str| {
            lexer.bump();
            lexer.push_at(kind, text.to_string(), line, column);
        };

        match (byte, self.peek()) {
            (b':', b':') => two(TokenKind::ColonColon, self, "::"),
            (b'.', b'.') => two(TokenKind::DotDot, self, ".."),
            (b'-', b'>') => two(TokenKind::Arrow, self, "->"),
            (b'=', b'>') => two(TokenKind::FatArrow, self, "=>"),
            (b'=', b'=') => two(TokenKind::EqualEqual, self, "=="),
            (b'=', b'+') => two(TokenKind::Increment, self, "=+"),
            (b'=', b'-') => two(TokenKind::Decrement, self, "=-"),
            (b'!', b'=') => two(TokenKind::BangEqual, self, "!="),
            (b'<', b'=') => two(TokenKind::LessEqual, self, "<="),
            (b'>', b'=') => two(TokenKind::GreaterEqual, self, ">="),
            _ => {
                let (kind, text) = match byte {
                    b'(' => (TokenKind::LeftParen, "("),
                    b')' => (TokenKind::RightParen, ")"),
                    b'[' => (TokenKind::LeftBracket, "["),
                    b']' => (TokenKind::RightBracket, "]"),
                    b',' => (TokenKind::Comma, ","),
                    b'.' => (TokenKind::Dot, "."),
                    b':' => (TokenKind::Colon, ":"),
                    b';' => (TokenKind::Semicolon, ";"),
                    b'=' => (TokenKind::Equal, "="),
                    b'<' => (TokenKind::Less, "<"),
                    b'>' => (TokenKind::Greater, ">"),
                    b'+' => (TokenKind::Plus, "+"),
                    b'-' => (TokenKind::Minus, "-"),
                    b'*' => (TokenKind::Star, "*"),
                    b'/' => (TokenKind::Slash, "/"),
                    b'%' => (TokenKind::Percent, "%"),
                    b'!' => (TokenKind::Bang, "!"),
                    b'?' => (TokenKind::Question, "?"),
                    b'@' => (TokenKind::At, "@"),
                    other => {
                        let text = (other as char).to_string();
                        self.push_at(TokenKind::Unknown, text, line, column);
                        return;
                    }
                };
                self.push_at(kind, text.to_string(), line, column);
            }
        }
    }

    /// Scan a string chunk up to the closing quote or an unescaped `{`.
    fn string_chunk(&mut self) {
        let (line, column) = (self.line, self.column);
        let mut text = String::new();

        while self.pos < self.src.len() {
            match self.peek() {
                b'"' => {
                    self.bump();
                    self.modes.pop();
                    self.push_at(TokenKind::Str, text, line, column);
                    return;
                }
                b'{' => {
                    self.bump();
                    self.push_at(TokenKind::Str, text, line, column);
                    let (l, c) = (self.line, self.column);
                    self.push_at(TokenKind::ExprOpen, "{".to_string(), l, c);
                    self.modes.push(Mode::Interpolation { depth: 0 });
                    return;
                }
                b'\\' => {
                    self.bump();
                    let escaped = self.bump();
                    match escaped {
                        b'n' => text.push('\n'),
                        b't' => text.push('\t'),
                        b'r' => text.push('\r'),
                        b'"' => text.push('"'),
                        b'\\' => text.push('\\'),
                        b'b' => text.push('\x08'),
                        b'f' => text.push('\x0C'),
                        b'v' => text.push('\x0B'),
                        b'{' => text.push('{'),
                        b'}' => text.push('}'),
                        other => {
                            // Unrecognized escapes pass through literally.
                            text.push('\\');
                            text.push(other as char);
                        }
                    }
                }
                _ => {
                    let start = self.pos;
                    let byte = self.bump();
                    if byte < 0x80 {
                        text.push(byte as char);
                    } else {
                        // Re-slice multibyte sequences from the source.
                        let mut end = self.pos;
                        while end < self.src.len() && self.src[end] & 0xC0 == 0x80 {
                            self.bump();
                            end = self.pos;
                        }
                        text.push_str(&self.slice(start, end));
                    }
                }
            }
        }
        // Unterminated string.
        self.modes.pop();
        self.push_at(TokenKind::Str, text, line, column);
        let (l, c) = (self.line, self.column);
        self.push_at(TokenKind::Unknown, String::new(), l, c);
    }

    fn slice(&self, start: usize, end: usize) -> String {
        String::from_utf8_lossy(&self.src[start..end]).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn ends_with_eof() {
        assert_eq!(kinds(""), vec![TokenKind::Eof]);
        assert_eq!(
            kinds("let"),
            vec![TokenKind::Let, TokenKind::Eof]
        );
    }

    #[test]
    fn tracks_line_and_column() {
        let tokens = tokenize("let x\nmut y");
        assert_eq!((tokens[0].line, tokens[0].column), (1, 1));
        assert_eq!((tokens[1].line, tokens[1].column), (1, 5));
        assert_eq!(tokens[2].kind, TokenKind::NewLine);
        assert_eq!((tokens[3].line, tokens[3].column), (2, 1));
        assert_eq!((tokens[4].line, tokens[4].column), (2, 5));
    }

    #[test]
    fn keywords_and_identifiers() {
        let tokens = tokenize("let mut fn match impl trait widget");
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Let,
                TokenKind::Mut,
                TokenKind::Fn,
                TokenKind::Match,
                TokenKind::Impl,
                TokenKind::Trait,
                TokenKind::Identifier,
                TokenKind::Eof,
            ]
        );
        assert_eq!(tokens[6].text, "widget");
    }

    #[test]
    fn generic_parameter_keeps_dollar() {
        let tokens = tokenize("fn id(x: $T) $T");
        let generic = tokens.iter().find(|t| t.text == "$T").expect("generic");
        assert_eq!(generic.kind, TokenKind::Identifier);
    }

    #[test]
    fn numbers_and_ranges() {
        assert_eq!(
            kinds("1.5"),
            vec![TokenKind::Number, TokenKind::Eof]
        );
        assert_eq!(
            kinds("1..3"),
            vec![
                TokenKind::Number,
                TokenKind::DotDot,
                TokenKind::Number,
                TokenKind::Eof
            ]
        );
        assert_eq!(tokenize("1..3")[0].text, "1");
    }

    #[test]
    fn compound_operators() {
        assert_eq!(
            kinds(":: -> => == != <= >= =+ =-"),
            vec![
                TokenKind::ColonColon,
                TokenKind::Arrow,
                TokenKind::FatArrow,
                TokenKind::EqualEqual,
                TokenKind::BangEqual,
                TokenKind::LessEqual,
                TokenKind::GreaterEqual,
                TokenKind::Increment,
                TokenKind::Decrement,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn plain_string() {
        let tokens = tokenize("\"hello\"");
        assert_eq!(tokens[0].kind, TokenKind::Str);
        assert_eq!(tokens[0].text, "hello");
    }

    #[test]
    fn string_escapes() {
        let tokens = tokenize(r#""a\n\t\{b\}\q""#);
        assert_eq!(tokens[0].text, "a\n\t{b}\\q");
    }

    #[test]
    fn interpolation_produces_expr_markers() {
        let tokens = tokenize("\"sum: {a + b}!\"");
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Str,
                TokenKind::ExprOpen,
                TokenKind::Identifier,
                TokenKind::Plus,
                TokenKind::Identifier,
                TokenKind::ExprClose,
                TokenKind::Str,
                TokenKind::Eof,
            ]
        );
        assert_eq!(tokens[0].text, "sum: ");
        assert_eq!(tokens[6].text, "!");
    }

    #[test]
    fn nested_interpolation() {
        // Braces inside the interpolated expression do not close it.
        let tokens = tokenize("\"v: {list.at(0).or(\"{x}\")}\"");
        let closes = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::ExprClose)
            .count();
        assert_eq!(closes, 2);
        assert_eq!(tokens.last().map(|t| t.kind), Some(TokenKind::Eof));
    }

    #[test]
    fn module_path_only_after_use() {
        let tokens = tokenize("use ard/io\nio.print");
        assert_eq!(tokens[1].kind, TokenKind::Path);
        assert_eq!(tokens[1].text, "ard/io");
        // Not in path position: plain identifier and dot.
        assert_eq!(tokens[3].kind, TokenKind::Identifier);
        assert_eq!(tokens[4].kind, TokenKind::Dot);
    }

    #[test]
    fn path_with_dashes() {
        let tokens = tokenize("use my-lib/json-utils as ju");
        assert_eq!(tokens[1].text, "my-lib/json-utils");
        assert_eq!(tokens[2].kind, TokenKind::As);
    }

    #[test]
    fn comments_are_tokens() {
        let tokens = tokenize("// doc\nlet x = 1 /* inline */");
        assert_eq!(tokens[0].kind, TokenKind::Comment);
        assert_eq!(tokens[0].text, "// doc");
        assert!(tokens.iter().any(|t| t.kind == TokenKind::BlockComment));
    }

    #[test]
    fn unknown_bytes_become_unknown_tokens() {
        let tokens = tokenize("let # = 1");
        assert!(tokens.iter().any(|t| t.kind == TokenKind::Unknown));
        assert_eq!(tokens.last().map(|t| t.kind), Some(TokenKind::Eof));
    }

    #[test]
    fn unterminated_string_still_terminates_stream() {
        let tokens = tokenize("\"abc");
        assert_eq!(tokens[0].kind, TokenKind::Str);
        assert!(tokens.iter().any(|t| t.kind == TokenKind::Unknown));
        assert_eq!(tokens.last().map(|t| t.kind), Some(TokenKind::Eof));
    }

    #[test]
    fn lexing_is_deterministic() {
        let source = "fn f(n: Int) Int { match n { 0 => 1, _ => n } }";
        assert_eq!(tokenize(source), tokenize(source));
    }
}
