//! Lease file tokenizer.
//!
//! Splits `dhcpd.leases` text into a flat token stream. The lexer knows
//! nothing about clauses: addresses, dates, and times all come out as
//! [`TokenKind::Word`] and are validated by the grammar. It never fails;
//! an unterminated string becomes a [`TokenKind::UnterminatedString`]
//! token that the grammar reports only if it shows up inside a lease block.

/// Byte range of a token or lease block in the source text.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Span {
    /// Start byte offset (inclusive).
    pub start: usize,
    /// End byte offset (exclusive).
    pub end: usize,
}

impl Span {
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    /// `{`
    LeftBrace,
    /// `}`
    RightBrace,
    /// `;`
    Semicolon,
    /// `"..."`, span includes both quotes.
    QuotedString,
    /// `"...` running to the end of input.
    UnterminatedString,
    /// Any other run of non-whitespace, non-punctuation bytes.
    Word,
    /// End of input.
    Eof,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    /// Returns the source text covered by this token.
    pub fn text<'src>(&self, source: &'src str) -> &'src str {
        &source[self.span.start..self.span.end]
    }
}

pub struct Lexer<'src> {
    source: &'src [u8],
    pos: usize,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        Self {
            source: source.as_bytes(),
            pos: 0,
        }
    }

    /// Tokenize the entire source. The last token is always [`TokenKind::Eof`].
    pub fn tokenize(mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        tokens
    }

    pub fn next_token(&mut self) -> Token {
        self.skip_trivia();

        let start = self.pos;
        let Some(byte) = self.advance() else {
            return self.token(TokenKind::Eof, start);
        };

        match byte {
            b'{' => self.token(TokenKind::LeftBrace, start),
            b'}' => self.token(TokenKind::RightBrace, start),
            b';' => self.token(TokenKind::Semicolon, start),
            b'"' => self.quoted_string(start),
            _ => {
                while let Some(next) = self.peek() {
                    if is_delimiter(next) {
                        break;
                    }
                    self.pos += 1;
                }
                self.token(TokenKind::Word, start)
            }
        }
    }

    fn peek(&self) -> Option<u8> {
        self.source.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let byte = self.peek();
        if byte.is_some() {
            self.pos += 1;
        }
        byte
    }

    /// Skip whitespace and `#` comments.
    fn skip_trivia(&mut self) {
        while let Some(byte) = self.peek() {
            if byte.is_ascii_whitespace() {
                self.pos += 1;
            } else if byte == b'#' {
                while let Some(next) = self.advance() {
                    if next == b'\n' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    fn quoted_string(&mut self, start: usize) -> Token {
        while let Some(byte) = self.advance() {
            match byte {
                b'\\' => {
                    self.advance();
                }
                b'"' => return self.token(TokenKind::QuotedString, start),
                _ => {}
            }
        }
        self.token(TokenKind::UnterminatedString, start)
    }

    fn token(&self, kind: TokenKind, start: usize) -> Token {
        Token {
            kind,
            span: Span::new(start, self.pos),
        }
    }
}

fn is_delimiter(byte: u8) -> bool {
    byte.is_ascii_whitespace() || matches!(byte, b'{' | b'}' | b';' | b'"' | b'#')
}

/// Converts a byte offset into a 1-based (line, column) pair.
pub fn line_column(source: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(source.len());
    let before = &source.as_bytes()[..offset];
    let line = before.iter().filter(|&&byte| byte == b'\n').count() + 1;
    let line_start = before
        .iter()
        .rposition(|&byte| byte == b'\n')
        .map_or(0, |index| index + 1);
    (line, offset - line_start + 1)
}
