//! Lease file grammar.
//!
//! Recursive-descent parser over the [`lexer`](crate::lexer) token stream.
//! The parser scans the whole file for `lease <ip> { ... }` blocks and turns
//! each into a [`LeaseRecord`]. Text outside lease blocks is skipped, so
//! headers, comments, `server-duid`, and `failover peer` state blocks are
//! tolerated without being understood.
//!
//! # Grammar
//!
//! ```text
//! lease     = "lease" ip "{" { clause } "}"
//! clause    = ( "starts" | "tstp" | "tsfp" ) date-ref ";"
//!           | "ends" ( date-ref | "never" ) ";"
//!           | "hardware" type mac ";"
//!           | "uid" quoted-string ";"
//!           | "binding" word word ";"
//!           | other-word { token | block } ";"
//! date-ref  = weekday date time | "epoch" seconds
//! weekday   = "0" .. "6"
//! date      = (YYYY | YY) "/" MM "/" DD     (YY and year 0 fail to convert)
//! time      = HH ":" MM ":" SS
//! ip        = digits "." digits "." digits "." digits
//! mac       = hex2 ":" hex2 ":" hex2 ":" hex2 ":" hex2 ":" hex2
//! ```
//!
//! Once a `lease` keyword is seen at top level the parser commits to it:
//! any violation inside the block aborts the whole parse with
//! [`Error::Parse`]. Clauses may appear in any order; when one repeats, the
//! last occurrence wins. Unknown clauses are skipped up to their `;`.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use tracing::debug;

use crate::error::{Error, Result};
use crate::lease::{Binding, DateRef, EndsAt, Hardware, LeaseMatch, LeaseRecord};
use crate::lexer::{Lexer, Span, Token, TokenKind, line_column};

/// Parses every lease block in `text`, in file order.
///
/// # Errors
///
/// Returns [`Error::Parse`] if a lease block is malformed. Text outside
/// lease blocks never causes an error.
pub fn parse(text: &str) -> Result<Vec<LeaseMatch>> {
    let leases = Parser::new(text).parse_leases()?;
    debug!("Parsed {} lease block(s)", leases.len());
    Ok(leases)
}

struct Parser<'src> {
    source: &'src str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'src> Parser<'src> {
    fn new(source: &'src str) -> Self {
        Self {
            source,
            tokens: Lexer::new(source).tokenize(),
            pos: 0,
        }
    }

    fn parse_leases(mut self) -> Result<Vec<LeaseMatch>> {
        let mut leases = Vec::new();

        loop {
            let token = self.peek();
            match token.kind {
                TokenKind::Eof => break,
                TokenKind::Word if self.text(token) == "lease" => {
                    self.advance();
                    leases.push(self.lease_block(token.span.start)?);
                }
                TokenKind::LeftBrace => self.skip_top_level_block(),
                _ => {
                    self.advance();
                }
            }
        }

        Ok(leases)
    }

    fn peek(&self) -> Token {
        self.tokens[self.pos]
    }

    /// Returns the current token and moves past it. Never moves past `Eof`.
    fn advance(&mut self) -> Token {
        let token = self.peek();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn text(&self, token: Token) -> &'src str {
        token.text(self.source)
    }

    fn error(&self, span: Span, message: impl Into<String>) -> Error {
        let (line, column) = line_column(self.source, span.start);
        Error::Parse {
            line,
            column,
            message: message.into(),
        }
    }

    fn unexpected(&self, token: Token, expected: &str) -> Error {
        match token.kind {
            TokenKind::Eof => self.error(
                token.span,
                format!("unexpected end of input, expected {}", expected),
            ),
            TokenKind::UnterminatedString => self.error(token.span, "unterminated string"),
            _ => self.error(
                token.span,
                format!("expected {}, found `{}`", expected, self.text(token)),
            ),
        }
    }

    fn expect_word(&mut self, expected: &str) -> Result<(Token, &'src str)> {
        let token = self.advance();
        if token.kind == TokenKind::Word {
            Ok((token, self.text(token)))
        } else {
            Err(self.unexpected(token, expected))
        }
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> Result<Token> {
        let token = self.advance();
        if token.kind == kind {
            Ok(token)
        } else {
            Err(self.unexpected(token, expected))
        }
    }

    fn end_clause(&mut self, keyword: &str) -> Result<()> {
        self.expect(
            TokenKind::Semicolon,
            &format!("`;` to end `{}` clause", keyword),
        )?;
        Ok(())
    }

    /// Skips a brace-delimited block outside any lease. An unclosed block
    /// swallows the rest of the input.
    fn skip_top_level_block(&mut self) {
        let mut depth = 0usize;
        loop {
            let token = self.advance();
            match token.kind {
                TokenKind::LeftBrace => depth += 1,
                TokenKind::RightBrace => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return;
                    }
                }
                TokenKind::Eof => return,
                _ => {}
            }
        }
    }

    fn lease_block(&mut self, start: usize) -> Result<LeaseMatch> {
        let (ip_token, ip_address) = self.expect_word("IP address after `lease`")?;
        if !is_ip_literal(ip_address) {
            return Err(self.error(
                ip_token.span,
                format!("malformed IP address `{}`", ip_address),
            ));
        }
        self.expect(TokenKind::LeftBrace, "`{` to open lease block")?;

        let mut record = LeaseRecord::new(ip_address);

        loop {
            let token = self.peek();
            match token.kind {
                TokenKind::RightBrace => {
                    self.advance();
                    let span = Span::new(start, token.span.end);
                    return Ok(LeaseMatch { record, span });
                }
                TokenKind::Semicolon => {
                    self.advance();
                }
                TokenKind::Word => {
                    self.advance();
                    let keyword = self.text(token);
                    self.clause(&mut record, keyword)?;
                }
                TokenKind::LeftBrace | TokenKind::QuotedString => self.skip_clause()?,
                TokenKind::Eof | TokenKind::UnterminatedString => {
                    return Err(self.unexpected(token, "`}` to close lease block"));
                }
            }
        }
    }

    fn clause(&mut self, record: &mut LeaseRecord, keyword: &str) -> Result<()> {
        match keyword {
            "starts" => record.starts = Some(self.date_ref(keyword)?),
            "tstp" => record.tstp = Some(self.date_ref(keyword)?),
            "tsfp" => record.tsfp = Some(self.date_ref(keyword)?),
            "ends" => record.ends = Some(self.ends()?),
            "hardware" => record.hardware = Some(self.hardware()?),
            "uid" => record.uid = Some(self.uid()?),
            "binding" => record.binding = Some(self.binding()?),
            _ => return self.skip_clause(),
        }
        self.end_clause(keyword)
    }

    /// Skips an unrecognized clause through its terminating `;`, or through
    /// the closing brace of a nested block such as `on expiry { ... }`.
    fn skip_clause(&mut self) -> Result<()> {
        let mut depth = 0usize;
        loop {
            let token = self.peek();
            match token.kind {
                TokenKind::Semicolon if depth == 0 => {
                    self.advance();
                    return Ok(());
                }
                TokenKind::LeftBrace => depth += 1,
                TokenKind::RightBrace if depth == 0 => {
                    return Err(self.unexpected(token, "`;` to end clause"));
                }
                TokenKind::RightBrace => {
                    depth -= 1;
                    if depth == 0 {
                        self.advance();
                        return Ok(());
                    }
                }
                TokenKind::Eof | TokenKind::UnterminatedString => {
                    return Err(self.unexpected(token, "`;` to end clause"));
                }
                _ => {}
            }
            self.advance();
        }
    }

    fn date_ref(&mut self, keyword: &str) -> Result<DateRef> {
        let (first_token, first) = self.expect_word(&format!("timestamp after `{}`", keyword))?;

        if first == "epoch" {
            let (seconds_token, seconds) = self.expect_word("seconds after `epoch`")?;
            let datetime = parse_epoch(seconds)
                .ok_or_else(|| self.error(seconds_token.span, format!("invalid epoch `{}`", seconds)))?;
            return Ok(DateRef {
                weekday: None,
                datetime,
            });
        }

        let weekday = parse_weekday(first).ok_or_else(|| {
            self.error(first_token.span, format!("invalid weekday digit `{}`", first))
        })?;
        let (date_token, date) = self.expect_word("date")?;
        let (time_token, time) = self.expect_word("time")?;
        let datetime = parse_datetime(date, time).map_err(|message| {
            self.error(Span::new(date_token.span.start, time_token.span.end), message)
        })?;

        Ok(DateRef {
            weekday: Some(weekday),
            datetime,
        })
    }

    fn ends(&mut self) -> Result<EndsAt> {
        let token = self.peek();
        if token.kind == TokenKind::Word && self.text(token) == "never" {
            self.advance();
            return Ok(EndsAt::Never);
        }
        Ok(EndsAt::At(self.date_ref("ends")?))
    }

    fn hardware(&mut self) -> Result<Hardware> {
        let (type_token, hardware_type) = self.expect_word("hardware type")?;
        if !is_hardware_type(hardware_type) {
            return Err(self.error(
                type_token.span,
                format!("invalid hardware type `{}`", hardware_type),
            ));
        }

        let (mac_token, mac) = self.expect_word("MAC address")?;
        if !is_mac_literal(mac) {
            return Err(self.error(mac_token.span, format!("malformed MAC address `{}`", mac)));
        }

        Ok(Hardware {
            hardware_type: hardware_type.to_string(),
            mac: mac.to_ascii_lowercase(),
        })
    }

    fn uid(&mut self) -> Result<String> {
        let token = self.expect(TokenKind::QuotedString, "quoted string after `uid`")?;
        let quoted = self.text(token);
        Ok(quoted[1..quoted.len() - 1].to_string())
    }

    fn binding(&mut self) -> Result<Binding> {
        let mut words = [String::new(), String::new()];
        for word in &mut words {
            let (token, text) = self.expect_word("binding token")?;
            if text.is_empty() || !text.bytes().all(|byte| byte.is_ascii_alphanumeric()) {
                return Err(self.error(token.span, format!("invalid binding token `{}`", text)));
            }
            *word = text.to_string();
        }
        let [name, value] = words;
        Ok(Binding { name, value })
    }
}

fn all_digits(text: &str) -> bool {
    !text.is_empty() && text.bytes().all(|byte| byte.is_ascii_digit())
}

/// Four `.`-joined groups of one or more digits. Octet ranges are not checked.
fn is_ip_literal(text: &str) -> bool {
    let groups: Vec<&str> = text.split('.').collect();
    groups.len() == 4 && groups.iter().all(|group| all_digits(group))
}

/// Six `:`-joined groups of exactly two hex digits, either case.
fn is_mac_literal(text: &str) -> bool {
    let groups: Vec<&str> = text.split(':').collect();
    groups.len() == 6
        && groups
            .iter()
            .all(|group| group.len() == 2 && group.bytes().all(|byte| byte.is_ascii_hexdigit()))
}

fn is_hardware_type(text: &str) -> bool {
    !text.is_empty() && text.bytes().all(|byte| byte.is_ascii_alphanumeric())
}

fn parse_weekday(text: &str) -> Option<u8> {
    match text.as_bytes() {
        [digit @ b'0'..=b'6'] => Some(digit - b'0'),
        _ => None,
    }
}

fn parse_epoch(text: &str) -> Option<DateTime<Utc>> {
    if !all_digits(text) {
        return None;
    }
    DateTime::<Utc>::from_timestamp(text.parse().ok()?, 0)
}

const YEAR_WIDTHS: &[usize] = &[2, 4];
const TWO_DIGITS: &[usize] = &[2];

/// Splits `text` on `separator` into fixed-width numeric fields.
fn numeric_fields<const N: usize>(
    text: &str,
    separator: char,
    widths: [&[usize]; N],
) -> Option<[u32; N]> {
    let parts: Vec<&str> = text.split(separator).collect();
    if parts.len() != N {
        return None;
    }
    let mut fields = [0u32; N];
    for ((field, part), allowed) in fields.iter_mut().zip(&parts).zip(widths) {
        if !all_digits(part) || !allowed.contains(&part.len()) {
            return None;
        }
        *field = part.parse().ok()?;
    }
    Some(fields)
}

/// Interprets `date time` as `%Y/%m/%d %H:%M:%S` in UTC.
///
/// `YY/MM/DD` is lexically a date but does not convert: the year must have
/// four digits and be at least 1.
fn parse_datetime(date: &str, time: &str) -> std::result::Result<DateTime<Utc>, String> {
    let [year, month, day] = numeric_fields(date, '/', [YEAR_WIDTHS, TWO_DIGITS, TWO_DIGITS])
        .ok_or_else(|| format!("malformed date `{}`, expected YYYY/MM/DD", date))?;
    if date.find('/') != Some(4) || year == 0 {
        return Err(format!("invalid year in `{}`, expected YYYY/MM/DD", date));
    }
    let [hour, minute, second] = numeric_fields(time, ':', [TWO_DIGITS, TWO_DIGITS, TWO_DIGITS])
        .ok_or_else(|| format!("malformed time `{}`, expected HH:MM:SS", time))?;

    let date_value = NaiveDate::from_ymd_opt(year as i32, month, day)
        .ok_or_else(|| format!("invalid calendar date `{}`", date))?;
    let time_value = NaiveTime::from_hms_opt(hour, minute, second)
        .ok_or_else(|| format!("invalid time of day `{}`", time))?;

    Ok(date_value.and_time(time_value).and_utc())
}
