//! SQL text normalization.
//!
//! Queries that differ only in whitespace, indentation, keyword case or
//! comments normalize to the same text, so they share a cache key:
//!
//! - leading/trailing whitespace is stripped
//! - `--` and `/* */` comments are removed
//! - reserved keywords are upper-cased; identifiers keep their case
//! - the query is re-indented with 4 spaces, one clause per line
//!
//! The output is built from the token stream only, which makes the function
//! idempotent. Inputs longer than the configured maximum are returned as-is.

use std::num::NonZeroUsize;
use std::sync::LazyLock;

use lru::LruCache;
use parking_lot::Mutex;

/// Inputs longer than this (in characters) are not normalized.
pub const DEFAULT_MAX_LENGTH: usize = 40_000;

/// Number of normalized queries remembered per [`Normalizer`].
pub const DEFAULT_MEMO_CAPACITY: usize = 1024;

const INDENT_WIDTH: usize = 4;

const KEYWORDS: &[&str] = &[
    "ALL", "ALTER", "AND", "ANY", "AS", "ASC", "BETWEEN", "BY", "CASE", "CAST", "CREATE", "CROSS",
    "DELETE", "DESC", "DISTINCT", "DROP", "ELSE", "END", "ESCAPE", "EXCEPT", "EXISTS", "FALSE", "FROM", "FULL",
    "GROUP", "HAVING", "ILIKE", "IN", "INNER", "INSERT", "INTERSECT", "INTO", "IS", "JOIN", "LEFT", "LIKE", "LIMIT",
    "NATURAL", "NOT", "NULL", "OFFSET", "ON", "OR", "ORDER", "OUTER", "OVER", "PARTITION", "PERCENT", "RECURSIVE",
    "RIGHT", "SELECT", "SET", "SOME", "TABLE", "THEN", "TIES", "TOP", "TRUE", "UNION", "UPDATE", "USING", "VALUES",
    "WHEN", "WHERE", "WITH",
];

/// Keywords that start a new line at the current nesting level.
const CLAUSE_KEYWORDS: &[&str] = &[
    "SELECT", "FROM", "WHERE", "GROUP", "ORDER", "HAVING", "LIMIT", "OFFSET", "UNION", "INTERSECT", "EXCEPT", "VALUES",
    "SET", "INSERT", "UPDATE", "DELETE", "WITH", "JOIN", "INNER", "LEFT", "RIGHT", "FULL", "CROSS", "NATURAL",
];

/// A clause keyword directly after one of these stays on the same line.
const JOINED_PREFIXES: &[&str] = &["LEFT", "RIGHT", "FULL", "INNER", "CROSS", "OUTER", "NATURAL", "DELETE"];

const TWO_CHAR_OPS: &[&str] = &["<=", ">=", "<>", "!=", "==", "||", "::"];

static DEFAULT_NORMALIZER: LazyLock<Normalizer> = LazyLock::new(Normalizer::default);

/// Normalize a query with the process-wide default [`Normalizer`].
pub fn normalize_query(query: &str) -> String {
    DEFAULT_NORMALIZER.normalize(query)
}

/// Query normalizer with a bounded memo of recent results.
pub struct Normalizer {
    max_length: usize,
    memo: Mutex<LruCache<String, String>>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LENGTH, DEFAULT_MEMO_CAPACITY)
    }
}

impl std::fmt::Debug for Normalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Normalizer")
            .field("max_length", &self.max_length)
            .field("memoized", &self.memo.lock().len())
            .finish()
    }
}

impl Normalizer {
    /// Create a normalizer. A `memo_capacity` of 0 is treated as 1.
    pub fn new(max_length: usize, memo_capacity: usize) -> Self {
        let capacity = NonZeroUsize::MIN.saturating_add(memo_capacity.saturating_sub(1));
        Self { max_length, memo: Mutex::new(LruCache::new(capacity)) }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Number of memoized normalizations.
    pub fn memoized(&self) -> usize {
        self.memo.lock().len()
    }

    /// Normalize `query`, or return it unchanged if it exceeds the maximum length.
    pub fn normalize(&self, query: &str) -> String {
        let length = query.chars().count();
        if length > self.max_length {
            tracing::debug!(
                length,
                max_length = self.max_length,
                "query too long to normalize, using it as is"
            );
            return query.to_string();
        }

        if let Some(hit) = self.memo.lock().get(query) {
            return hit.clone();
        }

        let normalized = format_sql(query);
        self.memo.lock().put(query.to_string(), normalized.clone());
        normalized
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Word,
    Quoted,
    Str,
    Number,
    Punct,
    Op,
}

#[derive(Debug, Clone, Copy)]
struct Token<'a> {
    kind: TokenKind,
    text: &'a str,
}

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
}

fn is_word_start(c: char) -> bool {
    c.is_alphabetic() || matches!(c, '_' | '@' | '#')
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '$' | '@' | '#')
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn bump_while(&mut self, pred: impl Fn(char) -> bool) {
        let rest = self.rest();
        let len = rest.find(|c: char| !pred(c)).unwrap_or(rest.len());
        self.pos += len;
    }

    fn skip_past(&mut self, terminator: &str) {
        let rest = self.rest();
        self.pos += rest.find(terminator).map_or(rest.len(), |i| i + terminator.len());
    }

    /// Consume up to and including `close`; a doubled `close` is an escape.
    fn skip_delimited(&mut self, close: char) {
        loop {
            let rest = self.rest();
            let Some(i) = rest.find(close) else {
                self.pos = self.src.len();
                return;
            };
            self.pos += i + close.len_utf8();
            if !self.rest().starts_with(close) {
                return;
            }
            self.pos += close.len_utf8();
        }
    }

    fn lex_number(&mut self) {
        self.bump_while(|c| c.is_ascii_digit());
        let rest = self.rest().as_bytes();
        if rest.len() > 1 && rest[0] == b'.' && rest[1].is_ascii_digit() {
            self.pos += 1;
            self.bump_while(|c| c.is_ascii_digit());
        }
        let rest = self.rest().as_bytes();
        let exponent = match rest {
            [b'e' | b'E', d, ..] if d.is_ascii_digit() => 1,
            [b'e' | b'E', b'+' | b'-', d, ..] if d.is_ascii_digit() => 2,
            _ => 0,
        };
        if exponent > 0 {
            self.pos += exponent;
            self.bump_while(|c| c.is_ascii_digit());
        }
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Token<'a>> {
        loop {
            let rest = self.rest();
            let c = rest.chars().next()?;
            if c.is_whitespace() {
                self.bump_while(char::is_whitespace);
                continue;
            }
            if rest.starts_with("--") {
                self.skip_past("\n");
                continue;
            }
            if rest.starts_with("/*") {
                self.pos += 2;
                self.skip_past("*/");
                continue;
            }

            let start = self.pos;
            let kind = match c {
                '\'' => {
                    self.pos += 1;
                    self.skip_delimited('\'');
                    TokenKind::Str
                }
                '"' | '`' => {
                    self.pos += 1;
                    self.skip_delimited(c);
                    TokenKind::Quoted
                }
                '[' => {
                    self.pos += 1;
                    self.skip_delimited(']');
                    TokenKind::Quoted
                }
                '(' | ')' | ',' | ';' | '.' => {
                    self.pos += 1;
                    TokenKind::Punct
                }
                c if c.is_ascii_digit() => {
                    self.lex_number();
                    TokenKind::Number
                }
                c if is_word_start(c) => {
                    self.bump_while(is_word_char);
                    TokenKind::Word
                }
                c => {
                    let len = TWO_CHAR_OPS.iter().find(|op| rest.starts_with(**op)).map_or(c.len_utf8(), |op| op.len());
                    self.pos += len;
                    TokenKind::Op
                }
            };
            return Some(Token { kind, text: &self.src[start..self.pos] });
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Clause {
    None,
    List,
    Condition,
    Other,
}

/// Layout state of the root statement or one parenthesised group.
#[derive(Debug)]
struct Frame {
    /// Only the root and sub-selects get line breaks.
    layout: bool,
    indent: usize,
    clause: Clause,
    in_between: bool,
}

impl Frame {
    fn new(layout: bool, indent: usize) -> Self {
        Self { layout, indent, clause: Clause::None, in_between: false }
    }
}

enum Separator {
    None,
    Space,
    Newline(usize),
}

fn keyword_of(tokens: &[Token<'_>], i: usize) -> Option<&'static str> {
    let token = tokens[i];
    if token.kind != TokenKind::Word {
        return None;
    }
    let is_dot = |t: Option<&Token<'_>>| t.is_some_and(|t| t.text == ".");
    if is_dot(i.checked_sub(1).map(|j| &tokens[j])) || is_dot(tokens.get(i + 1)) {
        return None;
    }
    let keyword = KEYWORDS.iter().copied().find(|k| k.eq_ignore_ascii_case(token.text))?;
    // LEFT(...) and RIGHT(...) are string functions, not joins.
    if matches!(keyword, "LEFT" | "RIGHT") && tokens.get(i + 1).is_some_and(|t| t.text == "(") {
        return None;
    }
    Some(keyword)
}

fn glued(prev: Token<'_>, prev_keyword: bool, next: Token<'_>) -> bool {
    if next.kind == TokenKind::Punct && matches!(next.text, "," | ")" | ";") {
        return true;
    }
    if prev.kind != TokenKind::Punct && next.kind != TokenKind::Punct {
        return false;
    }
    match (prev.text, next.text) {
        ("(", _) => true,
        (".", _) => next.kind != TokenKind::Number,
        (_, ".") => matches!(prev.kind, TokenKind::Word | TokenKind::Quoted) || prev.text == ")",
        (_, "(") => matches!(prev.kind, TokenKind::Word | TokenKind::Quoted) && !prev_keyword,
        _ => false,
    }
}

fn format_sql(query: &str) -> String {
    let tokens: Vec<Token<'_>> = Lexer::new(query.trim()).collect();
    let keywords: Vec<Option<&'static str>> = (0..tokens.len()).map(|i| keyword_of(&tokens, i)).collect();

    let mut out = String::with_capacity(query.len());
    let mut frames = vec![Frame::new(true, 0)];
    let mut line_indent = 0;
    let mut pending_break: Option<usize> = None;

    for (i, token) in tokens.iter().enumerate() {
        let keyword = keywords[i];
        let prev = i.checked_sub(1).map(|j| (tokens[j], keywords[j]));
        let Some(frame) = frames.last_mut() else { break };

        let separator = match (prev, pending_break.take()) {
            (None, _) => Separator::None,
            (Some(_), Some(level)) => Separator::Newline(level),
            (Some((prev, prev_keyword)), None) => {
                let after_open = prev.kind == TokenKind::Punct && prev.text == "(";
                let joined = prev_keyword.is_some_and(|k| JOINED_PREFIXES.contains(&k));
                match keyword {
                    Some(k) if frame.layout && CLAUSE_KEYWORDS.contains(&k) && !after_open && !joined => {
                        Separator::Newline(frame.indent)
                    }
                    Some("AND") if frame.in_between => {
                        frame.in_between = false;
                        Separator::Space
                    }
                    Some("AND" | "OR") if frame.layout && frame.clause == Clause::Condition => {
                        Separator::Newline(frame.indent + 1)
                    }
                    _ if glued(prev, prev_keyword.is_some(), *token) => Separator::None,
                    _ => Separator::Space,
                }
            }
        };

        match separator {
            Separator::None => {}
            Separator::Space => out.push(' '),
            Separator::Newline(level) => {
                out.push('\n');
                out.extend(std::iter::repeat_n(' ', level * INDENT_WIDTH));
                line_indent = level;
            }
        }
        out.push_str(keyword.unwrap_or(token.text));

        match keyword {
            Some("SELECT" | "GROUP" | "ORDER") => frame.clause = Clause::List,
            Some("WHERE" | "HAVING" | "ON") => frame.clause = Clause::Condition,
            Some("BETWEEN") => frame.in_between = true,
            Some(k) if CLAUSE_KEYWORDS.contains(&k) => frame.clause = Clause::Other,
            _ => {}
        }

        let list_item_end = frame.layout && frame.clause == Clause::List;
        let item_indent = frame.indent + 1;
        if token.kind == TokenKind::Punct {
            match token.text {
                "," if list_item_end => pending_break = Some(item_indent),
                "(" => {
                    let subquery = keywords.get(i + 1).copied().flatten() == Some("SELECT");
                    frames.push(Frame::new(subquery, line_indent + 1));
                }
                ")" if frames.len() > 1 => {
                    frames.pop();
                }
                _ => {}
            }
        }
    }

    out
}
