//! Data-only reader and writer for PHP array config files.
//!
//! Magento stores `app/etc/config.php` as `<?php return [...];`. This module
//! parses that literal without evaluating any code: only arrays (`[]` and
//! `array()`), quoted strings, numbers, `true`/`false`/`null` and the float
//! constants `INF`/`NAN` are accepted. Anything else is a parse error.

use std::fmt::Write as _;
use thiserror::Error;

use crate::tree::{ConfigTree, ConfigValue, Scalar};

/// Parse failure with a 1-based source position
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line}, column {column}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

type ParseResult<T> = std::result::Result<T, ParseError>;

/// Array key after PHP's integer-string normalization
#[derive(Debug, Clone, PartialEq)]
enum Key {
    Int(i64),
    Str(String),
}

impl Key {
    fn from_string(s: String) -> Self {
        match canonical_int(&s) {
            Some(i) => Key::Int(i),
            None => Key::Str(s),
        }
    }

    fn into_string(self) -> String {
        match self {
            Key::Int(i) => i.to_string(),
            Key::Str(s) => s,
        }
    }
}

/// "12" and "-3" normalize to integers, "012", "+1" and "1.0" do not
fn canonical_int(s: &str) -> Option<i64> {
    let digits = s.strip_prefix('-').unwrap_or(s);
    if digits.is_empty()
        || !digits.bytes().all(|b| b.is_ascii_digit())
        || (digits.len() > 1 && digits.starts_with('0'))
        || s == "-0"
    {
        return None;
    }
    s.parse().ok()
}

/// Parse a `<?php return [...];` document into a tree
pub fn parse(src: &str) -> ParseResult<ConfigTree> {
    let mut parser = Parser::new(src);
    parser.skip_ws()?;
    parser.expect_literal("<?php")?;
    parser.skip_ws()?;
    if parser.peek_keyword("declare") {
        parser.skip_declare()?;
        parser.skip_ws()?;
    }
    if !parser.eat_keyword("return") {
        return Err(parser.error("expected `return`"));
    }
    parser.skip_ws()?;
    let value = parser.parse_value()?;
    parser.skip_ws()?;
    parser.expect_literal(";")?;
    parser.skip_ws()?;
    if parser.eat_literal("?>") {
        parser.skip_ws()?;
    }
    if !parser.at_end() {
        return Err(parser.error("unexpected content after return statement"));
    }

    match value {
        ConfigValue::Node(tree) => Ok(tree),
        ConfigValue::List(items) => Ok(items
            .into_iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v))
            .collect()),
        ConfigValue::Leaf(_) => Err(ParseError {
            line: 1,
            column: 1,
            message: "config file must return an array".to_string(),
        }),
    }
}

struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            bytes: src.as_bytes(),
            pos: 0,
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        let consumed = &self.bytes[..self.pos.min(self.bytes.len())];
        let line = consumed.iter().filter(|&&b| b == b'\n').count() + 1;
        let column = consumed.iter().rev().take_while(|&&b| b != b'\n').count() + 1;
        ParseError {
            line,
            column,
            message: message.into(),
        }
    }

    #[inline]
    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    #[inline]
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    #[inline]
    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn starts_with(&self, lit: &str) -> bool {
        self.bytes[self.pos..].starts_with(lit.as_bytes())
    }

    fn eat_literal(&mut self, lit: &str) -> bool {
        if self.starts_with(lit) {
            self.pos += lit.len();
            true
        } else {
            false
        }
    }

    fn expect_literal(&mut self, lit: &str) -> ParseResult<()> {
        if self.eat_literal(lit) {
            Ok(())
        } else {
            Err(self.error(format!("expected `{}`", lit)))
        }
    }

    /// Case-insensitive keyword followed by a non-identifier byte
    fn peek_keyword(&self, word: &str) -> bool {
        let end = self.pos + word.len();
        end <= self.bytes.len()
            && self.bytes[self.pos..end].eq_ignore_ascii_case(word.as_bytes())
            && !self.bytes.get(end).is_some_and(|&b| is_ident_byte(b))
    }

    fn eat_keyword(&mut self, word: &str) -> bool {
        if self.peek_keyword(word) {
            self.pos += word.len();
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) -> ParseResult<()> {
        loop {
            match self.peek() {
                Some(b) if b.is_ascii_whitespace() => self.pos += 1,
                Some(b'#') => self.skip_line(),
                Some(b'/') if self.peek_at(1) == Some(b'/') => self.skip_line(),
                Some(b'/') if self.peek_at(1) == Some(b'*') => {
                    let start = self.pos;
                    self.pos += 2;
                    loop {
                        if self.at_end() {
                            self.pos = start;
                            return Err(self.error("unterminated comment"));
                        }
                        if self.eat_literal("*/") {
                            break;
                        }
                        self.pos += 1;
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn skip_line(&mut self) {
        while let Some(b) = self.peek() {
            if b == b'\n' {
                break;
            }
            self.pos += 1;
        }
    }

    /// `declare(strict_types=1);` carries no data
    fn skip_declare(&mut self) -> ParseResult<()> {
        self.eat_keyword("declare");
        self.skip_ws()?;
        self.expect_literal("(")?;
        while let Some(b) = self.peek() {
            self.pos += 1;
            if b == b')' {
                self.skip_ws()?;
                return self.expect_literal(";");
            }
        }
        Err(self.error("unterminated declare"))
    }

    fn parse_value(&mut self) -> ParseResult<ConfigValue> {
        match self.peek() {
            Some(b'[') => {
                self.pos += 1;
                self.parse_array_items(b']')
            }
            Some(b'\'') | Some(b'"') => Ok(ConfigValue::Leaf(Scalar::String(self.parse_string_expr()?))),
            Some(b) if b == b'-' || b == b'+' || b == b'.' || b.is_ascii_digit() => {
                Ok(ConfigValue::Leaf(self.parse_number()?))
            }
            Some(b) if is_ident_byte(b) => self.parse_word(),
            Some(_) => Err(self.error("unexpected character")),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn parse_word(&mut self) -> ParseResult<ConfigValue> {
        if self.eat_keyword("array") {
            self.skip_ws()?;
            self.expect_literal("(")?;
            return self.parse_array_items(b')');
        }
        let scalar = if self.eat_keyword("true") {
            Scalar::Bool(true)
        } else if self.eat_keyword("false") {
            Scalar::Bool(false)
        } else if self.eat_keyword("null") {
            Scalar::Null
        } else if self.eat_keyword("INF") {
            Scalar::Float(f64::INFINITY)
        } else if self.eat_keyword("NAN") {
            Scalar::Float(f64::NAN)
        } else {
            return Err(self.error("unsupported expression (only literal data is allowed)"));
        };
        Ok(ConfigValue::Leaf(scalar))
    }

    fn parse_array_items(&mut self, close: u8) -> ParseResult<ConfigValue> {
        let mut entries: Vec<(Key, ConfigValue)> = Vec::new();
        let mut next_index: i64 = 0;

        loop {
            self.skip_ws()?;
            if self.peek() == Some(close) {
                self.pos += 1;
                break;
            }

            let first = self.parse_value()?;
            self.skip_ws()?;
            let (key, value) = if self.eat_literal("=>") {
                self.skip_ws()?;
                let key = self.value_to_key(first)?;
                (key, self.parse_value()?)
            } else {
                (Key::Int(next_index), first)
            };
            if let Key::Int(i) = key {
                next_index = next_index.max(i.saturating_add(1));
            }
            match entries.iter_mut().find(|(k, _)| *k == key) {
                Some(slot) => slot.1 = value,
                None => entries.push((key, value)),
            }

            self.skip_ws()?;
            if self.eat_literal(",") {
                continue;
            }
            if self.peek() == Some(close) {
                self.pos += 1;
                break;
            }
            return Err(self.error(format!("expected `,` or `{}`", close as char)));
        }

        Ok(build_container(entries))
    }

    fn value_to_key(&self, value: ConfigValue) -> ParseResult<Key> {
        match value {
            ConfigValue::Leaf(Scalar::String(s)) => Ok(Key::from_string(s)),
            ConfigValue::Leaf(Scalar::Int(i)) => Ok(Key::Int(i)),
            ConfigValue::Leaf(Scalar::Bool(b)) => Ok(Key::Int(i64::from(b))),
            ConfigValue::Leaf(Scalar::Null) => Ok(Key::Str(String::new())),
            _ => Err(self.error("array key must be a string or integer")),
        }
    }

    /// One string literal or several joined with `.`, as `var_export`
    /// writes strings containing NUL bytes
    fn parse_string_expr(&mut self) -> ParseResult<String> {
        let mut out = self.parse_string_literal()?;
        loop {
            let before = self.pos;
            self.skip_ws()?;
            if self.peek() != Some(b'.') {
                self.pos = before;
                return Ok(out);
            }
            self.pos += 1;
            self.skip_ws()?;
            match self.peek() {
                Some(b'\'') | Some(b'"') => out.push_str(&self.parse_string_literal()?),
                _ => return Err(self.error("only string literals can be concatenated")),
            }
        }
    }

    fn parse_string_literal(&mut self) -> ParseResult<String> {
        match self.peek() {
            Some(b'\'') => self.parse_single_quoted(),
            _ => self.parse_double_quoted(),
        }
    }

    fn parse_single_quoted(&mut self) -> ParseResult<String> {
        let start = self.pos;
        self.pos += 1;
        let mut out = Vec::new();
        loop {
            match self.peek() {
                None => {
                    self.pos = start;
                    return Err(self.error("unterminated string"));
                }
                Some(b'\'') => {
                    self.pos += 1;
                    break;
                }
                Some(b'\\') if matches!(self.peek_at(1), Some(b'\\') | Some(b'\'')) => {
                    out.push(self.bytes[self.pos + 1]);
                    self.pos += 2;
                }
                Some(b) => {
                    out.push(b);
                    self.pos += 1;
                }
            }
        }
        self.utf8(out)
    }

    fn parse_double_quoted(&mut self) -> ParseResult<String> {
        let start = self.pos;
        self.pos += 1;
        let mut out = Vec::new();
        loop {
            match self.peek() {
                None => {
                    self.pos = start;
                    return Err(self.error("unterminated string"));
                }
                Some(b'"') => {
                    self.pos += 1;
                    break;
                }
                Some(b'$') if self.peek_at(1).is_some_and(|b| b == b'{' || is_ident_start(b)) => {
                    return Err(self.error("string interpolation is not supported"));
                }
                Some(b'\\') => {
                    let escaped = match self.peek_at(1) {
                        Some(b'n') => Some(b'\n'),
                        Some(b't') => Some(b'\t'),
                        Some(b'r') => Some(b'\r'),
                        Some(b'v') => Some(0x0b),
                        Some(b'e') => Some(0x1b),
                        Some(b'f') => Some(0x0c),
                        Some(b'0') => Some(0),
                        Some(b'\\') => Some(b'\\'),
                        Some(b'"') => Some(b'"'),
                        Some(b'$') => Some(b'$'),
                        _ => None,
                    };
                    match escaped {
                        Some(b) => {
                            out.push(b);
                            self.pos += 2;
                        }
                        None => {
                            out.push(b'\\');
                            self.pos += 1;
                        }
                    }
                }
                Some(b) => {
                    out.push(b);
                    self.pos += 1;
                }
            }
        }
        self.utf8(out)
    }

    fn utf8(&self, bytes: Vec<u8>) -> ParseResult<String> {
        String::from_utf8(bytes).map_err(|_| self.error("invalid UTF-8 in string"))
    }

    fn parse_number(&mut self) -> ParseResult<Scalar> {
        let start = self.pos;
        if matches!(self.peek(), Some(b'-') | Some(b'+')) {
            self.pos += 1;
            // -INF
            if self.eat_keyword("INF") {
                let negative = self.bytes[start] == b'-';
                return Ok(Scalar::Float(if negative {
                    f64::NEG_INFINITY
                } else {
                    f64::INFINITY
                }));
            }
        }
        let mut is_float = false;
        while let Some(b) = self.peek() {
            match b {
                b'0'..=b'9' => self.pos += 1,
                b'.' => {
                    is_float = true;
                    self.pos += 1;
                }
                b'e' | b'E' => {
                    is_float = true;
                    self.pos += 1;
                    if matches!(self.peek(), Some(b'-') | Some(b'+')) {
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }
        let text = std::str::from_utf8(&self.bytes[start..self.pos])
            .map_err(|_| self.error("invalid number"))?;
        if !is_float {
            if let Ok(i) = text.parse::<i64>() {
                return Ok(Scalar::Int(i));
            }
        }
        text.parse::<f64>()
            .map(Scalar::Float)
            .map_err(|_| self.error(format!("invalid number `{}`", text)))
    }
}

#[inline]
fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

#[inline]
fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Sequential integer keys from zero become a list, anything else a node
fn build_container(entries: Vec<(Key, ConfigValue)>) -> ConfigValue {
    let sequential = entries
        .iter()
        .enumerate()
        .all(|(i, (k, _))| *k == Key::Int(i as i64));
    if sequential {
        ConfigValue::List(entries.into_iter().map(|(_, v)| v).collect())
    } else {
        ConfigValue::Node(
            entries
                .into_iter()
                .map(|(k, v)| (k.into_string(), v))
                .collect(),
        )
    }
}

/// Render a tree as a `<?php return [...];` document
pub fn render(tree: &ConfigTree) -> String {
    let mut out = String::from("<?php\nreturn ");
    render_tree(tree, 0, &mut out);
    out.push_str(";\n");
    out
}

const INDENT: &str = "    ";

fn render_tree(tree: &ConfigTree, depth: usize, out: &mut String) {
    if tree.is_empty() {
        out.push_str("[]");
        return;
    }
    out.push_str("[\n");
    for (key, value) in tree.iter() {
        push_indent(depth + 1, out);
        push_quoted(key, out);
        out.push_str(" => ");
        render_value(value, depth + 1, out);
        out.push_str(",\n");
    }
    push_indent(depth, out);
    out.push(']');
}

fn render_value(value: &ConfigValue, depth: usize, out: &mut String) {
    match value {
        ConfigValue::Node(tree) => render_tree(tree, depth, out),
        ConfigValue::List(items) if items.is_empty() => out.push_str("[]"),
        ConfigValue::List(items) => {
            out.push_str("[\n");
            for item in items {
                push_indent(depth + 1, out);
                render_value(item, depth + 1, out);
                out.push_str(",\n");
            }
            push_indent(depth, out);
            out.push(']');
        }
        ConfigValue::Leaf(scalar) => render_scalar(scalar, out),
    }
}

fn render_scalar(scalar: &Scalar, out: &mut String) {
    match scalar {
        Scalar::Bool(true) => out.push_str("true"),
        Scalar::Bool(false) => out.push_str("false"),
        Scalar::Null => out.push_str("null"),
        Scalar::Int(i) => {
            let _ = write!(out, "{}", i);
        }
        Scalar::Float(x) if x.is_nan() => out.push_str("NAN"),
        Scalar::Float(x) if x.is_infinite() => {
            out.push_str(if *x > 0.0 { "INF" } else { "-INF" })
        }
        Scalar::Float(x) => {
            let _ = write!(out, "{:?}", x);
        }
        Scalar::String(s) => push_quoted(s, out),
    }
}

fn push_quoted(s: &str, out: &mut String) {
    out.push('\'');
    for c in s.chars() {
        if c == '\\' || c == '\'' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('\'');
}

#[inline]
fn push_indent(depth: usize, out: &mut String) {
    for _ in 0..depth {
        out.push_str(INDENT);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{resolve_path, PathSpec};

    fn get<'a>(tree: &'a ConfigTree, path: &str) -> Option<&'a ConfigValue> {
        resolve_path(tree, &PathSpec::parse(path).unwrap())
    }

    const MAGENTO_CONFIG: &str = r#"<?php
return [
    'modules' => [
        'Magento_Store' => 1,
        'Magento_Theme' => 0,
    ],
    'scopes' => [
        'websites' => [
            'admin' => ['website_id' => '0', 'code' => 'admin', 'is_default' => '0'],
        ],
    ],
    'system' => array(
        'stores' => array(
            'admin' => array(
                'general' => array('locale' => array('code' => 'en_US')),
            ),
        ),
    ),
];
"#;

    // ==================== parse tests ====================

    #[test]
    fn test_parse_magento_config() {
        let tree = parse(MAGENTO_CONFIG).unwrap();

        assert_eq!(tree.keys().collect::<Vec<_>>(), vec!["modules", "scopes", "system"]);
        assert_eq!(
            get(&tree, "modules/Magento_Store"),
            Some(&ConfigValue::Leaf(Scalar::Int(1)))
        );
        assert_eq!(
            get(&tree, "scopes/websites/admin/code"),
            Some(&ConfigValue::Leaf(Scalar::from("admin")))
        );
        assert_eq!(
            get(&tree, "system/stores/admin/general/locale/code"),
            Some(&ConfigValue::Leaf(Scalar::from("en_US")))
        );
    }

    #[test]
    fn test_parse_lists_and_scalars() {
        let src = "<?php\n// generated\nreturn ['a' => ['x', 'y'], 'b' => -2, 'c' => 1.5, 'd' => true, 'e' => NULL, 'f' => [], 'g' => \"tab\\there\"];";
        let tree = parse(src).unwrap();

        assert_eq!(get(&tree, "a"), Some(&ConfigValue::string_list(["x", "y"])));
        assert_eq!(get(&tree, "b"), Some(&ConfigValue::Leaf(Scalar::Int(-2))));
        assert_eq!(get(&tree, "c"), Some(&ConfigValue::Leaf(Scalar::Float(1.5))));
        assert_eq!(get(&tree, "d"), Some(&ConfigValue::Leaf(Scalar::Bool(true))));
        assert_eq!(get(&tree, "e"), Some(&ConfigValue::Leaf(Scalar::Null)));
        assert_eq!(get(&tree, "f"), Some(&ConfigValue::List(Vec::new())));
        assert_eq!(get(&tree, "g"), Some(&ConfigValue::Leaf(Scalar::from("tab\there"))));
    }

    #[test]
    fn test_parse_numeric_string_keys_become_list() {
        let tree = parse("<?php return ['k' => ['0' => 'a', '1' => 'b']];").unwrap();
        assert_eq!(get(&tree, "k"), Some(&ConfigValue::string_list(["a", "b"])));
    }

    #[test]
    fn test_parse_sparse_int_keys_stay_node() {
        let tree = parse("<?php return ['k' => [1 => 'a', 'b']];").unwrap();
        let k = get(&tree, "k").and_then(ConfigValue::as_tree).unwrap();
        assert_eq!(k.keys().collect::<Vec<_>>(), vec!["1", "2"]);
    }

    #[test]
    fn test_parse_duplicate_key_last_wins() {
        let tree = parse("<?php return ['a' => 1, 'b' => 2, 'a' => 3];").unwrap();
        assert_eq!(tree.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(get(&tree, "a"), Some(&ConfigValue::Leaf(Scalar::Int(3))));
    }

    #[test]
    fn test_parse_single_quote_escapes() {
        let tree = parse(r"<?php return ['a' => 'it\'s a \\ path \n'];").unwrap();
        assert_eq!(
            get(&tree, "a"),
            Some(&ConfigValue::Leaf(Scalar::from(r"it's a \ path \n")))
        );
    }

    #[test]
    fn test_parse_concatenated_strings() {
        let src = "<?php\nreturn [\n    'a' => 'x' . \"\\0\" . 'y',\n    'b' => 'p'.'q',\n];\n";
        let tree = parse(src).unwrap();
        assert_eq!(get(&tree, "a"), Some(&ConfigValue::Leaf(Scalar::from("x\0y"))));
        assert_eq!(get(&tree, "b"), Some(&ConfigValue::Leaf(Scalar::from("pq"))));
    }

    #[test]
    fn test_parse_rejects_non_string_concatenation() {
        let err = parse("<?php return ['a' => 'x' . PHP_EOL];").unwrap_err();
        assert!(err.message.contains("concatenated"));
    }

    #[test]
    fn test_parse_error_display() {
        let err = parse("<?php\nreturn [\n  'a' => ,\n];").unwrap_err();
        assert!(err.to_string().starts_with("line 3, column 10: "));
    }

    #[test]
    fn test_parse_declare_and_comments() {
        let src = "<?php\ndeclare(strict_types=1);\n/* header */\nreturn [ # inline\n 'a' => 1 ];\n";
        let tree = parse(src).unwrap();
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_parse_rejects_code() {
        let err = parse("<?php return ['a' => getenv('X')];").unwrap_err();
        assert!(err.message.contains("unsupported expression"));

        let err = parse("<?php return ['a' => \"$x\"];").unwrap_err();
        assert!(err.message.contains("interpolation"));
    }

    #[test]
    fn test_parse_rejects_trailing_content() {
        assert!(parse("<?php return []; echo 1;").is_err());
    }

    #[test]
    fn test_parse_error_position() {
        let err = parse("<?php\nreturn [\n  'a' => ,\n];").unwrap_err();
        assert_eq!(err.line, 3);
        assert_eq!(err.column, 10);
    }

    #[test]
    fn test_parse_requires_array() {
        assert!(parse("<?php return 'x';").is_err());
        assert!(parse("return [];").is_err());
    }

    // ==================== render tests ====================

    #[test]
    fn test_render_layout() {
        let tree = parse("<?php return ['a' => ['b' => 'x'], 'l' => ['fr_FR'], 'e' => []];").unwrap();
        let expected = "<?php
return [
    'a' => [
        'b' => 'x',
    ],
    'l' => [
        'fr_FR',
    ],
    'e' => [],
];
";
        assert_eq!(render(&tree), expected);
    }

    #[test]
    fn test_render_parse_round_trip() {
        let tree = parse(MAGENTO_CONFIG).unwrap();
        let rendered = render(&tree);
        assert_eq!(parse(&rendered).unwrap(), tree);
    }

    #[test]
    fn test_render_escapes_and_floats() {
        let mut tree = ConfigTree::new();
        tree.insert("q", r"a'b\c");
        tree.insert("f", Scalar::Float(2.0));
        tree.insert("n", Scalar::Float(f64::NEG_INFINITY));

        let rendered = render(&tree);
        assert!(rendered.contains(r"'q' => 'a\'b\\c',"));
        assert!(rendered.contains("'f' => 2.0,"));
        assert!(rendered.contains("'n' => -INF,"));
        assert_eq!(parse(&rendered).unwrap(), tree);
    }
}
