//! Syntax trees and the source parser collaborator.
//!
//! The loader never evaluates configuration; it only needs to look at a
//! handful of constructs in each file: file-level attributes (`@if`,
//! `@ignore`), the package clause, the import declarations, and field
//! attributes (`@tag`). [`SyntaxFile`] models exactly that, and the
//! [`SourceParser`] trait lets an evaluator plug in a complete parser.
//!
//! [`BasicParser`] is a line-oriented parser for the subset above. Field
//! values it does not understand are kept verbatim as [`Expr::Raw`] so that a
//! tree can be rendered back to source.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// A source position, 1-based.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Position {
    pub filename: PathBuf,
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(filename: impl Into<PathBuf>, line: usize, column: usize) -> Self {
        Self {
            filename: filename.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.filename.display(), self.line, self.column)
    }
}

/// An attribute such as `@if(foo)` or `@tag(env,short=dev|prod)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    /// Everything between the parentheses, verbatim.
    pub body: String,
    pub pos: Position,
}

impl Attribute {
    /// Splits the body into comma-separated, trimmed arguments.
    pub fn args(&self) -> Vec<String> {
        if self.body.trim().is_empty() {
            return Vec::new();
        }
        split_top_level(&self.body, ',')
            .into_iter()
            .map(|a| a.trim().to_string())
            .collect()
    }
}

/// The package clause of a file.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageClause {
    pub name: String,
    pub pos: Position,
}

/// A single import declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportSpec {
    /// Local alias, if any.
    pub name: Option<String>,
    pub path: String,
    pub pos: Position,
}

/// A field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Source text kept verbatim.
    Raw(String),
    /// A simple double-quoted string literal, unquoted.
    Str(String),
    Struct(Vec<Decl>),
    /// `lhs & rhs`
    Unify(Box<Expr>, Box<Expr>),
}

impl Expr {
    fn render_into(&self, indent: usize, out: &mut String) {
        match self {
            Expr::Raw(s) => out.push_str(s),
            Expr::Str(s) => out.push_str(&quote(s)),
            Expr::Struct(decls) => {
                out.push_str("{\n");
                render_decls(decls, indent + 1, out);
                push_indent(indent, out);
                out.push('}');
            }
            Expr::Unify(lhs, rhs) => {
                lhs.render_into(indent, out);
                out.push_str(" & ");
                rhs.render_into(indent, out);
            }
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(0, &mut out);
        out
    }
}

/// A declaration inside a file or struct.
#[derive(Debug, Clone, PartialEq)]
pub enum Decl {
    Field(Field),
    Embed(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub label: String,
    pub value: Expr,
    pub attrs: Vec<Attribute>,
    pub pos: Position,
}

/// How much of a file to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParseMode {
    /// Stop after the import declarations.
    ImportsOnly,
    Full,
}

/// A parsed source file.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxFile {
    pub filename: PathBuf,
    /// Attributes that precede the package clause.
    pub attributes: Vec<Attribute>,
    pub package: Option<PackageClause>,
    pub imports: Vec<ImportSpec>,
    /// Empty when parsed with [`ParseMode::ImportsOnly`].
    pub decls: Vec<Decl>,
}

impl SyntaxFile {
    pub fn new(filename: impl Into<PathBuf>) -> Self {
        Self {
            filename: filename.into(),
            attributes: Vec::new(),
            package: None,
            imports: Vec::new(),
            decls: Vec::new(),
        }
    }

    /// The declared package name, or `None` for files without a clause.
    pub fn package_name(&self) -> Option<&str> {
        self.package.as_ref().map(|p| p.name.as_str())
    }

    /// Renders the tree back to source text.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for attr in &self.attributes {
            out.push_str(&format!("@{}({})\n", attr.name, attr.body));
        }
        if let Some(pkg) = &self.package {
            out.push_str(&format!("package {}\n", pkg.name));
        }
        if !self.imports.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            if self.imports.len() == 1 {
                out.push_str(&format!("import {}\n", render_import(&self.imports[0])));
            } else {
                out.push_str("import (\n");
                for spec in &self.imports {
                    out.push_str(&format!("\t{}\n", render_import(spec)));
                }
                out.push_str(")\n");
            }
        }
        if !self.decls.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            render_decls(&self.decls, 0, &mut out);
        }
        out
    }
}

fn render_import(spec: &ImportSpec) -> String {
    match &spec.name {
        Some(name) => format!("{} {}", name, quote(&spec.path)),
        None => quote(&spec.path),
    }
}

fn render_decls(decls: &[Decl], indent: usize, out: &mut String) {
    for decl in decls {
        push_indent(indent, out);
        match decl {
            Decl::Field(field) => {
                out.push_str(&field.label);
                out.push_str(": ");
                field.value.render_into(indent, out);
                for attr in &field.attrs {
                    out.push_str(&format!(" @{}({})", attr.name, attr.body));
                }
            }
            Decl::Embed(expr) => expr.render_into(indent, out),
        }
        out.push('\n');
    }
}

fn push_indent(indent: usize, out: &mut String) {
    for _ in 0..indent {
        out.push('\t');
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn unquote(s: &str) -> Option<String> {
    let inner = s.strip_prefix('"')?.strip_suffix('"')?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '"' => return None,
            '\\' => match chars.next()? {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                other => out.push(other),
            },
            c => out.push(c),
        }
    }
    Some(out)
}

/// Reports whether `s` is a valid identifier.
pub fn is_valid_ident(s: &str) -> bool {
    let mut chars = s.chars();
    let first = match chars.next() {
        Some(c) => c,
        None => return false,
    };
    let first_ok = first.is_alphabetic() || first == '_' || first == '$' || first == '#';
    first_ok && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

/// Parses source bytes into a [`SyntaxFile`].
pub trait SourceParser: Send + Sync {
    fn parse(&self, filename: &Path, src: &[u8], mode: ParseMode) -> Result<SyntaxFile>;
}

/// Parser for the constructs the loader inspects.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicParser;

impl SourceParser for BasicParser {
    fn parse(&self, filename: &Path, src: &[u8], mode: ParseMode) -> Result<SyntaxFile> {
        let text = std::str::from_utf8(src).map_err(|e| Error::Parse {
            pos: Position::new(filename, 1, 1),
            message: format!("invalid UTF-8 encoding: {}", e),
        })?;
        let mut parser = LineParser {
            filename,
            lines: text.lines().collect(),
            idx: 0,
        };
        parser.parse_file(mode)
    }
}

struct LineParser<'a> {
    filename: &'a Path,
    lines: Vec<&'a str>,
    idx: usize,
}

impl<'a> LineParser<'a> {
    fn pos(&self, line: usize, column: usize) -> Position {
        Position::new(self.filename, line, column)
    }

    fn error(&self, line: usize, column: usize, message: impl Into<String>) -> Error {
        Error::Parse {
            pos: self.pos(line, column),
            message: message.into(),
        }
    }

    /// Returns the next non-blank line (comment stripped) without consuming
    /// it, with its 1-based line number and indentation column.
    fn peek(&mut self) -> Option<(usize, usize, &'a str)> {
        while self.idx < self.lines.len() {
            let line = strip_comment(self.lines[self.idx]);
            let trimmed = line.trim();
            if trimmed.is_empty() {
                self.idx += 1;
                continue;
            }
            let column = line.len() - line.trim_start().len() + 1;
            return Some((self.idx + 1, column, trimmed));
        }
        None
    }

    fn parse_file(&mut self, mode: ParseMode) -> Result<SyntaxFile> {
        let mut file = SyntaxFile::new(self.filename);

        while let Some((line, column, text)) = self.peek() {
            if text.starts_with('@') && file.package.is_none() {
                let (attrs, offset) = self.parse_leading_attrs(text, line, column)?;
                let rest = text[offset..].trim_start();
                let rest_column = column + text.len() - rest.len();
                let package = keyword_arg(rest, "package");
                if !rest.is_empty() && package.is_none() {
                    break;
                }
                file.attributes.extend(attrs);
                if let Some(name) = package {
                    file.package = Some(self.package_clause(name, line, rest_column)?);
                }
                self.idx += 1;
            } else if let Some(name) = keyword_arg(text, "package") {
                if file.package.is_some() {
                    return Err(self.error(line, column, "duplicate package clause"));
                }
                file.package = Some(self.package_clause(name, line, column)?);
                self.idx += 1;
            } else {
                break;
            }
        }

        while let Some((line, column, text)) = self.peek() {
            let rest = match keyword_arg(text, "import") {
                Some(rest) => rest,
                None if text.starts_with("import(") => &text["import".len()..],
                None => break,
            };
            self.idx += 1;
            if rest == "(" {
                loop {
                    let (line, column, text) = match self.peek() {
                        Some(next) => next,
                        None => return Err(self.error(line, column, "unterminated import block")),
                    };
                    self.idx += 1;
                    if text == ")" {
                        break;
                    }
                    file.imports.push(self.parse_import_spec(text, line, column)?);
                }
            } else {
                let offset = text.len() - rest.len();
                file.imports
                    .push(self.parse_import_spec(rest, line, column + offset)?);
            }
        }

        if mode == ParseMode::Full {
            file.decls = self.parse_decls(None)?;
        }
        Ok(file)
    }

    fn package_clause(&self, name: &str, line: usize, column: usize) -> Result<PackageClause> {
        if !is_valid_ident(name) {
            return Err(self.error(
                line,
                column,
                format!("invalid package name {:?}", name),
            ));
        }
        Ok(PackageClause {
            name: name.to_string(),
            pos: self.pos(line, column + "package ".len()),
        })
    }

    /// Parses the attributes at the start of `text`; returns them with the
    /// byte offset where the remaining text begins.
    fn parse_leading_attrs(
        &self,
        text: &str,
        line: usize,
        column: usize,
    ) -> Result<(Vec<Attribute>, usize)> {
        let mut attrs = Vec::new();
        let mut i = 0;
        while text[i..].starts_with('@') {
            let name_end = text[i + 1..]
                .find('(')
                .map(|n| i + 1 + n)
                .ok_or_else(|| self.error(line, column + i, "attribute missing '('"))?;
            let name = &text[i + 1..name_end];
            if !is_valid_ident(name) {
                return Err(self.error(line, column + i, format!("invalid attribute name {:?}", name)));
            }
            let close = matching_paren(text, name_end)
                .ok_or_else(|| self.error(line, column + i, "attribute missing ')'"))?;
            attrs.push(Attribute {
                name: name.to_string(),
                body: text[name_end + 1..close].to_string(),
                pos: self.pos(line, column + i),
            });
            i = close + 1;
            i += text[i..].len() - text[i..].trim_start().len();
        }
        Ok((attrs, i))
    }

    fn parse_import_spec(&self, text: &str, line: usize, column: usize) -> Result<ImportSpec> {
        let (name, path_text, path_col) = match text.find('"') {
            Some(0) => (None, text, column),
            Some(i) => {
                let name = text[..i].trim();
                if !is_valid_ident(name) && name != "_" && name != "." {
                    return Err(self.error(line, column, format!("invalid import name {:?}", name)));
                }
                (Some(name.to_string()), &text[i..], column + i)
            }
            None => return Err(self.error(line, column, "missing import path")),
        };
        let path = unquote(path_text.trim())
            .ok_or_else(|| self.error(line, path_col, format!("invalid import path {}", path_text)))?;
        Ok(ImportSpec {
            name,
            path,
            pos: self.pos(line, path_col),
        })
    }

    /// Parses declarations until end of input, or until the closing brace
    /// of the struct opened at `open` (line, column).
    fn parse_decls(&mut self, open: Option<(usize, usize)>) -> Result<Vec<Decl>> {
        let mut decls = Vec::new();
        loop {
            let (line, column, text) = match self.peek() {
                Some(next) => next,
                None => match open {
                    Some((l, c)) => return Err(self.error(l, c, "expected '}', found EOF")),
                    None => return Ok(decls),
                },
            };
            self.idx += 1;
            if open.is_some() && (text == "}" || text == "},") {
                return Ok(decls);
            }

            match split_field(text) {
                Some((label, rest)) => {
                    let rest_col = column + (text.len() - rest.len());
                    let (value_text, attrs) = self.parse_attrs(rest, line, rest_col)?;
                    let value = if value_text == "{" {
                        Expr::Struct(self.parse_decls(Some((line, rest_col)))?)
                    } else {
                        classify(self.continue_value(value_text.to_string(), line, rest_col)?)
                    };
                    decls.push(Decl::Field(Field {
                        label: label.to_string(),
                        value,
                        attrs,
                        pos: self.pos(line, column),
                    }));
                }
                None => {
                    let text = self.continue_value(text.to_string(), line, column)?;
                    decls.push(Decl::Embed(Expr::Raw(text)));
                }
            }
        }
    }

    /// Appends following lines while brackets in `text` are unbalanced.
    fn continue_value(&mut self, mut text: String, line: usize, column: usize) -> Result<String> {
        let mut depth = bracket_delta(&text);
        while depth > 0 {
            if self.idx >= self.lines.len() {
                return Err(self.error(line, column, "unbalanced brackets, found EOF"));
            }
            let next = strip_comment(self.lines[self.idx]);
            self.idx += 1;
            text.push('\n');
            text.push_str(next.trim_end());
            depth += bracket_delta(next);
        }
        Ok(text)
    }

    /// Splits trailing attributes off `text`.
    fn parse_attrs(
        &self,
        text: &'a str,
        line: usize,
        column: usize,
    ) -> Result<(&'a str, Vec<Attribute>)> {
        let start = match find_attr_start(text) {
            Some(start) => start,
            None => return Ok((text.trim(), Vec::new())),
        };
        let mut attrs = Vec::new();
        let bytes = text.as_bytes();
        let mut i = start;
        while i < text.len() {
            if bytes[i].is_ascii_whitespace() {
                i += 1;
                continue;
            }
            if bytes[i] != b'@' {
                return Err(self.error(line, column + i, "unexpected text after attribute"));
            }
            let name_end = text[i + 1..]
                .find('(')
                .map(|n| i + 1 + n)
                .ok_or_else(|| self.error(line, column + i, "attribute missing '('"))?;
            let name = &text[i + 1..name_end];
            if !is_valid_ident(name) {
                return Err(self.error(line, column + i, format!("invalid attribute name {:?}", name)));
            }
            let close = matching_paren(text, name_end)
                .ok_or_else(|| self.error(line, column + i, "attribute missing ')'"))?;
            attrs.push(Attribute {
                name: name.to_string(),
                body: text[name_end + 1..close].to_string(),
                pos: self.pos(line, column + i),
            });
            i = close + 1;
        }
        Ok((text[..start].trim(), attrs))
    }
}

/// Returns the argument of `keyword` if `text` starts with it as a word.
fn keyword_arg<'t>(text: &'t str, keyword: &str) -> Option<&'t str> {
    let rest = text.strip_prefix(keyword)?;
    if rest.starts_with(|c: char| c.is_whitespace()) {
        Some(rest.trim())
    } else {
        None
    }
}

/// Splits `label: value` at the first top-level colon.
fn split_field(text: &str) -> Option<(&str, &str)> {
    let colon = find_top_level(text, ':')?;
    let label = text[..colon].trim();
    let is_label = if label.starts_with('"') {
        unquote(label).is_some()
    } else {
        let base = label.trim_end_matches(['?', '!']);
        is_valid_ident(base)
    };
    if is_label {
        Some((label, &text[colon + 1..]))
    } else {
        None
    }
}

fn classify(text: String) -> Expr {
    match unquote(&text) {
        Some(s) => Expr::Str(s),
        None => Expr::Raw(text),
    }
}

/// Walks `text` calling `f(index, byte, depth)` for every byte outside of
/// string literals. Stops early when `f` returns true.
fn scan(text: &str, mut f: impl FnMut(usize, u8, i32) -> bool) {
    let bytes = text.as_bytes();
    let mut in_string = false;
    let mut escaped = false;
    let mut depth = 0i32;
    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => {
                in_string = true;
                continue;
            }
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth -= 1,
            _ => {}
        }
        let at = if matches!(b, b'(' | b'[' | b'{') { depth - 1 } else { depth };
        if f(i, b, at) {
            return;
        }
    }
}

fn strip_comment(line: &str) -> &str {
    let bytes = line.as_bytes();
    let mut cut = None;
    scan(line, |i, b, _| {
        if b == b'/' && bytes.get(i + 1) == Some(&b'/') {
            cut = Some(i);
            true
        } else {
            false
        }
    });
    match cut {
        Some(i) => &line[..i],
        None => line,
    }
}

fn find_top_level(text: &str, ch: char) -> Option<usize> {
    let mut found = None;
    scan(text, |i, b, depth| {
        if depth == 0 && b == ch as u8 {
            found = Some(i);
            true
        } else {
            false
        }
    });
    found
}

fn find_attr_start(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut found = None;
    scan(text, |i, b, depth| {
        let boundary = i == 0 || bytes[i - 1].is_ascii_whitespace();
        if depth == 0 && b == b'@' && boundary {
            found = Some(i);
            true
        } else {
            false
        }
    });
    found
}

fn matching_paren(text: &str, open: usize) -> Option<usize> {
    let mut base = None;
    let mut found = None;
    scan(text, |i, b, depth| {
        if i == open {
            base = Some(depth);
        } else if i > open && b == b')' && Some(depth) == base {
            found = Some(i);
            return true;
        }
        false
    });
    found
}

fn bracket_delta(text: &str) -> i32 {
    let mut delta = 0;
    scan(text, |_, b, _| {
        match b {
            b'(' | b'[' | b'{' => delta += 1,
            b')' | b']' | b'}' => delta -= 1,
            _ => {}
        }
        false
    });
    delta
}

fn split_top_level(text: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut last = 0;
    scan(text, |i, b, depth| {
        if depth == 0 && b == sep as u8 {
            parts.push(&text[last..i]);
            last = i + 1;
        }
        false
    });
    parts.push(&text[last..]);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str, mode: ParseMode) -> SyntaxFile {
        BasicParser
            .parse(Path::new("/w/a.cue"), src.as_bytes(), mode)
            .unwrap()
    }

    #[test]
    fn test_parse_header() {
        let src = "// comment\n@if(prod && !debug)\n@ignore()\npackage foo\n\nimport \"example.com/x\"\nimport (\n\ty \"example.com/y:z\"\n\t\"strings\"\n)\n\na: 1\n";
        let file = parse(src, ParseMode::ImportsOnly);
        assert_eq!(file.attributes.len(), 2);
        assert_eq!(file.attributes[0].name, "if");
        assert_eq!(file.attributes[0].body, "prod && !debug");
        assert_eq!(file.attributes[1].name, "ignore");
        assert_eq!(file.package_name(), Some("foo"));
        let paths: Vec<_> = file.imports.iter().map(|i| i.path.as_str()).collect();
        assert_eq!(paths, vec!["example.com/x", "example.com/y:z", "strings"]);
        assert_eq!(file.imports[1].name.as_deref(), Some("y"));
        assert_eq!(file.imports[0].pos.line, 6);
        assert!(file.decls.is_empty());
    }

    #[test]
    fn test_parse_attribute_and_package_on_one_line() {
        let file = parse("@if(foo) @ignore() package p\n\nimport \"a.test/b\"\n", ParseMode::ImportsOnly);
        let names: Vec<_> = file.attributes.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["if", "ignore"]);
        assert_eq!(file.attributes[0].body, "foo");
        assert_eq!(file.package_name(), Some("p"));
        assert_eq!(file.package.as_ref().unwrap().pos.column, 28);
        assert_eq!(file.imports.len(), 1);

        let err = BasicParser
            .parse(Path::new("/w/b.cue"), b"@if(x) package 1\n", ParseMode::ImportsOnly)
            .unwrap_err();
        assert!(err.to_string().contains("invalid package name"));
    }

    #[test]
    fn test_parse_no_package() {
        let file = parse("a: 1\nb: \"x\"\n", ParseMode::Full);
        assert_eq!(file.package_name(), None);
        assert_eq!(file.decls.len(), 2);
        match &file.decls[1] {
            Decl::Field(f) => assert_eq!(f.value, Expr::Str("x".to_string())),
            other => panic!("unexpected decl {:?}", other),
        }
    }

    #[test]
    fn test_parse_fields_with_attributes() {
        let src = "package p\n\nenv: *\"dev\" | string @tag(env,short=dev|prod)\nnested: {\n\tname: string @tag(name)\n\tlist: [\n\t\t1,\n\t\t2,\n\t]\n}\nurl: \"http://x.test/a\" // trailing\n";
        let file = parse(src, ParseMode::Full);
        assert_eq!(file.decls.len(), 3);
        let env = match &file.decls[0] {
            Decl::Field(f) => f,
            other => panic!("unexpected decl {:?}", other),
        };
        assert_eq!(env.label, "env");
        assert_eq!(env.value, Expr::Raw("*\"dev\" | string".to_string()));
        assert_eq!(env.attrs[0].args(), vec!["env", "short=dev|prod"]);
        let nested = match &file.decls[1] {
            Decl::Field(Field {
                value: Expr::Struct(decls),
                ..
            }) => decls,
            other => panic!("unexpected decl {:?}", other),
        };
        assert_eq!(nested.len(), 2);
        match &file.decls[2] {
            Decl::Field(f) => assert_eq!(f.value, Expr::Str("http://x.test/a".to_string())),
            other => panic!("unexpected decl {:?}", other),
        }
    }

    #[test]
    fn test_parse_errors() {
        let err = BasicParser
            .parse(Path::new("/w/b.cue"), b"a: {\n b: 1\n", ParseMode::Full)
            .unwrap_err();
        assert!(err.to_string().contains("expected '}'"));

        let err = BasicParser
            .parse(Path::new("/w/b.cue"), b"package 1x\n", ParseMode::ImportsOnly)
            .unwrap_err();
        assert!(err.to_string().starts_with("/w/b.cue:1:1"));

        let err = BasicParser
            .parse(Path::new("/w/b.cue"), b"import (\n\"a\"\n", ParseMode::ImportsOnly)
            .unwrap_err();
        assert!(err.to_string().contains("unterminated import block"));
    }

    #[test]
    fn test_render_reparses() {
        let src = "@if(x)\npackage p\n\nimport \"a.test/b\"\n\nv: string @tag(v)\ns: {\n\tn: 1\n}\n";
        let file = parse(src, ParseMode::Full);
        let rendered = file.render();
        assert_eq!(rendered, src);
        let again = parse(&rendered, ParseMode::Full);
        assert_eq!(again.decls.len(), file.decls.len());
    }

    #[test]
    fn test_render_unify() {
        let expr = Expr::Unify(
            Box::new(Expr::Raw("string".to_string())),
            Box::new(Expr::Str("prod".to_string())),
        );
        assert_eq!(expr.render(), "string & \"prod\"");
    }

    #[test]
    fn test_is_valid_ident() {
        assert!(is_valid_ident("foo"));
        assert!(is_valid_ident("_x1"));
        assert!(is_valid_ident("#Def"));
        assert!(!is_valid_ident(""));
        assert!(!is_valid_ident("1abc"));
        assert!(!is_valid_ident("a-b"));
    }
}
