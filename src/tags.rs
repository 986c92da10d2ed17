//! Build tags and tag injection
//!
//! Two kinds of tags come from the command line (`-t`):
//!
//! - boolean tags (`-t prod`) consulted by `@if` build constraints, or used
//!   as a shorthand for a `@tag` declaration;
//! - key/value tags (`-t env=staging`) that set fields carrying a
//!   `@tag(env)` attribute.
//!
//! A field declares a tag with
//! `@tag(<name>[,type=string|int|number|bool][,short=a|b][,var=<name>])`.
//! Injection rewrites the field's value to `value & injected`. Tags that
//! name a variable (`var=now`) are filled from the tag variable providers
//! when the command line did not set them.
//!
//! Only the units named on the command line take part: declarations in
//! their dependencies are neither collected nor rewritten.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};

use crate::error::{Error, Result};
use crate::instance::BuildUnit;
use crate::syntax::{is_valid_ident, Attribute, Decl, Expr, Field, SyntaxFile};

/// Provider of a tag variable value.
#[derive(Clone)]
pub struct TagVar {
    pub func: Arc<dyn Fn() -> Result<Expr> + Send + Sync>,
    pub description: String,
}

impl TagVar {
    pub fn new<F>(description: impl Into<String>, func: F) -> Self
    where
        F: Fn() -> Result<Expr> + Send + Sync + 'static,
    {
        Self {
            func: Arc::new(func),
            description: description.into(),
        }
    }
}

impl fmt::Debug for TagVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TagVar")
            .field("description", &self.description)
            .finish()
    }
}

fn tag_var_error(name: &str, message: impl fmt::Display) -> Error {
    Error::TagVar {
        name: name.to_string(),
        message: message.to_string(),
    }
}

fn hostname() -> Result<Expr> {
    if let Ok(name) = std::env::var("HOSTNAME") {
        if !name.is_empty() {
            return Ok(Expr::Str(name));
        }
    }
    for path in ["/etc/hostname", "/proc/sys/kernel/hostname"] {
        if let Ok(content) = std::fs::read_to_string(path) {
            let name = content.trim();
            if !name.is_empty() {
                return Ok(Expr::Str(name.to_string()));
            }
        }
    }
    Err(tag_var_error("hostname", "cannot determine host name"))
}

/// The tag variables available by default.
pub fn default_tag_vars() -> HashMap<String, TagVar> {
    let mut vars = HashMap::new();
    vars.insert(
        "now".to_string(),
        TagVar::new("current time in RFC 3339 format, UTC", || {
            Ok(Expr::Str(
                Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true),
            ))
        }),
    );
    vars.insert(
        "os".to_string(),
        TagVar::new("operating system", || {
            Ok(Expr::Str(std::env::consts::OS.to_string()))
        }),
    );
    vars.insert(
        "arch".to_string(),
        TagVar::new("processor architecture", || {
            Ok(Expr::Str(std::env::consts::ARCH.to_string()))
        }),
    );
    vars.insert(
        "cwd".to_string(),
        TagVar::new("current working directory", || {
            let dir = std::env::current_dir().map_err(|e| tag_var_error("cwd", e))?;
            Ok(Expr::Str(dir.to_string_lossy().into_owned()))
        }),
    );
    vars.insert(
        "username".to_string(),
        TagVar::new("current user name", || {
            std::env::var("USER")
                .or_else(|_| std::env::var("USERNAME"))
                .map(Expr::Str)
                .map_err(|e| tag_var_error("username", e))
        }),
    );
    vars.insert(
        "hostname".to_string(),
        TagVar::new("host name", hostname),
    );
    vars.insert(
        "rand".to_string(),
        TagVar::new("random 128-bit integer", || {
            let bytes: [u8; 16] = rand::random();
            let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
            Ok(Expr::Raw(format!("0x{}", hex)))
        }),
    );
    vars
}

/// Tracks boolean tags and which of them build constraints consulted.
#[derive(Debug, Default)]
pub struct Tagger {
    flags: HashSet<String>,
    used: Mutex<HashSet<String>>,
}

impl Tagger {
    /// Boolean tags are the `-t` values without `=`.
    pub fn new(tags: &[String]) -> Self {
        Self {
            flags: tags.iter().filter(|t| !t.contains('=')).cloned().collect(),
            used: Mutex::new(HashSet::new()),
        }
    }

    /// Reports whether `key` is set, recording that it was consulted.
    pub fn is_set(&self, key: &str) -> bool {
        if let Ok(mut used) = self.used.lock() {
            used.insert(key.to_string());
        }
        self.flags.contains(key)
    }

    /// Reports whether any build constraint consulted `key`.
    pub fn was_used(&self, key: &str) -> bool {
        self.used
            .lock()
            .map(|used| used.contains(key))
            .unwrap_or(false)
    }
}

/// Value type of a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    String,
    Int,
    Number,
    Bool,
}

impl fmt::Display for TagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TagKind::String => "string",
            TagKind::Int => "int",
            TagKind::Number => "number",
            TagKind::Bool => "bool",
        };
        f.write_str(name)
    }
}

impl TagKind {
    /// Converts a command-line value to an expression of this kind.
    pub fn parse_value(self, key: &str, value: &str) -> Result<Expr> {
        let invalid = || Error::InvalidTag {
            message: format!("invalid {} value {:?} for tag {:?}", self, value, key),
        };
        match self {
            TagKind::String => Ok(Expr::Str(value.to_string())),
            TagKind::Int => {
                let digits = value.replace('_', "");
                digits.parse::<i128>().map_err(|_| invalid())?;
                Ok(Expr::Raw(value.to_string()))
            }
            TagKind::Number => {
                value.replace('_', "").parse::<f64>().map_err(|_| invalid())?;
                Ok(Expr::Raw(value.to_string()))
            }
            TagKind::Bool => match value {
                "true" | "false" => Ok(Expr::Raw(value.to_string())),
                _ => Err(invalid()),
            },
        }
    }
}

/// Where a tagged field lives: unit index, syntax file index, and the
/// declaration index at each struct nesting level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagLocation {
    pub unit: usize,
    pub file: usize,
    pub path: Vec<usize>,
}

/// A parsed `@tag` attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct TagDecl {
    pub key: String,
    pub kind: TagKind,
    pub shorthands: Vec<String>,
    pub var: Option<String>,
    pub location: TagLocation,
}

/// Parses the body of a `@tag` attribute.
pub fn parse_tag(attr: &Attribute, location: TagLocation) -> Result<TagDecl> {
    let invalid = |message: String| Error::InvalidTag {
        message: format!("{}: {}", attr.pos, message),
    };
    let args = attr.args();
    let key = args.first().cloned().unwrap_or_default();
    if !is_valid_ident(&key) {
        return Err(invalid(format!("invalid identifier {:?}", key)));
    }
    let mut decl = TagDecl {
        key,
        kind: TagKind::String,
        shorthands: Vec::new(),
        var: None,
        location,
    };
    for arg in &args[1..] {
        let (name, value) = match arg.split_once('=') {
            Some((n, v)) => (n.trim(), v.trim()),
            None => return Err(invalid(format!("invalid tag option {:?}", arg))),
        };
        match name {
            "type" => {
                decl.kind = match value {
                    "string" => TagKind::String,
                    "int" => TagKind::Int,
                    "number" => TagKind::Number,
                    "bool" => TagKind::Bool,
                    other => return Err(invalid(format!("invalid type {:?}", other))),
                }
            }
            "short" => {
                for short in value.split('|') {
                    if !is_valid_ident(short) {
                        return Err(invalid(format!("invalid identifier {:?}", short)));
                    }
                    decl.shorthands.push(short.to_string());
                }
            }
            "var" => decl.var = Some(value.to_string()),
            other => return Err(invalid(format!("unknown tag option {:?}", other))),
        }
    }
    Ok(decl)
}

fn collect_fields(
    decls: &[Decl],
    unit: usize,
    file: usize,
    prefix: &mut Vec<usize>,
    found: &mut Vec<TagDecl>,
    errors: &mut Vec<(usize, Error)>,
) {
    for (i, decl) in decls.iter().enumerate() {
        let field = match decl {
            Decl::Field(field) => field,
            Decl::Embed(_) => continue,
        };
        prefix.push(i);
        for attr in field.attrs.iter().filter(|a| a.name == "tag") {
            let location = TagLocation {
                unit,
                file,
                path: prefix.clone(),
            };
            match parse_tag(attr, location) {
                Ok(decl) => found.push(decl),
                Err(e) => errors.push((unit, e)),
            }
        }
        if let Expr::Struct(inner) = &field.value {
            collect_fields(inner, unit, file, prefix, found, errors);
        }
        prefix.pop();
    }
}

/// Collects the `@tag` declarations of the syntax trees of `roots`.
///
/// Malformed attributes are returned as errors paired with the index of the
/// unit holding them.
pub fn find_tags(units: &[BuildUnit], roots: &[usize]) -> (Vec<TagDecl>, Vec<(usize, Error)>) {
    let mut found = Vec::new();
    let mut errors = Vec::new();
    for &u in roots {
        for (f, file) in units[u].syntax.iter().enumerate() {
            collect_fields(&file.decls, u, f, &mut Vec::new(), &mut found, &mut errors);
        }
    }
    (found, errors)
}

fn field_at<'a>(decls: &'a mut [Decl], path: &[usize]) -> Option<&'a mut Field> {
    let (first, rest) = path.split_first()?;
    let Decl::Field(field) = decls.get_mut(*first)? else {
        return None;
    };
    if rest.is_empty() {
        return Some(field);
    }
    match &mut field.value {
        Expr::Struct(inner) => field_at(inner, rest),
        _ => None,
    }
}

fn inject_value(units: &mut [BuildUnit], location: &TagLocation, value: Expr) {
    let unit = &mut units[location.unit];
    let file: &mut SyntaxFile = Arc::make_mut(&mut unit.syntax[location.file]);
    if let Some(field) = field_at(&mut file.decls, &location.path) {
        let old = std::mem::replace(&mut field.value, Expr::Raw(String::new()));
        field.value = Expr::Unify(Box::new(old), Box::new(value));
    }
}

/// Reports `err` on every root that does not carry it yet.
fn report_roots(units: &mut [BuildUnit], roots: &[usize], err: &Error) {
    for &id in roots {
        let unit = &mut units[id];
        let already = unit
            .err
            .as_ref()
            .is_some_and(|errs| errs.iter().any(|x| x == err));
        if !already {
            unit.report_error(err.clone());
        }
    }
}

/// Injects command-line tags and tag variables into the syntax trees of
/// the root units.
///
/// Injection errors (unknown keys, unused boolean tags, invalid values and
/// failing or undeclared tag variables) are reported on every root. A
/// malformed `@tag` attribute is reported on the unit holding it.
pub fn inject_tags(
    units: &mut [BuildUnit],
    roots: &[usize],
    tags: &[String],
    vars: &HashMap<String, TagVar>,
    tagger: &Tagger,
) {
    let (decls, errors) = find_tags(units, roots);
    for (unit, err) in errors {
        units[unit].report_error(err);
    }

    let mut replaced = vec![false; decls.len()];
    for tag in tags {
        match tag.split_once('=') {
            Some((key, value)) => {
                let mut found = false;
                for (i, decl) in decls.iter().enumerate().filter(|(_, d)| d.key == key) {
                    found = true;
                    match decl.kind.parse_value(key, value) {
                        Ok(expr) => {
                            inject_value(units, &decl.location, expr);
                            replaced[i] = true;
                        }
                        Err(e) => report_roots(units, roots, &e),
                    }
                }
                if !found {
                    report_roots(units, roots, &Error::UnknownTag {
                        tag: key.to_string(),
                    });
                }
            }
            None => {
                let mut found = tagger.was_used(tag);
                for (i, decl) in decls.iter().enumerate() {
                    if !decl.shorthands.iter().any(|s| s == tag) {
                        continue;
                    }
                    found = true;
                    match decl.kind.parse_value(&decl.key, tag) {
                        Ok(expr) => {
                            inject_value(units, &decl.location, expr);
                            replaced[i] = true;
                        }
                        Err(e) => report_roots(units, roots, &e),
                    }
                }
                if !found {
                    report_roots(units, roots, &Error::UnusedTag { tag: tag.clone() });
                }
            }
        }
    }

    let mut values: HashMap<&str, std::result::Result<Expr, Error>> = HashMap::new();
    for (i, decl) in decls.iter().enumerate() {
        let var = match &decl.var {
            Some(var) if !replaced[i] => var.as_str(),
            _ => continue,
        };
        let value = values.entry(var).or_insert_with(|| match vars.get(var) {
            Some(provider) => (provider.func)().map_err(|e| match e {
                Error::TagVar { .. } => e,
                other => tag_var_error(var, other),
            }),
            None => Err(Error::UndeclaredTagVar {
                name: var.to_string(),
            }),
        });
        match value {
            Ok(expr) => {
                let expr = expr.clone();
                inject_value(units, &decl.location, expr);
            }
            Err(e) => report_roots(units, roots, e),
        }
    }
}
