//! # Path Patterns
//!
//! Compiles route patterns into anchored regular expressions and extracts
//! named parameters from request paths.
//!
//! ## Syntax
//!
//! - `:name` captures one segment (`/users/:id`)
//! - `:name(regex)` captures with a custom expression (`/items/:id(\d+)`)
//! - `:name?` makes the parameter and its leading `/` or `.` optional
//! - `*` captures anything, stored under positional names `"0"`, `"1"`, ...
//! - everything else is matched literally
//!
//! A matcher compiled in prefix mode (`end = false`) only needs to match a
//! leading run of whole segments; the matched prefix is reported so that
//! mounted routers can strip it.

use crate::error::{Error, Result};
use crate::params::Params;
use regex::Regex;

/// Compile-time options for a [`PathMatcher`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchOptions {
    /// Match literal segments case-sensitively
    pub case_sensitive: bool,
    /// Treat a trailing slash as significant
    pub strict: bool,
    /// Require the pattern to consume the whole path
    pub end: bool,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self::exact(false, false)
    }
}

impl MatchOptions {
    /// Whole-path matching, as used for routes
    #[must_use]
    pub const fn exact(case_sensitive: bool, strict: bool) -> Self {
        Self {
            case_sensitive,
            strict,
            end: true,
        }
    }

    /// Leading-segment matching, as used for middleware and mount points
    #[must_use]
    pub const fn prefix(case_sensitive: bool) -> Self {
        Self {
            case_sensitive,
            strict: false,
            end: false,
        }
    }
}

/// A parameter declared by a pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key {
    /// Parameter name (positional names for wildcards)
    pub name: String,
    /// Whether the parameter may be absent
    pub optional: bool,
}

/// Successful match of a path against a pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMatch {
    /// The portion of the path consumed by the pattern
    pub path: String,
    /// Decoded parameters in declaration order
    pub params: Params,
}

/// A compiled route pattern
#[derive(Debug, Clone)]
pub struct PathMatcher {
    pattern: String,
    regex: Regex,
    keys: Vec<Key>,
    groups: Vec<String>,
    options: MatchOptions,
}

impl PathMatcher {
    /// Compile a pattern
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` for a `:` with no name, an
    /// unbalanced custom group, or a custom expression the regex engine
    /// rejects.
    pub fn compile(pattern: &str, options: MatchOptions) -> Result<Self> {
        let body = if options.strict {
            pattern
        } else {
            pattern.strip_suffix('/').unwrap_or(pattern)
        };

        let chars: Vec<char> = body.chars().collect();
        let mut src = String::from("^(?P<body>");
        let mut keys = Vec::new();
        let mut positional = 0usize;
        let mut i = 0;

        while i < chars.len() {
            match chars[i] {
                d @ ('/' | '.') if chars.get(i + 1) == Some(&':') => {
                    i = parse_param(pattern, &chars, i + 2, Some(d), &mut src, &mut keys)?;
                }
                ':' => {
                    i = parse_param(pattern, &chars, i + 1, None, &mut src, &mut keys)?;
                }
                '*' => {
                    src.push_str(&format!("(?P<p{}>.*)", keys.len()));
                    keys.push(Key {
                        name: positional.to_string(),
                        optional: false,
                    });
                    positional += 1;
                    i += 1;
                }
                c => {
                    push_literal(&mut src, c, options.case_sensitive);
                    i += 1;
                }
            }
        }

        src.push(')');
        if options.end {
            if !options.strict {
                src.push_str("/?");
            }
            src.push('$');
        } else {
            src.push_str("(?:/|$)");
        }

        let regex = Regex::new(&src).map_err(|e| Error::InvalidRoutePattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        let groups = (0..keys.len()).map(|idx| format!("p{idx}")).collect();

        Ok(Self {
            pattern: pattern.to_string(),
            regex,
            keys,
            groups,
            options,
        })
    }

    /// Match a path, returning the consumed prefix and decoded parameters.
    ///
    /// `Ok(None)` means the pattern does not apply. A capture that fails
    /// to percent-decode is an error rather than a mismatch.
    ///
    /// # Errors
    ///
    /// Returns `Error::ParamDecode` when a captured value is not valid
    /// percent-encoded UTF-8.
    pub fn matches(&self, path: &str) -> Result<Option<PathMatch>> {
        let Some(caps) = self.regex.captures(path) else {
            return Ok(None);
        };

        let whole_end = caps.get(0).map_or(0, |m| m.end());
        let body_end = caps.name("body").map_or(0, |m| m.end());
        let consumed = if self.options.end || (!self.options.strict && whole_end == path.len()) {
            whole_end
        } else {
            body_end
        };

        let mut params = Params::new();
        for (key, group) in self.keys.iter().zip(&self.groups) {
            let Some(raw) = caps.name(group) else {
                continue;
            };
            let value = decode_component(raw.as_str()).ok_or_else(|| Error::ParamDecode {
                name: key.name.clone(),
                value: raw.as_str().to_string(),
            })?;
            params.insert(key.name.clone(), value);
        }

        Ok(Some(PathMatch {
            path: path[..consumed].to_string(),
            params,
        }))
    }

    /// The source pattern
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Declared parameters, in declaration order
    #[must_use]
    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    /// Options the pattern was compiled with
    #[must_use]
    pub const fn options(&self) -> MatchOptions {
        self.options
    }
}

/// Parse `name`, an optional `(custom)` group and an optional `?` starting
/// at `start`. Returns the index just past the parameter.
fn parse_param(
    pattern: &str,
    chars: &[char],
    start: usize,
    delimiter: Option<char>,
    src: &mut String,
    keys: &mut Vec<Key>,
) -> Result<usize> {
    let invalid = |reason: &str| Error::InvalidRoutePattern {
        pattern: pattern.to_string(),
        reason: reason.to_string(),
    };

    let mut j = start;
    let mut name = String::new();
    while j < chars.len() && (chars[j].is_ascii_alphanumeric() || chars[j] == '_') {
        name.push(chars[j]);
        j += 1;
    }
    if name.is_empty() {
        return Err(invalid("missing parameter name after ':'"));
    }

    let mut custom = None;
    if chars.get(j) == Some(&'(') {
        let open = j + 1;
        let mut depth = 1usize;
        j = open;
        while j < chars.len() && depth > 0 {
            match chars[j] {
                '\\' => j += 1,
                '(' => depth += 1,
                ')' => depth -= 1,
                _ => {}
            }
            j += 1;
        }
        if depth != 0 {
            return Err(invalid("unbalanced parameter group"));
        }
        custom = Some(chars[open..j - 1].iter().collect::<String>());
    }

    let optional = chars.get(j) == Some(&'?');
    if optional {
        j += 1;
    }

    let capture = custom.unwrap_or_else(|| {
        if delimiter == Some('.') {
            "[^/.]+?".to_string()
        } else {
            "[^/]+?".to_string()
        }
    });
    let group = format!("(?P<p{}>{capture})", keys.len());
    let delim = delimiter.map(|d| regex::escape(&d.to_string())).unwrap_or_default();

    if optional {
        src.push_str(&format!("(?:{delim}{group})?"));
    } else {
        src.push_str(&delim);
        src.push_str(&group);
    }

    keys.push(Key { name, optional });
    Ok(j)
}

/// Literal characters; ASCII letters fold case unless matching is sensitive
fn push_literal(src: &mut String, c: char, case_sensitive: bool) {
    if !case_sensitive && c.is_ascii_alphabetic() {
        src.push('[');
        src.push(c.to_ascii_lowercase());
        src.push(c.to_ascii_uppercase());
        src.push(']');
    } else {
        src.push_str(&regex::escape(&c.to_string()));
    }
}

/// Strict percent-decoding of a URI component.
///
/// `+` is left alone. Returns `None` on a truncated or non-hex escape, or
/// when the decoded bytes are not UTF-8.
#[must_use]
pub fn decode_component(input: &str) -> Option<String> {
    if !input.contains('%') {
        return Some(input.to_string());
    }

    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hi = hex_value(*bytes.get(i + 1)?)?;
            let lo = hex_value(*bytes.get(i + 2)?)?;
            out.push((hi << 4) | lo);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

const fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
