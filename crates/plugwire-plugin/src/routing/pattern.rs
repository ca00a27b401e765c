//! Path patterns.
//!
//! Syntax, one segment between each `/`:
//! - `literal` matches itself
//! - `:name` captures one non-empty segment
//! - `:name?` optional capture, final segment only
//! - `*` captures the remaining segments (at least one), final segment only,
//!   bound under the key `*`
//!
//! Matching is strict on segment count; a single trailing `/` on the path is
//! ignored.

use std::fmt;
use std::str::FromStr;

use plugwire_core::error::{PlugwireError, Result};

/// Key under which a trailing wildcard is bound.
pub const WILDCARD_KEY: &str = "*";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
    Optional(String),
    Wildcard,
}

/// A pattern compiled once at registration.
#[derive(Debug, Clone)]
pub struct Matcher {
    pattern: String,
    segments: Vec<Segment>,
}

impl Matcher {
    pub fn compile(pattern: &str) -> Result<Self> {
        let invalid = |why: &str| PlugwireError::InvalidRoute(format!("{pattern:?}: {why}"));

        let Some(rest) = pattern.strip_prefix('/') else {
            return Err(invalid("must start with '/'"));
        };
        let rest = rest.strip_suffix('/').unwrap_or(rest);

        let raw: Vec<&str> = if rest.is_empty() {
            Vec::new()
        } else {
            rest.split('/').collect()
        };

        let mut segments = Vec::with_capacity(raw.len());
        let mut names: Vec<&str> = Vec::new();
        let last = raw.len().saturating_sub(1);

        for (i, seg) in raw.iter().enumerate() {
            if seg.is_empty() {
                return Err(invalid("empty segment"));
            }
            if *seg == WILDCARD_KEY {
                if i != last {
                    return Err(invalid("'*' must be the last segment"));
                }
                segments.push(Segment::Wildcard);
                continue;
            }
            let Some(name) = seg.strip_prefix(':') else {
                segments.push(Segment::Literal(seg.to_string()));
                continue;
            };

            let (name, optional) = match name.strip_suffix('?') {
                Some(n) => (n, true),
                None => (name, false),
            };
            if name.is_empty() {
                return Err(invalid("empty parameter name"));
            }
            if optional && i != last {
                return Err(invalid("optional parameter must be the last segment"));
            }
            if names.contains(&name) {
                return Err(invalid("duplicate parameter name"));
            }
            names.push(name);

            segments.push(if optional {
                Segment::Optional(name.to_string())
            } else {
                Segment::Param(name.to_string())
            });
        }

        Ok(Self {
            pattern: pattern.to_string(),
            segments,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Parameter names in pattern order (`*` for a wildcard).
    pub fn param_names(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Literal(_) => None,
                Segment::Param(n) | Segment::Optional(n) => Some(n.as_str()),
                Segment::Wildcard => Some(WILDCARD_KEY),
            })
            .collect()
    }

    /// Match `path`, returning the captured parameters in pattern order.
    pub fn matches(&self, path: &str) -> Option<Params> {
        let rest = path.strip_prefix('/')?;
        let rest = rest.strip_suffix('/').unwrap_or(rest);
        let parts: Vec<&str> = if rest.is_empty() {
            Vec::new()
        } else {
            rest.split('/').collect()
        };

        let mut params = Params::default();
        for (i, seg) in self.segments.iter().enumerate() {
            match seg {
                Segment::Literal(lit) => {
                    if parts.get(i) != Some(&lit.as_str()) {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    let value = parts.get(i).filter(|v| !v.is_empty())?;
                    params.push(name, value);
                }
                Segment::Optional(name) => match parts.get(i) {
                    Some(v) if v.is_empty() => return None,
                    Some(v) => params.push(name, v),
                    None => {}
                },
                Segment::Wildcard => {
                    let tail = parts.get(i..).filter(|t| !t.is_empty())?;
                    params.push(WILDCARD_KEY, &tail.join("/"));
                    return Some(params);
                }
            }
        }

        if parts.len() > self.segments.len() {
            return None;
        }
        Some(params)
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern)
    }
}

/// Parameters extracted from a path, in pattern order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    entries: Vec<(String, String)>,
}

impl Params {
    fn push(&mut self, name: &str, value: &str) {
        self.entries.push((name.to_string(), value.to_string()));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Parse a captured segment.
    pub fn parse<T>(&self, name: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        let raw = self.get(name).ok_or_else(|| {
            PlugwireError::MalformedPayload(format!("missing path parameter {name:?}"))
        })?;
        raw.parse::<T>().map_err(|e| {
            PlugwireError::MalformedPayload(format!("path parameter {name:?}: {e}"))
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
