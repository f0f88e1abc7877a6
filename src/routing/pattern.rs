use std::collections::HashSet;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::Error;
use crate::routing::Params;

static PARAM_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid parameter name regex"));

/// Format spec of a `{name:spec}` placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamSpec {
    /// `{name}`: one path segment.
    Segment,
    /// `{name:d}`: a signed integer.
    Integer,
    /// `{name:w}`: letters, digits and underscores.
    Word,
    /// `{name:f}`: a decimal number with a fractional part.
    Decimal,
}

impl ParamSpec {
    fn parse(spec: &str) -> Option<Self> {
        match spec {
            "" => Some(ParamSpec::Segment),
            "d" => Some(ParamSpec::Integer),
            "w" => Some(ParamSpec::Word),
            "f" => Some(ParamSpec::Decimal),
            _ => None,
        }
    }

    fn regex(&self) -> &'static str {
        match self {
            ParamSpec::Segment => r"[^/]+",
            ParamSpec::Integer => r"[-+]?\d+",
            ParamSpec::Word => r"\w+",
            ParamSpec::Decimal => r"[-+]?\d*\.\d+",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param { name: String, spec: ParamSpec },
}

/// A compiled route pattern such as `/add/{x:d}/{y:d}`.
///
/// A pattern matches a path only in full.
#[derive(Debug, Clone)]
pub struct RoutePattern {
    source: String,
    segments: Vec<Segment>,
    regex: Regex,
}

impl RoutePattern {
    pub fn parse(source: &str) -> Result<Self, Error> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut names = HashSet::new();
        let mut chars = source.chars();

        while let Some(c) = chars.next() {
            match c {
                '{' => {
                    let mut field = String::new();
                    let mut closed = false;
                    for c in chars.by_ref() {
                        match c {
                            '}' => {
                                closed = true;
                                break;
                            }
                            '{' => {
                                return Err(Error::route_declaration(format!(
                                    "nested '{{' in pattern '{}'",
                                    source
                                )))
                            }
                            other => field.push(other),
                        }
                    }
                    if !closed {
                        return Err(Error::route_declaration(format!(
                            "unclosed '{{' in pattern '{}'",
                            source
                        )));
                    }

                    let (name, spec) = field.split_once(':').unwrap_or((field.as_str(), ""));
                    if !PARAM_NAME_RE.is_match(name) {
                        return Err(Error::route_declaration(format!(
                            "invalid parameter name '{}' in pattern '{}'",
                            name, source
                        )));
                    }
                    let spec = ParamSpec::parse(spec).ok_or_else(|| {
                        Error::route_declaration(format!(
                            "unknown format spec '{}' for parameter '{}'",
                            spec, name
                        ))
                    })?;
                    if !names.insert(name.to_string()) {
                        return Err(Error::route_declaration(format!(
                            "duplicate parameter '{}' in pattern '{}'",
                            name, source
                        )));
                    }

                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Param {
                        name: name.to_string(),
                        spec,
                    });
                }
                '}' => {
                    return Err(Error::route_declaration(format!(
                        "unmatched '}}' in pattern '{}'",
                        source
                    )))
                }
                other => literal.push(other),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        let mut expression = String::from("^");
        for segment in &segments {
            match segment {
                Segment::Literal(text) => expression.push_str(&regex::escape(text)),
                Segment::Param { name, spec } => {
                    expression.push_str(&format!("(?P<{}>{})", name, spec.regex()))
                }
            }
        }
        expression.push('$');

        let regex = Regex::new(&expression)
            .map_err(|e| Error::route_declaration(format!("pattern '{}': {}", source, e)))?;

        Ok(RoutePattern {
            source: source.to_string(),
            segments,
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Param { name, .. } => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    pub fn matches(&self, path: &str) -> Option<Params> {
        let captures = self.regex.captures(path)?;
        let mut params = Params::new();
        for name in self.param_names() {
            if let Some(value) = captures.name(name) {
                params.insert(name, value.as_str());
            }
        }
        Some(params)
    }

    /// Build a path by filling the placeholders with `params`.
    pub fn url(&self, params: &Params) -> Result<String, Error> {
        let mut url = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => url.push_str(text),
                Segment::Param { name, .. } => {
                    let value = params
                        .get(name)
                        .ok_or_else(|| Error::RouteParameter(name.clone()))?;
                    url.push_str(value);
                }
            }
        }
        Ok(url)
    }
}

impl PartialEq for RoutePattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
