//! Path patterns (`/api/orders/{orderID}`) and upstream path templates.

use std::collections::HashSet;

use storefront_core::models::auth::UserId;

use super::RouteConfigError;

/// Template placeholder replaced by the session user id.
pub const SUBJECT_PLACEHOLDER: &str = "subject";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// Parameters captured from a matched path, in pattern order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams(Vec<(String, String)>);

impl PathParams {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Split an absolute path into its segments. `/` has none.
fn segments(path: &str) -> Option<Vec<&str>> {
    let rest = path.strip_prefix('/')?;
    if rest.is_empty() {
        return Some(Vec::new());
    }
    Some(rest.split('/').collect())
}

/// `.` or `..`, also when percent-encoded. URL parsing would resolve these
/// and change the path the upstream sees.
fn is_dot_segment(part: &str) -> bool {
    matches!(
        part.to_ascii_lowercase().replace("%2e", ".").as_str(),
        "." | ".."
    )
}

fn valid_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Inbound route pattern. Parameters occupy whole segments.
#[derive(Debug, Clone)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn parse(raw: &str) -> Result<Self, RouteConfigError> {
        let invalid = |reason: &str| RouteConfigError::InvalidPattern {
            pattern: raw.to_string(),
            reason: reason.to_string(),
        };

        let parts = segments(raw).ok_or_else(|| invalid("must start with '/'"))?;
        let mut seen = HashSet::new();
        let mut parsed = Vec::with_capacity(parts.len());
        for part in parts {
            if part.is_empty() {
                return Err(invalid("empty segment"));
            }
            if let Some(name) = part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
                if !valid_name(name) {
                    return Err(invalid("parameter names are ASCII alphanumerics or '_'"));
                }
                if !seen.insert(name) {
                    return Err(invalid("duplicate parameter name"));
                }
                parsed.push(Segment::Param(name.to_string()));
            } else if part.contains(['{', '}']) {
                return Err(invalid("parameters must span a whole segment"));
            } else {
                parsed.push(Segment::Literal(part.to_string()));
            }
        }

        Ok(Self {
            raw: raw.to_string(),
            segments: parsed,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Names of the parameters, in order.
    pub fn params(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Param(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    pub fn has_param(&self, name: &str) -> bool {
        self.params().any(|p| p == name)
    }

    /// Match a request path, capturing parameter text verbatim.
    pub fn match_path(&self, path: &str) -> Option<PathParams> {
        let parts = segments(path)?;
        if parts.len() != self.segments.len() {
            return None;
        }
        let mut params = Vec::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(lit) if lit == part => {}
                Segment::Param(name) if !part.is_empty() && !is_dot_segment(part) => {
                    params.push((name.clone(), part.to_string()));
                }
                _ => return None,
            }
        }
        Some(PathParams(params))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TemplatePart {
    Text(String),
    Placeholder(String),
}

/// Upstream path with `{param}` / `{subject}` placeholders.
#[derive(Debug, Clone)]
pub struct PathTemplate {
    raw: String,
    parts: Vec<TemplatePart>,
}

impl PathTemplate {
    pub fn parse(raw: &str) -> Result<Self, RouteConfigError> {
        let invalid = |reason: &str| RouteConfigError::InvalidTemplate {
            template: raw.to_string(),
            reason: reason.to_string(),
        };
        if !raw.starts_with('/') {
            return Err(invalid("must start with '/'"));
        }

        let mut parts = Vec::new();
        let mut rest = raw;
        while let Some(open) = rest.find('{') {
            let (text, tail) = rest.split_at(open);
            if text.contains('}') {
                return Err(invalid("unbalanced '}'"));
            }
            let close = tail.find('}').ok_or_else(|| invalid("unclosed '{'"))?;
            let name = &tail[1..close];
            if !valid_name(name) {
                return Err(invalid("bad placeholder name"));
            }
            if !text.is_empty() {
                parts.push(TemplatePart::Text(text.to_string()));
            }
            parts.push(TemplatePart::Placeholder(name.to_string()));
            rest = &tail[close + 1..];
        }
        if rest.contains('}') {
            return Err(invalid("unbalanced '}'"));
        }
        if !rest.is_empty() {
            parts.push(TemplatePart::Text(rest.to_string()));
        }

        Ok(Self {
            raw: raw.to_string(),
            parts,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().filter_map(|p| match p {
            TemplatePart::Placeholder(name) => Some(name.as_str()),
            TemplatePart::Text(_) => None,
        })
    }

    pub fn uses_subject(&self) -> bool {
        self.placeholders().any(|p| p == SUBJECT_PLACEHOLDER)
    }

    /// Substitute captured parameters and the subject. `None` when a
    /// placeholder has no value.
    pub fn render(&self, params: &PathParams, subject: Option<UserId>) -> Option<String> {
        let mut out = String::with_capacity(self.raw.len() + 36);
        for part in &self.parts {
            match part {
                TemplatePart::Text(text) => out.push_str(text),
                TemplatePart::Placeholder(name) if name == SUBJECT_PLACEHOLDER => {
                    out.push_str(&subject?.to_string());
                }
                TemplatePart::Placeholder(name) => out.push_str(params.get(name)?),
            }
        }
        Some(out)
    }
}
