use std::fmt;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

use crate::ContractError;

/// Characters escaped when a parameter value is rendered into a path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Param(String),
}

/// Parsed route path such as `/users/{id}/posts`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl PathTemplate {
    pub fn parse(raw: &str) -> Result<Self, ContractError> {
        let invalid = |reason: &str| ContractError::InvalidPath {
            path: raw.to_string(),
            reason: reason.to_string(),
        };

        let Some(rest) = raw.strip_prefix('/') else {
            return Err(invalid("must start with '/'"));
        };
        if rest.is_empty() {
            return Ok(Self {
                raw: raw.to_string(),
                segments: Vec::new(),
            });
        }

        let mut segments = Vec::new();
        for part in rest.split('/') {
            if part.is_empty() {
                return Err(invalid("empty segment"));
            }
            if let Some(name) = part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
                if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                {
                    return Err(invalid("parameter names must be [A-Za-z0-9_]+"));
                }
                if segments
                    .iter()
                    .any(|s| matches!(s, Segment::Param(p) if p == name))
                {
                    return Err(invalid("parameter declared twice"));
                }
                segments.push(Segment::Param(name.to_string()));
                continue;
            }
            if part.contains(['{', '}']) {
                return Err(invalid("parameters must span a whole segment"));
            }
            if part.starts_with([':', '*']) {
                return Err(invalid("segments must not start with ':' or '*'"));
            }
            segments.push(Segment::Literal(part.to_string()));
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Path with parameter names erased; two templates with the same shape match the same URLs.
    pub fn shape(&self) -> String {
        if self.segments.is_empty() {
            return "/".to_string();
        }
        let mut out = String::new();
        for segment in &self.segments {
            out.push('/');
            match segment {
                Segment::Literal(lit) => out.push_str(lit),
                Segment::Param(_) => out.push_str("{}"),
            }
        }
        out
    }

    pub fn params(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Param(name) => Some(name.as_str()),
                Segment::Literal(_) => None,
            })
            .collect()
    }

    /// Match a concrete request path, returning decoded parameter values in declaration order.
    pub fn match_path(&self, path: &str) -> Option<Vec<(String, String)>> {
        let rest = path.strip_prefix('/')?;
        let parts: Vec<&str> = if rest.is_empty() {
            Vec::new()
        } else {
            rest.split('/').collect()
        };
        if parts.len() != self.segments.len() {
            return None;
        }
        let mut params = Vec::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(lit) => {
                    if lit != part {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    let value = percent_decode_str(part).decode_utf8().ok()?;
                    params.push((name.clone(), value.into_owned()));
                }
            }
        }
        Some(params)
    }

    /// Render a concrete path, asking `lookup` for each parameter value.
    /// Returns the name of the first parameter `lookup` could not supply.
    pub fn render<F>(&self, mut lookup: F) -> Result<String, String>
    where
        F: FnMut(&str) -> Option<String>,
    {
        if self.segments.is_empty() {
            return Ok("/".to_string());
        }
        let mut out = String::new();
        for segment in &self.segments {
            out.push('/');
            match segment {
                Segment::Literal(lit) => out.push_str(lit),
                Segment::Param(name) => {
                    let value = lookup(name).ok_or_else(|| name.clone())?;
                    out.extend(utf8_percent_encode(&value, SEGMENT));
                }
            }
        }
        Ok(out)
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_root_and_params() {
        let root = PathTemplate::parse("/").unwrap();
        assert!(root.segments().is_empty());
        assert_eq!(root.shape(), "/");

        let t = PathTemplate::parse("/users/{id}/posts/{post_id}").unwrap();
        assert_eq!(t.params(), vec!["id", "post_id"]);
        assert_eq!(t.shape(), "/users/{}/posts/{}");
    }

    #[test]
    fn rejects_malformed_templates() {
        for bad in [
            "",
            "users",
            "/users/",
            "//",
            "/a//b",
            "/users/{}",
            "/users/{id-x}",
            "/users/x{id}",
            "/users/{id}/{id}",
            "/users/:id",
            "/files/*rest",
        ] {
            assert!(PathTemplate::parse(bad).is_err(), "{bad:?} should fail");
        }
    }

    #[test]
    fn matches_and_decodes() {
        let t = PathTemplate::parse("/users/{id}").unwrap();
        assert_eq!(
            t.match_path("/users/a%20b"),
            Some(vec![("id".to_string(), "a b".to_string())])
        );
        assert_eq!(t.match_path("/users"), None);
        assert_eq!(t.match_path("/people/1"), None);
        assert_eq!(PathTemplate::parse("/").unwrap().match_path("/"), Some(vec![]));
    }

    #[test]
    fn renders_with_encoding() {
        let t = PathTemplate::parse("/files/{name}").unwrap();
        let rendered = t
            .render(|name| (name == "name").then(|| "a/b c".to_string()))
            .unwrap();
        assert_eq!(rendered, "/files/a%2Fb%20c");
        assert_eq!(t.match_path(&rendered).unwrap()[0].1, "a/b c");
        assert_eq!(t.render(|_| None), Err("name".to_string()));
    }
}
