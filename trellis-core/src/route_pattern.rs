// Route template compilation
//
// Templates are literal text with `{name}` placeholders. Each placeholder
// matches one non-empty path segment.

use crate::Error;
use http::Method;
use regex::Regex;
use std::fmt;

const SEGMENT: &str = "([^/]+)";

/// A route template compiled to an anchored regular expression.
#[derive(Clone)]
pub struct CompiledPath {
    template: String,
    regex: Regex,
    names: Vec<String>,
}

impl CompiledPath {
    /// Compile `template` in one left-to-right scan.
    ///
    /// `method` is only used to describe the route in errors.
    pub fn compile(template: &str, method: &Method) -> Result<Self, Error> {
        let mut pattern = String::with_capacity(template.len() + 8);
        let mut names = Vec::new();
        pattern.push('^');

        let mut rest = template;
        while let Some(open) = rest.find('{') {
            pattern.push_str(&regex::escape(&rest[..open]));

            let after = &rest[open + 1..];
            let close = after.find('}').ok_or_else(|| Error::UnterminatedParameter {
                path: template.to_string(),
                method: method.to_string(),
            })?;

            names.push(after[..close].to_string());
            pattern.push_str(SEGMENT);
            rest = &after[close + 1..];
        }
        pattern.push_str(&regex::escape(rest));
        pattern.push('$');

        let regex = Regex::new(&pattern).map_err(|err| Error::InvalidPattern {
            path: template.to_string(),
            reason: err.to_string(),
        })?;

        Ok(Self {
            template: template.to_string(),
            regex,
            names,
        })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Placeholder names in template order.
    pub fn param_names(&self) -> &[String] {
        &self.names
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    /// Extract placeholder values from `path`, or `None` if it does not match.
    pub fn captures(&self, path: &str) -> Option<PathParams> {
        let captures = self.regex.captures(path)?;
        let values = self
            .names
            .iter()
            .enumerate()
            .filter_map(|(index, name)| {
                captures
                    .get(index + 1)
                    .map(|value| (name.clone(), value.as_str().to_string()))
            })
            .collect();
        Some(PathParams(values))
    }
}

impl fmt::Debug for CompiledPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledPath")
            .field("template", &self.template)
            .field("regex", &self.regex.as_str())
            .finish()
    }
}

/// Values captured from a matched path, in template order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams(Vec<(String, String)>);

impl PathParams {
    /// Value for `name`; with repeated names the first capture wins.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
