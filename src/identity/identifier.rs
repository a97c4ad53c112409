//! Identifier value type and its qualified-string codec

use crate::error::{IdentityError, IdentityResult};

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

/// Separator between components in the qualified form
pub const COMPONENT_SEPARATOR: char = '.';

/// Separator between a component's name and value
pub const NAME_VALUE_SEPARATOR: char = '=';

/// Component names are plain tokens; values may contain anything
static NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_\-]+$").expect("Invalid component name regex"));

/// A single typed `name=value` element of an identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Component {
    name: String,
    value: String,
}

impl Component {
    /// Create a component, validating the name
    pub fn new(name: &str, value: &str) -> IdentityResult<Self> {
        if !NAME_REGEX.is_match(name) {
            return Err(IdentityError::InvalidName(name.to_string()));
        }
        Ok(Self {
            name: name.to_string(),
            value: value.to_string(),
        })
    }

    /// Component name (the type of the element)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Component value
    pub fn value(&self) -> &str {
        &self.value
    }

    fn render_into(&self, out: &mut String) {
        out.push_str(&self.name);
        out.push(NAME_VALUE_SEPARATOR);
        escape_into(&self.value, out);
    }
}

/// Ordered, non-empty sequence of components
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier {
    components: Vec<Component>,
}

impl Identifier {
    /// Create a single-component identifier
    pub fn new(name: &str, value: &str) -> IdentityResult<Self> {
        Ok(Self {
            components: vec![Component::new(name, value)?],
        })
    }

    /// Build from components, rejecting an empty list
    pub fn from_components(components: Vec<Component>) -> IdentityResult<Self> {
        if components.is_empty() {
            return Err(IdentityError::Empty);
        }
        Ok(Self { components })
    }

    /// Parse a qualified string such as `function=ingest.hash=abc123`
    pub fn parse(qualified: &str) -> IdentityResult<Self> {
        if qualified.is_empty() {
            return Err(IdentityError::Empty);
        }

        let components = qualified
            .split(COMPONENT_SEPARATOR)
            .map(|raw| {
                let (name, value) = raw.split_once(NAME_VALUE_SEPARATOR).ok_or_else(|| {
                    IdentityError::MalformedComponent {
                        qualified: qualified.to_string(),
                        component: raw.to_string(),
                    }
                })?;
                Component::new(name, &unescape(value)?)
            })
            .collect::<IdentityResult<Vec<_>>>()?;

        Self::from_components(components)
    }

    /// Render the qualified string form
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.components.len() * 16);
        for (idx, component) in self.components.iter().enumerate() {
            if idx > 0 {
                out.push(COMPONENT_SEPARATOR);
            }
            component.render_into(&mut out);
        }
        out
    }

    /// Values only, joined by the component separator (unescaped)
    pub fn unqualified(&self) -> String {
        self.components
            .iter()
            .map(Component::value)
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Identifier with the trailing component removed
    pub fn parent(&self) -> IdentityResult<Self> {
        if self.components.len() < 2 {
            return Err(IdentityError::EmptyIdentifier(self.render()));
        }
        Ok(Self {
            components: self.components[..self.components.len() - 1].to_vec(),
        })
    }

    /// Identifier with one more trailing component
    pub fn child(&self, name: &str, value: &str) -> IdentityResult<Self> {
        let mut components = self.components.clone();
        components.push(Component::new(name, value)?);
        Ok(Self { components })
    }

    /// Value of the first component with the given name
    pub fn component(&self, name: &str) -> Option<&str> {
        self.components
            .iter()
            .find(|c| c.name == name)
            .map(Component::value)
    }

    /// Trailing component
    pub fn last(&self) -> &Component {
        // Non-empty by construction
        &self.components[self.components.len() - 1]
    }

    /// All components in order
    pub fn components(&self) -> &[Component] {
        &self.components
    }

    /// Number of components
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Always false; kept for API symmetry with `len`
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl FromStr for Identifier {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Identifier {
    type Error = IdentityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Identifier> for String {
    fn from(id: Identifier) -> Self {
        id.render()
    }
}

fn escape_into(value: &str, out: &mut String) {
    for ch in value.chars() {
        match ch {
            '%' => out.push_str("%25"),
            '.' => out.push_str("%2E"),
            '=' => out.push_str("%3D"),
            other => out.push(other),
        }
    }
}

fn unescape(value: &str) -> IdentityResult<String> {
    if !value.contains('%') {
        return Ok(value.to_string());
    }

    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != '%' {
            out.push(ch);
            continue;
        }
        let hex: String = chars.by_ref().take(2).collect();
        match hex.as_str() {
            "25" => out.push('%'),
            "2E" | "2e" => out.push('.'),
            "3D" | "3d" => out.push('='),
            _ => return Err(IdentityError::InvalidEscape(value.to_string())),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_render() {
        let id = Identifier::parse("deployment=mesh.site=site-a.pod=pod-1").unwrap();
        assert_eq!(id.len(), 3);
        assert_eq!(id.component("site"), Some("site-a"));
        assert_eq!(id.component("missing"), None);
        assert_eq!(id.render(), "deployment=mesh.site=site-a.pod=pod-1");
        assert_eq!(id.unqualified(), "mesh.site-a.pod-1");
    }

    #[test]
    fn test_values_with_separators_round_trip() {
        let id = Identifier::new("host", "node.example.com")
            .unwrap()
            .child("expr", "a=b%c")
            .unwrap();
        let rendered = id.render();
        assert_eq!(rendered, "host=node%2Eexample%2Ecom.expr=a%3Db%25c");

        let parsed = Identifier::parse(&rendered).unwrap();
        assert_eq!(parsed, id);
        assert_eq!(parsed.component("host"), Some("node.example.com"));
    }

    #[test]
    fn test_semicolons_stay_inside_value() {
        let id = Identifier::parse("function=ingest;hash=abc123").unwrap();
        assert_eq!(id.len(), 1);
        assert_eq!(id.component("function"), Some("ingest;hash=abc123"));
        assert_eq!(Identifier::parse(&id.render()).unwrap(), id);
    }

    #[test]
    fn test_parent() {
        let id = Identifier::parse("a=1.b=2.c=3").unwrap();
        let parent = id.parent().unwrap();
        assert_eq!(parent.render(), "a=1.b=2");
        assert_eq!(parent.parent().unwrap().render(), "a=1");

        let root = Identifier::new("a", "1").unwrap();
        assert!(matches!(root.parent(), Err(IdentityError::EmptyIdentifier(_))));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(Identifier::parse(""), Err(IdentityError::Empty));
        assert!(matches!(
            Identifier::parse("a=1.broken"),
            Err(IdentityError::MalformedComponent { .. })
        ));
        assert!(matches!(
            Identifier::parse("bad name=1"),
            Err(IdentityError::InvalidName(_))
        ));
        assert!(matches!(
            Identifier::parse("a=%zz"),
            Err(IdentityError::InvalidEscape(_))
        ));
    }

    #[test]
    fn test_serde_uses_qualified_form() {
        let id = Identifier::parse("wup=ingest-1.instance=7").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"wup=ingest-1.instance=7\"");

        let back: Identifier = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);

        assert!(serde_json::from_str::<Identifier>("\"nope\"").is_err());
    }
}
