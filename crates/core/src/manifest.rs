//! DESCRIPTION manifest parsing.
//!
//! The manifest is an RFC822-style key/value block: one `Key: value` pair
//! per line, with indented continuation lines folded into the previous
//! value. The `Built` field is decomposed into a nested structure, and the
//! fixed set of dependency fields is flattened into a single ordered edge
//! list.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The classification of a dependency edge, derived from which manifest
/// field listed it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DependencyRole {
    Depends,
    Imports,
    Suggests,
    LinkingTo,
    Enhances,
}

impl DependencyRole {
    /// Dependency-section field names, in the order they are flattened.
    pub const FIELDS: [DependencyRole; 5] = [
        Self::Depends,
        Self::Imports,
        Self::Suggests,
        Self::LinkingTo,
        Self::Enhances,
    ];

    pub fn field_name(&self) -> &'static str {
        match self {
            Self::Depends => "Depends",
            Self::Imports => "Imports",
            Self::Suggests => "Suggests",
            Self::LinkingTo => "LinkingTo",
            Self::Enhances => "Enhances",
        }
    }
}

impl fmt::Display for DependencyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field_name())
    }
}

/// One dependency edge: target package, optional version constraint, and
/// the role it was listed under.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub package: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraint: Option<String>,
    pub role: DependencyRole,
}

/// The nested `Built` field of a binary manifest.
///
/// Serialized form: `R 4.3.1; x86_64-pc-linux-gnu; 2023-07-21 00:11:17 UTC; unix`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuiltInfo {
    /// Toolchain version the bundle was built with (e.g. "4.3.1").
    pub r: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ostype: Option<String>,
}

impl BuiltInfo {
    /// Parse the semicolon-separated `Built` value.
    pub fn parse(value: &str) -> crate::Result<Self> {
        let mut parts = value.split(';').map(str::trim);
        let r = parts
            .next()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| crate::Error::ManifestParse("empty Built field".to_string()))?;
        let r = r.strip_prefix("R ").unwrap_or(r).to_string();

        let non_empty = |p: Option<&str>| p.filter(|s| !s.is_empty()).map(str::to_string);
        Ok(Self {
            r,
            platform: non_empty(parts.next()),
            date: non_empty(parts.next()),
            ostype: non_empty(parts.next()),
        })
    }

    /// The `major.minor` prefix of the toolchain version.
    pub fn platform_major(&self) -> Option<String> {
        let mut it = self.r.split('.');
        match (it.next(), it.next()) {
            (Some(major), Some(minor)) => Some(format!("{major}.{minor}")),
            _ => None,
        }
    }

    /// Extract a known CPU architecture from the platform triple.
    pub fn architecture(&self) -> Option<String> {
        let platform = self.platform.as_deref()?;
        ["x86_64", "aarch64", "arm64", "i386"]
            .iter()
            .find(|arch| platform.contains(*arch))
            .map(|arch| arch.to_string())
    }
}

/// A parsed manifest: remaining scalar fields plus the decomposed `Built`
/// structure and flattened dependency edges.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Manifest {
    pub fields: BTreeMap<String, String>,
    pub built: Option<BuiltInfo>,
    pub dependencies: Vec<DependencyEdge>,
}

impl Manifest {
    /// Parse a manifest text block.
    pub fn parse(text: &str) -> crate::Result<Self> {
        let mut fields: BTreeMap<String, String> = BTreeMap::new();
        let mut current: Option<String> = None;

        for (lineno, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            if line.starts_with(' ') || line.starts_with('\t') {
                // Folded continuation of the previous field.
                let key = current.as_ref().ok_or_else(|| {
                    crate::Error::ManifestParse(format!(
                        "line {}: continuation without a field",
                        lineno + 1
                    ))
                })?;
                let value = fields.get_mut(key).ok_or_else(|| {
                    crate::Error::ManifestParse(format!(
                        "line {}: continuation without a field",
                        lineno + 1
                    ))
                })?;
                value.push(' ');
                value.push_str(line.trim());
            } else {
                let (key, value) = line.split_once(':').ok_or_else(|| {
                    crate::Error::ManifestParse(format!("line {}: missing ':'", lineno + 1))
                })?;
                let key = key.trim().to_string();
                if key.is_empty() {
                    return Err(crate::Error::ManifestParse(format!(
                        "line {}: empty field name",
                        lineno + 1
                    )));
                }
                fields.insert(key.clone(), value.trim().to_string());
                current = Some(key);
            }
        }

        // Compound-path field names cannot be stored; drop them.
        let dotted: Vec<String> = fields
            .keys()
            .filter(|k| k.contains('.'))
            .cloned()
            .collect();
        for key in dotted {
            tracing::warn!(field = %key, "dropping manifest field with dotted name");
            fields.remove(&key);
        }

        let built = match fields.remove("Built") {
            Some(value) => Some(BuiltInfo::parse(&value)?),
            None => None,
        };

        let mut dependencies = Vec::new();
        for role in DependencyRole::FIELDS {
            if let Some(value) = fields.remove(role.field_name()) {
                parse_dependency_field(&value, role, &mut dependencies);
            }
        }

        Ok(Self {
            fields,
            built,
            dependencies,
        })
    }

    /// Get a scalar field value.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Take a scalar field value out of the manifest.
    pub fn take_field(&mut self, name: &str) -> Option<String> {
        self.fields.remove(name)
    }
}

/// Split a dependency field value into edges.
///
/// Entries are comma separated; each entry is `name` or `name (constraint)`.
fn parse_dependency_field(value: &str, role: DependencyRole, out: &mut Vec<DependencyEdge>) {
    for entry in value.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (package, constraint) = match entry.split_once('(') {
            Some((name, rest)) => {
                let constraint = rest.trim_end_matches(')').trim().to_string();
                let constraint = (!constraint.is_empty()).then_some(constraint);
                (name.trim().to_string(), constraint)
            }
            None => (entry.to_string(), None),
        };
        if package.is_empty() {
            continue;
        }
        out.push(DependencyEdge {
            package,
            constraint,
            role,
        });
    }
}
