//! Serialized form of a permission model.
//!
//! Names are written `prefix:local`, with prefixes bound in `namespaces`.
//! A permission is referred to either by bare name, resolved within the
//! enclosing permission set and then across the model, or by
//! `{ "type": "prefix:local", "name": "..." }`.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use warden_types::{AccessStatus, RequirementScope};

use crate::{ModelError, Result};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelDefinition {
    #[serde(default)]
    pub namespaces: BTreeMap<String, String>,

    #[serde(default)]
    pub classes: Vec<ClassDef>,

    #[serde(default)]
    pub permission_sets: Vec<PermissionSetDef>,

    #[serde(default)]
    pub global_permissions: Vec<GlobalPermissionDef>,
}

impl ModelDefinition {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&contents)
    }
}

/// A node type or aspect
#[derive(Debug, Clone, Deserialize)]
pub struct ClassDef {
    pub name: String,

    #[serde(default)]
    pub parent: Option<String>,

    #[serde(default)]
    pub aspect: bool,
}

/// Permissions and groups owned by one class
#[derive(Debug, Clone, Deserialize)]
pub struct PermissionSetDef {
    #[serde(rename = "type")]
    pub class: String,

    #[serde(default)]
    pub groups: Vec<GroupDef>,

    #[serde(default)]
    pub permissions: Vec<PermissionDef>,
}

/// An aggregate permission name
#[derive(Debug, Clone, Deserialize)]
pub struct GroupDef {
    pub name: String,

    #[serde(default = "default_true")]
    pub expose: bool,

    /// A full control group grants every permission in the model
    #[serde(default)]
    pub allow_full_control: bool,

    #[serde(default)]
    pub includes: Vec<RefDef>,
}

/// An atomic, independently testable permission
#[derive(Debug, Clone, Deserialize)]
pub struct PermissionDef {
    pub name: String,

    #[serde(default)]
    pub expose: bool,

    #[serde(default)]
    pub granted_to_groups: Vec<RefDef>,

    #[serde(default)]
    pub requires: Vec<RequirementDef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequirementDef {
    pub name: String,

    #[serde(rename = "type", default)]
    pub class: Option<String>,

    pub on: RequirementScope,
}

impl RequirementDef {
    pub fn reference(&self) -> RefDef {
        match &self.class {
            Some(class) => RefDef::Qualified {
                class: class.clone(),
                name: self.name.clone(),
            },
            None => RefDef::Name(self.name.clone()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RefDef {
    Name(String),
    Qualified {
        #[serde(rename = "type")]
        class: String,
        name: String,
    },
}

impl RefDef {
    pub fn name(&self) -> &str {
        match self {
            RefDef::Name(name) => name,
            RefDef::Qualified { name, .. } => name,
        }
    }
}

/// An entry that applies on every node
#[derive(Debug, Clone, Deserialize)]
pub struct GlobalPermissionDef {
    pub authority: String,

    pub permission: RefDef,

    #[serde(default = "default_access")]
    pub access: AccessStatus,
}

fn default_true() -> bool {
    true
}

fn default_access() -> AccessStatus {
    AccessStatus::Allowed
}

/// Split `prefix:local` and resolve the prefix
pub fn resolve_qname(
    namespaces: &BTreeMap<String, String>,
    value: &str,
) -> Result<warden_types::QName> {
    let (prefix, local) = value
        .split_once(':')
        .ok_or_else(|| ModelError::InvalidName(value.to_string()))?;
    if local.is_empty() {
        return Err(ModelError::InvalidName(value.to_string()));
    }
    let uri = namespaces
        .get(prefix)
        .ok_or_else(|| ModelError::UnknownPrefix(prefix.to_string()))?;
    Ok(warden_types::QName::new(uri.clone(), local))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_definition() {
        let def = ModelDefinition::from_json(
            r#"{
                "namespaces": { "sys": "urn:sys" },
                "classes": [ { "name": "sys:base" } ],
                "permission_sets": [{
                    "type": "sys:base",
                    "groups": [ { "name": "Read", "includes": ["ReadProperties", { "type": "sys:base", "name": "ReadContent" }] } ],
                    "permissions": [ { "name": "_Read", "granted_to_groups": ["Read"], "requires": [ { "name": "_Read", "on": "parent" } ] } ]
                }],
                "global_permissions": [ { "authority": "ROLE_ADMINISTRATOR", "permission": "FullControl" } ]
            }"#,
        )
        .unwrap();

        let set = &def.permission_sets[0];
        assert!(set.groups[0].expose);
        assert!(!set.groups[0].allow_full_control);
        assert!(matches!(set.groups[0].includes[1], RefDef::Qualified { .. }));
        assert!(!set.permissions[0].expose);
        assert_eq!(set.permissions[0].requires[0].on, RequirementScope::Parent);
        assert_eq!(def.global_permissions[0].access, AccessStatus::Allowed);
    }

    #[test]
    fn test_resolve_qname() {
        let mut namespaces = BTreeMap::new();
        namespaces.insert("cm".to_string(), "urn:cm".to_string());

        let qname = resolve_qname(&namespaces, "cm:folder").unwrap();
        assert_eq!(qname.to_string(), "{urn:cm}folder");
        assert!(matches!(
            resolve_qname(&namespaces, "xx:folder"),
            Err(ModelError::UnknownPrefix(_))
        ));
        assert!(matches!(
            resolve_qname(&namespaces, "folder"),
            Err(ModelError::InvalidName(_))
        ));
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            ModelDefinition::from_json("{ not json"),
            Err(ModelError::Parse(_))
        ));
    }
}
