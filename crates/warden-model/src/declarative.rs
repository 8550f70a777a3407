//! Permission model built from a [`ModelDefinition`], with granting and
//! grantee closures precomputed at construction.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;
use warden_const::{ALL_PERMISSIONS, BASE_TYPE_NAME, SECURITY_MODEL_URI};
use warden_types::{PermissionEntry, PermissionReference, QName, RequirementScope};

use crate::definition::{resolve_qname, ModelDefinition, RefDef};
use crate::{InternTable, ModelError, PermissionModel, Result};

#[derive(Debug)]
struct GroupInfo {
    expose: bool,
}

#[derive(Debug)]
struct PermissionInfo {
    class: QName,
    expose: bool,
    requires: Vec<(PermissionReference, RequirementScope)>,
}

pub struct DeclarativeModel {
    interns: Arc<InternTable>,
    class_parents: HashMap<QName, Option<QName>>,
    groups: HashMap<PermissionReference, GroupInfo>,
    permissions: HashMap<PermissionReference, PermissionInfo>,
    by_class: HashMap<QName, Vec<PermissionReference>>,
    by_name: HashMap<String, Vec<PermissionReference>>,
    grantees: HashMap<PermissionReference, BTreeSet<PermissionReference>>,
    granters: HashMap<PermissionReference, BTreeSet<PermissionReference>>,
    global_entries: Vec<PermissionEntry>,
    all: PermissionReference,
    legacy_all: PermissionReference,
}

impl DeclarativeModel {
    pub fn from_definition(definition: &ModelDefinition) -> Result<Self> {
        Self::with_interns(definition, Arc::new(InternTable::new()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Self::from_definition(&ModelDefinition::from_json(json)?)
    }

    /// Build against an existing intern table, so references handed out
    /// elsewhere stay identical to the model's
    pub fn with_interns(definition: &ModelDefinition, interns: Arc<InternTable>) -> Result<Self> {
        let all = interns.get(&QName::new(SECURITY_MODEL_URI, BASE_TYPE_NAME), ALL_PERMISSIONS);
        let legacy_all = interns.get(&QName::new("", ALL_PERMISSIONS), ALL_PERMISSIONS);

        let mut model = Self {
            interns,
            class_parents: HashMap::new(),
            groups: HashMap::new(),
            permissions: HashMap::new(),
            by_class: HashMap::new(),
            by_name: HashMap::new(),
            grantees: HashMap::new(),
            granters: HashMap::new(),
            global_entries: Vec::new(),
            all,
            legacy_all,
        };

        model.load_classes(definition)?;
        model.declare(definition)?;
        let edges = model.link(definition)?;
        model.close(&edges);
        model.load_globals(definition)?;

        debug!(
            classes = model.class_parents.len(),
            groups = model.groups.len(),
            permissions = model.permissions.len(),
            globals = model.global_entries.len(),
            "Built permission model"
        );
        Ok(model)
    }

    pub fn interns(&self) -> &Arc<InternTable> {
        &self.interns
    }

    fn load_classes(&mut self, definition: &ModelDefinition) -> Result<()> {
        let ns = &definition.namespaces;
        for class in &definition.classes {
            let name = resolve_qname(ns, &class.name)?;
            let parent = class
                .parent
                .as_deref()
                .map(|p| resolve_qname(ns, p))
                .transpose()?;
            if self.class_parents.insert(name, parent).is_some() {
                return Err(ModelError::Duplicate(class.name.clone()));
            }
        }

        for (class, parent) in &self.class_parents {
            if let Some(parent) = parent {
                if !self.class_parents.contains_key(parent) {
                    return Err(ModelError::UnknownClass(format!("{parent} (parent of {class})")));
                }
            }
        }
        Ok(())
    }

    fn class(&self, definition: &ModelDefinition, name: &str) -> Result<QName> {
        let qname = resolve_qname(&definition.namespaces, name)?;
        if !self.class_parents.contains_key(&qname) {
            return Err(ModelError::UnknownClass(name.to_string()));
        }
        Ok(qname)
    }

    fn is_defined(&self, permission: &PermissionReference) -> bool {
        self.groups.contains_key(permission) || self.permissions.contains_key(permission)
    }

    fn declare(&mut self, definition: &ModelDefinition) -> Result<()> {
        for set in &definition.permission_sets {
            let class = self.class(definition, &set.class)?;

            let declared = set
                .groups
                .iter()
                .map(|g| (g.name.as_str(), true, g.expose))
                .chain(set.permissions.iter().map(|p| (p.name.as_str(), false, p.expose)));

            for (name, is_group, expose) in declared {
                let reference = self.interns.get(&class, name);
                if self.is_defined(&reference) || name == ALL_PERMISSIONS {
                    return Err(ModelError::Duplicate(reference.to_string()));
                }
                if is_group {
                    self.groups.insert(reference.clone(), GroupInfo { expose });
                } else {
                    self.permissions.insert(
                        reference.clone(),
                        PermissionInfo {
                            class: class.clone(),
                            expose,
                            requires: Vec::new(),
                        },
                    );
                }
                self.by_class
                    .entry(class.clone())
                    .or_default()
                    .push(reference.clone());
                self.by_name
                    .entry(name.to_string())
                    .or_default()
                    .push(reference);
            }
        }
        Ok(())
    }

    fn resolve(
        &self,
        definition: &ModelDefinition,
        scope: Option<&QName>,
        reference: &RefDef,
    ) -> Result<PermissionReference> {
        match reference {
            RefDef::Qualified { class, name } => {
                let qname = resolve_qname(&definition.namespaces, class)?;
                if name == ALL_PERMISSIONS {
                    return Ok(self.all.clone());
                }
                self.interns
                    .find(&qname, name)
                    .filter(|r| self.is_defined(r))
                    .ok_or_else(|| ModelError::UnknownPermission(format!("{class}.{name}")))
            }
            RefDef::Name(name) => {
                if name == ALL_PERMISSIONS {
                    return Ok(self.all.clone());
                }
                if let Some(local) = scope
                    .and_then(|class| self.interns.find(class, name))
                    .filter(|r| self.is_defined(r))
                {
                    return Ok(local);
                }
                match self.by_name.get(name).map(Vec::as_slice) {
                    Some([only]) => Ok(only.clone()),
                    Some([_, _, ..]) => Err(ModelError::AmbiguousPermission(name.clone())),
                    _ => Err(ModelError::UnknownPermission(name.clone())),
                }
            }
        }
    }

    /// Resolve every cross reference; returns the direct "grants" edges
    fn link(
        &mut self,
        definition: &ModelDefinition,
    ) -> Result<HashMap<PermissionReference, BTreeSet<PermissionReference>>> {
        let mut edges: HashMap<PermissionReference, BTreeSet<PermissionReference>> =
            HashMap::new();
        let mut full_control = Vec::new();

        for set in &definition.permission_sets {
            let class = self.class(definition, &set.class)?;

            for group in &set.groups {
                let reference = self.interns.get(&class, &group.name);
                if group.allow_full_control {
                    full_control.push(reference.clone());
                }
                for include in &group.includes {
                    let included = self.resolve(definition, Some(&class), include)?;
                    edges.entry(reference.clone()).or_default().insert(included);
                }
            }

            for permission in &set.permissions {
                let reference = self.interns.get(&class, &permission.name);
                for group in &permission.granted_to_groups {
                    let granter = self.resolve(definition, Some(&class), group)?;
                    edges.entry(granter).or_default().insert(reference.clone());
                }

                let mut requires = Vec::with_capacity(permission.requires.len());
                for requirement in &permission.requires {
                    let required = self.resolve(definition, Some(&class), &requirement.reference())?;
                    requires.push((required, requirement.on));
                }
                if let Some(info) = self.permissions.get_mut(&reference) {
                    info.requires = requires;
                }
            }
        }

        let mut everything: BTreeSet<PermissionReference> = self
            .groups
            .keys()
            .chain(self.permissions.keys())
            .cloned()
            .collect();
        everything.insert(self.all.clone());
        everything.insert(self.legacy_all.clone());
        for reference in full_control {
            edges.insert(reference, everything.clone());
        }

        Ok(edges)
    }

    fn close(&mut self, edges: &HashMap<PermissionReference, BTreeSet<PermissionReference>>) {
        let defined: Vec<PermissionReference> = self
            .groups
            .keys()
            .chain(self.permissions.keys())
            .cloned()
            .collect();

        for start in defined {
            let mut reached = BTreeSet::new();
            let mut pending = vec![start.clone()];
            while let Some(current) = pending.pop() {
                if !reached.insert(current.clone()) {
                    continue;
                }
                if let Some(next) = edges.get(&current) {
                    pending.extend(next.iter().filter(|n| !reached.contains(*n)).cloned());
                }
            }
            self.grantees.insert(start, reached);
        }

        for (granter, grantees) in &self.grantees {
            for grantee in grantees {
                self.granters
                    .entry(grantee.clone())
                    .or_default()
                    .insert(granter.clone());
            }
        }
    }

    fn load_globals(&mut self, definition: &ModelDefinition) -> Result<()> {
        for global in &definition.global_permissions {
            let permission = self.resolve(definition, None, &global.permission)?;
            self.global_entries.push(PermissionEntry::new(
                global.authority.clone(),
                permission,
                global.access,
            ));
        }
        Ok(())
    }

    /// The type and its ancestors, plus every aspect and its ancestors
    fn applicable_classes(&self, type_qname: &QName, aspects: &BTreeSet<QName>) -> HashSet<QName> {
        let mut classes = HashSet::new();
        for start in std::iter::once(type_qname).chain(aspects.iter()) {
            let mut cursor = Some(start.clone());
            while let Some(class) = cursor {
                if !classes.insert(class.clone()) {
                    break;
                }
                cursor = self.class_parents.get(&class).cloned().flatten();
            }
        }
        classes
    }

    fn defined_for<'a>(
        &'a self,
        classes: &'a HashSet<QName>,
    ) -> impl Iterator<Item = &'a PermissionReference> + 'a {
        classes
            .iter()
            .filter_map(|class| self.by_class.get(class))
            .flatten()
    }
}

impl PermissionModel for DeclarativeModel {
    fn all_permissions(
        &self,
        type_qname: &QName,
        aspects: &BTreeSet<QName>,
    ) -> BTreeSet<PermissionReference> {
        let classes = self.applicable_classes(type_qname, aspects);
        let mut result: BTreeSet<PermissionReference> = self.defined_for(&classes).cloned().collect();
        result.insert(self.all.clone());
        result.insert(self.legacy_all.clone());
        result
    }

    fn required_permissions(
        &self,
        permission: &PermissionReference,
        type_qname: &QName,
        aspects: &BTreeSet<QName>,
        scope: RequirementScope,
    ) -> BTreeSet<PermissionReference> {
        if let Some(info) = self.permissions.get(permission) {
            return info
                .requires
                .iter()
                .filter(|(_, on)| *on == scope)
                .map(|(required, _)| required.clone())
                .collect();
        }

        if scope != RequirementScope::Node || !self.groups.contains_key(permission) {
            return BTreeSet::new();
        }

        // A group holds when every atomic permission it grants on this
        // node holds
        let classes = self.applicable_classes(type_qname, aspects);
        self.grantees
            .get(permission)
            .into_iter()
            .flatten()
            .filter(|p| {
                self.permissions
                    .get(*p)
                    .is_some_and(|info| classes.contains(&info.class))
            })
            .cloned()
            .collect()
    }

    fn granting_permissions(&self, permission: &PermissionReference) -> BTreeSet<PermissionReference> {
        let mut result = self.granters.get(permission).cloned().unwrap_or_default();
        result.insert(permission.clone());
        result
    }

    fn grantee_permissions(&self, permission: &PermissionReference) -> BTreeSet<PermissionReference> {
        let mut result = self.grantees.get(permission).cloned().unwrap_or_default();
        result.insert(permission.clone());
        result
    }

    fn global_permission_entries(&self) -> &[PermissionEntry] {
        &self.global_entries
    }

    fn check_permission(&self, permission: &PermissionReference) -> bool {
        if self.permissions.contains_key(permission) {
            return true;
        }
        match self.grantees.get(permission) {
            Some(grantees) if self.groups.contains_key(permission) => {
                !grantees.iter().any(|g| self.permissions.contains_key(g))
            }
            _ => true,
        }
    }

    fn is_unique(&self, permission: &PermissionReference) -> bool {
        self.by_name
            .get(permission.name())
            .map_or(true, |defined| defined.len() <= 1)
    }

    fn exposed_permissions(
        &self,
        type_qname: &QName,
        aspects: &BTreeSet<QName>,
    ) -> BTreeSet<PermissionReference> {
        let classes = self.applicable_classes(type_qname, aspects);
        self.defined_for(&classes)
            .filter(|p| {
                self.groups.get(*p).map(|g| g.expose).unwrap_or(false)
                    || self.permissions.get(*p).map(|i| i.expose).unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    fn permission_reference(
        &self,
        qname: Option<&QName>,
        name: &str,
    ) -> Option<PermissionReference> {
        if let Some(qname) = qname {
            return Some(self.interns.get(qname, name));
        }
        if name == ALL_PERMISSIONS {
            return Some(self.all.clone());
        }
        if let Some([only]) = self.by_name.get(name).map(Vec::as_slice) {
            return Some(only.clone());
        }

        // Qualified display form: {namespace}type.Name
        let close = name.find('}')?;
        let dot = close + name[close..].find('.')?;
        let qname = QName::parse(&name[..dot])?;
        self.interns
            .find(&qname, &name[dot + 1..])
            .filter(|r| self.is_defined(r) || *r == self.all || *r == self.legacy_all)
    }

    fn all_permissions_reference(&self) -> PermissionReference {
        self.all.clone()
    }

    fn legacy_all_permissions_reference(&self) -> PermissionReference {
        self.legacy_all.clone()
    }
}
