use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use bundlewire_util::errors::WiringError;

use crate::model::{
    directive, directives, namespace, package_filter, AttrValue, Attributes, CapabilityId,
    CapabilityRef, Directives, RequirementId, ResourceGraph, ResourceId, BUNDLE_VERSION_ATTRIBUTE,
    VERSION_ATTRIBUTE,
};
use crate::version::{Version, VersionRange};
use crate::wiring::{Wire, Wiring, Wirings};

/// The parsed representation of a repository description (`repository.toml`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    /// Resources that must resolve, as `name` or `name@version`.
    #[serde(default)]
    pub roots: Vec<String>,

    /// Resources to resolve if possible.
    #[serde(default, rename = "optional-roots")]
    pub optional_roots: Vec<String>,

    #[serde(default, rename = "resource")]
    pub resources: Vec<ResourceEntry>,
}

/// One `[[resource]]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceEntry {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default, rename = "fragment-host")]
    pub fragment_host: Option<String>,
    /// Marks the resource as wired by an earlier resolve.
    #[serde(default)]
    pub resolved: bool,
    #[serde(default)]
    pub export: Vec<ExportEntry>,
    #[serde(default)]
    pub import: Vec<ImportEntry>,
    #[serde(default, rename = "require-bundle")]
    pub require_bundle: Vec<RequireBundleEntry>,
    #[serde(default)]
    pub capability: Vec<CapabilityEntry>,
    #[serde(default)]
    pub requirement: Vec<RequirementEntry>,
    #[serde(default)]
    pub wire: Vec<WireEntry>,
}

fn default_version() -> String {
    "0.0.0".to_string()
}

/// Shorthand for an `osgi.wiring.package` capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportEntry {
    pub package: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub uses: Vec<String>,
}

/// Shorthand for an `osgi.wiring.package` requirement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportEntry {
    pub package: String,
    /// Version range, e.g. `[1.0,2.0)`.
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub multiple: bool,
}

/// Shorthand for an `osgi.wiring.bundle` requirement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequireBundleEntry {
    pub bundle: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub reexport: bool,
    #[serde(default)]
    pub optional: bool,
}

/// A generic capability in any namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityEntry {
    pub namespace: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeEntry>,
    #[serde(default)]
    pub directives: BTreeMap<String, String>,
}

/// An attribute value as written in TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeEntry {
    Long(i64),
    Text(String),
    List(Vec<String>),
}

/// A generic requirement in any namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequirementEntry {
    pub namespace: String,
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub directives: BTreeMap<String, String>,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub multiple: bool,
}

/// A wire of a resolved resource. The requirement is picked by `package`,
/// `bundle` or exact `filter` text; the capability is the provider's first
/// capability matching it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireEntry {
    #[serde(default)]
    pub package: Option<String>,
    #[serde(default)]
    pub bundle: Option<String>,
    #[serde(default)]
    pub filter: Option<String>,
    /// `name` or `name@version`.
    pub provider: String,
}

/// A resource graph ready to be resolved.
#[derive(Debug, Clone, Default)]
pub struct Repository {
    pub graph: ResourceGraph,
    pub wirings: Wirings,
    pub roots: Vec<ResourceId>,
    pub optional_roots: Vec<ResourceId>,
}

impl Manifest {
    /// Load and parse a repository description from the given path.
    pub fn from_path(path: &Path) -> miette::Result<Self> {
        let content = bundlewire_util::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse a repository description from a string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> miette::Result<Self> {
        toml::from_str(content).map_err(|e| {
            WiringError::Repository {
                message: format!("Failed to parse repository: {e}"),
            }
            .into()
        })
    }

    /// Build the resource arena, the existing wirings and the root sets.
    pub fn into_repository(&self) -> Result<Repository, WiringError> {
        let mut graph = ResourceGraph::new();
        let mut ids = Vec::with_capacity(self.resources.len());
        for entry in &self.resources {
            ids.push(add_entry(&mut graph, entry)?);
        }

        let mut wirings = Wirings::new();
        for (entry, &id) in self.resources.iter().zip(&ids) {
            if !entry.resolved || entry.fragment_host.is_some() {
                continue;
            }
            wirings.insert(id, Wiring::for_resource(&graph, id));
        }
        // Resolved fragments contribute to the wiring of resolved hosts.
        for (entry, &id) in self.resources.iter().zip(&ids) {
            let Some(host_name) = entry.fragment_host.as_deref().filter(|_| entry.resolved) else {
                continue;
            };
            let hosts: Vec<ResourceId> = wirings
                .keys()
                .copied()
                .filter(|h| graph.resource(*h).symbolic_name == host_name)
                .collect();
            if hosts.is_empty() {
                return Err(WiringError::Repository {
                    message: format!(
                        "resolved fragment `{}` has no resolved host `{host_name}`",
                        entry.name
                    ),
                });
            }
            let fragment = graph.resource(id);
            for host in hosts {
                if let Some(wiring) = wirings.get_mut(&host) {
                    wiring.capabilities.extend(fragment.capabilities.iter().copied());
                    wiring.requirements.extend(
                        fragment
                            .requirements
                            .iter()
                            .copied()
                            .filter(|r| graph.requirement(*r).namespace != namespace::HOST),
                    );
                }
            }
            wirings.insert(id, Wiring::for_resource(&graph, id));
        }

        for (entry, &id) in self.resources.iter().zip(&ids) {
            if entry.wire.is_empty() {
                continue;
            }
            if !entry.resolved {
                return Err(WiringError::Repository {
                    message: format!("resource `{}` declares wires but is not resolved", entry.name),
                });
            }
            let owner = match entry.fragment_host.as_deref() {
                Some(host) => graph.find_resource(host, None).ok_or_else(|| WiringError::Repository {
                    message: format!("unknown fragment host `{host}`"),
                })?,
                None => id,
            };
            for wire in &entry.wire {
                let wire = resolve_wire(&graph, &wirings, id, wire)?;
                if let Some(wiring) = wirings.get_mut(&owner) {
                    wiring.wires.push(wire);
                }
            }
        }

        let (roots, optional_roots) = if self.roots.is_empty() && self.optional_roots.is_empty() {
            let unresolved = self.resources.iter().zip(&ids).filter(|(e, _)| !e.resolved);
            let mut roots = Vec::new();
            let mut optional = Vec::new();
            for (entry, &id) in unresolved {
                if entry.fragment_host.is_some() {
                    optional.push(id);
                } else {
                    roots.push(id);
                }
            }
            (roots, optional)
        } else {
            (
                lookup_all(&graph, &self.roots)?,
                lookup_all(&graph, &self.optional_roots)?,
            )
        };

        Ok(Repository {
            graph,
            wirings,
            roots,
            optional_roots,
        })
    }
}

fn add_entry(graph: &mut ResourceGraph, entry: &ResourceEntry) -> Result<ResourceId, WiringError> {
    let version = Version::parse(&entry.version)?;
    let id = match entry.fragment_host.as_deref() {
        Some(host) => graph.add_fragment(&entry.name, version, host)?,
        None => graph.add_bundle(&entry.name, version),
    };

    for export in &entry.export {
        let version = match export.version.as_deref() {
            Some(v) => Version::parse(v)?,
            None => Version::default(),
        };
        let uses: Vec<&str> = export.uses.iter().map(String::as_str).collect();
        graph.export_package(id, &export.package, version, &uses);
    }

    for cap in &entry.capability {
        let mut attrs = Attributes::new();
        for (key, value) in &cap.attributes {
            attrs.insert(key.clone(), attribute_value(key, value)?);
        }
        graph.add_capability(id, &cap.namespace, attrs, cap.directives.clone());
    }

    for import in &entry.import {
        let range = import.version.as_deref().map(VersionRange::parse).transpose()?;
        let filter = package_filter(&import.package, range.as_ref());
        let dirs = with_flags(directives(&[(directive::FILTER, &filter)]), import.optional, import.multiple);
        graph.add_requirement(id, namespace::PACKAGE, dirs)?;
    }

    for req in &entry.require_bundle {
        let mut filter = format!("({}={})", namespace::BUNDLE, req.bundle);
        if let Some(range) = req.version.as_deref() {
            let range = VersionRange::parse(range)?;
            filter = format!("(&{filter}{})", range.to_filter(BUNDLE_VERSION_ATTRIBUTE));
        }
        let mut dirs = with_flags(directives(&[(directive::FILTER, &filter)]), req.optional, false);
        if req.reexport {
            dirs.insert(directive::VISIBILITY.to_string(), directive::REEXPORT.to_string());
        }
        graph.add_requirement(id, namespace::BUNDLE, dirs)?;
    }

    for req in &entry.requirement {
        let mut dirs = req.directives.clone();
        if let Some(filter) = &req.filter {
            dirs.insert(directive::FILTER.to_string(), filter.clone());
        }
        graph.add_requirement(id, &req.namespace, with_flags(dirs, req.optional, req.multiple))?;
    }

    Ok(id)
}

fn with_flags(mut dirs: Directives, optional: bool, multiple: bool) -> Directives {
    if optional {
        dirs.insert(directive::RESOLUTION.to_string(), directive::OPTIONAL.to_string());
    }
    if multiple {
        dirs.insert(directive::CARDINALITY.to_string(), directive::MULTIPLE.to_string());
    }
    dirs
}

fn attribute_value(key: &str, value: &AttributeEntry) -> Result<AttrValue, WiringError> {
    Ok(match value {
        AttributeEntry::Long(n) => AttrValue::Long(*n),
        AttributeEntry::Text(s) if key == VERSION_ATTRIBUTE || key == BUNDLE_VERSION_ATTRIBUTE => {
            AttrValue::Version(Version::parse(s)?)
        }
        AttributeEntry::Text(s) => AttrValue::String(s.clone()),
        AttributeEntry::List(items) => AttrValue::List(items.clone()),
    })
}

/// Split `name@version` into its parts.
pub fn parse_resource_ref(spec: &str) -> Result<(&str, Option<Version>), WiringError> {
    match spec.split_once('@') {
        Some((name, version)) => Ok((name, Some(Version::parse(version)?))),
        None => Ok((spec, None)),
    }
}

fn lookup(graph: &ResourceGraph, spec: &str) -> Result<ResourceId, WiringError> {
    let (name, version) = parse_resource_ref(spec)?;
    graph
        .find_resource(name, version.as_ref())
        .ok_or_else(|| WiringError::Repository {
            message: format!("unknown resource `{spec}`"),
        })
}

fn lookup_all(graph: &ResourceGraph, specs: &[String]) -> Result<Vec<ResourceId>, WiringError> {
    specs.iter().map(|s| lookup(graph, s)).collect()
}

fn resolve_wire(
    graph: &ResourceGraph,
    wirings: &Wirings,
    resource: ResourceId,
    entry: &WireEntry,
) -> Result<Wire, WiringError> {
    let requirement = find_wired_requirement(graph, resource, entry).ok_or_else(|| {
        WiringError::Repository {
            message: format!(
                "resource `{}` has no requirement matching wire to `{}`",
                graph.resource(resource).symbolic_name,
                entry.provider
            ),
        }
    })?;
    let provider = lookup(graph, &entry.provider)?;
    let candidates: Vec<CapabilityId> = match wirings.get(&provider) {
        Some(wiring) => wiring.capabilities.clone(),
        None => graph.resource(provider).capabilities.clone(),
    };
    let req = graph.requirement(requirement);
    let capability = candidates
        .into_iter()
        .find(|c| req.matches(graph.capability(*c)))
        .ok_or_else(|| WiringError::Repository {
            message: format!(
                "provider `{}` has no capability matching {}",
                entry.provider, req
            ),
        })?;
    Ok(Wire {
        requirement,
        capability: CapabilityRef::attributed_to(graph, capability, provider),
    })
}

fn find_wired_requirement(
    graph: &ResourceGraph,
    resource: ResourceId,
    entry: &WireEntry,
) -> Option<RequirementId> {
    graph.resource(resource).requirements.iter().copied().find(|r| {
        let req = graph.requirement(*r);
        if let Some(filter) = &entry.filter {
            return req.filter_text() == filter;
        }
        let (ns, wanted) = match (&entry.package, &entry.bundle) {
            (Some(p), _) => (namespace::PACKAGE, p),
            (None, Some(b)) => (namespace::BUNDLE, b),
            (None, None) => return false,
        };
        req.namespace == ns
            && req
                .filter
                .as_ref()
                .and_then(|f| f.equality_value(ns))
                .is_some_and(|v| v == wanted)
    })
}
