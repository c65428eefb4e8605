//! Resources, capabilities and requirements stored in an arena.
//!
//! Resources routinely require each other, so every cross reference is a
//! copyable handle into [`ResourceGraph`] rather than an owning pointer.

use std::collections::BTreeMap;
use std::fmt;

use bundlewire_util::errors::WiringError;
use serde::Serialize;

use crate::filter::Filter;
use crate::version::{Version, VersionRange};

/// Well-known capability and requirement namespaces.
pub mod namespace {
    pub const PACKAGE: &str = "osgi.wiring.package";
    pub const BUNDLE: &str = "osgi.wiring.bundle";
    pub const HOST: &str = "osgi.wiring.host";
}

/// Well-known directive names and values.
pub mod directive {
    pub const FILTER: &str = "filter";
    pub const USES: &str = "uses";
    pub const CARDINALITY: &str = "cardinality";
    pub const RESOLUTION: &str = "resolution";
    pub const VISIBILITY: &str = "visibility";

    pub const MULTIPLE: &str = "multiple";
    pub const OPTIONAL: &str = "optional";
    pub const REEXPORT: &str = "reexport";
}

pub const VERSION_ATTRIBUTE: &str = "version";
pub const BUNDLE_VERSION_ATTRIBUTE: &str = "bundle-version";

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ResourceId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct CapabilityId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct RequirementId(pub usize);

/// A typed capability attribute value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    String(String),
    Version(Version),
    Long(i64),
    List(Vec<String>),
}

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_version(&self) -> Option<&Version> {
        match self {
            AttrValue::Version(v) => Some(v),
            _ => None,
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::String(s.to_string())
    }
}

impl From<Version> for AttrValue {
    fn from(v: Version) -> Self {
        AttrValue::Version(v)
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::String(s) => f.write_str(s),
            AttrValue::Version(v) => write!(f, "{v}"),
            AttrValue::Long(n) => write!(f, "{n}"),
            AttrValue::List(items) => write!(f, "[{}]", items.join(", ")),
        }
    }
}

pub type Attributes = BTreeMap<String, AttrValue>;
pub type Directives = BTreeMap<String, String>;

/// Build a directive map from literal pairs.
pub fn directives(pairs: &[(&str, &str)]) -> Directives {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// A unit of deployment: a bundle, or a fragment that attaches to a host.
#[derive(Debug, Clone)]
pub struct Resource {
    pub id: ResourceId,
    pub symbolic_name: String,
    pub version: Version,
    pub capabilities: Vec<CapabilityId>,
    pub requirements: Vec<RequirementId>,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.symbolic_name, self.version)
    }
}

#[derive(Debug, Clone)]
pub struct Capability {
    pub id: CapabilityId,
    pub resource: ResourceId,
    pub namespace: String,
    pub attributes: Attributes,
    pub directives: Directives,
}

impl Capability {
    /// The attribute named after the namespace, e.g. the package name.
    pub fn namespace_value(&self) -> Option<&AttrValue> {
        self.attributes.get(&self.namespace)
    }

    pub fn is_package(&self) -> bool {
        self.namespace == namespace::PACKAGE
    }

    /// Package name for `osgi.wiring.package` capabilities.
    pub fn package_name(&self) -> Option<&str> {
        if !self.is_package() {
            return None;
        }
        self.namespace_value().and_then(AttrValue::as_str)
    }

    /// Package names listed in the `uses` directive.
    pub fn uses(&self) -> Vec<&str> {
        self.directives
            .get(directive::USES)
            .map(|u| {
                u.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.namespace)?;
        for (k, v) in &self.attributes {
            write!(f, "; {k}={v}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Requirement {
    pub id: RequirementId,
    pub resource: ResourceId,
    pub namespace: String,
    pub directives: Directives,
    pub filter: Option<Filter>,
}

impl Requirement {
    pub fn filter_text(&self) -> &str {
        self.directives
            .get(directive::FILTER)
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn is_multiple(&self) -> bool {
        self.directives.get(directive::CARDINALITY).map(String::as_str) == Some(directive::MULTIPLE)
    }

    pub fn is_optional(&self) -> bool {
        self.directives.get(directive::RESOLUTION).map(String::as_str) == Some(directive::OPTIONAL)
    }

    pub fn is_reexport(&self) -> bool {
        self.directives.get(directive::VISIBILITY).map(String::as_str) == Some(directive::REEXPORT)
    }

    /// Whether `cap` is in this requirement's namespace and passes its filter.
    pub fn matches(&self, cap: &Capability) -> bool {
        cap.namespace == self.namespace
            && self
                .filter
                .as_ref()
                .map_or(true, |f| f.matches(&cap.attributes))
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}; filter:=\"{}\"", self.namespace, self.filter_text())
    }
}

/// A capability as observed through a particular resource.
///
/// Fragment capabilities are attributed to the host they attach to; the
/// wrapped form keeps the original handle and records the host as owner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CapabilityRef {
    Direct(CapabilityId),
    Wrapped {
        host: ResourceId,
        capability: CapabilityId,
    },
}

impl CapabilityRef {
    /// Attribute `capability` to `owner`, wrapping it when it is declared
    /// by a different resource.
    pub fn attributed_to(graph: &ResourceGraph, capability: CapabilityId, owner: ResourceId) -> Self {
        if graph.capability(capability).resource == owner {
            CapabilityRef::Direct(capability)
        } else {
            CapabilityRef::Wrapped {
                host: owner,
                capability,
            }
        }
    }

    /// The declared capability behind this reference.
    pub fn id(self) -> CapabilityId {
        match self {
            CapabilityRef::Direct(id) => id,
            CapabilityRef::Wrapped { capability, .. } => capability,
        }
    }

    /// The resource this capability is attributed to.
    pub fn resource(self, graph: &ResourceGraph) -> ResourceId {
        match self {
            CapabilityRef::Direct(id) => graph.capability(id).resource,
            CapabilityRef::Wrapped { host, .. } => host,
        }
    }
}

/// Arena holding every resource, capability and requirement.
#[derive(Debug, Clone, Default)]
pub struct ResourceGraph {
    resources: Vec<Resource>,
    capabilities: Vec<Capability>,
    requirements: Vec<Requirement>,
}

impl ResourceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a bare resource with no capabilities or requirements.
    pub fn add_resource(&mut self, symbolic_name: impl Into<String>, version: Version) -> ResourceId {
        let id = ResourceId(self.resources.len());
        self.resources.push(Resource {
            id,
            symbolic_name: symbolic_name.into(),
            version,
            capabilities: Vec::new(),
            requirements: Vec::new(),
        });
        id
    }

    /// Add a bundle, which provides `osgi.wiring.bundle` and `osgi.wiring.host`.
    pub fn add_bundle(&mut self, symbolic_name: &str, version: Version) -> ResourceId {
        let id = self.add_resource(symbolic_name, version.clone());
        for ns in [namespace::BUNDLE, namespace::HOST] {
            let mut attrs = Attributes::new();
            attrs.insert(ns.to_string(), symbolic_name.into());
            attrs.insert(BUNDLE_VERSION_ATTRIBUTE.to_string(), version.clone().into());
            self.add_capability(id, ns, attrs, Directives::new());
        }
        id
    }

    /// Add a fragment attaching to bundles named `host`.
    pub fn add_fragment(
        &mut self,
        symbolic_name: &str,
        version: Version,
        host: &str,
    ) -> Result<ResourceId, WiringError> {
        let id = self.add_resource(symbolic_name, version);
        let filter = format!("({}={host})", namespace::HOST);
        self.add_requirement(id, namespace::HOST, directives(&[(directive::FILTER, &filter)]))?;
        Ok(id)
    }

    pub fn add_capability(
        &mut self,
        resource: ResourceId,
        namespace: &str,
        attributes: Attributes,
        directives: Directives,
    ) -> CapabilityId {
        let id = CapabilityId(self.capabilities.len());
        self.capabilities.push(Capability {
            id,
            resource,
            namespace: namespace.to_string(),
            attributes,
            directives,
        });
        self.resources[resource.0].capabilities.push(id);
        id
    }

    /// Add a requirement, parsing its `filter` directive if present.
    pub fn add_requirement(
        &mut self,
        resource: ResourceId,
        namespace: &str,
        directives: Directives,
    ) -> Result<RequirementId, WiringError> {
        let filter = directives
            .get(directive::FILTER)
            .map(|f| Filter::parse(f))
            .transpose()?;
        let id = RequirementId(self.requirements.len());
        self.requirements.push(Requirement {
            id,
            resource,
            namespace: namespace.to_string(),
            directives,
            filter,
        });
        self.resources[resource.0].requirements.push(id);
        Ok(id)
    }

    /// Export `package` at `version`, with an optional `uses` list.
    pub fn export_package(
        &mut self,
        resource: ResourceId,
        package: &str,
        version: Version,
        uses: &[&str],
    ) -> CapabilityId {
        let mut attrs = Attributes::new();
        attrs.insert(namespace::PACKAGE.to_string(), package.into());
        attrs.insert(VERSION_ATTRIBUTE.to_string(), version.into());
        let mut dirs = Directives::new();
        if !uses.is_empty() {
            dirs.insert(directive::USES.to_string(), uses.join(","));
        }
        self.add_capability(resource, namespace::PACKAGE, attrs, dirs)
    }

    /// Import `package`, optionally constrained to a version range.
    pub fn import_package(
        &mut self,
        resource: ResourceId,
        package: &str,
        range: Option<&VersionRange>,
    ) -> Result<RequirementId, WiringError> {
        let filter = package_filter(package, range);
        self.add_requirement(
            resource,
            namespace::PACKAGE,
            directives(&[(directive::FILTER, &filter)]),
        )
    }

    /// Require every package exported by bundles named `bundle`.
    pub fn require_bundle(
        &mut self,
        resource: ResourceId,
        bundle: &str,
        reexport: bool,
    ) -> Result<RequirementId, WiringError> {
        let filter = format!("({}={bundle})", namespace::BUNDLE);
        let mut dirs = directives(&[(directive::FILTER, &filter)]);
        if reexport {
            dirs.insert(directive::VISIBILITY.to_string(), directive::REEXPORT.to_string());
        }
        self.add_requirement(resource, namespace::BUNDLE, dirs)
    }

    pub fn resource(&self, id: ResourceId) -> &Resource {
        &self.resources[id.0]
    }

    pub fn capability(&self, id: CapabilityId) -> &Capability {
        &self.capabilities[id.0]
    }

    pub fn requirement(&self, id: RequirementId) -> &Requirement {
        &self.requirements[id.0]
    }

    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.resources.iter()
    }

    pub fn capabilities(&self) -> impl Iterator<Item = &Capability> {
        self.capabilities.iter()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Find a resource by name, preferring an exact version or else the highest.
    pub fn find_resource(&self, symbolic_name: &str, version: Option<&Version>) -> Option<ResourceId> {
        self.resources
            .iter()
            .filter(|r| r.symbolic_name == symbolic_name)
            .filter(|r| version.map_or(true, |v| &r.version == v))
            .max_by(|a, b| a.version.cmp(&b.version))
            .map(|r| r.id)
    }

    /// The `osgi.wiring.host` requirement of a fragment.
    pub fn host_requirement(&self, resource: ResourceId) -> Option<RequirementId> {
        self.resource(resource)
            .requirements
            .iter()
            .copied()
            .find(|r| self.requirement(*r).namespace == namespace::HOST)
    }

    pub fn is_fragment(&self, resource: ResourceId) -> bool {
        self.host_requirement(resource).is_some()
    }

    /// Human readable `name [name/version]` label used in diagnostics.
    pub fn describe(&self, resource: ResourceId) -> String {
        let r = self.resource(resource);
        format!("{} [{}]", r.symbolic_name, r)
    }
}

/// Filter text selecting `package`, optionally within `range`.
pub fn package_filter(package: &str, range: Option<&VersionRange>) -> String {
    let name = format!("({}={package})", namespace::PACKAGE);
    match range {
        None => name,
        Some(range) => match range.to_filter(VERSION_ATTRIBUTE).strip_prefix("(&") {
            Some(inner) => format!("(&{name}{inner}"),
            None => format!("(&{name}{})", range.to_filter(VERSION_ATTRIBUTE)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn bundle_gets_bundle_and_host_capabilities() {
        let mut graph = ResourceGraph::new();
        let a = graph.add_bundle("a", v("1.0"));
        let caps: Vec<&str> = graph
            .resource(a)
            .capabilities
            .iter()
            .map(|c| graph.capability(*c).namespace.as_str())
            .collect();
        assert_eq!(caps, vec![namespace::BUNDLE, namespace::HOST]);
        assert!(!graph.is_fragment(a));
    }

    #[test]
    fn fragment_has_host_requirement() {
        let mut graph = ResourceGraph::new();
        let host = graph.add_bundle("host", v("1.0"));
        let frag = graph.add_fragment("frag", v("1.0"), "host").unwrap();
        assert!(graph.is_fragment(frag));
        let req = graph.requirement(graph.host_requirement(frag).unwrap());
        let host_cap = graph.capability(graph.resource(host).capabilities[1]);
        assert!(req.matches(host_cap));
    }

    #[test]
    fn package_import_matches_export_in_range() {
        let mut graph = ResourceGraph::new();
        let a = graph.add_bundle("a", v("1.0"));
        let b = graph.add_bundle("b", v("1.0"));
        let old = graph.export_package(a, "p", v("0.9"), &[]);
        let new = graph.export_package(a, "p", v("1.4"), &["q", "r"]);
        let range = VersionRange::parse("[1.0,2.0)").unwrap();
        let req = graph.import_package(b, "p", Some(&range)).unwrap();
        let req = graph.requirement(req);
        assert_eq!(
            req.filter_text(),
            "(&(osgi.wiring.package=p)(version>=1.0.0)(!(version>=2.0.0)))"
        );
        assert!(!req.matches(graph.capability(old)));
        assert!(req.matches(graph.capability(new)));
        assert_eq!(graph.capability(new).uses(), vec!["q", "r"]);
        assert_eq!(graph.capability(new).package_name(), Some("p"));
    }

    #[test]
    fn package_filter_with_lower_bound_only() {
        let range = VersionRange::parse("1.2").unwrap();
        assert_eq!(
            package_filter("p", Some(&range)),
            "(&(osgi.wiring.package=p)(version>=1.2.0))"
        );
        assert_eq!(package_filter("p", None), "(osgi.wiring.package=p)");
    }

    #[test]
    fn requirement_flags() {
        let mut graph = ResourceGraph::new();
        let a = graph.add_bundle("a", v("1.0"));
        let req = graph
            .add_requirement(
                a,
                "osgi.extender",
                directives(&[
                    (directive::FILTER, "(osgi.extender=osgi.component)"),
                    (directive::CARDINALITY, directive::MULTIPLE),
                    (directive::RESOLUTION, directive::OPTIONAL),
                ]),
            )
            .unwrap();
        let req = graph.requirement(req);
        assert!(req.is_multiple());
        assert!(req.is_optional());
        assert!(!req.is_reexport());
    }

    #[test]
    fn wrapped_capability_is_attributed_to_host() {
        let mut graph = ResourceGraph::new();
        let host = graph.add_bundle("host", v("1.0"));
        let frag = graph.add_fragment("frag", v("1.0"), "host").unwrap();
        let cap = graph.export_package(frag, "p", v("1.0"), &[]);

        let wrapped = CapabilityRef::attributed_to(&graph, cap, host);
        assert_eq!(wrapped, CapabilityRef::Wrapped { host, capability: cap });
        assert_eq!(wrapped.resource(&graph), host);
        assert_eq!(wrapped.id(), cap);

        let direct = CapabilityRef::attributed_to(&graph, cap, frag);
        assert_eq!(direct, CapabilityRef::Direct(cap));
        assert_eq!(direct.resource(&graph), frag);
        assert_ne!(wrapped, direct);
    }

    #[test]
    fn find_resource_prefers_highest_version() {
        let mut graph = ResourceGraph::new();
        graph.add_bundle("a", v("1.0"));
        let newest = graph.add_bundle("a", v("2.0"));
        let exact = graph.find_resource("a", Some(&v("1.0"))).unwrap();
        assert_eq!(graph.find_resource("a", None), Some(newest));
        assert_eq!(graph.resource(exact).version, v("1.0"));
        assert_eq!(graph.find_resource("missing", None), None);
        assert_eq!(graph.describe(newest), "a [a/2.0.0]");
    }

    #[test]
    fn invalid_filter_is_rejected() {
        let mut graph = ResourceGraph::new();
        let a = graph.add_bundle("a", v("1.0"));
        let err = graph
            .add_requirement(a, namespace::PACKAGE, directives(&[(directive::FILTER, "(p=")]))
            .unwrap_err();
        assert!(matches!(err, WiringError::Filter { .. }));
    }
}
