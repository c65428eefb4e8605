//! Uses-constraint conflicts and their diagnostics.

use std::fmt;
use std::fmt::Write as _;

use miette::Diagnostic;
use serde::Serialize;
use thiserror::Error;

use bundlewire_core::model::{namespace, CapabilityRef, RequirementId, ResourceId};

use crate::candidates::Candidates;
use crate::context::ResolveContext;
use crate::packages::Blame;

/// Which check of the package space failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictKind {
    /// Fragments import one package from two different resources.
    FragmentImport,
    /// An exported package is also reached through `uses` from elsewhere.
    ExportUses,
    /// An imported or required package is also reached through `uses` from elsewhere.
    ImportUses,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictKind::FragmentImport => write!(f, "fragment import"),
            ConflictKind::ExportUses => write!(f, "export uses"),
            ConflictKind::ImportUses => write!(f, "import uses"),
        }
    }
}

/// A package-space check failure for the permutation under test.
#[derive(Debug, Clone, Error, Diagnostic)]
#[error("{message}")]
#[diagnostic(help(
    "Every package must come from one source per resource; try a provider whose `uses` packages agree"
))]
pub struct UsesConflict {
    pub kind: ConflictKind,
    pub resource: ResourceId,
    pub package: String,
    pub message: String,
    /// Requirements the conflict was traced to.
    pub requirements: Vec<RequirementId>,
    /// Permutations queued in the session when the conflict was last passed up.
    pub permutation_count: usize,
}

/// Render a blame chain hop by hop:
///
/// ```text
///   app [app/1.0.0]
///     import: (osgi.wiring.package=org.example.api)
///      |
///     export: osgi.wiring.package=org.example.api; uses:=org.example.log
///   api [api/2.0.0]
/// ```
pub fn render_blame(ctx: &dyn ResolveContext, candidates: &Candidates, blame: &Blame) -> String {
    let graph = ctx.graph();
    let mut out = String::new();
    if blame.reqs.is_empty() {
        out.push_str(&graph.resource(blame.cap.resource(graph)).to_string());
        return out;
    }

    let blamed = graph.capability(blame.cap.id());
    for (i, &req_id) in blame.reqs.iter().enumerate() {
        let req = graph.requirement(req_id);
        let is_package = req.namespace == namespace::PACKAGE;
        let _ = writeln!(out, "  {}", graph.describe(req.resource));
        let _ = write!(
            out,
            "    {} {}\n     |\n    {} ",
            if is_package { "import:" } else { "require:" },
            req.filter_text(),
            if is_package { "export:" } else { "provide:" },
        );

        let satisfying = satisfying_capability(ctx, candidates, req_id).map(|c| graph.capability(c.id()));
        let Some(cap) = satisfying else {
            out.push_str("<unsatisfied>\n");
            continue;
        };

        if let Some(&next) = blame.reqs.get(i + 1) {
            match cap.package_name() {
                Some(package) => {
                    let used = satisfying_capability(ctx, candidates, next)
                        .and_then(|c| graph.capability(c.id()).package_name())
                        .unwrap_or("?");
                    let _ = write!(out, "{}={package}; uses:={used}", namespace::PACKAGE);
                }
                None => {
                    let _ = write!(out, "{cap}");
                }
            }
            out.push('\n');
        } else {
            let _ = write!(out, "{}: ", cap.namespace);
            match cap.namespace_value() {
                Some(value) => {
                    let _ = write!(out, "{value}");
                }
                None => {
                    for (k, v) in &cap.attributes {
                        let _ = write!(out, "{k}={v};");
                    }
                }
            }
            if let (Some(terminal), Some(used)) = (cap.package_name(), blamed.package_name()) {
                if terminal != used {
                    let _ = write!(
                        out,
                        "; uses:={used}\n    export: {}={used}",
                        namespace::PACKAGE
                    );
                }
            }
            let _ = write!(out, "\n  {}", graph.describe(blame.cap.resource(graph)));
        }
    }
    out
}

/// The capability a requirement is (tentatively) satisfied by: its first
/// candidate, or the recorded wire when its resource is already resolved.
fn satisfying_capability(
    ctx: &dyn ResolveContext,
    candidates: &Candidates,
    requirement: RequirementId,
) -> Option<CapabilityRef> {
    candidates
        .first_candidate(requirement)
        .or_else(|| ctx.wire_for(requirement).map(|w| w.capability))
}

/// Conflicts the search recovered from, in the order they were hit.
#[derive(Debug, Default)]
pub struct ConflictReport {
    pub conflicts: Vec<UsesConflict>,
}

impl ConflictReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, conflict: UsesConflict) {
        self.conflicts.push(conflict);
    }

    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.conflicts.len()
    }
}

impl fmt::Display for ConflictReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.conflicts.is_empty() {
            return write!(f, "No uses conflicts.");
        }
        writeln!(f, "Uses conflicts ({}):", self.conflicts.len())?;
        for c in &self.conflicts {
            writeln!(f, "  [{}] package '{}' ({} requirement(s) blamed)", c.kind, c.package, c.requirements.len())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bundlewire_core::model::{CapabilityId, ResourceGraph};
    use bundlewire_core::version::Version;
    use bundlewire_core::wiring::{Wire, Wiring, Wirings};

    struct Ctx {
        graph: ResourceGraph,
        wirings: Wirings,
    }

    impl ResolveContext for Ctx {
        fn graph(&self) -> &ResourceGraph {
            &self.graph
        }
        fn wirings(&self) -> &Wirings {
            &self.wirings
        }
        fn mandatory_resources(&self) -> Vec<ResourceId> {
            Vec::new()
        }
        fn find_providers(&self, _: RequirementId) -> Vec<CapabilityId> {
            Vec::new()
        }
    }

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn empty_report() {
        let report = ConflictReport::new();
        assert!(report.is_empty());
        assert_eq!(report.len(), 0);
        assert_eq!(report.to_string(), "No uses conflicts.");
    }

    #[test]
    fn report_lists_kind_and_package() {
        let mut report = ConflictReport::new();
        report.add(UsesConflict {
            kind: ConflictKind::ImportUses,
            resource: ResourceId(0),
            package: "org.example.log".into(),
            message: "boom".into(),
            requirements: vec![RequirementId(1), RequirementId(2)],
            permutation_count: 1,
        });
        let s = report.to_string();
        assert!(s.contains("Uses conflicts (1)"));
        assert!(s.contains("[import uses] package 'org.example.log'"));
        assert!(s.contains("2 requirement(s)"));
    }

    #[test]
    fn renders_two_hop_chain_through_uses() {
        let mut graph = ResourceGraph::new();
        let log = graph.add_bundle("log", v("1.0"));
        let log_pkg = graph.export_package(log, "org.example.log", v("1.0"), &[]);
        let api = graph.add_bundle("api", v("2.0"));
        let api_pkg = graph.export_package(api, "org.example.api", v("2.0"), &["org.example.log"]);
        let api_log = graph.import_package(api, "org.example.log", None).unwrap();
        let app = graph.add_bundle("app", v("1.0"));
        let app_api = graph.import_package(app, "org.example.api", None).unwrap();
        let ctx = Ctx {
            graph,
            wirings: Wirings::new(),
        };

        let mut candidates = Candidates::new();
        candidates.insert(app_api, vec![CapabilityRef::Direct(api_pkg)], false, false);
        candidates.insert(api_log, vec![CapabilityRef::Direct(log_pkg)], false, false);

        let blame = Blame::new(CapabilityRef::Direct(log_pkg), vec![app_api, api_log]);
        let text = render_blame(&ctx, &candidates, &blame);
        let expected = "  app [app/1.0.0]\n    import: (osgi.wiring.package=org.example.api)\n     |\n    export: osgi.wiring.package=org.example.api; uses:=org.example.log\n  api [api/2.0.0]\n    import: (osgi.wiring.package=org.example.log)\n     |\n    export: osgi.wiring.package: org.example.log\n  log [log/1.0.0]";
        assert_eq!(text, expected);
    }

    #[test]
    fn renders_require_bundle_and_falls_back_to_wires() {
        let mut graph = ResourceGraph::new();
        let lib = graph.add_bundle("lib", v("1.0"));
        let lib_bundle = graph.resource(lib).capabilities[0];
        let lib_pkg = graph.export_package(lib, "p", v("1.0"), &[]);
        let user = graph.add_bundle("user", v("1.0"));
        let req = graph.require_bundle(user, "lib", false).unwrap();

        let mut wirings = Wirings::new();
        let mut wiring = Wiring::for_resource(&graph, user);
        wiring.wires.push(Wire {
            requirement: req,
            capability: CapabilityRef::Direct(lib_bundle),
        });
        wirings.insert(user, wiring);
        let ctx = Ctx { graph, wirings };

        let blame = Blame::new(CapabilityRef::Direct(lib_pkg), vec![req]);
        let text = render_blame(&ctx, &Candidates::new(), &blame);
        assert!(text.starts_with("  user [user/1.0.0]\n    require: (osgi.wiring.bundle=lib)"));
        assert!(text.contains("provide: osgi.wiring.bundle: lib"));
        assert!(text.ends_with("  lib [lib/1.0.0]"));
    }

    #[test]
    fn renders_export_only_blame_as_resource() {
        let mut graph = ResourceGraph::new();
        let a = graph.add_bundle("a", v("1.0"));
        let p = graph.export_package(a, "p", v("1.0"), &[]);
        let ctx = Ctx {
            graph,
            wirings: Wirings::new(),
        };
        let blame = Blame::new(CapabilityRef::Direct(p), Vec::new());
        assert_eq!(render_blame(&ctx, &Candidates::new(), &blame), "a/1.0.0");
    }
}
