//! Dependency graph resolution.
//!
//! Resolution is a depth-first walk from the root package. Each package
//! identity is colored White (unseen), Gray (on the current path) or Black
//! (fully resolved). Reaching a Gray identity again is a cycle. Reaching a
//! Black identity at a different ref is a version conflict: two comparable
//! tags keep the higher one, anything else aborts.
//!
//! When a higher tag turns up after a lower one was already planned, the
//! higher tag is pinned for that identity and the walk restarts from the
//! root. Manifests and default branches are cached across restarts, so a
//! restart costs no extra requests for packages already seen.
//!
//! Sibling dependencies are resolved and their manifests fetched
//! concurrently, but the coloring map and plan are only touched by the
//! single task driving the walk, and recursion follows declared order.

mod graph;

pub use graph::{DependencyNode, InstallPlan, PlannedPackage, ResolutionState, VersionUpgrade};

use futures_util::future::{BoxFuture, FutureExt};
use futures_util::stream::{self, StreamExt};
use log::{debug, info};
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::error::PackageError;
use crate::locator::{GitRef, PackageIdentity, PackageLocator, PackageReference};
use crate::manifest::{Manifest, validate_package_name};
use crate::source::ManifestSource;

/// Default bound on concurrent requests.
pub const DEFAULT_CONCURRENCY: usize = 4;

#[derive(Debug, Clone)]
pub struct ResolveOptions {
    /// Walk the dependencies of the root; when false only the root is planned
    pub install_dependencies: bool,
    /// Fail instead of treating a manifest-less root as a leaf
    pub require_root_manifest: bool,
    /// Maximum number of in-flight requests per sibling batch
    pub concurrency: usize,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            install_dependencies: true,
            require_root_manifest: false,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Why a walk stopped early.
enum Interrupt {
    Failed(PackageError),
    /// A pin changed; the walk must start over from the root
    Restart,
}

impl From<PackageError> for Interrupt {
    fn from(err: PackageError) -> Self {
        Interrupt::Failed(err)
    }
}

struct Mark {
    color: Color,
    locator: PackageLocator,
}

/// State of one walk from the root.
#[derive(Default)]
struct Traversal {
    marks: HashMap<PackageIdentity, Mark>,
    /// Package name -> locator that claimed it
    names: HashMap<String, PackageLocator>,
    /// Gray identities, root first
    path: Vec<PackageIdentity>,
    order: Vec<PlannedPackage>,
    upgrades: Vec<VersionUpgrade>,
}

impl Traversal {
    fn color(&self, identity: &PackageIdentity) -> Color {
        self.marks
            .get(identity)
            .map(|m| m.color)
            .unwrap_or(Color::White)
    }

    fn record_upgrade(&mut self, identity: PackageIdentity, from: GitRef, to: GitRef) {
        let upgrade = VersionUpgrade { identity, from, to };
        if !self.upgrades.contains(&upgrade) {
            info!(
                "Using {}@{} instead of {}",
                upgrade.identity, upgrade.to, upgrade.from
            );
            self.upgrades.push(upgrade);
        }
    }
}

fn compare_refs(a: &PackageLocator, b: &PackageLocator) -> Option<Ordering> {
    a.git_ref()?.compare(b.git_ref()?)
}

pub struct Resolver<'a, S: ManifestSource + ?Sized> {
    source: &'a S,
    options: ResolveOptions,
    /// Manifests of installed packages at immutable refs
    installed: HashMap<PackageLocator, Manifest>,
    locators: HashMap<PackageReference, PackageLocator>,
    manifests: HashMap<PackageLocator, Result<Manifest, PackageError>>,
    pins: HashMap<PackageIdentity, GitRef>,
}

impl<'a, S: ManifestSource + ?Sized> Resolver<'a, S> {
    pub fn new(source: &'a S, options: ResolveOptions) -> Self {
        Self {
            source,
            options,
            installed: HashMap::new(),
            locators: HashMap::new(),
            manifests: HashMap::new(),
            pins: HashMap::new(),
        }
    }

    /// Serve manifests of already installed packages from disk instead of the
    /// network. Only tags and commits qualify, since a branch may have moved.
    pub fn with_installed(mut self, installed: HashMap<PackageLocator, Manifest>) -> Self {
        self.installed = installed
            .into_iter()
            .filter(|(locator, _)| locator.is_immutable())
            .collect();
        self
    }

    /// Resolve the graph below `root` into an install plan.
    #[tracing::instrument(skip(self), fields(root = %root))]
    pub async fn resolve(&mut self, root: &PackageReference) -> Result<InstallPlan, PackageError> {
        let root_locator = self.source.resolve(root).await?;
        self.locators.insert(root.clone(), root_locator.clone());

        let mut pass = 1;
        loop {
            let mut traversal = Traversal::default();
            match self.visit(&mut traversal, root_locator.clone(), true).await {
                Ok(tree) => {
                    debug!(
                        "Resolved {} package(s) for {} in {} pass(es)",
                        traversal.order.len(),
                        root_locator,
                        pass
                    );
                    return Ok(InstallPlan {
                        entries: traversal.order,
                        root: tree,
                        upgrades: traversal.upgrades,
                    });
                }
                Err(Interrupt::Restart) => {
                    pass += 1;
                    debug!("Pins changed, restarting resolution (pass {})", pass);
                }
                Err(Interrupt::Failed(e)) => return Err(e),
            }
        }
    }

    fn visit<'b>(
        &'b mut self,
        t: &'b mut Traversal,
        locator: PackageLocator,
        is_root: bool,
    ) -> BoxFuture<'b, Result<DependencyNode, Interrupt>> {
        async move {
            let identity = locator.identity();
            match t.color(&identity) {
                Color::Gray => {
                    let start = t.path.iter().position(|p| p == &identity).unwrap_or(0);
                    let mut cycle: Vec<String> =
                        t.path[start..].iter().map(|p| p.to_string()).collect();
                    cycle.push(identity.to_string());
                    return Err(PackageError::CircularDependency { cycle }.into());
                }
                Color::Black => return self.revisit(t, identity, locator),
                Color::White => {}
            }

            let mut node = DependencyNode::new(locator.clone());
            node.state = ResolutionState::InProgress;
            t.marks.insert(
                identity.clone(),
                Mark {
                    color: Color::Gray,
                    locator: locator.clone(),
                },
            );
            t.path.push(identity.clone());

            match self.expand(t, &mut node, is_root).await {
                Ok(planned) => {
                    if let Some(mark) = t.marks.get_mut(&identity) {
                        mark.color = Color::Black;
                    }
                    t.path.pop();
                    t.order.push(planned);
                    node.state = ResolutionState::Resolved;
                    Ok(node)
                }
                Err(e) => {
                    node.state = ResolutionState::Failed;
                    if let Interrupt::Failed(err) = &e {
                        debug!("Resolution of {} failed: {}", node.locator, err);
                    }
                    Err(e)
                }
            }
        }
        .boxed()
    }

    /// Fetch the node's manifest and walk its dependencies.
    async fn expand(
        &mut self,
        t: &mut Traversal,
        node: &mut DependencyNode,
        is_root: bool,
    ) -> Result<PlannedPackage, Interrupt> {
        let locator = node.locator.clone();
        let manifest = self.manifest_for(&locator, is_root).await?;

        let package_name = match &manifest {
            Some(m) => m.package_name.clone(),
            None => {
                let name = locator.default_package_name();
                if let Err(reason) = validate_package_name(&name) {
                    debug!("{} cannot be installed as '{}': {}", locator, name, reason);
                    return Err(PackageError::InvalidReference(locator.to_string()).into());
                }
                name
            }
        };
        if let Some(existing) = t.names.get(&package_name)
            && existing.identity() != locator.identity()
        {
            return Err(PackageError::UnresolvedVersionConflict {
                existing: existing.clone(),
                requested: locator,
            }
            .into());
        }
        t.names.insert(package_name.clone(), locator.clone());

        let mut dependencies = Vec::new();
        if let Some(manifest) = &manifest
            && self.options.install_dependencies
        {
            let references = manifest.dependency_references(&locator.to_string())?;
            let resolved = self.resolve_references(&references).await?;

            let mut children = Vec::with_capacity(resolved.len());
            for child in resolved {
                children.push(self.apply_pin(t, child)?);
            }
            self.prefetch(t, &children).await;

            for child in children {
                dependencies.push(child.identity());
                let child_node = self.visit(t, child, false).await?;
                node.children.push(child_node);
            }
        }

        node.manifest = manifest.clone();
        Ok(PlannedPackage {
            locator,
            manifest,
            package_name,
            dependencies,
        })
    }

    /// A Black identity reached again.
    fn revisit(
        &mut self,
        t: &mut Traversal,
        identity: PackageIdentity,
        locator: PackageLocator,
    ) -> Result<DependencyNode, Interrupt> {
        let recorded = match t.marks.get(&identity) {
            Some(mark) => mark.locator.clone(),
            None => locator.clone(),
        };
        if recorded == locator {
            return Ok(DependencyNode::duplicate_of(locator));
        }

        match (compare_refs(&recorded, &locator), recorded.git_ref(), locator.git_ref()) {
            (Some(Ordering::Greater), Some(kept), Some(requested)) => {
                t.record_upgrade(identity, requested.clone(), kept.clone());
                Ok(DependencyNode::duplicate_of(recorded))
            }
            (Some(Ordering::Equal), _, _) => Ok(DependencyNode::duplicate_of(recorded)),
            (Some(Ordering::Less), _, Some(higher)) => {
                debug!("{} outranks planned {}, pinning", locator, recorded);
                self.pins.insert(identity, higher.clone());
                Err(Interrupt::Restart)
            }
            _ => Err(PackageError::UnresolvedVersionConflict {
                existing: recorded,
                requested: locator,
            }
            .into()),
        }
    }

    /// Replace a declared ref with the pinned one for its identity, if any.
    fn apply_pin(
        &mut self,
        t: &mut Traversal,
        locator: PackageLocator,
    ) -> Result<PackageLocator, Interrupt> {
        let identity = locator.identity();
        let (Some(pin), Some(declared)) = (self.pins.get(&identity).cloned(), locator.git_ref())
        else {
            return Ok(locator);
        };
        if declared == &pin {
            return Ok(locator);
        }

        let pinned = locator.with_ref(pin.clone());
        match declared.compare(&pin) {
            Some(Ordering::Less) => {
                t.record_upgrade(identity, declared.clone(), pin);
                Ok(pinned)
            }
            Some(Ordering::Equal) => Ok(pinned),
            Some(Ordering::Greater) => {
                debug!("{} outranks pinned {}, re-pinning", locator, pin);
                self.pins.insert(identity, declared.clone());
                Err(Interrupt::Restart)
            }
            None => Err(PackageError::UnresolvedVersionConflict {
                existing: pinned,
                requested: locator,
            }
            .into()),
        }
    }

    /// Turn dependency references into locators, looking up default branches
    /// concurrently.
    async fn resolve_references(
        &mut self,
        references: &[PackageReference],
    ) -> Result<Vec<PackageLocator>, PackageError> {
        let source = self.source;
        let cached = &self.locators;

        let results: Vec<Result<PackageLocator, PackageError>> =
            stream::iter(references.iter().cloned())
                .map(|reference| {
                    let hit = cached.get(&reference).cloned();
                    async move {
                        match hit {
                            Some(locator) => Ok(locator),
                            None => source.resolve(&reference).await,
                        }
                    }
                })
                .buffered(self.options.concurrency.max(1))
                .collect()
                .await;

        let mut locators = Vec::with_capacity(results.len());
        for (reference, result) in references.iter().zip(results) {
            let locator = result?;
            self.locators.insert(reference.clone(), locator.clone());
            locators.push(locator);
        }
        Ok(locators)
    }

    /// Fetch the manifests of unvisited siblings concurrently, filling the cache.
    async fn prefetch(&mut self, t: &Traversal, locators: &[PackageLocator]) {
        let mut pending: Vec<PackageLocator> = Vec::new();
        for locator in locators {
            if t.color(&locator.identity()) == Color::White
                && !self.manifests.contains_key(locator)
                && !self.installed.contains_key(locator)
                && !pending.contains(locator)
            {
                pending.push(locator.clone());
            }
        }
        if pending.is_empty() {
            return;
        }

        debug!("Prefetching {} manifest(s)", pending.len());
        let source = self.source;
        let fetched: Vec<(PackageLocator, Result<Manifest, PackageError>)> = stream::iter(pending)
            .map(|locator| async move {
                let result = source.fetch_manifest(&locator).await;
                (locator, result)
            })
            .buffered(self.options.concurrency.max(1))
            .collect()
            .await;
        self.manifests.extend(fetched);
    }

    /// The manifest for a locator, or `None` for a manifest-less leaf.
    async fn manifest_for(
        &mut self,
        locator: &PackageLocator,
        is_root: bool,
    ) -> Result<Option<Manifest>, PackageError> {
        if let Some(manifest) = self.installed.get(locator) {
            debug!("Using installed manifest for {}", locator);
            return Ok(Some(manifest.clone()));
        }

        let result = match self.manifests.get(locator) {
            Some(result) => result.clone(),
            None => {
                let result = self.source.fetch_manifest(locator).await;
                self.manifests.insert(locator.clone(), result.clone());
                result
            }
        };

        match result {
            Ok(manifest) => Ok(Some(manifest)),
            Err(e) if e.is_soft() && !(is_root && self.options.require_root_manifest) => {
                debug!("{} has no manifest, treating it as a leaf", locator);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MockManifestSource;
    use std::sync::{Arc, Mutex};

    /// Manifests keyed by locator string; `None` means the repository has none.
    type Universe = HashMap<String, Option<String>>;

    /// A source backed by an in-memory set of repositories. Unresolved
    /// references default to `main`; unknown locators do not exist.
    fn mock_source(entries: &[(&str, Option<&str>)]) -> (MockManifestSource, Arc<Mutex<HashMap<String, usize>>>) {
        let universe: Universe = entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.map(str::to_string)))
            .collect();
        let fetches = Arc::new(Mutex::new(HashMap::new()));

        let mut source = MockManifestSource::new();
        source.expect_resolve().returning(|reference| {
            Ok(reference.locator().unwrap_or_else(|| {
                reference
                    .clone()
                    .with_ref("main")
                    .unwrap()
                    .locator()
                    .unwrap()
            }))
        });

        let counter = Arc::clone(&fetches);
        source.expect_fetch_manifest().returning(move |locator| {
            let key = locator.to_string();
            *counter.lock().unwrap().entry(key.clone()).or_insert(0) += 1;
            match universe.get(&key) {
                Some(Some(json)) => Manifest::parse(&key, json),
                Some(None) => Err(PackageError::ManifestMissing(key)),
                None => Err(PackageError::RepositoryNotFound(key)),
            }
        });
        source
            .expect_archive_url()
            .returning(|locator| format!("https://archive/{}", locator));

        (source, fetches)
    }

    fn manifest_json(name: &str, deps: &[&str]) -> String {
        serde_json::json!({ "name": name, "owner": "o", "dependencies": deps }).to_string()
    }

    fn reference(s: &str) -> PackageReference {
        PackageReference::parse(s).unwrap()
    }

    fn order(plan: &InstallPlan) -> Vec<String> {
        plan.entries.iter().map(|e| e.locator.to_string()).collect()
    }

    async fn resolve(source: &MockManifestSource, root: &str) -> Result<InstallPlan, PackageError> {
        Resolver::new(source, ResolveOptions::default())
            .resolve(&reference(root))
            .await
    }

    #[tokio::test]
    async fn test_post_order_plan() {
        let app = manifest_json("app", &["o/a@v1.0.0", "o/b@v1.0.0"]);
        let a = manifest_json("a", &["o/c@v1.0.0"]);
        let b = manifest_json("b", &["o/c@v1.0.0"]);
        let c = manifest_json("c", &[]);
        let (source, _) = mock_source(&[
            ("o/app@main", Some(&app)),
            ("o/a@v1.0.0", Some(&a)),
            ("o/b@v1.0.0", Some(&b)),
            ("o/c@v1.0.0", Some(&c)),
        ]);

        let plan = resolve(&source, "o/app").await.unwrap();

        assert_eq!(order(&plan), vec!["o/c@v1.0.0", "o/a@v1.0.0", "o/b@v1.0.0", "o/app@main"]);
        assert!(plan.upgrades.is_empty());
        assert_eq!(plan.root_entry().map(|e| e.package_name.as_str()), Some("app"));

        // c is reached twice but planned once; the second visit is a leaf
        let b_node = &plan.root.children[1];
        assert_eq!(b_node.children.len(), 1);
        assert!(b_node.children[0].duplicate);
        assert_eq!(plan.root.state, ResolutionState::Resolved);
    }

    #[tokio::test]
    async fn test_every_dependency_precedes_its_dependent() {
        let app = manifest_json("app", &["o/a@v1.0.0", "o/d@v1.0.0"]);
        let a = manifest_json("a", &["o/b@v1.0.0", "o/c@v1.0.0"]);
        let b = manifest_json("b", &["o/c@v1.0.0"]);
        let c = manifest_json("c", &[]);
        let d = manifest_json("d", &["o/b@v1.0.0"]);
        let (source, _) = mock_source(&[
            ("o/app@v1.0.0", Some(&app)),
            ("o/a@v1.0.0", Some(&a)),
            ("o/b@v1.0.0", Some(&b)),
            ("o/c@v1.0.0", Some(&c)),
            ("o/d@v1.0.0", Some(&d)),
        ]);

        let plan = resolve(&source, "o/app@v1.0.0").await.unwrap();

        for (i, entry) in plan.entries.iter().enumerate() {
            for dep in &entry.dependencies {
                let pos = plan.position(dep).unwrap();
                assert!(pos < i, "{} must come before {}", dep, entry.locator);
            }
        }
    }

    #[tokio::test]
    async fn test_cycle_reports_full_path() {
        let a = manifest_json("a", &["o/b@main"]);
        let b = manifest_json("b", &["o/c@main"]);
        let c = manifest_json("c", &["o/a@main"]);
        let (source, _) = mock_source(&[
            ("o/a@main", Some(&a)),
            ("o/b@main", Some(&b)),
            ("o/c@main", Some(&c)),
        ]);

        let err = resolve(&source, "o/a@main").await.unwrap_err();

        assert_eq!(
            err,
            PackageError::CircularDependency {
                cycle: vec!["o/a".into(), "o/b".into(), "o/c".into(), "o/a".into()]
            }
        );
    }

    #[tokio::test]
    async fn test_self_dependency_is_a_cycle() {
        let a = manifest_json("a", &["o/a@v2.0.0"]);
        let (source, _) = mock_source(&[("o/a@v1.0.0", Some(&a))]);

        let err = resolve(&source, "o/a@v1.0.0").await.unwrap_err();
        assert_eq!(
            err,
            PackageError::CircularDependency {
                cycle: vec!["o/a".into(), "o/a".into()]
            }
        );
    }

    #[tokio::test]
    async fn test_higher_tag_wins_when_seen_second() {
        let root = manifest_json("root", &["o/a@main", "o/b@main"]);
        let a = manifest_json("a", &["o/mysql@v2.0.0"]);
        let b = manifest_json("b", &["o/mysql@v1.5.0"]);
        let mysql = manifest_json("mysql", &[]);
        let (source, _) = mock_source(&[
            ("o/root@main", Some(&root)),
            ("o/a@main", Some(&a)),
            ("o/b@main", Some(&b)),
            ("o/mysql@v2.0.0", Some(&mysql)),
        ]);

        let plan = resolve(&source, "o/root").await.unwrap();

        assert_eq!(
            order(&plan),
            vec!["o/mysql@v2.0.0", "o/a@main", "o/b@main", "o/root@main"]
        );
        assert_eq!(
            plan.upgrades,
            vec![VersionUpgrade {
                identity: reference("o/mysql").identity(),
                from: GitRef::classify("v1.5.0"),
                to: GitRef::classify("v2.0.0"),
            }]
        );
    }

    #[test_log::test(tokio::test)]
    async fn test_higher_tag_wins_when_seen_first_restarts_with_pin() {
        let root = manifest_json("root", &["o/a@main", "o/b@main"]);
        let a = manifest_json("a", &["o/mysql@v1.5.0"]);
        let b = manifest_json("b", &["o/mysql@v2.0.0"]);
        let mysql_old = manifest_json("mysql", &["o/legacy@v0.1.0"]);
        let mysql = manifest_json("mysql", &[]);
        let legacy = manifest_json("legacy", &[]);
        let (source, fetches) = mock_source(&[
            ("o/root@main", Some(&root)),
            ("o/a@main", Some(&a)),
            ("o/b@main", Some(&b)),
            ("o/mysql@v1.5.0", Some(&mysql_old)),
            ("o/mysql@v2.0.0", Some(&mysql)),
            ("o/legacy@v0.1.0", Some(&legacy)),
        ]);

        let plan = resolve(&source, "o/root").await.unwrap();

        // the losing version and its private dependency are gone from the plan
        assert_eq!(
            order(&plan),
            vec!["o/mysql@v2.0.0", "o/a@main", "o/b@main", "o/root@main"]
        );
        assert_eq!(plan.upgrades.len(), 1);
        assert_eq!(plan.upgrades[0].from, GitRef::classify("v1.5.0"));
        assert_eq!(plan.upgrades[0].to, GitRef::classify("v2.0.0"));

        // the restart reused cached manifests
        let fetches = fetches.lock().unwrap();
        assert!(fetches.values().all(|&n| n == 1), "{:?}", fetches);
    }

    #[test_log::test(tokio::test)]
    async fn test_branch_against_tag_is_unresolved_conflict() {
        let root = manifest_json("root", &["o/a@main", "o/b@main"]);
        let a = manifest_json("a", &["o/mysql@branch-x"]);
        let b = manifest_json("b", &["o/mysql@v1.0.0"]);
        let mysql = manifest_json("mysql", &[]);
        let (source, _) = mock_source(&[
            ("o/root@main", Some(&root)),
            ("o/a@main", Some(&a)),
            ("o/b@main", Some(&b)),
            ("o/mysql@branch-x", Some(&mysql)),
            ("o/mysql@v1.0.0", Some(&mysql)),
        ]);

        let err = resolve(&source, "o/root").await.unwrap_err();

        assert_eq!(
            err,
            PackageError::UnresolvedVersionConflict {
                existing: reference("o/mysql@branch-x").locator().unwrap(),
                requested: reference("o/mysql@v1.0.0").locator().unwrap(),
            }
        );
    }

    #[tokio::test]
    async fn test_two_branches_conflict() {
        let root = manifest_json("root", &["o/x@dev", "o/x@main"]);
        let x = manifest_json("x", &[]);
        let (source, _) = mock_source(&[
            ("o/root@v1.0.0", Some(&root)),
            ("o/x@dev", Some(&x)),
            ("o/x@main", Some(&x)),
        ]);

        let err = resolve(&source, "o/root@v1.0.0").await.unwrap_err();
        assert!(matches!(err, PackageError::UnresolvedVersionConflict { .. }));
    }

    #[tokio::test]
    async fn test_pinned_tag_against_branch_conflicts() {
        // a pins mysql to v2 via a restart; c then asks for a branch
        let root = manifest_json("root", &["o/a@main", "o/b@main", "o/c@main"]);
        let a = manifest_json("a", &["o/mysql@v1.0.0"]);
        let b = manifest_json("b", &["o/mysql@v2.0.0"]);
        let c = manifest_json("c", &["o/mysql@dev"]);
        let mysql = manifest_json("mysql", &[]);
        let (source, _) = mock_source(&[
            ("o/root@main", Some(&root)),
            ("o/a@main", Some(&a)),
            ("o/b@main", Some(&b)),
            ("o/c@main", Some(&c)),
            ("o/mysql@v1.0.0", Some(&mysql)),
            ("o/mysql@v2.0.0", Some(&mysql)),
            ("o/mysql@dev", Some(&mysql)),
        ]);

        let err = resolve(&source, "o/root").await.unwrap_err();
        assert!(matches!(err, PackageError::UnresolvedVersionConflict { .. }));
    }

    #[tokio::test]
    async fn test_resolution_is_idempotent() {
        let root = manifest_json("root", &["o/a@main", "o/b@main", "o/bare@v1.0.0"]);
        let a = manifest_json("a", &["o/mysql@v1.5.0"]);
        let b = manifest_json("b", &["o/mysql@v2.0.0", "o/a@main"]);
        let mysql = manifest_json("mysql", &[]);
        let (source, _) = mock_source(&[
            ("o/root@main", Some(&root)),
            ("o/a@main", Some(&a)),
            ("o/b@main", Some(&b)),
            ("o/mysql@v1.5.0", Some(&mysql)),
            ("o/mysql@v2.0.0", Some(&mysql)),
            ("o/bare@v1.0.0", None),
        ]);

        let first = resolve(&source, "o/root").await.unwrap();
        let second = resolve(&source, "o/root").await.unwrap();
        assert_eq!(first, second);

        let mut resolver = Resolver::new(&source, ResolveOptions::default());
        let third = resolver.resolve(&reference("o/root")).await.unwrap();
        let fourth = resolver.resolve(&reference("o/root")).await.unwrap();
        assert_eq!(third, first);
        assert_eq!(fourth, first);
    }

    #[tokio::test]
    async fn test_missing_manifest_is_leaf() {
        let root = manifest_json("root", &["o/bare@v1.0.0"]);
        let (source, _) = mock_source(&[("o/root@main", Some(&root)), ("o/bare@v1.0.0", None)]);

        let plan = resolve(&source, "o/root").await.unwrap();

        assert_eq!(order(&plan), vec!["o/bare@v1.0.0", "o/root@main"]);
        let bare = &plan.entries[0];
        assert_eq!(bare.manifest, None);
        assert_eq!(bare.package_name, "bare");
        assert!(bare.dependencies.is_empty());
    }

    #[tokio::test]
    async fn test_missing_root_manifest() {
        let (source, _) = mock_source(&[("o/bare@v1.0.0", None)]);

        let plan = resolve(&source, "o/bare@v1.0.0").await.unwrap();
        assert_eq!(order(&plan), vec!["o/bare@v1.0.0"]);

        let options = ResolveOptions {
            require_root_manifest: true,
            ..ResolveOptions::default()
        };
        let err = Resolver::new(&source, options)
            .resolve(&reference("o/bare@v1.0.0"))
            .await
            .unwrap_err();
        assert_eq!(err, PackageError::ManifestMissing("o/bare@v1.0.0".into()));
    }

    #[tokio::test]
    async fn test_missing_repository_is_fatal() {
        let root = manifest_json("root", &["o/ghost@v1.0.0"]);
        let (source, _) = mock_source(&[("o/root@main", Some(&root))]);

        let err = resolve(&source, "o/root").await.unwrap_err();
        assert_eq!(err, PackageError::RepositoryNotFound("o/ghost@v1.0.0".into()));
    }

    #[tokio::test]
    async fn test_without_dependencies_only_root_is_planned() {
        let root = manifest_json("root", &["o/a@v1.0.0"]);
        let (source, fetches) = mock_source(&[("o/root@main", Some(&root))]);

        let options = ResolveOptions {
            install_dependencies: false,
            ..ResolveOptions::default()
        };
        let plan = Resolver::new(&source, options)
            .resolve(&reference("o/root"))
            .await
            .unwrap();

        assert_eq!(order(&plan), vec!["o/root@main"]);
        assert!(!fetches.lock().unwrap().contains_key("o/a@v1.0.0"));
    }

    #[tokio::test]
    async fn test_same_package_name_from_different_repos_conflicts() {
        let root = manifest_json("root", &["alice/json@v1.0.0", "bob/json@v1.0.0"]);
        let json = manifest_json("json", &[]);
        let (source, _) = mock_source(&[
            ("o/root@main", Some(&root)),
            ("alice/json@v1.0.0", Some(&json)),
            ("bob/json@v1.0.0", Some(&json)),
        ]);

        let err = resolve(&source, "o/root").await.unwrap_err();
        assert_eq!(
            err,
            PackageError::UnresolvedVersionConflict {
                existing: reference("alice/json@v1.0.0").locator().unwrap(),
                requested: reference("bob/json@v1.0.0").locator().unwrap(),
            }
        );
    }

    #[tokio::test]
    async fn test_installed_immutable_manifests_skip_the_network() {
        let root = manifest_json("root", &["o/a@v1.0.0", "o/b@main"]);
        let installed_a = Manifest::parse("o/a", &manifest_json("a", &[])).unwrap();
        let installed_b = Manifest::parse("o/b", &manifest_json("b", &[])).unwrap();
        let b = manifest_json("b", &[]);
        let (source, fetches) = mock_source(&[("o/root@main", Some(&root)), ("o/b@main", Some(&b))]);

        let installed = HashMap::from([
            (reference("o/a@v1.0.0").locator().unwrap(), installed_a),
            (reference("o/b@main").locator().unwrap(), installed_b),
        ]);
        let plan = Resolver::new(&source, ResolveOptions::default())
            .with_installed(installed)
            .resolve(&reference("o/root"))
            .await
            .unwrap();

        assert_eq!(order(&plan), vec!["o/a@v1.0.0", "o/b@main", "o/root@main"]);
        let fetches = fetches.lock().unwrap();
        assert!(!fetches.contains_key("o/a@v1.0.0"));
        // branches may have moved, so they are always fetched
        assert_eq!(fetches.get("o/b@main"), Some(&1));
    }

    #[tokio::test]
    async fn test_unresolved_dependency_uses_default_branch() {
        let root = manifest_json("root", &["o/a"]);
        let a = manifest_json("a", &[]);
        let (source, _) = mock_source(&[("o/root@v1.0.0", Some(&root)), ("o/a@main", Some(&a))]);

        let plan = resolve(&source, "o/root@v1.0.0").await.unwrap();
        assert_eq!(order(&plan), vec!["o/a@main", "o/root@v1.0.0"]);
    }

    #[tokio::test]
    async fn test_default_branch_lookups_are_shared_by_siblings_and_restarts() {
        let manifests: HashMap<String, String> = [
            ("o/root@v1.0.0", manifest_json("root", &["o/x@v1.0.0", "o/y@v1.0.0"])),
            ("o/x@v1.0.0", manifest_json("x", &["o/lib", "o/m@v1.0.0"])),
            ("o/y@v1.0.0", manifest_json("y", &["o/lib", "o/m@v2.0.0"])),
            ("o/lib@trunk", manifest_json("lib", &[])),
            ("o/m@v1.0.0", manifest_json("m", &[])),
            ("o/m@v2.0.0", manifest_json("m", &[])),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        let lookups = Arc::new(Mutex::new(Vec::new()));

        let mut source = MockManifestSource::new();
        let seen = Arc::clone(&lookups);
        source.expect_resolve().returning(move |reference| match reference.locator() {
            Some(locator) => Ok(locator),
            None => {
                seen.lock().unwrap().push(reference.to_string());
                Ok(reference.clone().with_ref("trunk").unwrap().locator().unwrap())
            }
        });
        source.expect_fetch_manifest().returning(move |locator| {
            let key = locator.to_string();
            match manifests.get(&key) {
                Some(json) => Manifest::parse(&key, json),
                None => Err(PackageError::RepositoryNotFound(key)),
            }
        });

        let plan = resolve(&source, "o/root@v1.0.0").await.unwrap();

        assert_eq!(
            order(&plan),
            vec!["o/lib@trunk", "o/m@v2.0.0", "o/x@v1.0.0", "o/y@v1.0.0", "o/root@v1.0.0"]
        );
        assert_eq!(*lookups.lock().unwrap(), vec!["o/lib".to_string()]);
    }

    #[tokio::test]
    async fn test_remote_leaf_with_unusable_directory_name_is_rejected() {
        for url in ["https://example.com/pkg/..", "https://example.com/dl/.zip", "https://example.com/.staging"] {
            let root = serde_json::json!({ "name": "root", "dependencies": [url] }).to_string();
            let (source, _) = mock_source(&[("o/root@v1.0.0", Some(&root)), (url, None)]);

            let err = resolve(&source, "o/root@v1.0.0").await.unwrap_err();
            assert_eq!(err, PackageError::InvalidReference(url.to_string()), "{}", url);
        }
    }

    #[tokio::test]
    async fn test_invalid_dependency_in_manifest_fails() {
        let (source, _) = mock_source(&[(
            "o/root@main",
            Some(r#"{"name": "root", "dependencies": ["o/a@"]}"#),
        )]);

        let err = resolve(&source, "o/root").await.unwrap_err();
        // Manifest::parse rejects it before the resolver sees it
        assert!(matches!(err, PackageError::InvalidManifest { .. }));
    }
}
