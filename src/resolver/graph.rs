//! Resolution results: the dependency tree and the ordered install plan.

use std::fmt::Write;

use crate::locator::{GitRef, PackageIdentity, PackageLocator};
use crate::manifest::Manifest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionState {
    Unvisited,
    InProgress,
    Resolved,
    Failed,
}

/// A node of the resolved dependency tree.
///
/// Nodes own their children and keep no parent links. A package reached a
/// second time appears as a childless leaf with `duplicate` set.
#[derive(Debug, Clone, PartialEq)]
pub struct DependencyNode {
    pub locator: PackageLocator,
    pub manifest: Option<Manifest>,
    pub children: Vec<DependencyNode>,
    pub state: ResolutionState,
    pub duplicate: bool,
}

impl DependencyNode {
    pub fn new(locator: PackageLocator) -> Self {
        Self {
            locator,
            manifest: None,
            children: Vec::new(),
            state: ResolutionState::Unvisited,
            duplicate: false,
        }
    }

    /// A leaf standing in for a package already resolved elsewhere in the tree.
    pub fn duplicate_of(locator: PackageLocator) -> Self {
        Self {
            state: ResolutionState::Resolved,
            duplicate: true,
            ..Self::new(locator)
        }
    }

    /// Render the tree one package per line, `cargo tree` style.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", self.label());
        self.render_children("", &mut out);
        out
    }

    fn label(&self) -> String {
        let mut label = self.locator.to_string();
        if self.manifest.is_none() && !self.duplicate {
            label.push_str(" (no manifest)");
        }
        if self.duplicate {
            label.push_str(" (*)");
        }
        label
    }

    fn render_children(&self, prefix: &str, out: &mut String) {
        let count = self.children.len();
        for (i, child) in self.children.iter().enumerate() {
            let last = i + 1 == count;
            let (branch, indent) = if last { ("└── ", "    ") } else { ("├── ", "│   ") };
            let _ = writeln!(out, "{}{}{}", prefix, branch, child.label());
            child.render_children(&format!("{}{}", prefix, indent), out);
        }
    }
}

/// One package in install order.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedPackage {
    pub locator: PackageLocator,
    pub manifest: Option<Manifest>,
    /// Directory name under the install root
    pub package_name: String,
    /// Identities of the direct dependencies, in declared order
    pub dependencies: Vec<PackageIdentity>,
}

/// A conflict settled by keeping the higher tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionUpgrade {
    pub identity: PackageIdentity,
    pub from: GitRef,
    pub to: GitRef,
}

/// Dependencies first, each package exactly once, at its winning version.
#[derive(Debug, Clone, PartialEq)]
pub struct InstallPlan {
    pub entries: Vec<PlannedPackage>,
    pub root: DependencyNode,
    pub upgrades: Vec<VersionUpgrade>,
}

impl InstallPlan {
    /// The root package is always planned last.
    pub fn root_entry(&self) -> Option<&PlannedPackage> {
        self.entries.last()
    }

    pub fn position(&self, identity: &PackageIdentity) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| &e.locator.identity() == identity)
    }
}
