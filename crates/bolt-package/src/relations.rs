//! Build dependency specifications.

use std::{
    cmp::Ordering,
    collections::HashMap,
    fmt::{self, Display, Formatter},
};

use crate::{descriptor::DescriptorNode, version::compare_versions};

/// A single required package with an optional version constraint.
///
/// The constraint is kept as written (for example `>= 2.0`) and is only
/// interpreted by a [`PackageSet`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dependency {
    pub name: String,
    pub version: Option<String>,
}

impl Display for Dependency {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{} ({})", self.name, version),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Something that can tell whether a dependency is satisfied, typically the
/// set of installed or available packages.
pub trait PackageSet {
    fn satisfies(&self, dependency: &Dependency) -> bool;
}

/// Ordered list of dependencies from a descriptor's `requires` element.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DependencySpecification {
    dependencies: Vec<Dependency>,
}

impl DependencySpecification {
    pub fn new(dependencies: Vec<Dependency>) -> Self {
        Self {
            dependencies,
        }
    }

    /// Builds the specification from `<package name=".." version=".."/>`
    /// children of a `requires` node.
    pub fn from_node(node: &DescriptorNode) -> Self {
        let dependencies = node
            .select("package")
            .into_iter()
            .filter_map(|pkg| {
                let name = pkg.attr("name")?.trim();
                (!name.is_empty()).then(|| {
                    Dependency {
                        name: name.to_string(),
                        version: pkg
                            .attr("version")
                            .map(str::trim)
                            .filter(|v| !v.is_empty())
                            .map(String::from),
                    }
                })
            })
            .collect();

        Self {
            dependencies,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Dependency> {
        self.dependencies.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    /// Dependencies that `packages` does not satisfy, in declaration order.
    pub fn unfulfilled<'a>(&'a self, packages: &dyn PackageSet) -> Vec<&'a Dependency> {
        self.dependencies
            .iter()
            .filter(|dep| !packages.satisfies(dep))
            .collect()
    }
}

/// A name to version map, as produced by listing installed packages.
///
/// Constraints are read as `<op> <version>` with the operators `<<`, `<=`,
/// `=`, `>=`, `>>` (and `<`, `>` as aliases of `<=`, `>=`).
impl PackageSet for HashMap<String, String> {
    fn satisfies(&self, dependency: &Dependency) -> bool {
        let Some(installed) = self.get(&dependency.name) else {
            return false;
        };
        let Some(constraint) = dependency.version.as_deref() else {
            return true;
        };

        let constraint = constraint.trim();
        let split = constraint
            .find(|c: char| !matches!(c, '<' | '>' | '='))
            .unwrap_or(constraint.len());
        let (op, wanted) = constraint.split_at(split);
        let ord = compare_versions(installed, wanted.trim());

        match op {
            "<<" => ord == Ordering::Less,
            "<=" | "<" => ord != Ordering::Greater,
            "=" | "==" | "" => ord == Ordering::Equal,
            ">=" | ">" => ord != Ordering::Less,
            ">>" => ord == Ordering::Greater,
            _ => false,
        }
    }
}
