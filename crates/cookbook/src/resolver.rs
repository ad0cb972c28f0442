//! Dependency resolution over the version catalog.
//!
//! Resolution is constraint satisfaction over the dependency graph reachable
//! from the run list: every cookbook in the transitive closure gets exactly
//! one version, chosen as the highest candidate satisfying the intersection
//! of all constraints currently in force. A greedy choice that later proves
//! unsatisfiable is undone by depth-first backtracking, which retries the
//! next-highest candidate of the most recently fixed cookbook.
//!
//! The output is deterministic: candidates are tried highest-version first
//! and the next cookbook to fix is always the lexicographically smallest
//! unassigned name.

use crate::error::{Constraint, Error, Result};
use crate::types::{Catalog, RunList};
use semver::Version;
use std::collections::{BTreeMap, BTreeSet};

/// Resolve a run list against a catalog into one version per cookbook.
///
/// Fails with [`Error::MissingCookbook`] when a referenced name has no
/// catalog entry at all, or [`Error::Unsatisfiable`] when no assignment
/// exists; there is no partial resolution.
pub fn resolve(run_list: &RunList, catalog: &Catalog) -> Result<BTreeMap<String, Version>> {
    let solver = Solver::new(run_list, catalog);
    solver.solve()
}

struct Solver<'a> {
    catalog: &'a Catalog,
    roots: Vec<String>,
    root_constraints: Vec<(String, Constraint)>,
}

impl<'a> Solver<'a> {
    fn new(run_list: &RunList, catalog: &'a Catalog) -> Self {
        let roots = run_list
            .cookbooks()
            .into_iter()
            .map(ToString::to_string)
            .collect();

        let mut root_constraints = Vec::new();
        for item in &run_list.items {
            if let Some(pin) = &item.pin {
                root_constraints.push((
                    item.cookbook.clone(),
                    Constraint {
                        required_by: "run list".to_string(),
                        req: pin.clone(),
                    },
                ));
            }
        }

        Self {
            catalog,
            roots,
            root_constraints,
        }
    }

    fn solve(&self) -> Result<BTreeMap<String, Version>> {
        let mut assignment = BTreeMap::new();
        let mut failure = None;
        if self.step(&mut assignment, &mut failure) {
            Ok(assignment)
        } else {
            Err(failure.unwrap_or_else(|| Error::Unsatisfiable {
                name: self.roots.first().cloned().unwrap_or_default(),
                constraints: Vec::new(),
            }))
        }
    }

    /// One backtracking step: verify the partial assignment, fix the next
    /// cookbook, recurse. Returns `true` when a full assignment was reached.
    fn step(
        &self,
        assignment: &mut BTreeMap<String, Version>,
        failure: &mut Option<Error>,
    ) -> bool {
        let constraints = self.constraints_in_force(assignment);

        // A constraint introduced by a later choice may invalidate an
        // earlier assignment; detect it here so the caller backtracks.
        for (name, version) in assignment.iter() {
            if let Some(in_force) = constraints.get(name)
                && !in_force.iter().all(|c| c.req.matches(version))
            {
                *failure = Some(Error::Unsatisfiable {
                    name: name.clone(),
                    constraints: in_force.clone(),
                });
                return false;
            }
        }

        let required = self.required_names(assignment);
        let Some(next) = required.iter().find(|n| !assignment.contains_key(*n)) else {
            return true; // every reachable cookbook is assigned
        };

        if !self.catalog.contains(next) {
            *failure = Some(Error::MissingCookbook {
                name: next.clone(),
                required_by: self.requester_of(next, assignment),
            });
            return false;
        }

        let in_force = constraints.get(next).cloned().unwrap_or_default();
        let mut any_candidate = false;
        for candidate in self.catalog.versions_desc(next) {
            if !in_force.iter().all(|c| c.req.matches(&candidate.version)) {
                continue;
            }
            any_candidate = true;
            assignment.insert(next.clone(), candidate.version.clone());
            if self.step(assignment, failure) {
                return true;
            }
            assignment.remove(next);
        }

        if !any_candidate {
            *failure = Some(Error::Unsatisfiable {
                name: next.clone(),
                constraints: in_force,
            });
        }
        false
    }

    /// Cookbook names reachable from the run list through the assigned
    /// versions' declared dependencies.
    fn required_names(&self, assignment: &BTreeMap<String, Version>) -> BTreeSet<String> {
        let mut required: BTreeSet<String> = self.roots.iter().cloned().collect();
        for (name, version) in assignment {
            if let Some(cookbook) = self.catalog.get(name, version) {
                required.extend(cookbook.dependencies.keys().cloned());
            }
        }
        required
    }

    /// Every constraint currently in force, keyed by target cookbook.
    fn constraints_in_force(
        &self,
        assignment: &BTreeMap<String, Version>,
    ) -> BTreeMap<String, Vec<Constraint>> {
        let mut constraints: BTreeMap<String, Vec<Constraint>> = BTreeMap::new();
        for (name, constraint) in &self.root_constraints {
            constraints
                .entry(name.clone())
                .or_default()
                .push(constraint.clone());
        }
        for (name, version) in assignment {
            if let Some(cookbook) = self.catalog.get(name, version) {
                for (dep, req) in &cookbook.dependencies {
                    constraints.entry(dep.clone()).or_default().push(Constraint {
                        required_by: cookbook.label(),
                        req: req.clone(),
                    });
                }
            }
        }
        constraints
    }

    /// Best-effort provenance for a missing cookbook.
    fn requester_of(&self, name: &str, assignment: &BTreeMap<String, Version>) -> String {
        if self.roots.iter().any(|r| r == name) {
            return "run list".to_string();
        }
        for (assigned, version) in assignment {
            if let Some(cookbook) = self.catalog.get(assigned, version)
                && cookbook.dependencies.contains_key(name)
            {
                return cookbook.label();
            }
        }
        "run list".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{parse_constraint, parse_version, CookbookVersion};

    fn cookbook(name: &str, version: &str, deps: &[(&str, &str)]) -> CookbookVersion {
        let mut cb = CookbookVersion::new(name, parse_version(version).unwrap());
        for (dep, req) in deps {
            cb = cb.with_dependency(*dep, parse_constraint(req).unwrap());
        }
        cb
    }

    #[test]
    fn picks_highest_version_in_range() {
        // cookbook_x@1.0 depends on cookbook_y ">=2.0,<3.0"; catalog has
        // y 1.9, 2.1, 2.9, 3.0 -> resolver must pick y 2.9.
        let mut catalog = Catalog::new();
        catalog.add(cookbook("cookbook_x", "1.0", &[("cookbook_y", ">=2.0, <3.0")]));
        for v in ["1.9", "2.1", "2.9", "3.0"] {
            catalog.add(cookbook("cookbook_y", v, &[]));
        }

        let run_list = RunList::parse(["cookbook_x@1.0"]).unwrap();
        let resolved = resolve(&run_list, &catalog).unwrap();

        assert_eq!(resolved["cookbook_x"], parse_version("1.0").unwrap());
        assert_eq!(resolved["cookbook_y"], parse_version("2.9").unwrap());
    }

    #[test]
    fn backtracks_when_greedy_choice_conflicts() {
        // Highest b (2.0) needs c >= 2.0, but only c 1.5 exists. The solver
        // must retry with b 1.0, whose constraint c < 2.0 is satisfiable.
        let mut catalog = Catalog::new();
        catalog.add(cookbook(
            "a",
            "1.0",
            &[("b", ">=1.0"), ("c", ">=1.0")],
        ));
        catalog.add(cookbook("b", "2.0", &[("c", ">=2.0")]));
        catalog.add(cookbook("b", "1.0", &[("c", "<2.0")]));
        catalog.add(cookbook("c", "1.5", &[]));

        let run_list = RunList::parse(["a"]).unwrap();
        let resolved = resolve(&run_list, &catalog).unwrap();

        assert_eq!(resolved["b"], parse_version("1.0").unwrap());
        assert_eq!(resolved["c"], parse_version("1.5").unwrap());
    }

    #[test]
    fn transitive_dependencies_are_included() {
        let mut catalog = Catalog::new();
        catalog.add(cookbook("app", "0.5", &[("lib", ">=1.0")]));
        catalog.add(cookbook("lib", "1.4", &[("base", ">=0.1")]));
        catalog.add(cookbook("base", "0.3", &[]));

        let run_list = RunList::parse(["app"]).unwrap();
        let resolved = resolve(&run_list, &catalog).unwrap();

        assert_eq!(resolved.len(), 3);
        assert_eq!(resolved["base"], parse_version("0.3").unwrap());
    }

    #[test]
    fn missing_cookbook_is_reported_with_requester() {
        let mut catalog = Catalog::new();
        catalog.add(cookbook("app", "1.0", &[("ghost", ">=1.0")]));

        let run_list = RunList::parse(["app"]).unwrap();
        let err = resolve(&run_list, &catalog).unwrap_err();

        match err {
            Error::MissingCookbook { name, required_by } => {
                assert_eq!(name, "ghost");
                assert_eq!(required_by, "app (1.0.0)");
            }
            other => panic!("expected MissingCookbook, got {other}"),
        }
    }

    #[test]
    fn unsatisfiable_reports_conflicting_constraints() {
        let mut catalog = Catalog::new();
        catalog.add(cookbook("a", "1.0", &[("shared", ">=2.0")]));
        catalog.add(cookbook("b", "1.0", &[("shared", "<2.0")]));
        catalog.add(cookbook("shared", "1.0", &[]));
        catalog.add(cookbook("shared", "2.5", &[]));

        let run_list = RunList::parse(["a", "b"]).unwrap();
        let err = resolve(&run_list, &catalog).unwrap_err();

        match err {
            Error::Unsatisfiable { name, constraints } => {
                assert_eq!(name, "shared");
                assert!(constraints.len() >= 2, "both requirements reported");
            }
            other => panic!("expected Unsatisfiable, got {other}"),
        }
    }

    #[test]
    fn resolution_is_deterministic() {
        let mut catalog = Catalog::new();
        catalog.add(cookbook("app", "1.0", &[("lib", ">=1.0")]));
        for v in ["1.0", "1.1", "1.2", "2.0"] {
            catalog.add(cookbook("lib", v, &[]));
        }

        let run_list = RunList::parse(["app"]).unwrap();
        let first = resolve(&run_list, &catalog).unwrap();
        for _ in 0..10 {
            assert_eq!(resolve(&run_list, &catalog).unwrap(), first);
        }
    }

    #[test]
    fn empty_run_list_resolves_to_nothing() {
        let catalog = Catalog::new();
        let run_list = RunList::default();
        assert!(resolve(&run_list, &catalog).unwrap().is_empty());
    }
}
