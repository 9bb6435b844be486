//! Dependency resolution for module action graphs.
//!
//! Edges run from every reference an action consumes back to the action that
//! produces it. The sort is a deterministic Kahn topological order with ties
//! broken by declaration order, so the execution sequence is stable across
//! runs of an unchanged module graph.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::ResolveError;
use crate::module::{ActionDecl, ActionId, Module};

/// A resolved, topologically ordered execution plan.
#[derive(Debug)]
pub struct ExecutionPlan {
    actions: Vec<ActionDecl>,
}

impl ExecutionPlan {
    /// Resolve the full action graph of `module`, transitively through every
    /// reused module.
    ///
    /// Guarantee: if action B consumes a reference to action A's result, A is
    /// ordered strictly before B. True cycles fail with
    /// [`ResolveError::CyclicDependency`] and nothing executes.
    pub fn resolve(module: &Module) -> Result<Self, ResolveError> {
        let mut seen = BTreeMap::new();
        let mut actions = Vec::new();
        collect(module, &mut seen, &mut actions)?;
        Self::order(actions)
    }

    /// Topologically order a flat action list.
    pub(crate) fn order(actions: Vec<ActionDecl>) -> Result<Self, ResolveError> {
        let index: BTreeMap<&ActionId, usize> = actions
            .iter()
            .enumerate()
            .map(|(i, action)| (&action.id, i))
            .collect();

        let mut indegree = vec![0usize; actions.len()];
        let mut successors: Vec<Vec<usize>> = vec![Vec::new(); actions.len()];
        let mut producers: Vec<Vec<usize>> = vec![Vec::new(); actions.len()];

        for (consumer, action) in actions.iter().enumerate() {
            for dep in action.dependencies() {
                let producer = *index.get(&dep).ok_or_else(|| ResolveError::DanglingReference {
                    id: dep.clone(),
                    consumer: action.id.clone(),
                })?;
                successors[producer].push(consumer);
                producers[consumer].push(producer);
                indegree[consumer] += 1;
            }
        }

        // Kahn's algorithm over a BTreeSet: the smallest ready index runs
        // first, which is exactly declaration order.
        let mut ready: BTreeSet<usize> = indegree
            .iter()
            .enumerate()
            .filter(|&(_, degree)| *degree == 0)
            .map(|(i, _)| i)
            .collect();
        let mut order = Vec::with_capacity(actions.len());

        while let Some(next) = ready.pop_first() {
            order.push(next);
            for &successor in &successors[next] {
                indegree[successor] -= 1;
                if indegree[successor] == 0 {
                    ready.insert(successor);
                }
            }
        }

        if order.len() < actions.len() {
            let ordered: BTreeSet<usize> = order.iter().copied().collect();
            return Err(ResolveError::CyclicDependency {
                path: find_cycle(&actions, &producers, &ordered),
            });
        }

        let mut by_position: Vec<Option<ActionDecl>> = actions.into_iter().map(Some).collect();
        let actions = order
            .into_iter()
            .filter_map(|i| by_position[i].take())
            .collect();
        Ok(Self { actions })
    }

    pub(crate) fn actions(&self) -> &[ActionDecl] {
        &self.actions
    }

    /// Action identifiers in execution order.
    pub fn action_ids(&self) -> impl Iterator<Item = &ActionId> {
        self.actions.iter().map(|action| &action.id)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Flatten a module tree into declaration order, submodules first.
///
/// Reuse is deduplicated by identity: the same module reached through
/// several paths contributes its actions exactly once, while a *different*
/// module under an already-seen name is rejected before its identifiers can
/// shadow the original's.
fn collect(
    module: &Module,
    seen: &mut BTreeMap<String, Module>,
    out: &mut Vec<ActionDecl>,
) -> Result<(), ResolveError> {
    if let Some(existing) = seen.get(module.name()) {
        if existing.ptr_eq(module) {
            return Ok(());
        }
        return Err(ResolveError::ModuleCollision {
            name: module.name().to_string(),
        });
    }
    seen.insert(module.name().to_string(), module.clone());
    for submodule in &module.inner().submodules {
        collect(submodule, seen, out)?;
    }
    out.extend(module.inner().actions.iter().cloned());
    Ok(())
}

/// Walk producer edges among the unsortable remainder until a node repeats.
fn find_cycle(
    actions: &[ActionDecl],
    producers: &[Vec<usize>],
    ordered: &BTreeSet<usize>,
) -> Vec<ActionId> {
    let remaining: BTreeSet<usize> = (0..actions.len())
        .filter(|i| !ordered.contains(i))
        .collect();
    let Some(&start) = remaining.iter().next() else {
        return Vec::new();
    };

    let mut position: BTreeMap<usize, usize> = BTreeMap::new();
    let mut path: Vec<usize> = Vec::new();
    let mut current = start;
    loop {
        if let Some(&first) = position.get(&current) {
            let mut cycle: Vec<ActionId> =
                path[first..].iter().map(|&i| actions[i].id.clone()).collect();
            cycle.push(actions[current].id.clone());
            return cycle;
        }
        position.insert(current, path.len());
        path.push(current);
        match producers[current]
            .iter()
            .copied()
            .find(|p| remaining.contains(p))
        {
            Some(producer) => current = producer,
            // Unreachable for a true cycle; report what was walked.
            None => return path.iter().map(|&i| actions[i].id.clone()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::module::{ActionKind, Arg};

    fn decl(module: &str, local: &str, deps: &[&str]) -> ActionDecl {
        // Hand-built deploys whose args reference other actions; the public
        // builder cannot express cycles, so tests construct decls directly.
        let args = deps
            .iter()
            .map(|dep| Arg::ContractAddress {
                id: ActionId::new(module, dep),
            })
            .collect();
        ActionDecl {
            id: ActionId::new(module, local),
            kind: ActionKind::Deploy {
                contract: local.to_string(),
                args,
                from: None,
            },
        }
    }

    fn positions(plan: &ExecutionPlan) -> BTreeMap<String, usize> {
        plan.action_ids()
            .enumerate()
            .map(|(i, id)| (id.as_str().to_string(), i))
            .collect()
    }

    #[test]
    fn producers_order_before_consumers() {
        let actions = vec![
            decl("M", "c", &["a", "b"]),
            decl("M", "b", &["a"]),
            decl("M", "a", &[]),
        ];
        let plan = ExecutionPlan::order(actions).expect("acyclic graph resolves");
        let pos = positions(&plan);
        assert!(pos["M#a"] < pos["M#b"]);
        assert!(pos["M#b"] < pos["M#c"]);
    }

    #[test]
    fn ties_break_by_declaration_order() {
        let actions = vec![
            decl("M", "a", &[]),
            decl("M", "b", &[]),
            decl("M", "c", &[]),
        ];
        let plan = ExecutionPlan::order(actions).expect("independent actions resolve");
        let ids: Vec<_> = plan.action_ids().map(ActionId::as_str).collect();
        assert_eq!(ids, vec!["M#a", "M#b", "M#c"]);
    }

    #[test]
    fn cycle_is_rejected_with_its_path() {
        let actions = vec![
            decl("M", "a", &["b"]),
            decl("M", "b", &["a"]),
        ];
        let err = ExecutionPlan::order(actions).expect_err("cycle must not resolve");
        match err {
            ResolveError::CyclicDependency { path } => {
                assert!(path.len() >= 3, "path closes the loop: {path:?}");
                assert_eq!(path.first(), path.last());
            }
            other => panic!("expected CyclicDependency, got {other:?}"),
        }
    }

    #[test]
    fn unknown_reference_is_dangling() {
        let actions = vec![decl("M", "a", &["ghost"])];
        let err = ExecutionPlan::order(actions).expect_err("dangling must not resolve");
        assert!(matches!(
            err,
            ResolveError::DanglingReference { id, .. } if id.as_str() == "M#ghost"
        ));
    }

    #[test]
    fn random_dags_always_respect_edges() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let n = rng.random_range(2..20);
            // Declare consumers before their producers so the sort has to
            // reorder; depending only on higher indices keeps it acyclic.
            let actions: Vec<ActionDecl> = (0..n)
                .map(|i| {
                    let deps: Vec<String> = (i + 1..n)
                        .filter(|_| rng.random_bool(0.3))
                        .map(|j| format!("a{j}"))
                        .collect();
                    let dep_refs: Vec<&str> = deps.iter().map(String::as_str).collect();
                    decl("R", &format!("a{i}"), &dep_refs)
                })
                .collect();

            let edges: Vec<(String, String)> = actions
                .iter()
                .flat_map(|action| {
                    action
                        .dependencies()
                        .into_iter()
                        .map(|dep| (dep.as_str().to_string(), action.id.as_str().to_string()))
                })
                .collect();

            let plan = ExecutionPlan::order(actions).expect("generated graphs are acyclic");
            let pos = positions(&plan);
            for (producer, consumer) in edges {
                assert!(
                    pos[&producer] < pos[&consumer],
                    "{producer} must run before {consumer}"
                );
            }
        }
    }

    #[test]
    fn resolve_deduplicates_shared_submodules() {
        let base = Module::build("Base", |m| {
            let token = m.contract("Token", [])?;
            m.export("token", &token);
            Ok(())
        })
        .expect("builds");

        let left = Module::build("Left", |m| {
            let token = m.use_module(&base)?.contract("token")?;
            m.call(&token, "pause", [])?;
            Ok(())
        })
        .expect("builds");

        let right = Module::build("Right", |m| {
            let token = m.use_module(&base)?.contract("token")?;
            m.call(&token, "unpause", [])?;
            Ok(())
        })
        .expect("builds");

        let top = Module::build("Top", |m| {
            m.use_module(&left)?;
            m.use_module(&right)?;
            Ok(())
        })
        .expect("builds");

        let plan = ExecutionPlan::resolve(&top).expect("resolves");
        let ids: Vec<_> = plan.action_ids().map(ActionId::as_str).collect();
        assert_eq!(
            ids,
            vec!["Base#Token", "Left#Token.pause", "Right#Token.unpause"],
            "the shared submodule contributes its deploy exactly once"
        );
    }

    #[test]
    fn same_name_different_module_on_distinct_paths_is_a_collision() {
        let make_base = |contract: &str| {
            Module::build("Base", |m| {
                let handle = m.contract(contract, [])?;
                m.export("contract", &handle);
                Ok(())
            })
            .expect("builds")
        };
        let base_a = make_base("A");
        let base_b = make_base("B");

        let left = Module::build("Left", |m| {
            m.use_module(&base_a)?;
            Ok(())
        })
        .expect("builds");
        let right = Module::build("Right", |m| {
            m.use_module(&base_b)?;
            Ok(())
        })
        .expect("builds");

        // Neither Left nor Right can see the conflict at build time; the
        // resolver walking both paths must.
        let top = Module::build("Top", |m| {
            m.use_module(&left)?;
            m.use_module(&right)?;
            Ok(())
        })
        .expect("builds");

        let err = ExecutionPlan::resolve(&top).expect_err("conflicting Base modules");
        assert!(matches!(
            err,
            ResolveError::ModuleCollision { name } if name == "Base"
        ));
    }
}
