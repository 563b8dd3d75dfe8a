//! Dependency resolver — computes a load order from declared dependencies.
//!
//! Iterative fixed point: each pass moves every candidate whose dependencies
//! are already ordered into the output, until a pass makes no progress.
//! Leftover candidates are either waiting on a name nobody provides (missing)
//! or on each other (cycle). Plugin counts are small, so O(n²) is fine.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use plughost_core::{AppError, AppResult};

use crate::metadata::PluginSource;

/// Outcome of resolving a candidate set without failing the whole batch.
#[derive(Debug, Default)]
pub struct Resolution {
    /// Orderable candidate ids; each appears after all of its dependencies.
    pub order: Vec<String>,
    /// Candidates that cannot be ordered, with the reason, in input order.
    pub blocked: Vec<(String, AppError)>,
}

/// Stateless dependency resolver over plugin metadata.
#[derive(Debug, Default, Clone, Copy)]
pub struct DependencyResolver;

impl DependencyResolver {
    /// Creates a resolver.
    pub fn new() -> Self {
        Self
    }

    /// Orders `candidates`, failing on the first missing dependency or cycle.
    pub fn resolve(&self, candidates: &[PluginSource]) -> AppResult<Vec<String>> {
        self.resolve_with(candidates, &HashSet::new())
    }

    /// Orders `candidates`, treating ids in `available` as already satisfied.
    pub fn resolve_with(
        &self,
        candidates: &[PluginSource],
        available: &HashSet<String>,
    ) -> AppResult<Vec<String>> {
        let (order, remaining) = fixed_point(candidates, available);

        if remaining.is_empty() {
            return Ok(order);
        }

        let known = known_ids(candidates, available);
        for candidate in &remaining {
            let deps = candidate.dependencies();
            if let Some(dep) = deps.iter().find(|d| !known.contains(d.as_str())) {
                return Err(AppError::missing_dependency(format!(
                    "Plugin '{}' requires '{}', which is not available",
                    candidate.id, dep
                )));
            }
        }

        let graph = Graph::of(&remaining);
        remaining
            .iter()
            .find_map(|c| graph.cycle_through(&c.id))
            .map(|cycle| Err(circular_error(&cycle)))
            .unwrap_or_else(|| {
                Err(AppError::internal(
                    "Resolution stalled without a missing dependency or a cycle",
                ))
            })
    }

    /// Orders what can be ordered and classifies every other candidate.
    ///
    /// A blocked candidate gets `CircularDependency` if it lies on a cycle, and
    /// `MissingDependency` if it needs (directly or transitively) a plugin that
    /// is absent or itself blocked.
    pub fn partition(
        &self,
        candidates: &[PluginSource],
        available: &HashSet<String>,
    ) -> Resolution {
        let (order, remaining) = fixed_point(candidates, available);

        if remaining.is_empty() {
            return Resolution {
                order,
                blocked: Vec::new(),
            };
        }

        let known = known_ids(candidates, available);
        let graph = Graph::of(&remaining);

        let cycles: HashMap<&str, Vec<String>> = remaining
            .iter()
            .filter_map(|&c| graph.cycle_through(&c.id).map(|cycle| (c.id.as_str(), cycle)))
            .collect();

        let blocked = remaining
            .iter()
            .map(|c| {
                let error = match cycles.get(c.id.as_str()) {
                    Some(cycle) => circular_error(cycle),
                    None => missing_reason(c, &known, &cycles, &graph),
                };
                (c.id.clone(), error)
            })
            .collect::<Vec<_>>();

        debug!(
            ordered = order.len(),
            blocked = blocked.len(),
            "Dependency resolution partitioned"
        );

        Resolution { order, blocked }
    }
}

/// Runs the fixed point; returns the order and the candidates left over.
fn fixed_point<'a>(
    candidates: &'a [PluginSource],
    available: &HashSet<String>,
) -> (Vec<String>, Vec<&'a PluginSource>) {
    let mut placed: HashSet<&str> = available.iter().map(String::as_str).collect();
    let mut order = Vec::with_capacity(candidates.len());
    let mut seen = HashSet::new();
    let mut remaining: Vec<&PluginSource> = candidates
        .iter()
        .filter(|&c| seen.insert(c.id.as_str()))
        .collect();

    loop {
        let before = remaining.len();

        remaining.retain(|&candidate| {
            let ready = candidate
                .dependencies()
                .iter()
                .all(|d| placed.contains(d.as_str()));
            if ready {
                placed.insert(candidate.id.as_str());
                order.push(candidate.id.clone());
            }
            !ready
        });

        if remaining.is_empty() || remaining.len() == before {
            break;
        }
    }

    (order, remaining)
}

fn known_ids<'a>(
    candidates: &'a [PluginSource],
    available: &'a HashSet<String>,
) -> HashSet<&'a str> {
    candidates
        .iter()
        .map(|c| c.id.as_str())
        .chain(available.iter().map(String::as_str))
        .collect()
}

fn missing_reason(
    candidate: &PluginSource,
    known: &HashSet<&str>,
    cycles: &HashMap<&str, Vec<String>>,
    graph: &Graph<'_>,
) -> AppError {
    let deps = candidate.dependencies();

    if let Some(dep) = deps.iter().find(|d| !known.contains(d.as_str())) {
        return AppError::missing_dependency(format!(
            "Plugin '{}' requires '{}', which was not discovered",
            candidate.id, dep
        ));
    }
    if let Some(dep) = deps.iter().find(|d| cycles.contains_key(d.as_str())) {
        return AppError::missing_dependency(format!(
            "Plugin '{}' requires '{}', which is part of a dependency cycle",
            candidate.id, dep
        ));
    }

    // Everything it needs exists but is blocked further down the chain.
    let dep = deps
        .iter()
        .find(|d| graph.edges.contains_key(d.as_str()))
        .map(String::as_str)
        .unwrap_or_default();
    AppError::missing_dependency(format!(
        "Plugin '{}' requires '{}', which cannot be loaded",
        candidate.id, dep
    ))
}

fn circular_error(cycle: &[String]) -> AppError {
    AppError::circular_dependency(format!("Dependency cycle: {}", cycle.join(" -> ")))
}

/// Dependency edges among the leftover candidates only.
struct Graph<'a> {
    edges: HashMap<&'a str, &'a [String]>,
}

impl<'a> Graph<'a> {
    fn of(nodes: &[&'a PluginSource]) -> Self {
        Self {
            edges: nodes
                .iter()
                .map(|&n| (n.id.as_str(), n.dependencies()))
                .collect(),
        }
    }

    /// Returns `start -> ... -> start` if `start` lies on a cycle.
    fn cycle_through(&self, start: &str) -> Option<Vec<String>> {
        let mut visited = HashSet::new();
        let mut path = vec![start.to_string()];
        if self.walk(start, start, &mut visited, &mut path) {
            Some(path)
        } else {
            None
        }
    }

    fn walk(
        &self,
        node: &str,
        target: &str,
        visited: &mut HashSet<String>,
        path: &mut Vec<String>,
    ) -> bool {
        let Some(deps) = self.edges.get(node) else {
            return false;
        };

        for dep in deps.iter() {
            if dep == target {
                path.push(dep.clone());
                return true;
            }
            if !self.edges.contains_key(dep.as_str()) || !visited.insert(dep.clone()) {
                continue;
            }
            path.push(dep.clone());
            if self.walk(dep, target, visited, path) {
                return true;
            }
            path.pop();
        }

        false
    }
}
