//! Core rewrite loop
//!
//! Runs an ordered list of [`MatcherPass`]es over snapshots of the processing
//! order until nothing changes or the iteration cap is reached.

use log::{debug, warn};
use rustc_hash::FxHashSet;

use crate::error::RewriteResult;
use crate::graph::{Graph, NodeId};

use super::matcher_pass::{Attempt, MatcherPass};

/// Rewrite configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteConfig {
    /// Maximum traversals to prevent infinite loops
    pub max_iterations: usize,
    /// Whether to log callback errors and treat them as declined
    pub continue_on_error: bool,
    /// Whether to compact the graph after each traversal
    pub compact_after: bool,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            continue_on_error: false,
            compact_after: true,
        }
    }
}

impl RewriteConfig {
    /// Set the iteration cap
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set error tolerance
    pub fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    /// Set compaction after each traversal
    pub fn with_compact_after(mut self, compact_after: bool) -> Self {
        self.compact_after = compact_after;
        self
    }
}

/// Statistics from a pass run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PassResult {
    /// Number of patterns matched
    pub patterns_matched: usize,
    /// Number of rewrites applied
    pub transforms_applied: usize,
    /// Number of nodes eliminated
    pub nodes_eliminated: usize,
    /// Number of traversals performed
    pub iterations: usize,
    /// Root nodes of applied rewrites (or marked nodes)
    pub transformed_nodes: Vec<NodeId>,
}

impl PassResult {
    /// Create empty result
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful rewrite rooted at `id`
    pub fn record(&mut self, id: NodeId) {
        self.transforms_applied += 1;
        self.transformed_nodes.push(id);
    }

    /// Record eliminated nodes
    pub fn record_elimination(&mut self, count: usize) {
        self.nodes_eliminated += count;
    }

    /// Check if anything was changed
    pub fn changed(&self) -> bool {
        self.transforms_applied > 0 || self.nodes_eliminated > 0
    }

    /// Merge with another result
    pub fn merge(&mut self, other: PassResult) {
        self.patterns_matched += other.patterns_matched;
        self.transforms_applied += other.transforms_applied;
        self.nodes_eliminated += other.nodes_eliminated;
        self.iterations += other.iterations;
        self.transformed_nodes.extend(other.transformed_nodes);
    }
}

/// Ordered collection of matcher passes driven to fixed point
///
/// For each node, passes are tried in registration order and the first one
/// that rewrites wins for that traversal.
///
/// # Example
///
/// ```ignore
/// let rewrite = GraphRewrite::new("cleanup")
///     .add_pass(eliminate_identity())
///     .add_pass(fold_reshape());
/// let result = rewrite.run(&mut graph)?;
/// ```
#[derive(Debug)]
pub struct GraphRewrite {
    name: String,
    passes: Vec<MatcherPass>,
    config: RewriteConfig,
}

impl GraphRewrite {
    /// Create an empty rewrite
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passes: Vec::new(),
            config: RewriteConfig::default(),
        }
    }

    /// Register a pass
    #[allow(clippy::should_implement_trait)]
    pub fn add_pass(mut self, pass: MatcherPass) -> Self {
        self.passes.push(pass);
        self
    }

    /// Register a pass in place
    pub fn push(&mut self, pass: MatcherPass) {
        self.passes.push(pass);
    }

    /// Configure the rewrite
    pub fn with_config(mut self, config: RewriteConfig) -> Self {
        self.config = config;
        self
    }

    /// Rewrite name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current configuration
    pub fn config(&self) -> &RewriteConfig {
        &self.config
    }

    /// Registered passes
    pub fn passes(&self) -> &[MatcherPass] {
        &self.passes
    }

    /// Number of registered passes
    pub fn len(&self) -> usize {
        self.passes.len()
    }

    /// Check if no pass is registered
    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Run all passes to fixed point
    pub fn run(&self, graph: &mut Graph) -> RewriteResult<PassResult> {
        run_to_fixed_point(graph, &self.passes, &self.config, &self.name)
    }
}

/// Repeat traversals until no pass changes the graph
pub(crate) fn run_to_fixed_point(
    graph: &mut Graph,
    passes: &[MatcherPass],
    config: &RewriteConfig,
    name: &str,
) -> RewriteResult<PassResult> {
    let mut result = PassResult::new();
    let mut converged = false;

    while result.iterations < config.max_iterations {
        result.iterations += 1;

        let pending_before = graph.node_count() - graph.active_node_count();
        let changed = traverse_once(graph, passes, config, &mut result)?;
        let pending_after = graph.node_count() - graph.active_node_count();
        result.record_elimination(pending_after.saturating_sub(pending_before));

        if config.compact_after {
            graph.compact();
        }

        if !changed {
            converged = true;
            break;
        }
    }

    if !converged {
        warn!(
            "{}: stopped after {} iterations without reaching a fixed point",
            name, config.max_iterations
        );
    }

    Ok(result)
}

/// One traversal over a snapshot of the processing order
fn traverse_once(
    graph: &mut Graph,
    passes: &[MatcherPass],
    config: &RewriteConfig,
    result: &mut PassResult,
) -> RewriteResult<bool> {
    let snapshot: Vec<NodeId> = graph.processing_order().to_vec();
    let mut visited: FxHashSet<NodeId> = FxHashSet::default();
    let mut changed = false;

    for id in snapshot {
        if visited.contains(&id) || !graph.has_node(id) || graph.is_eliminated(id) {
            continue;
        }

        for pass in passes {
            match pass.apply(graph, id) {
                Ok(Attempt::NoMatch) => {}
                Ok(Attempt::Declined) => result.patterns_matched += 1,
                Ok(Attempt::Applied(nodes)) => {
                    debug!("{} applied at {}", pass.name(), id);
                    result.patterns_matched += 1;
                    result.record(id);
                    visited.extend(nodes);
                    visited.insert(id);
                    changed = true;
                    break;
                }
                Err(e) if config.continue_on_error => {
                    warn!("{} failed at {}: {}", pass.name(), id, e);
                    result.patterns_matched += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    Ok(changed)
}
