//! Core traits for graph passes
//!
//! Defines the interface shared by pattern rewrites and direct graph scans.

use crate::error::RewriteResult;
use crate::graph::Graph;
use crate::transform::{GraphRewrite, MatcherPass, PassResult};

/// A pass over a graph
///
/// Implemented by [`GraphRewrite`], [`MatcherPass`] and by passes that scan
/// the graph directly.
///
/// # Example
///
/// ```ignore
/// struct CountNodes;
///
/// impl GraphPass for CountNodes {
///     fn name(&self) -> &str {
///         "count_nodes"
///     }
///
///     fn run(&self, graph: &mut Graph) -> RewriteResult<PassResult> {
///         Ok(PassResult::new())
///     }
/// }
/// ```
pub trait GraphPass {
    /// Name of the pass
    fn name(&self) -> &str;

    /// Apply the pass in place
    fn run(&self, graph: &mut Graph) -> RewriteResult<PassResult>;

    /// Check if this pass can do anything on the graph
    fn is_applicable(&self, _graph: &Graph) -> bool {
        true
    }
}

impl GraphPass for GraphRewrite {
    fn name(&self) -> &str {
        GraphRewrite::name(self)
    }

    fn run(&self, graph: &mut Graph) -> RewriteResult<PassResult> {
        GraphRewrite::run(self, graph)
    }
}

impl GraphPass for MatcherPass {
    fn name(&self) -> &str {
        MatcherPass::name(self)
    }

    fn run(&self, graph: &mut Graph) -> RewriteResult<PassResult> {
        MatcherPass::run(self, graph)
    }
}

/// Passes applied in sequence
pub struct PassChain {
    passes: Vec<Box<dyn GraphPass>>,
}

impl PassChain {
    /// Create a new empty chain
    pub fn new() -> Self {
        Self { passes: Vec::new() }
    }

    /// Add a pass to the chain
    #[allow(clippy::should_implement_trait)]
    pub fn add<P: GraphPass + 'static>(mut self, pass: P) -> Self {
        self.passes.push(Box::new(pass));
        self
    }

    /// Number of passes
    pub fn len(&self) -> usize {
        self.passes.len()
    }

    /// Check if the chain is empty
    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }
}

impl Default for PassChain {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphPass for PassChain {
    fn name(&self) -> &str {
        "pass_chain"
    }

    fn run(&self, graph: &mut Graph) -> RewriteResult<PassResult> {
        let mut total = PassResult::new();
        for pass in &self.passes {
            if pass.is_applicable(graph) {
                total.merge(pass.run(graph)?);
            }
        }
        Ok(total)
    }
}
