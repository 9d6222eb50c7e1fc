//! One pattern bound to one rewrite callback

use std::fmt;

use smallvec::SmallVec;

use crate::error::RewriteResult;
use crate::graph::{Graph, NodeId, Value};
use crate::pattern::{MatchResult, Matcher, Pattern};

use super::core::{run_to_fixed_point, PassResult, RewriteConfig};

/// Rewrite callback
///
/// Returns `Ok(true)` if the graph was changed. A callback that declines
/// must leave the graph untouched.
pub type Callback = Box<dyn Fn(&mut Graph, &MatchResult) -> RewriteResult<bool> + Send + Sync>;

/// Outcome of trying a pass on one node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt {
    /// No output of the node matched
    NoMatch,
    /// Matched, callback declined
    Declined,
    /// Callback rewrote the graph; carries the matched nodes
    Applied(SmallVec<[NodeId; 8]>),
}

/// Pattern plus rewrite callback
pub struct MatcherPass {
    matcher: Matcher,
    callback: Callback,
    config: RewriteConfig,
}

impl MatcherPass {
    /// Create a pass from a pattern and a callback
    pub fn new<F>(name: impl Into<String>, pattern: Pattern, callback: F) -> Self
    where
        F: Fn(&mut Graph, &MatchResult) -> RewriteResult<bool> + Send + Sync + 'static,
    {
        Self {
            matcher: Matcher::new(pattern, name),
            callback: Box::new(callback),
            config: RewriteConfig::default(),
        }
    }

    /// Configure standalone runs
    pub fn with_config(mut self, config: RewriteConfig) -> Self {
        self.config = config;
        self
    }

    /// Pass name
    pub fn name(&self) -> &str {
        self.matcher.name()
    }

    /// Underlying matcher
    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    /// Try every output of `id` as the pattern root
    ///
    /// Stops at the first output whose callback changes the graph.
    pub fn apply(&self, graph: &mut Graph, id: NodeId) -> RewriteResult<Attempt> {
        let outputs = match graph.entry(id) {
            Some(e) if !e.eliminated => e.node.outputs.len(),
            _ => return Ok(Attempt::NoMatch),
        };

        let mut attempt = Attempt::NoMatch;
        for port in 0..outputs {
            let Some(m) = self.matcher.match_value(graph, Value::new(id, port)) else {
                continue;
            };
            if (self.callback)(graph, &m)? {
                return Ok(Attempt::Applied(m.matched_nodes().iter().copied().collect()));
            }
            attempt = Attempt::Declined;
        }
        Ok(attempt)
    }

    /// Run this pass alone to fixed point
    pub fn run(&self, graph: &mut Graph) -> RewriteResult<PassResult> {
        run_to_fixed_point(
            graph,
            std::slice::from_ref(self),
            &self.config,
            self.name(),
        )
    }
}

impl fmt::Debug for MatcherPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatcherPass")
            .field("name", &self.name())
            .field("config", &self.config)
            .finish()
    }
}
