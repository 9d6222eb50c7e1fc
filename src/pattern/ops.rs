//! Pattern nodes and their constructors
//!
//! Patterns are immutable trees of [`PatternNode`]s shared through [`Arc`].
//! Reusing the same `Pattern` handle in two places of a tree requires both
//! places to bind the same graph value.
//!
//! # Example
//!
//! ```ignore
//! use graph_rewriter::op_types;
//! use graph_rewriter::pattern::{any_input, optional, wrap_type, consumers_count};
//!
//! let data = any_input();
//! let seq = wrap_type_with(&op_types![LstmSequence], vec![], consumers_count(1));
//! let squeezed = optional(&op_types![Squeeze, Reshape], vec![seq], None)?;
//! ```

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use smallvec::SmallVec;

use crate::error::{RewriteError, RewriteResult};
use crate::graph::{Graph, OpType, Value};
use crate::tensor::ElementType;

/// Unique id of a pattern node
pub type PatternId = usize;

/// Value predicate evaluated before structural matching
pub type Predicate = Arc<dyn Fn(&Graph, Value) -> bool + Send + Sync>;

/// Shared handle to an immutable pattern node
pub type Pattern = Arc<PatternNode>;

/// Op type list of a pattern node
pub type TypeList = SmallVec<[OpType; 4]>;

static NEXT_PATTERN_ID: AtomicUsize = AtomicUsize::new(0);

fn next_id() -> PatternId {
    NEXT_PATTERN_ID.fetch_add(1, Ordering::Relaxed)
}

/// Recurrent cell ops
pub const CELL_OPS: &[OpType] = &[OpType::LstmCell, OpType::RnnCell, OpType::GruCell];

/// Ops that drop a unit axis
pub const SQUEEZE_LIKE: &[OpType] = &[OpType::Squeeze, OpType::Reshape];

/// Ops that insert a unit axis
pub const UNSQUEEZE_LIKE: &[OpType] = &[OpType::Unsqueeze, OpType::Reshape];

/// Pattern node kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternKind {
    /// Wildcard leaf, matches any live value
    Any,
    /// Producer type must be one of the listed types
    Op(TypeList),
    /// Producer of one of the listed types is skipped when present
    Optional(TypeList),
}

/// Pattern node
pub struct PatternNode {
    id: PatternId,
    kind: PatternKind,
    children: Vec<Pattern>,
    predicate: Option<Predicate>,
    label: Option<String>,
}

impl PatternNode {
    /// Unique id
    pub fn id(&self) -> PatternId {
        self.id
    }

    /// Node kind
    pub fn kind(&self) -> &PatternKind {
        &self.kind
    }

    /// Structural inputs
    pub fn children(&self) -> &[Pattern] {
        &self.children
    }

    /// Output label
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Evaluate the predicate (true when there is none)
    pub fn accepts(&self, graph: &Graph, value: Value) -> bool {
        self.predicate.as_ref().map_or(true, |p| p(graph, value))
    }
}

impl fmt::Debug for PatternNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatternNode")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("children", &self.children)
            .field("has_predicate", &self.predicate.is_some())
            .field("label", &self.label)
            .finish()
    }
}

fn make(
    kind: PatternKind,
    children: Vec<Pattern>,
    predicate: Option<Predicate>,
    label: Option<String>,
) -> Pattern {
    Arc::new(PatternNode {
        id: next_id(),
        kind,
        children,
        predicate,
        label,
    })
}

// ============================================================================
// Constructors
// ============================================================================

/// Wildcard leaf
pub fn any_input() -> Pattern {
    make(PatternKind::Any, Vec::new(), None, None)
}

/// Wildcard leaf with a predicate
pub fn any_input_with(predicate: Predicate) -> Pattern {
    make(PatternKind::Any, Vec::new(), Some(predicate), None)
}

/// Node whose producer type is one of `types`
///
/// With no children the producer's inputs are not inspected; otherwise the
/// child count must equal the producer's input count.
pub fn wrap_type(types: &[OpType], children: Vec<Pattern>) -> Pattern {
    make(PatternKind::Op(types.iter().copied().collect()), children, None, None)
}

/// [`wrap_type`] with a predicate
pub fn wrap_type_with(types: &[OpType], children: Vec<Pattern>, predicate: Predicate) -> Pattern {
    make(
        PatternKind::Op(types.iter().copied().collect()),
        children,
        Some(predicate),
        None,
    )
}

/// Node that may or may not be present in front of `children[0]`
///
/// Exactly one child and a non-empty type list are required.
pub fn optional(
    types: &[OpType],
    children: Vec<Pattern>,
    predicate: Option<Predicate>,
) -> RewriteResult<Pattern> {
    if children.len() != 1 {
        return Err(RewriteError::InvalidPattern(format!(
            "optional takes exactly one input pattern, got {}",
            children.len()
        )));
    }
    if types.is_empty() {
        return Err(RewriteError::InvalidPattern(
            "optional needs at least one op type".to_string(),
        ));
    }
    Ok(make(
        PatternKind::Optional(types.iter().copied().collect()),
        children,
        predicate,
        None,
    ))
}

/// Copy of `pattern` carrying an output label
///
/// The copy has a fresh id, so label a node before sharing it.
pub fn labeled(pattern: &Pattern, label: &str) -> Pattern {
    make(
        pattern.kind.clone(),
        pattern.children.clone(),
        pattern.predicate.clone(),
        Some(label.to_string()),
    )
}

/// Flatten type lists into one list without duplicates
pub fn collect_types(lists: &[&[OpType]]) -> TypeList {
    let mut out = TypeList::new();
    for &op in lists.iter().flat_map(|l| l.iter()) {
        if !out.contains(&op) {
            out.push(op);
        }
    }
    out
}

/// Build an `[OpType; N]` from op names
#[macro_export]
macro_rules! op_types {
    ($($op:ident),* $(,)?) => {
        [$($crate::graph::OpType::$op),*]
    };
}

// ============================================================================
// Predicates
// ============================================================================

/// Value has exactly `n` consuming input ports
pub fn consumers_count(n: usize) -> Predicate {
    Arc::new(move |graph: &Graph, value: Value| graph.consumer_count(value) == n)
}

/// Value has rank `rank`
pub fn rank_equals(rank: usize) -> Predicate {
    Arc::new(move |graph: &Graph, value: Value| {
        graph
            .layout(value)
            .map(|l| l.shape.rank() == rank)
            .unwrap_or(false)
    })
}

/// Value has a fully static shape
pub fn has_static_shape() -> Predicate {
    Arc::new(|graph: &Graph, value: Value| {
        graph
            .layout(value)
            .map(|l| l.shape.is_static())
            .unwrap_or(false)
    })
}

/// Value has a known rank
///
/// Ranks are always known in this IR; the predicate only checks the value
/// exists.
pub fn has_static_rank() -> Predicate {
    Arc::new(|graph: &Graph, value: Value| graph.layout(value).is_some())
}

/// Value has element type `ty`
pub fn element_type_is(ty: ElementType) -> Predicate {
    Arc::new(move |graph: &Graph, value: Value| graph.element_type(value) == Some(ty))
}

/// Value is produced by a `Constant` or `Data` node
pub fn is_constant() -> Predicate {
    Arc::new(|graph: &Graph, value: Value| graph.is_constant(value))
}

/// All predicates hold
pub fn all_of(predicates: Vec<Predicate>) -> Predicate {
    Arc::new(move |graph: &Graph, value: Value| predicates.iter().all(|p| p(graph, value)))
}
