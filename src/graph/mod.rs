//! Actor dependency graph
//!
//! Nodes are actor types, edges point from a dependency to its dependent.
//! Edges that would close a cycle or repeat an existing edge are rejected
//! when added, so the graph is always a DAG.
//!
//! Dependencies of a node are returned in the order their edges were added.
//! That order is the order of the dependency states inside the dependent's
//! cache key, so it is never re-sorted.

pub mod constructor;

use std::any::TypeId;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;

use petgraph::algo::has_path_connecting;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::actor::{ActorContext, ActorRef, ActorType, NodeParams, ParamDecl, ParamValue};
use crate::error::{Error, Result};

pub use constructor::ActorConstructor;

/// Type-erased actor constructor stored in a node.
pub type ConstructFn =
    Arc<dyn Fn(&ActorContext, NodeParams, Vec<ActorRef>) -> anyhow::Result<ActorRef> + Send + Sync>;

/// One actor type registered in a graph.
#[derive(Clone)]
pub struct ActorNode {
    /// Graph-local id, `None` until the node is added to a graph.
    pub id: Option<usize>,
    classpath: String,
    type_id: Option<TypeId>,
    param_decl: ParamDecl,
    constructor: ConstructFn,
}

impl ActorNode {
    /// Node for the actor type `T`.
    pub fn new<T: ActorType>() -> Self {
        Self {
            id: None,
            classpath: T::classpath().to_string(),
            type_id: Some(TypeId::of::<T>()),
            param_decl: T::param_decl(),
            constructor: Arc::new(|ctx: &ActorContext, params: NodeParams, deps: Vec<ActorRef>| {
                let actor: ActorRef = Arc::new(T::construct(ctx, params, deps)?);
                Ok(actor)
            }),
        }
    }

    /// Node with an explicit constructor, for actors without a static type.
    pub fn with_constructor<F>(
        classpath: impl Into<String>,
        param_decl: ParamDecl,
        constructor: F,
    ) -> Self
    where
        F: Fn(&ActorContext, NodeParams, Vec<ActorRef>) -> anyhow::Result<ActorRef>
            + Send
            + Sync
            + 'static,
    {
        Self {
            id: None,
            classpath: classpath.into(),
            type_id: None,
            param_decl,
            constructor: Arc::new(constructor),
        }
    }

    pub fn classpath(&self) -> &str {
        &self.classpath
    }

    pub fn type_id(&self) -> Option<TypeId> {
        self.type_id
    }

    pub fn param_decl(&self) -> &ParamDecl {
        &self.param_decl
    }

    /// Whether `name` is a suffix of this node's classpath.
    pub fn has_short_name(&self, name: &str) -> bool {
        self.classpath.ends_with(name)
    }

    pub(crate) fn construct(
        &self,
        ctx: &ActorContext,
        params: NodeParams,
        dependencies: Vec<ActorRef>,
    ) -> anyhow::Result<ActorRef> {
        (self.constructor)(ctx, params, dependencies)
    }
}

impl fmt::Debug for ActorNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorNode")
            .field("id", &self.id)
            .field("classpath", &self.classpath)
            .field("param_decl", &self.param_decl)
            .finish()
    }
}

/// How to look up an actor in a graph.
#[derive(Debug, Clone, Copy)]
pub enum ActorSelector<'a> {
    /// Full classpath, or any suffix of it.
    Name(&'a str),
    /// A concrete actor type.
    Type(TypeId, &'static str),
}

impl<'a> ActorSelector<'a> {
    pub fn of<T: ActorType>() -> Self {
        ActorSelector::Type(TypeId::of::<T>(), T::classpath())
    }
}

impl<'a> From<&'a str> for ActorSelector<'a> {
    fn from(name: &'a str) -> Self {
        ActorSelector::Name(name)
    }
}

/// Directed acyclic graph of actor types.
#[derive(Debug, Default)]
pub struct ActorGraph {
    graph: DiGraph<ActorNode, usize>,
    next_edge: usize,
}

impl ActorGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node and return its id.
    ///
    /// Two nodes may share a classpath; the conflict is reported only when
    /// both end up among the ancestors of an actor being constructed.
    pub fn add_node(&mut self, mut node: ActorNode) -> usize {
        let id = self.graph.node_count();
        node.id = Some(id);
        self.graph.add_node(node).index()
    }

    /// Id of the node for `T`, adding one if the graph has none.
    pub fn add_actor<T: ActorType>(&mut self) -> usize {
        let type_id = TypeId::of::<T>();
        let existing = self
            .nodes()
            .find(|n| n.type_id == Some(type_id))
            .and_then(|n| n.id);

        match existing {
            Some(id) => id,
            None => self.add_node(ActorNode::new::<T>()),
        }
    }

    /// Record that `dependent` consumes the output of `dependency`.
    pub fn add_edge(&mut self, dependency: usize, dependent: usize) -> Result<()> {
        let from = self.index(dependency)?;
        let to = self.index(dependent)?;

        if from == to || has_path_connecting(&self.graph, to, from, None) {
            return Err(Error::Cycle {
                dependency: self.graph[from].classpath.clone(),
                dependent: self.graph[to].classpath.clone(),
            });
        }
        if self.graph.contains_edge(from, to) {
            return Err(Error::DuplicateEdge {
                dependency: self.graph[from].classpath.clone(),
                dependent: self.graph[to].classpath.clone(),
            });
        }

        self.graph.add_edge(from, to, self.next_edge);
        self.next_edge += 1;
        Ok(())
    }

    /// Register `T` and `D` if needed and make `T` depend on `D`.
    pub fn depends_on<T: ActorType, D: ActorType>(&mut self) -> Result<()> {
        let dependent = self.add_actor::<T>();
        let dependency = self.add_actor::<D>();
        self.add_edge(dependency, dependent)
    }

    pub fn node(&self, id: usize) -> Result<&ActorNode> {
        Ok(&self.graph[self.index(id)?])
    }

    pub fn nodes(&self) -> impl Iterator<Item = &ActorNode> {
        self.graph.node_weights()
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Direct dependencies of `id`, in edge insertion order.
    pub fn dependencies(&self, id: usize) -> Result<Vec<usize>> {
        let index = self.index(id)?;
        let mut edges: Vec<(usize, usize)> = self
            .graph
            .edges_directed(index, Direction::Incoming)
            .map(|edge| (*edge.weight(), edge.source().index()))
            .collect();
        edges.sort_unstable();
        Ok(edges.into_iter().map(|(_, source)| source).collect())
    }

    /// All transitive dependencies of `id`, excluding `id`.
    ///
    /// Dependencies come before their dependents; ties are broken by the
    /// smaller node id, so the order is deterministic.
    pub fn ancestors(&self, id: usize) -> Result<Vec<usize>> {
        let start = self.index(id)?;

        let mut reached = HashSet::new();
        let mut stack = vec![start];
        while let Some(index) = stack.pop() {
            for dep in self.graph.neighbors_directed(index, Direction::Incoming) {
                if reached.insert(dep) {
                    stack.push(dep);
                }
            }
        }

        let mut order = Vec::with_capacity(reached.len());
        let mut placed = HashSet::new();
        let mut pending: BTreeSet<usize> = reached.iter().map(|i| i.index()).collect();

        while !pending.is_empty() {
            let ready = pending.iter().copied().find(|&candidate| {
                self.graph
                    .neighbors_directed(NodeIndex::new(candidate), Direction::Incoming)
                    .all(|dep| placed.contains(&dep.index()))
            });
            // The graph is acyclic, so some pending node is always ready.
            let Some(next) = ready else { break };
            pending.remove(&next);
            placed.insert(next);
            order.push(next);
        }
        Ok(order)
    }

    /// Resolve a node by classpath, classpath suffix or actor type.
    ///
    /// An exact classpath match wins over suffix matches.
    pub fn get_actor_by_classname<'a>(&self, selector: impl Into<ActorSelector<'a>>) -> Result<usize> {
        let (name, matches): (&str, Vec<&ActorNode>) = match selector.into() {
            ActorSelector::Type(type_id, classpath) => (
                classpath,
                self.nodes().filter(|n| n.type_id == Some(type_id)).collect(),
            ),
            ActorSelector::Name(name) => {
                let exact: Vec<&ActorNode> = self.nodes().filter(|n| n.classpath == name).collect();
                if exact.is_empty() {
                    (name, self.nodes().filter(|n| n.has_short_name(name)).collect())
                } else {
                    (name, exact)
                }
            }
        };

        match matches.as_slice() {
            [] => Err(Error::ActorNotFound(name.to_string())),
            [node] => Ok(node.id.unwrap_or_default()),
            _ => Err(Error::AmbiguousActor {
                name: name.to_string(),
                candidates: matches.iter().map(|n| n.classpath.clone()).collect(),
            }),
        }
    }

    /// Plan the construction of `id` and everything it depends on.
    pub fn get_actor_constructor(&self, id: usize) -> Result<ActorConstructor<'_>> {
        ActorConstructor::new(self, id)
    }

    /// Resolve, plan and construct an actor in one call.
    pub fn create_actor<'a>(
        &self,
        selector: impl Into<ActorSelector<'a>>,
        ctx: &ActorContext,
        params: Vec<ParamValue>,
    ) -> Result<ActorRef> {
        let id = self.get_actor_by_classname(selector)?;
        self.get_actor_constructor(id)?.create_actor(ctx, params)
    }

    fn index(&self, id: usize) -> Result<NodeIndex> {
        if id < self.graph.node_count() {
            Ok(NodeIndex::new(id))
        } else {
            Err(Error::UnknownNode(id))
        }
    }
}
