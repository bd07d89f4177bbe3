//! Dependency-ordered actor construction
//!
//! An [`ActorConstructor`] is planned for one target node. It covers the
//! target and all of its ancestors, assigns each of them a consecutive range
//! of parameter slots, and instantiates them dependency-first. A node reached
//! through several paths is constructed once and the same instance is handed
//! to every dependent.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;

use tracing::{debug, error};

use super::ActorGraph;
use crate::actor::{
    downcast_actor, ActorContext, ActorRef, ActorType, NodeParams, ParamClass, ParamDecl,
    ParamValue,
};
use crate::error::{Error, Result};

/// Construction plan for one actor and its ancestors.
#[derive(Debug)]
pub struct ActorConstructor<'g> {
    graph: &'g ActorGraph,
    main: usize,
    /// Target and ancestors, dependencies first.
    order: Vec<usize>,
    param_classes: Vec<ParamClass>,
    slots: HashMap<usize, Range<usize>>,
}

impl<'g> ActorConstructor<'g> {
    pub(crate) fn new(graph: &'g ActorGraph, main: usize) -> Result<Self> {
        let mut order = graph.ancestors(main)?;
        order.push(main);

        let mut seen: HashMap<&str, usize> = HashMap::new();
        for &id in &order {
            let classpath = graph.node(id)?.classpath();
            if seen.insert(classpath, id).is_some() {
                return Err(Error::DuplicateActorType {
                    target: graph.node(main)?.classpath().to_string(),
                    classpath: classpath.to_string(),
                });
            }
        }

        let mut param_classes = Vec::new();
        let mut slots = HashMap::new();
        for &id in &order {
            let node = graph.node(id)?;
            let decl = node.param_decl();
            let classes = decl.classes();
            for class in classes {
                class.validate(node.classpath())?;
                if class.method.is_some() && matches!(decl, ParamDecl::Many(_)) {
                    return Err(Error::MalformedParamClass {
                        classpath: node.classpath().to_string(),
                        class: class.name.clone(),
                        reason: "method choices need a single parameter class".to_string(),
                    });
                }
            }

            let start = param_classes.len();
            param_classes.extend(classes.iter().cloned());
            slots.insert(id, start..param_classes.len());
        }

        Ok(Self {
            graph,
            main,
            order,
            param_classes,
            slots,
        })
    }

    pub fn main(&self) -> usize {
        self.main
    }

    /// Nodes covered by this plan, dependencies first.
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Parameter classes of every covered node, in slot order.
    pub fn param_classes(&self) -> &[ParamClass] {
        &self.param_classes
    }

    /// Slots consumed by `node`, `None` if the node is not covered.
    pub fn slot_range(&self, node: usize) -> Option<Range<usize>> {
        self.slots.get(&node).cloned()
    }

    /// Read one parameter value per slot from a table keyed by class name.
    ///
    /// A class without fields may be omitted from the table.
    pub fn params_from_toml(&self, table: &toml::Table) -> Result<Vec<ParamValue>> {
        self.param_classes
            .iter()
            .map(|class| match table.get(&class.name) {
                Some(value) => Ok(ParamValue::from_toml(value.clone())),
                None if class.fields.is_empty() => Ok(ParamValue::empty_record()),
                None => Err(Error::ParamMismatch(format!(
                    "no parameters given for {}",
                    class.name
                ))),
            })
            .collect()
    }

    /// Check `params` against the declared classes, slot by slot.
    pub fn check_params(&self, params: &[ParamValue]) -> Result<()> {
        if params.len() != self.param_classes.len() {
            return Err(Error::ParamMismatch(format!(
                "expected {} parameter values, got {}",
                self.param_classes.len(),
                params.len()
            )));
        }

        for (class, value) in self.param_classes.iter().zip(params) {
            class.check(value)?;
        }
        Ok(())
    }

    /// Construct the target actor.
    pub fn create_actor(&self, ctx: &ActorContext, params: Vec<ParamValue>) -> Result<ActorRef> {
        let mut actors = self.create_actors(ctx, params, &[self.main])?;
        actors.pop().ok_or(Error::UnknownNode(self.main))
    }

    /// Construct several covered nodes, sharing instances between them.
    pub fn create_actors(
        &self,
        ctx: &ActorContext,
        params: Vec<ParamValue>,
        nodes: &[usize],
    ) -> Result<Vec<ActorRef>> {
        self.check_params(&params)?;

        let mut built = HashMap::new();
        nodes
            .iter()
            .map(|&node| {
                if !self.slots.contains_key(&node) {
                    return Err(Error::UnknownNode(node));
                }
                self.instantiate(node, ctx, &params, &mut built)
            })
            .collect()
    }

    /// Construct the covered actor of type `T`.
    pub fn create<T: ActorType>(&self, ctx: &ActorContext, params: Vec<ParamValue>) -> Result<Arc<T>> {
        let id = self
            .graph
            .get_actor_by_classname(super::ActorSelector::of::<T>())?;
        let not_found = || Error::ActorNotFound(T::classpath().to_string());
        if !self.slots.contains_key(&id) {
            return Err(not_found());
        }

        let actor = self
            .create_actors(ctx, params, &[id])?
            .pop()
            .ok_or_else(not_found)?;
        downcast_actor::<T>(&actor).ok_or_else(not_found)
    }

    fn instantiate(
        &self,
        id: usize,
        ctx: &ActorContext,
        params: &[ParamValue],
        built: &mut HashMap<usize, ActorRef>,
    ) -> Result<ActorRef> {
        if let Some(actor) = built.get(&id) {
            return Ok(Arc::clone(actor));
        }

        let mut dependencies = Vec::new();
        for dep in self.graph.dependencies(id)? {
            dependencies.push(self.instantiate(dep, ctx, params, built)?);
        }

        let node = self.graph.node(id)?;
        let range = self.slot_range(id).ok_or(Error::UnknownNode(id))?;
        let node_params = match node.param_decl() {
            ParamDecl::One(_) => NodeParams::One(params[range.start].clone()),
            ParamDecl::Many(_) => NodeParams::Many(params[range].to_vec()),
        };

        debug!(classpath = node.classpath(), "Constructing actor");
        let actor = node
            .construct(ctx, node_params, dependencies)
            .map_err(|e| {
                error!(classpath = node.classpath(), error = %e, "Failed to construct actor");
                // Crate errors raised inside a constructor keep their kind.
                match e.downcast::<Error>() {
                    Ok(inner) => inner,
                    Err(e) => Error::Actor(e),
                }
            })?;

        built.insert(id, Arc::clone(&actor));
        Ok(actor)
    }
}
