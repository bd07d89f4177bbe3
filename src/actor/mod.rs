//! Actor model
//!
//! An actor is a computation unit with declared parameters and declared
//! dependencies on other actors. Actor types implement [`ActorType`], which
//! exposes the stable classpath, the version marker, the parameter-class
//! declaration and the constructor consumed by the
//! [`ActorGraph`](crate::graph::ActorGraph).
//!
//! Constructed actors are shared as [`ActorRef`]s so a dependency reached
//! through several paths is one instance.

pub mod method;
pub mod params;
pub mod state;

use std::any::Any;
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use tracing::debug;

use crate::error::{Error, Result};
use crate::storage::{CacheRepository, FileCache, KvCache};

pub use method::{MethodChoice, MethodVariant};
pub use params::{ParamValue, ToParam};
pub use state::ActorState;

/// Shared handle to a constructed actor.
pub type ActorRef = Arc<dyn Actor>;

/// Upcasting helpers, implemented for every actor automatically.
pub trait AsAny: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// A constructed actor.
pub trait Actor: AsAny {
    /// Identity of this actor, including the states of its dependencies.
    fn actor_state(&self) -> Result<ActorState>;
}

/// Static description of an actor type.
pub trait ActorType: Actor + Sized {
    /// Stable identifier of the type, used as the first cache path component.
    fn classpath() -> &'static str;

    /// Version marker. Bump it whenever cached outputs become stale.
    fn version() -> &'static str;

    /// Parameter classes consumed by this actor.
    fn param_decl() -> ParamDecl;

    /// Build the actor from its parameter slice and its constructed dependencies.
    ///
    /// `dependencies` follow the order in which dependency edges were added.
    fn construct(
        ctx: &ActorContext,
        params: NodeParams,
        dependencies: Vec<ActorRef>,
    ) -> anyhow::Result<Self>;
}

/// Downcast a shared actor to its concrete type.
pub fn downcast_actor<T: Actor>(actor: &ActorRef) -> Option<Arc<T>> {
    actor.clone().into_any_arc().downcast::<T>().ok()
}

/// A record type describing one parameter slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamClass {
    pub name: String,
    pub fields: Vec<String>,
    /// Method selected by one of the fields, see [`MethodChoice`].
    pub method: Option<MethodChoice>,
}

impl ParamClass {
    pub fn new(name: impl Into<String>, fields: &[&str]) -> Self {
        Self {
            name: name.into(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
            method: None,
        }
    }

    /// Declare that the selector and method-argument fields of `method`
    /// choose a method.
    pub fn with_method(mut self, method: MethodChoice) -> Self {
        self.method = Some(method);
        self
    }

    /// Check that this is a usable record type.
    pub fn validate(&self, classpath: &str) -> Result<()> {
        let malformed = |reason: String| Error::MalformedParamClass {
            classpath: classpath.to_string(),
            class: self.name.clone(),
            reason,
        };

        if self.name.trim().is_empty() {
            return Err(malformed("parameter class has no name".to_string()));
        }

        let mut seen = HashSet::new();
        for field in &self.fields {
            if field.trim().is_empty() {
                return Err(malformed("field name is empty".to_string()));
            }
            if !seen.insert(field.as_str()) {
                return Err(malformed(format!("field {field} is declared twice")));
            }
        }

        if let Some(method) = &self.method {
            if method.variants().is_empty() {
                return Err(malformed("method choice has no variants".to_string()));
            }
            if let Some(missing) = method.field_names().find(|name| !seen.contains(name)) {
                return Err(malformed(format!("method field {missing} is not declared")));
            }
        }
        Ok(())
    }

    /// Check that `value` is a record whose fields are declared by this class.
    pub fn check(&self, value: &ParamValue) -> Result<()> {
        let Some(names) = value.field_names() else {
            return Err(Error::ParamMismatch(format!(
                "{} expects a record, got {value:?}",
                self.name
            )));
        };

        for name in names {
            if !self.fields.iter().any(|f| f == name) {
                return Err(Error::ParamMismatch(format!(
                    "{} has no field {name}",
                    self.name
                )));
            }
        }

        if let Some(method) = &self.method {
            method.selected(value)?;
        }
        Ok(())
    }
}

/// Parameter-class declaration of an actor type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamDecl {
    One(ParamClass),
    Many(Vec<ParamClass>),
}

impl ParamDecl {
    pub fn classes(&self) -> &[ParamClass] {
        match self {
            ParamDecl::One(class) => std::slice::from_ref(class),
            ParamDecl::Many(classes) => classes,
        }
    }

    /// Number of consecutive parameter slots this declaration consumes.
    pub fn slot_count(&self) -> usize {
        self.classes().len()
    }
}

/// The parameter slice handed to one actor constructor.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeParams {
    One(ParamValue),
    Many(Vec<ParamValue>),
}

impl NodeParams {
    /// The single parameter value; a declared list becomes a sequence.
    pub fn into_value(self) -> ParamValue {
        match self {
            NodeParams::One(value) => value,
            NodeParams::Many(values) => ParamValue::Seq(values),
        }
    }

    pub fn into_many(self) -> Vec<ParamValue> {
        match self {
            NodeParams::One(value) => vec![value],
            NodeParams::Many(values) => values,
        }
    }

    /// Deserialize the single parameter value into a typed struct.
    pub fn deserialize<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        match self {
            NodeParams::One(value) => value.deserialize(),
            NodeParams::Many(values) => ParamValue::Seq(values.clone()).deserialize(),
        }
    }
}

/// Services injected into every actor constructor.
#[derive(Clone)]
pub struct ActorContext {
    repository: Arc<CacheRepository>,
}

impl ActorContext {
    pub fn new(repository: Arc<CacheRepository>) -> Self {
        Self { repository }
    }

    pub fn repository(&self) -> &Arc<CacheRepository> {
        &self.repository
    }
}

/// Reusable actor base: identity, dependencies and a lazily reserved cache.
///
/// Actor types embed an `ActorCore` and delegate [`Actor::actor_state`] to
/// [`ActorCore::state`].
pub struct ActorCore {
    classpath: &'static str,
    version: &'static str,
    params: ParamValue,
    method: Option<MethodChoice>,
    dependencies: Vec<ActorRef>,
    repository: Arc<CacheRepository>,
    file_cache: OnceLock<FileCache>,
    kv_cache: OnceLock<KvCache>,
}

impl ActorCore {
    pub fn new<T: ActorType>(
        ctx: &ActorContext,
        params: ParamValue,
        dependencies: Vec<ActorRef>,
    ) -> Self {
        let method = match T::param_decl() {
            ParamDecl::One(class) => class.method,
            ParamDecl::Many(_) => None,
        };
        Self {
            classpath: T::classpath(),
            version: T::version(),
            params,
            method,
            dependencies,
            repository: Arc::clone(ctx.repository()),
            file_cache: OnceLock::new(),
            kv_cache: OnceLock::new(),
        }
    }

    pub fn classpath(&self) -> &'static str {
        self.classpath
    }

    pub fn params(&self) -> &ParamValue {
        &self.params
    }

    pub fn dependencies(&self) -> &[ActorRef] {
        &self.dependencies
    }

    /// The `index`-th dependency, downcast to `T`.
    pub fn dependency<T: Actor>(&self, index: usize) -> Option<Arc<T>> {
        self.dependencies.get(index).and_then(downcast_actor::<T>)
    }

    /// State of this actor.
    ///
    /// When the parameters select a method, the method's state is appended
    /// to the dependencies and its arguments leave the actor's own params.
    pub fn state(&self) -> Result<ActorState> {
        let mut dependencies = self
            .dependencies
            .iter()
            .map(|dep| dep.actor_state())
            .collect::<Result<Vec<_>>>()?;

        let params = match &self.method {
            Some(method) => {
                let (method_state, params) = method.split(&self.params)?;
                dependencies.push(method_state);
                params
            }
            None => self.params.clone(),
        };

        ActorState::new(self.classpath, self.version, params, dependencies)
    }

    /// File cache rooted at this actor's reserved cache directory.
    pub fn file_cache(&self) -> Result<&FileCache> {
        if let Some(cache) = self.file_cache.get() {
            return Ok(cache);
        }

        let cache = self.repository.file_cache(&self.state()?)?;
        debug!(
            classpath = self.classpath,
            dir = %cache.root().display(),
            "Using cache directory"
        );
        Ok(self.file_cache.get_or_init(|| cache))
    }

    /// Key-value store living in this actor's cache directory.
    ///
    /// Opened once per actor; RocksDB allows a single handle per process.
    pub fn kv_cache(&self) -> Result<&KvCache> {
        if let Some(kv) = self.kv_cache.get() {
            return Ok(kv);
        }

        let kv = KvCache::open(self.file_cache()?.root())?;
        Ok(self.kv_cache.get_or_init(|| kv))
    }

    /// Return the cached output `name`, computing and storing it on a miss.
    ///
    /// The write path holds the directory lock, so concurrent processes
    /// produce the entry once; the loser of the race reads the winner's file.
    pub fn cached_file<T, F, S, D>(
        &self,
        name: &str,
        compute: F,
        serialize: S,
        deserialize: D,
    ) -> Result<T>
    where
        F: FnOnce() -> anyhow::Result<T>,
        S: FnOnce(&T, &Path) -> anyhow::Result<()>,
        D: FnOnce(&Path) -> anyhow::Result<T>,
    {
        let cache = self.file_cache()?;

        if !cache.has_file(name) {
            let _guard = cache.acquire_write_lock()?;
            if !cache.has_file(name) {
                let output = compute()?;
                cache.open_file_path(name, |path| {
                    serialize(&output, path).map_err(Error::from)
                })?;
                return Ok(output);
            }
        }

        let path = cache.get_file(name)?;
        Ok(deserialize(&path)?)
    }
}
