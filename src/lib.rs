// Library interface for actorcache
// Actor graphs, cache-key derivation and the on-disk cache they write to

pub mod actor;
pub mod config;
pub mod config_discovery;
pub mod dataset;
pub mod error;
pub mod graph;
pub mod logging;
pub mod storage;

// Re-export commonly used types
pub use actor::{
    downcast_actor, Actor, ActorContext, ActorCore, ActorRef, ActorState, ActorType, MethodChoice,
    MethodVariant, NodeParams, ParamClass, ParamDecl, ParamValue, ToParam,
};
pub use dataset::{split_dataset_and_selection, DatasetSelection};
pub use error::{Error, ErrorKind, Result};
pub use graph::{ActorConstructor, ActorGraph, ActorNode, ActorSelector};
pub use storage::{CacheRepository, FileCache, KvCache};
