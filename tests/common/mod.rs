// Fixture actors shared across acceptance tests
//
// A small text pipeline:
//
//   Reader ──► Tokenizer ──► Counter ──► Ensemble
//      └──────────────────────┘
//
// Counter depends on Reader both directly and through Tokenizer, so a
// correct construction hands both paths the same Reader instance. Every
// test gets its own cache root in a temp directory.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use actorcache::{
    Actor, ActorContext, ActorCore, ActorGraph, ActorRef, ActorState, ActorType, CacheRepository,
    MethodChoice, MethodVariant, NodeParams, ParamClass, ParamDecl, ParamValue, Result,
};
use serde::Deserialize;
use tempfile::TempDir;

pub struct TestCache {
    _temp_dir: TempDir,
    pub repository: Arc<CacheRepository>,
}

impl TestCache {
    pub fn new() -> Self {
        Self::with_lock_timeout(Duration::from_secs(15))
    }

    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let repository =
            Arc::new(CacheRepository::with_lock_timeout(temp_dir.path(), lock_timeout).unwrap());
        Self {
            _temp_dir: temp_dir,
            repository,
        }
    }

    pub fn root(&self) -> &Path {
        self.repository.root()
    }

    pub fn context(&self) -> ActorContext {
        ActorContext::new(Arc::clone(&self.repository))
    }
}

#[derive(Debug, Deserialize)]
pub struct ReaderParams {
    pub text: String,
}

pub struct Reader {
    core: ActorCore,
    params: ReaderParams,
}

impl Reader {
    pub fn lines(&self) -> Vec<String> {
        self.params.text.lines().map(str::to_string).collect()
    }
}

impl Actor for Reader {
    fn actor_state(&self) -> Result<ActorState> {
        self.core.state()
    }
}

impl ActorType for Reader {
    fn classpath() -> &'static str {
        "fixtures.text.Reader"
    }

    fn version() -> &'static str {
        "1"
    }

    fn param_decl() -> ParamDecl {
        ParamDecl::One(ParamClass::new("ReaderParams", &["text"]))
    }

    fn construct(
        ctx: &ActorContext,
        params: NodeParams,
        dependencies: Vec<ActorRef>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            params: params.deserialize()?,
            core: ActorCore::new::<Self>(ctx, params.into_value(), dependencies),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct TokenizerParams {
    pub lowercase: bool,
}

pub struct Tokenizer {
    core: ActorCore,
    params: TokenizerParams,
    pub reader: Arc<Reader>,
}

impl Tokenizer {
    /// Tokens of every line, cached as `tokens.json`.
    pub fn tokens(&self) -> Result<Vec<String>> {
        self.core.cached_file(
            "tokens.json",
            || {
                let tokens: Vec<String> = self
                    .reader
                    .lines()
                    .iter()
                    .flat_map(|line| line.split_whitespace())
                    .map(|token| {
                        if self.params.lowercase {
                            token.to_lowercase()
                        } else {
                            token.to_string()
                        }
                    })
                    .collect();
                Ok(tokens)
            },
            |tokens, path| {
                fs::write(path, serde_json::to_vec(tokens)?)?;
                Ok(())
            },
            |path| Ok(serde_json::from_slice(&fs::read(path)?)?),
        )
    }

    pub fn core(&self) -> &ActorCore {
        &self.core
    }
}

impl Actor for Tokenizer {
    fn actor_state(&self) -> Result<ActorState> {
        self.core.state()
    }
}

impl ActorType for Tokenizer {
    fn classpath() -> &'static str {
        "fixtures.text.Tokenizer"
    }

    fn version() -> &'static str {
        "2"
    }

    fn param_decl() -> ParamDecl {
        ParamDecl::One(ParamClass::new("TokenizerParams", &["lowercase"]))
    }

    fn construct(
        ctx: &ActorContext,
        params: NodeParams,
        dependencies: Vec<ActorRef>,
    ) -> anyhow::Result<Self> {
        let core = ActorCore::new::<Self>(ctx, params.clone().into_value(), dependencies);
        let reader = core
            .dependency::<Reader>(0)
            .ok_or_else(|| anyhow::anyhow!("Tokenizer needs a Reader"))?;
        Ok(Self {
            params: params.deserialize()?,
            core,
            reader,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct CounterParams {
    pub min_count: u32,
}

pub struct Counter {
    core: ActorCore,
    params: CounterParams,
    pub reader: Arc<Reader>,
    pub tokenizer: Arc<Tokenizer>,
}

impl Counter {
    /// Token counts at or above `min_count`, memoized in the key-value cache.
    pub fn counts(&self) -> Result<BTreeMap<String, u32>> {
        let kv = self.core.kv_cache()?;
        if let Some(counts) = kv.get("counts")? {
            return Ok(counts);
        }

        let mut counts = BTreeMap::new();
        for token in self.tokenizer.tokens()? {
            *counts.entry(token).or_insert(0) += 1;
        }
        counts.retain(|_, count| *count >= self.params.min_count);
        kv.put("counts", &counts)?;
        Ok(counts)
    }

    pub fn core(&self) -> &ActorCore {
        &self.core
    }
}

impl Actor for Counter {
    fn actor_state(&self) -> Result<ActorState> {
        self.core.state()
    }
}

impl ActorType for Counter {
    fn classpath() -> &'static str {
        "fixtures.text.Counter"
    }

    fn version() -> &'static str {
        "1"
    }

    fn param_decl() -> ParamDecl {
        ParamDecl::One(ParamClass::new("CounterParams", &["min_count"]))
    }

    fn construct(
        ctx: &ActorContext,
        params: NodeParams,
        dependencies: Vec<ActorRef>,
    ) -> anyhow::Result<Self> {
        let core = ActorCore::new::<Self>(ctx, params.clone().into_value(), dependencies);
        let reader = core
            .dependency::<Reader>(0)
            .ok_or_else(|| anyhow::anyhow!("Counter needs a Reader first"))?;
        let tokenizer = core
            .dependency::<Tokenizer>(1)
            .ok_or_else(|| anyhow::anyhow!("Counter needs a Tokenizer second"))?;
        Ok(Self {
            params: params.deserialize()?,
            core,
            reader,
            tokenizer,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct WeightParams {
    pub weight: f64,
}

#[derive(Debug, Deserialize)]
pub struct ThresholdParams {
    pub threshold: u32,
}

/// Actor declaring two parameter classes.
pub struct Ensemble {
    core: ActorCore,
    pub weight: WeightParams,
    pub threshold: ThresholdParams,
    pub counter: Arc<Counter>,
}

impl Actor for Ensemble {
    fn actor_state(&self) -> Result<ActorState> {
        self.core.state()
    }
}

impl ActorType for Ensemble {
    fn classpath() -> &'static str {
        "fixtures.text.Ensemble"
    }

    fn version() -> &'static str {
        "1"
    }

    fn param_decl() -> ParamDecl {
        ParamDecl::Many(vec![
            ParamClass::new("WeightParams", &["weight"]),
            ParamClass::new("ThresholdParams", &["threshold"]),
        ])
    }

    fn construct(
        ctx: &ActorContext,
        params: NodeParams,
        dependencies: Vec<ActorRef>,
    ) -> anyhow::Result<Self> {
        let values = params.clone().into_many();
        let [weight, threshold] = values.as_slice() else {
            anyhow::bail!("Ensemble expects two parameter values");
        };
        let core = ActorCore::new::<Self>(ctx, params.into_value(), dependencies);
        let counter = core
            .dependency::<Counter>(0)
            .ok_or_else(|| anyhow::anyhow!("Ensemble needs a Counter"))?;
        Ok(Self {
            weight: weight.deserialize()?,
            threshold: threshold.deserialize()?,
            core,
            counter,
        })
    }
}

/// Actor whose constructor always fails.
pub struct Exploding;

impl Actor for Exploding {
    fn actor_state(&self) -> Result<ActorState> {
        ActorState::create::<Self>(ParamValue::empty_record(), None, vec![])
    }
}

impl ActorType for Exploding {
    fn classpath() -> &'static str {
        "fixtures.text.Exploding"
    }

    fn version() -> &'static str {
        "1"
    }

    fn param_decl() -> ParamDecl {
        ParamDecl::One(ParamClass::new("ExplodingParams", &[]))
    }

    fn construct(_: &ActorContext, _: NodeParams, _: Vec<ActorRef>) -> anyhow::Result<Self> {
        anyhow::bail!("exploded while loading weights")
    }
}

/// Actor that takes its directory's write lock while being constructed.
pub struct Guarded {
    core: ActorCore,
}

impl Actor for Guarded {
    fn actor_state(&self) -> Result<ActorState> {
        self.core.state()
    }
}

impl ActorType for Guarded {
    fn classpath() -> &'static str {
        "fixtures.text.Guarded"
    }

    fn version() -> &'static str {
        "1"
    }

    fn param_decl() -> ParamDecl {
        ParamDecl::One(ParamClass::new("GuardedParams", &[]))
    }

    fn construct(
        ctx: &ActorContext,
        params: NodeParams,
        dependencies: Vec<ActorRef>,
    ) -> anyhow::Result<Self> {
        let core = ActorCore::new::<Self>(ctx, params.into_value(), dependencies);
        drop(core.file_cache()?.acquire_write_lock()?);
        Ok(Self { core })
    }
}

/// Actor whose parameters select a ranking method.
pub struct Ranker {
    core: ActorCore,
    pub reader: Arc<Reader>,
}

impl Ranker {
    pub fn core(&self) -> &ActorCore {
        &self.core
    }
}

impl Actor for Ranker {
    fn actor_state(&self) -> Result<ActorState> {
        self.core.state()
    }
}

impl ActorType for Ranker {
    fn classpath() -> &'static str {
        "fixtures.text.Ranker"
    }

    fn version() -> &'static str {
        "1"
    }

    fn param_decl() -> ParamDecl {
        let methods = MethodChoice::new(
            "method",
            [
                MethodVariant::new("bm25", "fixtures.methods.Bm25", "1"),
                MethodVariant::new("tfidf", "fixtures.methods.TfIdf", "3"),
            ],
        );
        ParamDecl::One(
            ParamClass::new("RankerParams", &["method", "bm25", "tfidf", "top_k"])
                .with_method(methods),
        )
    }

    fn construct(
        ctx: &ActorContext,
        params: NodeParams,
        dependencies: Vec<ActorRef>,
    ) -> anyhow::Result<Self> {
        let core = ActorCore::new::<Self>(ctx, params.into_value(), dependencies);
        let reader = core
            .dependency::<Reader>(0)
            .ok_or_else(|| anyhow::anyhow!("Ranker needs a Reader"))?;
        Ok(Self { core, reader })
    }
}

/// Second actor type with the short name `Reader`.
pub struct OtherReader {
    core: ActorCore,
}

impl Actor for OtherReader {
    fn actor_state(&self) -> Result<ActorState> {
        self.core.state()
    }
}

impl ActorType for OtherReader {
    fn classpath() -> &'static str {
        "fixtures.other.Reader"
    }

    fn version() -> &'static str {
        "1"
    }

    fn param_decl() -> ParamDecl {
        ParamDecl::One(ParamClass::new("OtherReaderParams", &[]))
    }

    fn construct(
        ctx: &ActorContext,
        params: NodeParams,
        dependencies: Vec<ActorRef>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            core: ActorCore::new::<Self>(ctx, params.into_value(), dependencies),
        })
    }
}

/// Graph of the text pipeline.
pub fn text_graph() -> ActorGraph {
    let mut graph = ActorGraph::new();
    graph.depends_on::<Tokenizer, Reader>().unwrap();
    graph.depends_on::<Counter, Reader>().unwrap();
    graph.depends_on::<Counter, Tokenizer>().unwrap();
    graph.depends_on::<Ensemble, Counter>().unwrap();
    graph
}

pub fn reader_params(text: &str) -> ParamValue {
    ParamValue::record([("text", ParamValue::Str(text.to_string()))])
}

pub fn tokenizer_params(lowercase: bool) -> ParamValue {
    ParamValue::record([("lowercase", ParamValue::Bool(lowercase))])
}

pub fn counter_params(min_count: i64) -> ParamValue {
    ParamValue::record([("min_count", ParamValue::Int(min_count))])
}

/// Ranker parameters selecting `method`, with arguments for both methods.
pub fn ranker_params(method: &str, k1: f64, smooth: bool) -> ParamValue {
    ParamValue::record([
        ("method", ParamValue::Str(method.to_string())),
        ("bm25", ParamValue::record([("k1", ParamValue::Float(k1))])),
        ("tfidf", ParamValue::record([("smooth", ParamValue::Bool(smooth))])),
        ("top_k", ParamValue::Int(5)),
    ])
}

/// Parameters for constructing Counter from `text_graph()`.
pub fn counter_slot_params(text: &str, lowercase: bool, min_count: i64) -> Vec<ParamValue> {
    vec![
        reader_params(text),
        tokenizer_params(lowercase),
        counter_params(min_count),
    ]
}
