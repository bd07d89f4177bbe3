/// Parameters that select one of several interchangeable methods
///
/// Some actors delegate part of their work to a pluggable method, chosen by
/// a selector field of their parameter record:
///
/// ```text
/// { "method": "bm25", "bm25": { "k1": 1.2 }, "tfidf": null, "top_k": 3 }
/// ```
///
/// Each method is identified like an actor, by classpath and version. In the
/// actor's state the selected method becomes one more dependency, carrying
/// the method's arguments, and every method-argument field is removed from
/// the actor's own parameters. Arguments of methods that were not selected
/// therefore never reach the cache key.
use super::params::ParamValue;
use super::state::ActorState;
use crate::error::{Error, Result};

/// One selectable method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodVariant {
    /// Selector value and name of the field holding the method's arguments.
    pub name: &'static str,
    pub classpath: &'static str,
    pub version: &'static str,
}

impl MethodVariant {
    pub const fn new(name: &'static str, classpath: &'static str, version: &'static str) -> Self {
        Self {
            name,
            classpath,
            version,
        }
    }
}

/// Method selection declared by an actor type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodChoice {
    selector: &'static str,
    variants: Vec<MethodVariant>,
}

impl MethodChoice {
    pub fn new(selector: &'static str, variants: impl IntoIterator<Item = MethodVariant>) -> Self {
        Self {
            selector,
            variants: variants.into_iter().collect(),
        }
    }

    pub fn selector(&self) -> &'static str {
        self.selector
    }

    pub fn variants(&self) -> &[MethodVariant] {
        &self.variants
    }

    /// Fields a parameter class must declare to carry this choice.
    pub fn field_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        std::iter::once(self.selector).chain(self.variants.iter().map(|v| v.name))
    }

    /// The variant named by the selector field of `params`.
    pub fn selected(&self, params: &ParamValue) -> Result<&MethodVariant> {
        let name = match params.field(self.selector) {
            Some(ParamValue::Str(name)) => name.as_str(),
            Some(other) => {
                return Err(Error::ParamMismatch(format!(
                    "method selector {} must be a string, got {other:?}",
                    self.selector
                )))
            }
            None => {
                return Err(Error::ParamMismatch(format!(
                    "method selector {} is missing",
                    self.selector
                )))
            }
        };

        self.variants
            .iter()
            .find(|v| v.name == name)
            .ok_or_else(|| {
                let known: Vec<_> = self.variants.iter().map(|v| v.name).collect();
                Error::ParamMismatch(format!(
                    "unknown method {name}, expected one of {}",
                    known.join(", ")
                ))
            })
    }

    /// Arguments of the selected method. A missing or null field is an
    /// empty record.
    pub fn method_params(&self, params: &ParamValue) -> Result<ParamValue> {
        let variant = self.selected(params)?;
        Ok(match params.field(variant.name) {
            None | Some(ParamValue::Null) => ParamValue::empty_record(),
            Some(args) => args.clone(),
        })
    }

    /// `params` with every method-argument field removed.
    pub fn without_method_args(&self, params: &ParamValue) -> ParamValue {
        let names: Vec<&str> = self.variants.iter().map(|v| v.name).collect();
        params.without_fields(&names)
    }

    /// Split `params` into the selected method's state and the actor's own
    /// parameters.
    pub fn split(&self, params: &ParamValue) -> Result<(ActorState, ParamValue)> {
        let variant = self.selected(params)?;
        let method = ActorState::new(
            variant.classpath,
            variant.version,
            self.method_params(params)?,
            vec![],
        )?;
        Ok((method, self.without_method_args(params)))
    }
}
