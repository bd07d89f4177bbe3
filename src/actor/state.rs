/// Actor identity and cache-key derivation
///
/// An [`ActorState`] describes one computation unit: its classpath, version,
/// parameters and the states of everything it depends on. Its canonical
/// dictionary (`to_dict`) is both the persisted `_KEY` record and the input of
/// the content address (`fingerprint`).
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use super::params::ParamValue;
use super::ActorType;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct ActorState {
    classpath: String,
    classversion: String,
    params: ParamValue,
    /// Order is significant and follows the dependency edges.
    dependencies: Vec<ActorState>,
}

impl ActorState {
    /// Create a state from explicit identity fields.
    pub fn new(
        classpath: impl Into<String>,
        classversion: impl Into<String>,
        params: ParamValue,
        dependencies: Vec<ActorState>,
    ) -> Result<Self> {
        let classpath = classpath.into();
        let classversion = classversion.into();
        validate_classpath(&classpath)?;

        if classversion.trim().is_empty() {
            return Err(Error::MissingVersion { classpath });
        }

        Ok(Self {
            classpath,
            classversion,
            params,
            dependencies,
        })
    }

    /// Create the state of actor type `T`.
    ///
    /// `version` overrides `T::version()` when given.
    pub fn create<T: ActorType>(
        params: ParamValue,
        version: Option<&str>,
        dependencies: Vec<ActorState>,
    ) -> Result<Self> {
        Self::new(
            T::classpath(),
            version.unwrap_or_else(|| T::version()),
            params,
            dependencies,
        )
    }

    pub fn classpath(&self) -> &str {
        &self.classpath
    }

    pub fn classversion(&self) -> &str {
        &self.classversion
    }

    pub fn params(&self) -> &ParamValue {
        &self.params
    }

    pub fn dependencies(&self) -> &[ActorState] {
        &self.dependencies
    }

    pub fn into_params(self) -> ParamValue {
        self.params
    }

    /// Canonical nested dictionary of this state.
    pub fn to_dict(&self) -> Result<Value> {
        let dependencies = self
            .dependencies
            .iter()
            .map(ActorState::to_dict)
            .collect::<Result<Vec<_>>>()?;

        Ok(json!({
            "classpath": self.classpath,
            "classversion": self.classversion,
            "params": self.params.to_canonical()?,
            "dependencies": dependencies,
        }))
    }

    /// Pretty-printed canonical JSON, as stored in `_KEY`.
    pub fn to_key_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_dict()?)?)
    }

    /// Hex SHA-256 of the RFC 8785 form of [`ActorState::to_dict`].
    pub fn fingerprint(&self) -> Result<String> {
        fingerprint_value(&self.to_dict()?)
    }
}

/// Hex SHA-256 of the RFC 8785 canonical form of a key dictionary.
pub fn fingerprint_value(value: &Value) -> Result<String> {
    let jcs_bytes =
        serde_json_canonicalizer::to_vec(value).map_err(|e| Error::UnsupportedParam {
            path: "state".to_string(),
            reason: format!("cannot canonicalize: {e}"),
        })?;

    let mut hasher = Sha256::new();
    hasher.update(&jcs_bytes);
    Ok(hex::encode(hasher.finalize()))
}

/// Classpaths become directory names, so they must be a single path component.
pub(crate) fn validate_classpath(classpath: &str) -> Result<()> {
    let invalid = classpath.trim().is_empty()
        || classpath == "."
        || classpath == ".."
        || classpath.contains(['/', '\\', '\0']);

    if invalid {
        return Err(Error::InvalidClasspath(classpath.to_string()));
    }
    Ok(())
}
