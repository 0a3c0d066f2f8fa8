//! Experiment records as produced by the cipher tracing tools.
//!
//! A dataset is a JSON array whose first element is the control run and
//! whose remaining elements are single-bit perturbations of it. Each record
//! carries the intermediate state after every round, keyed by round id.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumIter, EnumString};
use thiserror::Error;

/// Cipher family that produced a dataset. Selects the round state shape.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[strum(ascii_case_insensitive)]
pub enum CipherFamily {
    /// Feistel network (DES): split `l{n}` / `r{n}` halves per round.
    #[strum(to_string = "DES", serialize = "feistel")]
    Feistel,
    /// Substitution-permutation network (AES): one `block_state` per round.
    #[strum(to_string = "AES", serialize = "spn")]
    Spn,
}

/// Which input the variants perturb.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[strum(ascii_case_insensitive)]
pub enum Criteria {
    /// Strict plaintext avalanche criterion.
    #[strum(to_string = "SPAC", serialize = "plaintext")]
    PlaintextSensitivity,
    /// Strict key avalanche criterion.
    #[strum(to_string = "SKAC", serialize = "key")]
    KeySensitivity,
}

impl Criteria {
    /// Name of the perturbed input, for display.
    pub fn input_label(self) -> &'static str {
        match self {
            Criteria::PlaintextSensitivity => "Plaintext",
            Criteria::KeySensitivity => "Key",
        }
    }
}

/// Raw fields of one round, as found in the data file. Only the fields the
/// selected cipher family reads have to be strings.
pub type RoundFields = BTreeMap<String, Value>;

/// Round id to round fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoundMap(BTreeMap<String, RoundFields>);

impl RoundMap {
    pub fn get(&self, round_id: &str) -> Option<&RoundFields> {
        self.0.get(round_id)
    }

    pub fn contains(&self, round_id: &str) -> bool {
        self.0.contains_key(round_id)
    }

    pub fn insert(&mut self, round_id: impl Into<String>, fields: RoundFields) {
        self.0.insert(round_id.into(), fields);
    }

    /// Round ids in numeric order. Non-numeric ids sort after numeric ones.
    pub fn ordered_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.0.keys().map(String::as_str).collect();
        ids.sort_by(|a, b| round_sort_key(a).cmp(&round_sort_key(b)));
        ids
    }
}

impl FromIterator<(String, RoundFields)> for RoundMap {
    fn from_iter<I: IntoIterator<Item = (String, RoundFields)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

fn round_sort_key(id: &str) -> (bool, u64, &str) {
    match id.trim().parse::<u64>() {
        Ok(n) => (false, n, id),
        Err(_) => (true, 0, id),
    }
}

/// One experiment run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentRecord {
    pub task: String,
    #[serde(default)]
    pub plain_text: String,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub method: String,
    pub round: RoundMap,
    pub final_ciphertext: String,
}

/// Typed state of a single round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundState {
    Feistel { left: String, right: String },
    Spn { block_state: String },
}

impl RoundState {
    /// Pull the fields the given family expects out of a raw round.
    ///
    /// On failure returns the name of the first field that is missing or
    /// not a string. Other fields in the round are ignored.
    pub fn extract(
        family: CipherFamily,
        round_id: &str,
        fields: &RoundFields,
    ) -> Result<Self, String> {
        let field = |name: String| match fields.get(&name) {
            Some(Value::String(value)) => Ok(value.clone()),
            _ => Err(name),
        };
        match family {
            CipherFamily::Feistel => Ok(RoundState::Feistel {
                left: field(format!("l{round_id}"))?,
                right: field(format!("r{round_id}"))?,
            }),
            CipherFamily::Spn => Ok(RoundState::Spn {
                block_state: field("block_state".to_string())?,
            }),
        }
    }

    /// Full block as hex: `left || right` for Feistel rounds.
    pub fn block_hex(&self) -> String {
        match self {
            RoundState::Feistel { left, right } => format!("{left}{right}"),
            RoundState::Spn { block_state } => block_state.clone(),
        }
    }
}

/// Errors while reading a dataset.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid experiment data: {0}")]
    Json(#[from] serde_json::Error),
}

/// Parse a dataset from JSON text.
pub fn parse_records(json: &str) -> Result<Vec<ExperimentRecord>, LoadError> {
    Ok(serde_json::from_str(json)?)
}

/// Read and parse a dataset file.
pub fn load_records(path: &Path) -> Result<Vec<ExperimentRecord>, LoadError> {
    let text = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let records = parse_records(&text)?;
    tracing::info!(path = %path.display(), records = records.len(), "loaded experiment data");
    Ok(records)
}
