//! Avalanche effect analysis for block ciphers.
//!
//! Decodes per-round cipher state from experiment records, counts flipped
//! bits between a control run and each single-bit perturbation, and
//! assembles the results for tabular and chart reporting.

pub mod analysis;
pub mod chart;
pub mod codec;
pub mod record;
pub mod report;

pub use analysis::{Analysis, AnalysisError, AnalysisEvent, analyze};
pub use codec::{BitVector, CodecError};
pub use record::{CipherFamily, Criteria, ExperimentRecord, RoundState};
pub use report::{AnalysisResultSet, RoundDiff, TaskResult};
