//! Avalanche analysis: diff every variant round-by-round against the control.
//!
//! The analysis is pure. Progress is returned as a list of
//! [`AnalysisEvent`]s alongside the results so that callers decide how (and
//! whether) to render it.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec::{self, CodecError};
use crate::record::{CipherFamily, Criteria, ExperimentRecord, RoundState};
use crate::report::{AnalysisResultSet, FinalDiff, RoundDiff, SensitivityContext, TaskResult};

/// Errors that abort an analysis. No partial results are produced.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("insufficient data: need a control and at least one variant, found {found} record(s)")]
    InsufficientData { found: usize },

    #[error("round mismatch in task {task:?}: round {round:?} is present in {present_in} only")]
    RoundMismatch {
        task: String,
        round: String,
        present_in: &'static str,
    },

    #[error(
        "malformed round state in task {task:?}, round {round:?}: missing or non-string field {field:?}"
    )]
    MalformedRoundState {
        task: String,
        round: String,
        field: String,
    },

    #[error("malformed hex input in task {task:?}, field {field}: {source}")]
    MalformedHexInput {
        task: String,
        field: String,
        #[source]
        source: CodecError,
    },

    #[error("duplicate task id {task:?}")]
    DuplicateTask { task: String },
}

/// Progress notifications emitted while analysing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalysisEvent {
    VariantStarted {
        task: String,
        context: SensitivityContext,
    },
    RoundCompared {
        task: String,
        round_id: String,
        original_value: String,
        modified_value: String,
        bit_difference: u32,
    },
    FinalCompared {
        task: String,
        original_bits: String,
        modified_bits: String,
        bit_difference: u32,
    },
}

/// Output of [`analyze`].
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub results: AnalysisResultSet,
    pub events: Vec<AnalysisEvent>,
}

/// Compare every variant in `records` against the first (control) record.
pub fn analyze(
    records: &[ExperimentRecord],
    family: CipherFamily,
    criteria: Criteria,
) -> Result<Analysis, AnalysisError> {
    let (control, variants) = match records {
        [control, variants @ ..] if !variants.is_empty() => (control, variants),
        _ => {
            return Err(AnalysisError::InsufficientData {
                found: records.len(),
            });
        }
    };

    let mut seen = HashSet::new();
    let mut tasks = Vec::with_capacity(variants.len());
    let mut events = Vec::new();

    for variant in variants {
        if !seen.insert(variant.task.as_str()) {
            return Err(AnalysisError::DuplicateTask {
                task: variant.task.clone(),
            });
        }
        tasks.push(analyze_variant(control, variant, family, criteria, &mut events)?);
    }

    tracing::info!(
        family = %family,
        criteria = %criteria,
        variants = tasks.len(),
        "avalanche analysis complete"
    );

    Ok(Analysis {
        results: AnalysisResultSet {
            family,
            criteria,
            control: control.task.clone(),
            tasks,
        },
        events,
    })
}

fn analyze_variant(
    control: &ExperimentRecord,
    variant: &ExperimentRecord,
    family: CipherFamily,
    criteria: Criteria,
    events: &mut Vec<AnalysisEvent>,
) -> Result<TaskResult, AnalysisError> {
    check_round_keys(control, variant)?;

    let context = sensitivity_context(control, variant, criteria);
    events.push(AnalysisEvent::VariantStarted {
        task: variant.task.clone(),
        context: context.clone(),
    });

    let round_ids = variant.round.ordered_ids();
    let mut rounds = Vec::with_capacity(round_ids.len());
    for round_id in round_ids {
        let original = round_state(control, &variant.task, round_id, family)?;
        let modified = round_state(variant, &variant.task, round_id, family)?;
        let entry = diff_rounds(&variant.task, round_id, &original, &modified)?;

        tracing::debug!(
            task = %variant.task,
            round = round_id,
            bits = entry.bit_difference,
            "round compared"
        );
        events.push(AnalysisEvent::RoundCompared {
            task: variant.task.clone(),
            round_id: entry.round_id.clone(),
            original_value: entry.original_value.clone(),
            modified_value: entry.modified_value.clone(),
            bit_difference: entry.bit_difference,
        });
        rounds.push(entry);
    }

    let original = decode_field(
        &variant.task,
        "final_ciphertext (control)",
        &control.final_ciphertext,
    )?;
    let modified = decode_field(&variant.task, "final_ciphertext", &variant.final_ciphertext)?;
    let final_ciphertext = FinalDiff {
        original: control.final_ciphertext.clone(),
        modified: variant.final_ciphertext.clone(),
        width: original.width().max(modified.width()),
        bit_difference: codec::hamming(&original, &modified),
    };
    events.push(AnalysisEvent::FinalCompared {
        task: variant.task.clone(),
        original_bits: original.to_bit_string(),
        modified_bits: modified.to_bit_string(),
        bit_difference: final_ciphertext.bit_difference,
    });
    tracing::info!(
        task = %variant.task,
        rounds = rounds.len(),
        final_bits = final_ciphertext.bit_difference,
        "variant analysed"
    );

    Ok(TaskResult {
        task: variant.task.clone(),
        plain_text: variant.plain_text.clone(),
        key: variant.key.clone(),
        method: variant.method.clone(),
        context,
        rounds,
        final_ciphertext,
    })
}

/// Both records must expose the same round ids.
fn check_round_keys(
    control: &ExperimentRecord,
    variant: &ExperimentRecord,
) -> Result<(), AnalysisError> {
    let mismatch = |round: &str, present_in| AnalysisError::RoundMismatch {
        task: variant.task.clone(),
        round: round.to_string(),
        present_in,
    };
    if let Some(round) = variant
        .round
        .ordered_ids()
        .into_iter()
        .find(|id| !control.round.contains(id))
    {
        return Err(mismatch(round, "variant"));
    }
    if let Some(round) = control
        .round
        .ordered_ids()
        .into_iter()
        .find(|id| !variant.round.contains(id))
    {
        return Err(mismatch(round, "control"));
    }
    Ok(())
}

fn round_state(
    record: &ExperimentRecord,
    task: &str,
    round_id: &str,
    family: CipherFamily,
) -> Result<RoundState, AnalysisError> {
    let fields = record
        .round
        .get(round_id)
        .ok_or_else(|| AnalysisError::RoundMismatch {
            task: task.to_string(),
            round: round_id.to_string(),
            present_in: "variant",
        })?;
    RoundState::extract(family, round_id, fields).map_err(|field| {
        AnalysisError::MalformedRoundState {
            task: record.task.clone(),
            round: round_id.to_string(),
            field,
        }
    })
}

fn diff_rounds(
    task: &str,
    round_id: &str,
    original: &RoundState,
    modified: &RoundState,
) -> Result<RoundDiff, AnalysisError> {
    let original_value = original.block_hex();
    let modified_value = modified.block_hex();

    let field = format!("round {round_id}");
    let original = decode_field(task, &field, &original_value)?;
    let modified = decode_field(task, &field, &modified_value)?;

    Ok(RoundDiff {
        round_id: round_id.to_string(),
        width: original.width().max(modified.width()),
        bit_difference: codec::hamming(&original, &modified),
        original_value,
        modified_value,
    })
}

/// Plaintext or key of control and variant as bit strings. These are only
/// displayed, so text that is not hex leaves the bits empty.
fn sensitivity_context(
    control: &ExperimentRecord,
    variant: &ExperimentRecord,
    criteria: Criteria,
) -> SensitivityContext {
    let (field, original, modified) = match criteria {
        Criteria::PlaintextSensitivity => ("plain_text", &control.plain_text, &variant.plain_text),
        Criteria::KeySensitivity => ("key", &control.key, &variant.key),
    };
    let bits = |task: &str, hex: &str| match codec::decode(hex) {
        Ok(v) => Some(v.to_bit_string()),
        Err(e) => {
            tracing::warn!(task, field, error = %e, "context field is not hex");
            None
        }
    };
    SensitivityContext {
        criteria,
        original_bits: bits(&control.task, original),
        modified_bits: bits(&variant.task, modified),
    }
}

fn decode_field(task: &str, field: &str, hex: &str) -> Result<codec::BitVector, AnalysisError> {
    codec::decode(hex).map_err(|source| AnalysisError::MalformedHexInput {
        task: task.to_string(),
        field: field.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{RoundFields, RoundMap};

    fn spn_record(task: &str, rounds: &[(&str, &str)], final_ct: &str) -> ExperimentRecord {
        ExperimentRecord {
            task: task.into(),
            plain_text: "00".into(),
            key: "00".into(),
            method: String::new(),
            round: rounds
                .iter()
                .map(|(id, state)| {
                    let mut fields = RoundFields::new();
                    fields.insert("block_state".into(), (*state).into());
                    (id.to_string(), fields)
                })
                .collect::<RoundMap>(),
            final_ciphertext: final_ct.into(),
        }
    }

    #[test]
    fn test_single_bit_flip_scenario() {
        let records = vec![
            spn_record("control", &[("1", "00")], "00"),
            spn_record("t1", &[("1", "80")], "80"),
        ];
        let analysis = analyze(&records, CipherFamily::Spn, Criteria::PlaintextSensitivity).unwrap();
        let rounds = analysis.results.rounds("t1").unwrap();
        assert_eq!(
            rounds,
            &[RoundDiff {
                round_id: "1".into(),
                original_value: "00".into(),
                modified_value: "80".into(),
                width: 8,
                bit_difference: 1,
            }]
        );
        assert_eq!(analysis.results.final_difference("t1"), Some(1));
    }

    #[test]
    fn test_requires_a_variant() {
        let records = vec![spn_record("control", &[("1", "00")], "00")];
        let err = analyze(&records, CipherFamily::Spn, Criteria::KeySensitivity).unwrap_err();
        assert!(matches!(err, AnalysisError::InsufficientData { found: 1 }));

        let err = analyze(&[], CipherFamily::Spn, Criteria::KeySensitivity).unwrap_err();
        assert!(matches!(err, AnalysisError::InsufficientData { found: 0 }));
    }

    #[test]
    fn test_extra_variant_round_is_a_mismatch() {
        let records = vec![
            spn_record("control", &[("1", "00")], "00"),
            spn_record("t1", &[("1", "00"), ("2", "01")], "00"),
        ];
        let err = analyze(&records, CipherFamily::Spn, Criteria::PlaintextSensitivity).unwrap_err();
        match err {
            AnalysisError::RoundMismatch {
                task,
                round,
                present_in,
            } => {
                assert_eq!(task, "t1");
                assert_eq!(round, "2");
                assert_eq!(present_in, "variant");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_variant_round_is_a_mismatch() {
        let records = vec![
            spn_record("control", &[("1", "00"), ("2", "00")], "00"),
            spn_record("t1", &[("1", "00")], "00"),
        ];
        let err = analyze(&records, CipherFamily::Spn, Criteria::PlaintextSensitivity).unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::RoundMismatch { present_in: "control", .. }
        ));
    }

    #[test]
    fn test_wrong_family_is_malformed_round_state() {
        let records = vec![
            spn_record("control", &[("1", "00")], "00"),
            spn_record("t1", &[("1", "80")], "80"),
        ];
        let err = analyze(&records, CipherFamily::Feistel, Criteria::PlaintextSensitivity)
            .unwrap_err();
        match err {
            AnalysisError::MalformedRoundState { round, field, .. } => {
                assert_eq!(round, "1");
                assert_eq!(field, "l1");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_bad_hex_names_task_and_field() {
        let records = vec![
            spn_record("control", &[("1", "00")], "00"),
            spn_record("t1", &[("1", "zz")], "80"),
        ];
        let err = analyze(&records, CipherFamily::Spn, Criteria::PlaintextSensitivity).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("\"t1\""));
        assert!(message.contains("round 1"));
    }

    #[test]
    fn test_round_width_covers_wider_value() {
        let records = vec![
            spn_record("control", &[("1", "0F")], "00"),
            spn_record("t1", &[("1", "F")], "00"),
        ];
        let analysis = analyze(&records, CipherFamily::Spn, Criteria::KeySensitivity).unwrap();
        let round = &analysis.results.rounds("t1").unwrap()[0];
        assert_eq!(round.width, 8);
        assert_eq!(round.bit_difference, 0);
    }

    #[test]
    fn test_non_hex_context_does_not_abort() {
        let mut records = vec![
            spn_record("control", &[("1", "00")], "00"),
            spn_record("t1", &[("1", "80")], "80"),
        ];
        records[0].plain_text = "Hello".into();
        records[1].plain_text = "Hellp".into();

        for criteria in [Criteria::PlaintextSensitivity, Criteria::KeySensitivity] {
            let analysis = analyze(&records, CipherFamily::Spn, criteria).unwrap();
            assert_eq!(analysis.results.final_difference("t1"), Some(1));
        }

        let analysis = analyze(&records, CipherFamily::Spn, Criteria::PlaintextSensitivity).unwrap();
        let context = &analysis.results.get("t1").unwrap().context;
        assert_eq!(context.original_bits, None);
        assert_eq!(context.modified_bits, None);

        let analysis = analyze(&records, CipherFamily::Spn, Criteria::KeySensitivity).unwrap();
        let context = &analysis.results.get("t1").unwrap().context;
        assert_eq!(context.original_bits.as_deref(), Some("00000000"));
    }

    #[test]
    fn test_duplicate_task_rejected() {
        let records = vec![
            spn_record("control", &[("1", "00")], "00"),
            spn_record("t1", &[("1", "80")], "80"),
            spn_record("t1", &[("1", "40")], "40"),
        ];
        let err = analyze(&records, CipherFamily::Spn, Criteria::PlaintextSensitivity).unwrap_err();
        assert!(matches!(err, AnalysisError::DuplicateTask { .. }));
    }

    #[test]
    fn test_events_follow_processing_order() {
        let records = vec![
            spn_record("control", &[("1", "00"), ("2", "00")], "00"),
            spn_record("t1", &[("2", "0F"), ("1", "01")], "FF"),
        ];
        let analysis = analyze(&records, CipherFamily::Spn, Criteria::KeySensitivity).unwrap();
        let kinds: Vec<&str> = analysis
            .events
            .iter()
            .map(|e| match e {
                AnalysisEvent::VariantStarted { .. } => "start",
                AnalysisEvent::RoundCompared { round_id, .. } => round_id.as_str(),
                AnalysisEvent::FinalCompared { .. } => "final",
            })
            .collect();
        assert_eq!(kinds, vec!["start", "1", "2", "final"]);
        assert!(matches!(
            analysis.events.last(),
            Some(AnalysisEvent::FinalCompared { bit_difference: 8, .. })
        ));
    }
}
