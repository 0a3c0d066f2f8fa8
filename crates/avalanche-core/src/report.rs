//! Analysis result set and its tabular/JSON renderings.

use core::fmt::{self, Write as _};

use serde::{Deserialize, Serialize};

use crate::record::{CipherFamily, Criteria};

const RULE_WIDTH: usize = 80;

/// Bit difference of one round between control and variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundDiff {
    pub round_id: String,
    pub original_value: String,
    pub modified_value: String,
    /// Width in bits after zero-extension of the narrower value.
    pub width: usize,
    pub bit_difference: u32,
}

impl fmt::Display for RoundDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "round {}: {} -> {} ({} bits)",
            self.round_id, self.original_value, self.modified_value, self.bit_difference
        )
    }
}

/// Bit difference of the final ciphertexts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalDiff {
    pub original: String,
    pub modified: String,
    /// Width in bits after zero-extension of the narrower ciphertext.
    pub width: usize,
    pub bit_difference: u32,
}

impl FinalDiff {
    /// Fraction of output bits that flipped; 0.5 is the ideal avalanche.
    pub fn ratio(&self) -> f64 {
        if self.width == 0 {
            0.0
        } else {
            f64::from(self.bit_difference) / self.width as f64
        }
    }
}

/// The perturbed input of one variant next to the control's, as bit strings.
/// `None` when the input is not hex text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensitivityContext {
    pub criteria: Criteria,
    pub original_bits: Option<String>,
    pub modified_bits: Option<String>,
}

/// Everything computed for one variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task: String,
    pub plain_text: String,
    pub key: String,
    pub method: String,
    pub context: SensitivityContext,
    pub rounds: Vec<RoundDiff>,
    pub final_ciphertext: FinalDiff,
}

impl TaskResult {
    pub fn mean_round_difference(&self) -> Option<f64> {
        if self.rounds.is_empty() {
            return None;
        }
        let total: u32 = self.rounds.iter().map(|r| r.bit_difference).sum();
        Some(f64::from(total) / self.rounds.len() as f64)
    }

    /// Render the per-round table for this task.
    pub fn render_table(&self) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = self.write_table(&mut out);
        out
    }

    fn write_table(&self, out: &mut String) -> fmt::Result {
        let label = self.context.criteria.input_label();
        writeln!(out, "Task: {}", self.task)?;
        let bits = |b: &Option<String>| b.clone().unwrap_or_else(|| "(not hex)".to_string());
        writeln!(out, "Original {label} (in Binary): {}", bits(&self.context.original_bits))?;
        writeln!(out, "Modified {label} (in Binary): {}", bits(&self.context.modified_bits))?;
        writeln!(out, "Plain Text: {}", self.plain_text)?;
        writeln!(out, "Key: {}", self.key)?;
        writeln!(out, "Method: {}", self.method)?;
        writeln!(out, "{}", "-".repeat(RULE_WIDTH))?;

        let value_width = self
            .rounds
            .iter()
            .flat_map(|r| [r.original_value.len(), r.modified_value.len()])
            .chain(["Original".len()])
            .max()
            .unwrap_or(0);
        writeln!(
            out,
            "{:<6} {:<w$} {:<w$} {:>8}",
            "Round",
            "Original",
            "Modified",
            "Bit Diff",
            w = value_width
        )?;
        for r in &self.rounds {
            writeln!(
                out,
                "{:<6} {:<w$} {:<w$} {:>8}",
                r.round_id,
                r.original_value,
                r.modified_value,
                r.bit_difference,
                w = value_width
            )?;
        }
        writeln!(out, "{}", "-".repeat(RULE_WIDTH))?;
        writeln!(
            out,
            "Final ciphertext bit difference: {}/{} ({:.1}%)",
            self.final_ciphertext.bit_difference,
            self.final_ciphertext.width,
            self.final_ciphertext.ratio() * 100.0
        )
    }
}

/// Results of a whole analysis, one entry per variant in dataset order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResultSet {
    pub family: CipherFamily,
    pub criteria: Criteria,
    /// Task id of the control record.
    pub control: String,
    pub tasks: Vec<TaskResult>,
}

impl AnalysisResultSet {
    pub fn get(&self, task: &str) -> Option<&TaskResult> {
        self.tasks.iter().find(|t| t.task == task)
    }

    /// Per-round entries for a task.
    pub fn rounds(&self, task: &str) -> Option<&[RoundDiff]> {
        self.get(task).map(|t| t.rounds.as_slice())
    }

    /// Final-ciphertext bit difference for a task.
    pub fn final_difference(&self, task: &str) -> Option<u32> {
        self.get(task).map(|t| t.final_ciphertext.bit_difference)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskResult> {
        self.tasks.iter()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Largest round count across tasks.
    pub fn max_rounds(&self) -> usize {
        self.tasks.iter().map(|t| t.rounds.len()).max().unwrap_or(0)
    }

    /// Print every task table followed by a one-line-per-task summary.
    pub fn print_summary(&self) {
        println!("{}", "=".repeat(RULE_WIDTH));
        println!(
            "Avalanche Report: {} / {} (control: {})",
            self.family, self.criteria, self.control
        );
        println!("{}", "=".repeat(RULE_WIDTH));
        for task in &self.tasks {
            print!("{}", task.render_table());
            println!("{}", "=".repeat(RULE_WIDTH));
        }
        for task in &self.tasks {
            let mean = task
                .mean_round_difference()
                .map(|m| format!("{m:.2}"))
                .unwrap_or_else(|| "-".to_string());
            println!(
                "  {:<20} mean round diff {:>7}  final {:>4}/{:<4}",
                task.task, mean, task.final_ciphertext.bit_difference, task.final_ciphertext.width
            );
        }
    }

    /// Serialize to a pretty JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
