//! Verification Aggregator
//!
//! Combines boolean checks about one target into a single pass/fail verdict.
//! Steps are lazy: a step is only awaited if the verdict is still open, so
//! `AllMustHold` stops at the first false step and `AnyMayHold` stops at the
//! first true one.
//!
//! ```rust,ignore
//! let report = Verification::new("customer grid", VerifyMode::AllMustHold)
//!     .check("row count", checks::row_count_matches(rows, 20, range.total))
//!     .step("status column", async { engine.column_values(&grid, "Status").await ... })
//!     .with_diagnostics(&resolution)
//!     .run()
//!     .await;
//! report.into_result()?;
//! ```

pub mod checks;

use futures::future::{self, BoxFuture};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use tracing::{debug, info};

use crate::resolver::Resolution;
use crate::result::{HoldfastError, HoldfastResult};

/// How step results combine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyMode {
    /// Every step must hold; stops at the first false
    AllMustHold,
    /// One step suffices; stops at the first true
    AnyMayHold,
}

impl fmt::Display for VerifyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllMustHold => f.write_str("all must hold"),
            Self::AnyMayHold => f.write_str("any may hold"),
        }
    }
}

/// One evaluated step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    /// Step name
    pub name: String,
    /// Whether it held
    pub passed: bool,
}

/// Builder collecting lazy steps about one target
pub struct Verification<'a> {
    target: String,
    mode: VerifyMode,
    steps: Vec<(String, BoxFuture<'a, bool>)>,
    diagnostics: Option<String>,
}

impl fmt::Debug for Verification<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Verification")
            .field("target", &self.target)
            .field("mode", &self.mode)
            .field("steps", &self.steps.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl<'a> Verification<'a> {
    /// Start a verification
    #[must_use]
    pub fn new(target: impl Into<String>, mode: VerifyMode) -> Self {
        Self {
            target: target.into(),
            mode,
            steps: Vec::new(),
            diagnostics: None,
        }
    }

    /// Shorthand for [`VerifyMode::AllMustHold`]
    #[must_use]
    pub fn all(target: impl Into<String>) -> Self {
        Self::new(target, VerifyMode::AllMustHold)
    }

    /// Shorthand for [`VerifyMode::AnyMayHold`]
    #[must_use]
    pub fn any(target: impl Into<String>) -> Self {
        Self::new(target, VerifyMode::AnyMayHold)
    }

    /// Add an already computed boolean
    #[must_use]
    pub fn check(self, name: impl Into<String>, passed: bool) -> Self {
        self.step(name, future::ready(passed))
    }

    /// Add a lazy step; it is not polled unless the verdict is still open
    #[must_use]
    pub fn step<F>(mut self, name: impl Into<String>, step: F) -> Self
    where
        F: Future<Output = bool> + Send + 'a,
    {
        self.steps.push((name.into(), step.boxed()));
        self
    }

    /// Attach resolution diagnostics for the failure message
    #[must_use]
    pub fn with_diagnostics(mut self, resolution: &Resolution) -> Self {
        self.diagnostics = Some(resolution.diagnostics());
        self
    }

    /// Attach a free-form note for the failure message
    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.diagnostics = Some(note.into());
        self
    }

    /// Number of registered steps
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether no step was registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Evaluate steps in order until the verdict is decided.
    ///
    /// With no steps, `AllMustHold` passes and `AnyMayHold` fails.
    pub async fn run(self) -> VerificationReport {
        let total = self.steps.len();
        let mut results = Vec::with_capacity(total);
        let mut passed = matches!(self.mode, VerifyMode::AllMustHold);

        for (name, step) in self.steps {
            let held = step.await;
            debug!(target_name = %self.target, step = %name, held, "verification step");
            results.push(StepResult { name, passed: held });
            match (self.mode, held) {
                (VerifyMode::AllMustHold, false) => {
                    passed = false;
                    break;
                }
                (VerifyMode::AnyMayHold, true) => {
                    passed = true;
                    break;
                }
                _ => {}
            }
        }

        let skipped = total - results.len();
        info!(
            target_name = %self.target,
            mode = %self.mode,
            passed,
            evaluated = results.len(),
            skipped,
            "verification finished"
        );
        VerificationReport {
            target: self.target,
            mode: self.mode,
            passed,
            steps: results,
            skipped,
            diagnostics: self.diagnostics,
        }
    }
}

/// Verdict plus the steps that were actually evaluated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    /// Target under verification
    pub target: String,
    /// Combination mode
    pub mode: VerifyMode,
    /// Final verdict
    pub passed: bool,
    /// Evaluated steps, in order
    pub steps: Vec<StepResult>,
    /// Steps never evaluated because the verdict was already decided
    pub skipped: usize,
    /// Resolution diagnostics or note
    pub diagnostics: Option<String>,
}

impl VerificationReport {
    /// Names of evaluated steps that did not hold
    #[must_use]
    pub fn failed_steps(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|s| !s.passed)
            .map(|s| s.name.as_str())
            .collect()
    }

    /// Human-readable failure message
    #[must_use]
    pub fn message(&self) -> String {
        let steps = self
            .steps
            .iter()
            .map(|s| format!("{}={}", s.name, s.passed))
            .collect::<Vec<_>>()
            .join(", ");
        let mut message = format!(
            "{} failed verification ({}): [{}]",
            self.target, self.mode, steps
        );
        if let Some(diagnostics) = &self.diagnostics {
            message.push_str("; ");
            message.push_str(diagnostics);
        }
        message
    }

    /// Raise at the test-report layer
    ///
    /// # Errors
    ///
    /// Returns [`HoldfastError::AssertionFailed`] when the verdict is false
    pub fn into_result(self) -> HoldfastResult<Self> {
        if self.passed {
            Ok(self)
        } else {
            Err(HoldfastError::AssertionFailed {
                message: self.message(),
            })
        }
    }
}
