//! Quantitative verification
//!
//! Synthesize a check from the claim and the dataset schema, run it in
//! the sandbox under a hard wall-clock bound, map its tri-field record
//! onto a `ValidationResult`. Every failure path yields `passed = false`
//! with `confidence = 0.0` and a populated `error`.

use claimcheck_core::{
    Claim, CodeSynthesisOracle, Lane, ResidentHandle, Sandbox, SandboxError, ValidationConfig,
    ValidationMethod, ValidationResult,
};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

pub struct QuantitativeVerifier {
    synthesis: Arc<dyn CodeSynthesisOracle>,
    sandbox: Arc<dyn Sandbox>,
    check_timeout: Duration,
}

impl fmt::Debug for QuantitativeVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuantitativeVerifier")
            .field("check_timeout", &self.check_timeout)
            .finish_non_exhaustive()
    }
}

impl QuantitativeVerifier {
    #[must_use]
    pub fn new(
        synthesis: Arc<dyn CodeSynthesisOracle>,
        sandbox: Arc<dyn Sandbox>,
        check_timeout: Duration,
    ) -> Self {
        Self {
            synthesis,
            sandbox,
            check_timeout,
        }
    }

    #[must_use]
    pub fn from_config(
        synthesis: Arc<dyn CodeSynthesisOracle>,
        sandbox: Arc<dyn Sandbox>,
        config: &ValidationConfig,
    ) -> Self {
        Self::new(synthesis, sandbox, config.check_timeout())
    }

    /// Verify `claim` against the resident dataset `handle`
    #[instrument(skip_all, fields(claim_id = %claim.id, handle = %handle.id))]
    pub async fn verify(&self, claim: &Claim, handle: &ResidentHandle) -> ValidationResult {
        let lane = Lane::QuantCited;
        let sources = vec![handle.id.clone()];

        let Some((_, schema)) = handle.as_dataset() else {
            return ValidationResult::failure(
                claim,
                lane,
                ValidationMethod::GeneratedCheck,
                "Resident source is not a dataset",
                format!("expected dataset, got {:?}", handle.modality()),
            )
            .with_sources(sources);
        };

        let check = match self.synthesis.synthesize_check(&claim.text, schema).await {
            Ok(check) => check,
            Err(e) => {
                warn!(error = %e, "check synthesis failed");
                return ValidationResult::failure(
                    claim,
                    lane,
                    ValidationMethod::GeneratedCheck,
                    "Could not generate a check for this claim",
                    e.to_string(),
                )
                .with_sources(sources);
            }
        };

        let outcome = tokio::time::timeout(
            self.check_timeout,
            self.sandbox.run(&check, handle, self.check_timeout),
        )
        .await
        .unwrap_or(Err(SandboxError::Timeout));

        let result = match outcome {
            Ok(output) => {
                debug!(passed = output.passed, confidence = output.confidence, "check finished");
                ValidationResult::verdict(
                    claim,
                    lane,
                    ValidationMethod::GeneratedCheck,
                    output.passed,
                    output.confidence,
                    output.explanation,
                )
            }
            Err(SandboxError::Timeout) => {
                warn!(timeout_secs = self.check_timeout.as_secs(), "check timed out");
                ValidationResult::failure(
                    claim,
                    lane,
                    ValidationMethod::GeneratedCheck,
                    format!(
                        "Check exceeded the {}s time limit",
                        self.check_timeout.as_secs()
                    ),
                    SandboxError::Timeout.to_string(),
                )
            }
            Err(e) => {
                warn!(error = %e, "check failed");
                ValidationResult::failure(
                    claim,
                    lane,
                    ValidationMethod::GeneratedCheck,
                    "Check did not produce a valid verdict",
                    e.to_string(),
                )
            }
        };

        result.with_sources(sources).with_check_source(check.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claimcheck_core::{
        CheckOutput, ClaimKind, DatasetSchema, ExecutableCheck, OracleError, SourceDescriptor,
    };
    use claimcheck_test_utils::{ScriptedSandbox, ScriptedSynthesis};
    use pretty_assertions::assert_eq;

    mockall::mock! {
        pub Synth {}

        #[async_trait::async_trait]
        impl CodeSynthesisOracle for Synth {
            async fn synthesize_check(
                &self,
                claim_text: &str,
                schema: &DatasetSchema,
            ) -> Result<ExecutableCheck, OracleError>;
        }
    }

    fn handle() -> ResidentHandle {
        ResidentHandle::dataset(
            "ref5-resident-handle",
            SourceDescriptor::new("ref5", "https://data.example/cpi.csv", "citation"),
            "/tmp/cpi.csv",
            DatasetSchema::new("csv", vec!["year".into(), "cpi".into()]),
        )
    }

    fn claim(text: &str) -> Claim {
        Claim::new("c1", text, ClaimKind::Quantitative).with_citation_key("ref5")
    }

    fn verifier(sandbox: ScriptedSandbox) -> QuantitativeVerifier {
        QuantitativeVerifier::new(
            Arc::new(ScriptedSynthesis::new()),
            Arc::new(sandbox),
            Duration::from_secs(30),
        )
    }

    #[tokio::test]
    async fn passing_check_maps_to_verdict() {
        let sandbox = ScriptedSandbox::new().with_output(
            "Inflation",
            CheckOutput {
                passed: true,
                confidence: 0.92,
                explanation: "CPI rose 3.1%".into(),
            },
        );
        let result = verifier(sandbox).verify(&claim("Inflation rose 3%"), &handle()).await;

        assert!(result.passed);
        assert_eq!(result.confidence, 0.92);
        assert_eq!(result.method, ValidationMethod::GeneratedCheck);
        assert_eq!(result.sources_used, vec!["ref5-resident-handle".to_string()]);
        assert_eq!(result.check_source.as_deref(), Some("Inflation rose 3%"));
        assert!(result.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn check_over_the_limit_is_a_timeout_failure() {
        let sandbox = ScriptedSandbox::new().with_delay("slow", Duration::from_secs(31));
        let result = verifier(sandbox).verify(&claim("slow claim"), &handle()).await;

        assert!(!result.passed);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.error.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn sandbox_errors_are_claim_failures() {
        let sandbox = ScriptedSandbox::new()
            .with_error("crash", SandboxError::Runtime("exit 1: KeyError".into()))
            .with_error("garbled", SandboxError::MalformedOutput("no JSON object in output".into()));
        let verifier = verifier(sandbox);

        let crashed = verifier.verify(&claim("crash now"), &handle()).await;
        assert!(!crashed.passed);
        assert!(crashed.error.unwrap().contains("KeyError"));

        let garbled = verifier.verify(&claim("garbled output"), &handle()).await;
        assert!(!garbled.passed);
        assert_eq!(garbled.confidence, 0.0);
        assert!(garbled.error.unwrap().contains("malformed"));
    }

    #[tokio::test]
    async fn synthesis_failure_skips_the_sandbox() {
        let mut synth = MockSynth::new();
        synth
            .expect_synthesize_check()
            .times(1)
            .returning(|_, _| Err(OracleError::Unavailable("rate limited".into())));
        let sandbox = Arc::new(ScriptedSandbox::new());
        let verifier = QuantitativeVerifier::new(
            Arc::new(synth),
            Arc::clone(&sandbox) as Arc<dyn Sandbox>,
            Duration::from_secs(30),
        );

        let result = verifier.verify(&claim("Inflation rose 3%"), &handle()).await;
        assert!(!result.passed);
        assert!(result.error.unwrap().contains("rate limited"));
        assert_eq!(sandbox.calls().count("run"), 0);
    }

    #[tokio::test]
    async fn text_handle_is_rejected() {
        let text = ResidentHandle::text(
            "t1",
            SourceDescriptor::new("ref5", "https://example.org/a", "citation"),
            "some prose",
        );
        let result = verifier(ScriptedSandbox::new())
            .verify(&claim("Inflation rose 3%"), &text)
            .await;
        assert!(!result.passed);
        assert!(result.is_error());
    }
}
