//! End-to-end runs of the router against scripted collaborators.

use claimcheck_core::{
    AcquisitionError, Applicability, CheckOutput, ClaimId, Lane, OracleError, PlausibilityOracle,
    PlausibilityVerdict, RunError, SourceCandidate, SourceDescriptor, ValidationConfig,
    ValidationMethod,
};
use claimcheck_router::{read_lane_files, ClaimRouter, RunSummary};
use claimcheck_test_utils::{
    cited, handle_id, qual, quant, FakeWorld, ScriptedApplicability, ScriptedFactCheck,
    ScriptedPlausibility, ScriptedSandbox, ScriptedSources,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

mockall::mock! {
    pub Plausibility {}

    #[async_trait::async_trait]
    impl PlausibilityOracle for Plausibility {
        async fn assess(&self, claim_text: &str) -> Result<PlausibilityVerdict, OracleError>;
    }
}

fn router(world: &FakeWorld) -> ClaimRouter {
    ClaimRouter::new(world.collaborators(), ValidationConfig::default()).unwrap()
}

fn dataset(id: &str, confidence: f64) -> SourceCandidate {
    SourceCandidate::new(
        SourceDescriptor::new(id, format!("https://data.example/{id}.csv"), "kaggle"),
        confidence,
    )
}

#[tokio::test]
async fn claims_sharing_a_citation_are_verified_against_one_download() {
    let world = FakeWorld::new();
    let claims = vec![
        cited(quant("c1", "Inflation rose 3%"), "ref5", "https://stats.example/cpi.csv"),
        cited(quant("c2", "Core inflation stayed under 2%"), "ref5", "https://stats.example/cpi.csv"),
    ];

    let report = router(&world).run(claims).await.unwrap();

    assert_eq!(report.results.len(), 2);
    for result in &report.results {
        assert_eq!(result.lane, Lane::QuantCited);
        assert_eq!(result.sources_used, vec!["ref5-resident-handle".to_string()]);
    }
    assert_eq!(world.sources.calls().count("fetch"), 1);
    assert_eq!(world.sources.evictions(&handle_id("ref5")), 1);
    assert_eq!(report.batches.len(), 1);
    assert!(report.batches[0].download_ok);
}

#[tokio::test]
async fn overlapping_uncited_claims_reuse_the_cached_dataset() {
    let world = FakeWorld::new()
        .with_sources(ScriptedSources::new().with_search("fell to 4%", vec![dataset("unemployment", 0.9)]))
        .with_applicability(
            ScriptedApplicability::new(Applicability::new(false, 0.0)).with_rule(
                "below 5%",
                "unemployment",
                Applicability::new(true, 0.8),
            ),
        );
    let claims = vec![
        quant("u1", "Unemployment fell to 4% in 2019"),
        quant("u2", "Unemployment in 2019 was below 5%"),
    ];

    let report = router(&world).run(claims).await.unwrap();

    assert_eq!(world.sources.calls().count("search"), 1);
    assert_eq!(report.evidence.len(), 1);
    assert_eq!(report.evidence[0].reuse_count, 1);
    assert_eq!(report.evidence[0].origin_claim_id, ClaimId::new("u1"));

    // Both re-routed claims land in one synthetic batch.
    assert_eq!(world.sources.calls().count("fetch"), 1);
    assert_eq!(report.batches.len(), 1);
    assert!(report.batches[0].citation_key.is_synthetic());
    for result in &report.results {
        assert_eq!(result.lane, Lane::QuantCited);
        assert!(result.synthetic_citation);
        assert_eq!(result.method, ValidationMethod::GeneratedCheck);
    }
}

#[tokio::test]
async fn conclusive_fact_check_skips_plausibility() {
    let mut plausibility = MockPlausibility::new();
    plausibility.expect_assess().times(0);

    let world = FakeWorld::new()
        .with_fact_check(ScriptedFactCheck::new().with_hit("5G towers", "false", 0.8));
    let mut collaborators = world.collaborators();
    collaborators.plausibility = Arc::new(plausibility);

    let router = ClaimRouter::new(collaborators, ValidationConfig::default()).unwrap();
    let report = router
        .run(vec![qual("f1", "5G towers spread the virus")])
        .await
        .unwrap();

    let result = &report.results[0];
    assert_eq!(result.lane, Lane::QualUncited);
    assert_eq!(result.method, ValidationMethod::FactCheck);
    assert!(!result.passed);
    assert_eq!(result.confidence, 0.8);
    assert_eq!(result.sources_used.len(), 1);
}

#[tokio::test]
async fn conclusive_fact_check_settles_a_quantitative_claim_in_place() {
    let world = FakeWorld::new()
        .with_fact_check(ScriptedFactCheck::new().with_hit("200k jobs", "True", 0.9))
        .with_sources(ScriptedSources::new().with_search("jobs", vec![dataset("payrolls", 0.9)]));

    let report = router(&world)
        .run(vec![quant("j1", "The economy added 200k jobs in March")])
        .await
        .unwrap();

    let result = &report.results[0];
    assert_eq!(result.lane, Lane::QuantUncited);
    assert_eq!(result.method, ValidationMethod::FactCheck);
    assert!(result.passed);
    assert!(!result.synthetic_citation);
    assert_eq!(world.plausibility.calls().total(), 0);
    assert_eq!(world.sources.calls().count("search"), 0);
    assert_eq!(world.sources.calls().count("fetch"), 0);
    assert!(report.batches.is_empty());
    assert!(report.evidence.is_empty());
}

#[tokio::test]
async fn conclusive_mixed_rating_fails_without_falling_through() {
    let mut plausibility = MockPlausibility::new();
    plausibility.expect_assess().times(0);

    let world = FakeWorld::new()
        .with_fact_check(ScriptedFactCheck::new().with_hit("minimum wage", "Half True", 0.85));
    let mut collaborators = world.collaborators();
    collaborators.plausibility = Arc::new(plausibility);

    let router = ClaimRouter::new(collaborators, ValidationConfig::default()).unwrap();
    let report = router
        .run(vec![qual("h1", "Raising the minimum wage always costs jobs")])
        .await
        .unwrap();

    let result = &report.results[0];
    assert_eq!(result.method, ValidationMethod::FactCheck);
    assert!(!result.passed);
    assert_eq!(result.confidence, 0.85);
    assert_eq!(result.explanation, "Fact-check rating: Half True");
    assert!(result.error.is_none());
}

#[tokio::test]
async fn failed_download_fails_every_claim_with_one_reason() {
    let world = FakeWorld::new().with_sources(
        ScriptedSources::new()
            .with_fetch_error("https://gone.example/report", AcquisitionError::Network("404".into())),
    );
    let claims = vec![
        cited(qual("q1", "The report praised the reform"), "ref7", "https://gone.example/report"),
        cited(qual("q2", "The report was published in May"), "ref7", "https://gone.example/report"),
        cited(qual("q3", "The authors recommend a pilot"), "ref7", "https://gone.example/report"),
    ];

    let report = router(&world).run(claims).await.unwrap();

    let errors: Vec<Option<&str>> = report.results.iter().map(|r| r.error.as_deref()).collect();
    assert_eq!(errors, vec![Some("network error: 404"); 3]);
    assert!(report.results.iter().all(|r| !r.passed));
    assert!(report
        .results
        .iter()
        .all(|r| r.method == ValidationMethod::BatchFailed));
    assert!(!report.batches[0].download_ok);
    assert_eq!(world.quotes.calls().total(), 0);
    assert_eq!(world.sources.live(), 0);
}

#[tokio::test(start_paused = true)]
async fn slow_check_times_out_without_stalling_the_batch() {
    let world = FakeWorld::new()
        .with_sandbox(ScriptedSandbox::new().with_delay("slow", Duration::from_secs(31)));
    let claims = vec![
        cited(quant("s1", "A slow check on exports"), "ref2", "https://d.example/exports.csv"),
        cited(quant("s2", "Exports doubled"), "ref2", "https://d.example/exports.csv"),
    ];

    let report = router(&world).run(claims).await.unwrap();

    assert!(!report.results[0].passed);
    assert_eq!(report.results[0].error.as_deref(), Some("timeout"));
    assert!(report.results[1].passed);
    assert_eq!(world.sources.live(), 0);
}

#[tokio::test]
async fn missing_kind_aborts_before_any_collaborator_call() {
    let mut broken = qual("k2", "The mayor resigned");
    broken.kind = None;
    let world = FakeWorld::new();

    let outcome = router(&world)
        .run(vec![qual("k1", "The bridge opened"), broken])
        .await;

    assert!(matches!(outcome, Err(RunError::MissingKind { ref claim_id }) if claim_id.as_str() == "k2"));
    assert_eq!(world.fact_check.calls().total(), 0);
    assert_eq!(world.plausibility.calls().total(), 0);
    assert_eq!(world.sources.calls().total(), 0);
}

#[tokio::test]
async fn results_come_back_in_input_order() {
    let world = FakeWorld::new()
        .with_plausibility(ScriptedPlausibility::new().with_verdict("river", true, 0.9))
        .with_sources(ScriptedSources::new().with_text("https://t.example/a", "The river flooded twice."));
    let claims = vec![
        cited(qual("o1", "The river flooded"), "refA", "https://t.example/a"),
        quant("o2", "Rainfall rose 12%"),
        qual("o3", "The river is long"),
        cited(quant("o4", "Output fell 2%"), "refB", "https://d.example/b.csv"),
        qual("o5", "Tourism recovered"),
    ];
    let ids: Vec<ClaimId> = claims.iter().map(|c| c.id.clone()).collect();

    let report = router(&world).run(claims).await.unwrap();

    let result_ids: Vec<ClaimId> = report.results.iter().map(|r| r.claim_id.clone()).collect();
    assert_eq!(result_ids, ids);

    let lanes: Vec<Lane> = report.results.iter().map(|r| r.lane).collect();
    assert_eq!(
        lanes,
        vec![
            Lane::QualCited,
            Lane::QuantUncited,
            Lane::QualUncited,
            Lane::QuantCited,
            Lane::QualUncited,
        ]
    );
    assert_eq!(report.results[2].method, ValidationMethod::Plausibility);
    assert_eq!(report.results[1].method, ValidationMethod::SourceSearch);
    assert_eq!(report.results[1].error.as_deref(), Some("no dataset found"));
    assert_eq!(report.results[4].method, ValidationMethod::Inconclusive);
}

#[tokio::test]
async fn uncited_phase_finishes_before_any_download() {
    let world = FakeWorld::new()
        .with_sources(ScriptedSources::new().with_search("tariff", vec![dataset("tariffs", 0.7)]));
    let router = router(&world);
    let claims = vec![
        quant("p1", "Average tariff rose 5%"),
        cited(quant("p2", "Imports fell 3%"), "ref1", "https://d.example/imports.csv"),
    ];

    let phase1 = router.resolve_uncited(&claims).await;

    assert!(phase1.terminal.is_empty());
    assert_eq!(phase1.rerouted.len(), 1);
    assert_eq!(phase1.rerouted[0].citation_key.as_ref().map(|k| k.is_synthetic()), Some(true));
    assert_eq!(world.sources.calls().count("fetch"), 0);

    let phase2 = router.execute_cited(phase1.rerouted).await;
    assert_eq!(phase2.results.len(), 1);
    assert_eq!(world.sources.calls().count("fetch"), 1);
}

#[tokio::test]
async fn only_one_source_is_resident_under_concurrent_batches() {
    let world = FakeWorld::new()
        .with_sources(ScriptedSources::new().with_fetch_delay(Duration::from_millis(5)));
    let config = ValidationConfig::default()
        .with_batch_concurrency(8)
        .with_verify_concurrency(8);
    let router = ClaimRouter::new(world.collaborators(), config).unwrap();
    let claims = (0..12)
        .map(|i| {
            cited(
                quant(&format!("m{i}"), &format!("Metric {i} grew")),
                &format!("ref{}", i % 6),
                &format!("https://d.example/{}.csv", i % 6),
            )
        })
        .collect();

    let report = router.run(claims).await.unwrap();

    assert_eq!(report.batches.len(), 6);
    assert_eq!(world.sources.max_live(), 1);
    assert_eq!(router.resident_slot().high_water_mark(), 1);
    assert_eq!(router.resident_slot().live(), 0);
}

#[tokio::test]
async fn uncited_oracle_outages_are_loud() {
    let world = FakeWorld::new()
        .with_fact_check(ScriptedFactCheck::new().with_error("museum", OracleError::Unavailable("503".into())))
        .with_plausibility(
            ScriptedPlausibility::new().with_error("museum", OracleError::Failed("rate limited".into())),
        );

    let report = router(&world)
        .run(vec![qual("x1", "The museum reopened")])
        .await
        .unwrap();

    let result = &report.results[0];
    assert_eq!(result.method, ValidationMethod::Inconclusive);
    assert!(!result.passed);
    let error = result.error.as_deref().unwrap();
    assert!(error.contains("fact-check"));
    assert!(error.contains("plausibility"));
}

#[tokio::test]
async fn lane_files_summarize_the_run() {
    let world = FakeWorld::new().with_sandbox(ScriptedSandbox::new().with_output(
        "fell",
        CheckOutput {
            passed: false,
            confidence: 0.8,
            explanation: "series rose".into(),
        },
    ));
    let claims = vec![
        cited(quant("w1", "Output fell 2%"), "ref1", "https://d.example/1.csv"),
        cited(quant("w2", "Output grew 1%"), "ref1", "https://d.example/1.csv"),
        qual("w3", "The plant closed"),
    ];
    let report = router(&world).run(claims).await.unwrap();
    let dir = tempfile::tempdir().unwrap();

    report.write_lane_files(dir.path()).await.unwrap();
    let back = read_lane_files(dir.path()).await.unwrap();

    assert_eq!(back.len(), 3);
    let summary = RunSummary::from_results(&back);
    assert_eq!(summary, report.summary());
    assert_eq!(summary.lanes[&Lane::QuantCited].passed, 1);
    assert_eq!(summary.lanes[&Lane::QuantCited].failed, 1);
}
