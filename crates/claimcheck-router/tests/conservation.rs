//! Property tests: every claim set comes back whole, and batches are atomic.

use claimcheck_core::{AcquisitionError, Claim, ClaimId, ValidationConfig, ValidationMethod};
use claimcheck_router::ClaimRouter;
use claimcheck_test_utils::{cited, qual, quant, FakeWorld, ScriptedSources};
use proptest::prelude::*;
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct ClaimShape {
    quantitative: bool,
    citation: Option<u8>,
}

fn claim_shape() -> impl Strategy<Value = ClaimShape> {
    (any::<bool>(), proptest::option::of(0u8..5)).prop_map(|(quantitative, citation)| ClaimShape {
        quantitative,
        citation,
    })
}

fn build(shapes: &[ClaimShape]) -> Vec<Claim> {
    shapes
        .iter()
        .enumerate()
        .map(|(i, shape)| {
            let id = format!("c{i}");
            let claim = if shape.quantitative {
                quant(&id, &format!("Figure {i} rose"))
            } else {
                qual(&id, &format!("Statement {i} holds"))
            };
            match shape.citation {
                Some(key) => cited(claim, &format!("ref{key}"), &url(key)),
                None => claim,
            }
        })
        .collect()
}

fn url(key: u8) -> String {
    format!("https://sources.example/{key}")
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn every_claim_yields_exactly_one_result(
        shapes in proptest::collection::vec(claim_shape(), 0..24),
        broken in proptest::collection::vec(0u8..5, 0..3),
    ) {
        let mut sources = ScriptedSources::new();
        for key in &broken {
            sources = sources.with_fetch_error(&url(*key), AcquisitionError::Network(format!("{key} down")));
        }
        let world = FakeWorld::new().with_sources(sources);
        let claims = build(&shapes);
        let ids: Vec<ClaimId> = claims.iter().map(|c| c.id.clone()).collect();

        let report = runtime().block_on(async {
            let router = ClaimRouter::new(world.collaborators(), ValidationConfig::default()).unwrap();
            router.run(claims).await.unwrap()
        });

        let result_ids: Vec<ClaimId> = report.results.iter().map(|r| r.claim_id.clone()).collect();
        prop_assert_eq!(result_ids, ids);
        prop_assert_eq!(world.sources.live(), 0);
        prop_assert!(world.sources.max_live() <= 1);

        let by_id: HashMap<&ClaimId, _> = report.results.iter().map(|r| (&r.claim_id, r)).collect();
        for batch in &report.batches {
            let results: Vec<_> = batch.claim_ids.iter().map(|id| by_id[id]).collect();
            if batch.download_ok {
                let handle = batch.resident_handle.clone().unwrap();
                for r in &results {
                    prop_assert!(r.sources_used.iter().all(|s| s.starts_with(&handle)));
                }
            } else {
                let first = results[0].error.clone();
                prop_assert!(first.is_some());
                for r in &results {
                    prop_assert!(!r.passed);
                    prop_assert_eq!(r.method, ValidationMethod::BatchFailed);
                    prop_assert_eq!(&r.error, &first);
                }
            }
        }
    }
}
