use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, TimeZone, Utc};
use rotate_core::mocks::MockProvider;
use rotate_core::{CatalogRecord, ClassifyOutcome, Error, RetentionScheme, YearlyLimit};
use rotate_engine::{DeleteFailure, RotationManager};

fn reference_now() -> DateTime<FixedOffset> {
    Utc.with_ymd_and_hms(2023, 1, 12, 11, 0, 0)
        .unwrap()
        .fixed_offset()
}

fn scheme() -> RetentionScheme {
    RetentionScheme {
        hourly: 2,
        daily: 5,
        weekly: 10,
        monthly: 12,
        yearly: YearlyLimit::Unlimited,
        dry_run: false,
    }
}

/// Five records one hour apart; the two newest are kept.
fn catalog() -> Vec<CatalogRecord> {
    (2..=6)
        .map(|h| {
            CatalogRecord::new(
                format!("/backups/h{h}.tar"),
                100 * h as u64,
                (reference_now() - Duration::hours(h)).to_utc(),
            )
        })
        .collect()
}

#[tokio::test]
async fn test_rotation_deletes_unkept_records() {
    let provider = Arc::new(MockProvider::with_records(catalog()));
    let manager = RotationManager::new(provider.clone(), Some(scheme()), "/backups");

    let report = manager.rotate_at(reference_now()).await.unwrap();

    assert_eq!(provider.listed(), vec!["/backups"]);
    let mut deleted = provider.deleted();
    deleted.sort();
    assert_eq!(
        deleted,
        vec!["/backups/h4.tar", "/backups/h5.tar", "/backups/h6.tar"]
    );
    assert_eq!(provider.remaining().len(), 2);

    assert_eq!(report.deletion.attempted, 3);
    assert_eq!(report.deletion.deleted, 3);
    assert_eq!(report.deletion.bytes_freed, 400 + 500 + 600);
    assert!(report.deletion.failures.is_empty());
    assert!(report.deletion.warning().is_none());
    assert_eq!(report.outcome.summary().unwrap().hourly.len(), 2);
}

#[tokio::test]
async fn test_dry_run_never_deletes() {
    let provider = Arc::new(MockProvider::with_records(catalog()));
    let manager = RotationManager::new(
        provider.clone(),
        Some(scheme().with_dry_run(true)),
        "/backups",
    );

    let report = manager.rotate_at(reference_now()).await.unwrap();

    assert!(provider.deleted().is_empty());
    assert_eq!(provider.remaining().len(), 5);
    assert!(report.deletion.dry_run);
    assert_eq!(report.deletion.attempted, 3);
    assert_eq!(report.deletion.deleted, 0);
    assert_eq!(report.outcome.summary().unwrap().for_delete.len(), 3);
}

#[tokio::test]
async fn test_delete_failure_does_not_stop_the_run() {
    let provider = Arc::new(
        MockProvider::with_records(catalog())
            .failing_delete("/backups/h5.tar")
            .failing_delete("/backups/h4.tar"),
    );
    let manager = RotationManager::new(provider.clone(), Some(scheme()), "/backups");

    let report = manager.rotate_at(reference_now()).await.unwrap();

    assert_eq!(provider.deleted().len(), 3);
    assert_eq!(report.deletion.deleted, 1);
    assert_eq!(report.deletion.bytes_freed, 600);
    assert_eq!(
        report
            .deletion
            .failures
            .iter()
            .map(|f| f.identifier.as_str())
            .collect::<Vec<_>>(),
        vec!["/backups/h4.tar", "/backups/h5.tar"]
    );
    assert!(matches!(
        report.deletion.warning(),
        Some(Error::PartialDeletion {
            failed: 2,
            attempted: 3
        })
    ));
    // The summary is still returned in full.
    assert_eq!(report.outcome.summary().unwrap().total_categorized(), 5);
}

#[tokio::test]
async fn test_parallel_deletes_match_sequential() {
    let sequential = Arc::new(MockProvider::with_records(catalog()).failing_delete("/backups/h6.tar"));
    let parallel = Arc::new(MockProvider::with_records(catalog()).failing_delete("/backups/h6.tar"));

    let a = RotationManager::new(sequential.clone(), Some(scheme()), "/backups")
        .rotate_at(reference_now())
        .await
        .unwrap();
    let b = RotationManager::new(parallel.clone(), Some(scheme()), "/backups")
        .with_concurrency(4)
        .rotate_at(reference_now())
        .await
        .unwrap();

    assert_eq!(a, b);
    assert_eq!(
        b.deletion.failures,
        vec![DeleteFailure {
            identifier: "/backups/h6.tar".into(),
            message: "Failed to delete /backups/h6.tar: mock delete failure".into(),
        }]
    );
    assert_eq!(sequential.remaining(), parallel.remaining());
}

#[tokio::test]
async fn test_list_failure_is_fatal() {
    let provider = Arc::new(MockProvider::with_records(catalog()).failing_list("access denied"));
    let manager = RotationManager::new(provider.clone(), Some(scheme()), "/backups");

    let err = manager.rotate_at(reference_now()).await.unwrap_err();

    assert!(matches!(err, Error::ProviderList(ref m) if m == "access denied"));
    assert!(provider.deleted().is_empty());
}

#[tokio::test]
async fn test_missing_scheme_aborts_before_listing() {
    let provider = Arc::new(MockProvider::with_records(catalog()));
    let manager = RotationManager::new(provider.clone(), None, "/backups");

    let err = manager.rotate_at(reference_now()).await.unwrap_err();

    assert!(matches!(err, Error::InvalidScheme(_)));
    assert!(provider.listed().is_empty());
}

#[tokio::test]
async fn test_trivial_catalogs_delete_nothing() {
    let empty = Arc::new(MockProvider::new());
    let report = RotationManager::new(empty.clone(), Some(scheme()), "/empty")
        .rotate_at(reference_now())
        .await
        .unwrap();
    assert_eq!(report.outcome, ClassifyOutcome::NoArtifacts);
    assert_eq!(report.deletion.attempted, 0);

    let old = CatalogRecord::new("/only.tar", 1, Utc.with_ymd_and_hms(2001, 1, 1, 0, 0, 0).unwrap());
    let single = Arc::new(MockProvider::with_records(vec![old]));
    let report = RotationManager::new(single.clone(), Some(scheme()), "/single")
        .rotate_at(reference_now())
        .await
        .unwrap();
    assert_eq!(report.outcome, ClassifyOutcome::NotEligible);
    assert!(single.deleted().is_empty());
}
