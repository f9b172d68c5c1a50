mod common;

use chrono::{Duration, Utc};
use common::{dollars, harness};
use fxline::models::{EntryType, PackageType};

#[tokio::test]
async fn unenrolled_users_see_flag_only() {
    let h = harness();
    let root = h.root().await;
    let view = h.platform.get_das_countdown(&root.id).unwrap();
    assert!(!view.is_enrolled);
    assert!(view.detail.is_none());
    // checks are a no-op outside the program
    assert!(h.platform.das.check_and_update_all_tasks(&root.id).unwrap().is_empty());
}

#[tokio::test]
async fn tier_one_completes_once_thresholds_are_met() {
    let h = harness();
    let root = h.root().await;
    for _ in 0..5 {
        h.join(&root).await;
    }

    let outcome = h.platform.enroll_in_das(&root.id).unwrap();
    assert!(outcome.newly_enrolled);
    assert!(outcome.completed_tiers.is_empty());

    let receipt = h
        .platform
        .create_investment(&root.id, dollars(10_000), PackageType::DasTopUp)
        .unwrap();
    assert_eq!(receipt.das_completed, vec![1]);

    let user = h.user(&root.id);
    assert!(user.das.tasks[0].completed);
    assert!(!user.das.tasks[1].completed);
    assert_eq!(user.das.monthly_earnings, dollars(100));
    assert_eq!(user.wallet_balance, dollars(100));

    // completion is paid once
    assert!(h.platform.das.check_and_update_all_tasks(&root.id).unwrap().is_empty());
    let rows = fxline::ledger::history(&h.platform.store, &root.id, Some(EntryType::DasIncome)).unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn enrollment_is_idempotent_and_keeps_start() {
    let h = harness();
    let root = h.root().await;
    let start = Utc::now() - Duration::days(10);
    assert!(h.platform.das.enroll_at(&root.id, start).unwrap().newly_enrolled);
    assert!(!h.platform.enroll_in_das(&root.id).unwrap().newly_enrolled);

    let view = h.platform.get_das_countdown(&root.id).unwrap();
    let detail = view.detail.unwrap();
    assert_eq!(detail.start_date, start);
    assert_eq!(detail.days_elapsed, 10);
    assert_eq!(detail.days_remaining, 80);
    assert_eq!(detail.tiers.len(), 3);
}

#[tokio::test]
async fn countdown_reports_progress() {
    let h = harness();
    let root = h.root().await;
    for _ in 0..3 {
        h.join(&root).await;
    }
    h.platform.enroll_in_das(&root.id).unwrap();
    h.platform
        .create_investment(&root.id, dollars(5_000), PackageType::FsIncome)
        .unwrap();

    let detail = h.platform.get_das_countdown(&root.id).unwrap().detail.unwrap();
    assert_eq!(detail.referral_count, 3);
    assert_eq!(detail.total_volume, dollars(5_000));
    let t1 = &detail.tiers[0];
    assert_eq!(t1.referral_progress, 60.0);
    assert_eq!(t1.volume_progress, 50.0);
    assert!(!t1.completed);
    let t3 = &detail.tiers[2];
    assert_eq!(t3.referral_progress, 20.0);
    assert_eq!(t3.volume_progress, 10.0);
}

#[tokio::test]
async fn enrolling_late_completes_several_tiers() {
    let h = harness();
    let root = h.root().await;
    for _ in 0..10 {
        h.join(&root).await;
    }
    h.platform
        .create_investment(&root.id, dollars(20_000), PackageType::FsIncome)
        .unwrap();

    let outcome = h.platform.enroll_in_das(&root.id).unwrap();
    assert_eq!(outcome.completed_tiers, vec![1, 2]);
    assert_eq!(h.user(&root.id).das.monthly_earnings, dollars(400));
}

#[tokio::test]
async fn cancelled_investments_do_not_count() {
    let h = harness();
    let root = h.root().await;
    for _ in 0..5 {
        h.join(&root).await;
    }
    let inv = h
        .platform
        .create_investment(&root.id, dollars(10_000), PackageType::FsIncome)
        .unwrap()
        .investment;
    h.platform.investments.cancel_investment(&inv.id).unwrap();

    let stats = h.platform.das.get_actual_stats(&root.id).unwrap();
    assert_eq!(stats.total_volume, 0);
    assert!(h.platform.enroll_in_das(&root.id).unwrap().completed_tiers.is_empty());
}
