mod common;

use common::{dollars, harness};
use fxline::amount::format_usd;
use fxline::models::{EntryType, PackageType};
use fxline::rewards::RewardKind;

#[tokio::test]
async fn investment_pays_dri_and_two_smartline_levels() {
    let h = harness();
    let chain = h.chain(2).await;
    let (root, a, b) = (&chain[0], &chain[1], &chain[2]);

    let receipt = h
        .platform
        .create_investment(&b.id, dollars(1000), PackageType::FsIncome)
        .unwrap();
    assert_eq!(receipt.rewards.len(), 3);

    let a = h.user(&a.id);
    assert_eq!(a.direct_income, dollars(60));
    assert_eq!(a.level_earnings[0], dollars(15));
    assert_eq!(a.total_earnings, dollars(15));
    assert_eq!(a.wallet_balance, dollars(75));

    let root = h.user(&root.id);
    assert_eq!(root.level_earnings[1], dollars(10));
    assert_eq!(root.smart_line_income, dollars(10));
    assert_eq!(root.wallet_balance, dollars(10));
    assert_eq!(root.direct_income, 0);

    let b = h.user(&b.id);
    assert_eq!(b.total_investment_amount, dollars(1000));
    assert_eq!(b.wallet_balance, 0);

    let rows = h.platform.store.ledger_entries().unwrap();
    assert_eq!(rows.len(), 4);
    let kinds: Vec<EntryType> = rows.iter().map(|r| r.entry_type).collect();
    assert_eq!(kinds.iter().filter(|k| **k == EntryType::Deposit).count(), 1);
    assert_eq!(kinds.iter().filter(|k| **k == EntryType::DriIncome).count(), 1);
    assert_eq!(kinds.iter().filter(|k| **k == EntryType::SmartlineIncome).count(), 2);
    for row in rows.iter().filter(|r| r.entry_type != EntryType::Deposit) {
        assert_eq!(row.from_user_id.as_deref(), Some(b.id.as_str()));
        assert_eq!(
            row.related_investment_id.as_deref(),
            Some(receipt.investment.id.as_str())
        );
    }

    // only smartline rows carry a level
    let dri = rows.iter().find(|r| r.entry_type == EntryType::DriIncome).unwrap();
    assert_eq!(dri.user_id, a.id);
    assert_eq!(dri.referral_level, None);
    let mut levels: Vec<Option<u8>> = rows
        .iter()
        .filter(|r| r.entry_type == EntryType::SmartlineIncome)
        .map(|r| r.referral_level)
        .collect();
    levels.sort();
    assert_eq!(levels, vec![Some(1), Some(2)]);
}

#[tokio::test]
async fn smartline_stops_after_five_levels() {
    let h = harness();
    let chain = h.chain(6).await;
    let investor = chain.last().unwrap();

    let receipt = h
        .platform
        .create_investment(&investor.id, dollars(2000), PackageType::FsIncome)
        .unwrap();

    let smartline: Vec<_> = receipt
        .rewards
        .iter()
        .filter(|c| c.kind == RewardKind::Smartline)
        .collect();
    assert_eq!(smartline.len(), 5);
    let paid: Vec<String> = smartline.iter().map(|c| format_usd(c.amount)).collect();
    assert_eq!(paid, vec!["30.00", "20.00", "15.00", "10.00", "5.00"]);

    // the root sits six levels up and earns nothing
    assert_eq!(h.user(&chain[0].id).wallet_balance, 0);
    assert_eq!(h.user(&chain[1].id).level_earnings[4], dollars(5));
}

#[tokio::test]
async fn root_investment_pays_nobody() {
    let h = harness();
    let root = h.root().await;
    let receipt = h
        .platform
        .create_investment(&root.id, dollars(500), PackageType::DasTopUp)
        .unwrap();
    assert!(receipt.rewards.is_empty());
    assert_eq!(h.platform.store.ledger_entries().unwrap().len(), 1);
}

#[tokio::test]
async fn invalid_amount_leaves_no_trace() {
    let h = harness();
    let chain = h.chain(1).await;
    let err = h
        .platform
        .create_investment(&chain[1].id, 1_234, PackageType::FsIncome)
        .unwrap_err();
    assert_eq!(err.code(), "invalid_amount");
    let err = h
        .platform
        .create_investment("ghost", dollars(100), PackageType::FsIncome)
        .unwrap_err();
    assert_eq!(err.code(), "user_not_found");
    assert!(h.platform.store.ledger_entries().unwrap().is_empty());
    assert_eq!(h.user(&chain[0].id).wallet_balance, 0);
}
