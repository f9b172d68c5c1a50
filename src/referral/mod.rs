//! Referral Tree Index
//!
//! Users form a forest through `parent`/`children`. Each user carries
//! denormalized descendant counts per distance (`level_counts`, 1..=5),
//! maintained at registration inside the same transaction that links the
//! new user, and repairable from the live tree with
//! [`ReferralTree::reconcile_level_counts`].

pub mod sponsor_id;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{info, warn};

use crate::amount::{self, Amount};
use crate::config::SMARTLINE_DEPTH;
use crate::error::{CoreError, CoreResult};
use crate::metrics::Metrics;
use crate::models::{DasState, Profile, User, UserField};
use crate::notify::Notifier;
use crate::store::{abort, Store, TxResult, UnitOfWork};

const MIN_PASSWORD_LEN: usize = 6;
const MIN_MOBILE_DIGITS: usize = 7;

/// Ancestors of `user_id`, nearest first, at most `levels` long
pub fn uplines(uow: &UnitOfWork<'_>, user_id: &str, levels: usize) -> TxResult<Vec<User>> {
    let user = uow.require_user(user_id)?;
    let mut chain = Vec::with_capacity(levels);
    let mut next = user.parent;
    while chain.len() < levels {
        let Some(id) = next else { break };
        let ancestor = uow.require_user(&id)?;
        next = ancestor.parent.clone();
        chain.push(ancestor);
    }
    Ok(chain)
}

/// Bump `level{d}Count` on each ancestor of a freshly linked user, d = 1..=5.
/// Returns `(ancestor id, distance)` for every counter touched.
pub fn propagate_level_counts(uow: &UnitOfWork<'_>, new_user_id: &str) -> TxResult<Vec<(String, u8)>> {
    let user = uow.require_user(new_user_id)?;
    let mut touched = Vec::new();
    let mut next = user.parent;
    for level in 1..=SMARTLINE_DEPTH as u8 {
        let Some(ancestor_id) = next else { break };
        let ancestor = uow.increment_user_fields(&ancestor_id, &[(UserField::LevelCount(level), 1)])?;
        touched.push((ancestor_id, level));
        next = ancestor.parent;
    }
    Ok(touched)
}

/// Breadth-first descendant count per distance, read from `children`
pub fn live_counts_in(uow: &UnitOfWork<'_>, user_id: &str) -> TxResult<[u64; SMARTLINE_DEPTH]> {
    let root = uow.require_user(user_id)?;
    let mut counts = [0u64; SMARTLINE_DEPTH];
    let mut frontier = root.children;
    for (depth, slot) in counts.iter_mut().enumerate() {
        *slot = frontier.len() as u64;
        if depth + 1 == SMARTLINE_DEPTH || frontier.is_empty() {
            break;
        }
        let mut next = Vec::new();
        for id in &frontier {
            next.extend(uow.require_user(id)?.children);
        }
        frontier = next;
    }
    Ok(counts)
}

fn salted_digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

fn hash_password(password: &str) -> String {
    let salt = hex::encode(rand::random::<[u8; 16]>());
    format!("sha256${}${}", salt, salted_digest(&salt, password))
}

fn required(field: &'static str, value: &str) -> CoreResult<()> {
    if value.trim().is_empty() {
        return Err(CoreError::InvalidField {
            field,
            reason: "required".into(),
        });
    }
    Ok(())
}

fn validate_profile(profile: &Profile) -> CoreResult<()> {
    required("firstName", &profile.first_name)?;
    required("lastName", &profile.last_name)?;
    required("email", &profile.email)?;
    let email = profile.email.trim();
    let well_formed = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    };
    if !well_formed {
        return Err(CoreError::InvalidField {
            field: "email",
            reason: "not an email address".into(),
        });
    }
    let digits = profile.mobile.chars().filter(|c| c.is_ascii_digit()).count();
    if digits < MIN_MOBILE_DIGITS {
        return Err(CoreError::InvalidField {
            field: "mobile",
            reason: format!("expected at least {} digits", MIN_MOBILE_DIGITS),
        });
    }
    if profile.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(CoreError::InvalidField {
            field: "password",
            reason: format!("must be at least {} characters", MIN_PASSWORD_LEN),
        });
    }
    Ok(())
}

/// Drifted counters found (and fixed) for one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterRepair {
    pub user_id: String,
    pub level_counts_before: [u64; SMARTLINE_DEPTH],
    pub level_counts_after: [u64; SMARTLINE_DEPTH],
    pub referral_count_before: u64,
    pub referral_count_after: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub scanned: usize,
    pub repaired: Vec<CounterRepair>,
    pub failures: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownlineMember {
    pub id: String,
    pub own_sponsor_id: String,
    pub name: String,
    pub referral_count: u64,
    #[serde(with = "amount::as_usd")]
    pub total_investment_amount: Amount,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownlineLevel {
    pub level: u8,
    pub members: Vec<DownlineMember>,
}

pub struct ReferralTree {
    store: Store,
    notifier: Arc<dyn Notifier>,
    metrics: Arc<Metrics>,
    max_sponsor_attempts: u32,
}

impl ReferralTree {
    pub fn new(
        store: Store,
        notifier: Arc<dyn Notifier>,
        metrics: Arc<Metrics>,
        max_sponsor_attempts: u32,
    ) -> Self {
        Self {
            store,
            notifier,
            metrics,
            max_sponsor_attempts: max_sponsor_attempts.max(1),
        }
    }

    /// Register a user under the owner of `sponsor_id`
    pub async fn register_user(&self, sponsor_id: &str, profile: &Profile) -> CoreResult<User> {
        let sponsor_id = sponsor_id::normalize(sponsor_id);
        if !sponsor_id::is_valid(&sponsor_id) {
            return Err(CoreError::InvalidSponsor(sponsor_id));
        }
        validate_profile(profile)?;
        let draft = draft_user(profile);

        let user = self.store.atomically(|uow| {
            let Some(parent_id) = uow.user_id_by_sponsor_id(&sponsor_id)? else {
                return abort(CoreError::InvalidSponsor(sponsor_id.clone()));
            };
            self.link_in(
                uow,
                &draft,
                Some((parent_id.as_str(), sponsor_id.as_str())),
                &mut rand::thread_rng(),
            )
        })?;

        info!(
            "[REFERRAL] registered {} ({}) under {}",
            user.own_sponsor_id, user.id, sponsor_id
        );
        self.after_register(&user).await;
        Ok(user)
    }

    /// Register a user with no parent (tree bootstrap)
    pub async fn register_root(&self, profile: &Profile) -> CoreResult<User> {
        validate_profile(profile)?;
        let draft = draft_user(profile);
        let user = self
            .store
            .atomically(|uow| self.link_in(uow, &draft, None, &mut rand::thread_rng()))?;
        info!("[REFERRAL] registered root {} ({})", user.own_sponsor_id, user.id);
        self.after_register(&user).await;
        Ok(user)
    }

    async fn after_register(&self, user: &User) {
        self.metrics.users_registered.inc();
        if let Err(e) = self.notifier.send_welcome_email(user).await {
            warn!("[REFERRAL] welcome email to {} failed: {}", user.email, e);
        }
    }

    /// Insert `draft` and, when a parent is given, attach it and update the
    /// ancestors' counters
    fn link_in<R: Rng + ?Sized>(
        &self,
        uow: &UnitOfWork<'_>,
        draft: &User,
        parent: Option<(&str, &str)>,
        rng: &mut R,
    ) -> TxResult<User> {
        if uow.user_id_by_email(&draft.email)?.is_some() {
            return abort(CoreError::DuplicateEmail);
        }
        if uow.user_id_by_mobile(&draft.mobile)?.is_some() {
            return abort(CoreError::DuplicateMobile);
        }

        let mut user = draft.clone();
        user.own_sponsor_id = self.allocate_sponsor_id(uow, rng)?;
        user.parent = parent.map(|(id, _)| id.to_string());
        user.sponsor_id = parent.map(|(_, code)| code.to_string());
        uow.insert_user(&user)?;

        if let Some((parent_id, _)) = parent {
            let mut sponsor = uow.require_user(parent_id)?;
            sponsor.children.push(user.id.clone());
            if let Err(e) = sponsor.apply_delta(UserField::ReferralCount, 1) {
                return abort(e);
            }
            uow.put_user(&sponsor)?;
            propagate_level_counts(uow, &user.id)?;
        }
        Ok(user)
    }

    fn allocate_sponsor_id<R: Rng + ?Sized>(&self, uow: &UnitOfWork<'_>, rng: &mut R) -> TxResult<String> {
        for _ in 0..self.max_sponsor_attempts {
            let candidate = sponsor_id::generate(rng);
            if uow.user_id_by_sponsor_id(&candidate)?.is_none() {
                return Ok(candidate);
            }
        }
        abort(CoreError::SponsorIdExhausted)
    }

    pub fn user(&self, user_id: &str) -> CoreResult<User> {
        self.store.require_user(user_id)
    }

    /// Ancestor chain, nearest first
    pub fn uplines(&self, user_id: &str, levels: usize) -> CoreResult<Vec<User>> {
        self.store.atomically(|uow| uplines(uow, user_id, levels))
    }

    pub fn live_level_counts(&self, user_id: &str) -> CoreResult<[u64; SMARTLINE_DEPTH]> {
        self.store.atomically(|uow| live_counts_in(uow, user_id))
    }

    /// Overwrite drifted counters with the live walk. `None` when the stored
    /// counters already agree.
    pub fn reconcile_level_counts(&self, user_id: &str) -> CoreResult<Option<CounterRepair>> {
        let repair = self.store.atomically(|uow| {
            let user = uow.require_user(user_id)?;
            let live = live_counts_in(uow, user_id)?;
            let live_referrals = user.children.len() as u64;
            if user.level_counts == live && user.referral_count == live_referrals {
                return Ok(None);
            }

            let mut deltas = vec![(
                UserField::ReferralCount,
                live_referrals as i128 - user.referral_count as i128,
            )];
            for (idx, (stored, actual)) in user.level_counts.iter().zip(live.iter()).enumerate() {
                if stored != actual {
                    deltas.push((
                        UserField::LevelCount(idx as u8 + 1),
                        *actual as i128 - *stored as i128,
                    ));
                }
            }
            uow.increment_user_fields(user_id, &deltas)?;

            Ok(Some(CounterRepair {
                user_id: user.id.clone(),
                level_counts_before: user.level_counts,
                level_counts_after: live,
                referral_count_before: user.referral_count,
                referral_count_after: live_referrals,
            }))
        })?;

        if let Some(r) = &repair {
            self.metrics.counter_repairs.inc();
            warn!(
                "[REFERRAL] repaired counters of {}: {:?} -> {:?}",
                r.user_id, r.level_counts_before, r.level_counts_after
            );
        }
        Ok(repair)
    }

    pub fn reconcile_all(&self) -> CoreResult<ReconcileReport> {
        let mut report = ReconcileReport::default();
        for id in self.store.user_ids()? {
            report.scanned += 1;
            match self.reconcile_level_counts(&id) {
                Ok(Some(repair)) => report.repaired.push(repair),
                Ok(None) => {}
                Err(e) => {
                    report.failures += 1;
                    warn!("[REFERRAL] reconcile of {} failed: {}", id, e);
                }
            }
        }
        info!(
            "[REFERRAL] reconcile scanned={} repaired={} failures={}",
            report.scanned,
            report.repaired.len(),
            report.failures
        );
        Ok(report)
    }

    /// Members per level below `user_id`, `depth` clamped to 1..=5
    pub fn downline(&self, user_id: &str, depth: usize) -> CoreResult<Vec<DownlineLevel>> {
        let depth = depth.clamp(1, SMARTLINE_DEPTH);
        let root = self.store.require_user(user_id)?;
        let mut levels = Vec::with_capacity(depth);
        let mut frontier = root.children;
        for level in 1..=depth {
            if frontier.is_empty() {
                break;
            }
            let mut members = Vec::with_capacity(frontier.len());
            let mut next = Vec::new();
            for id in &frontier {
                let member = self.store.require_user(id)?;
                next.extend(member.children.iter().cloned());
                members.push(DownlineMember {
                    id: member.id.clone(),
                    own_sponsor_id: member.own_sponsor_id.clone(),
                    name: member.full_name(),
                    referral_count: member.referral_count,
                    total_investment_amount: member.total_investment_amount,
                    joined_at: member.created_at,
                });
            }
            levels.push(DownlineLevel {
                level: level as u8,
                members,
            });
            frontier = next;
        }
        Ok(levels)
    }
}

/// Record prepared outside the transaction; sponsor fields are filled in
/// when it is linked
fn draft_user(profile: &Profile) -> User {
    User {
        id: uuid::Uuid::new_v4().to_string(),
        own_sponsor_id: String::new(),
        sponsor_id: None,
        first_name: profile.first_name.trim().to_string(),
        last_name: profile.last_name.trim().to_string(),
        email: profile.email.trim().to_lowercase(),
        mobile: profile.mobile.trim().to_string(),
        password_hash: hash_password(&profile.password),
        parent: None,
        children: Vec::new(),
        referral_count: 0,
        level_counts: [0; SMARTLINE_DEPTH],
        level_earnings: [0; SMARTLINE_DEPTH],
        total_earnings: 0,
        direct_income: 0,
        fs_income: 0,
        smart_line_income: 0,
        wallet_balance: 0,
        daily_fs_income: 0,
        total_investment_amount: 0,
        total_investment_volume: 0,
        total_withdrawn: 0,
        das: DasState::default(),
        created_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::MemoryNotifier;

    fn profile(n: u32) -> Profile {
        Profile {
            first_name: format!("User{}", n),
            last_name: "Test".into(),
            mobile: format!("+1555000{:04}", n),
            email: format!("user{}@example.com", n),
            password: "hunter22".into(),
        }
    }

    fn tree(attempts: u32) -> ReferralTree {
        ReferralTree::new(
            Store::temporary().unwrap(),
            Arc::new(MemoryNotifier::new()),
            Arc::new(Metrics::new().unwrap()),
            attempts,
        )
    }

    #[tokio::test]
    async fn chain_of_six_counts_each_level_once() {
        let t = tree(20);
        let root = t.register_root(&profile(0)).await.unwrap();
        let mut ids = vec![root.id.clone()];
        let mut sponsor = root.own_sponsor_id.clone();
        for n in 1..=6 {
            let u = t.register_user(&sponsor, &profile(n)).await.unwrap();
            sponsor = u.own_sponsor_id.clone();
            ids.push(u.id);
        }

        let root = t.user(&ids[0]).unwrap();
        assert_eq!(root.referral_count, 1);
        // the sixth descendant sits at distance 6 and is not counted
        assert_eq!(root.level_counts, [1, 1, 1, 1, 1]);
        assert_eq!(t.live_level_counts(&ids[0]).unwrap(), root.level_counts);

        let mid = t.user(&ids[3]).unwrap();
        assert_eq!(mid.level_counts, [1, 1, 1, 0, 0]);
    }

    #[tokio::test]
    async fn sponsor_allocation_gives_up_after_capped_attempts() {
        use rand::rngs::StdRng;
        use rand::SeedableRng;

        let t = tree(1);
        let root = t.register_root(&profile(0)).await.unwrap();
        let mut holder = draft_user(&profile(1));
        holder.own_sponsor_id = sponsor_id::generate(&mut StdRng::seed_from_u64(7));
        t.store.atomically(|uow| uow.insert_user(&holder)).unwrap();
        let before = t.store.user_count();

        // the single allowed draw lands on the id already held
        let draft = draft_user(&profile(2));
        let err = t
            .store
            .atomically(|uow| {
                t.link_in(
                    uow,
                    &draft,
                    Some((root.id.as_str(), root.own_sponsor_id.as_str())),
                    &mut StdRng::seed_from_u64(7),
                )
            })
            .unwrap_err();
        assert!(matches!(err, CoreError::SponsorIdExhausted));
        assert_eq!(err.code(), "sponsor_id_exhausted");

        assert_eq!(t.store.user_count(), before);
        assert!(t.store.find_user_by_email(&draft.email).unwrap().is_none());
        let root = t.user(&root.id).unwrap();
        assert!(root.children.is_empty());
        assert_eq!(root.referral_count, 0);
        assert_eq!(root.level_counts, [0; SMARTLINE_DEPTH]);

        // a fresh draw still links normally
        let linked = t
            .store
            .atomically(|uow| {
                t.link_in(
                    uow,
                    &draft,
                    Some((root.id.as_str(), root.own_sponsor_id.as_str())),
                    &mut StdRng::seed_from_u64(8),
                )
            })
            .unwrap();
        assert_ne!(linked.own_sponsor_id, holder.own_sponsor_id);
        assert_eq!(t.user(&root.id).unwrap().level_counts[0], 1);
    }

    #[tokio::test]
    async fn rejects_malformed_and_unknown_sponsors() {
        let t = tree(20);
        let err = t.register_user("XY123", &profile(1)).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidSponsor(_)));
        let err = t.register_user("FX999999", &profile(1)).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidSponsor(_)));
        assert_eq!(t.store.user_count(), 0);
    }

    #[tokio::test]
    async fn normalizes_sponsor_input() {
        let t = tree(20);
        let root = t.register_root(&profile(0)).await.unwrap();
        let padded = format!("  {} ", root.own_sponsor_id.to_lowercase());
        let child = t.register_user(&padded, &profile(1)).await.unwrap();
        assert_eq!(child.parent.as_deref(), Some(root.id.as_str()));
        assert_eq!(child.sponsor_id.as_deref(), Some(root.own_sponsor_id.as_str()));
    }

    #[tokio::test]
    async fn duplicate_contact_details_are_rejected() {
        let t = tree(20);
        let root = t.register_root(&profile(0)).await.unwrap();

        let mut same_email = profile(1);
        same_email.email = "USER0@example.com".into();
        let err = t.register_user(&root.own_sponsor_id, &same_email).await.unwrap_err();
        assert!(matches!(err, CoreError::DuplicateEmail));

        let mut same_mobile = profile(2);
        same_mobile.mobile = profile(0).mobile;
        let err = t.register_user(&root.own_sponsor_id, &same_mobile).await.unwrap_err();
        assert!(matches!(err, CoreError::DuplicateMobile));

        assert_eq!(t.user(&root.id).unwrap().referral_count, 0);
    }

    #[tokio::test]
    async fn profile_fields_are_validated() {
        let t = tree(20);
        let mut bad = profile(0);
        bad.email = "nope".into();
        assert!(matches!(
            t.register_root(&bad).await.unwrap_err(),
            CoreError::InvalidField { field: "email", .. }
        ));
        let mut bad = profile(0);
        bad.password = "123".into();
        assert!(matches!(
            t.register_root(&bad).await.unwrap_err(),
            CoreError::InvalidField { field: "password", .. }
        ));
    }

    #[tokio::test]
    async fn reconcile_repairs_drifted_counters() {
        let t = tree(20);
        let root = t.register_root(&profile(0)).await.unwrap();
        let a = t.register_user(&root.own_sponsor_id, &profile(1)).await.unwrap();
        t.register_user(&a.own_sponsor_id, &profile(2)).await.unwrap();

        t.store
            .increment_user_fields(&root.id, &[(UserField::LevelCount(2), 3)])
            .unwrap();
        let repair = t.reconcile_level_counts(&root.id).unwrap().unwrap();
        assert_eq!(repair.level_counts_before[1], 4);
        assert_eq!(repair.level_counts_after[1], 1);
        assert_eq!(t.user(&root.id).unwrap().level_counts, [1, 1, 0, 0, 0]);
        assert!(t.reconcile_level_counts(&root.id).unwrap().is_none());

        let report = t.reconcile_all().unwrap();
        assert_eq!(report.scanned, 3);
        assert!(report.repaired.is_empty());
    }

    #[tokio::test]
    async fn downline_lists_members_per_level() {
        let t = tree(20);
        let root = t.register_root(&profile(0)).await.unwrap();
        let a = t.register_user(&root.own_sponsor_id, &profile(1)).await.unwrap();
        t.register_user(&root.own_sponsor_id, &profile(2)).await.unwrap();
        t.register_user(&a.own_sponsor_id, &profile(3)).await.unwrap();

        let levels = t.downline(&root.id, 5).unwrap();
        assert_eq!(levels.len(), 2);
        assert_eq!(levels[0].members.len(), 2);
        assert_eq!(levels[1].members.len(), 1);
        assert_eq!(levels[1].members[0].name, "User3 Test");
    }

    #[test]
    fn password_hash_is_salted() {
        let a = hash_password("hunter22");
        let b = hash_password("hunter22");
        assert_ne!(a, b);
        let parts: Vec<&str> = a.split('$').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(salted_digest(parts[1], "hunter22"), parts[2]);
    }
}
