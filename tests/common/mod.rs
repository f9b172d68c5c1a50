#![allow(dead_code)]

use std::sync::Arc;

use fxline::amount::{usd, Amount};
use fxline::models::{Profile, User, UserField};
use fxline::notify::MemoryNotifier;
use fxline::{Platform, PlatformOptions, Store};

pub struct Harness {
    pub platform: Arc<Platform>,
    pub outbox: Arc<MemoryNotifier>,
    next_profile: std::sync::atomic::AtomicU32,
}

pub fn harness() -> Harness {
    let store = Store::temporary().expect("temporary store");
    let outbox = Arc::new(MemoryNotifier::new());
    let platform = Platform::new(store, outbox.clone(), PlatformOptions::default())
        .expect("platform");
    Harness {
        platform: Arc::new(platform),
        outbox,
        next_profile: std::sync::atomic::AtomicU32::new(0),
    }
}

pub fn profile(n: u32) -> Profile {
    Profile {
        first_name: format!("Member{}", n),
        last_name: "Line".into(),
        mobile: format!("+4470000{:05}", n),
        email: format!("member{}@fxline.test", n),
        password: "correct-horse".into(),
    }
}

impl Harness {
    fn fresh_profile(&self) -> Profile {
        let n = self
            .next_profile
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        profile(n)
    }

    pub async fn root(&self) -> User {
        let p = self.fresh_profile();
        self.platform.referrals.register_root(&p).await.expect("root")
    }

    pub async fn join(&self, sponsor: &User) -> User {
        let p = self.fresh_profile();
        self.platform
            .register_user(&sponsor.own_sponsor_id, &p)
            .await
            .expect("register")
    }

    /// root followed by `len` users, each sponsored by the previous one
    pub async fn chain(&self, len: usize) -> Vec<User> {
        let mut users = vec![self.root().await];
        for _ in 0..len {
            let sponsor = users.last().cloned().expect("non-empty");
            users.push(self.join(&sponsor).await);
        }
        users
    }

    pub fn user(&self, id: &str) -> User {
        self.platform.referrals.user(id).expect("user")
    }

    /// Put spendable money on a wallet without going through an investment
    pub fn fund_wallet(&self, user_id: &str, amount: Amount) {
        self.platform
            .store
            .increment_user_fields(user_id, &[(UserField::WalletBalance, amount as i128)])
            .expect("fund wallet");
    }
}

pub fn dollars(n: u64) -> Amount {
    usd(n)
}
