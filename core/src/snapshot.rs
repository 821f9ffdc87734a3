//! Per-account cache of recent exchange query results.
//!
//! Query jobs write their results here; downstream jobs in the same
//! workflow read them instead of re-hitting the venue. Entries are
//! timestamped, and readers state the oldest acceptable instant (typically
//! their workflow start) so consistency never depends on lock ordering.

use crate::domain::AccountId;
use chrono::{DateTime, Duration, Utc};
use escada_exchange::model::{AccountBalance, ExchangePosition, OrderSnapshot};
use fnv::FnvHashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum SnapshotKey {
    AccountPositions,
    AccountBalance,
    OpenOrders,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum SnapshotPayload {
    Positions(Vec<ExchangePosition>),
    Balance(AccountBalance),
    OpenOrders(Vec<OrderSnapshot>),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ApiSnapshot {
    pub taken_at: DateTime<Utc>,
    pub payload: SnapshotPayload,
}

/// TTL-bounded cache keyed by (account, query kind).
#[derive(Debug)]
pub struct ApiSnapshotCache {
    ttl: Duration,
    entries: RwLock<FnvHashMap<(AccountId, SnapshotKey), ApiSnapshot>>,
}

impl ApiSnapshotCache {
    pub fn new(ttl_secs: i64) -> Self {
        Self {
            ttl: Duration::seconds(ttl_secs),
            entries: RwLock::new(FnvHashMap::default()),
        }
    }

    pub fn put(&self, account: AccountId, key: SnapshotKey, payload: SnapshotPayload) {
        self.entries.write().insert(
            (account, key),
            ApiSnapshot {
                taken_at: Utc::now(),
                payload,
            },
        );
    }

    /// The cached snapshot, provided it is newer than `not_before` and
    /// within the TTL.
    pub fn fresh(
        &self,
        account: AccountId,
        key: SnapshotKey,
        not_before: DateTime<Utc>,
    ) -> Option<ApiSnapshot> {
        let entries = self.entries.read();
        let snapshot = entries.get(&(account, key))?;
        let now = Utc::now();
        if snapshot.taken_at < not_before || now - snapshot.taken_at > self.ttl {
            return None;
        }
        Some(snapshot.clone())
    }

    /// Convenience: a fresh balance, however recent.
    pub fn fresh_balance(&self, account: AccountId) -> Option<AccountBalance> {
        let snapshot = self.fresh(
            account,
            SnapshotKey::AccountBalance,
            Utc::now() - self.ttl,
        )?;
        match snapshot.payload {
            SnapshotPayload::Balance(balance) => Some(balance),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn balance() -> AccountBalance {
        AccountBalance {
            wallet: Decimal::new(1000, 0),
            available: Decimal::new(1000, 0),
            cross_wallet: Decimal::new(1000, 0),
            cross_unrealised_pnl: Decimal::ZERO,
        }
    }

    #[test]
    fn readers_reject_snapshots_older_than_their_floor() {
        let cache = ApiSnapshotCache::new(60);
        let account = AccountId(1);
        cache.put(
            account,
            SnapshotKey::AccountBalance,
            SnapshotPayload::Balance(balance()),
        );
        assert!(cache
            .fresh(
                account,
                SnapshotKey::AccountBalance,
                Utc::now() - Duration::seconds(5)
            )
            .is_some());
        // a reader whose workflow started after the write rejects it
        assert!(cache
            .fresh(
                account,
                SnapshotKey::AccountBalance,
                Utc::now() + Duration::seconds(5)
            )
            .is_none());
    }

    #[test]
    fn missing_keys_are_none() {
        let cache = ApiSnapshotCache::new(60);
        assert!(cache.fresh_balance(AccountId(9)).is_none());
    }
}
