//! In-Memory Store
//!
//! Backs the standalone daemon and the test suite. All maps sit behind
//! `parking_lot` locks; the conditional stock decrement holds the product
//! write lock for the check and the update, so concurrent purchases can
//! never oversell.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;

use crate::error::StoreError;
use crate::model::{Donation, Membership, Product, Purchase, UserProfile};
use crate::store::Store;

/// Thread-safe in-memory implementation of [`Store`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    donations: RwLock<Vec<Donation>>,
    purchases: RwLock<Vec<Purchase>>,
    /// Memberships keyed by provider subscription reference
    memberships: RwLock<HashMap<String, Membership>>,
    products: RwLock<HashMap<String, Product>>,
    users: RwLock<HashMap<String, UserProfile>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded donations, newest last.
    pub fn donations(&self) -> Vec<Donation> {
        self.donations.read().clone()
    }

    /// Snapshot of all recorded purchases, newest last.
    pub fn purchases(&self) -> Vec<Purchase> {
        self.purchases.read().clone()
    }

    /// Snapshot of all membership records.
    pub fn memberships(&self) -> Vec<Membership> {
        self.memberships.read().values().cloned().collect()
    }
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    async fn create_donation(&self, donation: Donation) -> Result<(), StoreError> {
        debug!(donation_id = %donation.id, user_id = %donation.user_id, "Recording donation");
        self.donations.write().push(donation);
        Ok(())
    }

    async fn create_purchase(&self, purchase: Purchase) -> Result<(), StoreError> {
        debug!(purchase_id = %purchase.id, product_id = %purchase.product_id, "Recording purchase");
        self.purchases.write().push(purchase);
        Ok(())
    }

    async fn create_membership(&self, membership: Membership) -> Result<(), StoreError> {
        debug!(
            subscription_ref = %membership.subscription_ref,
            user_id = %membership.user_id,
            "Recording membership"
        );
        self.memberships
            .write()
            .insert(membership.subscription_ref.clone(), membership);
        Ok(())
    }

    async fn update_membership(&self, membership: Membership) -> Result<(), StoreError> {
        let mut memberships = self.memberships.write();
        if !memberships.contains_key(&membership.subscription_ref) {
            return Err(StoreError::MembershipNotFound(
                membership.subscription_ref.clone(),
            ));
        }
        memberships.insert(membership.subscription_ref.clone(), membership);
        Ok(())
    }

    async fn membership_by_subscription(
        &self,
        subscription_ref: &str,
    ) -> Result<Option<Membership>, StoreError> {
        Ok(self.memberships.read().get(subscription_ref).cloned())
    }

    async fn decrement_stock(&self, product_id: &str) -> Result<Product, StoreError> {
        let mut products = self.products.write();
        let product = products
            .get_mut(product_id)
            .ok_or_else(|| StoreError::ProductNotFound(product_id.to_string()))?;

        if product.stock == 0 {
            return Err(StoreError::OutOfStock(product_id.to_string()));
        }

        product.stock -= 1;
        debug!(product_id = %product_id, remaining = product.stock, "Stock decremented");
        Ok(product.clone())
    }

    async fn set_user_tier(&self, user_id: &str, tier: &str) -> Result<(), StoreError> {
        let mut users = self.users.write();
        let user = users
            .get_mut(user_id)
            .ok_or_else(|| StoreError::UserNotFound(user_id.to_string()))?;
        user.tier = tier.to_string();
        Ok(())
    }

    async fn product(&self, product_id: &str) -> Result<Option<Product>, StoreError> {
        Ok(self.products.read().get(product_id).cloned())
    }

    async fn upsert_product(&self, product: Product) -> Result<(), StoreError> {
        self.products.write().insert(product.id.clone(), product);
        Ok(())
    }

    async fn user(&self, user_id: &str) -> Result<Option<UserProfile>, StoreError> {
        Ok(self.users.read().get(user_id).cloned())
    }

    async fn upsert_user(&self, user: UserProfile) -> Result<(), StoreError> {
        self.users.write().insert(user.id.clone(), user);
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MembershipStatus, PaymentStatus};
    use chrono::Utc;
    use std::sync::Arc;
    use uuid::Uuid;

    fn sample_product(stock: u32) -> Product {
        Product {
            id: "prod_tote".to_string(),
            name: "Canvas Tote".to_string(),
            price: 25.0,
            currency: "usd".to_string(),
            stock,
        }
    }

    fn sample_membership(subscription_ref: &str) -> Membership {
        let now = Utc::now();
        Membership {
            id: Uuid::new_v4(),
            user_id: "user_1".to_string(),
            tier: "member".to_string(),
            subscription_ref: subscription_ref.to_string(),
            status: MembershipStatus::Active,
            started_at: now,
            current_period_end: None,
            ended_at: None,
            cancel_at_period_end: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_donation_roundtrip() {
        let store = MemoryStore::new();
        let donation = Donation {
            id: Uuid::new_v4(),
            user_id: "user_1".to_string(),
            amount: 50.0,
            currency: "usd".to_string(),
            status: PaymentStatus::Succeeded,
            payment_ref: "cs_test_1".to_string(),
            description: None,
            created_at: Utc::now(),
        };

        store.create_donation(donation.clone()).await.unwrap();

        let recorded = store.donations();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].id, donation.id);
        assert_eq!(recorded[0].amount, 50.0);
    }

    #[tokio::test]
    async fn test_decrement_stock_stops_at_zero() {
        let store = MemoryStore::new();
        store.upsert_product(sample_product(2)).await.unwrap();

        assert_eq!(store.decrement_stock("prod_tote").await.unwrap().stock, 1);
        assert_eq!(store.decrement_stock("prod_tote").await.unwrap().stock, 0);

        let err = store.decrement_stock("prod_tote").await.unwrap_err();
        assert!(matches!(err, StoreError::OutOfStock(_)));

        // Count unchanged after the failed attempt
        let product = store.product("prod_tote").await.unwrap().unwrap();
        assert_eq!(product.stock, 0);
    }

    #[tokio::test]
    async fn test_decrement_stock_unknown_product() {
        let store = MemoryStore::new();
        let err = store.decrement_stock("prod_missing").await.unwrap_err();
        assert!(matches!(err, StoreError::ProductNotFound(_)));
    }

    #[tokio::test]
    async fn test_concurrent_decrements_never_oversell() {
        let store = Arc::new(MemoryStore::new());
        store.upsert_product(sample_product(5)).await.unwrap();

        let mut tasks = Vec::new();
        for _ in 0..20 {
            let store = store.clone();
            tasks.push(tokio::spawn(
                async move { store.decrement_stock("prod_tote").await },
            ));
        }

        let mut succeeded = 0;
        let mut out_of_stock = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(StoreError::OutOfStock(_)) => out_of_stock += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(succeeded, 5);
        assert_eq!(out_of_stock, 15);
        let product = store.product("prod_tote").await.unwrap().unwrap();
        assert_eq!(product.stock, 0);
    }

    #[tokio::test]
    async fn test_membership_update_requires_existing_record() {
        let store = MemoryStore::new();
        let membership = sample_membership("sub_1");

        let err = store.update_membership(membership.clone()).await.unwrap_err();
        assert!(matches!(err, StoreError::MembershipNotFound(_)));

        store.create_membership(membership.clone()).await.unwrap();

        let mut updated = membership;
        updated.status = MembershipStatus::Canceled;
        store.update_membership(updated).await.unwrap();

        let found = store
            .membership_by_subscription("sub_1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.status, MembershipStatus::Canceled);
    }

    #[tokio::test]
    async fn test_set_user_tier() {
        let store = MemoryStore::new();
        store
            .upsert_user(UserProfile {
                id: "user_1".to_string(),
                email: Some("member@example.org".to_string()),
                tier: "free".to_string(),
            })
            .await
            .unwrap();

        store.set_user_tier("user_1", "member").await.unwrap();
        assert_eq!(store.user("user_1").await.unwrap().unwrap().tier, "member");

        let err = store.set_user_tier("user_missing", "member").await.unwrap_err();
        assert!(matches!(err, StoreError::UserNotFound(_)));
    }
}
