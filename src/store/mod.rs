//! Persistence Ports for Reconciled Payment Records
//!
//! The reconciler writes donations, purchases, memberships, stock levels, and
//! user tiers through the [`Store`] trait so the webhook pipeline never binds
//! to a concrete database. The in-memory implementation backs tests and the
//! standalone daemon; a production deployment implements the same trait over
//! its document store.
//!
//! Stock decrements are conditional and atomic: a purchase either takes a
//! unit from available stock or fails with [`StoreError::OutOfStock`], never
//! dropping the count below zero under concurrent events.
//!
//! [`StoreError::OutOfStock`]: crate::error::StoreError::OutOfStock

mod memory;

pub use memory::MemoryStore;

use crate::error::StoreError;
use crate::model::{Donation, Membership, Product, Purchase, UserProfile};

/// Persistence operations used by webhook reconciliation.
#[async_trait::async_trait]
pub trait Store: Send + Sync + 'static {
    /// Record a donation (one-time payment).
    async fn create_donation(&self, donation: Donation) -> Result<(), StoreError>;

    /// Record a product purchase.
    async fn create_purchase(&self, purchase: Purchase) -> Result<(), StoreError>;

    /// Record a new membership, keyed by its provider subscription reference.
    async fn create_membership(&self, membership: Membership) -> Result<(), StoreError>;

    /// Replace an existing membership record.
    ///
    /// Fails with [`StoreError::MembershipNotFound`] if no record exists for
    /// the membership's subscription reference.
    ///
    /// [`StoreError::MembershipNotFound`]: crate::error::StoreError::MembershipNotFound
    async fn update_membership(&self, membership: Membership) -> Result<(), StoreError>;

    /// Look up a membership by provider subscription reference.
    async fn membership_by_subscription(
        &self,
        subscription_ref: &str,
    ) -> Result<Option<Membership>, StoreError>;

    /// Atomically take one unit of stock from a product.
    ///
    /// Returns the updated product on success. Fails with
    /// [`StoreError::OutOfStock`] when no stock remains and
    /// [`StoreError::ProductNotFound`] for unknown products; stock never goes
    /// negative.
    ///
    /// [`StoreError::OutOfStock`]: crate::error::StoreError::OutOfStock
    /// [`StoreError::ProductNotFound`]: crate::error::StoreError::ProductNotFound
    async fn decrement_stock(&self, product_id: &str) -> Result<Product, StoreError>;

    /// Set the access tier on a user profile.
    ///
    /// Fails with [`StoreError::UserNotFound`] for unknown users; callers
    /// that treat tier updates as best-effort log and continue.
    ///
    /// [`StoreError::UserNotFound`]: crate::error::StoreError::UserNotFound
    async fn set_user_tier(&self, user_id: &str, tier: &str) -> Result<(), StoreError>;

    /// Look up a product by id.
    async fn product(&self, product_id: &str) -> Result<Option<Product>, StoreError>;

    /// Create or replace a product (used for catalog seeding).
    async fn upsert_product(&self, product: Product) -> Result<(), StoreError>;

    /// Look up a user profile by id.
    async fn user(&self, user_id: &str) -> Result<Option<UserProfile>, StoreError>;

    /// Create or replace a user profile.
    async fn upsert_user(&self, user: UserProfile) -> Result<(), StoreError>;
}
