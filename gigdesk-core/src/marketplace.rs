//! Marketplace service - order lifecycle, escrow settlement, disputes
//!
//! This module coordinates every state transition in the system. All
//! mutations run inside a single serialized store write, so the
//! status/escrow/wallet triple always commits as one step: no observer can
//! see a completed order with escrow still held, or a wallet credit
//! without the matching status flip.

use crate::{
    auth::{ensure_participant, ensure_participant_or_admin, CredentialVerifier},
    error::MarketError,
    models::{Dispute, Gig, Message, Order, Role, User},
    session::SessionRegistry,
    store::RecordStore,
    MarketResult,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Configuration for the marketplace service
#[derive(Debug, Clone)]
pub struct MarketplaceConfig {
    /// Username for the auto-provisioned admin account
    pub bootstrap_admin_username: String,
    /// Email for the auto-provisioned admin account
    pub bootstrap_admin_email: String,
    /// Credential for the auto-provisioned admin account
    pub bootstrap_admin_password: String,
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            bootstrap_admin_username: "admin".to_string(),
            bootstrap_admin_email: "admin@gigdesk.local".to_string(),
            bootstrap_admin_password: "admin".to_string(),
        }
    }
}

/// User registration request
#[derive(Debug, Clone)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: String,
}

/// Gig creation request
#[derive(Debug, Clone)]
pub struct CreateGigRequest {
    pub title: String,
    pub description: String,
    pub price_sats: i64,
    pub category: Option<String>,
}

/// Successful login: a minted session token plus the user it belongs to
#[derive(Debug, Clone)]
pub struct LoginSession {
    pub token: String,
    pub user: User,
}

/// Main marketplace service
pub struct Marketplace {
    config: MarketplaceConfig,
    store: Arc<RecordStore>,
    sessions: Arc<SessionRegistry>,
    verifier: Arc<dyn CredentialVerifier>,
}

impl Marketplace {
    pub fn new(
        config: MarketplaceConfig,
        store: Arc<RecordStore>,
        sessions: Arc<SessionRegistry>,
        verifier: Arc<dyn CredentialVerifier>,
    ) -> Self {
        Self {
            config,
            store,
            sessions,
            verifier,
        }
    }

    /// Provision the bootstrap admin if no admin account exists
    ///
    /// The system requires exactly one admin at startup; an admin deleted
    /// from the record files reappears on the next boot.
    pub async fn ensure_admin(&self) -> MarketResult<User> {
        let config = self.config.clone();
        let credential = self.verifier.protect(&config.bootstrap_admin_password);
        self.store
            .mutate(move |cols| {
                if let Some(admin) = cols.users.values().find(|u| u.role == Role::Admin) {
                    return Ok(admin.clone());
                }
                let admin = User::new(
                    config.bootstrap_admin_username,
                    config.bootstrap_admin_email,
                    credential,
                    Role::Admin,
                );
                info!("Provisioned bootstrap admin {}", admin.id);
                cols.users.insert(admin.id, admin.clone());
                Ok(admin)
            })
            .await
    }

    /// Register a new user account
    pub async fn register_user(&self, request: RegisterRequest) -> MarketResult<User> {
        if request.username.trim().is_empty()
            || request.email.trim().is_empty()
            || request.password.is_empty()
        {
            return Err(MarketError::validation(
                "username, email and password are required",
            ));
        }
        let role = Role::parse(&request.role)
            .ok_or_else(|| MarketError::validation(format!("Unknown role '{}'", request.role)))?;

        let credential = self.verifier.protect(&request.password);
        let user = self
            .store
            .mutate(move |cols| {
                if cols.user_by_email(&request.email).is_some() {
                    return Err(MarketError::validation("Email already registered"));
                }
                let user = User::new(request.username, request.email, credential, role);
                cols.users.insert(user.id, user.clone());
                Ok(user)
            })
            .await?;

        info!("Registered {} {}", user.role.as_str(), user.id);
        Ok(user)
    }

    /// Verify a credential and mint a session token
    pub async fn login(&self, email: &str, password: &str) -> MarketResult<LoginSession> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(MarketError::validation("email and password are required"));
        }

        let user = self
            .store
            .read(|cols| cols.user_by_email(email).cloned())
            .await;
        let user = match user {
            Some(user) if self.verifier.verify(password, &user.credential) => user,
            _ => return Err(MarketError::unauthenticated("Invalid email or password")),
        };

        let token = self.sessions.issue(user.id).await;
        info!("Login for {} {}", user.role.as_str(), user.id);
        Ok(LoginSession { token, user })
    }

    /// Create a gig listing owned by the acting seller
    pub async fn create_gig(&self, actor: &User, request: CreateGigRequest) -> MarketResult<Gig> {
        if request.title.trim().is_empty() || request.description.trim().is_empty() {
            return Err(MarketError::validation("title and description are required"));
        }
        if request.price_sats <= 0 {
            return Err(MarketError::validation("price must be positive"));
        }

        let seller_id = actor.id;
        let gig = self
            .store
            .mutate(move |cols| {
                cols.require_user(seller_id)?;
                let gig = Gig::new(
                    seller_id,
                    request.title,
                    request.description,
                    request.price_sats,
                    request.category,
                );
                cols.gigs.insert(gig.id, gig.clone());
                Ok(gig)
            })
            .await?;

        info!("Created gig {} by seller {}", gig.id, seller_id);
        Ok(gig)
    }

    /// List every gig, newest first
    pub async fn list_gigs(&self) -> Vec<Gig> {
        let mut gigs = self
            .store
            .read(|cols| cols.gigs.values().cloned().collect::<Vec<_>>())
            .await;
        gigs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        gigs
    }

    pub async fn get_gig(&self, gig_id: Uuid) -> MarketResult<Gig> {
        self.store
            .read(|cols| cols.require_gig(gig_id).cloned())
            .await
    }

    /// Place an order against a gig, holding its price in escrow
    ///
    /// Price and seller are snapshot-copied from the gig at this point and
    /// never looked up live afterwards.
    pub async fn place_order(&self, actor: &User, gig_id: Uuid) -> MarketResult<Order> {
        let buyer_id = actor.id;
        let order = self
            .store
            .mutate(move |cols| {
                let gig = cols.require_gig(gig_id)?;
                let order = Order::new(buyer_id, gig);
                cols.orders.insert(order.id, order.clone());
                Ok(order)
            })
            .await?;

        info!(
            "Placed order {} on gig {} ({} sats in escrow)",
            order.id, gig_id, order.escrow_sats
        );
        Ok(order)
    }

    /// List the orders the acting user participates in, newest first
    pub async fn list_orders(&self, actor: &User) -> Vec<Order> {
        let actor_id = actor.id;
        let mut orders = self
            .store
            .read(|cols| {
                cols.orders
                    .values()
                    .filter(|o| o.is_participant(actor_id))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .await;
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        orders
    }

    /// Complete an order, releasing the escrow to the seller's wallet
    ///
    /// The single forward transition of the order state machine. Either
    /// participant may trigger it; admin acts only through dispute
    /// resolution. Status flip, escrow drain and wallet credit commit in
    /// one serialized step.
    pub async fn complete_order(&self, actor: &User, order_id: Uuid) -> MarketResult<Order> {
        let actor = actor.clone();
        let order = self
            .store
            .mutate(move |cols| {
                let order = cols.require_order(order_id)?;
                ensure_participant(&actor, order)?;
                if order.status.is_terminal() {
                    return Err(MarketError::conflict("Order already completed"));
                }

                let order = cols.require_order_mut(order_id)?;
                let released = order.settle();
                let seller_id = order.seller_id;
                let order = order.clone();
                if let Some(seller) = cols.users.get_mut(&seller_id) {
                    seller.wallet_sats += released;
                }
                Ok(order)
            })
            .await?;

        info!(
            "Completed order {}: released {} sats to seller {}",
            order.id, order.amount_sats, order.seller_id
        );
        Ok(order)
    }

    /// Append a message to an order's log
    pub async fn post_message(
        &self,
        actor: &User,
        order_id: Uuid,
        text: String,
    ) -> MarketResult<Message> {
        if text.trim().is_empty() {
            return Err(MarketError::validation("Message text is required"));
        }

        let actor = actor.clone();
        self.store
            .mutate(move |cols| {
                let order = cols.require_order(order_id)?;
                ensure_participant_or_admin(&actor, order)?;

                let message = Message {
                    sender_id: actor.id,
                    text,
                    sent_at: Utc::now(),
                };
                let order = cols.require_order_mut(order_id)?;
                order.messages.push(message.clone());
                Ok(message)
            })
            .await
    }

    /// Fetch an order's full message log in insertion order
    pub async fn list_messages(&self, actor: &User, order_id: Uuid) -> MarketResult<Vec<Message>> {
        let actor = actor.clone();
        self.store
            .read(move |cols| {
                let order = cols.require_order(order_id)?;
                ensure_participant_or_admin(&actor, order)?;
                Ok(order.messages.clone())
            })
            .await
    }

    /// File a dispute against an order
    ///
    /// Deliberately permissive, matching the original system: nothing
    /// blocks a second dispute on the same order or a dispute against an
    /// already-completed order. Filing never touches order status or
    /// escrow.
    pub async fn file_dispute(
        &self,
        actor: &User,
        order_id: Uuid,
        reason: String,
    ) -> MarketResult<Dispute> {
        if reason.trim().is_empty() {
            return Err(MarketError::validation("Dispute reason is required"));
        }

        let actor = actor.clone();
        let dispute = self
            .store
            .mutate(move |cols| {
                let order = cols.require_order(order_id)?;
                ensure_participant(&actor, order)?;

                let dispute = Dispute::new(order_id, actor.id, reason);
                cols.disputes.insert(dispute.id, dispute.clone());
                Ok(dispute)
            })
            .await?;

        info!("Filed dispute {} on order {}", dispute.id, order_id);
        Ok(dispute)
    }

    /// Resolve an open dispute (admin only)
    ///
    /// Forces the referenced order to completed and zeroes its escrow. The
    /// disposition decides where the escrow goes: released to the seller's
    /// wallet, or discarded (there is no buyer wallet; a refund is a
    /// no-credit outcome). A second resolution of the same dispute fails
    /// `Conflict` and leaves the first resolution untouched.
    pub async fn resolve_dispute(
        &self,
        dispute_id: Uuid,
        resolution: String,
        release_to_seller: bool,
    ) -> MarketResult<Dispute> {
        let dispute = self
            .store
            .mutate(move |cols| {
                let dispute = cols.require_dispute(dispute_id)?;
                if !dispute.is_open() {
                    return Err(MarketError::conflict("Dispute already resolved"));
                }
                let order_id = dispute.order_id;

                let order = cols.require_order_mut(order_id)?;
                // Already-completed orders have nothing left in escrow
                let released = if order.status.is_terminal() {
                    0
                } else {
                    order.settle()
                };
                let seller_id = order.seller_id;
                if release_to_seller && released > 0 {
                    if let Some(seller) = cols.users.get_mut(&seller_id) {
                        seller.wallet_sats += released;
                    }
                }

                let dispute = cols
                    .disputes
                    .get_mut(&dispute_id)
                    .ok_or_else(|| MarketError::not_found("Dispute vanished mid-resolution"))?;
                dispute.status = crate::models::DisputeStatus::Resolved;
                dispute.resolution = Some(resolution);
                dispute.resolved_at = Some(Utc::now());
                Ok(dispute.clone())
            })
            .await?;

        info!(
            "Resolved dispute {} (release_to_seller={})",
            dispute.id, release_to_seller
        );
        Ok(dispute)
    }

    // --- Admin moderation surface ---

    pub async fn list_users(&self) -> Vec<User> {
        self.store
            .read(|cols| cols.users.values().cloned().collect())
            .await
    }

    pub async fn list_all_orders(&self) -> Vec<Order> {
        self.store
            .read(|cols| cols.orders.values().cloned().collect())
            .await
    }

    pub async fn list_disputes(&self) -> Vec<Dispute> {
        self.store
            .read(|cols| cols.disputes.values().cloned().collect())
            .await
    }

    /// Remove a gig by id
    pub async fn delete_gig(&self, gig_id: Uuid) -> MarketResult<Gig> {
        let gig = self
            .store
            .mutate(move |cols| {
                cols.gigs
                    .remove(&gig_id)
                    .ok_or_else(|| MarketError::not_found(format!("Gig {gig_id} not found")))
            })
            .await?;
        info!("Deleted gig {}", gig_id);
        Ok(gig)
    }

    /// Remove a user and cascade onto their gigs and orders
    ///
    /// Orders are removed wherever the user is buyer or seller. Disputes
    /// and messages referencing removed orders are left behind as orphans,
    /// matching the original system's behavior.
    pub async fn delete_user(&self, user_id: Uuid) -> MarketResult<User> {
        let removed = self
            .store
            .mutate(move |cols| {
                let user = cols.users.remove(&user_id).ok_or_else(|| {
                    MarketError::not_found(format!("User {user_id} not found"))
                })?;
                cols.gigs.retain(|_, g| g.seller_id != user_id);
                cols.orders.retain(|_, o| !o.is_participant(user_id));
                Ok(user)
            })
            .await?;

        // Live sessions for the removed user stop resolving
        self.sessions.revoke_user(user_id).await;
        warn!("Deleted user {} and cascaded gigs/orders", user_id);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::PlaintextVerifier;
    use crate::models::{DisputeStatus, OrderStatus};

    fn market() -> Marketplace {
        let store = Arc::new(RecordStore::in_memory());
        let sessions = Arc::new(SessionRegistry::new());
        Marketplace::new(
            MarketplaceConfig::default(),
            store,
            sessions,
            Arc::new(PlaintextVerifier),
        )
    }

    async fn register(market: &Marketplace, name: &str, role: &str) -> User {
        market
            .register_user(RegisterRequest {
                username: name.to_string(),
                email: format!("{name}@example.com"),
                password: "pw".to_string(),
                role: role.to_string(),
            })
            .await
            .unwrap()
    }

    async fn listed_gig(market: &Marketplace, seller: &User, price: i64) -> Gig {
        market
            .create_gig(
                seller,
                CreateGigRequest {
                    title: "Logo design".to_string(),
                    description: "Vector logo".to_string(),
                    price_sats: price,
                    category: None,
                },
            )
            .await
            .unwrap()
    }

    async fn wallet_of(market: &Marketplace, user_id: Uuid) -> i64 {
        market
            .list_users()
            .await
            .into_iter()
            .find(|u| u.id == user_id)
            .map(|u| u.wallet_sats)
            .unwrap()
    }

    #[tokio::test]
    async fn test_ensure_admin_provisions_exactly_once() {
        let market = market();
        let first = market.ensure_admin().await.unwrap();
        let second = market.ensure_admin().await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(
            market
                .list_users()
                .await
                .iter()
                .filter(|u| u.role == Role::Admin)
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected_and_login_round_trips() {
        let market = market();
        let buyer = register(&market, "bo", "buyer").await;

        let dup = market
            .register_user(RegisterRequest {
                username: "other".into(),
                email: "bo@example.com".into(),
                password: "pw2".into(),
                role: "seller".into(),
            })
            .await;
        assert!(matches!(dup, Err(MarketError::Validation(_))));

        let session = market.login("bo@example.com", "pw").await.unwrap();
        assert_eq!(session.user.id, buyer.id);
        assert!(!session.token.is_empty());

        let bad = market.login("bo@example.com", "wrong").await;
        assert!(matches!(bad, Err(MarketError::Unauthenticated(_))));
    }

    #[tokio::test]
    async fn test_order_escrow_scenario() {
        let market = market();
        let seller = register(&market, "vera", "seller").await;
        let buyer = register(&market, "bo", "buyer").await;
        let gig = listed_gig(&market, &seller, 50).await;

        let order = market.place_order(&buyer, gig.id).await.unwrap();
        assert_eq!(order.status, OrderStatus::InProgress);
        assert_eq!(order.escrow_sats, 50);

        let completed = market.complete_order(&buyer, order.id).await.unwrap();
        assert_eq!(completed.status, OrderStatus::Completed);
        assert_eq!(completed.escrow_sats, 0);
        assert!(completed.completed_at.is_some());
        assert_eq!(wallet_of(&market, seller.id).await, 50);

        // Second completion fails without a second credit
        let again = market.complete_order(&buyer, order.id).await;
        assert!(matches!(again, Err(MarketError::Conflict(_))));
        assert_eq!(wallet_of(&market, seller.id).await, 50);
    }

    #[tokio::test]
    async fn test_seller_may_complete_but_stranger_may_not() {
        let market = market();
        let seller = register(&market, "vera", "seller").await;
        let buyer = register(&market, "bo", "buyer").await;
        let stranger = register(&market, "sam", "buyer").await;
        let gig = listed_gig(&market, &seller, 30).await;
        let order = market.place_order(&buyer, gig.id).await.unwrap();

        let denied = market.complete_order(&stranger, order.id).await;
        assert!(matches!(denied, Err(MarketError::Forbidden(_))));

        market.complete_order(&seller, order.id).await.unwrap();
        assert_eq!(wallet_of(&market, seller.id).await, 30);
    }

    #[tokio::test]
    async fn test_place_order_requires_existing_gig() {
        let market = market();
        let buyer = register(&market, "bo", "buyer").await;
        let missing = market.place_order(&buyer, Uuid::new_v4()).await;
        assert!(matches!(missing, Err(MarketError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_dispute_refusal_discards_escrow() {
        let market = market();
        let seller = register(&market, "vera", "seller").await;
        let buyer = register(&market, "bo", "buyer").await;
        let gig = listed_gig(&market, &seller, 50).await;
        let order = market.place_order(&buyer, gig.id).await.unwrap();

        let dispute = market
            .file_dispute(&buyer, order.id, "not delivered".into())
            .await
            .unwrap();
        assert_eq!(dispute.status, DisputeStatus::Open);
        // Filing does not touch the order
        let orders = market.list_orders(&buyer).await;
        assert_eq!(orders[0].status, OrderStatus::InProgress);
        assert_eq!(orders[0].escrow_sats, 50);

        let resolved = market
            .resolve_dispute(dispute.id, "buyer favored".into(), false)
            .await
            .unwrap();
        assert_eq!(resolved.status, DisputeStatus::Resolved);
        assert!(resolved.resolved_at.is_some());

        let orders = market.list_orders(&buyer).await;
        assert_eq!(orders[0].status, OrderStatus::Completed);
        assert_eq!(orders[0].escrow_sats, 0);
        // Refusal is a no-credit outcome
        assert_eq!(wallet_of(&market, seller.id).await, 0);
    }

    #[tokio::test]
    async fn test_dispute_release_credits_exactly_once() {
        let market = market();
        let seller = register(&market, "vera", "seller").await;
        let buyer = register(&market, "bo", "buyer").await;
        let gig = listed_gig(&market, &seller, 80).await;
        let order = market.place_order(&buyer, gig.id).await.unwrap();

        let dispute = market
            .file_dispute(&seller, order.id, "buyer unresponsive".into())
            .await
            .unwrap();
        let resolved = market
            .resolve_dispute(dispute.id, "seller favored".into(), true)
            .await
            .unwrap();
        assert_eq!(resolved.resolution.as_deref(), Some("seller favored"));
        assert_eq!(wallet_of(&market, seller.id).await, 80);

        // Second resolution fails and leaves the first untouched
        let again = market
            .resolve_dispute(dispute.id, "changed my mind".into(), false)
            .await;
        assert!(matches!(again, Err(MarketError::Conflict(_))));
        let kept = market
            .list_disputes()
            .await
            .into_iter()
            .find(|d| d.id == dispute.id)
            .unwrap();
        assert_eq!(kept.resolution.as_deref(), Some("seller favored"));
        assert_eq!(wallet_of(&market, seller.id).await, 80);
    }

    #[tokio::test]
    async fn test_messaging_gated_to_participants_and_admin() {
        let market = market();
        let admin = market.ensure_admin().await.unwrap();
        let seller = register(&market, "vera", "seller").await;
        let buyer = register(&market, "bo", "buyer").await;
        let stranger = register(&market, "sam", "buyer").await;
        let gig = listed_gig(&market, &seller, 10).await;
        let order = market.place_order(&buyer, gig.id).await.unwrap();

        market
            .post_message(&buyer, order.id, "any update?".into())
            .await
            .unwrap();
        market
            .post_message(&seller, order.id, "shipping today".into())
            .await
            .unwrap();
        market
            .post_message(&admin, order.id, "moderation note".into())
            .await
            .unwrap();

        let denied = market.post_message(&stranger, order.id, "hi".into()).await;
        assert!(matches!(denied, Err(MarketError::Forbidden(_))));
        let denied = market.list_messages(&stranger, order.id).await;
        assert!(matches!(denied, Err(MarketError::Forbidden(_))));

        let blank = market.post_message(&buyer, order.id, "  ".into()).await;
        assert!(matches!(blank, Err(MarketError::Validation(_))));

        let log = market.list_messages(&admin, order.id).await.unwrap();
        let texts: Vec<_> = log.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["any update?", "shipping today", "moderation note"]);
    }

    #[tokio::test]
    async fn test_dispute_filing_gated_to_participants() {
        let market = market();
        let admin = market.ensure_admin().await.unwrap();
        let seller = register(&market, "vera", "seller").await;
        let buyer = register(&market, "bo", "buyer").await;
        let gig = listed_gig(&market, &seller, 10).await;
        let order = market.place_order(&buyer, gig.id).await.unwrap();

        // Admin is not a participant and may not file
        let denied = market.file_dispute(&admin, order.id, "why not".into()).await;
        assert!(matches!(denied, Err(MarketError::Forbidden(_))));

        let blank = market.file_dispute(&buyer, order.id, "".into()).await;
        assert!(matches!(blank, Err(MarketError::Validation(_))));
    }

    #[tokio::test]
    async fn test_delete_user_cascades() {
        let market = market();
        let seller = register(&market, "vera", "seller").await;
        let buyer = register(&market, "bo", "buyer").await;
        let other_seller = register(&market, "wes", "seller").await;
        let gig = listed_gig(&market, &seller, 10).await;
        let kept_gig = listed_gig(&market, &other_seller, 20).await;
        let order = market.place_order(&buyer, gig.id).await.unwrap();
        let kept_order = market.place_order(&buyer, kept_gig.id).await.unwrap();

        let removed = market.delete_user(seller.id).await.unwrap();
        assert_eq!(removed.id, seller.id);

        let gigs = market.list_gigs().await;
        assert!(gigs.iter().all(|g| g.seller_id != seller.id));
        assert!(gigs.iter().any(|g| g.id == kept_gig.id));

        let orders = market.list_all_orders().await;
        assert!(orders.iter().all(|o| !o.is_participant(seller.id)));
        assert!(orders.iter().any(|o| o.id == kept_order.id));
        assert!(orders.iter().all(|o| o.id != order.id));

        let again = market.delete_user(seller.id).await;
        assert!(matches!(again, Err(MarketError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_gig() {
        let market = market();
        let seller = register(&market, "vera", "seller").await;
        let gig = listed_gig(&market, &seller, 10).await;

        market.delete_gig(gig.id).await.unwrap();
        let missing = market.delete_gig(gig.id).await;
        assert!(matches!(missing, Err(MarketError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_gig_validation() {
        let market = market();
        let seller = register(&market, "vera", "seller").await;

        let free = market
            .create_gig(
                &seller,
                CreateGigRequest {
                    title: "t".into(),
                    description: "d".into(),
                    price_sats: 0,
                    category: None,
                },
            )
            .await;
        assert!(matches!(free, Err(MarketError::Validation(_))));

        let custom = market
            .create_gig(
                &seller,
                CreateGigRequest {
                    title: "t".into(),
                    description: "d".into(),
                    price_sats: 5,
                    category: Some("Design".into()),
                },
            )
            .await
            .unwrap();
        assert_eq!(custom.category, "Design");
    }
}
