//! Core data models for the marketplace
//!
//! This module contains the entity records, the order/dispute state
//! machines, and type definitions shared by the store and the service
//! layer. Amounts are integer counts of minor currency units.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// User role enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Places orders and funds escrow
    Buyer,
    /// Lists gigs and receives escrow releases
    Seller,
    /// Moderation surface: deletions, dispute resolution
    Admin,
}

impl Role {
    /// Parse a role from its wire representation
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "buyer" => Some(Self::Buyer),
            "seller" => Some(Self::Seller),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buyer => "buyer",
            Self::Seller => "seller",
            Self::Admin => "admin",
        }
    }
}

/// Order state machine enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Escrow held, work ongoing
    InProgress,
    /// Escrow released or discarded (terminal)
    Completed,
}

impl OrderStatus {
    /// Check if this is a terminal state (no further transitions possible)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Dispute state machine enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisputeStatus {
    /// Awaiting admin resolution
    Open,
    /// Resolved by an admin (terminal)
    Resolved,
}

/// User account with wallet balance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    /// Opaque credential secret, stored via the `CredentialVerifier` seam
    pub credential: String,
    pub role: Role,
    /// Running balance, increased only by escrow release
    pub wallet_sats: i64,
    /// Informational verification level
    pub verification: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(username: String, email: String, credential: String, role: Role) -> Self {
        Self {
            id: Uuid::new_v4(),
            username,
            email,
            credential,
            role,
            wallet_sats: 0,
            verification: "unverified".to_string(),
            created_at: Utc::now(),
        }
    }
}

/// Gig listing owned by a seller
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Gig {
    pub id: Uuid,
    /// Owning seller, immutable after creation
    pub seller_id: Uuid,
    pub title: String,
    pub description: String,
    pub price_sats: i64,
    pub category: String,
    pub created_at: DateTime<Utc>,
}

impl Gig {
    pub fn new(
        seller_id: Uuid,
        title: String,
        description: String,
        price_sats: i64,
        category: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            seller_id,
            title,
            description,
            price_sats,
            category: category.unwrap_or_else(|| "General".to_string()),
            created_at: Utc::now(),
        }
    }
}

/// Message on an order's append-only log
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub sender_id: Uuid,
    pub text: String,
    pub sent_at: DateTime<Utc>,
}

/// Order with escrowed funds
///
/// `amount_sats` and `seller_id` are snapshot-copied from the gig at
/// placement time and never looked up live afterwards. While the order is
/// in progress `escrow_sats == amount_sats`; the escrow drops to exactly 0
/// exactly once, in the same serialized step as the status flip and any
/// wallet credit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    pub gig_id: Uuid,
    pub amount_sats: i64,
    pub status: OrderStatus,
    pub escrow_sats: i64,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Append-only, insertion-ordered
    pub messages: Vec<Message>,
}

impl Order {
    /// Create a new order against a gig, copying price and seller
    pub fn new(buyer_id: Uuid, gig: &Gig) -> Self {
        Self {
            id: Uuid::new_v4(),
            buyer_id,
            seller_id: gig.seller_id,
            gig_id: gig.id,
            amount_sats: gig.price_sats,
            status: OrderStatus::InProgress,
            escrow_sats: gig.price_sats,
            created_at: Utc::now(),
            completed_at: None,
            messages: Vec::new(),
        }
    }

    /// Check whether a user is the buyer or seller of this order
    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.buyer_id == user_id || self.seller_id == user_id
    }

    /// Flip to completed and drain the escrow, returning the released amount
    ///
    /// Callers credit the returned amount to a wallet (or discard it for a
    /// refused dispute) within the same serialized store write.
    pub fn settle(&mut self) -> i64 {
        let released = self.escrow_sats;
        self.status = OrderStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.escrow_sats = 0;
        released
    }
}

/// Dispute raised by an order participant
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dispute {
    pub id: Uuid,
    pub order_id: Uuid,
    pub initiator_id: Uuid,
    pub reason: String,
    pub status: DisputeStatus,
    pub resolution: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Dispute {
    pub fn new(order_id: Uuid, initiator_id: Uuid, reason: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            initiator_id,
            reason,
            status: DisputeStatus::Open,
            resolution: None,
            created_at: Utc::now(),
            resolved_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == DisputeStatus::Open
    }
}
