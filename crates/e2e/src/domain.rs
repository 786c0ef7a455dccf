//! Product vocabulary and API request payloads

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameType {
    Minecraft,
    Valheim,
    Palworld,
    Rust,
}

impl GameType {
    pub const ALL: [GameType; 4] = [
        GameType::Minecraft,
        GameType::Valheim,
        GameType::Palworld,
        GameType::Rust,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GameType::Minecraft => "minecraft",
            GameType::Valheim => "valheim",
            GameType::Palworld => "palworld",
            GameType::Rust => "rust",
        }
    }

    /// "Minecraft", "Valheim", ...
    pub fn display_name(&self) -> String {
        let s = self.as_str();
        let mut chars = s.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

impl fmt::Display for GameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server capacity class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Small,
    Medium,
    Heavy,
}

/// Price and resources advertised for a tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierSpec {
    pub name: &'static str,
    pub price: &'static str,
    pub ram: &'static str,
    pub players: u32,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Small, Tier::Medium, Tier::Heavy];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Small => "small",
            Tier::Medium => "medium",
            Tier::Heavy => "heavy",
        }
    }

    pub fn spec(&self) -> TierSpec {
        match self {
            Tier::Small => TierSpec { name: "Small", price: "€9.99", ram: "2GB", players: 10 },
            Tier::Medium => TierSpec { name: "Medium", price: "€19.99", ram: "4GB", players: 25 },
            Tier::Heavy => TierSpec { name: "Heavy", price: "€49.99", ram: "8GB", players: 50 },
        }
    }

    /// Price without the currency sign, as shown in test names
    pub fn amount(&self) -> &'static str {
        self.spec().price.trim_start_matches('€')
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Ideal,
    Creditcard,
    Bancontact,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 3] = [
        PaymentMethod::Ideal,
        PaymentMethod::Creditcard,
        PaymentMethod::Bancontact,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Ideal => "ideal",
            PaymentMethod::Creditcard => "creditcard",
            PaymentMethod::Bancontact => "bancontact",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Installing,
    Starting,
    Running,
    Stopping,
    Stopped,
    Pending,
    Deleted,
}

impl ServerStatus {
    /// States a freshly provisioned server may report
    pub const PROVISIONED: [ServerStatus; 4] = [
        ServerStatus::Installing,
        ServerStatus::Starting,
        ServerStatus::Running,
        ServerStatus::Pending,
    ];

    /// States a server may report after an immediate cancel
    pub const HALTED: [ServerStatus; 3] = [
        ServerStatus::Stopped,
        ServerStatus::Stopping,
        ServerStatus::Deleted,
    ];

    /// Case-insensitive; unknown strings yield `None`
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "installing" => Some(ServerStatus::Installing),
            "starting" => Some(ServerStatus::Starting),
            "running" => Some(ServerStatus::Running),
            "stopping" => Some(ServerStatus::Stopping),
            "stopped" => Some(ServerStatus::Stopped),
            "pending" => Some(ServerStatus::Pending),
            "deleted" => Some(ServerStatus::Deleted),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ServerStatus::Installing => "installing",
            ServerStatus::Starting => "starting",
            ServerStatus::Running => "running",
            ServerStatus::Stopping => "stopping",
            ServerStatus::Stopped => "stopped",
            ServerStatus::Pending => "pending",
            ServerStatus::Deleted => "deleted",
        }
    }
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Canceled,
    Canceling,
    Paused,
    Pending,
}

impl SubscriptionStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Some(SubscriptionStatus::Active),
            "canceled" | "cancelled" => Some(SubscriptionStatus::Canceled),
            "canceling" | "cancelling" => Some(SubscriptionStatus::Canceling),
            "paused" => Some(SubscriptionStatus::Paused),
            "pending" => Some(SubscriptionStatus::Pending),
            _ => None,
        }
    }
}

/// `POST /api/checkout/create`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub game_type: String,
    pub tier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<PaymentMethod>,
}

impl CheckoutRequest {
    pub fn new(user_id: &str, email: &str, game: GameType, tier: Tier, server_name: &str) -> Self {
        Self {
            user_id: Some(user_id.to_string()),
            email: Some(email.to_string()),
            game_type: game.as_str().to_string(),
            tier: tier.as_str().to_string(),
            server_name: Some(server_name.to_string()),
            payment_method: None,
        }
    }

    pub fn with_payment_method(mut self, method: PaymentMethod) -> Self {
        self.payment_method = Some(method);
        self
    }
}

/// `POST /api/game-servers/provision`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub game_type: String,
    pub tier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings: Option<serde_json::Value>,
}

impl ProvisionRequest {
    pub fn new(server_id: &str, user_id: &str, name: &str, game: GameType, tier: Tier) -> Self {
        Self {
            server_id: Some(server_id.to_string()),
            user_id: Some(user_id.to_string()),
            name: Some(name.to_string()),
            game_type: game.as_str().to_string(),
            tier: tier.as_str().to_string(),
            version: None,
            settings: None,
        }
    }

    /// Minecraft 1.20.4 with a player cap and MOTD
    pub fn with_minecraft_settings(mut self, motd: &str) -> Self {
        self.version = Some("1.20.4".to_string());
        self.settings = Some(serde_json::json!({
            "MAX_PLAYERS": 10,
            "MOTD": motd,
        }));
        self
    }
}

/// `PATCH /api/game-servers/:id`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<Tier>,
}

/// `DELETE /api/game-servers/:id`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteServerRequest {
    pub keep_data: bool,
}

/// `POST /api/subscriptions/:id/cancel`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelSubscriptionRequest {
    pub immediate: bool,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_mollie: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

/// `POST /api/subscriptions`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubscriptionRequest {
    pub user_id: String,
    pub email: String,
    pub tier: Tier,
    pub game_type: GameType,
    pub server_name: String,
}
