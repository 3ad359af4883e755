//! Battle socket wire format.
//!
//! Frames are JSON text in both directions, discriminated by an `event` field.

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Card {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub environmental_friendliness: Option<i64>,
    #[serde(default)]
    pub beauty: Option<i64>,
    #[serde(default)]
    pub cost: Option<i64>,
}

impl Card {
    pub fn stat(&self, stat: Stat) -> Option<i64> {
        match stat {
            Stat::EnvironmentalFriendliness => self.environmental_friendliness,
            Stat::Beauty => self.beauty,
            Stat::Cost => self.cost,
        }
    }

    pub fn display_name(&self) -> &str {
        if self.name.is_empty() { "Unknown Card" } else { &self.name }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stat {
    EnvironmentalFriendliness,
    Beauty,
    Cost,
}

impl Stat {
    pub const ALL: [Stat; 3] = [Stat::EnvironmentalFriendliness, Stat::Beauty, Stat::Cost];

    pub fn wire_name(self) -> &'static str {
        match self {
            Stat::EnvironmentalFriendliness => "environmental_friendliness",
            Stat::Beauty => "beauty",
            Stat::Cost => "cost",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Stat::EnvironmentalFriendliness => "Environmental Friendliness",
            Stat::Beauty => "Beauty",
            Stat::Cost => "Cost",
        }
    }

    /// Short label used on the stat buttons.
    pub fn label(self) -> &'static str {
        match self {
            Stat::EnvironmentalFriendliness => "Environment",
            Stat::Beauty => "Beauty",
            Stat::Cost => "Cost",
        }
    }

    pub fn from_wire(name: &str) -> Option<Stat> {
        Stat::ALL.into_iter().find(|s| s.wire_name() == name)
    }
}

/// Player slot as encoded on the wire: `1` is the room creator, `2` the joiner.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(try_from = "u8", into = "u8")]
pub enum Seat {
    One,
    Two,
}

impl TryFrom<u8> for Seat {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(Seat::One),
            2 => Ok(Seat::Two),
            other => Err(format!("invalid player slot {}", other)),
        }
    }
}

impl From<Seat> for u8 {
    fn from(seat: Seat) -> u8 {
        match seat {
            Seat::One => 1,
            Seat::Two => 2,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BattleStatus {
    Waiting,
    Selecting,
    Ready,
    InProgress,
    Completed,
    #[serde(other)]
    Unknown,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RoundWinner {
    Player1,
    Player2,
    Tie,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServerEvent {
    BattleCreated {
        status: Option<BattleStatus>,
    },
    BattleJoined {
        is_player1: Option<bool>,
        username: Option<String>,
        opponent_name: Option<String>,
    },
    BattleState {
        is_player1: bool,
        status: BattleStatus,
        opponent_name: Option<String>,
        current_turn: Option<Seat>,
        player_card: Option<Card>,
        opponent_card: Option<Card>,
        player1_score: Option<u32>,
        player2_score: Option<u32>,
    },
    CardsSelected {
        username: String,
    },
    PlayerReady {
        username: String,
        #[serde(default)]
        both_ready: bool,
        battle_status: Option<BattleStatus>,
        first_turn: Option<Seat>,
    },
    RoundResult {
        result: RoundWinner,
        stat: Option<Stat>,
        player1_score: u32,
        player2_score: u32,
        next_turn: Seat,
        cards_remaining: u32,
        p1_card: Option<Card>,
        p2_card: Option<Card>,
    },
    BattleCompleted {
        #[serde(default)]
        is_tie: bool,
        winner: Option<String>,
        player1_name: Option<String>,
        player2_name: Option<String>,
        player1_score: Option<u32>,
        player2_score: Option<u32>,
    },
    CurrentCards {
        player_card: Option<Card>,
        opponent_card: Option<Card>,
        player1_score: Option<u32>,
        player2_score: Option<u32>,
        current_turn: Option<Seat>,
        is_my_turn: Option<bool>,
    },
    Error {
        message: String,
    },
    UserConnected {
        user: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

impl ServerEvent {
    pub fn parse(text: &str) -> Result<ServerEvent> {
        serde_json::from_str(text).map_err(ClientError::from)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::BattleCreated { .. } => "battle_created",
            ServerEvent::BattleJoined { .. } => "battle_joined",
            ServerEvent::BattleState { .. } => "battle_state",
            ServerEvent::CardsSelected { .. } => "cards_selected",
            ServerEvent::PlayerReady { .. } => "player_ready",
            ServerEvent::RoundResult { .. } => "round_result",
            ServerEvent::BattleCompleted { .. } => "battle_completed",
            ServerEvent::CurrentCards { .. } => "current_cards",
            ServerEvent::Error { .. } => "error",
            ServerEvent::UserConnected { .. } => "user_connected",
            ServerEvent::Unknown => "unknown",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClientMessage {
    RequestState,
    SelectCards { card_ids: Vec<String> },
    Ready,
    SelectStat { stat: Stat },
    RequestCurrentCards,
}

impl ClientMessage {
    pub fn to_json(&self) -> String {
        // Plain enums of strings and vectors always serialize.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Room-scoped socket path, e.g. `/ws/battle/abc123/`.
pub fn battle_socket_path(room_id: &str) -> String {
    format!("/ws/battle/{}/", room_id)
}

pub fn battle_socket_url(secure: bool, host: &str, room_id: &str) -> String {
    let scheme = if secure { "wss:" } else { "ws:" };
    format!("{}//{}{}", scheme, host, battle_socket_path(room_id))
}

/// `GET /get-battle-cards/` body.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct CardPool {
    #[serde(default)]
    pub cards: Vec<Card>,
    #[serde(default)]
    pub error: Option<String>,
}

impl CardPool {
    /// A body-level `error` wins over any cards that came with it.
    pub fn parse(text: &str) -> Result<Vec<Card>> {
        let pool: CardPool = serde_json::from_str(text)?;
        match pool.error {
            Some(message) => Err(ClientError::Server(message)),
            None => Ok(pool.cards),
        }
    }
}
