//! Payloads of the small REST endpoints the pages poll, plus the page paths
//! the lobby and trade screens navigate to.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::geo::GeoPoint;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LeaderboardEntry {
    pub username: String,
    pub points: i64,
}

pub fn parse_leaderboard(text: &str) -> Result<Vec<LeaderboardEntry>> {
    Ok(serde_json::from_str(text)?)
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RecentCard {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: String,
}

pub fn parse_recent_card(text: &str) -> Result<RecentCard> {
    Ok(serde_json::from_str(text)?)
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Location {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

#[derive(Deserialize)]
struct LocationsData {
    locations: Vec<Location>,
}

/// Body of `/locations-data/`.
pub fn parse_locations(text: &str) -> Result<Vec<Location>> {
    let data: LocationsData = serde_json::from_str(text)?;
    Ok(data.locations)
}

pub const CREATE_BATTLE_PATH: &str = "/battle/";
pub const BATTLE_SELECT_PATH: &str = "/battle-select/";
pub const PERSONAL_TRADES_PATH: &str = "/trades/personal";
pub const CHALLENGES_PATH: &str = "/challenges/";

/// Battle page for a typed-in room id. Room ids are word characters only,
/// matching the socket route.
pub fn join_battle_path(input: &str) -> std::result::Result<String, &'static str> {
    let room_id = input.trim();
    if room_id.is_empty() {
        return Err("Please enter a room ID");
    }
    if !room_id.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err("Room IDs may only contain letters, digits and underscores");
    }
    Ok(format!("/battle/{}/", room_id))
}

/// Claims the card for a completed challenge.
pub fn add_card_path(challenge_id: &str) -> String {
    format!("/add-card/{}", challenge_id.trim())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeAnswer {
    Correct,
    Wrong,
}

impl ChallengeAnswer {
    pub fn title(self) -> &'static str {
        match self {
            ChallengeAnswer::Correct => "You've Earned a New Card!",
            ChallengeAnswer::Wrong => "Ah! Better Luck Next Time!",
        }
    }
}

/// Compares a button's `data-ans` with the page's `#ans` value.
pub fn check_answer(chosen: &str, correct: &str) -> ChallengeAnswer {
    let correct = correct.trim();
    if !correct.is_empty() && chosen.trim() == correct {
        ChallengeAnswer::Correct
    } else {
        ChallengeAnswer::Wrong
    }
}

pub fn trade_create_path(card_title: &str) -> String {
    format!("/trades/create/{}", card_title)
}

/// JSON body for `/trades/submit`: every form field as a string, plus the
/// card being asked for.
pub fn trade_payload<I>(fields: I, requested_card: &str) -> serde_json::Value
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut body: serde_json::Map<String, serde_json::Value> = fields
        .into_iter()
        .map(|(k, v)| (k, serde_json::Value::String(v)))
        .collect();
    body.insert("requested_card".into(), requested_card.into());
    serde_json::Value::Object(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaderboard_rows_keep_server_order() {
        let rows = parse_leaderboard(
            r#"[{"username":"alice","points":40},{"username":"bob","points":12}]"#,
        )
        .unwrap();
        assert_eq!(rows[0], LeaderboardEntry { username: "alice".into(), points: 40 });
        assert_eq!(rows[1].username, "bob");
        assert!(parse_leaderboard(r#"{"error":"nope"}"#).is_err());
    }

    #[test]
    fn recent_card_tolerates_missing_text() {
        let card = parse_recent_card(r#"{"name":"Oak"}"#).unwrap();
        assert_eq!(card.name, "Oak");
        assert!(card.description.is_empty());
    }

    #[test]
    fn join_path_trims_and_validates() {
        assert_eq!(join_battle_path("  room_42 "), Ok("/battle/room_42/".to_string()));
        assert_eq!(join_battle_path("   "), Err("Please enter a room ID"));
        assert!(join_battle_path("../admin").is_err());
    }

    #[test]
    fn trade_payload_adds_requested_card() {
        let body = trade_payload(
            vec![("offered_card".to_string(), "Oak".to_string()), ("note".to_string(), "hi".to_string())],
            "Birch",
        );
        assert_eq!(
            body,
            serde_json::json!({"offered_card": "Oak", "note": "hi", "requested_card": "Birch"})
        );
    }

    #[test]
    fn locations_unwrap_the_envelope() {
        let locations = parse_locations(
            r#"{"locations":[{"name":"Forum","latitude":50.7352,"longitude":-3.5339}]}"#,
        )
        .unwrap();
        assert_eq!(locations.len(), 1);
        assert_eq!(locations[0].name, "Forum");
        assert_eq!(locations[0].point(), GeoPoint::new(50.7352, -3.5339));
        assert!(parse_locations(r#"{"locations":[]}"#).unwrap().is_empty());
        assert!(parse_locations(r#"[{"name":"Forum"}]"#).is_err());
    }

    #[test]
    fn matching_answer_earns_the_card() {
        assert_eq!(check_answer("B", "B"), ChallengeAnswer::Correct);
        assert_eq!(check_answer(" B", "B "), ChallengeAnswer::Correct);
        assert_eq!(check_answer("A", "B"), ChallengeAnswer::Wrong);
        assert_eq!(check_answer("", ""), ChallengeAnswer::Wrong);
        assert_eq!(ChallengeAnswer::Correct.title(), "You've Earned a New Card!");
        assert_eq!(ChallengeAnswer::Wrong.title(), "Ah! Better Luck Next Time!");
    }

    #[test]
    fn add_card_path_uses_the_challenge_id() {
        assert_eq!(add_card_path("7"), "/add-card/7");
    }
}
