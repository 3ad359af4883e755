//! Local view of one battle room.
//!
//! `SessionState` holds everything the client believes about the match.
//! Server events and user actions go in, `Effect`s come out; drivers (the
//! browser page or the headless client) turn effects into DOM writes, socket
//! sends and timers. Nothing here touches the outside world, so every
//! transition can be exercised directly in tests.

use std::fmt;
use std::time::Duration;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::protocol::{BattleStatus, Card, ClientMessage, RoundWinner, Seat, ServerEvent, Stat};
use crate::reconnect::{Backoff, Retry};
use crate::selection::{CardSelection, Toggle};

const WAITING_FOR_OPPONENT: &str = "Waiting for opponent...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Waiting,
    Selecting,
    Playing,
    Completed,
}

impl Phase {
    /// Phase implied by a server status. `None` for statuses we do not know.
    pub fn from_status(status: BattleStatus) -> Option<Phase> {
        match status {
            BattleStatus::Waiting => Some(Phase::Waiting),
            BattleStatus::Selecting | BattleStatus::Ready => Some(Phase::Selecting),
            BattleStatus::InProgress => Some(Phase::Playing),
            BattleStatus::Completed => Some(Phase::Completed),
            BattleStatus::Unknown => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Waiting => "waiting",
            Phase::Selecting => "selecting",
            Phase::Playing => "playing",
            Phase::Completed => "completed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Player 1, the room creator.
    Primary,
    Secondary,
}

impl Role {
    pub fn from_is_player1(is_player1: bool) -> Role {
        if is_player1 { Role::Primary } else { Role::Secondary }
    }

    pub fn is_primary(self) -> bool {
        self == Role::Primary
    }

    pub fn owns(self, seat: Seat) -> bool {
        (seat == Seat::One) == self.is_primary()
    }

    /// Orders a player1/player2 pair as (mine, theirs).
    pub fn mine_first<T>(self, player1: T, player2: T) -> (T, T) {
        match self {
            Role::Primary => (player1, player2),
            Role::Secondary => (player2, player1),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Scores {
    pub mine: u32,
    pub theirs: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Victory,
    Defeat,
    Tie,
}

impl Outcome {
    pub fn title(self) -> &'static str {
        match self {
            Outcome::Victory => "Victory!",
            Outcome::Defeat => "Defeat!",
            Outcome::Tie => "It's a Tie!",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Outcome::Victory => "You won the battle! +10 points awarded.",
            Outcome::Defeat => "You lost the battle. +2 points awarded for participating.",
            Outcome::Tie => "The battle ended in a draw. +5 points awarded to both players.",
        }
    }

    /// CSS modifier on the result title.
    pub fn class(self) -> &'static str {
        match self {
            Outcome::Victory => "win",
            Outcome::Defeat => "lose",
            Outcome::Tie => "tie",
        }
    }

    fn log_line(self) -> &'static str {
        match self {
            Outcome::Victory => "Battle complete! You are victorious!",
            Outcome::Defeat => "Battle complete! Better luck next time.",
            Outcome::Tie => "Battle complete! It's a tie!",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connection {
    Connecting,
    Open,
    Reconnecting { attempt: u32 },
    Unreachable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Error,
}

/// Something a driver has to do on the session's behalf.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Log { level: LogLevel, text: String },
    /// Show the card selection panel, hide the battle area, reset the picked count.
    ShowSelection,
    /// Hide the card selection panel, show the battle area.
    ShowBattle,
    /// Fetch the player's card pool. Only the response for the latest
    /// `request` is used.
    LoadCardPool { request: u32 },
    /// Rebuild the selection grid with these cards (empty clears it).
    ShowCardPool(Vec<Card>),
    OpponentName(String),
    Scores(Scores),
    ClearCards,
    /// Cards dealt for the current round. The opponent's stats stay hidden.
    DealtCards { mine: Option<Card>, theirs: Option<Card>, stats_enabled: bool },
    /// Both cards of a finished round, stats visible, compared stat highlighted.
    RoundCards { mine: Option<Card>, theirs: Option<Card>, highlight: Option<Stat> },
    TurnIndicator { local_turn: bool },
    DisableConfirm,
    LockStats,
    Send(ClientMessage),
    /// Ask for the next round's cards once this delay has passed.
    ScheduleNextCards(Duration),
    ScheduleReconnect(Duration),
    Unreachable,
    ShowResult(Outcome),
}

fn info(text: impl Into<String>) -> Effect {
    Effect::Log { level: LogLevel::Info, text: text.into() }
}

fn error(text: impl Into<String>) -> Effect {
    Effect::Log { level: LogLevel::Error, text: text.into() }
}

#[derive(Debug, Clone)]
pub struct SessionState {
    username: String,
    phase: Phase,
    role: Role,
    opponent_name: Option<String>,
    selection: CardSelection,
    selection_submitted: bool,
    is_local_turn: bool,
    stat_locked: bool,
    round: u32,
    scores: Scores,
    outcome: Option<Outcome>,
    connection: Connection,
    backoff: Backoff,
    round_display_delay: Duration,
    pool_request: u32,
}

impl SessionState {
    pub fn new(username: impl Into<String>, config: &ClientConfig) -> Self {
        SessionState {
            username: username.into(),
            phase: Phase::Waiting,
            role: Role::Primary,
            opponent_name: None,
            selection: CardSelection::new(),
            selection_submitted: false,
            is_local_turn: false,
            stat_locked: false,
            round: 1,
            scores: Scores::default(),
            outcome: None,
            connection: Connection::Connecting,
            backoff: Backoff::new(config.reconnect),
            round_display_delay: config.round_display_delay,
            pool_request: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn opponent_name(&self) -> Option<&str> {
        self.opponent_name.as_deref()
    }

    pub fn selection(&self) -> &CardSelection {
        &self.selection
    }

    pub fn is_local_turn(&self) -> bool {
        self.is_local_turn
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn scores(&self) -> Scores {
        self.scores
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    pub fn connection(&self) -> Connection {
        self.connection
    }

    // --- connection lifecycle ---

    pub fn on_open(&mut self) -> Vec<Effect> {
        self.connection = Connection::Open;
        self.backoff.on_open();
        vec![
            info("Connected to battle server!"),
            Effect::Send(ClientMessage::RequestState),
        ]
    }

    /// One close, at most one scheduled reconnect.
    pub fn on_close(&mut self) -> Vec<Effect> {
        match self.backoff.on_close() {
            Retry::After { attempt, delay } => {
                self.connection = Connection::Reconnecting { attempt };
                log::warn!("battle socket closed, reconnect attempt {} in {:?}", attempt, delay);
                vec![
                    error(format!(
                        "Disconnected from battle server. Reconnecting in {:.1}s (attempt {}/{})...",
                        delay.as_secs_f32(),
                        attempt,
                        self.backoff.policy().max_attempts
                    )),
                    Effect::ScheduleReconnect(delay),
                ]
            }
            Retry::GiveUp { attempts } => {
                self.connection = Connection::Unreachable;
                log::error!("{}", ClientError::Unreachable(attempts));
                vec![
                    error("Server unreachable. Reload the page to try again."),
                    Effect::Unreachable,
                ]
            }
        }
    }

    /// Raw socket text. A frame that does not parse is reported and dropped.
    pub fn on_message(&mut self, text: &str) -> Vec<Effect> {
        match ServerEvent::parse(text) {
            Ok(event) => self.apply(event),
            Err(err) => {
                log::error!("dropping frame {:?}: {}", text, err);
                vec![error(format!("Error processing message: {}", err))]
            }
        }
    }

    // --- server events ---

    pub fn apply(&mut self, event: ServerEvent) -> Vec<Effect> {
        log::debug!("event {} in phase {}", event.name(), self.phase);
        let mut fx = Vec::new();
        match event {
            ServerEvent::BattleCreated { status } => {
                fx.push(info("Battle room created. Waiting for opponent..."));
                self.phase = status.and_then(Phase::from_status).unwrap_or(Phase::Waiting);
                self.role = Role::Primary;
                self.opponent_name = None;
                fx.push(Effect::OpponentName(WAITING_FOR_OPPONENT.to_string()));
                if self.phase == Phase::Selecting {
                    fx.push(info("Select your cards while waiting for an opponent..."));
                    self.enter_selection(&mut fx);
                }
            }
            ServerEvent::BattleJoined { is_player1, username, opponent_name } => {
                self.phase = Phase::Selecting;
                if let Some(p1) = is_player1 {
                    self.role = Role::from_is_player1(p1);
                }
                let name = if self.role.is_primary() { username } else { opponent_name };
                let name = name.unwrap_or_else(|| "Opponent".to_string());
                fx.push(Effect::OpponentName(name.clone()));
                if self.role.is_primary() {
                    fx.push(info(format!("{} has joined the battle! Select your cards.", name)));
                } else {
                    fx.push(info("You joined the battle! Select your cards."));
                }
                self.opponent_name = Some(name);
                self.enter_selection(&mut fx);
            }
            ServerEvent::BattleState {
                is_player1,
                status,
                opponent_name,
                current_turn,
                player_card,
                opponent_card,
                player1_score,
                player2_score,
            } => {
                self.role = Role::from_is_player1(is_player1);
                if let Some(phase) = Phase::from_status(status) {
                    self.phase = phase;
                }
                fx.push(Effect::OpponentName(
                    opponent_name.clone().unwrap_or_else(|| WAITING_FOR_OPPONENT.to_string()),
                ));
                self.opponent_name = opponent_name;
                match status {
                    BattleStatus::Selecting => {
                        fx.push(info("Select your cards for battle!"));
                        self.enter_selection(&mut fx);
                    }
                    BattleStatus::InProgress => {
                        if player_card.is_some() && opponent_card.is_some() {
                            // Reconnected mid-round: the cards are already dealt.
                            fx.push(Effect::ShowBattle);
                            self.render_dealt(
                                player_card,
                                opponent_card,
                                player1_score,
                                player2_score,
                                current_turn,
                                None,
                                &mut fx,
                            );
                        } else {
                            self.enter_battle(current_turn, &mut fx);
                        }
                    }
                    _ => {}
                }
            }
            ServerEvent::CardsSelected { username } => {
                fx.push(info(format!("{} has selected their cards", username)));
            }
            ServerEvent::PlayerReady { username, both_ready, battle_status, first_turn } => {
                if username == self.username {
                    fx.push(info("You are ready!"));
                } else {
                    fx.push(info(format!("{} is ready!", username)));
                }
                if both_ready && battle_status == Some(BattleStatus::InProgress) {
                    fx.push(info("Both players ready! Battle begins!"));
                    self.enter_battle(first_turn, &mut fx);
                }
            }
            ServerEvent::RoundResult {
                result,
                stat,
                player1_score,
                player2_score,
                next_turn,
                cards_remaining,
                p1_card,
                p2_card,
            } => {
                let (mine, theirs) = self.role.mine_first(p1_card, p2_card);
                fx.push(Effect::RoundCards { mine, theirs, highlight: stat });
                self.set_scores(player1_score, player2_score, &mut fx);

                let stat_name = stat.map(Stat::display_name).unwrap_or("stats");
                let line = match result {
                    RoundWinner::Tie => {
                        format!("Round {}: It's a tie! Both players get 1 point.", self.round)
                    }
                    winner if self.local_won(winner) => format!(
                        "Round {}: You win! Your card has better {}.",
                        self.round, stat_name
                    ),
                    _ => format!(
                        "Round {}: Opponent wins! Their card has better {}.",
                        self.round, stat_name
                    ),
                };
                fx.push(info(line));

                self.round += 1;
                self.is_local_turn = self.role.owns(next_turn);
                fx.push(info(format!("{} cards remaining", cards_remaining)));
                if cards_remaining > 0 {
                    fx.push(Effect::ScheduleNextCards(self.round_display_delay));
                }
            }
            ServerEvent::BattleCompleted {
                is_tie,
                winner,
                player1_name,
                player2_name,
                player1_score,
                player2_score,
            } => {
                self.phase = Phase::Completed;
                self.set_scores(
                    player1_score.unwrap_or(0),
                    player2_score.unwrap_or(0),
                    &mut fx,
                );
                let outcome = if is_tie {
                    Outcome::Tie
                } else {
                    let (my_name, _) = self.role.mine_first(player1_name, player2_name);
                    match (winner, my_name) {
                        (Some(w), Some(me)) if w == me => Outcome::Victory,
                        _ => Outcome::Defeat,
                    }
                };
                self.outcome = Some(outcome);
                fx.push(Effect::ShowResult(outcome));
                fx.push(info(outcome.log_line()));
            }
            ServerEvent::CurrentCards {
                player_card,
                opponent_card,
                player1_score,
                player2_score,
                current_turn,
                is_my_turn,
            } => {
                self.render_dealt(
                    player_card,
                    opponent_card,
                    player1_score,
                    player2_score,
                    current_turn,
                    is_my_turn,
                    &mut fx,
                );
            }
            ServerEvent::Error { message } => {
                log::warn!("server error: {}", message);
                fx.push(error(format!("Error: {}", message)));
            }
            ServerEvent::UserConnected { user } => {
                log::debug!("{} connected to the room", user.as_deref().unwrap_or("someone"));
            }
            ServerEvent::Unknown => {
                log::debug!("ignoring unknown battle event");
            }
        }
        fx
    }

    /// The round display delay ran out.
    pub fn on_next_cards_due(&mut self) -> Vec<Effect> {
        if self.phase == Phase::Completed {
            return Vec::new();
        }
        let mut fx = vec![Effect::Send(ClientMessage::RequestCurrentCards)];
        self.turn_indicator(&mut fx);
        fx
    }

    // --- user actions ---

    pub fn toggle_card(&mut self, name: &str) -> Result<Toggle> {
        if self.phase != Phase::Selecting || self.selection_submitted {
            return Err(ClientError::InvalidAction("card selection is closed"));
        }
        Ok(self.selection.toggle(name))
    }

    pub fn can_confirm(&self) -> bool {
        self.phase == Phase::Selecting && !self.selection_submitted && self.selection.is_complete()
    }

    /// Sends the deck then readiness. There is no acknowledgement to wait for.
    pub fn confirm_selection(&mut self) -> Result<Vec<Effect>> {
        if self.phase != Phase::Selecting || self.selection_submitted {
            return Err(ClientError::InvalidAction("card selection is closed"));
        }
        if !self.selection.is_complete() {
            return Err(ClientError::SelectionIncomplete(self.selection.len()));
        }
        self.selection_submitted = true;
        Ok(vec![
            Effect::Send(ClientMessage::SelectCards { card_ids: self.selection.names().to_vec() }),
            Effect::Send(ClientMessage::Ready),
            Effect::DisableConfirm,
            info("Cards selected and ready for battle!"),
        ])
    }

    pub fn can_select_stat(&self) -> bool {
        self.phase == Phase::Playing && self.is_local_turn && !self.stat_locked
    }

    /// Locks the stat controls until the next cards are dealt.
    pub fn select_stat(&mut self, stat: Stat) -> Result<Vec<Effect>> {
        if !self.can_select_stat() {
            return Err(ClientError::InvalidAction("it is not your turn to pick a stat"));
        }
        self.stat_locked = true;
        Ok(vec![
            info(format!("You selected {} to compare", stat.display_name())),
            Effect::Send(ClientMessage::SelectStat { stat }),
            Effect::LockStats,
        ])
    }

    /// A card pool fetch finished. Failures and stale responses leave the
    /// grid untouched.
    pub fn on_card_pool(&mut self, request: u32, result: Result<Vec<Card>>) -> Vec<Effect> {
        if request != self.pool_request {
            log::debug!("dropping card pool response {} (latest is {})", request, self.pool_request);
            return Vec::new();
        }
        match result {
            Err(err) => vec![error(format!("Error loading cards: {}", err))],
            Ok(cards) if cards.is_empty() => vec![
                error("No cards available for selection. Please collect some cards first!"),
                Effect::ShowCardPool(cards),
            ],
            Ok(cards) => vec![
                info(format!("{} cards available for selection", cards.len())),
                Effect::ShowCardPool(cards),
            ],
        }
    }

    // --- helpers ---

    fn enter_selection(&mut self, fx: &mut Vec<Effect>) {
        if self.phase != Phase::Selecting {
            fx.push(error(format!(
                "Cannot transition to card selection in game state: {}",
                self.phase
            )));
            return;
        }
        self.selection.clear();
        self.selection_submitted = false;
        fx.push(info("Loading your cards for selection..."));
        fx.push(Effect::ShowSelection);
        self.pool_request = self.pool_request.wrapping_add(1);
        fx.push(Effect::LoadCardPool { request: self.pool_request });
    }

    fn enter_battle(&mut self, first_turn: Option<Seat>, fx: &mut Vec<Effect>) {
        self.phase = Phase::Playing;
        self.round = 1;
        self.stat_locked = false;
        self.is_local_turn = first_turn.map(|seat| self.role.owns(seat)).unwrap_or(false);
        fx.push(Effect::ShowBattle);
        self.scores = Scores::default();
        fx.push(Effect::Scores(self.scores));
        fx.push(Effect::ClearCards);
        self.turn_indicator(fx);
        fx.push(Effect::Send(ClientMessage::RequestCurrentCards));
        fx.push(info(if self.is_local_turn {
            "Battle begins! Your turn first."
        } else {
            "Battle begins! Opponent goes first."
        }));
    }

    #[allow(clippy::too_many_arguments)]
    fn render_dealt(
        &mut self,
        player_card: Option<Card>,
        opponent_card: Option<Card>,
        player1_score: Option<u32>,
        player2_score: Option<u32>,
        current_turn: Option<Seat>,
        is_my_turn: Option<bool>,
        fx: &mut Vec<Effect>,
    ) {
        self.set_scores(player1_score.unwrap_or(0), player2_score.unwrap_or(0), fx);
        self.is_local_turn = is_my_turn
            .or_else(|| current_turn.map(|seat| self.role.owns(seat)))
            .unwrap_or(self.is_local_turn);
        self.stat_locked = false;

        if player_card.is_none() {
            fx.push(error("Error: Your card could not be loaded"));
        }
        if opponent_card.is_none() {
            fx.push(error("Error: Opponent card could not be loaded"));
        }
        fx.push(Effect::DealtCards {
            mine: player_card,
            theirs: opponent_card,
            stats_enabled: self.is_local_turn,
        });
        self.turn_indicator(fx);
    }

    fn turn_indicator(&self, fx: &mut Vec<Effect>) {
        fx.push(Effect::TurnIndicator { local_turn: self.is_local_turn });
        if self.phase == Phase::Playing {
            fx.push(info(if self.is_local_turn {
                "Your turn! Select a stat to compare."
            } else {
                "Opponent's turn. Waiting for them to select a stat..."
            }));
        }
    }

    fn set_scores(&mut self, player1: u32, player2: u32, fx: &mut Vec<Effect>) {
        let (mine, theirs) = self.role.mine_first(player1, player2);
        self.scores = Scores { mine, theirs };
        fx.push(Effect::Scores(self.scores));
    }

    fn local_won(&self, winner: RoundWinner) -> bool {
        match winner {
            RoundWinner::Player1 => self.role.is_primary(),
            RoundWinner::Player2 => !self.role.is_primary(),
            RoundWinner::Tie => false,
        }
    }
}

/// Pure form of [`SessionState::apply`].
pub fn transition(state: &SessionState, event: ServerEvent) -> (SessionState, Vec<Effect>) {
    let mut next = state.clone();
    let effects = next.apply(event);
    (next, effects)
}

/// Messages a list of effects would put on the wire, in order.
pub fn outbound(effects: &[Effect]) -> Vec<&ClientMessage> {
    effects
        .iter()
        .filter_map(|fx| match fx {
            Effect::Send(msg) => Some(msg),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconnect::ReconnectPolicy;

    fn session() -> SessionState {
        SessionState::new("alice", &ClientConfig::default())
    }

    fn event(json: &str) -> ServerEvent {
        ServerEvent::parse(json).unwrap()
    }

    fn logged(effects: &[Effect]) -> Vec<&str> {
        effects
            .iter()
            .filter_map(|fx| match fx {
                Effect::Log { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    fn playing(primary: bool) -> SessionState {
        let mut s = session();
        s.apply(event(&format!(
            r#"{{"event":"battle_state","is_player1":{},"status":"in_progress","current_turn":1}}"#,
            primary
        )));
        s
    }

    #[test]
    fn snapshot_selecting_then_confirm_sends_cards_then_ready() {
        let mut s = session();
        let fx = s.apply(event(
            r#"{"event":"battle_state","is_player1":true,"status":"selecting","opponent_name":"bob"}"#,
        ));
        assert_eq!(s.phase(), Phase::Selecting);
        assert!(fx.contains(&Effect::ShowSelection));
        assert!(!fx.contains(&Effect::ShowBattle));
        assert!(fx.iter().any(|f| matches!(f, Effect::LoadCardPool { .. })));

        for name in ["Oak", "Fern", "Moss"] {
            s.toggle_card(name).unwrap();
            assert!(!s.can_confirm());
        }
        assert_eq!(s.confirm_selection(), Err(ClientError::SelectionIncomplete(3)));
        s.toggle_card("Reed").unwrap();
        assert!(s.can_confirm());

        let fx = s.confirm_selection().unwrap();
        assert_eq!(
            outbound(&fx),
            vec![
                &ClientMessage::SelectCards {
                    card_ids: vec!["Oak".into(), "Fern".into(), "Moss".into(), "Reed".into()]
                },
                &ClientMessage::Ready,
            ]
        );
        assert!(fx.contains(&Effect::DisableConfirm));
        assert!(!s.can_confirm());
        assert!(s.confirm_selection().is_err());
        assert!(s.toggle_card("Ivy").is_err());
    }

    #[test]
    fn confirm_enabled_only_at_four() {
        let mut s = session();
        s.apply(event(r#"{"event":"battle_joined","is_player1":false,"opponent_name":"bob"}"#));
        let names = ["a", "b", "c", "d", "e", "b", "e"];
        for name in names {
            s.toggle_card(name).unwrap();
            assert_eq!(s.can_confirm(), s.selection().len() == 4);
        }
    }

    #[test]
    fn tie_round_result_for_primary() {
        let mut s = playing(true);
        let fx = s.apply(event(
            r#"{"event":"round_result","result":"tie","player1_score":3,"player2_score":3,
                "next_turn":2,"cards_remaining":2}"#,
        ));
        assert_eq!(s.scores(), Scores { mine: 3, theirs: 3 });
        assert!(fx.contains(&Effect::Scores(Scores { mine: 3, theirs: 3 })));
        assert!(logged(&fx).iter().any(|l| l.contains("tie")));
        assert!(fx.contains(&Effect::ScheduleNextCards(Duration::from_millis(3000))));
        assert!(outbound(&fx).is_empty());
        assert_eq!(s.round(), 2);
        assert!(!s.is_local_turn());

        let fx = s.on_next_cards_due();
        assert_eq!(outbound(&fx), vec![&ClientMessage::RequestCurrentCards]);
    }

    #[test]
    fn last_round_schedules_nothing() {
        let mut s = playing(false);
        let fx = s.apply(event(
            r#"{"event":"round_result","result":"player2","stat":"cost","player1_score":1,
                "player2_score":4,"next_turn":1,"cards_remaining":0}"#,
        ));
        assert!(!fx.iter().any(|f| matches!(f, Effect::ScheduleNextCards(_))));
        assert!(logged(&fx).contains(&"Round 1: You win! Your card has better Cost."));
        assert_eq!(s.scores(), Scores { mine: 4, theirs: 1 });
    }

    #[test]
    fn round_result_shows_cards_from_own_perspective() {
        let mut s = playing(false);
        let fx = s.apply(event(
            r#"{"event":"round_result","result":"player1","stat":"beauty","player1_score":1,
                "player2_score":0,"next_turn":2,"cards_remaining":3,
                "p1_card":{"name":"Oak","beauty":9},"p2_card":{"name":"Fern","beauty":2}}"#,
        ));
        match fx.first() {
            Some(Effect::RoundCards { mine, theirs, highlight }) => {
                assert_eq!(mine.as_ref().map(|c| c.name.as_str()), Some("Fern"));
                assert_eq!(theirs.as_ref().map(|c| c.name.as_str()), Some("Oak"));
                assert_eq!(*highlight, Some(Stat::Beauty));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(logged(&fx).contains(&"Round 1: Opponent wins! Their card has better Beauty."));
        assert!(s.is_local_turn());
    }

    #[test]
    fn turn_flag_follows_owner_and_role() {
        for primary in [true, false] {
            for owner in [1u8, 2] {
                let mut s = playing(primary);
                s.apply(event(&format!(
                    r#"{{"event":"current_cards","current_turn":{},"player_card":{{"name":"Oak"}},
                        "opponent_card":{{"name":"Fern"}}}}"#,
                    owner
                )));
                assert_eq!(s.is_local_turn(), (owner == 1) == primary);

                let mut s = playing(primary);
                s.apply(event(&format!(
                    r#"{{"event":"round_result","result":"tie","player1_score":0,"player2_score":0,
                        "next_turn":{},"cards_remaining":1}}"#,
                    owner
                )));
                assert_eq!(s.is_local_turn(), (owner == 1) == primary);
            }
        }
    }

    #[test]
    fn explicit_turn_flag_wins_over_owner() {
        let mut s = playing(true);
        s.apply(event(r#"{"event":"current_cards","current_turn":1,"is_my_turn":false}"#));
        assert!(!s.is_local_turn());
    }

    #[test]
    fn dealt_cards_gate_stat_buttons() {
        let mut s = playing(true);
        let fx = s.apply(event(
            r#"{"event":"current_cards","current_turn":1,"player1_score":2,"player2_score":1,
                "player_card":{"name":"Oak","beauty":3},"opponent_card":{"name":"Fern"}}"#,
        ));
        assert!(fx.iter().any(|f| matches!(f, Effect::DealtCards { stats_enabled: true, .. })));
        assert_eq!(s.scores(), Scores { mine: 2, theirs: 1 });

        let fx = s.select_stat(Stat::Beauty).unwrap();
        assert_eq!(outbound(&fx), vec![&ClientMessage::SelectStat { stat: Stat::Beauty }]);
        assert!(fx.contains(&Effect::LockStats));
        assert!(s.select_stat(Stat::Cost).is_err());
    }

    #[test]
    fn opponent_turn_refuses_stat() {
        let mut s = playing(false);
        s.apply(event(r#"{"event":"current_cards","current_turn":1}"#));
        assert!(!s.can_select_stat());
        assert!(matches!(s.select_stat(Stat::Cost), Err(ClientError::InvalidAction(_))));
    }

    #[test]
    fn completion_banner_comes_from_server_fields() {
        let mut s = playing(true);
        let fx = s.apply(event(
            r#"{"event":"battle_completed","is_tie":false,"winner":"alice","player1_name":"alice",
                "player2_name":"bob","player1_score":5,"player2_score":3}"#,
        ));
        assert_eq!(s.phase(), Phase::Completed);
        assert!(fx.contains(&Effect::ShowResult(Outcome::Victory)));

        let mut s = playing(false);
        s.apply(event(
            r#"{"event":"battle_completed","is_tie":false,"winner":"alice","player1_name":"alice",
                "player2_name":"bob"}"#,
        ));
        assert_eq!(s.outcome(), Some(Outcome::Defeat));

        let mut s = playing(false);
        s.apply(event(r#"{"event":"battle_completed","is_tie":true,"winner":null}"#));
        assert_eq!(s.outcome(), Some(Outcome::Tie));

        let mut s = playing(true);
        s.apply(event(r#"{"event":"battle_completed","is_tie":false}"#));
        assert_eq!(s.outcome(), Some(Outcome::Defeat));
    }

    #[test]
    fn timer_after_completion_is_a_no_op() {
        let mut s = playing(true);
        s.apply(event(
            r#"{"event":"round_result","result":"player1","player1_score":1,"player2_score":0,
                "next_turn":2,"cards_remaining":1}"#,
        ));
        s.apply(event(r#"{"event":"battle_completed","is_tie":false,"winner":"alice","player1_name":"alice"}"#));
        assert!(s.on_next_cards_due().is_empty());
    }

    #[test]
    fn both_ready_starts_the_battle() {
        let mut s = session();
        s.apply(event(r#"{"event":"battle_joined","is_player1":false,"opponent_name":"bob"}"#));
        let fx = s.apply(event(r#"{"event":"player_ready","username":"alice"}"#));
        assert_eq!(logged(&fx), vec!["You are ready!"]);
        assert_eq!(s.phase(), Phase::Selecting);

        let fx = s.apply(event(
            r#"{"event":"player_ready","username":"bob","both_ready":true,
                "battle_status":"in_progress","first_turn":2}"#,
        ));
        assert_eq!(s.phase(), Phase::Playing);
        assert!(s.is_local_turn());
        assert!(fx.contains(&Effect::ShowBattle));
        assert_eq!(outbound(&fx), vec![&ClientMessage::RequestCurrentCards]);
    }

    #[test]
    fn created_room_waits_or_selects() {
        let mut s = session();
        let fx = s.apply(event(r#"{"event":"battle_created"}"#));
        assert_eq!(s.phase(), Phase::Waiting);
        assert!(s.role().is_primary());
        assert!(fx.contains(&Effect::OpponentName(WAITING_FOR_OPPONENT.into())));
        assert!(!fx.iter().any(|f| matches!(f, Effect::LoadCardPool { .. })));

        let fx = s.apply(event(r#"{"event":"battle_created","status":"selecting"}"#));
        assert_eq!(s.phase(), Phase::Selecting);
        assert!(fx.iter().any(|f| matches!(f, Effect::LoadCardPool { .. })));
    }

    #[test]
    fn joined_names_the_other_player() {
        let mut s = session();
        let fx = s.apply(event(
            r#"{"event":"battle_joined","is_player1":true,"username":"bob","opponent_name":"alice"}"#,
        ));
        assert_eq!(s.opponent_name(), Some("bob"));
        assert!(fx.contains(&Effect::OpponentName("bob".into())));

        let mut s = session();
        s.apply(event(
            r#"{"event":"battle_joined","is_player1":false,"username":"alice","opponent_name":"carol"}"#,
        ));
        assert_eq!(s.opponent_name(), Some("carol"));
    }

    #[test]
    fn snapshot_with_dealt_cards_renders_them() {
        let mut s = session();
        let fx = s.apply(event(
            r#"{"event":"battle_state","is_player1":false,"status":"in_progress","current_turn":2,
                "player_card":{"name":"Oak"},"opponent_card":{"name":"Fern"},
                "player1_score":1,"player2_score":2}"#,
        ));
        assert_eq!(s.phase(), Phase::Playing);
        assert!(s.is_local_turn());
        assert_eq!(s.scores(), Scores { mine: 2, theirs: 1 });
        assert!(fx.contains(&Effect::ShowBattle));
        assert!(outbound(&fx).is_empty());
    }

    #[test]
    fn bad_frames_are_logged_and_dropped() {
        let mut s = playing(true);
        let before = (s.phase(), s.round(), s.scores());
        let fx = s.on_message("{\"event\":\"round_result\",\"result\":\"tie\"}");
        assert!(matches!(
            fx.as_slice(),
            [Effect::Log { level: LogLevel::Error, .. }]
        ));
        assert_eq!((s.phase(), s.round(), s.scores()), before);
        assert!(s.on_message("not json").len() == 1);
        assert!(s.on_message(r#"{"event":"user_connected","user":"bob"}"#).is_empty());
    }

    #[test]
    fn every_close_schedules_one_reconnect() {
        let config = ClientConfig {
            reconnect: ReconnectPolicy {
                base_delay: Duration::from_millis(100),
                max_delay: Duration::from_millis(300),
                max_attempts: 3,
            },
            ..ClientConfig::default()
        };
        let mut s = SessionState::new("alice", &config);
        let fx = s.on_open();
        assert_eq!(outbound(&fx), vec![&ClientMessage::RequestState]);

        let delays: Vec<Duration> = (0..3)
            .map(|_| {
                let fx = s.on_close();
                let scheduled: Vec<Duration> = fx
                    .iter()
                    .filter_map(|f| match f {
                        Effect::ScheduleReconnect(d) => Some(*d),
                        _ => None,
                    })
                    .collect();
                assert_eq!(scheduled.len(), 1);
                scheduled[0]
            })
            .collect();
        assert_eq!(
            delays,
            [100, 200, 300].map(Duration::from_millis).to_vec()
        );
        assert_eq!(s.connection(), Connection::Reconnecting { attempt: 3 });

        let fx = s.on_close();
        assert!(fx.contains(&Effect::Unreachable));
        assert_eq!(s.connection(), Connection::Unreachable);

        s.on_open();
        assert!(matches!(s.on_close().last(), Some(Effect::ScheduleReconnect(d)) if *d == Duration::from_millis(100)));
    }

    #[test]
    fn transition_leaves_input_untouched() {
        let s = session();
        let (next, fx) = transition(&s, event(r#"{"event":"battle_created","status":"selecting"}"#));
        assert_eq!(s.phase(), Phase::Waiting);
        assert_eq!(next.phase(), Phase::Selecting);
        assert!(!fx.is_empty());
    }

    /// Phase always matches the last event that carries one, whatever else
    /// arrives in between.
    #[test]
    fn phase_tracks_latest_state_bearing_event() {
        let state_bearing: [(&str, Phase); 8] = [
            (r#"{"event":"battle_created"}"#, Phase::Waiting),
            (r#"{"event":"battle_created","status":"selecting"}"#, Phase::Selecting),
            (r#"{"event":"battle_joined","is_player1":false,"opponent_name":"bob"}"#, Phase::Selecting),
            (r#"{"event":"battle_state","is_player1":true,"status":"waiting"}"#, Phase::Waiting),
            (r#"{"event":"battle_state","is_player1":false,"status":"ready"}"#, Phase::Selecting),
            (r#"{"event":"battle_state","is_player1":true,"status":"in_progress","current_turn":1}"#, Phase::Playing),
            (r#"{"event":"battle_state","is_player1":true,"status":"completed"}"#, Phase::Completed),
            (r#"{"event":"battle_completed","is_tie":true}"#, Phase::Completed),
        ];
        let noise = [
            r#"{"event":"cards_selected","username":"bob"}"#,
            r#"{"event":"player_ready","username":"bob"}"#,
            r#"{"event":"error","message":"slow down"}"#,
            r#"{"event":"user_connected","user":"bob"}"#,
            r#"{"event":"mystery"}"#,
        ];

        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        let mut next = move |n: usize| {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            (seed % n as u64) as usize
        };

        for _ in 0..200 {
            let mut s = session();
            let mut expected = s.phase();
            for _ in 0..12 {
                if next(3) == 0 {
                    s.apply(event(noise[next(noise.len())]));
                } else {
                    let (json, phase) = state_bearing[next(state_bearing.len())];
                    s.apply(event(json));
                    expected = phase;
                }
                assert_eq!(s.phase(), expected);
            }
        }
    }

    fn pool_request(fx: &[Effect]) -> u32 {
        fx.iter()
            .find_map(|f| match f {
                Effect::LoadCardPool { request } => Some(*request),
                _ => None,
            })
            .unwrap()
    }

    fn oak() -> Card {
        Card {
            name: "Oak".into(),
            image: None,
            environmental_friendliness: Some(3),
            beauty: Some(5),
            cost: Some(1),
        }
    }

    #[test]
    fn card_pool_fills_the_grid() {
        let mut s = session();
        let fx = s.apply(event(r#"{"event":"battle_joined","is_player1":false}"#));
        let fx = s.on_card_pool(pool_request(&fx), Ok(vec![oak()]));
        assert_eq!(logged(&fx), vec!["1 cards available for selection"]);
        assert!(fx.contains(&Effect::ShowCardPool(vec![oak()])));
    }

    #[test]
    fn empty_card_pool_clears_the_grid_and_says_so() {
        let mut s = session();
        let fx = s.apply(event(r#"{"event":"battle_joined","is_player1":false}"#));
        let fx = s.on_card_pool(pool_request(&fx), Ok(Vec::new()));
        assert_eq!(
            logged(&fx),
            vec!["No cards available for selection. Please collect some cards first!"]
        );
        assert!(fx.contains(&Effect::ShowCardPool(Vec::new())));
    }

    #[test]
    fn failed_card_pool_leaves_the_grid_alone() {
        let mut s = session();
        let fx = s.apply(event(r#"{"event":"battle_joined","is_player1":false}"#));
        let request = pool_request(&fx);

        let fx = s.on_card_pool(request, Err(ClientError::Request("HTTP error! Status: 500".into())));
        assert_eq!(logged(&fx), vec!["Error loading cards: Request failed: HTTP error! Status: 500"]);
        assert!(!fx.iter().any(|f| matches!(f, Effect::ShowCardPool(_))));

        let fx = s.on_card_pool(request, crate::protocol::CardPool::parse(r#"{"error":"not logged in"}"#));
        assert_eq!(logged(&fx), vec!["Error loading cards: not logged in"]);
        assert!(!fx.iter().any(|f| matches!(f, Effect::ShowCardPool(_))));
    }

    #[test]
    fn stale_card_pool_response_is_dropped() {
        let mut s = session();
        let first = pool_request(&s.apply(event(r#"{"event":"battle_joined","is_player1":false}"#)));
        let second = pool_request(&s.apply(event(
            r#"{"event":"battle_state","is_player1":false,"status":"selecting"}"#,
        )));
        assert_ne!(first, second);

        s.toggle_card("Oak").unwrap();
        assert!(s.on_card_pool(first, Ok(vec![oak()])).is_empty());
        assert!(s.selection().contains("Oak"));
        assert!(!s.on_card_pool(second, Ok(vec![oak()])).is_empty());
    }
}
