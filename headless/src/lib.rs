//! Native battle client: plays one room over a real socket using the shared
//! session core. Used to smoke-test battle rooms without a browser.

pub mod strategy;

use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use anyhow::{bail, Result};
use cardgame_client::protocol::battle_socket_path;
use cardgame_client::session::{LogLevel, Outcome, Phase};
use cardgame_client::{ClientConfig, ClientError, Effect, SessionState};
use futures_util::{Sink, SinkExt, StreamExt};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tokio::time::{sleep, Sleep};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};

pub use strategy::Strategy;

/// Reconnect jitter adds at most `delay / JITTER_DIVISOR` (25%).
const JITTER_DIVISOR: u64 = 4;

#[derive(Debug, Clone)]
pub struct Options {
    /// Socket base, e.g. `ws://127.0.0.1:8000`.
    pub server: String,
    pub room: String,
    pub username: String,
    /// Names of the four cards to bring to the battle.
    pub cards: Vec<String>,
    pub strategy: Strategy,
    pub config: ClientConfig,
    /// Spread reconnects by up to a quarter of the backoff delay.
    pub jitter: bool,
}

impl Options {
    pub fn url(&self) -> String {
        format!("{}{}", self.server.trim_end_matches('/'), battle_socket_path(&self.room))
    }
}

/// How a finished battle went, from this player's side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub outcome: Option<String>,
    pub my_score: u32,
    pub their_score: u32,
    pub rounds: u32,
    pub reconnects: u32,
}

enum Closed {
    Retry(Duration),
    Unreachable,
}

struct Driver {
    session: SessionState,
    opts: Options,
    rng: StdRng,
    queue: VecDeque<Effect>,
    next_cards: Option<Pin<Box<Sleep>>>,
    reconnects: u32,
    /// Round results seen, across reconnects.
    rounds: u32,
}

impl Driver {
    fn new(opts: Options) -> Self {
        Driver {
            session: SessionState::new(opts.username.clone(), &opts.config),
            rng: StdRng::from_entropy(),
            opts,
            queue: VecDeque::new(),
            next_cards: None,
            reconnects: 0,
            rounds: 0,
        }
    }

    fn summary(&self) -> Summary {
        let scores = self.session.scores();
        Summary {
            outcome: self.session.outcome().map(|o: Outcome| o.title().to_string()),
            my_score: scores.mine,
            their_score: scores.theirs,
            rounds: self.rounds,
            reconnects: self.reconnects,
        }
    }

    fn pick_cards(&mut self) {
        for name in &self.opts.cards {
            if let Err(err) = self.session.toggle_card(name) {
                tracing::warn!("could not pick {}: {}", name, err);
            }
        }
        match self.session.confirm_selection() {
            Ok(effects) => self.queue.extend(effects),
            Err(err) => tracing::error!("cannot confirm deck: {}", err),
        }
    }

    /// Carry out one effect. `Err` means the socket is gone.
    async fn execute<S>(&mut self, effect: Effect, write: &mut S) -> Result<(), tungstenite::Error>
    where
        S: Sink<Message, Error = tungstenite::Error> + Unpin,
    {
        match effect {
            Effect::Log { level: LogLevel::Info, text } => tracing::info!(target: "battle", "{}", text),
            Effect::Log { level: LogLevel::Error, text } => tracing::error!(target: "battle", "{}", text),
            Effect::LoadCardPool { .. } => self.pick_cards(),
            Effect::DealtCards { mine, stats_enabled, .. } => {
                if stats_enabled && self.session.can_select_stat() {
                    if let Some(card) = mine {
                        let stat = self.opts.strategy.pick(&card, &mut self.rng);
                        tracing::debug!("{} picks {:?}", card.display_name(), stat);
                        match self.session.select_stat(stat) {
                            Ok(effects) => self.queue.extend(effects),
                            Err(err) => tracing::warn!("stat pick refused: {}", err),
                        }
                    }
                }
            }
            Effect::RoundCards { mine, theirs, highlight } => {
                self.rounds += 1;
                tracing::debug!(
                    "round {} cards: {:?} vs {:?} on {:?}",
                    self.rounds,
                    mine.map(|c| c.name),
                    theirs.map(|c| c.name),
                    highlight
                );
            }
            Effect::Send(msg) => {
                tracing::debug!("-> {:?}", msg);
                write.send(Message::Text(msg.to_json())).await?;
            }
            Effect::ScheduleNextCards(delay) => {
                self.next_cards = Some(Box::pin(sleep(delay)));
            }
            Effect::ShowResult(outcome) => tracing::info!("result: {}", outcome.title()),
            other => tracing::trace!("ui effect {:?}", other),
        }
        Ok(())
    }

    async fn drain<S>(&mut self, write: &mut S) -> Result<(), tungstenite::Error>
    where
        S: Sink<Message, Error = tungstenite::Error> + Unpin,
    {
        while let Some(effect) = self.queue.pop_front() {
            self.execute(effect, write).await?;
        }
        Ok(())
    }

    /// One socket lifetime. Returns once the battle is over or the socket closed.
    async fn play_connection(&mut self, url: &str) -> Result<(), tungstenite::Error> {
        let (ws, _) = connect_async(url).await?;
        let (mut write, mut read) = ws.split();
        self.next_cards = None;
        self.queue.extend(self.session.on_open());

        loop {
            self.drain(&mut write).await?;
            if self.session.phase() == Phase::Completed {
                let _ = write.send(Message::Close(None)).await;
                return Ok(());
            }

            tokio::select! {
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        let effects = self.session.on_message(&text);
                        self.queue.extend(effects);
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!("server closed the socket: {:?}", frame);
                        return Ok(());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => return Err(err),
                    None => return Ok(()),
                },
                _ = async {
                    if let Some(timer) = self.next_cards.as_mut() {
                        timer.await
                    }
                }, if self.next_cards.is_some() => {
                    self.next_cards = None;
                    let effects = self.session.on_next_cards_due();
                    self.queue.extend(effects);
                }
            }
        }
    }

    fn on_close(&mut self) -> Closed {
        let mut closed = Closed::Unreachable;
        for effect in self.session.on_close() {
            match effect {
                Effect::Log { text, .. } => tracing::warn!(target: "battle", "{}", text),
                Effect::ScheduleReconnect(delay) => closed = Closed::Retry(self.jittered(delay)),
                Effect::Unreachable => closed = Closed::Unreachable,
                _ => {}
            }
        }
        closed
    }

    fn jittered(&mut self, delay: Duration) -> Duration {
        let spread = delay.as_millis() as u64 / JITTER_DIVISOR;
        if !self.opts.jitter || spread == 0 {
            return delay;
        }
        delay + Duration::from_millis(self.rng.gen_range(0..=spread))
    }
}

/// Play the room until the battle completes or the server stays unreachable.
pub async fn run(opts: Options) -> Result<Summary> {
    let url = opts.url();
    let mut driver = Driver::new(opts);
    tracing::info!("joining {}", url);

    loop {
        if let Err(err) = driver.play_connection(&url).await {
            tracing::warn!("socket error: {}", err);
        }
        if driver.session.phase() == Phase::Completed {
            return Ok(driver.summary());
        }
        match driver.on_close() {
            Closed::Retry(delay) => {
                driver.reconnects += 1;
                sleep(delay).await;
            }
            Closed::Unreachable => {
                let attempts = driver.opts.config.reconnect.max_attempts;
                bail!(ClientError::Unreachable(attempts));
            }
        }
    }
}
