use cardgame_client::{Card, Stat};
use clap::ValueEnum;
use rand::seq::SliceRandom;
use rand::Rng;

/// How the headless player picks a stat on its turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Strategy {
    /// The card's largest known stat, first listed on ties.
    Highest,
    Random,
}

impl Strategy {
    pub fn pick<R: Rng + ?Sized>(self, card: &Card, rng: &mut R) -> Stat {
        match self {
            Strategy::Highest => {
                let mut best = Stat::ALL[0];
                let mut best_value = card.stat(best);
                for stat in Stat::ALL.into_iter().skip(1) {
                    let value = card.stat(stat);
                    if value > best_value {
                        best = stat;
                        best_value = value;
                    }
                }
                best
            }
            Strategy::Random => *Stat::ALL.choose(rng).unwrap_or(&Stat::ALL[0]),
        }
    }
}
