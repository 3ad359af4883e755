/// Number of cards each player brings into a battle.
pub const DECK_SIZE: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    Added,
    Removed,
    /// The selection already holds `DECK_SIZE` cards; nothing changed.
    Full,
}

/// Card names picked for the battle deck. Names are distinct and at most
/// `DECK_SIZE` are held.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CardSelection {
    names: Vec<String>,
}

impl CardSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn toggle(&mut self, name: &str) -> Toggle {
        if let Some(pos) = self.names.iter().position(|n| n == name) {
            self.names.remove(pos);
            Toggle::Removed
        } else if self.names.len() < DECK_SIZE {
            self.names.push(name.to_string());
            Toggle::Added
        } else {
            Toggle::Full
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.names.len() == DECK_SIZE
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn clear(&mut self) {
        self.names.clear();
    }
}
