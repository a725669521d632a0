//! # Personality State Machine
//!
//! In-process mutable AI state: a vector of bounded trait scalars plus a
//! bounded change history. The decision opcode reads the trait vector to
//! weight branches; scripts mutate it through `personality { ... }` blocks
//! and `adapt(...)` feedback.
//!
//! ## Invariants
//! - Every trait value stays within [0.0, 1.0] under any update sequence
//! - All mutation goes through `update`, which also appends to the history
//! - The history is a bounded ring: old entries are dropped, memory never
//!   grows past `HISTORY_CAP` entries
//! - `adapt` is deterministic given the same feedback sequence

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::time::{SystemTime, UNIX_EPOCH};

/// The closed set of personality traits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trait {
    Curiosity,
    Analytical,
    Creative,
    Empathy,
    Humor,
    Patience,
    Confidence,
    Caution,
    Optimism,
    Focus,
    Spontaneity,
    Discipline,
}

/// Number of traits in the vector.
pub const TRAIT_COUNT: usize = 12;

/// Maximum retained history entries.
pub const HISTORY_CAP: usize = 256;

/// Per-unit feedback step used by `adapt`.
pub const ADAPT_STEP: f64 = 0.05;

/// Default value every trait starts at.
pub const DEFAULT_TRAIT_VALUE: f64 = 0.5;

impl Trait {
    /// Every trait, in vector order. Bytecode trait operands index into this.
    pub const ALL: [Trait; TRAIT_COUNT] = [
        Trait::Curiosity,
        Trait::Analytical,
        Trait::Creative,
        Trait::Empathy,
        Trait::Humor,
        Trait::Patience,
        Trait::Confidence,
        Trait::Caution,
        Trait::Optimism,
        Trait::Focus,
        Trait::Spontaneity,
        Trait::Discipline,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Trait::Curiosity => "curiosity",
            Trait::Analytical => "analytical",
            Trait::Creative => "creative",
            Trait::Empathy => "empathy",
            Trait::Humor => "humor",
            Trait::Patience => "patience",
            Trait::Confidence => "confidence",
            Trait::Caution => "caution",
            Trait::Optimism => "optimism",
            Trait::Focus => "focus",
            Trait::Spontaneity => "spontaneity",
            Trait::Discipline => "discipline",
        }
    }

    pub fn from_name(name: &str) -> Option<Trait> {
        Trait::ALL.iter().copied().find(|t| t.name() == name)
    }

    /// Position in the trait vector.
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Inverse of `index`.
    pub fn from_index(index: usize) -> Option<Trait> {
        Trait::ALL.get(index).copied()
    }
}

/// One history entry: a single clamped trait mutation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TraitChange {
    /// Milliseconds since the Unix epoch.
    pub at: u64,
    pub which: Trait,
    pub old: f64,
    pub new: f64,
}

/// The personality state machine. Owned exclusively by one VM instance;
/// cross-instance hand-off goes through `snapshot`/`from_snapshot`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Personality {
    values: [f64; TRAIT_COUNT],
    history: VecDeque<TraitChange>,
}

impl Default for Personality {
    fn default() -> Self {
        Self::new()
    }
}

impl Personality {
    /// Create a personality with every trait at the default value.
    pub fn new() -> Self {
        Self {
            values: [DEFAULT_TRAIT_VALUE; TRAIT_COUNT],
            history: VecDeque::with_capacity(HISTORY_CAP),
        }
    }

    /// Restore from a plain key-value snapshot. Unknown keys are ignored,
    /// values are clamped; missing traits keep the default.
    pub fn from_snapshot(snapshot: &BTreeMap<String, f64>) -> Self {
        let mut p = Self::new();
        for (name, value) in snapshot {
            if let Some(t) = Trait::from_name(name) {
                p.values[t.index()] = value.clamp(0.0, 1.0);
            }
        }
        p
    }

    /// Current value of one trait.
    pub fn get(&self, t: Trait) -> f64 {
        self.values[t.index()]
    }

    /// The full trait vector in `Trait::ALL` order (for decision scoring).
    pub fn vector(&self) -> [f64; TRAIT_COUNT] {
        self.values
    }

    /// Apply a delta to one trait, clamped to [0, 1]. Appends to the history
    /// and returns the new value. This is the only mutation path.
    pub fn update(&mut self, t: Trait, delta: f64) -> f64 {
        let old = self.values[t.index()];
        let new = (old + delta).clamp(0.0, 1.0);
        self.values[t.index()] = new;

        if self.history.len() == HISTORY_CAP {
            self.history.pop_front();
        }
        self.history.push_back(TraitChange {
            at: now_millis(),
            which: t,
            old,
            new,
        });
        new
    }

    /// Set a trait to an absolute value (routed through `update` so the
    /// change is clamped and recorded).
    pub fn set(&mut self, t: Trait, value: f64) -> f64 {
        let delta = value.clamp(0.0, 1.0) - self.get(t);
        self.update(t, delta)
    }

    /// Adaptive learning: nudge every trait by a bounded step proportional
    /// to the feedback signal (clamped to [-1, 1]), then re-clamp.
    pub fn adapt(&mut self, signal: f64) {
        let step = ADAPT_STEP * signal.clamp(-1.0, 1.0);
        for t in Trait::ALL {
            self.update(t, step);
        }
    }

    /// Immutable copy of the trait vector as a plain key-value structure,
    /// suitable for cross-run persistence.
    pub fn snapshot(&self) -> BTreeMap<String, f64> {
        Trait::ALL
            .iter()
            .map(|t| (t.name().to_string(), self.get(*t)))
            .collect()
    }

    /// Number of retained history entries.
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Drain the change history oldest-first. Consuming the iterator empties
    /// the in-memory log; it is not restartable.
    pub fn drain_history(&mut self) -> impl Iterator<Item = TraitChange> + '_ {
        self.history.drain(..)
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let p = Personality::new();
        for t in Trait::ALL {
            assert_eq!(p.get(t), DEFAULT_TRAIT_VALUE);
        }
    }

    #[test]
    fn test_update_clamps() {
        let mut p = Personality::new();
        assert_eq!(p.update(Trait::Curiosity, 10.0), 1.0);
        assert_eq!(p.update(Trait::Curiosity, -99.0), 0.0);
    }

    #[test]
    fn test_clamping_under_arbitrary_sequences() {
        let mut p = Personality::new();
        let deltas = [0.3, -0.9, 2.5, -0.1, 0.0, 7.0, -7.0, 0.61];
        for (i, delta) in deltas.iter().cycle().take(500).enumerate() {
            let t = Trait::from_index(i % TRAIT_COUNT).unwrap();
            let v = p.update(t, *delta);
            assert!((0.0..=1.0).contains(&v), "trait escaped bounds: {}", v);
        }
        for t in Trait::ALL {
            assert!((0.0..=1.0).contains(&p.get(t)));
        }
    }

    #[test]
    fn test_history_is_bounded() {
        let mut p = Personality::new();
        for _ in 0..(HISTORY_CAP * 2) {
            p.update(Trait::Humor, 0.001);
        }
        assert_eq!(p.history_len(), HISTORY_CAP);
    }

    #[test]
    fn test_drain_history_empties_log() {
        let mut p = Personality::new();
        p.update(Trait::Focus, 0.1);
        p.update(Trait::Focus, -0.1);

        let changes: Vec<_> = p.drain_history().collect();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].which, Trait::Focus);
        assert_eq!(p.history_len(), 0);
    }

    #[test]
    fn test_history_records_old_and_new() {
        let mut p = Personality::new();
        p.set(Trait::Caution, 0.9);
        let change = p.drain_history().next().unwrap();
        assert_eq!(change.old, DEFAULT_TRAIT_VALUE);
        assert!((change.new - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_adapt_is_deterministic() {
        let run = |signals: &[f64]| {
            let mut p = Personality::new();
            for s in signals {
                p.adapt(*s);
            }
            p.vector()
        };
        let signals = [1.0, -0.5, 0.25, 3.0, -9.0];
        assert_eq!(run(&signals), run(&signals));
    }

    #[test]
    fn test_adapt_signal_is_clamped() {
        let mut p = Personality::new();
        p.adapt(1000.0); // behaves like +1
        assert!((p.get(Trait::Curiosity) - (DEFAULT_TRAIT_VALUE + ADAPT_STEP)).abs() < 1e-9);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let mut p = Personality::new();
        p.set(Trait::Curiosity, 0.8);
        p.set(Trait::Discipline, 0.15);

        let restored = Personality::from_snapshot(&p.snapshot());
        assert_eq!(restored.vector(), p.vector());
        // history is not part of the snapshot
        assert_eq!(restored.history_len(), 0);
    }

    #[test]
    fn test_snapshot_ignores_unknown_keys_and_clamps() {
        let mut map = BTreeMap::new();
        map.insert("curiosity".to_string(), 3.0);
        map.insert("charisma".to_string(), 0.4); // not a Nyx trait

        let p = Personality::from_snapshot(&map);
        assert_eq!(p.get(Trait::Curiosity), 1.0);
    }

    #[test]
    fn test_trait_name_round_trip() {
        for t in Trait::ALL {
            assert_eq!(Trait::from_name(t.name()), Some(t));
        }
        assert_eq!(Trait::from_name("charisma"), None);
    }
}
