//! Slot registry: which profile was last bound to which execution slot.
//!
//! Entries mean "last known resident", not "currently live": a slot that
//! terminates keeps its entry until the slot is reused for another profile.

use crate::kv_repository::KvRepository;
use crate::{Db, DbError};

/// kv key holding the last slot chosen by rotation.
pub const ROTATION_CURSOR_KEY: &str = "rotation_cursor";

const ROTATION_CAS_ATTEMPTS: usize = 8;

/// Fixed execution slot identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Slot {
    Main,
    Beta,
    Gamma,
    /// Reserved; never chosen by rotation.
    Delta,
}

impl Slot {
    /// Registry scan order.
    pub const ALL: [Slot; 4] = [Slot::Main, Slot::Beta, Slot::Gamma, Slot::Delta];

    /// Slots that take part in rotation, in cycle order.
    pub const ROTATION: [Slot; 3] = [Slot::Main, Slot::Beta, Slot::Gamma];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Beta => "beta",
            Self::Gamma => "gamma",
            Self::Delta => "delta",
        }
    }

    /// Persisted registry key for this slot.
    pub fn registry_key(self) -> &'static str {
        match self {
            Self::Main => "slot_main_profile",
            Self::Beta => "slot_beta_profile",
            Self::Gamma => "slot_gamma_profile",
            Self::Delta => "slot_delta_profile",
        }
    }

    pub fn parse(s: &str) -> Result<Self, DbError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "main" => Ok(Self::Main),
            "beta" => Ok(Self::Beta),
            "gamma" => Ok(Self::Gamma),
            "delta" => Ok(Self::Delta),
            other => Err(DbError::InvalidSlot(other.to_string())),
        }
    }

    /// Maps the numeric process type carried by switch requests (0/1/2).
    /// Anything else, Delta's 3 included, selects Main.
    pub fn from_process_type(value: i32) -> Self {
        match value {
            1 => Self::Beta,
            2 => Self::Gamma,
            _ => Self::Main,
        }
    }

    /// Legacy single-bit hint: false selects Main, true selects Beta.
    pub fn from_legacy_beta(beta: bool) -> Self {
        if beta {
            Self::Beta
        } else {
            Self::Main
        }
    }

    /// Next slot in the Main -> Beta -> Gamma -> Main cycle. Delta re-enters at Main.
    pub fn next_in_rotation(self) -> Self {
        match self {
            Self::Main => Self::Beta,
            Self::Beta => Self::Gamma,
            Self::Gamma | Self::Delta => Self::Main,
        }
    }
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One registry row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotEntry {
    pub slot: Slot,
    pub profile_id: Option<String>,
}

pub struct SlotRepository<'a> {
    db: &'a Db,
}

impl<'a> SlotRepository<'a> {
    pub fn new(db: &'a Db) -> Self {
        Self { db }
    }

    /// Unconditionally overwrites the entry for `slot`.
    pub fn assign(&self, slot: Slot, profile_id: &str) -> Result<(), DbError> {
        KvRepository::new(self.db).put(slot.registry_key(), Some(profile_id))
    }

    /// Empties the entry for `slot`.
    pub fn clear(&self, slot: Slot) -> Result<(), DbError> {
        KvRepository::new(self.db).put(slot.registry_key(), None)
    }

    pub fn profile_in(&self, slot: Slot) -> Result<Option<String>, DbError> {
        KvRepository::new(self.db).get(slot.registry_key())
    }

    /// First slot (Main, Beta, Gamma, Delta order) listing `profile_id`.
    pub fn find_slot_for(&self, profile_id: &str) -> Result<Option<Slot>, DbError> {
        for slot in Slot::ALL {
            if self.profile_in(slot)?.as_deref() == Some(profile_id) {
                return Ok(Some(slot));
            }
        }
        Ok(None)
    }

    pub fn entries(&self) -> Result<Vec<SlotEntry>, DbError> {
        let mut entries = Vec::with_capacity(Slot::ALL.len());
        for slot in Slot::ALL {
            entries.push(SlotEntry {
                slot,
                profile_id: self.profile_in(slot)?,
            });
        }
        Ok(entries)
    }

    pub fn rotation_cursor(&self) -> Result<Option<Slot>, DbError> {
        match KvRepository::new(self.db).get(ROTATION_CURSOR_KEY)? {
            Some(raw) => Ok(Some(Slot::parse(&raw)?)),
            None => Ok(None),
        }
    }

    /// Advances the shared rotation cursor and returns the slot it now names.
    ///
    /// When no cursor exists yet the first step is taken from `origin`. The
    /// write is a compare-and-swap so two slots rotating at once never both
    /// land on the same victim.
    pub fn advance_rotation(&self, origin: Slot) -> Result<Slot, DbError> {
        let kv = KvRepository::new(self.db);
        for _ in 0..ROTATION_CAS_ATTEMPTS {
            let current = kv.get(ROTATION_CURSOR_KEY)?;
            let from = match current.as_deref() {
                Some(raw) => Slot::parse(raw)?,
                None => origin,
            };
            let next = from.next_in_rotation();
            if kv.compare_and_swap(ROTATION_CURSOR_KEY, current.as_deref(), next.as_str())? {
                return Ok(next);
            }
        }
        Err(DbError::RotationContention {
            attempts: ROTATION_CAS_ATTEMPTS,
        })
    }
}
