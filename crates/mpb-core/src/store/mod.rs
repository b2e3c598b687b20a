//! Repository traits the slot manager consults for every decision.
//!
//! Callers never cache: every residency or ordering decision re-reads the
//! store, since other slots write to it concurrently.

pub mod memory;
pub mod sqlite;

use mpb_db::profile_repository::Profile;
use mpb_db::slot_repository::{Slot, SlotEntry};
use mpb_db::DbError;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Profile records plus the active marker.
pub trait ProfileStore: Send + Sync {
    /// All profiles in list (insertion) order.
    fn list(&self) -> Result<Vec<Profile>, DbError>;
    fn get(&self, id: &str) -> Result<Option<Profile>, DbError>;
    fn create(&self, name: &str, url: &str) -> Result<Profile, DbError>;
    fn update(&self, id: &str, name: &str, url: &str) -> Result<Profile, DbError>;
    fn delete(&self, id: &str) -> Result<(), DbError>;
    fn set_active(&self, id: Option<&str>) -> Result<(), DbError>;
    fn get_active(&self) -> Result<Option<String>, DbError>;
}

/// Last known resident of each slot plus the rotation cursor.
pub trait SlotRegistry: Send + Sync {
    fn assign(&self, slot: Slot, profile_id: &str) -> Result<(), DbError>;
    fn profile_in(&self, slot: Slot) -> Result<Option<String>, DbError>;
    /// First slot in Main, Beta, Gamma, Delta order listing `profile_id`.
    fn find_slot_for(&self, profile_id: &str) -> Result<Option<Slot>, DbError>;
    fn entries(&self) -> Result<Vec<SlotEntry>, DbError>;
    /// Atomically steps the shared rotation cursor; the first step starts at `origin`.
    fn advance_rotation(&self, origin: Slot) -> Result<Slot, DbError>;
}
