//! SQLite-backed store shared by every slot through one database file.

use std::sync::{Mutex, MutexGuard};

use mpb_db::profile_repository::{Profile, ProfileRepository};
use mpb_db::slot_repository::{Slot, SlotEntry, SlotRepository};
use mpb_db::{Db, DbError};

use super::{ProfileStore, SlotRegistry};

pub struct SqliteStore {
    db: Mutex<Db>,
}

impl SqliteStore {
    /// Opens the database and applies pending migrations.
    pub fn open(cfg: mpb_db::Config) -> Result<Self, DbError> {
        Ok(Self::from_db(Db::open_migrated(cfg)?))
    }

    pub fn from_db(db: Db) -> Self {
        Self { db: Mutex::new(db) }
    }

    fn db(&self) -> MutexGuard<'_, Db> {
        match self.db.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl ProfileStore for SqliteStore {
    fn list(&self) -> Result<Vec<Profile>, DbError> {
        ProfileRepository::new(&self.db()).list()
    }

    fn get(&self, id: &str) -> Result<Option<Profile>, DbError> {
        ProfileRepository::new(&self.db()).find(id)
    }

    fn create(&self, name: &str, url: &str) -> Result<Profile, DbError> {
        ProfileRepository::new(&self.db()).create(name, url)
    }

    fn update(&self, id: &str, name: &str, url: &str) -> Result<Profile, DbError> {
        ProfileRepository::new(&self.db()).update(id, name, url)
    }

    fn delete(&self, id: &str) -> Result<(), DbError> {
        ProfileRepository::new(&self.db()).delete(id)
    }

    fn set_active(&self, id: Option<&str>) -> Result<(), DbError> {
        ProfileRepository::new(&self.db()).set_active(id)
    }

    fn get_active(&self) -> Result<Option<String>, DbError> {
        ProfileRepository::new(&self.db()).get_active()
    }
}

impl SlotRegistry for SqliteStore {
    fn assign(&self, slot: Slot, profile_id: &str) -> Result<(), DbError> {
        SlotRepository::new(&self.db()).assign(slot, profile_id)
    }

    fn profile_in(&self, slot: Slot) -> Result<Option<String>, DbError> {
        SlotRepository::new(&self.db()).profile_in(slot)
    }

    fn find_slot_for(&self, profile_id: &str) -> Result<Option<Slot>, DbError> {
        SlotRepository::new(&self.db()).find_slot_for(profile_id)
    }

    fn entries(&self) -> Result<Vec<SlotEntry>, DbError> {
        SlotRepository::new(&self.db()).entries()
    }

    fn advance_rotation(&self, origin: Slot) -> Result<Slot, DbError> {
        SlotRepository::new(&self.db()).advance_rotation(origin)
    }
}
