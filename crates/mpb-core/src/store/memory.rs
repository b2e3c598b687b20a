//! In-memory store for controller and enforcer tests.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use mpb_db::profile_repository::{new_profile_id, validate_profile_fields, Profile};
use mpb_db::slot_repository::{Slot, SlotEntry};
use mpb_db::DbError;

use super::{ProfileStore, SlotRegistry};

#[derive(Default)]
struct MemoryState {
    profiles: Vec<Profile>,
    next_position: i64,
    active: Option<String>,
    slots: HashMap<Slot, String>,
    cursor: Option<Slot>,
    unavailable: bool,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call fail until cleared.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state().unavailable = unavailable;
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn available(&self) -> Result<MutexGuard<'_, MemoryState>, DbError> {
        let state = self.state();
        if state.unavailable {
            return Err(DbError::Transaction("store unavailable".to_string()));
        }
        Ok(state)
    }
}

fn now() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

impl ProfileStore for MemoryStore {
    fn list(&self) -> Result<Vec<Profile>, DbError> {
        Ok(self.available()?.profiles.clone())
    }

    fn get(&self, id: &str) -> Result<Option<Profile>, DbError> {
        Ok(self
            .available()?
            .profiles
            .iter()
            .find(|p| p.id == id)
            .cloned())
    }

    fn create(&self, name: &str, url: &str) -> Result<Profile, DbError> {
        let (name, url) = validate_profile_fields(name, url)?;
        let mut state = self.available()?;
        state.next_position += 1;
        let stamp = now();
        let profile = Profile {
            id: new_profile_id(),
            name,
            url,
            position: state.next_position,
            created_at: stamp.clone(),
            updated_at: stamp,
        };
        state.profiles.push(profile.clone());
        Ok(profile)
    }

    fn update(&self, id: &str, name: &str, url: &str) -> Result<Profile, DbError> {
        let (name, url) = validate_profile_fields(name, url)?;
        let mut state = self.available()?;
        let profile = state
            .profiles
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(DbError::ProfileNotFound)?;
        profile.name = name;
        profile.url = url;
        profile.updated_at = now();
        Ok(profile.clone())
    }

    fn delete(&self, id: &str) -> Result<(), DbError> {
        let mut state = self.available()?;
        let before = state.profiles.len();
        state.profiles.retain(|p| p.id != id);
        if state.profiles.len() == before {
            return Err(DbError::ProfileNotFound);
        }
        if state.active.as_deref() == Some(id) {
            state.active = None;
        }
        Ok(())
    }

    fn set_active(&self, id: Option<&str>) -> Result<(), DbError> {
        self.available()?.active = id.map(str::to_string);
        Ok(())
    }

    fn get_active(&self) -> Result<Option<String>, DbError> {
        Ok(self.available()?.active.clone())
    }
}

impl SlotRegistry for MemoryStore {
    fn assign(&self, slot: Slot, profile_id: &str) -> Result<(), DbError> {
        self.available()?
            .slots
            .insert(slot, profile_id.to_string());
        Ok(())
    }

    fn profile_in(&self, slot: Slot) -> Result<Option<String>, DbError> {
        Ok(self.available()?.slots.get(&slot).cloned())
    }

    fn find_slot_for(&self, profile_id: &str) -> Result<Option<Slot>, DbError> {
        let state = self.available()?;
        Ok(Slot::ALL
            .into_iter()
            .find(|slot| state.slots.get(slot).map(String::as_str) == Some(profile_id)))
    }

    fn entries(&self) -> Result<Vec<SlotEntry>, DbError> {
        let state = self.available()?;
        Ok(Slot::ALL
            .into_iter()
            .map(|slot| SlotEntry {
                slot,
                profile_id: state.slots.get(&slot).cloned(),
            })
            .collect())
    }

    fn advance_rotation(&self, origin: Slot) -> Result<Slot, DbError> {
        let mut state = self.available()?;
        let next = state.cursor.unwrap_or(origin).next_in_rotation();
        state.cursor = Some(next);
        Ok(next)
    }
}
