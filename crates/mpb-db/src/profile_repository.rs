//! Profile repository: CRUD for the `profiles` table plus the active marker.

use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use crate::kv_repository::KvRepository;
use crate::{Db, DbError};

/// kv key holding the currently foregrounded profile id.
pub const ACTIVE_PROFILE_KEY: &str = "active_profile";

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

/// A named browsing identity. `id` never changes after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub id: String,
    pub name: String,
    pub url: String,
    pub position: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// Quick-fill template for common portals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfilePreset {
    pub key: &'static str,
    pub name: &'static str,
    pub url: &'static str,
}

pub const PRESETS: &[ProfilePreset] = &[
    ProfilePreset {
        key: "meesho",
        name: "Meesho Supplier",
        url: "https://supplier.meesho.com",
    },
    ProfilePreset {
        key: "flipkart",
        name: "Flipkart Seller",
        url: "https://seller.flipkart.com",
    },
    ProfilePreset {
        key: "amazon",
        name: "Amazon Seller",
        url: "https://seller.amazon.in",
    },
    ProfilePreset {
        key: "myntra",
        name: "Myntra Partner",
        url: "https://seller.myntra.com",
    },
    ProfilePreset {
        key: "whatsapp",
        name: "WhatsApp Business",
        url: "https://business.whatsapp.com",
    },
    ProfilePreset {
        key: "google",
        name: "Google",
        url: "https://google.com",
    },
];

pub fn find_preset(key: &str) -> Option<&'static ProfilePreset> {
    let key = key.trim();
    PRESETS.iter().find(|p| p.key.eq_ignore_ascii_case(key))
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Prefixes `https://` when the address carries no http(s) scheme.
pub fn normalize_url(raw: &str) -> String {
    let url = raw.trim();
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{url}")
    }
}

pub fn validate_profile_fields(name: &str, url: &str) -> Result<(String, String), DbError> {
    let name = name.trim();
    let url = url.trim();

    let mut errors: Vec<&str> = Vec::new();
    if name.is_empty() {
        errors.push("name: profile name is required");
    }
    if url.is_empty() {
        errors.push("url: website url is required");
    }
    if !errors.is_empty() {
        return Err(DbError::Validation(errors.join("; ")));
    }

    Ok((name.to_string(), normalize_url(url)))
}

pub fn new_profile_id() -> String {
    format!("profile_{}", Uuid::new_v4().simple())
}

fn is_unique_constraint_error(err: &rusqlite::Error) -> bool {
    err.to_string().contains("UNIQUE constraint failed")
}

// ---------------------------------------------------------------------------
// ProfileRepository
// ---------------------------------------------------------------------------

const SELECT_COLUMNS: &str = "id, name, url, position, created_at, updated_at";

pub struct ProfileRepository<'a> {
    db: &'a Db,
}

impl<'a> ProfileRepository<'a> {
    pub fn new(db: &'a Db) -> Self {
        Self { db }
    }

    /// Create appends a profile at the end of the list order.
    pub fn create(&self, name: &str, url: &str) -> Result<Profile, DbError> {
        let (name, url) = validate_profile_fields(name, url)?;
        let id = new_profile_id();

        let result = self.db.conn().execute(
            "INSERT INTO profiles (id, name, url, position)
             SELECT ?1, ?2, ?3, COALESCE(MAX(position), 0) + 1 FROM profiles",
            params![id, name, url],
        );

        match result {
            Ok(_) => self.get(&id),
            Err(err) if is_unique_constraint_error(&err) => Err(DbError::ProfileAlreadyExists),
            Err(err) => Err(DbError::Sqlite(err)),
        }
    }

    /// Find returns `None` when the id is unknown.
    pub fn find(&self, id: &str) -> Result<Option<Profile>, DbError> {
        let profile = self
            .db
            .conn()
            .query_row(
                &format!("SELECT {SELECT_COLUMNS} FROM profiles WHERE id = ?1"),
                params![id],
                scan_profile,
            )
            .optional()?;
        Ok(profile)
    }

    /// Get retrieves a profile by id or fails with `ProfileNotFound`.
    pub fn get(&self, id: &str) -> Result<Profile, DbError> {
        self.find(id)?.ok_or(DbError::ProfileNotFound)
    }

    /// List returns all profiles in list (insertion) order.
    pub fn list(&self) -> Result<Vec<Profile>, DbError> {
        let mut stmt = self.db.conn().prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM profiles ORDER BY position, id"
        ))?;
        let rows = stmt.query_map([], scan_profile)?;

        let mut profiles = Vec::new();
        for row in rows {
            profiles.push(row?);
        }
        Ok(profiles)
    }

    /// Update replaces name and url; id and list position are preserved.
    pub fn update(&self, id: &str, name: &str, url: &str) -> Result<Profile, DbError> {
        let (name, url) = validate_profile_fields(name, url)?;

        let rows_affected = self.db.conn().execute(
            "UPDATE profiles
             SET name = ?1, url = ?2, updated_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')
             WHERE id = ?3",
            params![name, url, id],
        )?;

        if rows_affected == 0 {
            return Err(DbError::ProfileNotFound);
        }
        self.get(id)
    }

    /// Delete removes a profile; the active marker is cleared when it pointed at it.
    pub fn delete(&self, id: &str) -> Result<(), DbError> {
        let rows_affected = self
            .db
            .conn()
            .execute("DELETE FROM profiles WHERE id = ?1", params![id])?;

        if rows_affected == 0 {
            return Err(DbError::ProfileNotFound);
        }

        if self.get_active()?.as_deref() == Some(id) {
            self.set_active(None)?;
        }
        Ok(())
    }

    pub fn set_active(&self, id: Option<&str>) -> Result<(), DbError> {
        KvRepository::new(self.db).put(ACTIVE_PROFILE_KEY, id)
    }

    pub fn get_active(&self) -> Result<Option<String>, DbError> {
        KvRepository::new(self.db).get(ACTIVE_PROFILE_KEY)
    }
}

fn scan_profile(row: &rusqlite::Row) -> rusqlite::Result<Profile> {
    Ok(Profile {
        id: row.get(0)?,
        name: row.get(1)?,
        url: row.get(2)?,
        position: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}
