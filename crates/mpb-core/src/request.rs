//! Open-profile requests and decoding of external switch extras.

use mpb_db::slot_repository::Slot;

use crate::error::ControllerError;

/// Where an open request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestSource {
    /// A tap in the profile list or switcher.
    UserTap,
    /// An external switch request. Unknown profiles are dropped silently.
    ExternalDeepLink,
}

impl RequestSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UserTap => "user_tap",
            Self::ExternalDeepLink => "external_deep_link",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenRequest {
    pub profile_id: String,
    pub slot_hint: Option<Slot>,
    pub source: RequestSource,
}

impl OpenRequest {
    pub fn user_tap(profile_id: impl Into<String>) -> Self {
        Self {
            profile_id: profile_id.into(),
            slot_hint: None,
            source: RequestSource::UserTap,
        }
    }

    pub fn with_hint(mut self, slot: Slot) -> Self {
        self.slot_hint = Some(slot);
        self
    }

    /// Decodes a switch request: a profile id, a numeric target process type
    /// (0 Main, 1 Beta, 2 Gamma; absent means 0) and the legacy beta flag,
    /// which upgrades type 0 to Beta.
    pub fn from_switch_extras(
        profile_id: Option<&str>,
        process_type: Option<i32>,
        legacy_beta: bool,
    ) -> Result<Self, ControllerError> {
        let profile_id = profile_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ControllerError::InvalidRequest {
                message: "switch request carries no profile id".to_string(),
            })?;

        let mut process_type = process_type.unwrap_or(0);
        if legacy_beta && process_type == 0 {
            process_type = 1;
        }

        Ok(Self {
            profile_id: profile_id.to_string(),
            slot_hint: Some(Slot::from_process_type(process_type)),
            source: RequestSource::ExternalDeepLink,
        })
    }

    pub fn validate(&self) -> Result<(), ControllerError> {
        if self.profile_id.trim().is_empty() {
            return Err(ControllerError::InvalidRequest {
                message: "profile id is required".to_string(),
            });
        }
        Ok(())
    }
}
