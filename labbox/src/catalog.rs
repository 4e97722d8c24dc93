//! YAML catalog of users, images and challenges.
//!
//! Challenge administration lives outside this crate; the catalog is how a
//! deployment seeds the store it reads from.
//!
//! ```yaml
//! users:
//!   - { id: u1, name: alice }
//! images:
//!   - { id: web, name: web, registry: "nginx:alpine", cpu_limit: 0.5, memory_limit_mib: 128, exposed: "80" }
//! challenges:
//!   - { id: c1, name: Warmup, points: 100, dynamic_flag: true, image_id: web, duration_minutes: 30 }
//! ```

use std::collections::HashSet;
use std::path::Path;

use labbox_shared::errors::{LabboxError, LabboxResult};
use serde::{Deserialize, Serialize};

use crate::db::Database;
use crate::models::{Challenge, Image, User};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Catalog {
    pub users: Vec<User>,
    pub images: Vec<Image>,
    pub challenges: Vec<Challenge>,
}

/// What an import wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub users: usize,
    pub images: usize,
    pub challenges: usize,
}

impl Catalog {
    pub fn load(path: &Path) -> LabboxResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            LabboxError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> LabboxResult<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text).map_err(|e| LabboxError::Config(format!("catalog: {e}")))
    }

    /// Reject catalogs the instance manager could not use.
    ///
    /// Every challenge must reference an image defined here or already in
    /// `db`, and last at least one minute. A static-flag challenge needs a
    /// flag.
    pub fn validate(&self, db: &Database) -> LabboxResult<()> {
        let images: HashSet<&str> = self.images.iter().map(|i| i.id.as_str()).collect();

        for challenge in &self.challenges {
            if challenge.duration_minutes == 0 {
                return Err(LabboxError::InvalidArgument(format!(
                    "challenge {}: duration_minutes must be positive",
                    challenge.id
                )));
            }
            if !challenge.dynamic_flag && challenge.flag.is_empty() {
                return Err(LabboxError::InvalidArgument(format!(
                    "challenge {}: static flag is empty",
                    challenge.id
                )));
            }
            if !images.contains(challenge.image_id.as_str())
                && db.find_image(&challenge.image_id)?.is_none()
            {
                return Err(LabboxError::ImageNotFound(format!(
                    "{} (referenced by challenge {})",
                    challenge.image_id, challenge.id
                )));
            }
        }
        Ok(())
    }

    /// Validate, then upsert everything into `db`.
    pub fn apply(&self, db: &Database) -> LabboxResult<ImportSummary> {
        self.validate(db)?;

        for user in &self.users {
            db.upsert_user(user)?;
        }
        for image in &self.images {
            db.upsert_image(image)?;
        }
        for challenge in &self.challenges {
            db.upsert_challenge(challenge)?;
        }

        let summary = ImportSummary {
            users: self.users.len(),
            images: self.images.len(),
            challenges: self.challenges.len(),
        };
        tracing::info!(
            users = summary.users,
            images = summary.images,
            challenges = summary.challenges,
            "Catalog imported"
        );
        Ok(summary)
    }
}
