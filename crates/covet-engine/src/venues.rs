//! The static venue directory.
//!
//! Venue metadata lives in a JSON file next to the deployment; the service
//! only needs display names for listings and slugs for page scraping. A
//! missing or unreadable file degrades to an empty directory with a
//! warning, exactly like the rest of the ambient configuration.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// A configured venue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Venue {
    /// Upstream venue identifier.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// URL slug of the venue page, when known.
    #[serde(default)]
    pub slug: String,
}

impl Venue {
    /// Returns the slug when one is configured.
    #[must_use]
    pub fn slug_opt(&self) -> Option<&str> {
        (!self.slug.is_empty()).then_some(self.slug.as_str())
    }
}

#[derive(Deserialize)]
struct VenuesFile {
    #[serde(default)]
    venues: Vec<Venue>,
}

/// Lookup over the configured venues.
#[derive(Debug, Default)]
pub struct VenueDirectory {
    venues: Vec<Venue>,
    by_id: HashMap<i64, usize>,
}

impl VenueDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a directory from an explicit venue list.
    #[must_use]
    pub fn from_venues(venues: Vec<Venue>) -> Self {
        let by_id = venues
            .iter()
            .enumerate()
            .map(|(index, venue)| (venue.id, index))
            .collect();
        Self { venues, by_id }
    }

    /// Loads the directory from a venues file; a missing or malformed file
    /// yields an empty directory with a warning.
    #[must_use]
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(path = %path.display(), "could not read venues file: {e}");
                return Self::empty();
            }
        };
        match serde_json::from_str::<VenuesFile>(&raw) {
            Ok(file) => {
                tracing::info!(path = %path.display(), venues = file.venues.len(), "loaded venues");
                Self::from_venues(file.venues)
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), "could not parse venues file: {e}");
                Self::empty()
            }
        }
    }

    /// Returns every configured venue.
    #[must_use]
    pub fn all(&self) -> &[Venue] {
        &self.venues
    }

    /// Returns the configured venue ids.
    #[must_use]
    pub fn ids(&self) -> Vec<i64> {
        self.venues.iter().map(|venue| venue.id).collect()
    }

    /// Returns a venue's display name, with a generic fallback.
    #[must_use]
    pub fn name_of(&self, venue_id: i64) -> String {
        self.by_id
            .get(&venue_id)
            .map_or_else(|| format!("Venue {venue_id}"), |&index| {
                self.venues[index].name.clone()
            })
    }

    /// Returns a venue's page slug when configured.
    #[must_use]
    pub fn slug_of(&self, venue_id: i64) -> Option<&str> {
        self.by_id
            .get(&venue_id)
            .and_then(|&index| self.venues[index].slug_opt())
    }
}
