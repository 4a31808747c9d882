//! Seed and editorial-note stores
//!
//! Both are small JSON lists behind the store's atomic write. `mark_used`
//! is a compare-and-set on the `used` flag: marking an already-used record
//! fails so two concurrent synthesizers cannot both claim the same seed.

use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::{EditorialNote, NoteTarget, Seed};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

impl Store {
    // ============================================
    // Seeds
    // ============================================

    pub fn load_seeds(&self) -> Result<Vec<Seed>> {
        load_list(&self.seeds_path())
    }

    pub fn save_seeds(&self, seeds: &[Seed]) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(seeds)?;
        self.atomic_write(&self.seeds_path(), &bytes)
    }

    /// Append a new seed and return it.
    pub fn add_seed(&self, text: &str, tags: Vec<String>) -> Result<Seed> {
        let seed = Seed {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.to_string(),
            tags,
            created_at: Utc::now(),
            used: false,
            used_in: None,
        };
        let mut seeds = self.load_seeds()?;
        seeds.push(seed.clone());
        self.save_seeds(&seeds)?;
        Ok(seed)
    }

    /// Seeds not yet consumed by any synthesis.
    pub fn unused_seeds(&self) -> Result<Vec<Seed>> {
        Ok(self.load_seeds()?.into_iter().filter(|s| !s.used).collect())
    }

    /// Compare-and-set the used flag on one seed. Fails if the seed is
    /// unknown or was already claimed.
    pub fn mark_seed_used(&self, id: &str, used_in: &str) -> Result<()> {
        let mut seeds = self.load_seeds()?;
        let seed = seeds
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| Error::Config(format!("unknown seed id: {}", id)))?;
        if seed.used {
            return Err(Error::Config(format!("seed already used: {}", id)));
        }
        seed.used = true;
        seed.used_in = Some(used_in.to_string());
        self.save_seeds(&seeds)
    }

    // ============================================
    // Editorial notes
    // ============================================

    pub fn load_notes(&self) -> Result<Vec<EditorialNote>> {
        load_list(&self.notes_path())
    }

    pub fn save_notes(&self, notes: &[EditorialNote]) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(notes)?;
        self.atomic_write(&self.notes_path(), &bytes)
    }

    /// Append a new editorial note and return it.
    pub fn add_note(&self, text: &str, target: NoteTarget) -> Result<EditorialNote> {
        let note = EditorialNote {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.to_string(),
            target,
            created_at: Utc::now(),
            used: false,
        };
        let mut notes = self.load_notes()?;
        notes.push(note.clone());
        self.save_notes(&notes)?;
        Ok(note)
    }

    /// Unused notes whose target matches the predicate. A note with an
    /// unmatched target is simply not returned; its `used` flag is never
    /// touched.
    pub fn notes_matching<F>(&self, matches: F) -> Result<Vec<EditorialNote>>
    where
        F: Fn(&NoteTarget) -> bool,
    {
        Ok(self
            .load_notes()?
            .into_iter()
            .filter(|n| !n.used && matches(&n.target))
            .collect())
    }

    /// Compare-and-set the used flag on one note.
    pub fn mark_note_used(&self, id: &str) -> Result<()> {
        let mut notes = self.load_notes()?;
        let note = notes
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| Error::Config(format!("unknown note id: {}", id)))?;
        if note.used {
            return Err(Error::Config(format!("note already used: {}", id)));
        }
        note.used = true;
        self.save_notes(&notes)
    }
}

fn load_list<T: DeserializeOwned + Serialize>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| Error::StateCorrupt {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}
