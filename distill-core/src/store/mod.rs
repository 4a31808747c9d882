//! Durable store
//!
//! The store exclusively owns all on-disk state: journals, blog posts and
//! their per-platform renders, rolling memory, blog state, seeds, notes,
//! pending flags, and the intake archive. Parsers, the analyzer, and the
//! synthesizers are stateless; they receive inputs and return outputs, and
//! the orchestrator commits results through this type.
//!
//! ## Atomicity
//!
//! Every durable write goes through [`Store::atomic_write`]: the bytes land
//! in a temporary file in the same directory, are fsynced, and are then
//! renamed over the target. Readers observe either the old or the new
//! state, never a torn write, and cancellation cannot leave half-written
//! files behind.

pub mod frontmatter;
mod memory;
mod seeds;
mod state;

pub use memory::MemoryUpdate;
pub use state::{BlogMemory, BlogMemoryEntry, BlogState, BlogStateEntry, PendingFlags, PendingStage};

use crate::error::{Error, Result};
use crate::types::{iso_week_label, ContentItem, JournalEntry};
use chrono::NaiveDate;
use std::path::{Path, PathBuf};

/// File-backed store rooted at the configured output directory.
pub struct Store {
    root: PathBuf,
}

impl Store {
    /// Open (and lay out) a store at the given root.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(root.join("journal"))?;
        std::fs::create_dir_all(root.join("blog"))?;
        std::fs::create_dir_all(root.join("intake").join("archive"))?;
        std::fs::create_dir_all(root.join(SCRATCH_DIR))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // ============================================
    // Layout
    // ============================================

    pub fn journal_path(&self, date: NaiveDate, style: &str) -> PathBuf {
        self.root
            .join("journal")
            .join(format!("journal-{}-{}.md", date, style))
    }

    pub fn blog_platform_dir(&self, platform: &str) -> PathBuf {
        self.root.join("blog").join(platform)
    }

    pub fn blog_platform_path(&self, platform: &str, slug: &str) -> PathBuf {
        self.blog_platform_dir(platform).join(format!("{}.md", slug))
    }

    pub fn blog_state_path(&self) -> PathBuf {
        self.root.join("blog").join(".blog-state")
    }

    pub fn blog_memory_path(&self) -> PathBuf {
        self.root.join("blog").join(".blog-memory")
    }

    pub fn memory_path(&self) -> PathBuf {
        self.root.join(".distill-memory")
    }

    pub fn seeds_path(&self) -> PathBuf {
        self.root.join(".distill-seeds")
    }

    pub fn notes_path(&self) -> PathBuf {
        self.root.join(".distill-notes")
    }

    pub fn pending_path(&self) -> PathBuf {
        self.root.join(".distill-pending")
    }

    pub fn digest_path(&self, date: NaiveDate) -> PathBuf {
        self.root.join("intake").join(format!("digest-{}.md", date))
    }

    pub fn archive_path(&self, date: NaiveDate) -> PathBuf {
        self.root
            .join("intake")
            .join("archive")
            .join(format!("{}.json", date))
    }

    // ============================================
    // Atomic writes and scratch
    // ============================================

    /// Write bytes durably: temp file in the target directory, fsync, rename.
    pub fn atomic_write(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        use std::io::Write;

        let dir = path.parent().ok_or_else(|| Error::StateCorrupt {
            path: path.display().to_string(),
            message: "target has no parent directory".to_string(),
        })?;
        std::fs::create_dir_all(dir)?;

        let tmp = dir.join(format!(
            ".{}.tmp-{}",
            path.file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "write".to_string()),
            std::process::id()
        ));

        {
            let mut file = std::fs::File::create(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Stage a result under the scratch directory; committed stages move the
    /// file out, crashed stages leave an orphan for the next sweep.
    pub fn scratch_path(&self, name: &str) -> PathBuf {
        self.root.join(SCRATCH_DIR).join(name)
    }

    /// Remove orphaned scratch files from a crashed prior run.
    pub fn sweep_scratch(&self) -> Result<usize> {
        let dir = self.root.join(SCRATCH_DIR);
        let mut removed = 0;
        if dir.is_dir() {
            for entry in std::fs::read_dir(&dir)? {
                let entry = entry?;
                if entry.path().is_file() {
                    std::fs::remove_file(entry.path())?;
                    removed += 1;
                }
            }
        }
        if removed > 0 {
            tracing::info!(removed, "Swept orphaned scratch files");
        }
        Ok(removed)
    }

    // ============================================
    // Journals
    // ============================================

    /// Write a journal entry as a front-matter document.
    pub fn write_journal(&self, entry: &JournalEntry) -> Result<PathBuf> {
        let path = self.journal_path(entry.date, &entry.style);
        let doc = frontmatter::render(entry, &entry.body_markdown)?;
        self.atomic_write(&path, doc.as_bytes())?;
        tracing::info!(path = %path.display(), "Wrote journal entry");
        Ok(path)
    }

    /// Read one journal entry back, if it exists.
    pub fn read_journal(&self, date: NaiveDate, style: &str) -> Result<Option<JournalEntry>> {
        let path = self.journal_path(date, style);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        let (mut entry, body): (JournalEntry, String) =
            frontmatter::parse(&content).map_err(|e| Error::StateCorrupt {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        entry.body_markdown = body;
        Ok(Some(entry))
    }

    /// All journal entries on disk, ordered by date.
    pub fn list_journals(&self) -> Result<Vec<JournalEntry>> {
        let dir = self.root.join("journal");
        let mut entries = Vec::new();
        if !dir.is_dir() {
            return Ok(entries);
        }
        let mut paths: Vec<PathBuf> = std::fs::read_dir(&dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|e| e == "md"))
            .collect();
        paths.sort();

        for path in paths {
            let content = std::fs::read_to_string(&path)?;
            match frontmatter::parse::<JournalEntry>(&content) {
                Ok((mut entry, body)) => {
                    entry.body_markdown = body;
                    entries.push(entry);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable journal");
                }
            }
        }
        entries.sort_by_key(|e| e.date);
        Ok(entries)
    }

    /// Journal entries whose date falls in the given ISO week.
    pub fn journals_in_week(&self, week: &str) -> Result<Vec<JournalEntry>> {
        Ok(self
            .list_journals()?
            .into_iter()
            .filter(|e| iso_week_label(e.date) == week)
            .collect())
    }

    // ============================================
    // Intake archive and digest
    // ============================================

    /// Merge raw items into the day's archive, keyed by id. Re-running a day
    /// is a no-op for items already archived.
    pub fn append_archive(&self, date: NaiveDate, items: &[ContentItem]) -> Result<usize> {
        let path = self.archive_path(date);
        let mut existing: Vec<ContentItem> = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str(&content).map_err(|e| Error::StateCorrupt {
                path: path.display().to_string(),
                message: e.to_string(),
            })?
        } else {
            Vec::new()
        };

        let known: std::collections::BTreeSet<String> =
            existing.iter().map(|i| i.id.clone()).collect();
        let mut added = 0;
        for item in items {
            if !known.contains(&item.id) {
                existing.push(item.clone());
                added += 1;
            }
        }
        if added > 0 {
            existing.sort_by(|a, b| a.id.cmp(&b.id));
            let bytes = serde_json::to_vec_pretty(&existing)?;
            self.atomic_write(&path, &bytes)?;
        }
        Ok(added)
    }

    /// Write the day's external-content digest.
    pub fn write_digest(&self, date: NaiveDate, content: &str) -> Result<PathBuf> {
        let path = self.digest_path(date);
        self.atomic_write(&path, content.as_bytes())?;
        Ok(path)
    }
}

const SCRATCH_DIR: &str = ".scratch";
