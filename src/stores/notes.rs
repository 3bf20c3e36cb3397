use chrono::Utc;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::note::{title_or_untitled, Note};
use crate::storage::{LocalStore, NOTES_KEY};

/// Note collection. Newest first; every mutation persists the whole
/// collection before returning.
pub struct NoteStore {
    notes: Vec<Note>,
    store: LocalStore,
}

impl NoteStore {
    pub fn load(store: LocalStore) -> Self {
        let notes = store.load(NOTES_KEY).unwrap_or_default();
        Self { notes, store }
    }

    /// Adds a note. A note with neither title nor body is rejected; a
    /// missing title alone stores as "Untitled".
    pub fn add(&mut self, title: &str, body: &str) -> Result<Note> {
        if title.trim().is_empty() && body.trim().is_empty() {
            return Err(AppError::InvalidInput("note is empty".to_string()));
        }
        let note = Note::new(title, body);
        self.notes.insert(0, note.clone());
        self.persist()?;
        Ok(note)
    }

    /// Rewrites a note's title and body and refreshes its timestamp. The
    /// same emptiness rule as `add` applies; a rejected edit leaves the
    /// note untouched.
    pub fn edit(&mut self, id: Uuid, title: &str, body: &str) -> Result<Note> {
        if title.trim().is_empty() && body.trim().is_empty() {
            return Err(AppError::InvalidInput("note is empty".to_string()));
        }
        let note = self
            .notes
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| AppError::UnknownId(id.to_string()))?;
        note.title = title_or_untitled(title);
        note.body = body.trim().to_string();
        note.updated_at = Utc::now();
        let note = note.clone();
        self.persist()?;
        Ok(note)
    }

    pub fn delete(&mut self, id: Uuid) -> Result<()> {
        let before = self.notes.len();
        self.notes.retain(|n| n.id != id);
        if self.notes.len() == before {
            return Err(AppError::UnknownId(id.to_string()));
        }
        self.persist()
    }

    pub fn list(&self) -> &[Note] {
        &self.notes
    }

    fn persist(&self) -> Result<()> {
        self.store.save(NOTES_KEY, &self.notes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fresh_store(dir: &TempDir) -> NoteStore {
        NoteStore::load(LocalStore::new(dir.path()))
    }

    #[test]
    fn notes_without_title_store_as_untitled() {
        let dir = TempDir::new().unwrap();
        let mut notes = fresh_store(&dir);
        let note = notes.add("", "pick up the dry cleaning").unwrap();
        assert_eq!(note.title, "Untitled");
    }

    #[test]
    fn fully_empty_notes_are_rejected_without_persistence() {
        let dir = TempDir::new().unwrap();
        let mut notes = fresh_store(&dir);
        assert!(notes.add("  ", "").is_err());
        assert!(notes.list().is_empty());
        assert!(!dir.path().join("glassy_notes.json").exists());
    }

    #[test]
    fn newest_note_lists_first() {
        let dir = TempDir::new().unwrap();
        let mut notes = fresh_store(&dir);
        notes.add("older", "a").unwrap();
        notes.add("newer", "b").unwrap();
        assert_eq!(notes.list()[0].title, "newer");
    }

    #[test]
    fn edit_rewrites_and_refreshes_the_timestamp() {
        let dir = TempDir::new().unwrap();
        let mut notes = fresh_store(&dir);
        let note = notes.add("Groceries", "eggs").unwrap();

        let edited = notes.edit(note.id, "", "eggs and butter").unwrap();
        assert_eq!(edited.title, "Untitled");
        assert_eq!(edited.body, "eggs and butter");
        assert!(edited.updated_at >= note.updated_at);

        assert!(notes.edit(note.id, " ", " ").is_err());
        assert_eq!(notes.list()[0].body, "eggs and butter");
    }

    #[test]
    fn delete_and_reload_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut notes = fresh_store(&dir);
        let keep = notes.add("keep", "this stays").unwrap();
        let drop = notes.add("drop", "this goes").unwrap();
        notes.delete(drop.id).unwrap();

        let reloaded = fresh_store(&dir);
        assert_eq!(reloaded.list().len(), 1);
        assert_eq!(reloaded.list()[0].id, keep.id);
        assert!(matches!(
            fresh_store(&dir).delete(drop.id),
            Err(AppError::UnknownId(_))
        ));
    }
}
