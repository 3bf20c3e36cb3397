pub mod notes;
pub mod tasks;

pub use notes::NoteStore;
pub use tasks::TaskStore;
