pub mod note;
pub mod task;
pub mod track;

pub use note::Note;
pub use task::{Priority, Task, TaskFilter};
pub use track::Track;
