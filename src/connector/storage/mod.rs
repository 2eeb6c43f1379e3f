mod layout;
mod sqlite;

pub use layout::*;
pub use sqlite::*;
