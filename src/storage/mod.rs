mod favorites;
mod preferences;
mod read_state;
mod response_cache;
mod schema;
mod types;

pub use favorites::FavoritesStore;
pub use read_state::{ReadStateStore, READ_STATE_KEY};
pub use response_cache::ResponseCache;
pub use schema::Database;
pub use types::{DatabaseError, PersistenceError};
