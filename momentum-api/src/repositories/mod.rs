mod activity_repo;
mod mock;
mod record_repo;
mod repo_error;
mod user_repo;

pub use activity_repo::*;
pub use mock::InMemoryStore;
pub use record_repo::*;
pub use repo_error::RepositoryError;
pub use user_repo::*;
