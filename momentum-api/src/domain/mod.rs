pub mod clock;
pub mod error;
pub mod models;
pub mod period;
pub mod services;
pub mod user;

pub use clock::{Clock, SystemClock};
pub use error::DomainError;
pub use user::User;
