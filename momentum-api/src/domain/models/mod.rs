mod activity;
mod ids;
mod record;

pub use activity::*;
pub use ids::*;
pub use record::*;
