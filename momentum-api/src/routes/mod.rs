pub(crate) mod activities;
pub(crate) mod error;
pub(crate) mod records;
pub(crate) mod statistics;

pub(crate) use error::ApiError;
