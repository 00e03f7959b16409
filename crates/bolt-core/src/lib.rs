use error::BoltError;

pub mod error;
pub mod repository;
pub mod source;
pub mod source_cache;
#[cfg(test)]
mod test_utils;

pub type BoltResult<T> = std::result::Result<T, BoltError>;
