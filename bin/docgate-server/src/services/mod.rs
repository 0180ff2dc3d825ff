//! Conversion pipeline building blocks: upload intake, scratch storage,
//! converter invocation and output resolution.

pub mod converter;
pub mod format;
pub mod job;
pub mod resolver;
pub mod scratch;
pub mod upload;
