//! Cross-crate integration tests.

mod compression;
mod reliability;
mod scenarios;
