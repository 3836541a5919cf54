//! Test suite for the block tree and its serialization
//!
//! Unit tests live next to the code they cover; the scenarios here exercise
//! several modules together.

#[cfg(test)]
mod integration;
