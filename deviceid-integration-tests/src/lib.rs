//! Integration tests for `deviceid`
//!
//! This crate contains integration tests that run the resolver and accessor
//! against the in-memory SDK from `deviceid-memory`.

// This is a test-only crate
#![cfg(test)]
