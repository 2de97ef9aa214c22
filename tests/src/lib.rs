//! Whole-system integration tests for `tagfs-core`, exercising the
//! concrete scenarios against an in-memory block device end to end.
//!
//! This crate carries no code of its own; see `tests/scenarios.rs`.
