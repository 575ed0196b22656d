//! Merge iterator tests
