//! Cache tests
