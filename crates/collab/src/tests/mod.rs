//! Crate-internal scenario tests

mod recommendation_test;
