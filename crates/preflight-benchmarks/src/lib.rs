//! Benchmark crate: NFR smoke checks for the deterministic pipeline live in
//! `tests/`.
