//! Contract-test crate: frozen response schemas validated in `tests/`.
