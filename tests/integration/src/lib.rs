//! Integration tests for turbod live under `tests/`.
