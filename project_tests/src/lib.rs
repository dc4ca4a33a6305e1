//! Integration tests for the relay core live in ../tests.
