// Integration tests for the sync engine
// Run against the in-process MemoryStore, wrapped for failure injection

mod common;
mod pull_tests;
