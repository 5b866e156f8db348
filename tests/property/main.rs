// tests/property/main.rs

mod registry;
