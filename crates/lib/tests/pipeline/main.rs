mod common;

mod capsule_tests;
mod ordering_tests;
mod run_tests;
