pub mod yaml;

pub use yaml::{load_path, parse_test_file, TestPlan};
