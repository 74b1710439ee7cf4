pub mod debug;
pub mod engine;
pub mod parser;
pub mod report;
pub mod runner;
pub mod server;
pub mod utils;
pub mod vcs;
pub mod workflow;

// Re-export common items
pub use debug::Debugger;
pub use report::generate_report;
pub use runner::{run_tests, TestRunner};
pub use vcs::WorkflowRepository;
