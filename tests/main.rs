/*!
 * Main test entry point for the cueforge test suite
 */

// Import common test utilities
pub mod common;

// Import unit tests
mod unit {
    // Codec, timecodes and encodings through the public API
    pub mod codec_tests;

    // Atomic writes and input discovery
    pub mod file_utils_tests;

    // Artifact cache keys and eviction
    pub mod cache_tests;

    // Configuration loading and validation
    pub mod app_config_tests;

    // Exit code mapping
    pub mod errors_tests;
}

// Import integration tests
mod integration {
    // The four reference scenarios and the pipeline properties
    pub mod pipeline_scenarios_tests;

    // LLM translator over a scripted chat provider
    pub mod translation_tests;

    // Per-file and batch runs with mock collaborators
    pub mod controller_tests;
}
