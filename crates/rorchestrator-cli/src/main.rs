// rorchestrator-cli/src/main.rs
// ============================================================================
// Module: RORchestrator CLI Entry Point
// Description: Binary wrapper over the CLI library with an empty bootstrap.
// Purpose: Serve the patch-only commands from the command line.
// Dependencies: rorchestrator-cli
// ============================================================================

//! ## Overview
//! The shipped binary hosts an empty bootstrap: `validate`, `explain-patch`,
//! and `diff-patch` work on patch files alone, while `explain-flow` and
//! `preview-matrix` report unknown flows until an embedder registers them.
//! Embedders build their own binary around [`rorchestrator_cli::run`] with a
//! populated host.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::process::ExitCode;

use rorchestrator_cli::CliHost;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// Runs the CLI with an empty host.
fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let host = CliHost::empty();
    let mut out = std::io::stdout().lock();
    let mut err = std::io::stderr().lock();
    ExitCode::from(rorchestrator_cli::run(&args, &host, &mut out, &mut err))
}
