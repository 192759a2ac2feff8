//! CLI Exit Code Registry
//!
//! Single source of truth for `matchlens` exit codes. The interactive
//! session always ends with 0; everything else is a startup failure or a
//! failed one-shot command.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain           | Description                                  |
//! |---------|------------------|----------------------------------------------|
//! | 0       | Universal        | Success                                      |
//! | 1       | Universal        | General error (unspecified)                  |
//! | 2       | Universal        | CLI usage error (bad args, missing file)     |
//! | 3-9     | config           | Engine configuration could not be loaded     |
//! | 10-19   | engine           | Engine connection                            |
//! | 20-29   | command          | One-shot command failures                    |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant in the appropriate range
//! 2. Document what triggers it
//! 3. Update the table above

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - session ended normally or the one-shot command completed.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, unreadable input file.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Config (3-9)
// =============================================================================

/// Config file named by --config could not be read.
pub const EXIT_CONFIG_READ: u8 = 3;

/// Config document is not valid JSON or lacks the `G2_CONFIG` tables.
pub const EXIT_CONFIG_PARSE: u8 = 4;

/// Config parsed but references are broken (unknown feature type, ...).
pub const EXIT_CONFIG_INVALID: u8 = 5;

// =============================================================================
// Engine (10-19)
// =============================================================================

/// No engine URL from --engine-url, MATCHLENS_ENGINE_URL or settings.
pub const EXIT_ENGINE_UNSET: u8 = 10;

/// Engine client could not be built or the engine did not answer.
pub const EXIT_ENGINE_CONNECT: u8 = 11;

// =============================================================================
// Command (20-29)
// =============================================================================

/// One-shot command failed.
pub const EXIT_COMMAND_FAILED: u8 = 20;

/// One-shot command named an entity or record the engine does not have.
pub const EXIT_COMMAND_NOT_FOUND: u8 = 21;
