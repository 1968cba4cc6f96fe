//! Configuration, catalog loading, credentials, command-line parsing, and
//! logging.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Catalog of titles (the two platform JSON documents).
pub mod catalog;
/// Command-line interface parsing.
pub mod cli;
/// Runtime-only configuration (pool sizes, timeouts, batch sizes).
pub mod config;
/// Credential broker traits and environment-backed implementations.
pub mod credentials;
/// Logger initialization.
pub mod logger;
