//! Core library for customs-grid
//!
//! This crate implements the **Functional Core** of the customs-grid
//! application, following the Functional Core - Imperative Shell
//! architectural pattern.
//!
//! # Architecture Overview
//!
//! customs-grid reads the line-item table of a customs declaration PDF cell
//! by cell.  Three sources disagree about that table: the ruling lines say
//! where the cells are, the native text layer says what most of them
//! contain (with a few glyphs mangled by broken fonts), and OCR of the
//! rendered page reads what is actually printed.  The work is split across
//! three crates:
//!
//! - **`pdf`**: Content-stream parsing, table geometry, native text blocks
//!   and page rendering
//! - **`customs_grid_core`** (this crate): Pure transformations with zero I/O
//! - **`customs-grid`**: OCR, the worker pool and orchestration (the
//!   Imperative Shell)
//!
//! ## Functional Core Principles
//!
//! All functions in this crate adhere to these principles:
//!
//! - **Pure functions**: Same input always produces the same output
//! - **No side effects**: No I/O, no logging, no global mutable state
//! - **Testable**: Fixture grids and synthetic images, no PDFs or OCR
//!   engines required
//!
//! # Module Organization
//!
//! - [`cell`]: The resolved cell grid and cell addressing
//! - [`merge`]: The ordered rule list that reconciles repeated writes
//! - [`assign`]: Brick replacement, routing native text blocks to cells
//! - [`group`]: Anchor detection and line-item partitioning
//! - [`luminance`]: Cell crops and near-white suppression
//! - [`progress`]: Percentages and page-order reconstruction
//! - [`template`]: Per-template grid parsers and their profiles
//! - [`warning`]: Page-level misses reported instead of failing
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use customs_grid_core::assign::correct_tables;
//! use customs_grid_core::group::{build_group_plans, GroupSettings};
//! use customs_grid_core::merge::MergePolicy;
//!
//! // Patch the as-extracted text with the native text blocks
//! let report = correct_tables(&tables, provisional, &blocks, &MergePolicy::default());
//!
//! // Cut the first table into 4-row line items
//! let plans = build_group_plans(&report.tables[0], &GroupSettings::default());
//! ```

pub mod assign;
pub mod cell;
pub mod error;
pub mod group;
pub mod luminance;
pub mod merge;
pub mod progress;
pub mod template;
pub mod warning;

pub use error::GridError;
