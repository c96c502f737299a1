//! # specnova
//!
//! Versioned OpenAPI snapshots for SDK generation.
//!
//! specnova fetches an OpenAPI document from its origin (URL or local
//! file), stores it per version together with a copy whose operation ids
//! are normalized, records SHA-256 digests of both, and pins the snapshot in
//! use in `package.json` so SDK generation is reproducible.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────────┐
//! │ ConfigResolver│──▶│   Snapshot   │──▶│ .snapshots/<ver>/ │
//! │ file/hey-api │   │ load/prepare │   │ source  normalized│
//! └──────────────┘   └──────┬───────┘   │ meta.json         │
//!                           │           └──────────────────┘
//!                           ▼
//!                    ┌──────────────┐
//!                    │ package.json │
//!                    │  (pin)       │
//!                    └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! specnova lookup              # is the origin ahead of the pin?
//! specnova pull                # snapshot the origin and pin it
//! specnova verify              # check the pinned snapshot's digests
//! specnova list                # stored versions
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | Config types and config file parsing |
//! | [`merge`] | Deep merge of partial configs over defaults |
//! | [`env`] | Environment variables and `.env` files |
//! | [`resolver`] | Config adapter chain |
//! | [`normalize`] | Operation id normalization |
//! | [`document`] | Loading and serializing OpenAPI documents |
//! | [`digest`] | SHA-256 content digests |
//! | [`meta`] | Per-version snapshot record and atomic commit |
//! | [`package`] | The `specnova` block of `package.json` |
//! | [`snapshot`] | Snapshot orchestration |
//! | [`plugin`] | Registration entry for SDK generator hosts |
//! | [`commands`] | CLI command implementations |
//! | [`error`] | Error type |

pub mod commands;
pub mod config;
pub mod digest;
pub mod document;
pub mod env;
pub mod error;
pub mod merge;
pub mod meta;
pub mod normalize;
pub mod package;
pub mod plugin;
pub mod resolver;
pub mod snapshot;

pub use error::{Result, SpecnovaError};
