//! # TalentGate
//!
//! Role-gated question answering and resume search over recruitment data.
//!
//! TalentGate classifies incoming natural-language messages, translates
//! structured questions into read-only SQL against a platform-owned SQLite
//! store, and answers resume questions from a locally built semantic index.
//! Role membership arrives with each request and gates both paths; the
//! completion and embedding services degrade to explicit disabled states
//! rather than taking the engine down.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌───────────┐
//! │  Document   │──▶│   Ingestion  │──▶│  SQLite   │
//! │  FS/HTTP    │   │ Extract+Embed│   │   index   │
//! └─────────────┘   └──────────────┘   └─────┬─────┘
//!                                            │
//!                   ┌────────────┐     ┌─────┴─────┐
//!                   │  Business  │────▶│  Engine   │
//!                   │   store    │     │ (dispatch)│
//!                   └────────────┘     └─────┬─────┘
//!                                            │
//!                           ┌────────────────┤
//!                           ▼                ▼
//!                      ┌─────────┐      ┌─────────┐
//!                      │   CLI   │      │  HTTP   │
//!                      │  (tg)   │      │  (API)  │
//!                      └─────────┘      └─────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! tg init                        # write a starter config
//! tg ingest                      # index resumes from the configured source
//! tg ask "Who applied this week?" --role Recruiter
//! tg search "senior rust engineer" --role Recruiter
//! tg serve                       # start the HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`engine`] | Role-aware operation dispatch |
//! | [`classify`] | Intent classification |
//! | [`access`] | Role-to-object access resolution |
//! | [`catalog`] | Catalog listing and schema description |
//! | [`translate`] | Question-to-SQL translation and validation |
//! | [`execute`] | Read-only statement execution and row shaping |
//! | [`synthesize`] | Natural-language rendering of results |
//! | [`source`] | Document source abstraction (filesystem, HTTP drive) |
//! | [`ingest`] | Change-driven document ingestion |
//! | [`extract`] | PDF and DOCX text extraction |
//! | [`index`] | Embedding index over SQLite |
//! | [`completion`] | Completion service abstraction |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`server`] | JSON HTTP server |
//! | [`db`] | Database connections |

pub mod access;
pub mod catalog;
pub mod classify;
pub mod completion;
pub mod config;
pub mod db;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod execute;
pub mod extract;
pub mod index;
pub mod ingest;
pub mod metadata;
pub mod models;
pub mod retry;
pub mod server;
pub mod source;
pub mod synthesize;
pub mod translate;
