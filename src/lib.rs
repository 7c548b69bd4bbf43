//! # Resource Search
//!
//! A search service for a catalog of educational resources. Postgres is the
//! source of truth; Meilisearch serves the queries; a reconciliation engine
//! keeps the two convergent.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐      ┌───────────────┐      ┌─────────────┐
//! │ Postgres  │─────▶│ Reconciliation │─────▶│ Meilisearch │
//! │ (source)  │ read │    Engine      │write │  (queries)  │
//! └───────────┘      └──────┬────────┘      └──────┬──────┘
//!                           ▲                      │
//!                  ┌────────┴───────┐              ▼
//!                  │   Scheduler    │        GET /search
//!                  │ 15m / 1h ticks │        GET /filters
//!                  └────────────────┘
//! ```
//!
//! The engine is the only component that mutates the index. Both sync
//! operations are idempotent and convergent: a pass that fails midway
//! leaves no damage the next successful pass cannot repair.
//!
//! ## Quick Start
//!
//! ```bash
//! ressearch init                  # create the resource table
//! ressearch import data.json     # bulk-load the catalog
//! ressearch sync                 # one full convergence pass
//! ressearch serve                # HTTP API + recurring syncs
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Resource, indexed document, tag projection |
//! | [`store`] | Relational store adapter (Postgres) |
//! | [`index`] | Search index adapter (Meilisearch) |
//! | [`sync`] | Reconciliation engine: FullSync, RatingsSync, reset |
//! | [`scheduler`] | Recurring timers driving the engine |
//! | [`server`] | HTTP surface |
//! | [`migrate`] | Relational schema bootstrap |
//! | [`import`] | Bulk sample-data import |

pub mod config;
pub mod db;
pub mod import;
pub mod index;
pub mod migrate;
pub mod models;
pub mod scheduler;
pub mod server;
pub mod store;
pub mod sync;
