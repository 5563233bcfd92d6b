//! # Bracket Engine
//!
//! Single-elimination tournament brackets: qualifier selection, seeded fold
//! pairing, battle lifecycle and automatic round advancement.
//!
//! ## Architecture
//!
//! The engine is a set of stateless services over a storage port:
//!
//! - **QualifierSelector**: ranks entrants by their best qualification attempt
//! - **BracketPairer**: pairs a round idempotently and records byes
//! - **QuestionAttacher**: fills new battles from the tournament's question pool
//! - **BracketEngine**: generates matches, closes rounds and drives battles
//!
//! Persistence goes through [`store::BracketStore`], backed by PostgreSQL in
//! production and by [`store::InMemoryStore`] in tests. Events are buffered
//! per transaction and dispatched after commit by [`events::EventNotifier`].
//!
//! ## Core Modules
//!
//! - [`bracket`]: Bracket models, services and the engine
//! - [`events`]: Domain events, sinks and achievement notification
//! - [`store`]: Storage port with PostgreSQL and in-memory adapters
//! - [`db`]: Connection pool, configuration and query timeouts
//!
//! ## Example
//!
//! ```
//! use bracket_engine::bracket::fold_pairs;
//!
//! let pairing = fold_pairs(&[1, 2, 3, 4, 5]);
//! assert_eq!(pairing.pairs, vec![(1, 5), (2, 4)]);
//! assert_eq!(pairing.bye, Some(3));
//! ```

/// Bracket models, pairing, resolution and the engine.
pub mod bracket;
pub use bracket::{BracketEngine, BracketError, BracketResult, RoundOutcome};

/// Engine configuration.
pub mod config;
pub use config::{ConfigError, EngineConfig};

/// Database pool and configuration.
pub mod db;
pub use db::{Database, DatabaseConfig};

/// Domain events and notifiers.
pub mod events;
pub use events::{DomainEvent, EventNotifier, EventSink};

/// Storage port and adapters.
pub mod store;
pub use store::{BracketStore, InMemoryStore, PgBracketStore, StoreError};
