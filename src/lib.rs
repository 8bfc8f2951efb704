//! Armitage, an embedded fault classification and self-mitigation engine.
//!
//! Intercepts faults at three boundaries (panic hook, supervised tasks,
//! diagnostic log events), classifies them against an ordered signature
//! catalog, runs bounded recovery strategies, and derives a stability
//! level that gates risky features. Built for host processes that would
//! rather degrade a feature than crash.
//!
//! See `DESIGN.md` for full architecture documentation.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod fault;
pub mod logging;
pub mod signature;

pub mod gate;
pub mod ledger;
pub mod stability;

pub mod recovery;
pub mod report;

pub mod engine;
pub mod ingress;
