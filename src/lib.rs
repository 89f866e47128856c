//! Room and level allocation for leveled courses, and reconciliation of the
//! student movement it causes.
//!
//! The pipeline runs leaf first: a routing policy is turned into per-level demand
//! ([`demand`]), rooms are given a host level ([`hosts`]), students are placed
//! ([`placement`]), and the resulting weekly grid ([`campus`]) is checked cell by
//! cell ([`movement`]) before outstanding moves are listed ([`unresolved`]) and
//! filled in ([`resolver`]).

pub mod campus;
pub mod config;
pub mod data;
pub mod dataset;
pub mod demand;
pub mod error;
pub mod hosts;
pub mod movement;
pub mod placement;
pub mod resolver;
pub mod rules;
pub mod server;
pub mod unresolved;
