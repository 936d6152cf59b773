//! # Darshan
//!
//! Backend core for a temple-services platform: darshan slot booking with an
//! admin verification workflow, Bhakthi loyalty points from verified temple
//! visits, promo-code pricing for the devotional storefront, user-contributed
//! temples, and a chant-practice session counter.
//!
//! Business rules live in [`aggregates`] as pure reducers; the HTTP surface
//! in [`api`] is a thin imperative shell that builds actions, dispatches them
//! through stores, and maps results to responses. External collaborators
//! (transactional mail, achievement history, invoice issuance, chant media
//! capabilities) are injected behind the traits in [`collaborators`].

pub mod aggregates;
pub mod api;
pub mod collaborators;
pub mod config;
pub mod server;
pub mod session;
pub mod types;
