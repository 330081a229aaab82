//! Headless-browser automation for an Instagram-style profile.
//!
//! The crate drives a single Chromium page the way a human operator would:
//! authenticate, navigate, read rendered UI state, and interact (follow,
//! like, comment, message). Four infrastructure pieces carry the load:
//!
//! - [`queue::ActionQueue`] serializes every operation against the one
//!   shared session;
//! - [`loader`] harvests duplicate-free result sets from infinite-scroll
//!   lists of unknown length;
//! - [`navigator::Navigator`] resolves heterogeneous identifiers into
//!   validated on-screen destinations, cheapest strategy first;
//! - [`cache::ResultCache`] keeps already-fetched relationship lists for
//!   the session's lifetime.
//!
//! [`Bot`] wires them together over the session capability set in
//! [`session`].

pub mod bot;
pub mod cache;
pub mod config;
pub mod credentials;
pub mod error;
pub mod format;
pub mod loader;
pub mod navigator;
pub mod queue;
pub mod session;
pub mod types;

pub use bot::Bot;
pub use config::{BotConfig, load_config};
pub use credentials::{Credentials, load_credentials};
pub use error::{Error, LoginErrorKind, Result};
pub use types::{
    Comment, DirectMessage, Identifier, ListKind, Post, PostDetails, SearchHit, User, UserDetails,
};
