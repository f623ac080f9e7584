//! Tebex headless basket client.
//!
//! [`TebexHeadless`] wires the HTTP client to an optimistic basket engine
//! ([`BasketSync`]) and cached catalog queries ([`Catalog`]). The engine and
//! catalog take their collaborators as trait objects, so tests and embedders
//! can supply their own remote API, cache or storage.

pub mod api;
pub mod basket;
pub mod cache;
pub mod catalog;
pub mod checkout;
pub mod error;
pub mod headless;
pub mod http;
pub mod identity;
pub mod models;
pub mod retry;

pub use basket::{BasketOptions, BasketPhase, BasketSync};
pub use catalog::Catalog;
pub use error::{ErrorCode, TebexError};
pub use headless::{SdkConfig, TebexHeadless};
