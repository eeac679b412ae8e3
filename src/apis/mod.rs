//! [`MatchApi`](crate::MatchApi) implementations behind feature gates.
//!
//! | Feature    | Backend          |
//! |------------|------------------|
//! | `http-api` | [`HttpMatchApi`] |

#[cfg(feature = "http-api")]
pub mod http;

#[cfg(feature = "http-api")]
pub use http::{HttpMatchApi, HttpMatchApiBuilder};
