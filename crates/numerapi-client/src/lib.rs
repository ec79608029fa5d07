#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]

mod client;
mod config;
mod credentials;
mod error;
mod graphql;
mod queries;
mod responses;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// ============================================================================
// Public API
// ============================================================================

// Client
pub use client::NumerApi;

// Configuration
pub use config::{COMPUTE_ID_VAR, ClientConfig, DEFAULT_API_URL, TRIGGER_ID_VAR, Tournament};
pub use credentials::{Credentials, PUBLIC_ID_VAR, SECRET_KEY_VAR};

// Queries
pub use graphql::{GraphqlRequest, HttpQueryBackend, QueryBackend};
pub use responses::{Account, CreatedSubmission, Model, Round, RoundWindow, UploadAuth};

// Errors
pub use error::{ApiError, ApiResult};

// Silence unused dev-dependency warnings
#[cfg(test)]
use httpmock as _;
