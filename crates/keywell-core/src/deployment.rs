//! Deployment selection for the external services.
//!
//! The original SDK selected endpoints through process-wide setters mutated
//! before client construction. That hidden global is replaced here by a plain
//! value: pick a [`Deployment`], resolve it to [`ServiceEndpoints`], and hand
//! the result to the transport constructors. Nothing in this crate mutates it
//! afterwards.

use serde::{Deserialize, Serialize};

/// Cloud deployment the external services run in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Deployment {
    /// Production endpoints.
    #[default]
    Production,
    /// Staging endpoints.
    Staging,
    /// Development endpoints.
    Development,
}

/// Resolved service base URLs for one deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEndpoints {
    /// Base URL of the random-source service.
    pub random_source_url: String,
    /// Base URL of the distributed agreement service.
    pub agreement_url: String,
}

impl Deployment {
    /// Resolve this deployment to its service base URLs.
    pub fn endpoints(self) -> ServiceEndpoints {
        let suffix = match self {
            Self::Production => "",
            Self::Staging => "-staging",
            Self::Development => "-dev",
        };
        ServiceEndpoints {
            random_source_url: format!("https://rps{suffix}.keywell.io"),
            agreement_url: format!("https://agree{suffix}.keywell.io"),
        }
    }
}
