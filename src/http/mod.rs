//! Outbound HTTP: sessions, the resilient client and the authenticated API layer.

pub mod auth;
pub mod client;
pub mod session;
pub mod token;
pub mod transport;

pub use auth::{ApiError, AuthenticatedApiClient};
pub use client::{HttpOutcome, RequestOptions, ResilientHttpClient, DEFAULT_SESSION};
pub use session::{Session, SessionConfig};
pub use token::{CachedTokenProvider, Token, TokenError, TokenProvider};
pub use transport::{
    HttpError, HttpRequest, HttpResponse, HttpTransport, RequestBody, ReqwestTransport,
    ReqwestTransportFactory, TransportFactory,
};

pub use reqwest::Method;
