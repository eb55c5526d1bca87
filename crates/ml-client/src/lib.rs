//! ML scoring client for remote model services.
//!
//! Experiments with a `rank` stage send feature rows to a model server
//! over gRPC and get one score per row back. This crate handles:
//! - Connection management (lazy channels, per-call timeout)
//! - The request/response messages of `proto/scoring.proto`
//! - Validating the response against the request

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use thiserror::Error;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Channel, Endpoint};
use tracing::{debug, error, info};

/// Messages of the `recflow.scoring` protobuf package.
pub mod scoring {
    use std::collections::HashMap;

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct FeatureRow {
        #[prost(map = "string, double", tag = "1")]
        pub features: HashMap<String, f64>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ScoreRequest {
        #[prost(string, tag = "1")]
        pub model: String,
        #[prost(string, tag = "2")]
        pub subject_id: String,
        #[prost(message, repeated, tag = "3")]
        pub rows: Vec<FeatureRow>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ScoreResponse {
        #[prost(float, repeated, tag = "1")]
        pub scores: Vec<f32>,
    }

    /// gRPC method path of `ModelScorer.Score`
    pub const SCORE_PATH: &str = "/recflow.scoring.ModelScorer/Score";
}

pub use scoring::{FeatureRow, ScoreRequest, ScoreResponse};

/// Errors that can occur when interacting with the ML service
#[derive(Error, Debug)]
pub enum MLClientError {
    #[error("Failed to connect to ML service: {0}")]
    ConnectionError(String),

    #[error("Failed to score candidates: {0}")]
    ScoringError(String),

    #[error("Invalid response from ML service: {0}")]
    InvalidResponse(String),
}

/// Client for a remote model scoring service.
///
/// Cloning is cheap: clones share the underlying channel.
#[derive(Clone)]
pub struct MLScorerClient {
    grpc: tonic::client::Grpc<Channel>,
    service_addr: String,
}

impl MLScorerClient {
    /// Connect eagerly, failing if the service is unreachable.
    pub async fn connect(addr: impl Into<String>) -> Result<Self> {
        let addr = addr.into();
        info!("Connecting to ML service at {}", addr);

        let channel = Channel::from_shared(addr.clone())
            .context("Creating channel from address")?
            .connect()
            .await
            .context("Connecting to ML service")?;

        Ok(Self::from_channel(channel, addr))
    }

    /// Create a client whose connection is established on first use.
    ///
    /// Used at startup so a model server that is still booting does not
    /// keep the recommendation service from coming up.
    pub fn connect_lazy(
        addr: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, MLClientError> {
        let addr = addr.into();
        let mut endpoint: Endpoint = Channel::from_shared(addr.clone())
            .map_err(|e| MLClientError::ConnectionError(format!("{}: {}", addr, e)))?;
        if let Some(timeout) = timeout {
            endpoint = endpoint.timeout(timeout);
        }
        debug!("Lazy channel to ML service at {}", addr);
        Ok(Self::from_channel(endpoint.connect_lazy(), addr))
    }

    fn from_channel(channel: Channel, service_addr: String) -> Self {
        Self {
            grpc: tonic::client::Grpc::new(channel),
            service_addr,
        }
    }

    /// Score a batch of feature rows.
    ///
    /// Returns one score per row, in request order.
    pub async fn score(&self, request: ScoreRequest) -> Result<Vec<f32>, MLClientError> {
        let expected_len = request.rows.len();
        debug!(
            "Scoring {} rows with model {} for subject {:?}",
            expected_len, request.model, request.subject_id
        );

        let mut grpc = self.grpc.clone();
        grpc.ready().await.map_err(|e| {
            error!("ML service at {} not ready: {}", self.service_addr, e);
            MLClientError::ConnectionError(e.to_string())
        })?;

        let codec: ProstCodec<ScoreRequest, ScoreResponse> = ProstCodec::default();
        let path = PathAndQuery::from_static(scoring::SCORE_PATH);
        let response = grpc
            .unary(tonic::Request::new(request), path, codec)
            .await
            .map_err(|status| {
                error!("gRPC error while scoring: {}", status);
                MLClientError::ScoringError(status.to_string())
            })?;

        let scores = response.into_inner().scores;
        if scores.len() != expected_len {
            error!(
                "Mismatch in number of scores returned: expected {}, got {}",
                expected_len,
                scores.len()
            );
            return Err(MLClientError::InvalidResponse(
                "Number of scores does not match number of rows".into(),
            ));
        }
        Ok(scores)
    }

    /// Get the address of the ML service this client talks to.
    pub fn service_address(&self) -> &str {
        &self.service_addr
    }
}

/// Helper to build a feature row from name/value pairs.
pub fn feature_row<I, K>(pairs: I) -> FeatureRow
where
    I: IntoIterator<Item = (K, f64)>,
    K: Into<String>,
{
    FeatureRow {
        features: pairs
            .into_iter()
            .map(|(name, value)| (name.into(), value))
            .collect::<HashMap<_, _>>(),
    }
}
