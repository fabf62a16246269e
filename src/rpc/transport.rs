//! Shared gRPC channel and the client facade
//!
//! One [`UbtClient`] owns one channel. Capability handles borrow it weakly,
//! so after [`UbtClient::close`] every outstanding handle fails with
//! `UNAVAILABLE` instead of keeping the connection alive.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tonic::client::Grpc;
use tonic::codec::{ProstCodec, Streaming};
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};
use tonic::Status;

use crate::common::config::{EndpointConfig, TransportSecurity};
use crate::common::{Error, Result};

use super::account::AccountManager;
use super::block::BlockService;
use super::chain::ChainService;
use super::construct::ConstructService;
use super::currency::CurrencyService;

/// The channel every capability issues calls over
#[derive(Debug)]
pub struct Transport {
    channel: Channel,
    uri: String,
}

impl Transport {
    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub(crate) async fn unary<Req, Resp>(&self, path: &'static str, request: Req) -> std::result::Result<Resp, Status>
    where
        Req: prost::Message + Send + Sync + 'static,
        Resp: prost::Message + Default + Send + Sync + 'static,
    {
        let mut grpc = self.ready().await?;
        let codec: ProstCodec<Req, Resp> = ProstCodec::default();
        tracing::trace!(path, "Unary call");
        let response = grpc
            .unary(tonic::Request::new(request), PathAndQuery::from_static(path), codec)
            .await?;
        Ok(response.into_inner())
    }

    pub(crate) async fn server_streaming<Req, Resp>(
        &self,
        path: &'static str,
        request: Req,
    ) -> std::result::Result<Streaming<Resp>, Status>
    where
        Req: prost::Message + Send + Sync + 'static,
        Resp: prost::Message + Default + Send + Sync + 'static,
    {
        let mut grpc = self.ready().await?;
        let codec: ProstCodec<Req, Resp> = ProstCodec::default();
        tracing::trace!(path, "Streaming call");
        let response = grpc
            .server_streaming(tonic::Request::new(request), PathAndQuery::from_static(path), codec)
            .await?;
        Ok(response.into_inner())
    }

    async fn ready(&self) -> std::result::Result<Grpc<Channel>, Status> {
        let mut grpc = Grpc::new(self.channel.clone());
        grpc.ready()
            .await
            .map_err(|e| Status::unavailable(format!("Service was not ready: {}", e)))?;
        Ok(grpc)
    }
}

/// Weak reference held by capability handles
#[derive(Debug, Clone)]
pub(crate) struct TransportRef(Weak<Transport>);

impl TransportRef {
    pub(crate) fn get(&self) -> std::result::Result<Arc<Transport>, Status> {
        self.0
            .upgrade()
            .ok_or_else(|| Status::unavailable("transport closed"))
    }
}

/// Client facade for a running agent
#[derive(Debug)]
pub struct UbtClient {
    transport: Arc<Transport>,
}

impl UbtClient {
    /// Connect eagerly; fails if the agent cannot be reached within the
    /// configured connect timeout
    pub async fn connect(config: &EndpointConfig) -> Result<Self> {
        let (endpoint, uri) = build_endpoint(config)?;
        tracing::debug!(uri = %uri, security = ?config.security, "Connecting to agent");
        let channel = endpoint.connect().await?;
        Ok(Self::from_channel(channel, uri))
    }

    /// Create the client without touching the network; the first call
    /// establishes the connection
    pub fn connect_lazy(config: &EndpointConfig) -> Result<Self> {
        let (endpoint, uri) = build_endpoint(config)?;
        Ok(Self::from_channel(endpoint.connect_lazy(), uri))
    }

    pub fn from_channel(channel: Channel, uri: impl Into<String>) -> Self {
        Self {
            transport: Arc::new(Transport {
                channel,
                uri: uri.into(),
            }),
        }
    }

    pub fn uri(&self) -> &str {
        self.transport.uri()
    }

    pub fn chain_service(&self) -> ChainService {
        ChainService::new(self.handle())
    }

    pub fn block_service(&self) -> BlockService {
        BlockService::new(self.handle())
    }

    pub fn construct_service(&self) -> ConstructService {
        ConstructService::new(self.handle())
    }

    pub fn currency_service(&self) -> CurrencyService {
        CurrencyService::new(self.handle())
    }

    pub fn account_manager(&self) -> AccountManager {
        AccountManager::new(self.handle())
    }

    /// Release the channel. Calls already in flight finish on their own
    /// clone; new calls through existing handles fail.
    pub fn close(self) {
        tracing::debug!(uri = %self.transport.uri, "Closing agent transport");
    }

    fn handle(&self) -> TransportRef {
        TransportRef(Arc::downgrade(&self.transport))
    }
}

fn build_endpoint(config: &EndpointConfig) -> Result<(Endpoint, String)> {
    let uri = config.uri();
    let mut endpoint = Endpoint::from_shared(uri.clone())
        .map_err(|e| Error::InvalidEndpoint(format!("{}: {}", uri, e)))?
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs));

    if config.security == TransportSecurity::Tls {
        endpoint = endpoint.tls_config(ClientTlsConfig::new())?;
    }

    Ok((endpoint, uri))
}
