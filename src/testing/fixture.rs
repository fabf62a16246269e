//! Agent under test plus a client connected to it

use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::rpc::UbtClient;
use crate::supervisor::{SpawnSpec, Supervisor, SupervisorOptions};

/// A started agent and the client talking to it
///
/// Always finish with [`teardown`](AgentFixture::teardown); dropping the
/// fixture kills the agent without waiting for it.
pub struct AgentFixture {
    supervisor: Supervisor,
    client: UbtClient,
}

impl AgentFixture {
    /// Build (if configured), start the agent and wait until it is ready
    ///
    /// An empty endpoint address means "connect to whatever the agent
    /// advertised on its readiness line".
    pub async fn start(config: &Config) -> Result<Self> {
        let mut supervisor = Supervisor::new(
            SpawnSpec::from_config(config),
            SupervisorOptions::from_config(config),
        );
        supervisor.start().await?;

        let mut endpoint = config.endpoint.clone();
        if endpoint.address.is_empty() {
            match supervisor.advertised_address() {
                Some(address) => endpoint.address = address,
                None => {
                    if let Err(stop_err) = supervisor.stop().await {
                        tracing::warn!(error = %stop_err, "Failed to stop agent");
                    }
                    return Err(Error::Config(
                        "endpoint address is empty and the agent advertised none".to_string(),
                    ));
                }
            }
        }

        let client = match UbtClient::connect_lazy(&endpoint) {
            Ok(client) => client,
            Err(e) => {
                if let Err(stop_err) = supervisor.stop().await {
                    tracing::warn!(error = %stop_err, "Failed to stop agent after client setup error");
                }
                return Err(e);
            }
        };

        tracing::info!(
            pid = supervisor.pid(),
            endpoint = client.uri(),
            "Agent ready"
        );
        Ok(Self { supervisor, client })
    }

    pub fn client(&self) -> &UbtClient {
        &self.client
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    /// Close the client, stop the agent and return its exit code
    ///
    /// An agent that already exited on its own reports the code it
    /// exited with.
    pub async fn teardown(self) -> Result<i32> {
        let Self {
            mut supervisor,
            client,
        } = self;
        client.close();

        if let Some(code) = supervisor.poll_exit().await? {
            tracing::warn!(code, "Agent exited before teardown");
            return Ok(code);
        }
        supervisor.stop().await
    }
}
