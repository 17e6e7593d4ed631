use crate::ecp::advertiser::CapabilityAdvertiser;
use crate::ecp::error::EcpError;
use crate::ecp::idp::IdpSelector;
use crate::ecp::orchestrator::EcpOrchestrator;
use crate::ecp::templates::TemplateRenderer;
use crate::http::exchange_client::{ClientOptions, ExchangeClient, ExchangeRequest, HttpExchange};
use crate::http::redirect::RedirectPolicy;
use crate::http::response::HttpResponseWrapper;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RelayOptions {
    pub advertise_paos: bool,
    pub timeout: Option<Duration>,
    pub max_redirects: usize,
    pub cookie_store: bool,
    pub template_dir: Option<PathBuf>,
}

impl Default for RelayOptions {
    fn default() -> Self {
        let client = ClientOptions::default();

        RelayOptions {
            advertise_paos: true,
            timeout: client.timeout,
            max_redirects: client.max_redirects,
            cookie_store: client.cookie_store,
            template_dir: None,
        }
    }
}

impl RelayOptions {
    fn client_options(&self) -> ClientOptions {
        ClientOptions {
            timeout: self.timeout,
            max_redirects: self.max_redirects,
            cookie_store: self.cookie_store,
        }
    }
}

/// One HTTP client shared by the caller's requests and every handshake leg.
pub struct EcpRelay {
    client: Arc<ExchangeClient>,
    advertiser: CapabilityAdvertiser,
    orchestrator: EcpOrchestrator,
}

impl EcpRelay {
    pub fn new(options: &RelayOptions) -> Result<EcpRelay> {
        let templates = match &options.template_dir {
            Some(dir) => TemplateRenderer::from_dir(dir)
                .with_context(|| format!("could not load templates from {}", dir.display()))?,
            None => TemplateRenderer::new(),
        };
        let client = Arc::new(ExchangeClient::new(&options.client_options())?);

        Ok(EcpRelay {
            orchestrator: EcpOrchestrator::new(client.clone(), templates),
            advertiser: CapabilityAdvertiser::new(options.advertise_paos),
            client,
        })
    }

    pub fn with_idp_selector<S: IdpSelector + 'static>(mut self, selector: S) -> EcpRelay {
        self.orchestrator = self.orchestrator.with_idp_selector(selector);
        self
    }

    /// Marks `request` as coming from an ECP-capable client.
    pub fn advertise(&self, request: &mut ExchangeRequest) -> Result<()> {
        self.advertiser.advertise(&mut request.headers)
    }

    /// Runs the handshake on `response`, if it asks for one.
    pub async fn complete(
        &self,
        request: &ExchangeRequest,
        response: &mut HttpResponseWrapper,
    ) -> Result<(), EcpError> {
        self.orchestrator.handle(&request.headers, response).await
    }

    /// Advertises, sends and completes `request` in one go.
    pub async fn fetch(&self, mut request: ExchangeRequest) -> Result<HttpResponseWrapper> {
        self.advertise(&mut request)?;

        let mut response = self
            .client
            .execute(request.clone(), Some(&RedirectPolicy))
            .await?;
        self.complete(&request, &mut response).await?;

        Ok(response)
    }
}
