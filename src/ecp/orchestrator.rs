use crate::ecp::context::{unexpected_body, HandshakeContext, IdpReply, SpRequest, Stage};
use crate::ecp::credentials::credential_token;
use crate::ecp::error::EcpError;
use crate::ecp::idp::{FirstIdp, IdpSelector};
use crate::ecp::templates::TemplateRenderer;
use crate::ecp::{paos_response_header, PAOS_MEDIA_TYPE, SOAP_ACTION, SOAP_CONTENT_TYPE};
use crate::http::exchange_client::{ExchangeRequest, HttpExchange};
use crate::http::redirect::RedirectPolicy;
use crate::http::response::HttpResponseWrapper;
use crate::soap::element::Element;
use crate::soap::message::{AuthnRequest, SamlMessage, SamlResponse};
use log::{debug, info, warn};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use std::sync::Arc;
use url::Url;

pub const SOAPACTION: HeaderName = HeaderName::from_static("soapaction");

const FAULT_CODE: &str = "soap:Server";
const INVALID_RESPONSE: &str = "invalidresponse";

/// Completes an ECP handshake when a service provider answers with a PAOS request.
///
/// The orchestrator keeps no state between calls: everything a handshake learns lives in a
/// [`HandshakeContext`] owned by that call.
pub struct EcpOrchestrator {
    client: Arc<dyn HttpExchange>,
    templates: TemplateRenderer,
    idp_selector: Box<dyn IdpSelector>,
}

impl EcpOrchestrator {
    pub fn new(client: Arc<dyn HttpExchange>, templates: TemplateRenderer) -> EcpOrchestrator {
        EcpOrchestrator {
            client,
            templates,
            idp_selector: Box::new(FirstIdp),
        }
    }

    /// Replaces the default first-entry identity provider selection.
    pub fn with_idp_selector<S: IdpSelector + 'static>(mut self, selector: S) -> EcpOrchestrator {
        self.idp_selector = Box::new(selector);
        self
    }

    pub fn is_paos_response(response: &HttpResponseWrapper) -> bool {
        response
            .content_type()
            .map(|content_type| content_type.to_ascii_lowercase().contains(PAOS_MEDIA_TYPE))
            .unwrap_or(false)
    }

    /// Runs the handshake if `response` asks for one, and leaves it untouched otherwise.
    ///
    /// On success `response` holds the service provider's answer to the final assertion
    /// post. `request_headers` are the headers of the request that produced `response`.
    pub async fn handle(
        &self,
        request_headers: &HeaderMap,
        response: &mut HttpResponseWrapper,
    ) -> Result<(), EcpError> {
        let mut stage = Stage::PassthroughCheck;
        if !EcpOrchestrator::is_paos_response(response) {
            debug!("not a PAOS response, passing it through");
            return Ok(());
        }

        let result = self.handshake(&mut stage, request_headers, response).await;
        if let Err(e) = &result {
            warn!("ECP handshake failed while {}: {}", stage, e);
        }

        result
    }

    async fn handshake(
        &self,
        stage: &mut Stage,
        request_headers: &HeaderMap,
        response: &mut HttpResponseWrapper,
    ) -> Result<(), EcpError> {
        *stage = Stage::ParseSpRequest;
        let content = response
            .take_content()
            .map_err(|e| EcpError::MalformedEcpRequest(e.to_string()))?;
        let SpRequest {
            relay_state,
            idp_entries,
            response_consumer_url,
            consumer_endpoint,
            message_id,
            body,
        } = SpRequest::parse(&content)?;

        *stage = Stage::SelectIdp;
        let selected_idp = self
            .idp_selector
            .select(&idp_entries)
            .cloned()
            .ok_or(EcpError::NoIdpAvailable)?;
        debug!(
            "selected identity provider {} at {}",
            selected_idp.provider_id, selected_idp.location
        );

        let mut context = HandshakeContext {
            authorization_header: request_headers
                .get(AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .map(String::from),
            relay_state,
            response_consumer_url,
            consumer_endpoint,
            message_id,
            selected_idp,
            credential_token: None,
        };

        *stage = Stage::BuildToken;
        context.credential_token =
            credential_token(context.authorization_header.as_deref(), &self.templates);
        if context.credential_token.is_none() {
            debug!("no usable credentials, contacting the identity provider without WS-Security");
        }

        *stage = Stage::ValidateAuthnBody;
        let authn_request = match body {
            Some(SamlMessage::AuthnRequest(authn_request)) => authn_request,
            other => return Err(unexpected_body("AuthnRequest", other.as_ref())),
        };
        if let Some(acs) = authn_request.assertion_consumer_service_url() {
            if acs != context.response_consumer_url {
                warn!(
                    "authentication request names {} as consumer, PAOS header names {}",
                    acs, context.response_consumer_url
                );
            }
        }

        *stage = Stage::SendToIdp;
        let mut idp_response = self.send_to_idp(&context, &authn_request).await?;

        *stage = Stage::ParseIdpResponse;
        if !idp_response.status().is_success() {
            warn!(
                "identity provider {} answered {}",
                context.selected_idp.location,
                idp_response.status()
            );
        }
        let idp_content = idp_response
            .take_content()
            .map_err(|e| EcpError::MalformedIdpResponse(e.to_string()))?;
        let reply = IdpReply::parse(&idp_content)?;

        if reply.assertion_consumer_service_url != context.response_consumer_url {
            self.send_fault(&context).await;
            return Err(EcpError::ResponseConsumerMismatch {
                expected: context.response_consumer_url,
                received: reply.assertion_consumer_service_url,
            });
        }

        let relay_state = resolve_relay_state(context.relay_state.as_ref(), reply.relay_state.as_ref());
        let saml_response = match reply.body {
            Some(SamlMessage::Response(saml_response)) => saml_response,
            other => return Err(unexpected_body("Response", other.as_ref())),
        };
        debug!(
            "identity provider answered with response {} and status {}",
            saml_response.id().unwrap_or("without ID"),
            saml_response.status_code().unwrap_or("unknown")
        );
        if !answers(&authn_request, &saml_response) {
            warn!(
                "response {} does not answer authentication request {}",
                saml_response.in_response_to().unwrap_or("without InResponseTo"),
                authn_request.id().unwrap_or("without ID")
            );
        }

        *stage = Stage::SendToSp;
        let final_response = self.send_to_sp(&context, relay_state, &saml_response).await?;

        *stage = Stage::Done;
        response.replace_with(final_response);

        Ok(())
    }

    async fn send_to_idp(
        &self,
        context: &HandshakeContext,
        authn_request: &AuthnRequest,
    ) -> Result<HttpResponseWrapper, EcpError> {
        let mut header = String::new();
        if let Some(token) = &context.credential_token {
            header.push_str(&self.templates.security(token));
        }
        if let Some(relay_state) = &context.relay_state {
            header.push_str(&relay_state.to_xml_string());
        }
        let envelope = self
            .templates
            .envelope(&header, &authn_request.to_xml_string());

        let location = context.selected_idp.location.clone();
        let mut request = soap_request(location.clone(), envelope);
        request.follow_redirects = false;

        info!(
            "sending authentication request from {} to {}",
            authn_request.issuer().as_deref().unwrap_or("an unnamed issuer"),
            location
        );
        self.client
            .execute(request, None)
            .await
            .map_err(|e| EcpError::IdpUnreachable {
                location: location.to_string(),
                source: e.into(),
            })
    }

    /// Tells the service provider the identity provider's answer was not addressed to it.
    ///
    /// Delivery is best effort; the handshake fails either way.
    async fn send_fault(&self, context: &HandshakeContext) {
        let header = context
            .message_id
            .as_deref()
            .map(paos_response_header)
            .unwrap_or_default();
        let envelope = self
            .templates
            .envelope(&header, &self.templates.fault(FAULT_CODE, INVALID_RESPONSE));

        let mut request = soap_request(context.consumer_endpoint.clone(), envelope);
        request.follow_redirects = false;

        info!("sending {} fault to {}", INVALID_RESPONSE, context.consumer_endpoint);
        match self.client.execute(request, None).await {
            Ok(response) => debug!("service provider answered the fault with {}", response.status()),
            Err(e) => warn!("could not deliver fault to {}: {}", context.consumer_endpoint, e),
        }
    }

    async fn send_to_sp(
        &self,
        context: &HandshakeContext,
        relay_state: Option<&Element>,
        saml_response: &SamlResponse,
    ) -> Result<HttpResponseWrapper, EcpError> {
        let mut header = String::new();
        if let Some(relay_state) = relay_state {
            header.push_str(&relay_state.to_xml_string());
        }
        if let Some(message_id) = &context.message_id {
            header.push_str(&paos_response_header(message_id));
        }
        let envelope = self
            .templates
            .envelope(&header, &saml_response.to_xml_string());

        let request = soap_request(context.consumer_endpoint.clone(), envelope);

        info!("posting assertion to {}", context.consumer_endpoint);
        let response = self
            .client
            .execute(request, Some(&RedirectPolicy))
            .await
            .map_err(|e| EcpError::SpRejectedAssertion {
                status: None,
                source: Some(e.into()),
            })?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(EcpError::SpRejectedAssertion {
                status: Some(status),
                source: None,
            });
        }

        Ok(response)
    }
}

/// Whether `saml_response` is the answer to `authn_request`.
fn answers(authn_request: &AuthnRequest, saml_response: &SamlResponse) -> bool {
    match (authn_request.id(), saml_response.in_response_to()) {
        (Some(id), Some(in_response_to)) => id == in_response_to,
        _ => false,
    }
}

fn soap_request(url: Url, envelope: String) -> ExchangeRequest {
    let mut request = ExchangeRequest::post(url, SOAP_CONTENT_TYPE, envelope.into_bytes());
    request
        .headers
        .insert(SOAPACTION, HeaderValue::from_static(SOAP_ACTION));
    request
}

/// The service provider's RelayState wins; the identity provider's is only a fallback.
fn resolve_relay_state<'a>(
    from_sp: Option<&'a Element>,
    from_idp: Option<&'a Element>,
) -> Option<&'a Element> {
    match (from_sp, from_idp) {
        (Some(from_sp), Some(from_idp)) => {
            if from_sp.text().trim() != from_idp.text().trim() {
                warn!("identity provider changed the RelayState, keeping the service provider's");
            }
            Some(from_sp)
        }
        (Some(from_sp), None) => Some(from_sp),
        (None, from_idp) => from_idp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecp::idp::IdpEntry;
    use crate::http::exchange_client::{ClientOptions, ExchangeClient, ResponseHook};
    use anyhow::anyhow;
    use async_trait::async_trait;
    use base64::{engine::general_purpose::STANDARD, Engine};
    use httpmock::MockServer;
    use reqwest::header::CONTENT_TYPE;
    use reqwest::StatusCode;
    use std::sync::Mutex;

    const SP_ACS: &str = "https://sp.example/acs";
    const IDP_SSO: &str = "https://idp.example/sso";

    fn paos_request(consumer: &str, idps: &[&str], relay_state: Option<&str>) -> String {
        let entries: String = idps
            .iter()
            .enumerate()
            .map(|(index, location)| {
                format!(
                    r#"<samlp:IDPEntry ProviderID="urn:idp:{}" Loc="{}"/>"#,
                    index, location
                )
            })
            .collect();
        let relay_state = relay_state
            .map(|value| {
                format!(
                    r#"<ecp:RelayState xmlns:ecp="urn:oasis:names:tc:SAML:2.0:profiles:SSO:ecp" S:actor="http://schemas.xmlsoap.org/soap/actor/next" S:mustUnderstand="1">{}</ecp:RelayState>"#,
                    value
                )
            })
            .unwrap_or_default();

        format!(
            r#"<S:Envelope xmlns:S="http://schemas.xmlsoap.org/soap/envelope/">
  <S:Header>
    <paos:Request xmlns:paos="urn:liberty:paos:2003-08" S:actor="http://schemas.xmlsoap.org/soap/actor/next" S:mustUnderstand="1" messageID="msg-42" responseConsumerURL="{consumer}" service="urn:oasis:names:tc:SAML:2.0:profiles:SSO:ecp"/>
    <ecp:Request xmlns:ecp="urn:oasis:names:tc:SAML:2.0:profiles:SSO:ecp" S:actor="http://schemas.xmlsoap.org/soap/actor/next" S:mustUnderstand="1" IsPassive="0"><saml:Issuer xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion">https://sp.example/shibboleth</saml:Issuer><samlp:IDPList xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol">{entries}</samlp:IDPList></ecp:Request>
    {relay_state}
  </S:Header>
  <S:Body><samlp:AuthnRequest xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" AssertionConsumerServiceURL="{consumer}" ID="_req1" ProtocolBinding="urn:oasis:names:tc:SAML:2.0:bindings:PAOS" Version="2.0"><saml:Issuer xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion">https://sp.example/shibboleth</saml:Issuer></samlp:AuthnRequest></S:Body>
</S:Envelope>"#,
            consumer = consumer,
            entries = entries,
            relay_state = relay_state
        )
    }

    fn idp_response(acs: &str, relay_state: Option<&str>) -> String {
        let relay_state = relay_state
            .map(|value| {
                format!(
                    r#"<ecp:RelayState xmlns:ecp="urn:oasis:names:tc:SAML:2.0:profiles:SSO:ecp">{}</ecp:RelayState>"#,
                    value
                )
            })
            .unwrap_or_default();

        format!(
            r#"<soap11:Envelope xmlns:soap11="http://schemas.xmlsoap.org/soap/envelope/"><soap11:Header><ecp:Response xmlns:ecp="urn:oasis:names:tc:SAML:2.0:profiles:SSO:ecp" soap11:actor="http://schemas.xmlsoap.org/soap/actor/next" soap11:mustUnderstand="1" AssertionConsumerServiceURL="{acs}"/>{relay_state}</soap11:Header><soap11:Body><saml2p:Response xmlns:saml2p="urn:oasis:names:tc:SAML:2.0:protocol" ID="_resp1" InResponseTo="_req1"><saml2p:Status><saml2p:StatusCode Value="urn:oasis:names:tc:SAML:2.0:status:Success"/></saml2p:Status></saml2p:Response></soap11:Body></soap11:Envelope>"#,
            acs = acs,
            relay_state = relay_state
        )
    }

    fn response(content_type: &'static str, body: String) -> HttpResponseWrapper {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        HttpResponseWrapper::new(StatusCode::OK, headers, body.into_bytes())
    }

    fn basic_auth(credentials: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let value = format!("Basic {}", STANDARD.encode(credentials));
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&value).unwrap());
        headers
    }

    /// Answers requests from a fixed table of URL to (status, body) and records them.
    struct FakeExchange {
        routes: Vec<(String, StatusCode, String)>,
        requests: Mutex<Vec<(ExchangeRequest, bool)>>,
    }

    impl FakeExchange {
        fn new(routes: Vec<(&str, StatusCode, String)>) -> Arc<FakeExchange> {
            Arc::new(FakeExchange {
                routes: routes
                    .into_iter()
                    .map(|(url, status, body)| (url.to_string(), status, body))
                    .collect(),
                requests: Mutex::new(vec![]),
            })
        }

        fn requests(&self) -> Vec<ExchangeRequest> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .map(|(request, _)| request.clone())
                .collect()
        }

        /// `(url, hook passed, follow_redirects)` of every request, in order.
        fn redirect_handling(&self) -> Vec<(String, bool, bool)> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .map(|(request, hooked)| (request.url.to_string(), *hooked, request.follow_redirects))
                .collect()
        }

        fn bodies_sent_to(&self, url: &str) -> Vec<String> {
            self.requests()
                .into_iter()
                .filter(|request| request.url.as_str() == url)
                .map(|request| String::from_utf8(request.body.unwrap_or_default()).unwrap())
                .collect()
        }
    }

    #[async_trait]
    impl HttpExchange for FakeExchange {
        async fn execute(
            &self,
            request: ExchangeRequest,
            hook: Option<&dyn ResponseHook>,
        ) -> anyhow::Result<HttpResponseWrapper> {
            self.requests
                .lock()
                .unwrap()
                .push((request.clone(), hook.is_some()));

            let (_, status, body) = self
                .routes
                .iter()
                .find(|(url, _, _)| url == request.url.as_str())
                .ok_or_else(|| anyhow!("connection refused by {}", request.url))?;

            let mut headers = HeaderMap::new();
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/xml"));
            Ok(HttpResponseWrapper::new(*status, headers, body.clone().into_bytes()))
        }
    }

    fn orchestrator(exchange: &Arc<FakeExchange>) -> EcpOrchestrator {
        EcpOrchestrator::new(exchange.clone(), TemplateRenderer::new())
    }

    #[tokio::test]
    async fn test_non_paos_response_passes_through() {
        let exchange = FakeExchange::new(vec![]);
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/html"));
        headers.append("set-cookie", HeaderValue::from_static("a=1"));
        headers.append("set-cookie", HeaderValue::from_static("b=2"));
        let mut response =
            HttpResponseWrapper::new(StatusCode::NOT_FOUND, headers.clone(), b"<html/>".to_vec());

        orchestrator(&exchange)
            .handle(&basic_auth("alice:pw"), &mut response)
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers(), &headers);
        assert_eq!(response.take_content().unwrap(), b"<html/>");
        assert!(exchange.requests().is_empty());
    }

    #[tokio::test]
    async fn test_response_without_content_type_passes_through() {
        let exchange = FakeExchange::new(vec![]);
        let mut response =
            HttpResponseWrapper::new(StatusCode::OK, HeaderMap::new(), b"plain".to_vec());

        orchestrator(&exchange)
            .handle(&HeaderMap::new(), &mut response)
            .await
            .unwrap();

        assert_eq!(response.take_content().unwrap(), b"plain");
        assert!(exchange.requests().is_empty());
    }

    #[tokio::test]
    async fn test_handshake_relays_assertion() {
        let exchange = FakeExchange::new(vec![
            (IDP_SSO, StatusCode::OK, idp_response(SP_ACS, Some("r1"))),
            (SP_ACS, StatusCode::OK, String::from("welcome")),
        ]);
        let mut response = response(
            "application/vnd.paos+xml; charset=utf-8",
            paos_request(SP_ACS, &[IDP_SSO], Some("r1")),
        );

        orchestrator(&exchange)
            .handle(&basic_auth("alice:s3cr3t"), &mut response)
            .await
            .unwrap();

        let requests = exchange.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].url.as_str(), IDP_SSO);
        assert_eq!(requests[0].headers[SOAPACTION], SOAP_ACTION);
        assert_eq!(requests[0].headers[reqwest::header::CONTENT_TYPE], "text/xml");

        let to_idp = exchange.bodies_sent_to(IDP_SSO).remove(0);
        assert!(to_idp.contains("<wsse:Username>alice</wsse:Username>"));
        assert_eq!(to_idp.matches("s3cr3t").count(), 1);
        assert!(to_idp.contains("ID=\"_req1\""));
        assert!(to_idp.contains(">r1</ecp:RelayState>"));

        let to_sp = exchange.bodies_sent_to(SP_ACS).remove(0);
        assert!(to_sp.contains("ID=\"_resp1\""));
        assert!(to_sp.contains(">r1</ecp:RelayState>"));
        assert!(to_sp.contains("refToMessageID=\"msg-42\""));
        assert!(!to_sp.contains("s3cr3t"));

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.content_type(), Some("text/xml"));
        assert_eq!(response.take_content().unwrap(), b"welcome");
    }

    #[tokio::test]
    async fn test_only_assertion_post_follows_redirects() {
        let exchange = FakeExchange::new(vec![
            (IDP_SSO, StatusCode::OK, idp_response(SP_ACS, Some("r1"))),
            (SP_ACS, StatusCode::OK, String::from("welcome")),
        ]);
        let mut response = response(PAOS_MEDIA_TYPE, paos_request(SP_ACS, &[IDP_SSO], Some("r1")));

        orchestrator(&exchange)
            .handle(&basic_auth("alice:s3cr3t"), &mut response)
            .await
            .unwrap();

        assert_eq!(
            exchange.redirect_handling(),
            vec![
                (String::from(IDP_SSO), false, false),
                (String::from(SP_ACS), true, true),
            ]
        );
        for request in exchange.requests() {
            assert!(!request.headers.contains_key(AUTHORIZATION));
        }
    }

    #[test]
    fn test_answers_matches_request_id() {
        let authn_request = match SamlMessage::from_element(
            &Element::parse(
                r#"<samlp:AuthnRequest xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" ID="_req1"/>"#,
            )
            .unwrap(),
        ) {
            Some(SamlMessage::AuthnRequest(authn_request)) => authn_request,
            other => panic!("unexpected message {:?}", other),
        };
        let saml_response = |in_response_to: &str| {
            let xml = format!(
                r#"<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" ID="_resp1"{}/>"#,
                in_response_to
            );
            match SamlMessage::from_element(&Element::parse(&xml).unwrap()) {
                Some(SamlMessage::Response(saml_response)) => saml_response,
                other => panic!("unexpected message {:?}", other),
            }
        };

        assert!(answers(&authn_request, &saml_response(r#" InResponseTo="_req1""#)));
        assert!(!answers(&authn_request, &saml_response(r#" InResponseTo="_other""#)));
        assert!(!answers(&authn_request, &saml_response("")));
    }

    #[tokio::test]
    async fn test_relay_state_survives_when_idp_drops_it() {
        let exchange = FakeExchange::new(vec![
            (IDP_SSO, StatusCode::OK, idp_response(SP_ACS, None)),
            (SP_ACS, StatusCode::OK, String::from("ok")),
        ]);
        let mut response = response(PAOS_MEDIA_TYPE, paos_request(SP_ACS, &[IDP_SSO], Some("r1")));

        orchestrator(&exchange)
            .handle(&HeaderMap::new(), &mut response)
            .await
            .unwrap();

        let to_sp = exchange.bodies_sent_to(SP_ACS).remove(0);
        assert!(to_sp.contains(">r1</ecp:RelayState>"));
    }

    #[tokio::test]
    async fn test_sp_relay_state_wins_over_idp() {
        let exchange = FakeExchange::new(vec![
            (IDP_SSO, StatusCode::OK, idp_response(SP_ACS, Some("tampered"))),
            (SP_ACS, StatusCode::OK, String::from("ok")),
        ]);
        let mut response = response(PAOS_MEDIA_TYPE, paos_request(SP_ACS, &[IDP_SSO], Some("r1")));

        orchestrator(&exchange)
            .handle(&HeaderMap::new(), &mut response)
            .await
            .unwrap();

        let to_sp = exchange.bodies_sent_to(SP_ACS).remove(0);
        assert!(to_sp.contains(">r1</ecp:RelayState>"));
        assert!(!to_sp.contains("tampered"));
    }

    #[tokio::test]
    async fn test_without_authorization_no_security_header() {
        let exchange = FakeExchange::new(vec![
            (IDP_SSO, StatusCode::OK, idp_response(SP_ACS, None)),
            (SP_ACS, StatusCode::OK, String::from("ok")),
        ]);
        let mut response = response(PAOS_MEDIA_TYPE, paos_request(SP_ACS, &[IDP_SSO], None));

        orchestrator(&exchange)
            .handle(&HeaderMap::new(), &mut response)
            .await
            .unwrap();

        let to_idp = exchange.bodies_sent_to(IDP_SSO).remove(0);
        assert!(!to_idp.contains("wsse:Security"));
        assert!(!to_idp.contains("RelayState"));
    }

    #[tokio::test]
    async fn test_consumer_mismatch_sends_fault_only() {
        let exchange = FakeExchange::new(vec![
            (IDP_SSO, StatusCode::OK, idp_response("https://evil.example/acs", Some("r1"))),
            (SP_ACS, StatusCode::OK, String::from("ok")),
        ]);
        let mut response = response(PAOS_MEDIA_TYPE, paos_request(SP_ACS, &[IDP_SSO], Some("r1")));

        let result = orchestrator(&exchange)
            .handle(&basic_auth("alice:pw"), &mut response)
            .await;

        match result {
            Err(EcpError::ResponseConsumerMismatch { expected, received }) => {
                assert_eq!(expected, SP_ACS);
                assert_eq!(received, "https://evil.example/acs");
            }
            other => panic!("unexpected result {:?}", other),
        }

        let to_sp = exchange.bodies_sent_to(SP_ACS);
        assert_eq!(to_sp.len(), 1);
        assert!(to_sp[0].contains("<faultstring>invalidresponse</faultstring>"));
        assert_eq!(
            exchange.redirect_handling(),
            vec![
                (String::from(IDP_SSO), false, false),
                (String::from(SP_ACS), false, false),
            ]
        );
        assert!(to_sp[0].contains("refToMessageID=\"msg-42\""));
        assert!(!to_sp[0].contains("_resp1"));
        assert!(exchange.bodies_sent_to("https://evil.example/acs").is_empty());
    }

    #[tokio::test]
    async fn test_empty_idp_list() {
        let exchange = FakeExchange::new(vec![]);
        let mut response = response(PAOS_MEDIA_TYPE, paos_request(SP_ACS, &[], None));

        let result = orchestrator(&exchange)
            .handle(&HeaderMap::new(), &mut response)
            .await;

        assert!(matches!(result, Err(EcpError::NoIdpAvailable)));
        assert!(exchange.requests().is_empty());
    }

    #[tokio::test]
    async fn test_body_must_be_authn_request() {
        let exchange = FakeExchange::new(vec![]);
        let body = paos_request(SP_ACS, &[IDP_SSO], None).replace("AuthnRequest", "LogoutRequest");
        let mut response = response(PAOS_MEDIA_TYPE, body);

        let result = orchestrator(&exchange)
            .handle(&HeaderMap::new(), &mut response)
            .await;

        match result {
            Err(EcpError::UnexpectedBodyType { expected, .. }) => assert_eq!(expected, "AuthnRequest"),
            other => panic!("unexpected result {:?}", other),
        }
        assert!(exchange.requests().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_paos_body() {
        let exchange = FakeExchange::new(vec![]);
        let mut response = response(PAOS_MEDIA_TYPE, String::from("<html>login here</html>"));

        let result = orchestrator(&exchange)
            .handle(&HeaderMap::new(), &mut response)
            .await;

        assert!(matches!(result, Err(EcpError::MalformedEcpRequest(_))));
    }

    #[tokio::test]
    async fn test_unreachable_idp() {
        let exchange = FakeExchange::new(vec![]);
        let mut response = response(PAOS_MEDIA_TYPE, paos_request(SP_ACS, &[IDP_SSO], None));

        let result = orchestrator(&exchange)
            .handle(&HeaderMap::new(), &mut response)
            .await;

        match result {
            Err(EcpError::IdpUnreachable { location, .. }) => assert_eq!(location, IDP_SSO),
            other => panic!("unexpected result {:?}", other),
        }
        assert_eq!(exchange.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_idp_body_must_be_response() {
        let body = idp_response(SP_ACS, None)
            .replace("saml2p:Response", "saml2p:ArtifactResponse");
        let exchange = FakeExchange::new(vec![
            (IDP_SSO, StatusCode::OK, body),
            (SP_ACS, StatusCode::OK, String::from("ok")),
        ]);
        let mut response = response(PAOS_MEDIA_TYPE, paos_request(SP_ACS, &[IDP_SSO], None));

        let result = orchestrator(&exchange)
            .handle(&HeaderMap::new(), &mut response)
            .await;

        match result {
            Err(EcpError::UnexpectedBodyType { expected, .. }) => assert_eq!(expected, "Response"),
            other => panic!("unexpected result {:?}", other),
        }
        assert!(exchange.bodies_sent_to(SP_ACS).is_empty());
    }

    #[tokio::test]
    async fn test_sp_rejection() {
        let exchange = FakeExchange::new(vec![
            (IDP_SSO, StatusCode::OK, idp_response(SP_ACS, None)),
            (SP_ACS, StatusCode::FORBIDDEN, String::from("denied")),
        ]);
        let mut response = response(PAOS_MEDIA_TYPE, paos_request(SP_ACS, &[IDP_SSO], None));

        let result = orchestrator(&exchange)
            .handle(&HeaderMap::new(), &mut response)
            .await;

        match result {
            Err(EcpError::SpRejectedAssertion { status, .. }) => {
                assert_eq!(status, Some(StatusCode::FORBIDDEN))
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    struct LastIdp;

    impl IdpSelector for LastIdp {
        fn select<'a>(&self, entries: &'a [IdpEntry]) -> Option<&'a IdpEntry> {
            entries.last()
        }
    }

    #[tokio::test]
    async fn test_selector_is_replaceable() {
        let other_idp = "https://other-idp.example/sso";
        let exchange = FakeExchange::new(vec![
            (other_idp, StatusCode::OK, idp_response(SP_ACS, None)),
            (SP_ACS, StatusCode::OK, String::from("ok")),
        ]);
        let mut response = response(
            PAOS_MEDIA_TYPE,
            paos_request(SP_ACS, &[IDP_SSO, other_idp], None),
        );

        orchestrator(&exchange)
            .with_idp_selector(LastIdp)
            .handle(&HeaderMap::new(), &mut response)
            .await
            .unwrap();

        assert!(exchange.bodies_sent_to(IDP_SSO).is_empty());
        assert_eq!(exchange.bodies_sent_to(other_idp).len(), 1);
    }

    #[tokio::test]
    async fn test_handshake_over_http() {
        let server = MockServer::start_async().await;
        let acs = server.url("/acs");
        let sso = server.url("/sso");

        let idp_body = idp_response(&acs, Some("r1"));
        let idp = server
            .mock_async(|when, then| {
                when.method("POST")
                    .path("/sso")
                    .header("soapaction", SOAP_ACTION)
                    .header("content-type", "text/xml")
                    .body_contains("_req1")
                    .body_contains("<wsse:Username>alice</wsse:Username>");
                then.status(200)
                    .header("content-type", "text/xml")
                    .body(idp_body);
            })
            .await;
        let sp = server
            .mock_async(|when, then| {
                when.method("POST")
                    .path("/acs")
                    .header("soapaction", SOAP_ACTION)
                    .body_contains("_resp1")
                    .body_contains(">r1</ecp:RelayState>");
                then.status(200)
                    .header("content-type", "text/plain")
                    .body("the protected resource");
            })
            .await;

        let client = ExchangeClient::new(&ClientOptions::default()).unwrap();
        let orchestrator = EcpOrchestrator::new(Arc::new(client), TemplateRenderer::new());
        let mut response = response(PAOS_MEDIA_TYPE, paos_request(&acs, &[&sso], Some("r1")));

        orchestrator
            .handle(&basic_auth("alice:pw"), &mut response)
            .await
            .unwrap();

        idp.assert_async().await;
        sp.assert_async().await;
        assert_eq!(response.content_type(), Some("text/plain"));
        assert_eq!(response.take_content().unwrap(), b"the protected resource");
    }

    #[tokio::test]
    async fn test_assertion_post_is_replayed_through_redirect() {
        let server = MockServer::start_async().await;
        let acs = server.url("/acs");
        let sso = server.url("/sso");

        let idp_body = idp_response(&acs, None);
        let idp = server
            .mock_async(|when, then| {
                when.method("POST").path("/sso");
                then.status(200)
                    .header("content-type", "text/xml")
                    .body(idp_body);
            })
            .await;
        let redirect = server
            .mock_async(|when, then| {
                when.method("POST").path("/acs").body_contains("_resp1");
                then.status(302)
                    .header("Location", "/acs/final")
                    .header("Set-Cookie", "_shibsession=xyz; Path=/; HttpOnly");
            })
            .await;
        let target = server
            .mock_async(|when, then| {
                when.method("POST")
                    .path("/acs/final")
                    .header("soapaction", SOAP_ACTION)
                    .header("content-type", "text/xml")
                    .header("cookie", "_shibsession=xyz")
                    .body_contains("_resp1")
                    .body_contains("refToMessageID=\"msg-42\"");
                then.status(200)
                    .header("content-type", "text/plain")
                    .body("the protected resource");
            })
            .await;

        let client = ExchangeClient::new(&ClientOptions::default()).unwrap();
        let orchestrator = EcpOrchestrator::new(Arc::new(client), TemplateRenderer::new());
        let mut response = response(PAOS_MEDIA_TYPE, paos_request(&acs, &[&sso], None));

        orchestrator
            .handle(&basic_auth("alice:pw"), &mut response)
            .await
            .unwrap();

        idp.assert_async().await;
        redirect.assert_async().await;
        target.assert_async().await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.take_content().unwrap(), b"the protected resource");
    }
}
