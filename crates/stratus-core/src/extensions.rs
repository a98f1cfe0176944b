//! Service extension discovery.
//!
//! Services advertise optional features under `extensions/`. A missing
//! extension answers 404, which [`negotiate`] reports as
//! [`ExtensionSupport::Absent`] instead of an error.

use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::client::ServiceClient;
use crate::continuation::{try_select, Outcome};
use crate::http::AcceptStatus;

/// Envelope key of a single extension.
pub const EXTENSION_KEY: &str = "extension";

/// Envelope key of the extension listing.
pub const EXTENSIONS_KEY: &str = "extensions";

/// An advertised extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extension {
    /// Short name used in URLs
    pub alias: String,

    /// Display name
    #[serde(default)]
    pub name: String,

    /// Free-form description
    #[serde(default)]
    pub description: String,

    /// Last update timestamp, as sent by the service
    #[serde(default)]
    pub updated: Option<String>,

    /// Related links
    #[serde(default)]
    pub links: Vec<Value>,
}

/// Result of probing one extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtensionSupport {
    /// The service advertises the extension.
    Present(Extension),
    /// The service does not know the alias.
    Absent,
}

impl ExtensionSupport {
    /// True when the extension is available.
    #[must_use]
    pub const fn is_present(&self) -> bool {
        matches!(self, Self::Present(_))
    }

    /// The extension, when present.
    #[must_use]
    pub const fn extension(&self) -> Option<&Extension> {
        match self {
            Self::Present(extension) => Some(extension),
            Self::Absent => None,
        }
    }
}

fn success_or_not_found(status: StatusCode) -> bool {
    status.is_success() || status == StatusCode::NOT_FOUND
}

/// Probe whether the service supports `alias`.
pub async fn negotiate(
    client: &ServiceClient,
    alias: &str,
    token: &CancellationToken,
) -> Outcome<ExtensionSupport> {
    let exchange = match client.exchange(Method::GET, &format!("extensions/{alias}")) {
        Ok(exchange) => exchange.accepting(AcceptStatus::Predicate(success_or_not_found)),
        Err(err) => return Outcome::Faulted(err),
    };

    let service = client.service();
    try_select(client.send(exchange, token), move |response| {
        if response.status() == StatusCode::NOT_FOUND {
            debug!(%service, alias, "Extension absent");
            return Ok(ExtensionSupport::Absent);
        }
        response.decode(EXTENSION_KEY).map(ExtensionSupport::Present)
    })
    .await
}

/// List every extension the service advertises.
pub async fn list_extensions(
    client: &ServiceClient,
    token: &CancellationToken,
) -> Outcome<Vec<Extension>> {
    client.get_enveloped("extensions", EXTENSIONS_KEY, token).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::types::ServiceType;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> ServiceClient {
        ServiceClient::builder(ServiceType::Compute, format!("{}/v2.1", server.uri()))
            .unwrap()
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn present_extension_is_decoded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2.1/extensions/os-keypairs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "extension": {
                    "alias": "os-keypairs",
                    "name": "Keypairs",
                    "description": "Keypair support",
                    "updated": "2011-08-08T00:00:00Z",
                    "links": []
                }
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let support = negotiate(&client, "os-keypairs", &CancellationToken::new())
            .await
            .completed()
            .unwrap();

        assert!(support.is_present());
        assert_eq!(support.extension().unwrap().name, "Keypairs");
    }

    #[tokio::test]
    async fn not_found_means_absent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2.1/extensions/os-missing"))
            .respond_with(ResponseTemplate::new(404).set_body_string("itemNotFound"))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let outcome = negotiate(&client, "os-missing", &CancellationToken::new()).await;
        assert_eq!(outcome, Outcome::Completed(ExtensionSupport::Absent));
    }

    #[tokio::test]
    async fn other_failures_fault() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let outcome = negotiate(&client, "os-admin", &CancellationToken::new()).await;
        assert_eq!(
            outcome,
            Outcome::Faulted(Error::TransientHttp {
                status: 403,
                body: "forbidden".to_string()
            })
        );
    }

    #[tokio::test]
    async fn lists_extensions() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2.1/extensions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "extensions": [
                    {"alias": "os-keypairs", "name": "Keypairs"},
                    {"alias": "os-volumes"}
                ]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let extensions = list_extensions(&client, &CancellationToken::new())
            .await
            .completed()
            .unwrap();

        let aliases: Vec<_> = extensions.iter().map(|e| e.alias.as_str()).collect();
        assert_eq!(aliases, ["os-keypairs", "os-volumes"]);
        assert!(extensions[1].description.is_empty());
    }
}
