//! Bedrock Agent Runtime `RetrieveAndGenerate` client.

use std::time::Duration;

use tracing::{debug, info};
use url::Url;

use crate::config::RetrievalSettings;
use crate::credentials::CredentialsProvider;

use super::sigv4::{sign_request, SigningScope};
use super::{
    build_request, check_http_response, model_arn, parse_response, RetrievalError,
    RetrievalResponse, RetrievalService,
};

/// Service name used in the SigV4 credential scope.
const SIGNING_SERVICE: &str = "bedrock";
const OPERATION_PATH: &str = "retrieveAndGenerate";

/// Regional Bedrock Agent Runtime endpoint.
pub fn default_endpoint(region: &str) -> String {
    format!("https://bedrock-agent-runtime.{region}.amazonaws.com")
}

/// Knowledge-base client for one region, knowledge base and model.
#[derive(Debug, Clone)]
pub struct BedrockRetriever {
    client: reqwest::Client,
    url: Url,
    region: String,
    knowledge_base_id: String,
    model_arn: String,
    credentials: CredentialsProvider,
}

impl BedrockRetriever {
    /// Create a client from validated settings.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::Unavailable`] if the endpoint URL is invalid
    /// or the HTTP client cannot be built.
    pub fn new(
        settings: &RetrievalSettings,
        credentials: CredentialsProvider,
    ) -> Result<Self, RetrievalError> {
        let base = settings
            .endpoint_url
            .clone()
            .unwrap_or_else(|| default_endpoint(&settings.region));
        let url = Url::parse(&format!("{}/{OPERATION_PATH}", base.trim_end_matches('/')))
            .map_err(|e| RetrievalError::Unavailable(format!("invalid endpoint {base:?}: {e}")))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| RetrievalError::Unavailable(format!("http client: {e}")))?;

        let model_arn = model_arn(&settings.region, &settings.model_id);
        info!(
            endpoint = %url,
            region = %settings.region,
            knowledge_base_id = %settings.knowledge_base_id,
            model_arn = %model_arn,
            "bedrock retriever ready"
        );

        Ok(Self {
            client,
            url,
            region: settings.region.clone(),
            knowledge_base_id: settings.knowledge_base_id.clone(),
            model_arn,
            credentials,
        })
    }

    /// Request URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Generation model ARN sent with each request.
    pub fn model_arn(&self) -> &str {
        &self.model_arn
    }
}

#[async_trait::async_trait]
impl RetrievalService for BedrockRetriever {
    async fn retrieve_and_generate(&self, prompt: &str) -> Result<RetrievalResponse, RetrievalError> {
        let credentials = self.credentials.resolve()?;
        let body = serde_json::to_vec(&build_request(
            prompt,
            &self.knowledge_base_id,
            &self.model_arn,
        ))
        .map_err(|e| RetrievalError::Parse(e.to_string()))?;

        let signed = sign_request(
            "POST",
            &self.url,
            &[("content-type", "application/json")],
            &body,
            &credentials,
            SigningScope {
                region: &self.region,
                service: SIGNING_SERVICE,
            },
            chrono::Utc::now(),
        )?;

        let mut builder = self.client.post(self.url.clone());
        for (name, value) in &signed.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        debug!(bytes = body.len(), "sending retrieveAndGenerate request");
        let response = builder.body(body).send().await?;
        let payload = check_http_response(response, &credentials.secret_values()).await?;
        let parsed = parse_response(&payload)?;
        debug!(
            has_answer = parsed.answer.is_some(),
            references = parsed.citation_uris.len(),
            "retrieveAndGenerate response parsed"
        );
        Ok(parsed)
    }

    fn knowledge_base_id(&self) -> &str {
        &self.knowledge_base_id
    }
}
