//! Provider factory: turns [`AgentSettings`] into a genai client and model id.

use crate::settings::{AgentSettings, LlmProvider};
use genai::resolver::{AuthData, Endpoint};
use genai::{Client, ServiceTarget};

#[derive(Debug, thiserror::Error)]
pub enum LlmProviderError {
    #[error("Missing Azure OpenAI settings: {}", .0.join(", "))]
    MissingAzureSettings(Vec<&'static str>),
}

/// A genai client together with the namespaced model it should call.
#[derive(Debug, Clone)]
pub struct ModelBinding {
    pub model: String,
    pub client: Client,
}

pub fn create_model(settings: &AgentSettings) -> Result<ModelBinding, LlmProviderError> {
    let (model, endpoint, key) = match settings.provider {
        LlmProvider::Openai => (
            format!("openai::{}", settings.openai_model),
            settings.openai_base_url.clone(),
            settings.openai_api_key.clone(),
        ),
        LlmProvider::AzureOpenai => {
            let azure = azure_settings(settings)?;
            (
                format!("openai::{}", azure.deployment),
                Some(azure.endpoint),
                Some(azure.api_key),
            )
        }
        LlmProvider::Anthropic => (
            format!("anthropic::{}", settings.anthropic_model),
            settings.anthropic_base_url.clone(),
            settings.anthropic_api_key.clone(),
        ),
        LlmProvider::Gemini => (
            format!("gemini::{}", settings.gemini_model),
            settings.gemini_base_url.clone(),
            settings.gemini_api_key.clone(),
        ),
    };

    tracing::debug!(
        provider = %settings.provider,
        model = %model,
        custom_endpoint = endpoint.is_some(),
        "creating model binding"
    );

    let endpoint = endpoint.map(with_trailing_slash);
    let key = key.filter(|k| !k.trim().is_empty());
    let client = Client::builder()
        .with_service_target_resolver_fn(move |mut t: ServiceTarget| {
            if let Some(endpoint) = &endpoint {
                t.endpoint = Endpoint::from_owned(endpoint.clone());
            }
            if let Some(key) = &key {
                t.auth = AuthData::from_single(key.clone());
            }
            Ok(t)
        })
        .build();

    Ok(ModelBinding { model, client })
}

struct AzureSettings {
    api_key: String,
    endpoint: String,
    deployment: String,
}

/// Azure deployments are reached through the resource's OpenAI-compatible
/// `/openai/v1/` route, so the OpenAI adapter can serve them.
///
/// That route is unversioned and the adapter appends its own path to the
/// endpoint, so `AZURE_OPENAI_API_VERSION` is validated with the other
/// settings but not sent.
fn azure_settings(settings: &AgentSettings) -> Result<AzureSettings, LlmProviderError> {
    let present = |value: &Option<String>| {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };
    let api_key = present(&settings.azure_openai_api_key);
    let endpoint = present(&settings.azure_openai_endpoint);
    let api_version = present(&settings.azure_openai_api_version);
    let deployment = present(&settings.azure_openai_deployment);

    let missing: Vec<&'static str> = [
        ("AZURE_OPENAI_API_KEY", api_key.is_none()),
        ("AZURE_OPENAI_ENDPOINT", endpoint.is_none()),
        ("AZURE_OPENAI_API_VERSION", api_version.is_none()),
        ("AZURE_OPENAI_DEPLOYMENT", deployment.is_none()),
    ]
    .into_iter()
    .filter_map(|(name, absent)| absent.then_some(name))
    .collect();

    match (api_key, endpoint, deployment) {
        (Some(api_key), Some(endpoint), Some(deployment)) if missing.is_empty() => {
            Ok(AzureSettings {
                api_key,
                endpoint: azure_v1_endpoint(&endpoint),
                deployment,
            })
        }
        _ => Err(LlmProviderError::MissingAzureSettings(missing)),
    }
}

fn azure_v1_endpoint(endpoint: &str) -> String {
    let base = endpoint.trim_end_matches('/');
    if base.ends_with("/openai/v1") {
        format!("{base}/")
    } else {
        format!("{base}/openai/v1/")
    }
}

fn with_trailing_slash(url: String) -> String {
    if url.ends_with('/') {
        url
    } else {
        format!("{url}/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openai_is_namespaced() {
        let binding = create_model(&AgentSettings::default()).unwrap();
        assert_eq!(binding.model, "openai::gpt-4o-mini");
    }

    #[test]
    fn anthropic_and_gemini_use_their_models() {
        let anthropic = AgentSettings {
            provider: LlmProvider::Anthropic,
            ..AgentSettings::default()
        };
        assert_eq!(
            create_model(&anthropic).unwrap().model,
            "anthropic::claude-3-5-sonnet-latest"
        );

        let gemini = AgentSettings {
            provider: LlmProvider::Gemini,
            gemini_base_url: Some("http://localhost:8000".into()),
            ..AgentSettings::default()
        };
        assert_eq!(create_model(&gemini).unwrap().model, "gemini::gemini-1.5-pro");
    }

    #[test]
    fn azure_reports_all_missing_settings() {
        let settings = AgentSettings {
            provider: LlmProvider::AzureOpenai,
            azure_openai_api_key: Some("key".into()),
            azure_openai_deployment: Some("  ".into()),
            ..AgentSettings::default()
        };
        let err = create_model(&settings).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Missing Azure OpenAI settings: AZURE_OPENAI_ENDPOINT, \
             AZURE_OPENAI_API_VERSION, AZURE_OPENAI_DEPLOYMENT"
        );
    }

    #[test]
    fn azure_uses_deployment_on_v1_route() {
        let settings = AgentSettings {
            provider: LlmProvider::AzureOpenai,
            azure_openai_api_key: Some("key".into()),
            azure_openai_endpoint: Some("https://acme.openai.azure.com/".into()),
            azure_openai_api_version: Some("2024-05-01-preview".into()),
            azure_openai_deployment: Some("gpt4o-prod".into()),
            ..AgentSettings::default()
        };
        assert_eq!(create_model(&settings).unwrap().model, "openai::gpt4o-prod");
    }

    #[test]
    fn azure_endpoint_normalisation() {
        assert_eq!(
            azure_v1_endpoint("https://acme.openai.azure.com"),
            "https://acme.openai.azure.com/openai/v1/"
        );
        assert_eq!(
            azure_v1_endpoint("https://acme.openai.azure.com/openai/v1/"),
            "https://acme.openai.azure.com/openai/v1/"
        );
    }
}
