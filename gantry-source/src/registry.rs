//! Registry-backed tag source.
//!
//! Queries the registry's tag-listing endpoint
//! (`GET /v2/<repository>/tags/list`) with optional basic auth. A 404 means
//! the repository has never been pushed — reported as "no tags yet", not as
//! the source being unavailable.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Deserialize;

use gantry_core::types::Project;
use gantry_core::version::VersionTag;

use crate::{unavailable, SourceError, TagSource};

/// Tag-list payload returned by the registry.
#[derive(Debug, Deserialize)]
struct TagList {
    #[allow(dead_code)]
    name: Option<String>,
    tags: Option<Vec<String>>,
}

pub struct RegistryTagSource {
    base_url: String,
    authorization: Option<String>,
    agent: ureq::Agent,
}

impl RegistryTagSource {
    /// `registry` is `host:port` or a full `http(s)://…` base URL;
    /// credentials are passed through as HTTP basic auth, never stored
    /// anywhere else.
    pub fn new(registry: &str, plain_http: bool, credentials: Option<(&str, &str)>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(10))
            .timeout_read(Duration::from_secs(30))
            .timeout_write(Duration::from_secs(30))
            .build();

        Self {
            base_url: normalize_base_url(registry, plain_http),
            authorization: credentials.map(|(user, pass)| basic_auth_header(user, pass)),
            agent,
        }
    }

    fn tags_url(&self, repository: &str) -> String {
        format!(
            "{}/v2/{}/tags/list",
            self.base_url,
            repository.trim_matches('/')
        )
    }
}

impl TagSource for RegistryTagSource {
    fn latest(&self, project: &Project) -> Result<Option<VersionTag>, SourceError> {
        let url = self.tags_url(&project.source);
        let mut request = self.agent.get(&url);
        if let Some(auth) = &self.authorization {
            request = request.set("Authorization", auth);
        }

        let response = match request.call() {
            Ok(response) => response,
            // Repository never pushed: a normal first-sight steady state.
            Err(ureq::Error::Status(404, _)) => return Ok(None),
            Err(ureq::Error::Status(code, _)) => {
                return Err(unavailable(project, format!("registry returned HTTP {code}")));
            }
            Err(err) => return Err(unavailable(project, err.to_string())),
        };

        let list: TagList = response
            .into_json()
            .map_err(|err| unavailable(project, format!("bad tag-list payload: {err}")))?;

        let tags = list.tags.unwrap_or_default();
        Ok(VersionTag::latest_of(tags.iter().map(String::as_str)))
    }
}

/// Keep an explicit scheme if the operator provided one; otherwise default
/// to HTTPS, or HTTP when `plain_http` is set (LAN registries).
pub fn normalize_base_url(registry: &str, plain_http: bool) -> String {
    let trimmed = registry.trim_end_matches('/');
    if trimmed.contains("://") {
        trimmed.to_owned()
    } else if plain_http {
        format!("http://{trimmed}")
    } else {
        format!("https://{trimmed}")
    }
}

fn basic_auth_header(user: &str, pass: &str) -> String {
    format!("Basic {}", BASE64.encode(format!("{user}:{pass}")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_defaults_to_https() {
        assert_eq!(
            normalize_base_url("registry.example.com:5000", false),
            "https://registry.example.com:5000"
        );
    }

    #[test]
    fn base_url_honors_plain_http() {
        assert_eq!(
            normalize_base_url("10.0.0.2:5000", true),
            "http://10.0.0.2:5000"
        );
    }

    #[test]
    fn base_url_keeps_explicit_scheme() {
        assert_eq!(
            normalize_base_url("http://localhost:5000/", false),
            "http://localhost:5000"
        );
    }

    #[test]
    fn tags_url_targets_v2_endpoint() {
        let source = RegistryTagSource::new("registry.example.com:5000", false, None);
        assert_eq!(
            source.tags_url("shop-api"),
            "https://registry.example.com:5000/v2/shop-api/tags/list"
        );
    }

    #[test]
    fn basic_auth_header_is_rfc7617() {
        // "ci:hunter2" → Y2k6aHVudGVyMg==
        assert_eq!(basic_auth_header("ci", "hunter2"), "Basic Y2k6aHVudGVyMg==");
    }

    #[test]
    fn tag_list_payload_tolerates_null_tags() {
        let list: TagList = serde_json::from_str(r#"{"name":"shop-api","tags":null}"#).unwrap();
        assert!(list.tags.is_none());
    }
}
