use std::time::Duration;

use log::{debug, info, warn};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::error::SyncError;
use crate::manifest::{self, Manifest, ModEntry};
use crate::resolver::{self, Provider, RepoIdentity};

pub const MODS_FOLDER: &str = "mods";
pub const SERVER_FOLDER: &str = "server";
pub const PLUGIN_EXTENSION: &str = ".jar";
pub const USER_AGENT: &str = concat!("modpack-sync/", env!("CARGO_PKG_VERSION"));

const LISTING_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct ListingItem {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    download_url: Option<String>,
}

/// Where and how to ask a provider for the contents of a folder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListingEndpoint {
    pub provider: Provider,
    pub api_url: String,
    pub accept: &'static str,
    /// Raw-content prefix for entries whose API item carries no download URL.
    pub raw_base: String,
}

pub fn listing_endpoint(identity: &RepoIdentity, folder: &str) -> Result<ListingEndpoint, SyncError> {
    let RepoIdentity {
        owner,
        repo,
        branch,
        host,
        ..
    } = identity;
    let folder = folder.trim_matches('/');
    let endpoint = match identity.provider {
        Provider::GitHub => ListingEndpoint {
            provider: Provider::GitHub,
            api_url: format!(
                "https://api.github.com/repos/{owner}/{repo}/contents/{folder}?ref={branch}"
            ),
            accept: "application/vnd.github.v3+json",
            raw_base: format!("https://raw.githubusercontent.com/{owner}/{repo}/{branch}/{folder}/"),
        },
        Provider::GitLab => ListingEndpoint {
            provider: Provider::GitLab,
            api_url: format!(
                "https://gitlab.com/api/v4/projects/{owner}%2F{repo}/repository/tree?path={folder}&ref={branch}&per_page=100"
            ),
            accept: "application/json",
            raw_base: format!("https://gitlab.com/{owner}/{repo}/-/raw/{branch}/{folder}/"),
        },
        Provider::Gitea | Provider::Codeberg => ListingEndpoint {
            provider: identity.provider,
            api_url: format!(
                "https://{host}/api/v1/repos/{owner}/{repo}/contents/{folder}?ref={branch}"
            ),
            accept: "application/json",
            raw_base: format!(
                "https://{host}/{owner}/{repo}/raw/{}/{branch}/{folder}/",
                identity.ref_kind.as_str()
            ),
        },
        other => return Err(SyncError::UnsupportedProvider(other.to_string())),
    };
    Ok(endpoint)
}

/// Turn a provider listing response into plugin entries.
///
/// Only file entries whose name ends with the plugin extension are kept. A JSON
/// object instead of an array is an error payload from the provider.
pub fn parse_listing(
    endpoint: &ListingEndpoint,
    folder: &str,
    body: &str,
) -> Result<Vec<ModEntry>, SyncError> {
    let items = match manifest::parse_json_payload(body)? {
        Value::Array(items) => items,
        Value::Object(obj) => {
            if let Some(message) = manifest::string_field(&obj, "message") {
                return Err(SyncError::FolderNotFound {
                    folder: folder.trim_matches('/').to_owned(),
                    message,
                });
            }
            return Ok(Vec::new());
        }
        other => {
            warn!(
                "listing: unexpected {} payload from {}",
                manifest::json_kind(&other),
                endpoint.api_url
            );
            return Ok(Vec::new());
        }
    };

    let file_kind = match endpoint.provider {
        Provider::GitLab => "blob",
        _ => "file",
    };
    let entries = items
        .into_iter()
        .filter_map(|item| serde_json::from_value::<ListingItem>(item).ok())
        .filter(|item| item.kind.as_deref() == Some(file_kind))
        .filter_map(|item| {
            let name = item.name?;
            if !has_plugin_extension(&name) {
                return None;
            }
            let url = match endpoint.provider {
                Provider::GitHub => item.download_url.filter(|url| !url.is_empty()),
                _ => Some(format!("{}{}", endpoint.raw_base, urlencoding::encode(&name))),
            };
            Some(ModEntry {
                filename: name,
                url,
                hash: None,
            })
        })
        .collect();
    Ok(entries)
}

/// Swap the `scheme://host` part of `url` for `origin`.
fn with_origin(url: &str, origin: &str) -> String {
    let after_scheme = url.find("://").map_or(0, |i| i + 3);
    let path = url[after_scheme..]
        .find('/')
        .map_or("", |i| &url[after_scheme + i..]);
    format!("{}{path}", origin.trim_end_matches('/'))
}

/// Providers with a directory-listing API this crate knows how to query.
pub fn supports_listing(provider: Provider) -> bool {
    matches!(
        provider,
        Provider::GitHub | Provider::GitLab | Provider::Gitea | Provider::Codeberg
    )
}

/// Case-insensitive check for the managed plugin file extension.
pub fn has_plugin_extension(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with(PLUGIN_EXTENSION)
}

#[derive(Clone)]
pub struct ListingClient {
    client: Client,
    /// Replaces the scheme and host of provider API URLs when set.
    api_origin: Option<String>,
}

impl Default for ListingClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ListingClient {
    pub fn new() -> Self {
        let client = Client::builder()
            .connect_timeout(LISTING_TIMEOUT)
            .timeout(LISTING_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|err| {
                warn!(
                    "listing: failed to build HTTP client ({}); using default configuration",
                    err
                );
                Client::new()
            });
        Self {
            client,
            api_origin: None,
        }
    }

    /// Send listing requests to `origin` instead of the provider's API host.
    #[cfg(test)]
    pub(crate) fn with_api_origin(mut self, origin: impl Into<String>) -> Self {
        self.api_origin = Some(origin.into());
        self
    }

    /// List the plugin files inside `folder` of the repository behind `repository_url`.
    pub async fn list_folder(
        &self,
        repository_url: &str,
        folder: &str,
    ) -> Result<Vec<ModEntry>, SyncError> {
        let resolved = resolver::resolve(repository_url)
            .ok_or_else(|| SyncError::InvalidRepoUrl(repository_url.trim().to_owned()))?;
        let identity = resolved
            .identity
            .ok_or_else(|| SyncError::UnsupportedProvider(resolved.base.provider.to_string()))?;
        let mut endpoint = listing_endpoint(&identity, folder)?;
        if let Some(origin) = &self.api_origin {
            endpoint.api_url = with_origin(&endpoint.api_url, origin);
        }
        info!(
            "listing: fetching {}/ from {} ({}@{})",
            folder, endpoint.provider, identity.repo, identity.branch
        );
        let body = self.get_text(&endpoint.api_url, endpoint.accept).await?;
        let entries = parse_listing(&endpoint, folder, &body)?;
        debug!("listing: {} plugin files in {}/", entries.len(), folder);
        Ok(entries)
    }

    /// Fetch and parse a `{"mods": [...]}` manifest document.
    pub async fn fetch_manifest_document(&self, url: &str) -> Result<Manifest, SyncError> {
        info!("listing: fetching manifest document {url}");
        let body = self.get_text(url, "application/json").await?;
        Ok(manifest::parse(&body)?)
    }

    async fn get_text(&self, url: &str, accept: &str) -> Result<String, SyncError> {
        let resp = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, accept)
            .send()
            .await
            .map_err(|e| SyncError::Request {
                url: url.to_owned(),
                reason: e.to_string(),
            })?;
        let status = resp.status();
        let body = resp.text().await.map_err(|e| SyncError::Request {
            url: url.to_owned(),
            reason: format!("body error: {e}"),
        })?;
        if !status.is_success() {
            return Err(SyncError::FetchFailure {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParseFailure;
    use crate::test_support::{Route, serve, serve_once};

    fn endpoint_for(url: &str) -> ListingEndpoint {
        let identity = resolver::resolve_identity(url).unwrap();
        listing_endpoint(&identity, MODS_FOLDER).unwrap()
    }

    #[test]
    fn builds_provider_endpoints() {
        let github = endpoint_for("https://github.com/acme/pack/tree/dev");
        assert_eq!(
            github.api_url,
            "https://api.github.com/repos/acme/pack/contents/mods?ref=dev"
        );
        assert_eq!(github.accept, "application/vnd.github.v3+json");

        let gitlab = endpoint_for("https://gitlab.com/acme/pack");
        assert_eq!(
            gitlab.api_url,
            "https://gitlab.com/api/v4/projects/acme%2Fpack/repository/tree?path=mods&ref=main&per_page=100"
        );
        assert_eq!(gitlab.raw_base, "https://gitlab.com/acme/pack/-/raw/main/mods/");

        let gitea = endpoint_for("https://git.example.org/team/pack");
        assert_eq!(
            gitea.api_url,
            "https://git.example.org/api/v1/repos/team/pack/contents/mods?ref=main"
        );
        let codeberg = endpoint_for("https://codeberg.org/team/pack");
        assert_eq!(
            codeberg.raw_base,
            "https://codeberg.org/team/pack/raw/branch/main/mods/"
        );
    }

    #[test]
    fn sourcehut_has_no_listing_strategy() {
        let identity = resolver::resolve_identity("https://git.sr.ht/~me/pack").unwrap();
        assert!(matches!(
            listing_endpoint(&identity, MODS_FOLDER),
            Err(SyncError::UnsupportedProvider(p)) if p == "sourcehut"
        ));
    }

    #[test]
    fn github_listing_keeps_jar_files_with_download_urls() {
        let endpoint = endpoint_for("https://github.com/acme/pack");
        let body = r#"[
            {"type": "file", "name": "Alpha.JAR", "download_url": "https://raw.githubusercontent.com/acme/pack/main/mods/Alpha.JAR"},
            {"type": "file", "name": "readme.md", "download_url": "https://x/readme.md"},
            {"type": "dir", "name": "extra.jar", "download_url": null},
            {"type": "file", "name": "beta.jar", "download_url": null},
            42
        ]"#;
        let entries = parse_listing(&endpoint, MODS_FOLDER, body).unwrap();
        assert_eq!(
            entries,
            vec![
                ModEntry::new("Alpha.JAR")
                    .with_url("https://raw.githubusercontent.com/acme/pack/main/mods/Alpha.JAR"),
                ModEntry::new("beta.jar"),
            ]
        );
    }

    #[test]
    fn gitlab_listing_builds_encoded_raw_urls() {
        let endpoint = endpoint_for("https://gitlab.com/acme/pack");
        let body = r#"[
            {"type": "blob", "name": "my mod+1.jar"},
            {"type": "tree", "name": "nested.jar"},
            {"type": "file", "name": "wrong-kind.jar"}
        ]"#;
        let entries = parse_listing(&endpoint, MODS_FOLDER, body).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(
            entries[0].url.as_deref(),
            Some("https://gitlab.com/acme/pack/-/raw/main/mods/my%20mod%2B1.jar")
        );
    }

    #[test]
    fn error_payload_message_is_surfaced() {
        let endpoint = endpoint_for("https://github.com/acme/pack");
        let err = parse_listing(&endpoint, MODS_FOLDER, r#"{"message": "Not Found"}"#).unwrap_err();
        assert_eq!(err.to_string(), "mods/ folder not found: Not Found");

        let entries = parse_listing(&endpoint, MODS_FOLDER, r#"{"other": 1}"#).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn html_listing_is_reported_as_such() {
        let endpoint = endpoint_for("https://github.com/acme/pack");
        let err = parse_listing(&endpoint, MODS_FOLDER, "<html><head></head></html>").unwrap_err();
        assert!(matches!(err, SyncError::Parse(ParseFailure::UnexpectedHtml)));
    }

    #[test]
    fn tag_refs_reach_the_raw_base() {
        let endpoint = endpoint_for("https://codeberg.org/team/pack/src/tag/v1.2");
        assert_eq!(
            endpoint.api_url,
            "https://codeberg.org/api/v1/repos/team/pack/contents/mods?ref=v1.2"
        );
        assert_eq!(
            endpoint.raw_base,
            "https://codeberg.org/team/pack/raw/tag/v1.2/mods/"
        );
    }

    #[test]
    fn origin_swap_keeps_path_and_query() {
        assert_eq!(
            with_origin(
                "https://api.github.com/repos/a/b/contents/mods?ref=main",
                "http://127.0.0.1:9/"
            ),
            "http://127.0.0.1:9/repos/a/b/contents/mods?ref=main"
        );
    }

    #[tokio::test]
    async fn lists_folder_over_http() {
        let server = serve(vec![
            Route::ok(
                "/repos/acme/pack/contents/mods?ref=main",
                br#"[
                    {"type": "file", "name": "a.jar", "download_url": "https://cdn.example.com/a.jar"},
                    {"type": "file", "name": "notes.txt", "download_url": "https://cdn.example.com/notes.txt"}
                ]"#
                .to_vec(),
            ),
            Route::ok(
                "/repos/acme/pack/contents/server?ref=main",
                br#"{"message": "Not Found"}"#.to_vec(),
            ),
            Route::status(
                "/repos/acme/other/contents/mods?ref=main",
                403,
                b"rate limited".to_vec(),
            ),
        ])
        .await;
        let client = ListingClient::new().with_api_origin(server);

        let entries = client
            .list_folder("https://github.com/acme/pack", MODS_FOLDER)
            .await
            .unwrap();
        assert_eq!(
            entries,
            vec![ModEntry::new("a.jar").with_url("https://cdn.example.com/a.jar")]
        );

        let err = client
            .list_folder("https://github.com/acme/pack", SERVER_FOLDER)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "server/ folder not found: Not Found");

        let err = client
            .list_folder("https://github.com/acme/other", MODS_FOLDER)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SyncError::FetchFailure { status: 403, ref body } if body == "rate limited"
        ));
    }

    #[tokio::test]
    async fn generic_urls_are_rejected_before_any_request() {
        let client = ListingClient::new();
        let err = client
            .list_folder("https://files.example.invalid/pack/", MODS_FOLDER)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::UnsupportedProvider(p) if p == "generic"));

        let err = client.list_folder("not a url", MODS_FOLDER).await.unwrap_err();
        assert!(matches!(err, SyncError::InvalidRepoUrl(_)));
    }

    #[tokio::test]
    async fn fetches_manifest_documents_and_reports_status() {
        let client = ListingClient::new();
        let url = serve_once(
            200,
            br#"{"mods": [{"filename": "a.jar", "hash": "sha256:00"}]}"#.to_vec(),
        )
        .await;
        let manifest = client.fetch_manifest_document(&url).await.unwrap();
        assert_eq!(manifest.mods, vec![ModEntry::new("a.jar").with_hash("sha256:00")]);

        let url = serve_once(404, b"missing".to_vec()).await;
        let err = client.fetch_manifest_document(&url).await.unwrap_err();
        assert!(matches!(
            err,
            SyncError::FetchFailure { status: 404, ref body } if body == "missing"
        ));
    }
}
