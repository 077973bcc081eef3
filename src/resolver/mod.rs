//! Repository URL resolution.
//!
//! A single ordered table of provider matchers turns a free-form repository URL
//! into both the raw-content base URL used for downloads and the structured
//! identity used for listing API calls. The first matcher whose grammar accepts
//! the input wins.

use std::fmt;
use std::sync::LazyLock;

use log::debug;
use regex::{Captures, Regex};

pub const DEFAULT_BRANCH: &str = "main";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Provider {
    GitHub,
    GitLab,
    Gitea,
    Codeberg,
    Sourcehut,
    Generic,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::GitHub => "github",
            Provider::GitLab => "gitlab",
            Provider::Gitea => "gitea",
            Provider::Codeberg => "codeberg",
            Provider::Sourcehut => "sourcehut",
            Provider::Generic => "generic",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a Gitea-style ref names. Raw URLs differ per kind (`raw/branch/`,
/// `raw/tag/`, `raw/commit/`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum RefKind {
    #[default]
    Branch,
    Tag,
    Commit,
}

impl RefKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RefKind::Branch => "branch",
            RefKind::Tag => "tag",
            RefKind::Commit => "commit",
        }
    }

    fn from_capture(kind: Option<&str>) -> Self {
        match kind {
            Some("tag") => RefKind::Tag,
            Some("commit") => RefKind::Commit,
            _ => RefKind::Branch,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RepoIdentity {
    pub owner: String,
    pub repo: String,
    pub branch: String,
    /// Kind of `branch`; only Gitea and Codeberg distinguish it.
    pub ref_kind: RefKind,
    pub provider: Provider,
    pub host: String,
}

/// Prefix that yields a byte-fetchable URL when a filename is appended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BaseUrlInfo {
    pub base_url: String,
    pub provider: Provider,
}

impl BaseUrlInfo {
    /// Base URL for files living in `folder` below the content root.
    pub fn folder_url(&self, folder: &str) -> String {
        let folder = folder.trim_matches('/');
        if folder.is_empty() {
            return self.base_url.clone();
        }
        format!("{}{}/", self.base_url, folder)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedRepo {
    pub base: BaseUrlInfo,
    /// Absent for the literal content-root fallback.
    pub identity: Option<RepoIdentity>,
}

type Builder = fn(&Captures<'_>, &str) -> Option<ResolvedRepo>;

struct Matcher {
    regex: Regex,
    build: Builder,
}

// Raw-content forms come before web forms: the web grammars accept any
// trailing path and would otherwise swallow raw URLs with the default branch.
static MATCHERS: LazyLock<Vec<Matcher>> = LazyLock::new(|| {
    let table: [(&str, Builder); 8] = [
        (
            r"^https?://raw\.githubusercontent\.com/([^/]+)/([^/]+)/([^/]+)/?(.*)$",
            github_raw,
        ),
        (
            r"^https?://(?:www\.)?github\.com/([^/]+)/([^/]+?)(?:\.git)?(?:/tree/([^/]+))?(?:/.*)?$",
            github_web,
        ),
        (
            r"^https?://(?:www\.)?gitlab\.com/([^/]+)/([^/]+)/-/raw/([^/]+)/?(.*)$",
            gitlab_raw,
        ),
        (
            r"^https?://(?:www\.)?gitlab\.com/([^/]+)/([^/]+?)(?:\.git)?(?:/-/tree/([^/]+))?(?:/.*)?$",
            gitlab_web,
        ),
        (
            r"^https?://([^/]+)/([^/]+)/([^/]+?)(?:\.git)?(?:/src/(?:(branch|commit|tag)/)?([^/]+))?(?:/.*)?$",
            gitea,
        ),
        (
            r"^https?://(?:www\.)?codeberg\.org/([^/]+)/([^/]+?)(?:\.git)?(?:/src/(?:(branch|commit|tag)/)?([^/]+))?(?:/.*)?$",
            codeberg,
        ),
        (
            r"^https?://(?:www\.)?git\.sr\.ht/~?([^/]+)/([^/]+?)(?:\.git)?(?:/tree/([^/]+))?(?:/.*)?$",
            sourcehut,
        ),
        (r"^(https?://.+)$", generic),
    ];
    table
        .into_iter()
        .map(|(pattern, build)| Matcher {
            regex: Regex::new(pattern).expect("provider pattern must compile"),
            build,
        })
        .collect()
});

/// Resolve a repository URL against the provider table.
///
/// Returns `None` when no matcher accepts the input, which callers treat as an
/// invalid repository URL.
pub fn resolve(url: &str) -> Option<ResolvedRepo> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return None;
    }
    for matcher in MATCHERS.iter() {
        let Some(caps) = matcher.regex.captures(trimmed) else {
            continue;
        };
        if let Some(resolved) = (matcher.build)(&caps, trimmed) {
            debug!(
                "resolver: {} -> {} ({})",
                trimmed, resolved.base.base_url, resolved.base.provider
            );
            return Some(resolved);
        }
    }
    debug!("resolver: no provider matched {trimmed}");
    None
}

pub fn resolve_base(url: &str) -> Option<BaseUrlInfo> {
    resolve(url).map(|resolved| resolved.base)
}

pub fn resolve_identity(url: &str) -> Option<RepoIdentity> {
    resolve(url).and_then(|resolved| resolved.identity)
}

fn group<'a>(caps: &'a Captures<'_>, index: usize) -> Option<&'a str> {
    caps.get(index)
        .map(|m| m.as_str())
        .filter(|value| !value.is_empty())
}

fn branch_or_default(caps: &Captures<'_>, index: usize) -> String {
    group(caps, index).unwrap_or(DEFAULT_BRANCH).to_owned()
}

fn strip_git_suffix(repo: &str) -> String {
    repo.strip_suffix(".git").unwrap_or(repo).to_owned()
}

fn sub_path(caps: &Captures<'_>, index: usize) -> String {
    match group(caps, index) {
        Some(path) if path.ends_with('/') => path.to_owned(),
        Some(path) => format!("{path}/"),
        None => String::new(),
    }
}

fn resolved(
    provider: Provider,
    host: &str,
    owner: &str,
    repo: String,
    branch: String,
    ref_kind: RefKind,
    base_url: String,
) -> Option<ResolvedRepo> {
    Some(ResolvedRepo {
        base: BaseUrlInfo { base_url, provider },
        identity: Some(RepoIdentity {
            owner: owner.to_owned(),
            repo,
            branch,
            ref_kind,
            provider,
            host: host.to_owned(),
        }),
    })
}

fn github_raw(caps: &Captures<'_>, _url: &str) -> Option<ResolvedRepo> {
    let (owner, repo, branch) = (&caps[1], &caps[2], &caps[3]);
    let base = format!(
        "https://raw.githubusercontent.com/{owner}/{repo}/{branch}/{}",
        sub_path(caps, 4)
    );
    resolved(
        Provider::GitHub,
        "github.com",
        owner,
        repo.to_owned(),
        branch.to_owned(),
        RefKind::Branch,
        base,
    )
}

fn github_web(caps: &Captures<'_>, _url: &str) -> Option<ResolvedRepo> {
    let owner = &caps[1];
    let repo = strip_git_suffix(&caps[2]);
    let branch = branch_or_default(caps, 3);
    let base = format!("https://raw.githubusercontent.com/{owner}/{repo}/{branch}/");
    resolved(
        Provider::GitHub,
        "github.com",
        owner,
        repo,
        branch,
        RefKind::Branch,
        base,
    )
}

fn gitlab_raw(caps: &Captures<'_>, _url: &str) -> Option<ResolvedRepo> {
    let (owner, repo, branch) = (&caps[1], &caps[2], &caps[3]);
    let base = format!(
        "https://gitlab.com/{owner}/{repo}/-/raw/{branch}/{}",
        sub_path(caps, 4)
    );
    resolved(
        Provider::GitLab,
        "gitlab.com",
        owner,
        repo.to_owned(),
        branch.to_owned(),
        RefKind::Branch,
        base,
    )
}

fn gitlab_web(caps: &Captures<'_>, _url: &str) -> Option<ResolvedRepo> {
    let owner = &caps[1];
    let repo = strip_git_suffix(&caps[2]);
    let branch = branch_or_default(caps, 3);
    let base = format!("https://gitlab.com/{owner}/{repo}/-/raw/{branch}/");
    resolved(
        Provider::GitLab,
        "gitlab.com",
        owner,
        repo,
        branch,
        RefKind::Branch,
        base,
    )
}

/// Hosts with a dedicated matcher; the self-hosted Gitea rule must not shadow them.
fn is_named_provider_host(host: &str) -> bool {
    let host = host.to_ascii_lowercase();
    ["github", "gitlab", "codeberg", "sr.ht"]
        .iter()
        .any(|name| host.contains(name))
}

fn gitea(caps: &Captures<'_>, _url: &str) -> Option<ResolvedRepo> {
    let host = &caps[1];
    if is_named_provider_host(host) {
        return None;
    }
    let owner = &caps[2];
    let repo = strip_git_suffix(&caps[3]);
    let kind = RefKind::from_capture(group(caps, 4));
    let branch = branch_or_default(caps, 5);
    let base = format!(
        "https://{host}/{owner}/{repo}/raw/{}/{branch}/",
        kind.as_str()
    );
    resolved(Provider::Gitea, host, owner, repo, branch, kind, base)
}

fn codeberg(caps: &Captures<'_>, _url: &str) -> Option<ResolvedRepo> {
    let owner = &caps[1];
    let repo = strip_git_suffix(&caps[2]);
    let kind = RefKind::from_capture(group(caps, 3));
    let branch = branch_or_default(caps, 4);
    let base = format!(
        "https://codeberg.org/{owner}/{repo}/raw/{}/{branch}/",
        kind.as_str()
    );
    resolved(
        Provider::Codeberg,
        "codeberg.org",
        owner,
        repo,
        branch,
        kind,
        base,
    )
}

fn sourcehut(caps: &Captures<'_>, _url: &str) -> Option<ResolvedRepo> {
    let owner = &caps[1];
    let repo = strip_git_suffix(&caps[2]);
    let branch = branch_or_default(caps, 3);
    let base = format!("https://git.sr.ht/~{owner}/{repo}/blob/{branch}/");
    resolved(
        Provider::Sourcehut,
        "git.sr.ht",
        owner,
        repo,
        branch,
        RefKind::Branch,
        base,
    )
}

fn generic(_caps: &Captures<'_>, url: &str) -> Option<ResolvedRepo> {
    let base_url = if url.ends_with('/') {
        url.to_owned()
    } else {
        format!("{url}/")
    };
    Some(ResolvedRepo {
        base: BaseUrlInfo {
            base_url,
            provider: Provider::Generic,
        },
        identity: None,
    })
}
