//! Backend version checks and upgrade guidance for the editor plugin.
//!
//! The plugin launches the codemem CLI through a "runner" (`uv`, `uvx`, or
//! anything else) and an optional runner source (`CODEMEM_RUNNER_FROM`).
//! Guidance and auto-update decisions depend only on those two strings.

use once_cell::sync::OnceCell;
use regex::Regex;
use serde::Serialize;
use url::Url;

/// Strict `x.y.z`; no prefixes, suffixes or pre-release tags.
pub fn parse_semver(value: &str) -> Option<[u64; 3]> {
    let mut parts = value.trim().split('.');
    let mut out = [0u64; 3];
    for slot in out.iter_mut() {
        let part = parts.next()?;
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        *slot = part.parse().ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(out)
}

/// False when either side does not parse.
pub fn is_version_at_least(current: &str, minimum: &str) -> bool {
    match (parse_semver(current), parse_semver(minimum)) {
        (Some(c), Some(m)) => c >= m,
        _ => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum GuidanceMode {
    UvDev,
    UvxGit,
    UvxCustom,
    Generic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpgradeGuidance {
    pub mode: GuidanceMode,
    pub action: &'static str,
    pub note: &'static str,
}

fn looks_like_git(source: &str) -> bool {
    source.starts_with("git+") || source.contains(".git")
}

pub fn resolve_upgrade_guidance(runner: &str, runner_from: &str) -> UpgradeGuidance {
    let source = runner_from.trim();
    match runner.trim() {
        "uv" => UpgradeGuidance {
            mode: GuidanceMode::UvDev,
            action: "In your codemem repo, pull latest changes and run `uv sync`, then restart OpenCode.",
            note: "detected dev repo mode",
        },
        "uvx" if looks_like_git(source) => UpgradeGuidance {
            mode: GuidanceMode::UvxGit,
            action: "Update CODEMEM_RUNNER_FROM to a newer git ref/source, then restart OpenCode.",
            note: "detected uvx git mode",
        },
        "uvx" => UpgradeGuidance {
            mode: GuidanceMode::UvxCustom,
            action: "Update CODEMEM_RUNNER_FROM to a newer source, then restart OpenCode.",
            note: "detected uvx custom source mode",
        },
        _ => UpgradeGuidance {
            mode: GuidanceMode::Generic,
            action: "Run `uv tool install --upgrade codemem`, then restart OpenCode.",
            note: "fallback guidance",
        },
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdatePolicy {
    #[default]
    Notify,
    Auto,
    Off,
}

impl UpdatePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdatePolicy::Notify => "notify",
            UpdatePolicy::Auto => "auto",
            UpdatePolicy::Off => "off",
        }
    }
}

/// Explicit modes, then boolean-ish aliases; anything else is `notify`.
pub fn parse_backend_update_policy(value: Option<&str>) -> UpdatePolicy {
    let normalized = value.unwrap_or_default().trim().to_lowercase();
    match normalized.as_str() {
        "auto" | "1" | "true" | "yes" | "on" => UpdatePolicy::Auto,
        "off" | "0" | "false" | "no" => UpdatePolicy::Off,
        _ => UpdatePolicy::Notify,
    }
}

fn ref_suffix_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"@[^/]+$").expect("static regex"))
}

/// True when a git source names a ref (`repo.git@v1.2.3`, `…/repo@main`).
pub fn is_pinned_git_source(runner_from: &str) -> bool {
    let source = runner_from.trim();
    if source.is_empty() || !looks_like_git(source) {
        return false;
    }
    let without_query = source
        .split_once(['?', '#'])
        .map_or(source, |(head, _)| head);
    if without_query.contains(".git@") {
        return true;
    }
    let Some(url_value) = without_query.strip_prefix("git+") else {
        return false;
    };
    match Url::parse(url_value) {
        Ok(parsed) => {
            let path = parsed.path();
            path.contains(".git@") || ref_suffix_re().is_match(path)
        }
        Err(_) => ref_suffix_re().is_match(without_query),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlockReason {
    DevRunner,
    MissingSource,
    PinnedSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AutoUpdatePlan {
    pub allowed: bool,
    pub reason: Option<BlockReason>,
    pub command: Option<Vec<String>>,
    pub command_text: Option<&'static str>,
}

impl AutoUpdatePlan {
    fn blocked(reason: BlockReason) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
            command: None,
            command_text: None,
        }
    }

    fn run(command: &[&str], command_text: &'static str) -> Self {
        Self {
            allowed: true,
            reason: None,
            command: Some(command.iter().map(|s| s.to_string()).collect()),
            command_text: Some(command_text),
        }
    }
}

pub fn resolve_auto_update_plan(runner: &str, runner_from: &str) -> AutoUpdatePlan {
    let source = runner_from.trim();
    match runner.trim() {
        "uv" => AutoUpdatePlan::blocked(BlockReason::DevRunner),
        "uvx" if source.is_empty() => AutoUpdatePlan::blocked(BlockReason::MissingSource),
        "uvx" if is_pinned_git_source(source) => AutoUpdatePlan::blocked(BlockReason::PinnedSource),
        "uvx" => AutoUpdatePlan::run(
            &["uvx", "--refresh", "--from", source, "codemem", "version"],
            "uvx --refresh --from <source> codemem version",
        ),
        _ => AutoUpdatePlan::run(
            &["uv", "tool", "install", "--upgrade", "codemem"],
            "uv tool install --upgrade codemem",
        ),
    }
}
