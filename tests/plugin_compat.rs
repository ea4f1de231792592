// tests/plugin_compat.rs
//
// Upgrade guidance and auto-update planning for the editor plugin runner.

use serde_json::json;

use codemem_viewer::plugin::compat::{
    resolve_auto_update_plan, resolve_upgrade_guidance, BlockReason, GuidanceMode,
};

const GIT_SOURCE: &str = "git+https://github.com/kunickiaj/codemem.git";

#[test]
fn guidance_by_runner() {
    let g = resolve_upgrade_guidance("uv", "/tmp/codemem");
    assert_eq!(g.mode, GuidanceMode::UvDev);
    assert!(g.action.contains("uv sync"));

    let g = resolve_upgrade_guidance("uvx", GIT_SOURCE);
    assert_eq!(g.mode, GuidanceMode::UvxGit);
    assert!(g.action.contains("CODEMEM_RUNNER_FROM"));

    assert_eq!(resolve_upgrade_guidance("uvx", "./local/dist").mode, GuidanceMode::UvxCustom);

    let g = resolve_upgrade_guidance("node", "");
    assert_eq!(g.mode, GuidanceMode::Generic);
    assert!(g.action.contains("uv tool install --upgrade codemem"));

    // modes go over the wire in kebab-case
    assert_eq!(serde_json::to_value(GuidanceMode::UvxGit).unwrap(), json!("uvx-git"));
}

#[test]
fn dev_runner_and_missing_source_are_blocked() {
    let plan = resolve_auto_update_plan("uv", "/tmp/codemem");
    assert!(!plan.allowed);
    assert_eq!(plan.reason, Some(BlockReason::DevRunner));

    let plan = resolve_auto_update_plan("uvx", "  ");
    assert!(!plan.allowed);
    assert_eq!(plan.reason, Some(BlockReason::MissingSource));
    assert_eq!(serde_json::to_value(plan.reason).unwrap(), json!("missing-source"));
}

#[test]
fn unpinned_git_source_refreshes() {
    let plan = resolve_auto_update_plan("uvx", GIT_SOURCE);
    assert!(plan.allowed);
    assert_eq!(
        plan.command.unwrap(),
        vec!["uvx", "--refresh", "--from", GIT_SOURCE, "codemem", "version"]
    );
    assert_eq!(plan.command_text, Some("uvx --refresh --from <source> codemem version"));

    for source in [
        "git+ssh://git@github.com/kunickiaj/codemem.git",
        "git+https://github.com/kunickiaj/codemem.git?subdirectory=plugin",
    ] {
        assert!(resolve_auto_update_plan("uvx", source).allowed, "{source}");
    }
}

#[test]
fn pinned_git_sources_are_blocked() {
    for source in [
        "git+https://github.com/kunickiaj/codemem.git@v0.14.0",
        "git+ssh://git@github.com/kunickiaj/codemem.git@v0.14.1",
        "git+https://github.com/kunickiaj/codemem.git@v0.14.1#egg=codemem",
    ] {
        let plan = resolve_auto_update_plan("uvx", source);
        assert!(!plan.allowed, "{source}");
        assert_eq!(plan.reason, Some(BlockReason::PinnedSource), "{source}");
    }
}

#[test]
fn other_runners_use_tool_install() {
    let plan = resolve_auto_update_plan("codemem", "");
    assert!(plan.allowed);
    assert_eq!(
        plan.command.unwrap(),
        vec!["uv", "tool", "install", "--upgrade", "codemem"]
    );
}
