//! Helpers shared with the editor plugin: backend compatibility checks,
//! injection toasts and working-set arguments for `codemem pack`.

pub mod compat;
pub mod toast;
pub mod working_set;

pub use compat::{
    is_version_at_least, parse_backend_update_policy, parse_semver, resolve_auto_update_plan,
    resolve_upgrade_guidance, AutoUpdatePlan, UpdatePolicy, UpgradeGuidance,
};
pub use toast::build_injection_toast_message;
pub use working_set::{append_working_set_file_args, extract_apply_patch_paths};
