//! Default configuration values

use serde_json::Value;

use super::types::Config;

/// Default configuration file name (TOML)
pub const DEFAULT_CONFIG_TOML: &str = "monopub.toml";

/// Default configuration file name (YAML)
pub const DEFAULT_CONFIG_YAML: &str = "monopub.yaml";

/// Key of the configuration object inside the workspace root package.json
pub const MANIFEST_CONFIG_KEY: &str = "monopub";

/// Default packages directory
pub const DEFAULT_PACKAGES_DIR: &str = "packages";

/// Default build script
pub const DEFAULT_BUILD_SCRIPT: &str = "build";

/// Default release script added by `init`
pub const DEFAULT_RELEASE_SCRIPT: &str = "release";

/// Default report file
pub const DEFAULT_REPORT: &str = "versions.md";

/// Prefix of every release commit message; commits carrying it never make a package dirty
pub const RELEASE_COMMIT_MARKER: &str = "monopub release:";

/// Get list of config file names to search for
pub fn config_file_names() -> Vec<&'static str> {
    vec![
        DEFAULT_CONFIG_TOML,
        DEFAULT_CONFIG_YAML,
        ".monopub.toml",
        ".monopub.yaml",
    ]
}

/// Generate default configuration TOML
pub fn default_config_toml() -> String {
    toml::to_string_pretty(&Config::default()).unwrap_or_else(|_| DEFAULT_CONFIG_TEMPLATE.to_string())
}

/// Default configuration as the JSON object `init` writes into package.json
pub fn default_manifest_config() -> Value {
    serde_json::to_value(Config::default()).unwrap_or(Value::Null)
}

/// Default configuration template
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# monopub configuration

packages_dir = "packages"
include_descendants = false
excludes = []
build = true
build_script = "build"
release_script = "release"
release_kind = "patch"
git_tag = false
report = "versions.md"
publish_args = []
force = false
dry_run = false
"#;
