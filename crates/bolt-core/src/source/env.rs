use std::collections::BTreeMap;

use bolt_utils::system::{build_flags, num_cpus};

use super::SourcePackage;

impl SourcePackage {
    /// Prefix of ambient variables passed through to build stages.
    pub const ENV_PREFIX: &'static str = "BOLT_";

    /// Ambient variables passed through regardless of prefix.
    pub const ENV_PASSTHROUGH: [&'static str; 3] = ["PATH", "USER", "USERNAME"];

    /// Per-invocation directories that must come from the caller, never from
    /// the ambient environment.
    pub const ENV_EXCLUDED: [&'static str; 4] = [
        "BOLT_WORK_DIR",
        "BOLT_SOURCE_DIR",
        "BOLT_BUILD_DIR",
        "BOLT_INSTALL_DIR",
    ];

    pub const DEFAULT_PATH: &'static str = "/bin:/sbin:/usr/bin:/usr/sbin:/usr/local/bin";

    fn inherits(name: &str) -> bool {
        !Self::ENV_EXCLUDED.contains(&name)
            && (name.starts_with(Self::ENV_PREFIX) || Self::ENV_PASSTHROUGH.contains(&name))
    }
}

/// Job count hint for a machine with `cpus` logical CPUs.
pub(super) fn parallel_jobs(cpus: usize) -> usize {
    (cpus as f64 * 1.5).round() as usize
}

/// Computes the environment a build stage runs with.
///
/// Starts from the caller supplied `env`, overlays the platform build flags and
/// `BOLT_PARALLEL_JOBS`, then copies in the allowed subset of `ambient`. `PATH`
/// falls back to [`SourcePackage::DEFAULT_PATH`].
pub fn effective_env<I>(env: &BTreeMap<String, String>, ambient: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut effective = env.clone();

    effective.extend(
        build_flags()
            .into_iter()
            .map(|(key, value)| (key.to_string(), value)),
    );
    effective.insert(
        "BOLT_PARALLEL_JOBS".to_string(),
        parallel_jobs(num_cpus()).to_string(),
    );

    effective.extend(
        ambient
            .into_iter()
            .filter(|(key, _)| SourcePackage::inherits(key)),
    );

    effective
        .entry("PATH".to_string())
        .or_insert_with(|| SourcePackage::DEFAULT_PATH.to_string());

    effective
}
