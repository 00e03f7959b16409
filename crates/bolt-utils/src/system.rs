use std::{
    env,
    ffi::OsStr,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};

/// Retrieves the platform string in the format `ARCH-Os`.
pub fn platform() -> String {
    format!(
        "{}-{}{}",
        env::consts::ARCH,
        &env::consts::OS[..1].to_uppercase(),
        &env::consts::OS[1..]
    )
}

/// Number of logical CPUs available to this process, at least 1.
pub fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Compiler and linker flags exported into every build stage.
pub fn build_flags() -> Vec<(&'static str, String)> {
    let cflags = "-g -O2 -fstack-protector-strong -Wformat -Werror=format-security".to_string();

    vec![
        ("CFLAGS", cflags.clone()),
        ("CXXFLAGS", cflags),
        ("CPPFLAGS", "-D_FORTIFY_SOURCE=2".to_string()),
        ("LDFLAGS", "-Wl,-z,relro -Wl,-z,now".to_string()),
    ]
}

/// Locates an executable by name on `$PATH`.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    find_executable_in(name, env::var_os("PATH")?.as_os_str())
}

/// Locates an executable by name on the given colon separated search path.
///
/// Names containing a slash are checked as-is.
pub fn find_executable_in(name: &str, search_path: &OsStr) -> Option<PathBuf> {
    if name.contains('/') {
        let candidate = PathBuf::from(name);
        return is_executable(&candidate).then_some(candidate);
    }

    env::split_paths(search_path)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn test_platform() {
        #[cfg(target_arch = "x86_64")]
        #[cfg(target_os = "linux")]
        assert_eq!(platform(), "x86_64-Linux");

        #[cfg(target_arch = "aarch64")]
        #[cfg(target_os = "linux")]
        assert_eq!(platform(), "aarch64-Linux");
    }

    #[test]
    fn test_num_cpus_positive() {
        assert!(num_cpus() >= 1);
    }

    #[test]
    fn test_build_flags_contains_cflags() {
        let flags = build_flags();
        assert!(flags.iter().any(|(k, _)| *k == "CFLAGS"));
        assert!(flags.iter().any(|(k, _)| *k == "LDFLAGS"));
    }

    #[test]
    fn test_find_executable_in() {
        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("mytool");
        fs::write(&tool, "#!/bin/sh\n").unwrap();

        let search = OsStr::new(dir.path().as_os_str());
        assert_eq!(find_executable_in("mytool", search), None);

        fs::set_permissions(&tool, fs::Permissions::from_mode(0o755)).unwrap();
        assert_eq!(find_executable_in("mytool", search), Some(tool.clone()));
        assert_eq!(find_executable_in("missing", search), None);
        assert_eq!(
            find_executable_in(tool.to_str().unwrap(), OsStr::new("")),
            Some(tool)
        );
    }
}
