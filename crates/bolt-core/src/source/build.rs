use std::{
    collections::BTreeMap,
    env,
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    process::{Command, Stdio},
    sync::LazyLock,
};

use bolt_package::archive;
use bolt_utils::{fs::ensure_dir_exists, system::find_executable};
use regex::Regex;
use tracing::{debug, info};

use super::{effective_env, SourcePackage, Stage};
use crate::{error::ErrorContext, source_cache::SourceCache, BoltError, BoltResult};

static DEBDIFF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.*?\.debdiff)\.(?:gz|xz|bz2)$").expect("unable to compile debdiff regex")
});

impl SourcePackage {
    /// Helper scripts prepended to every stage script, in this order.
    pub const HELPER_SCRIPTS: [&'static str; 2] = ["arch.sh", "python.sh"];

    /// System wide helper directories, searched after the one next to the
    /// executable.
    pub const SYSTEM_HELPER_DIRS: [&'static str; 2] = [
        "/usr/share/bolt-pack/helpers",
        "/tools/share/bolt-pack/helpers",
    ];

    /// Shell that runs stage scripts.
    pub const SHELL: &'static str = "/bin/sh";

    pub(super) fn default_helper_dirs() -> Vec<PathBuf> {
        let bundled = env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|bin| bin.join("../share/bolt-pack/helpers")));

        bundled
            .into_iter()
            .chain(Self::SYSTEM_HELPER_DIRS.iter().map(PathBuf::from))
            .collect()
    }

    /// Unpacks every source archive below `source_dir`.
    ///
    /// Compressed `*.debdiff` files are decompressed as is; anything else is
    /// extracted as a tarball with its top level directory stripped.
    pub fn unpack(&self, source_dir: &Path, cache: &dyn SourceCache) -> BoltResult<()> {
        for source in &self.sources {
            let archive_file =
                cache.find_and_retrieve(&self.name, &self.version, &source.archive, &source.sha256)?;

            let dest = subdir_of(source_dir, &source.subdir);
            ensure_dir_exists(&dest)?;

            let archive_file = match archive_file {
                Some(path) if path.is_file() => path,
                _ => return Err(BoltError::MissingSource(source.archive.clone())),
            };

            info!("unpacking {}", archive_file.display());

            let base_name = archive_file
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();

            if let Some(caps) = DEBDIFF_RE.captures(&base_name) {
                let out = dest.join(&caps[1]);
                if archive::decompress_to_file(&archive_file, &out)? == 0 {
                    debug!("{} is empty, skipping", archive_file.display());
                }
            } else {
                archive::extract_tarball(&archive_file, &dest, 1)?;
            }
        }

        Ok(())
    }

    /// Applies all patches in order, stopping at the first one that fails.
    pub fn patch(&self, source_dir: &Path) -> BoltResult<()> {
        let patch = match &self.patch_program {
            Some(program) => program.clone(),
            None => {
                find_executable("patch")
                    .ok_or_else(|| BoltError::MissingExecutable("patch".into()))?
            }
        };

        flush_output();

        for patch_ref in &self.patches {
            let patch_name = patch_ref
                .file
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| patch_ref.file.display().to_string());

            let patch_file = if patch_ref.file.is_absolute() {
                patch_ref.file.clone()
            } else {
                self.basedir.join(&patch_ref.file)
            };

            info!("applying {}", patch_name);

            let target = subdir_of(source_dir, &patch_ref.subdir);
            let status = Command::new(&patch)
                .arg("-f")
                .arg(format!("-p{}", patch_ref.strip))
                .arg("-d")
                .arg(&target)
                .arg("-i")
                .arg(&patch_file)
                .stderr(Stdio::from(io::stdout()))
                .status()
                .with_context(|| format!("executing {}", patch.display()))?;

            if !status.success() {
                return Err(BoltError::PatchFailed {
                    patch: patch_name,
                });
            }
        }

        Ok(())
    }

    /// Runs the rule of `action` in a strict mode shell.
    ///
    /// `env` must carry the per-invocation directories (`BOLT_WORK_DIR` and
    /// friends); see [`effective_env`] for how the rest is assembled.
    pub fn run_action(&self, action: &str, env: &BTreeMap<String, String>) -> BoltResult<()> {
        let stage: Stage = action.parse()?;

        let ambient = std::env::vars_os()
            .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)));
        let env = effective_env(env, ambient);
        let script = format!("{}\n{}", self.load_helpers()?, self.rule(stage));

        flush_output();

        debug!("running {} stage of {}", stage, self.name);

        let mut child = Command::new(Self::SHELL)
            .args(["-e", "-x", "-s"])
            .env_clear()
            .envs(&env)
            .stdin(Stdio::piped())
            .stderr(Stdio::from(io::stdout()))
            .spawn()
            .with_context(|| format!("spawning {}", Self::SHELL))?;

        if let Some(mut stdin) = child.stdin.take() {
            match stdin.write_all(script.as_bytes()) {
                Err(err) if err.kind() != io::ErrorKind::BrokenPipe => {
                    let _ = child.wait();
                    return Err(err).with_context(|| format!("writing {stage} script"));
                }
                _ => {}
            }
        }

        let status = child
            .wait()
            .with_context(|| format!("waiting for {stage} stage"))?;

        if !status.success() {
            return Err(BoltError::ActionFailed {
                action: stage.to_string(),
            });
        }

        Ok(())
    }

    /// Concatenates the first file found for each helper script name.
    pub fn load_helpers(&self) -> BoltResult<String> {
        let mut helpers = Vec::new();

        for script in Self::HELPER_SCRIPTS {
            let found = self
                .helper_dirs
                .iter()
                .map(|dir| dir.join(script))
                .find(|path| path.is_file());

            if let Some(path) = found {
                debug!("loading helper {}", path.display());
                helpers.push(
                    fs::read_to_string(&path)
                        .with_context(|| format!("reading helper {}", path.display()))?,
                );
            }
        }

        Ok(helpers.join("\n"))
    }
}

fn subdir_of(base: &Path, subdir: &str) -> PathBuf {
    let subdir = subdir.trim_start_matches('/');
    if subdir.is_empty() {
        base.to_path_buf()
    } else {
        base.join(subdir)
    }
}

fn flush_output() {
    let _ = io::stdout().flush();
    let _ = io::stderr().flush();
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, os::unix::fs::PermissionsExt};

    use serial_test::serial;

    use super::*;
    use crate::test_utils::{gzip_bytes, tarball};

    struct MapCache(HashMap<String, PathBuf>);

    impl SourceCache for MapCache {
        fn find_and_retrieve(
            &self,
            _name: &str,
            _version: &str,
            archive: &str,
            _sha256: &str,
        ) -> BoltResult<Option<PathBuf>> {
            Ok(self.0.get(archive).cloned())
        }
    }

    fn package(xml_body: &str) -> SourcePackage {
        SourcePackage::from_xml(&format!(
            r#"<source name="hello" version="1.0"><description>hi</description>{xml_body}</source>"#
        ))
        .unwrap()
        .helper_dirs(Vec::new())
    }

    #[test]
    fn test_unpack_strips_one_component() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("hello-1.0.tar.gz");
        fs::write(
            &archive,
            gzip_bytes(&tarball(&[
                ("hello-1.0/configure", b"#!/bin/sh\n"),
                ("hello-1.0/src/hello.c", b"int main;\n"),
            ])),
        )
        .unwrap();

        let cache = MapCache(HashMap::from([("hello-1.0.tar.gz".to_string(), archive)]));
        let pkg = package(r#"<sources><file src="hello-1.0.tar.gz"/></sources>"#);

        let src = dir.path().join("src");
        pkg.unpack(&src, &cache).unwrap();

        assert!(src.join("configure").is_file());
        assert!(src.join("src/hello.c").is_file());
        assert!(!src.join("hello-1.0").exists());
    }

    #[test]
    fn test_unpack_debdiff_passthrough() {
        let dir = tempfile::tempdir().unwrap();
        let diff = dir.path().join("foo.debdiff.gz");
        fs::write(&diff, gzip_bytes(b"--- a/x\n+++ b/x\n")).unwrap();
        let empty = dir.path().join("empty.debdiff.gz");
        fs::write(&empty, gzip_bytes(b"")).unwrap();

        let cache = MapCache(HashMap::from([
            ("foo.debdiff.gz".to_string(), diff),
            ("empty.debdiff.gz".to_string(), empty),
        ]));
        let pkg = package(
            r#"<sources>
                <file src="foo.debdiff.gz" subdir="debian"/>
                <file src="empty.debdiff.gz" subdir="debian"/>
            </sources>"#,
        );

        let src = dir.path().join("src");
        pkg.unpack(&src, &cache).unwrap();

        let entries: Vec<_> = fs::read_dir(src.join("debian"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec!["foo.debdiff"]);
        assert_eq!(
            fs::read(src.join("debian/foo.debdiff")).unwrap(),
            b"--- a/x\n+++ b/x\n"
        );
    }

    #[test]
    fn test_unpack_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let pkg = package(r#"<sources><file src="gone.tar.xz" subdir="sub"/></sources>"#);

        let err = pkg
            .unpack(dir.path(), &MapCache(HashMap::new()))
            .unwrap_err();
        assert!(matches!(err, BoltError::MissingSource(ref name) if name == "gone.tar.xz"));
        assert!(dir.path().join("sub").is_dir());
    }

    fn fake_patch(dir: &Path) -> (PathBuf, PathBuf) {
        let log = dir.join("patch.log");
        let program = dir.join("fake-patch");
        fs::write(
            &program,
            format!(
                "#!/bin/sh\necho \"$@\" >> '{}'\ncase \"$6\" in *bad*) exit 1;; esac\n",
                log.display()
            ),
        )
        .unwrap();
        fs::set_permissions(&program, fs::Permissions::from_mode(0o755)).unwrap();
        (program, log)
    }

    #[test]
    #[serial]
    fn test_patch_order_and_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let (program, log) = fake_patch(dir.path());

        let pkg = package(
            r#"<patches>
                <patchset subdir="lib" strip="2"><file src="patches/one.patch"/></patchset>
                <patchset><file src="/abs/two.patch"/></patchset>
            </patches>"#,
        )
        .basedir(dir.path())
        .patch_program(&program);

        let src = dir.path().join("src");
        pkg.patch(&src).unwrap();

        let log = fs::read_to_string(log).unwrap();
        let lines: Vec<_> = log.lines().collect();
        assert_eq!(
            lines,
            vec![
                format!(
                    "-f -p2 -d {} -i {}",
                    src.join("lib").display(),
                    dir.path().join("patches/one.patch").display()
                ),
                format!("-f -p1 -d {} -i /abs/two.patch", src.display()),
            ]
        );
    }

    #[test]
    #[serial]
    fn test_patch_failure_aborts_and_names_patch() {
        let dir = tempfile::tempdir().unwrap();
        let (program, log) = fake_patch(dir.path());

        let pkg = package(
            r#"<patches><patchset>
                <file src="good.patch"/>
                <file src="bad.patch"/>
                <file src="after.patch"/>
            </patchset></patches>"#,
        )
        .basedir(dir.path())
        .patch_program(&program);

        let err = pkg.patch(dir.path()).unwrap_err();
        assert!(matches!(err, BoltError::PatchFailed { ref patch } if patch == "bad.patch"));

        let log = fs::read_to_string(log).unwrap();
        assert_eq!(log.lines().count(), 2);
        assert!(!log.contains("after.patch"));
    }

    #[test]
    fn test_run_action_rejects_unknown_stage() {
        let pkg = package("");
        let err = pkg.run_action("deploy", &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, BoltError::InvalidAction(ref a) if a == "deploy"));
    }

    #[test]
    #[serial]
    fn test_run_action_with_helpers_and_env() {
        let dir = tempfile::tempdir().unwrap();
        let helpers = dir.path().join("helpers");
        fs::create_dir_all(&helpers).unwrap();
        fs::write(helpers.join("arch.sh"), "bolt_arch() { echo tested-arch; }\n").unwrap();

        let out = dir.path().join("out");
        let pkg = package(
            r#"<rules><build>bolt_arch &gt; "$BOLT_WORK_DIR/out"
echo "$BOLT_PARALLEL_JOBS" &gt;&gt; "$BOLT_WORK_DIR/out"</build></rules>"#,
        )
        .helper_dirs(vec![dir.path().join("missing"), helpers]);

        let mut env = BTreeMap::new();
        env.insert(
            "BOLT_WORK_DIR".to_string(),
            dir.path().display().to_string(),
        );
        pkg.run_action("build", &env).unwrap();

        let output = fs::read_to_string(out).unwrap();
        let mut lines = output.lines();
        assert_eq!(lines.next(), Some("tested-arch"));
        assert!(lines.next().unwrap().parse::<usize>().unwrap() >= 2);
    }

    #[test]
    #[serial]
    fn test_run_action_failure_names_stage() {
        let pkg = package("<rules><install>false</install></rules>");
        let err = pkg.run_action("install", &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, BoltError::ActionFailed { ref action } if action == "install"));
    }

    #[test]
    #[serial]
    fn test_run_action_empty_rule_succeeds() {
        let pkg = package("");
        pkg.run_action("clean", &BTreeMap::new()).unwrap();
    }

    #[test]
    fn test_load_helpers_first_match_wins() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first");
        let second = dir.path().join("second");
        fs::create_dir_all(&first).unwrap();
        fs::create_dir_all(&second).unwrap();
        fs::write(first.join("arch.sh"), "A1").unwrap();
        fs::write(second.join("arch.sh"), "A2").unwrap();
        fs::write(second.join("python.sh"), "P2").unwrap();

        let pkg = package("").helper_dirs(vec![first, second]);
        assert_eq!(pkg.load_helpers().unwrap(), "A1\nP2");
    }
}
