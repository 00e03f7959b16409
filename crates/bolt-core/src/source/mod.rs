//! Source packages: descriptor model and build orchestration.

mod build;
mod env;

use std::{
    collections::HashMap,
    fmt,
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use bolt_package::{Dependency, DependencySpecification, DescriptorNode, PackageSet};

pub use env::effective_env;

use crate::{error::ErrorContext, BoltError, BoltResult};

/// One of the named build lifecycle steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Prepare,
    Build,
    Install,
    Clean,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Prepare, Stage::Build, Stage::Install, Stage::Clean];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Prepare => "prepare",
            Stage::Build => "build",
            Stage::Install => "install",
            Stage::Clean => "clean",
        }
    }
}

impl FromStr for Stage {
    type Err = BoltError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| BoltError::InvalidAction(s.to_string()))
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A source archive to unpack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFileRef {
    pub archive: String,
    pub subdir: String,
    pub sha256: String,
}

/// A patch to apply, in list order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchRef {
    pub file: PathBuf,
    pub subdir: String,
    /// Strip count, validated to be a non-negative integer.
    pub strip: String,
}

/// A parsed source package and the operations that build it.
#[derive(Debug, Clone)]
pub struct SourcePackage {
    name: String,
    version: String,
    maintainer: String,
    description: String,
    requires: DependencySpecification,
    sources: Vec<SourceFileRef>,
    patches: Vec<PatchRef>,
    rules: HashMap<Stage, String>,
    basedir: PathBuf,
    helper_dirs: Vec<PathBuf>,
    patch_program: Option<PathBuf>,
}

impl SourcePackage {
    /// Builds a source package from a `<source>` descriptor element.
    pub fn new(root: &DescriptorNode) -> BoltResult<Self> {
        if root.tag() != "source" {
            return Err(BoltError::InvalidDescriptor(format!(
                "expected <source> element but got <{}>",
                root.tag()
            )));
        }

        let name = match root.attr("name").map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => {
                return Err(BoltError::InvalidDescriptor(
                    "source package has no name".into(),
                ))
            }
        };

        let description = root
            .child("description")
            .ok_or_else(|| {
                BoltError::InvalidDescriptor(format!("source package '{name}' has no description"))
            })?
            .text_content()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");

        let requires = root
            .child("requires")
            .map(DependencySpecification::from_node)
            .unwrap_or_default();

        let mut patches = Vec::new();
        for patch_set in root.select("patches/patchset") {
            let set_subdir = patch_set.attr_or("subdir", "");
            let set_strip = patch_set.attr_or("strip", "1");

            for file in patch_set.select("file") {
                let src = required_attr(file, "src", &name)?;
                let strip = file.attr_or("strip", set_strip).trim();
                if strip.parse::<u32>().is_err() {
                    return Err(BoltError::InvalidDescriptor(format!(
                        "patch '{src}' has invalid strip count '{strip}'"
                    )));
                }

                patches.push(PatchRef {
                    file: PathBuf::from(src),
                    subdir: file.attr_or("subdir", set_subdir).to_string(),
                    strip: strip.to_string(),
                });
            }
        }

        let mut sources = Vec::new();
        for file in root.select("sources/file") {
            sources.push(SourceFileRef {
                archive: required_attr(file, "src", &name)?.to_string(),
                subdir: file.attr_or("subdir", "").to_string(),
                sha256: file.attr_or("sha256sum", "").trim().to_string(),
            });
        }

        let mut rules = HashMap::new();
        for node in root.select("rules/*") {
            if let Ok(stage) = node.tag().parse::<Stage>() {
                rules.insert(stage, node.text_content());
            }
        }

        Ok(Self {
            version: root.attr_or("version", "").to_string(),
            maintainer: format!(
                "{} <{}>",
                root.attr_or("maintainer", ""),
                root.attr_or("email", "")
            ),
            name,
            description,
            requires,
            sources,
            patches,
            rules,
            basedir: PathBuf::from("."),
            helper_dirs: Self::default_helper_dirs(),
            patch_program: None,
        })
    }

    /// Parses descriptor XML and builds a source package from it.
    pub fn from_xml(text: &str) -> BoltResult<Self> {
        Self::new(&DescriptorNode::parse(text)?)
    }

    /// Reads a descriptor file. Relative patch paths resolve against its
    /// directory.
    pub fn from_file(path: &Path) -> BoltResult<Self> {
        let text =
            fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let basedir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        Ok(Self::from_xml(&text)?.basedir(basedir))
    }

    pub fn basedir(mut self, basedir: impl Into<PathBuf>) -> Self {
        self.basedir = basedir.into();
        self
    }

    pub fn helper_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.helper_dirs = dirs;
        self
    }

    /// Uses `program` instead of looking up `patch` on the search path.
    pub fn patch_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.patch_program = Some(program.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn maintainer(&self) -> &str {
        &self.maintainer
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn sources(&self) -> &[SourceFileRef] {
        &self.sources
    }

    pub fn patches(&self) -> &[PatchRef] {
        &self.patches
    }

    /// Rule body of `stage`, empty when the descriptor has none.
    pub fn rule(&self, stage: Stage) -> &str {
        self.rules.get(&stage).map(String::as_str).unwrap_or("")
    }

    pub fn build_dependencies(&self) -> &DependencySpecification {
        &self.requires
    }

    pub fn missing_build_dependencies<'a>(&'a self, packages: &dyn PackageSet) -> Vec<&'a Dependency> {
        self.requires.unfulfilled(packages)
    }
}

fn required_attr<'a>(node: &'a DescriptorNode, attr: &str, package: &str) -> BoltResult<&'a str> {
    match node.attr(attr).map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => {
            Err(BoltError::InvalidDescriptor(format!(
                "<{}> entry of '{package}' is missing the '{attr}' attribute",
                node.tag()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) const DESCRIPTOR: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<source name="hello" version="2.12-1" maintainer="Jane Doe" email="jane@example.org">
    <description>
        <summary>GNU hello</summary>
    </description>
    <requires>
        <package name="make"/>
        <package name="gcc" version=">= 9.0"/>
    </requires>
    <sources>
        <file src="hello-2.12.tar.gz" sha256sum="abc123"/>
        <file src="hello.debdiff.gz" subdir="debian"/>
    </sources>
    <patches>
        <patchset subdir="src">
            <file src="patches/one.patch"/>
            <file src="patches/two.patch" strip="0" subdir="lib"/>
        </patchset>
        <patchset>
            <file src="/abs/three.patch"/>
        </patchset>
    </patches>
    <rules>
        <prepare>./configure --prefix=/usr</prepare>
        <build>make</build>
        <deploy>scp it somewhere</deploy>
    </rules>
</source>
"#;

    #[test]
    fn test_parse_fields() {
        let pkg = SourcePackage::from_xml(DESCRIPTOR).unwrap();
        assert_eq!(pkg.name(), "hello");
        assert_eq!(pkg.version(), "2.12-1");
        assert_eq!(pkg.maintainer(), "Jane Doe <jane@example.org>");
        assert_eq!(pkg.description(), "GNU hello");
        assert_eq!(pkg.build_dependencies().iter().count(), 2);

        assert_eq!(
            pkg.sources(),
            &[
                SourceFileRef {
                    archive: "hello-2.12.tar.gz".into(),
                    subdir: "".into(),
                    sha256: "abc123".into(),
                },
                SourceFileRef {
                    archive: "hello.debdiff.gz".into(),
                    subdir: "debian".into(),
                    sha256: "".into(),
                },
            ]
        );
    }

    #[test]
    fn test_patchset_defaults_and_overrides() {
        let pkg = SourcePackage::from_xml(DESCRIPTOR).unwrap();
        let patches = pkg.patches();
        assert_eq!(patches.len(), 3);
        assert_eq!((patches[0].subdir.as_str(), patches[0].strip.as_str()), ("src", "1"));
        assert_eq!((patches[1].subdir.as_str(), patches[1].strip.as_str()), ("lib", "0"));
        assert_eq!((patches[2].subdir.as_str(), patches[2].strip.as_str()), ("", "1"));
    }

    #[test]
    fn test_rules_ignore_unknown_tags() {
        let pkg = SourcePackage::from_xml(DESCRIPTOR).unwrap();
        assert_eq!(pkg.rule(Stage::Prepare), "./configure --prefix=/usr");
        assert_eq!(pkg.rule(Stage::Build), "make");
        assert_eq!(pkg.rule(Stage::Install), "");
        assert_eq!(pkg.rule(Stage::Clean), "");
    }

    #[test]
    fn test_missing_build_dependencies() {
        let pkg = SourcePackage::from_xml(DESCRIPTOR).unwrap();
        let mut installed = HashMap::new();
        installed.insert("make".to_string(), "4.3".to_string());

        let missing = pkg.missing_build_dependencies(&installed);
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].name, "gcc");
    }

    #[test]
    fn test_rejects_wrong_root() {
        let err = SourcePackage::from_xml("<binary name=\"x\"><description/></binary>").unwrap_err();
        assert!(matches!(err, BoltError::InvalidDescriptor(_)));
    }

    #[test]
    fn test_rejects_missing_description() {
        let err = SourcePackage::from_xml("<source name=\"x\"/>").unwrap_err();
        assert!(matches!(err, BoltError::InvalidDescriptor(_)));
    }

    #[test]
    fn test_rejects_bad_strip() {
        let xml = r#"<source name="x"><description/>
            <patches><patchset strip="one"><file src="a.patch"/></patchset></patches>
        </source>"#;
        let err = SourcePackage::from_xml(xml).unwrap_err();
        assert!(err.to_string().contains("invalid strip count"));
    }

    #[test]
    fn test_stage_parse() {
        assert_eq!("install".parse::<Stage>().unwrap(), Stage::Install);
        assert!(matches!(
            "deploy".parse::<Stage>(),
            Err(BoltError::InvalidAction(_))
        ));
    }

    #[test]
    fn test_from_file_sets_basedir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.xml");
        fs::write(&path, DESCRIPTOR).unwrap();

        let pkg = SourcePackage::from_file(&path).unwrap();
        assert_eq!(pkg.basedir, dir.path());
    }
}
