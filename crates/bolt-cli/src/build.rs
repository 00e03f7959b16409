use std::{collections::BTreeMap, path::PathBuf};

use bolt_config::config::get_config;
use bolt_core::{
    source::{SourcePackage, Stage},
    source_cache::LocalSourceCache,
    BoltResult,
};
use bolt_utils::{fs::ensure_dir_exists, path::resolve_path};
use nu_ansi_term::Color::{Blue, Cyan, Green, LightRed};
use tracing::info;

use crate::utils::Colored;

pub struct BuildOptions {
    pub work_dir: Option<String>,
    pub stages: Vec<String>,
    pub skip_unpack: bool,
    pub skip_patch: bool,
}

/// Directories handed to every stage script.
struct WorkTree {
    work_dir: PathBuf,
    source_dir: PathBuf,
    build_dir: PathBuf,
    install_dir: PathBuf,
}

impl WorkTree {
    fn new(work_dir: PathBuf) -> Self {
        Self {
            source_dir: work_dir.join("source"),
            build_dir: work_dir.join("build"),
            install_dir: work_dir.join("install"),
            work_dir,
        }
    }

    fn create(&self) -> BoltResult<()> {
        for dir in [
            &self.work_dir,
            &self.source_dir,
            &self.build_dir,
            &self.install_dir,
        ] {
            ensure_dir_exists(dir)?;
        }
        Ok(())
    }

    fn env(&self) -> BTreeMap<String, String> {
        [
            ("BOLT_WORK_DIR", &self.work_dir),
            ("BOLT_SOURCE_DIR", &self.source_dir),
            ("BOLT_BUILD_DIR", &self.build_dir),
            ("BOLT_INSTALL_DIR", &self.install_dir),
        ]
        .into_iter()
        .map(|(key, dir)| (key.to_string(), dir.display().to_string()))
        .collect()
    }
}

fn load_package(descriptor: &str) -> BoltResult<SourcePackage> {
    let path = resolve_path(descriptor)?;
    let package = SourcePackage::from_file(&path)?;

    match get_config().helper_dirs()? {
        Some(dirs) => Ok(package.helper_dirs(dirs)),
        None => Ok(package),
    }
}

pub fn build_package(descriptor: &str, options: BuildOptions) -> BoltResult<()> {
    let stages = options
        .stages
        .iter()
        .map(|stage| stage.parse::<Stage>())
        .collect::<BoltResult<Vec<_>>>()?;

    let package = load_package(descriptor)?;

    let work_dir = match &options.work_dir {
        Some(dir) => resolve_path(dir)?,
        None => resolve_path(&format!("{}-{}", package.name(), package.version()))?,
    };
    let tree = WorkTree::new(work_dir);
    tree.create()?;

    info!(
        "building {} {} in {}",
        Colored(Blue, package.name()),
        Colored(LightRed, package.version()),
        Colored(Cyan, tree.work_dir.display())
    );

    if !options.skip_unpack {
        let cache = LocalSourceCache::from_config(&get_config())?;
        package.unpack(&tree.source_dir, &cache)?;
    }

    if !options.skip_patch {
        package.patch(&tree.source_dir)?;
    }

    let env = tree.env();
    for stage in stages {
        info!("running {} stage", Colored(Cyan, stage));
        package.run_action(stage.as_str(), &env)?;
    }

    info!(
        "{} {} built successfully",
        Colored(Green, package.name()),
        package.version()
    );
    Ok(())
}

pub fn list_dependencies(descriptor: &str) -> BoltResult<()> {
    let package = load_package(descriptor)?;
    let requires = package.build_dependencies();

    if requires.is_empty() {
        info!("{} has no build dependencies", package.name());
        return Ok(());
    }

    for dependency in requires.iter() {
        match &dependency.version {
            Some(version) => info!("{} {}", Colored(Blue, &dependency.name), version),
            None => info!("{}", Colored(Blue, &dependency.name)),
        }
    }
    Ok(())
}
