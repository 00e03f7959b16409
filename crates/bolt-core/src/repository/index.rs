use std::{cmp::Ordering, collections::BTreeMap};

use bolt_package::ControlMetadata;
use tracing::trace;

/// Total ordering over version strings.
pub type VersionComparator = dyn Fn(&str, &str) -> Ordering + Send + Sync;

/// Package name to version to control block.
///
/// At most one record exists per (name, version). Records without `Package`
/// and `Version` fields are never stored.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RepositoryIndex {
    packages: BTreeMap<String, BTreeMap<String, ControlMetadata>>,
}

impl RepositoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses the text of a published index. Later records replace earlier ones
    /// with the same name and version.
    pub fn parse(text: &str) -> Self {
        let mut index = Self::new();

        for paragraph in ControlMetadata::paragraphs(text) {
            match ControlMetadata::parse(paragraph) {
                Ok(metadata) => {
                    if !index.insert(metadata) {
                        trace!("discarding index record without name or version");
                    }
                }
                Err(err) => trace!("discarding unparsable index record: {}", err),
            }
        }

        index
    }

    fn key(metadata: &ControlMetadata) -> Option<(String, String)> {
        Some((
            metadata.package()?.to_string(),
            metadata.version()?.to_string(),
        ))
    }

    /// Inserts or replaces a record. Returns false if it lacks name or version.
    pub fn insert(&mut self, metadata: ControlMetadata) -> bool {
        let Some((name, version)) = Self::key(&metadata) else {
            return false;
        };
        self.packages.entry(name).or_default().insert(version, metadata);
        true
    }

    /// Inserts a record unless one with the same name and version exists.
    /// Returns true if the record was stored.
    pub fn insert_if_absent(&mut self, metadata: ControlMetadata) -> bool {
        let Some((name, version)) = Self::key(&metadata) else {
            return false;
        };
        let versions = self.packages.entry(name).or_default();
        if versions.contains_key(&version) {
            return false;
        }
        versions.insert(version, metadata);
        true
    }

    pub fn contains(&self, name: &str, version: &str) -> bool {
        self.get(name, version).is_some()
    }

    pub fn get(&self, name: &str, version: &str) -> Option<&ControlMetadata> {
        self.packages.get(name)?.get(version)
    }

    /// Keeps only the records for which `keep` returns true. Returns the number
    /// of records removed.
    pub fn retain<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(&ControlMetadata) -> bool,
    {
        let before = self.len();
        for versions in self.packages.values_mut() {
            versions.retain(|_, metadata| keep(metadata));
        }
        self.packages.retain(|_, versions| !versions.is_empty());
        before - self.len()
    }

    pub fn len(&self) -> usize {
        self.packages.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Records ordered by package name, then by version using `compare`.
    ///
    /// Versions that `compare` considers equal, such as `1.0` and `1.00`, are
    /// ordered by their text so the output never depends on insertion order.
    pub fn sorted(&self, compare: &VersionComparator) -> Vec<&ControlMetadata> {
        self.packages
            .values()
            .flat_map(|versions| {
                let mut records: Vec<_> = versions.iter().collect();
                records.sort_by(|(a, _), (b, _)| {
                    compare(a.as_str(), b.as_str()).then_with(|| a.cmp(b))
                });
                records.into_iter().map(|(_, metadata)| metadata)
            })
            .collect()
    }

    /// Serializes all records, separated by blank lines.
    pub fn serialize(&self, compare: &VersionComparator) -> String {
        self.sorted(compare)
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use bolt_package::compare_versions;

    use super::*;

    fn record(name: &str, version: &str, filename: &str) -> ControlMetadata {
        let mut metadata = ControlMetadata::new();
        metadata.set("Package", name);
        metadata.set("Version", version);
        metadata.set("Filename", filename);
        metadata
    }

    #[test]
    fn test_first_seen_wins() {
        let mut index = RepositoryIndex::new();
        assert!(index.insert_if_absent(record("a", "1.0", "first")));
        assert!(!index.insert_if_absent(record("a", "1.0", "second")));
        assert_eq!(index.get("a", "1.0").unwrap().filename(), Some("first"));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_records_without_key_rejected() {
        let mut index = RepositoryIndex::new();
        let mut metadata = ControlMetadata::new();
        metadata.set("Package", "a");
        assert!(!index.insert(metadata.clone()));
        assert!(!index.insert_if_absent(metadata));
        assert!(index.is_empty());
    }

    #[test]
    fn test_sorted_by_name_then_version() {
        let mut index = RepositoryIndex::new();
        for (name, version) in [("b", "1.0"), ("a", "2.0"), ("a", "1.2~rc1"), ("a", "1.0")] {
            index.insert(record(name, version, "x"));
        }

        let order: Vec<_> = index
            .sorted(&compare_versions)
            .into_iter()
            .map(|m| format!("{}={}", m.package().unwrap(), m.version().unwrap()))
            .collect();
        assert_eq!(order, vec!["a=1.0", "a=1.2~rc1", "a=2.0", "b=1.0"]);
    }

    #[test]
    fn test_parse_round_trip_and_discard() {
        let text = "Package: a\nVersion: 1.0\nFilename: pool/a\n\nVersion: 3.0\n\nPackage: b\nVersion: 2.0\nFilename: pool/b\n";
        let index = RepositoryIndex::parse(text);
        assert_eq!(index.len(), 2);
        assert!(index.contains("a", "1.0"));
        assert!(index.contains("b", "2.0"));

        let published = index.serialize(&compare_versions);
        assert_eq!(RepositoryIndex::parse(&published), index);
    }

    #[test]
    fn test_equal_versions_serialize_deterministically() {
        let text = "Package: a\nVersion: 1.00\n\nPackage: a\nVersion: 01.0\n\nPackage: a\nVersion: 1.000\n\nPackage: a\nVersion: 1.0\n";
        let expected = RepositoryIndex::parse(text).serialize(&compare_versions);

        for _ in 0..50 {
            assert_eq!(RepositoryIndex::parse(text).serialize(&compare_versions), expected);
        }

        let versions: Vec<_> = expected
            .lines()
            .filter_map(|line| line.strip_prefix("Version: "))
            .collect();
        assert_eq!(versions, vec!["01.0", "1.0", "1.00", "1.000"]);
    }

    #[test]
    fn test_tie_break_with_custom_comparator() {
        let mut index = RepositoryIndex::new();
        for version in ["b", "c", "a"] {
            index.insert(record("x", version, "f"));
        }

        let order: Vec<_> = index
            .sorted(&|_: &str, _: &str| Ordering::Equal)
            .into_iter()
            .filter_map(|m| m.version())
            .collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_retain_drops_empty_names() {
        let mut index = RepositoryIndex::new();
        index.insert(record("a", "1.0", "keep"));
        index.insert(record("b", "2.0", "drop"));

        let removed = index.retain(|m| m.filename() == Some("keep"));
        assert_eq!(removed, 1);
        assert!(index.contains("a", "1.0"));
        assert!(!index.contains("b", "2.0"));
        assert_eq!(index.sorted(&compare_versions).len(), 1);
    }
}
