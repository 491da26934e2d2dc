//! Classification of installed files into the package model.
//!
//! Every file listed in the install manifest becomes exactly one of: package
//! data of the deepest package whose directory contains it, a declared
//! standalone module, a declared script, or a loose data file keyed by its
//! parent directory.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::core::errors::ShimError;
use crate::util::fs::{normalize_path, to_unix_path, unix_parent};

/// Package directory prefixes, longest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackagePrefixes {
    entries: Vec<(String, String)>,
}

impl PackagePrefixes {
    /// Build from resolved package directories.
    ///
    /// Declared packages missing from `package_dir` use their dotted name with
    /// dots turned into slashes.
    pub fn new(package_dir: &BTreeMap<String, String>, packages: &[String]) -> Self {
        let mut entries: Vec<(String, String)> = package_dir
            .iter()
            .filter(|(package, _)| !package.is_empty())
            .map(|(package, dir)| (dir.replace('.', "/"), package.clone()))
            .collect();

        for package in packages {
            if !package_dir.contains_key(package) {
                entries.push((package.replace('.', "/"), package.clone()));
            }
        }

        // Stable sort keeps ties in declaration order.
        entries.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        entries.dedup();
        PackagePrefixes { entries }
    }

    /// The deepest package containing `path`, with the path inside it.
    pub fn find<'a>(&self, path: &'a str) -> Option<(&str, &'a str)> {
        self.entries.iter().find_map(|(prefix, package)| {
            let rest = path.strip_prefix(prefix.as_str())?.strip_prefix('/')?;
            Some((package.as_str(), rest))
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(p, k)| (p.as_str(), k.as_str()))
    }
}

/// Buckets produced from an install manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    /// Package name -> file paths relative to the package directory
    pub package_data: BTreeMap<String, Vec<String>>,

    /// Declared module -> whether it was installed
    pub module_hits: BTreeMap<String, bool>,

    /// Declared script -> whether it was installed
    pub script_hits: BTreeMap<String, bool>,

    /// Declared script -> installed path relative to the install root
    pub script_paths: BTreeMap<String, String>,

    /// Parent directory -> installed files (relative to the project root)
    pub data_files: BTreeMap<String, BTreeSet<String>>,
}

impl Classification {
    /// Empty buckets with every declared module and script marked missing.
    pub fn new(modules: &[String], scripts: &[String]) -> Self {
        Classification {
            module_hits: modules.iter().map(|m| (m.clone(), false)).collect(),
            script_hits: scripts.iter().map(|s| (s.clone(), false)).collect(),
            ..Default::default()
        }
    }

    /// Seed the buckets with declarations made in the project file.
    pub fn with_declared(
        mut self,
        package_data: &BTreeMap<String, Vec<String>>,
        data_files: &BTreeMap<String, BTreeSet<String>>,
    ) -> Self {
        self.package_data = package_data.clone();
        self.data_files = data_files.clone();
        self
    }

    pub fn found_modules(&self) -> impl Iterator<Item = &str> {
        self.module_hits
            .iter()
            .filter(|(_, hit)| **hit)
            .map(|(m, _)| m.as_str())
    }
}

/// Assigns installed files to buckets.
#[derive(Debug, Clone)]
pub struct Classifier<'a> {
    prefixes: &'a PackagePrefixes,
    install_root: PathBuf,
}

impl<'a> Classifier<'a> {
    /// `install_root` is the install tree relative to the project root.
    pub fn new(prefixes: &'a PackagePrefixes, install_root: impl Into<PathBuf>) -> Self {
        Classifier {
            prefixes,
            install_root: install_root.into(),
        }
    }

    /// Classify every manifest entry into `out`.
    ///
    /// Entries must lie inside the install root. When any does not, nothing
    /// is classified and the offending entries are reported.
    ///
    /// `.` and `..` segments are resolved before the containment check.
    pub fn classify(&self, manifest: &[PathBuf], out: &mut Classification) -> Result<(), ShimError> {
        let install_root = normalize_path(&self.install_root);
        let mut relative = Vec::with_capacity(manifest.len());
        let mut violating = Vec::new();

        for path in manifest {
            match normalize_path(path).strip_prefix(&install_root) {
                Ok(rest) if !rest.as_os_str().is_empty() => relative.push(normalize_path(rest)),
                _ => violating.push(path.clone()),
            }
        }

        if !violating.is_empty() {
            return Err(ShimError::ManifestViolation {
                project_root: self.install_root.clone(),
                violating_files: violating,
            });
        }

        for path in &relative {
            self.classify_file(&to_unix_path(path), out);
        }
        Ok(())
    }

    /// Classify one forward-slash path relative to the install root.
    pub fn classify_file(&self, path: &str, out: &mut Classification) {
        if let Some((package, rest)) = self.prefixes.find(path) {
            out.package_data
                .entry(package.to_string())
                .or_default()
                .push(rest.to_string());
            return;
        }

        let dotted = path.replace('/', ".");
        if let Some(hit) = out
            .module_hits
            .iter_mut()
            .find(|(module, _)| dotted == format!("{}.py", module))
        {
            *hit.1 = true;
            return;
        }

        if let Some(script) = match_script(path, out.script_hits.keys()) {
            out.script_hits.insert(script.clone(), true);
            out.script_paths.insert(script, path.to_string());
            return;
        }

        let parent = match unix_parent(path) {
            "" => ".",
            dir => dir,
        };
        out.data_files
            .entry(parent.to_string())
            .or_default()
            .insert(to_unix_path(self.install_root.join(Path::new(path))));
    }
}

/// A script matches its own path, or `bin/<name>` when declared without a
/// directory.
fn match_script<'s>(path: &str, scripts: impl Iterator<Item = &'s String>) -> Option<String> {
    let mut fallback = None;
    for script in scripts {
        if path == script {
            return Some(script.clone());
        }
        if !script.contains('/') && path.strip_prefix("bin/") == Some(script.as_str()) {
            fallback.get_or_insert_with(|| script.clone());
        }
    }
    fallback
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    const ROOT: &str = "_skbuild/linux-x86_64-3.12/cmake-install";

    fn installed(paths: &[&str]) -> Vec<PathBuf> {
        paths.iter().map(|p| Path::new(ROOT).join(p)).collect()
    }

    #[test]
    fn test_longest_prefix_wins() {
        let mut package_dir = BTreeMap::new();
        package_dir.insert("top".to_string(), "top".to_string());
        package_dir.insert("top.bar".to_string(), "top/bar".to_string());
        let prefixes = PackagePrefixes::new(&package_dir, &strings(&["top", "top.bar"]));

        assert_eq!(prefixes.find("top/bar/data.txt"), Some(("top.bar", "data.txt")));
        assert_eq!(prefixes.find("top/x.txt"), Some(("top", "x.txt")));
        assert_eq!(prefixes.find("topper/x.txt"), None);
    }

    #[test]
    fn test_package_without_entry_uses_dotted_name() {
        let prefixes = PackagePrefixes::new(&BTreeMap::new(), &strings(&["a.b"]));
        assert_eq!(prefixes.find("a/b/c.so"), Some(("a.b", "c.so")));
    }

    #[test]
    fn test_every_file_lands_in_one_bucket() {
        let prefixes = PackagePrefixes::new(&BTreeMap::new(), &strings(&["hello"]));
        let classifier = Classifier::new(&prefixes, ROOT);

        let mut out = Classification::new(&strings(&["standalone"]), &strings(&["tool.sh"]));
        classifier
            .classify(
                &installed(&["hello/_ext.so", "standalone.py", "tool.sh", "share/doc/readme.txt", "top.txt"]),
                &mut out,
            )
            .unwrap();

        assert_eq!(out.package_data["hello"], vec!["_ext.so"]);
        assert_eq!(out.module_hits["standalone"], true);
        assert_eq!(out.script_hits["tool.sh"], true);
        assert_eq!(out.script_paths["tool.sh"], "tool.sh");
        assert_eq!(
            out.data_files["share/doc"],
            [format!("{}/share/doc/readme.txt", ROOT)].into_iter().collect()
        );
        assert!(out.data_files["."].contains(&format!("{}/top.txt", ROOT)));
    }

    #[test]
    fn test_hello_package_with_bin_script() {
        let prefixes = PackagePrefixes::new(&BTreeMap::new(), &strings(&["hello"]));
        let classifier = Classifier::new(&prefixes, ROOT);

        let mut out = Classification::new(&[], &strings(&["run.sh"]));
        classifier
            .classify(&installed(&["hello/_ext.so", "bin/run.sh"]), &mut out)
            .unwrap();

        let mut expected = BTreeMap::new();
        expected.insert("hello".to_string(), strings(&["_ext.so"]));
        assert_eq!(out.package_data, expected);
        assert_eq!(out.script_hits.get("run.sh"), Some(&true));
        assert_eq!(out.script_paths["run.sh"], "bin/run.sh");
        assert!(out.data_files.is_empty());
        assert!(out.module_hits.is_empty());
    }

    #[test]
    fn test_dotted_module_path() {
        let prefixes = PackagePrefixes::default();
        let classifier = Classifier::new(&prefixes, ROOT);

        let mut out = Classification::new(&strings(&["pkg.mod"]), &[]);
        classifier.classify_file("pkg/mod.py", &mut out);
        assert_eq!(out.found_modules().collect::<Vec<_>>(), vec!["pkg.mod"]);
    }

    #[test]
    fn test_file_outside_install_root_fails_closed() {
        let prefixes = PackagePrefixes::new(&BTreeMap::new(), &strings(&["hello"]));
        let classifier = Classifier::new(&prefixes, ROOT);

        let mut manifest = installed(&["hello/_ext.so"]);
        manifest.push(PathBuf::from("/usr/lib/libhello.so"));

        let mut out = Classification::new(&[], &[]);
        let err = classifier.classify(&manifest, &mut out).unwrap_err();

        match err {
            ShimError::ManifestViolation { violating_files, .. } => {
                assert_eq!(violating_files, vec![PathBuf::from("/usr/lib/libhello.so")]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(out.package_data.is_empty());
    }

    #[test]
    fn test_sibling_directory_is_outside_root() {
        let prefixes = PackagePrefixes::default();
        let classifier = Classifier::new(&prefixes, ROOT);

        let manifest = vec![PathBuf::from(format!("{}-other/file.txt", ROOT))];
        let mut out = Classification::default();
        assert!(classifier.classify(&manifest, &mut out).is_err());
    }

    #[test]
    fn test_parent_segments_cannot_escape_root() {
        let prefixes = PackagePrefixes::default();
        let classifier = Classifier::new(&prefixes, ROOT);

        let escaping = Path::new(ROOT).join("../../../../etc/evil.file");
        let mut manifest = installed(&["share/ok.txt"]);
        manifest.push(escaping.clone());

        let mut out = Classification::default();
        match classifier.classify(&manifest, &mut out) {
            Err(ShimError::ManifestViolation { violating_files, .. }) => {
                assert_eq!(violating_files, vec![escaping]);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(out.data_files.is_empty());
    }

    #[test]
    fn test_parent_segments_inside_root_are_resolved() {
        let prefixes = PackagePrefixes::new(&BTreeMap::new(), &strings(&["hello"]));
        let classifier = Classifier::new(&prefixes, ROOT);

        let mut out = Classification::default();
        classifier
            .classify(&installed(&["lib/../hello/./_ext.so"]), &mut out)
            .unwrap();

        assert_eq!(out.package_data["hello"], vec!["_ext.so"]);
        assert!(out.data_files.is_empty());
    }

    #[test]
    fn test_declared_buckets_are_kept() {
        let mut package_data = BTreeMap::new();
        package_data.insert("hello".to_string(), strings(&["*.txt"]));

        let prefixes = PackagePrefixes::new(&BTreeMap::new(), &strings(&["hello"]));
        let classifier = Classifier::new(&prefixes, ROOT);
        let mut out = Classification::new(&[], &[]).with_declared(&package_data, &BTreeMap::new());
        classifier.classify_file("hello/_ext.so", &mut out);

        assert_eq!(out.package_data["hello"], strings(&["*.txt", "_ext.so"]));
    }
}
