//! Module resolution against the compiler host.
//!
//! Resolution probes existence only (metadata lookups); the actual
//! source fetch happens later through the host, so tracked files are
//! found in the store and ambient files on disk.

use std::path::{Path, PathBuf};

use kiln_source::path::{join_normalized, normalize, parent_dir};

use crate::config::CompilerOptions;
use crate::host::CompilerHost;

/// Result of resolving a module specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Resolved to a concrete (possibly virtual) file path.
    File(PathBuf),
    /// A package the project does not own; left to the ambient world.
    External,
    /// A relative or aliased specifier with no file behind it.
    NotFound,
}

/// Resolves specifiers relative to a project root, honoring the
/// `baseUrl`/`paths` aliasing table from the compiler options.
#[derive(Debug)]
pub struct Resolver {
    project_root: PathBuf,
    base_dir: Option<PathBuf>,
    paths: Vec<(String, Vec<String>)>,
}

impl Resolver {
    pub fn new(project_root: &Path, options: &CompilerOptions) -> Resolver {
        let project_root = normalize(project_root);
        let base_dir = options
            .base_url
            .as_deref()
            .map(|base| join_normalized(&project_root, base));
        let paths = options
            .paths
            .iter()
            .flatten()
            .map(|(pattern, subs)| (pattern.clone(), subs.clone()))
            .collect();

        Resolver { project_root, base_dir, paths }
    }

    /// Resolve `specifier` as written in `importer`.
    pub fn resolve(&self, specifier: &str, importer: &Path, host: &dyn CompilerHost) -> Resolution {
        if specifier.starts_with("./") || specifier.starts_with("../") {
            return self.resolve_in_dir(&parent_dir(importer), specifier, host);
        }

        if let Some(base_dir) = &self.base_dir {
            for (pattern, substitutions) in &self.paths {
                let Some(wildcard) = match_alias(pattern, specifier) else { continue };
                for substitution in substitutions {
                    let target = substitution.replacen('*', wildcard, 1);
                    if let Resolution::File(path) = self.resolve_in_dir(base_dir, &target, host) {
                        return Resolution::File(path);
                    }
                }
                // An alias matched but nothing behind it exists.
                return Resolution::NotFound;
            }

            // baseUrl-relative non-relative imports.
            if let Resolution::File(path) = self.resolve_in_dir(base_dir, specifier, host) {
                return Resolution::File(path);
            }
        }

        // Bare package specifier: probe the type roots, else leave it to
        // the ambient world.
        let node_modules = self.project_root.join("node_modules");
        for candidate in [
            node_modules.join("@types").join(specifier).join("index.d.ts"),
            node_modules.join(specifier).join("index.d.ts"),
        ] {
            let candidate = normalize(&candidate);
            if host.file_exists(&candidate) {
                return Resolution::File(candidate);
            }
        }
        Resolution::External
    }

    fn resolve_in_dir(&self, dir: &Path, relative: &str, host: &dyn CompilerHost) -> Resolution {
        let target = join_normalized(dir, relative);
        for candidate in candidates(&target) {
            if host.file_exists(&candidate) {
                return Resolution::File(candidate);
            }
        }
        Resolution::NotFound
    }
}

/// Probe order for a resolved target path.
fn candidates(target: &Path) -> Vec<PathBuf> {
    let raw = target.to_string_lossy();

    // Exotic specifiers point at the virtual record.
    if raw.ends_with(".vue") {
        return vec![PathBuf::from(format!("{raw}.ts"))];
    }
    if raw.ends_with(".ts") || raw.ends_with(".tsx") {
        return vec![target.to_path_buf()];
    }

    vec![
        PathBuf::from(format!("{raw}.ts")),
        PathBuf::from(format!("{raw}.tsx")),
        PathBuf::from(format!("{raw}.d.ts")),
        PathBuf::from(format!("{raw}.vue.ts")),
        target.join("index.ts"),
        target.join("index.tsx"),
    ]
}

/// Match a `paths` pattern against a specifier, returning the text bound
/// by the single `*` wildcard (empty for exact patterns).
fn match_alias<'s>(pattern: &str, specifier: &'s str) -> Option<&'s str> {
    match pattern.split_once('*') {
        Some((prefix, suffix)) => {
            if specifier.len() >= prefix.len() + suffix.len()
                && specifier.starts_with(prefix)
                && specifier.ends_with(suffix)
            {
                Some(&specifier[prefix.len()..specifier.len() - suffix.len()])
            } else {
                None
            }
        }
        None => (pattern == specifier).then_some(""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::fs;
    use tempfile::TempDir;

    /// Host standing in for the store-backed one: existence is just a
    /// disk probe plus an explicit virtual-path set.
    struct ProbeHost {
        virtual_paths: Vec<PathBuf>,
    }

    impl CompilerHost for ProbeHost {
        fn read_file(&self, _path: &Path) -> Option<std::sync::Arc<str>> {
            None
        }
        fn get_source_file(&self, _path: &Path) -> Option<std::sync::Arc<kiln_source::SourceUnit>> {
            None
        }
        fn file_exists(&self, path: &Path) -> bool {
            self.virtual_paths.iter().any(|p| p == path) || path.is_file()
        }
    }

    fn disk_host() -> ProbeHost {
        ProbeHost { virtual_paths: Vec::new() }
    }

    #[test]
    fn test_relative_with_extension_probing() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("util.ts"), "export {};").unwrap();
        let importer = normalize(&dir.path().join("main.ts"));

        let resolver = Resolver::new(dir.path(), &CompilerOptions::default());
        let resolution = resolver.resolve("./util", &importer, &disk_host());

        assert_eq!(resolution, Resolution::File(normalize(&dir.path().join("util.ts"))));
    }

    #[test]
    fn test_relative_index_fallback() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("widgets")).unwrap();
        fs::write(dir.path().join("widgets/index.ts"), "export {};").unwrap();
        let importer = normalize(&dir.path().join("main.ts"));

        let resolver = Resolver::new(dir.path(), &CompilerOptions::default());
        let resolution = resolver.resolve("./widgets", &importer, &disk_host());

        assert_eq!(
            resolution,
            Resolution::File(normalize(&dir.path().join("widgets/index.ts")))
        );
    }

    #[test]
    fn test_vue_specifier_maps_to_virtual_path() {
        let dir = TempDir::new().unwrap();
        let virtual_path = normalize(&dir.path().join("App.vue.ts"));
        let host = ProbeHost { virtual_paths: vec![virtual_path.clone()] };
        let importer = normalize(&dir.path().join("main.ts"));

        let resolver = Resolver::new(dir.path(), &CompilerOptions::default());
        let resolution = resolver.resolve("./App.vue", &importer, &host);

        assert_eq!(resolution, Resolution::File(virtual_path));
    }

    #[test]
    fn test_paths_alias() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("src/lib")).unwrap();
        fs::write(dir.path().join("src/lib/api.ts"), "export {};").unwrap();

        let options = CompilerOptions {
            base_url: Some(".".to_string()),
            paths: Some(BTreeMap::from([(
                "@app/*".to_string(),
                vec!["src/*".to_string()],
            )])),
            ..CompilerOptions::default()
        };
        let importer = normalize(&dir.path().join("src/main.ts"));

        let resolver = Resolver::new(dir.path(), &options);
        let resolution = resolver.resolve("@app/lib/api", &importer, &disk_host());

        assert_eq!(
            resolution,
            Resolution::File(normalize(&dir.path().join("src/lib/api.ts")))
        );
    }

    #[test]
    fn test_matched_alias_without_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let options = CompilerOptions {
            base_url: Some(".".to_string()),
            paths: Some(BTreeMap::from([(
                "@app/*".to_string(),
                vec!["src/*".to_string()],
            )])),
            ..CompilerOptions::default()
        };
        let importer = normalize(&dir.path().join("src/main.ts"));

        let resolver = Resolver::new(dir.path(), &options);
        assert_eq!(
            resolver.resolve("@app/missing", &importer, &disk_host()),
            Resolution::NotFound
        );
    }

    #[test]
    fn test_bare_specifier_is_external() {
        let dir = TempDir::new().unwrap();
        let importer = normalize(&dir.path().join("main.ts"));

        let resolver = Resolver::new(dir.path(), &CompilerOptions::default());
        assert_eq!(resolver.resolve("vue", &importer, &disk_host()), Resolution::External);
    }

    #[test]
    fn test_bare_specifier_with_type_root() {
        let dir = TempDir::new().unwrap();
        let types = dir.path().join("node_modules/@types/lodash");
        fs::create_dir_all(&types).unwrap();
        fs::write(types.join("index.d.ts"), "declare module 'lodash';").unwrap();
        let importer = normalize(&dir.path().join("main.ts"));

        let resolver = Resolver::new(dir.path(), &CompilerOptions::default());
        let resolution = resolver.resolve("lodash", &importer, &disk_host());

        assert_eq!(resolution, Resolution::File(normalize(&types.join("index.d.ts"))));
    }

    #[test]
    fn test_missing_relative_is_not_found() {
        let dir = TempDir::new().unwrap();
        let importer = normalize(&dir.path().join("main.ts"));

        let resolver = Resolver::new(dir.path(), &CompilerOptions::default());
        assert_eq!(resolver.resolve("./gone", &importer, &disk_host()), Resolution::NotFound);
    }

    #[test]
    fn test_match_alias() {
        assert_eq!(match_alias("@app/*", "@app/lib/api"), Some("lib/api"));
        assert_eq!(match_alias("@app/*", "@other/x"), None);
        assert_eq!(match_alias("jquery", "jquery"), Some(""));
        assert_eq!(match_alias("jquery", "jquery/ui"), None);
    }
}
