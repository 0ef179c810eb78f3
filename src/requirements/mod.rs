//! Requirement collection and filtering
//!
//! Requirements are gathered in a fixed order:
//! 1. `<odoo_dir>/requirements.txt`
//! 2. per addons path: its `requirements.txt`, then the external Python
//!    dependencies of every addon manifest below it
//! 3. `extra_requirements_file`
//! 4. `extra_requirement`
//!
//! The list is then filtered against the ignore set and deduplicated by
//! normalized name, keeping the last occurrence.

mod entry;
mod manifest;

pub use entry::{logical_lines, normalize_name, requirement_name, RequirementEntry, RequirementSource};
pub use manifest::{
    external_python_dependencies, find_manifests, parse_literal, ManifestError, ManifestFile,
    PyValue, MANIFEST_NAMES,
};

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use odoo_venv_marker::{MarkerContext, Predicate};

use crate::config::{expand_home, EffectiveConfig};

/// Error types for requirement collection
#[derive(Debug, thiserror::Error)]
pub enum RequirementError {
    #[error("Cannot read requirements file {path}: {source}")]
    File {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl RequirementError {
    fn file(path: &Path, source: io::Error) -> Self {
        RequirementError::File {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Inputs of one collection run
#[derive(Debug, Clone, Default)]
pub struct CollectOptions {
    pub odoo_dir: PathBuf,
    pub addons_paths: Vec<PathBuf>,
    pub install_odoo_requirements: bool,
    pub install_addons_dirs_requirements: bool,
    pub install_addons_manifests_requirements: bool,
    pub extra_requirements_file: Option<PathBuf>,
    pub extra_requirements: Vec<String>,
    pub ignore: Vec<String>,
}

impl CollectOptions {
    /// Options for `odoo_dir` as described by a merged configuration.
    ///
    /// A leading `~` in addons paths and the extra requirements file is
    /// expanded to the home directory.
    pub fn from_config(odoo_dir: &Path, config: &EffectiveConfig) -> Self {
        Self {
            odoo_dir: odoo_dir.to_path_buf(),
            addons_paths: config
                .addons_path
                .iter()
                .map(|p| expand_home(Path::new(p)))
                .collect(),
            install_odoo_requirements: config.install_odoo_requirements,
            install_addons_dirs_requirements: config.install_addons_dirs_requirements,
            install_addons_manifests_requirements: config.install_addons_manifests_requirements,
            extra_requirements_file: config
                .extra_requirements_file
                .as_deref()
                .map(|p| expand_home(Path::new(p))),
            extra_requirements: config.extra_requirement.clone(),
            ignore: config.ignore.clone(),
        }
    }
}

/// Normalized package names to drop from the final list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IgnoreSet {
    names: BTreeSet<String>,
}

impl IgnoreSet {
    /// Build the set from `ignore` entries.
    ///
    /// Entries may carry a version specifier (ignored, names only) and an
    /// environment marker; an entry whose marker is false ignores nothing.
    pub fn new<S: AsRef<str>>(entries: &[S], ctx: &MarkerContext) -> Self {
        let mut names = BTreeSet::new();
        for raw in entries {
            let raw = raw.as_ref().trim();
            let (requirement, marker) = match raw.split_once(';') {
                Some((req, marker)) => (req.trim(), Some(marker.trim())),
                None => (raw, None),
            };
            if let Some(marker) = marker {
                match Predicate::parse(marker) {
                    Ok(p) if !p.evaluate(ctx) => continue,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!("Ignore entry '{}' has an invalid marker: {}", raw, e);
                        continue;
                    }
                }
            }
            match requirement_name(requirement) {
                Some(name) => {
                    names.insert(normalize_name(name));
                }
                None if !requirement.is_empty() => {
                    tracing::warn!("Ignore entry '{}' is not a package name", raw);
                }
                None => {}
            }
        }
        Self { names }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(&normalize_name(name))
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

/// Gather entries from every enabled source, unfiltered.
pub fn gather(
    options: &CollectOptions,
    ctx: &MarkerContext,
) -> Result<Vec<RequirementEntry>, RequirementError> {
    let mut entries = Vec::new();

    if options.install_odoo_requirements {
        let path = options.odoo_dir.join("requirements.txt");
        let contents = fs::read_to_string(&path).map_err(|e| RequirementError::file(&path, e))?;
        entries.extend(parse_requirements(
            &contents,
            RequirementSource::OdooRequirements,
            None,
            ctx,
        ));
    }

    for addons_path in &options.addons_paths {
        let label = addons_path.display().to_string();

        if options.install_addons_dirs_requirements {
            let path = addons_path.join("requirements.txt");
            match fs::read_to_string(&path) {
                Ok(contents) => entries.extend(parse_requirements(
                    &contents,
                    RequirementSource::AddonRequirements,
                    Some(&label),
                    ctx,
                )),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    tracing::debug!("No requirements.txt in {}", label);
                }
                Err(e) => return Err(RequirementError::file(&path, e)),
            }
        }

        if options.install_addons_dirs_requirements || options.install_addons_manifests_requirements {
            for manifest in find_manifests(addons_path) {
                entries.extend(manifest_entries(&manifest, ctx));
            }
        }
    }

    if let Some(path) = &options.extra_requirements_file {
        let contents = fs::read_to_string(path).map_err(|e| RequirementError::file(path, e))?;
        entries.extend(parse_requirements(
            &contents,
            RequirementSource::ExtraRequirementsFile,
            None,
            ctx,
        ));
    }

    for line in &options.extra_requirements {
        entries.extend(RequirementEntry::parse(
            line,
            RequirementSource::ExtraRequirement,
            None,
            ctx,
        ));
    }

    Ok(entries)
}

/// Collect, filter and deduplicate.
pub fn collect(
    options: &CollectOptions,
    ctx: &MarkerContext,
) -> Result<Vec<RequirementEntry>, RequirementError> {
    let entries = gather(options, ctx)?;
    let ignore = IgnoreSet::new(&options.ignore, ctx);
    let resolved = resolve(entries, &ignore);
    tracing::debug!("Resolved {} requirement(s)", resolved.len());
    Ok(resolved)
}

/// Filter then deduplicate.
pub fn resolve(entries: Vec<RequirementEntry>, ignore: &IgnoreSet) -> Vec<RequirementEntry> {
    dedupe(filter(entries, ignore))
}

/// Drop every entry whose name is in `ignore`, whatever its source.
pub fn filter(entries: Vec<RequirementEntry>, ignore: &IgnoreSet) -> Vec<RequirementEntry> {
    if ignore.is_empty() {
        return entries;
    }
    entries
        .into_iter()
        .filter(|entry| match &entry.name {
            Some(name) if ignore.contains(name) => {
                tracing::debug!("Ignoring '{}' ({})", entry.spec, entry.source);
                false
            }
            _ => true,
        })
        .collect()
}

/// Keep only the last entry per normalized name, at its own position.
///
/// Entries without a name (pip options, unparseable lines) are always kept.
pub fn dedupe(entries: Vec<RequirementEntry>) -> Vec<RequirementEntry> {
    let mut last: HashMap<String, usize> = HashMap::new();
    for (i, entry) in entries.iter().enumerate() {
        if let Some(name) = &entry.name {
            last.insert(name.clone(), i);
        }
    }

    entries
        .into_iter()
        .enumerate()
        .filter(|(i, entry)| match &entry.name {
            Some(name) => {
                let keep = last.get(name) == Some(i);
                if !keep {
                    tracing::debug!("'{}' ({}) overridden by a later source", entry.spec, entry.source);
                }
                keep
            }
            None => true,
        })
        .map(|(_, entry)| entry)
        .collect()
}

/// Parse the contents of a requirements file.
pub fn parse_requirements(
    contents: &str,
    source: RequirementSource,
    addon: Option<&str>,
    ctx: &MarkerContext,
) -> Vec<RequirementEntry> {
    logical_lines(contents)
        .iter()
        .filter_map(|line| RequirementEntry::parse(line, source, addon, ctx))
        .collect()
}

/// Render the resolved list as a requirements file.
pub fn render(entries: &[RequirementEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        out.push_str(&entry.spec);
        out.push('\n');
    }
    out
}

fn manifest_entries(manifest: &ManifestFile, ctx: &MarkerContext) -> Vec<RequirementEntry> {
    let contents = match fs::read_to_string(&manifest.path) {
        Ok(contents) => contents,
        Err(e) => {
            tracing::warn!("Skipping addon '{}': cannot read {}: {}", manifest.addon, manifest.path.display(), e);
            return Vec::new();
        }
    };

    match external_python_dependencies(&contents) {
        Ok(deps) => deps
            .iter()
            .filter_map(|dep| {
                RequirementEntry::parse(
                    dep,
                    RequirementSource::AddonManifestExternalDependency,
                    Some(&manifest.addon),
                    ctx,
                )
            })
            .collect(),
        Err(e) => {
            tracing::warn!(
                "Skipping external dependencies of addon '{}': {}: {}",
                manifest.addon,
                manifest.path.display(),
                e
            );
            Vec::new()
        }
    }
}
