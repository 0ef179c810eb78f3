//! Requirement collection tests
//!
//! Source order, optional sources, manifests, filtering and last-wins
//! deduplication against real files in a scratch Odoo checkout.

mod fixtures;

use fixtures::{manifest_with_python_deps, OdooTree};
use odoo_venv::requirements::{
    collect, dedupe, filter, gather, CollectOptions, IgnoreSet, RequirementError, RequirementSource,
};
use odoo_venv::MarkerContext;

fn ctx() -> MarkerContext {
    MarkerContext::host("16.0", "3.10")
}

fn options(tree: &OdooTree) -> CollectOptions {
    CollectOptions {
        odoo_dir: tree.odoo_dir(),
        addons_paths: vec![tree.addons_dir()],
        install_odoo_requirements: true,
        ..Default::default()
    }
}

fn specs(entries: &[odoo_venv::RequirementEntry]) -> Vec<String> {
    entries.iter().map(|e| e.spec.clone()).collect()
}

#[test]
fn test_odoo_requirements_only_by_default() {
    let tree = OdooTree::new("Babel==2.9.1\nlxml==4.9.2\n");
    tree.addons_requirements("requests\n");
    tree.addon("sale_extra", &manifest_with_python_deps(&["phonenumbers"]));

    let entries = collect(&options(&tree), &ctx()).unwrap();
    assert_eq!(specs(&entries), vec!["Babel==2.9.1", "lxml==4.9.2"]);
    assert!(entries.iter().all(|e| e.source == RequirementSource::OdooRequirements));
}

#[test]
fn test_source_order() {
    let tree = OdooTree::new("Babel==2.9.1\n");
    tree.addons_requirements("requests\n");
    tree.addon("sale_extra", &manifest_with_python_deps(&["phonenumbers"]));
    let extra_file = tree.file("extra.txt", "pdfminer.six\n");

    let mut opts = options(&tree);
    opts.install_addons_dirs_requirements = true;
    opts.extra_requirements_file = Some(extra_file);
    opts.extra_requirements = vec!["ipython".to_string()];

    let entries = gather(&opts, &ctx()).unwrap();
    assert_eq!(
        specs(&entries),
        vec!["Babel==2.9.1", "requests", "phonenumbers", "pdfminer.six", "ipython"]
    );
    let sources: Vec<_> = entries.iter().map(|e| e.source).collect();
    assert_eq!(
        sources,
        vec![
            RequirementSource::OdooRequirements,
            RequirementSource::AddonRequirements,
            RequirementSource::AddonManifestExternalDependency,
            RequirementSource::ExtraRequirementsFile,
            RequirementSource::ExtraRequirement,
        ]
    );
    assert_eq!(entries[2].addon.as_deref(), Some("sale_extra"));
}

#[test]
fn test_manifests_without_addons_dirs_requirements() {
    let tree = OdooTree::new("");
    tree.addons_requirements("requests\n");
    tree.addon("sale_extra", &manifest_with_python_deps(&["phonenumbers"]));

    let mut opts = options(&tree);
    opts.install_addons_manifests_requirements = true;

    let entries = collect(&opts, &ctx()).unwrap();
    assert_eq!(specs(&entries), vec!["phonenumbers"]);
}

#[test]
fn test_missing_odoo_requirements_is_fatal() {
    let tree = OdooTree::new("");
    std::fs::remove_file(tree.odoo_dir().join("requirements.txt")).unwrap();

    let err = collect(&options(&tree), &ctx()).unwrap_err();
    let RequirementError::File { path, .. } = err;
    assert!(path.ends_with("requirements.txt"));
}

#[test]
fn test_missing_odoo_requirements_ok_when_disabled() {
    let tree = OdooTree::new("");
    std::fs::remove_file(tree.odoo_dir().join("requirements.txt")).unwrap();

    let mut opts = options(&tree);
    opts.install_odoo_requirements = false;
    opts.extra_requirements = vec!["ipython".to_string()];
    assert_eq!(specs(&collect(&opts, &ctx()).unwrap()), vec!["ipython"]);
}

#[test]
fn test_missing_addon_requirements_skipped() {
    let tree = OdooTree::new("lxml\n");
    let mut opts = options(&tree);
    opts.install_addons_dirs_requirements = true;
    opts.addons_paths.push(tree.root.path().join("does-not-exist"));

    assert_eq!(specs(&collect(&opts, &ctx()).unwrap()), vec!["lxml"]);
}

#[test]
fn test_missing_extra_requirements_file_is_fatal() {
    let tree = OdooTree::new("lxml\n");
    let mut opts = options(&tree);
    opts.extra_requirements_file = Some(tree.root.path().join("nope.txt"));
    assert!(collect(&opts, &ctx()).is_err());
}

#[test]
fn test_malformed_manifest_skipped() {
    let tree = OdooTree::new("");
    tree.addon("broken", "{'name': 'broken', 'external_dependencies': {'python': [get()]}}");
    tree.addon("good", &manifest_with_python_deps(&["requests"]));

    let mut opts = options(&tree);
    opts.install_addons_manifests_requirements = true;
    assert_eq!(specs(&collect(&opts, &ctx()).unwrap()), vec!["requests"]);
}

#[test]
fn test_extra_requirement_overrides_base_pin() {
    let tree = OdooTree::new("foo==1.0\nbar==3\n");
    let mut opts = options(&tree);
    opts.extra_requirements = vec!["foo==2.0".to_string()];

    let entries = collect(&opts, &ctx()).unwrap();
    assert_eq!(specs(&entries), vec!["bar==3", "foo==2.0"]);
    assert_eq!(entries[1].source, RequirementSource::ExtraRequirement);
}

#[test]
fn test_manifest_overrides_base_pin() {
    let tree = OdooTree::new("Requests==2.25.1\n");
    tree.addon("api", &manifest_with_python_deps(&["requests>=2.31"]));

    let mut opts = options(&tree);
    opts.install_addons_manifests_requirements = true;
    assert_eq!(specs(&collect(&opts, &ctx()).unwrap()), vec!["requests>=2.31"]);
}

#[test]
fn test_ignore_applies_to_every_source() {
    let tree = OdooTree::new("setuptools\nlxml\n");
    tree.addons_requirements("SetupTools>=60\n");
    tree.addon("x", &manifest_with_python_deps(&["setuptools"]));

    let mut opts = options(&tree);
    opts.install_addons_dirs_requirements = true;
    opts.extra_requirements = vec!["setuptools==65".to_string()];
    opts.ignore = vec!["setuptools".to_string()];

    assert_eq!(specs(&collect(&opts, &ctx()).unwrap()), vec!["lxml"]);
}

#[test]
fn test_filter_idempotent_on_collected_list() {
    let tree = OdooTree::new("setuptools\nlxml\nBabel\n-r other.txt\n");
    let entries = gather(&options(&tree), &ctx()).unwrap();
    let ignore = IgnoreSet::new(&["babel"], &ctx());

    let once = filter(entries, &ignore);
    let twice = filter(once.clone(), &ignore);
    assert_eq!(once, twice);
    assert_eq!(specs(&once), vec!["setuptools", "lxml", "-r other.txt"]);
}

#[test]
fn test_markers_evaluated_against_target() {
    let tree = OdooTree::new(
        "gevent==20.9.0 ; python_version < '3.10'\ngevent==21.8.0 ; python_version >= '3.10'\n",
    );
    let entries = collect(&options(&tree), &ctx()).unwrap();
    assert_eq!(specs(&entries), vec!["gevent==21.8.0"]);

    let old = MarkerContext::host("14.0", "3.8");
    let entries = collect(&options(&tree), &old).unwrap();
    assert_eq!(specs(&entries), vec!["gevent==20.9.0"]);
}

#[test]
fn test_dedupe_after_filter_keeps_pip_options() {
    let tree = OdooTree::new("-e ./vendored\nfoo\n-e ./vendored\nfoo\n");
    let entries = gather(&options(&tree), &ctx()).unwrap();
    assert_eq!(specs(&dedupe(entries)), vec!["-e ./vendored", "-e ./vendored", "foo"]);
}

#[test]
fn test_ignore_matches_lines_with_unknown_markers() {
    let tree = OdooTree::new("setuptools>=60 ; libc_flavour == 'musl'\nlxml ; extra == 'dev'\nBabel\n");
    let mut opts = options(&tree);
    opts.ignore = vec!["setuptools".to_string()];

    assert_eq!(specs(&collect(&opts, &ctx()).unwrap()), vec!["Babel"]);
}
