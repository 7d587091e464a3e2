//! Integration tests for building and installing into the store
//!
//! Builds run `sh`, so these tests are unix-only.

#![cfg(unix)]

mod common;

use common::{store_in, MemorySource, BUILD_FAIL};
use larder::{ArtifactKind, Requirement, Resolver, ResolverError, Source, StoreError};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn resolver_for<'a>(source: &Arc<MemorySource>, store: &'a larder::Store) -> Resolver<'a> {
    Resolver::new(vec![Arc::clone(source) as Arc<dyn Source>], store)
}

#[test]
fn test_install_builds_into_prefix() {
    let temp = TempDir::new().unwrap();
    let store = store_in(&temp);

    let mut registry = MemorySource::new("memory://main");
    registry.add("Flask", "0.9", &["Werkzeug"]).add("Werkzeug", "0.8", &[]);
    let registry = Arc::new(registry);

    let resolver = resolver_for(&registry, &store);
    let mut resolution = resolver
        .resolve(vec![Requirement::parse("Flask").unwrap()], "linux")
        .unwrap();
    assert_eq!(resolution.install_pending(&store).unwrap(), 2);

    for package in resolution.packages() {
        assert_eq!(package.artifact().unwrap().kind(), ArtifactKind::Installed);
    }

    let marker = store.lib_dir("Flask", "0.9").join("Flask.built");
    assert_eq!(fs::read_to_string(marker).unwrap().trim(), "Flask 0.9");
    assert!(store.bin_dir("Flask", "0.9").is_dir());

    let installed = store.get("flask", "0.9").unwrap().unwrap();
    assert_eq!(
        installed.path(),
        store.lib_dir("flask", "0.9").join("flask-0.9.installed")
    );
    assert_eq!(installed.metadata().unwrap().name, "Flask");
}

#[test]
fn test_second_run_downloads_nothing() {
    let temp = TempDir::new().unwrap();
    let store = store_in(&temp);

    let mut registry = MemorySource::new("memory://main");
    registry.add("Flask", "0.9", &["Werkzeug"]).add("Werkzeug", "0.8", &[]);
    let registry = Arc::new(registry);

    let requirements = vec![Requirement::parse("Flask").unwrap()];
    let mut first = resolver_for(&registry, &store)
        .resolve(requirements.clone(), "linux")
        .unwrap();
    first.install_pending(&store).unwrap();
    assert_eq!(registry.fetches(), 2);

    let mut second = resolver_for(&registry, &store)
        .resolve(requirements, "linux")
        .unwrap();
    assert_eq!(second.install_pending(&store).unwrap(), 0);
    assert_eq!(registry.fetches(), 2);

    let versions: Vec<_> = second
        .packages()
        .map(|p| p.version().unwrap().to_string())
        .collect();
    assert_eq!(versions, vec!["0.9", "0.8"]);
}

#[test]
fn test_failed_build_keeps_sources_and_log() {
    let temp = TempDir::new().unwrap();
    let store = store_in(&temp);

    let mut registry = MemorySource::new("memory://main");
    registry.add_with_script("broken", "1.0", &[], BUILD_FAIL);
    let registry = Arc::new(registry);

    let mut resolution = resolver_for(&registry, &store)
        .resolve(vec![Requirement::parse("broken").unwrap()], "linux")
        .unwrap();

    match resolution.install_pending(&store).unwrap_err() {
        ResolverError::Store(StoreError::Build {
            name,
            version,
            code,
            log,
            log_path,
            source_dir,
        }) => {
            assert_eq!(name, "broken");
            assert_eq!(version, "1.0");
            assert_eq!(code, Some(1));
            assert!(log.contains("compiler exploded"));
            assert!(log_path.is_file());
            assert!(source_dir.join("package.toml").is_file());
            fs::remove_file(log_path).unwrap();
        }
        other => panic!("unexpected error: {}", other),
    }

    assert!(store.get("broken", "1.0").unwrap().is_none());
}

#[test]
fn test_failed_install_is_retried_from_scratch() {
    let temp = TempDir::new().unwrap();
    let store = store_in(&temp);

    // A leftover prefix without an install record
    let stale = store.lib_dir("six", "1.0").join("leftover");
    fs::create_dir_all(&stale).unwrap();

    let mut registry = MemorySource::new("memory://main");
    registry.add("six", "1.0", &[]);
    let registry = Arc::new(registry);

    let mut resolution = resolver_for(&registry, &store)
        .resolve(vec![Requirement::parse("six").unwrap()], "linux")
        .unwrap();
    assert_eq!(resolution.install_pending(&store).unwrap(), 1);

    assert!(!stale.exists());
    assert!(store.get("six", "1.0").unwrap().is_some());
}
