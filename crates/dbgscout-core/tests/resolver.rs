//! Tests for file system resolution

mod common;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use common::*;
use dbgscout_core::prelude::*;
use dbgscout_core::resolver::SearchResolver;

const ID: [u8; 3] = [0xaa, 0xbb, 0xcc];

fn info<'a>(build_id: Option<&'a BuildId>, path: Option<&'a Path>) -> ModuleInfo<'a>
{
    ModuleInfo {
        name: "libtest.so",
        range: AddressRange::placeholder(Address::new(0x1000)),
        build_id,
        path,
    }
}

fn config(root: &Path) -> SearchConfig
{
    SearchConfig::new()
        .with_build_id_roots([root.to_path_buf()])
        .with_debuginfo_path(format!(":.debug:{}", root.join("global").display()))
}

#[test]
fn test_build_id_index_finds_debug_file()
{
    let root = tempfile::tempdir().unwrap();
    let expected = root.path().join(".build-id/aa/bbcc.debug");
    shared_object(&ID).debug_info().write_to(&expected);

    let resolver = SearchResolver::new(Arc::new(config(root.path())));
    let id = BuildId::from(&ID[..]);
    let found = resolver.find_debug(&info(Some(&id), None), None).unwrap();
    assert_eq!(found.path, expected);

    // Same inputs, same answer.
    let again = resolver.find_debug(&info(Some(&id), None), None).unwrap();
    assert_eq!(again.path, found.path);
}

#[test]
fn test_build_id_index_finds_main_file()
{
    let root = tempfile::tempdir().unwrap();
    let expected = root.path().join(".build-id/aa/bbcc");
    shared_object(&ID).write_to(&expected);

    let resolver = SearchResolver::new(Arc::new(config(root.path())));
    let id = BuildId::from(&ID[..]);
    let found = resolver.find_main(&info(Some(&id), None)).unwrap();
    assert_eq!(found.path, expected);
    assert_eq!(found.container.kind(), dbgscout_core::container::ImageKind::SharedObject);
}

#[test]
fn test_index_entry_with_wrong_build_id_rejected()
{
    let root = tempfile::tempdir().unwrap();
    shared_object(&[0xaa, 0xbb, 0xcd]).write_to(&root.path().join(".build-id/aa/bbcc.debug"));

    let resolver = SearchResolver::new(Arc::new(config(root.path())));
    let id = BuildId::from(&ID[..]);
    assert!(resolver.find_debug(&info(Some(&id), None), None).is_none());
}

#[test]
fn test_roots_tried_in_order()
{
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();
    shared_object(&ID).write_to(&first.path().join(".build-id/aa/bbcc.debug"));
    shared_object(&ID).write_to(&second.path().join(".build-id/aa/bbcc.debug"));

    let config = SearchConfig::new().with_build_id_roots([second.path(), first.path()]);
    let resolver = SearchResolver::new(Arc::new(config));
    let id = BuildId::from(&ID[..]);
    let found = resolver.find_debug(&info(Some(&id), None), None).unwrap();
    assert!(found.path.starts_with(second.path()));
}

#[test]
fn test_literal_path_fallback_verifies_build_id()
{
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("libtest.so");
    shared_object(&ID).write_to(&path);

    let resolver = SearchResolver::new(Arc::new(config(dir.path())));
    let id = BuildId::from(&ID[..]);
    let found = resolver.find_main(&info(Some(&id), Some(&path))).unwrap();
    assert_eq!(found.path, path);

    let other = BuildId::from(&[1u8, 2, 3][..]);
    assert!(resolver.find_main(&info(Some(&other), Some(&path))).is_none());

    // Without a build id the literal path is taken as is.
    assert!(resolver.find_main(&info(None, Some(&path))).is_some());
}

#[test]
fn test_literal_strategy_ignores_index()
{
    let root = tempfile::tempdir().unwrap();
    shared_object(&ID).write_to(&root.path().join(".build-id/aa/bbcc"));

    let resolver = SearchResolver::literal(Arc::new(config(root.path())));
    let id = BuildId::from(&ID[..]);
    assert!(resolver.find_main(&info(Some(&id), None)).is_none());
}

#[test]
fn test_debuglink_search_order()
{
    let dir = tempfile::tempdir().unwrap();
    let main_path = dir.path().join("lib/libtest.so");
    ElfBuilder::shared()
        .load_self(0, PAGE)
        .build_id(&ID)
        .debuglink("libtest.dbg")
        .write_to(&main_path);
    let main = MainImage::from_file(Resolved {
        path: main_path.clone(),
        container: Container::open(&main_path).unwrap(),
    });

    let resolver = SearchResolver::literal(Arc::new(config(dir.path())));
    let id = BuildId::from(&ID[..]);
    let module = info(Some(&id), Some(&main_path));

    // Global root mirrors the main file's directory.
    let global: PathBuf = dir
        .path()
        .join("global")
        .join(main_path.parent().unwrap().strip_prefix("/").unwrap())
        .join("libtest.dbg");
    shared_object(&ID).write_to(&global);
    assert_eq!(resolver.find_debug(&module, Some(&main)).unwrap().path, global);

    let subdir = dir.path().join("lib/.debug/libtest.dbg");
    shared_object(&ID).write_to(&subdir);
    assert_eq!(resolver.find_debug(&module, Some(&main)).unwrap().path, subdir);

    let beside = dir.path().join("lib/libtest.dbg");
    shared_object(&ID).write_to(&beside);
    assert_eq!(resolver.find_debug(&module, Some(&main)).unwrap().path, beside);
}

#[test]
fn test_debuglink_defaults_to_basename_debug()
{
    let dir = tempfile::tempdir().unwrap();
    let main_path = dir.path().join("libtest.so");
    shared_object(&ID).write_to(&main_path);
    let expected = dir.path().join("libtest.so.debug");
    shared_object(&ID).debug_info().write_to(&expected);

    let resolver = SearchResolver::literal(Arc::new(config(dir.path())));
    let id = BuildId::from(&ID[..]);
    let found = resolver.find_debug(&info(Some(&id), Some(&main_path)), None).unwrap();
    assert_eq!(found.path, expected);
}

#[test]
fn test_override_root_replaces_debuginfo_path()
{
    let dir = tempfile::tempdir().unwrap();
    let sysroot = tempfile::tempdir().unwrap();
    let main_path = dir.path().join("libtest.so");
    shared_object(&ID).write_to(&main_path);
    shared_object(&ID).write_to(&dir.path().join("libtest.so.debug"));
    let expected = sysroot
        .path()
        .join(dir.path().strip_prefix("/").unwrap())
        .join("libtest.so.debug");
    shared_object(&ID).write_to(&expected);

    let config = config(dir.path()).with_override_root(sysroot.path());
    let resolver = SearchResolver::literal(Arc::new(config));
    let id = BuildId::from(&ID[..]);
    let found = resolver.find_debug(&info(Some(&id), Some(&main_path)), None);
    // Only the override root is searched.
    assert_eq!(found.unwrap().path, expected);
}

#[test]
fn test_session_resolves_separate_debug_file()
{
    let root = tempfile::tempdir().unwrap();
    let main_path = root.path().join("bin/tool");
    shared_object(&ID).write_to(&main_path);
    let debug_path = root.path().join(".build-id/aa/bbcc.debug");
    shared_object(&ID).debug_info().write_to(&debug_path);

    let mut session = Session::new(Arc::new(config(root.path())));
    let module = session.report_offline(&main_path).unwrap();
    session.end().unwrap();
    assert_eq!(session.resolve_all().unwrap(), 1);

    let debug = session.module(module).unwrap().debug_image().unwrap();
    assert!(!debug.is_in_main());
    assert_eq!(debug.path(), Some(debug_path.as_path()));
    assert_eq!(session.module(module).unwrap().state(), ResolutionState::DebugResolved);
}
