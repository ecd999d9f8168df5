//! End-to-end resolution against synthetic images
#![cfg(target_pointer_width = "64")]

use dlboot::elf::ElfModule;
use dlboot::maps::MapsConfig;
use dlboot::resolver::find_function;
use dlboot::testing::{ImageBuilder, SymbolSpec, SyntheticProcess};
use dlboot::{ResolutionFailed, ResolveError, Resolver, ResolverConfig};
use std::io::Write;
use tempfile::NamedTempFile;

const LIBC_BASE: u64 = 0x7f10_0000_0000;

fn report(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(contents.as_bytes()).expect("Failed to write report");
    file
}

fn libc_report() -> NamedTempFile {
    report(
        "55d000000000-55d000001000 r--p 00000000 08:01 10 /usr/bin/app\n\
         7f1000000000-7f1000020000 r-xp 00000000 08:01 1234 /usr/lib/libc.so.6\n\
         7f1000020000-7f1000030000 r--p 00020000 08:01 1234 /usr/lib/libc.so.6\n",
    )
}

fn config_for(file: &NamedTempFile) -> ResolverConfig {
    ResolverConfig::default().with_maps(MapsConfig::default().with_path(file.path()))
}

fn glibc_like() -> ImageBuilder {
    ImageBuilder::new()
        .symbol(SymbolSpec::undefined("_dl_catch_error"))
        .symbol(SymbolSpec::function("malloc", 0x9000))
        .symbol(SymbolSpec::object("environ", 0xa000))
        .symbol(SymbolSpec::function("__libc_dlopen_mode", 0x1_2340))
        .symbol(SymbolSpec::function("dlopen", 0x1_5000).with_version(3))
        .symbol(SymbolSpec::function("dlsym", 0x1_6000).with_version(3))
        .versions(true)
}

#[test]
fn test_legacy_only_module_lookup() {
    let base = 0x7f00_0000_0000;
    let image = ImageBuilder::new()
        .symbol(SymbolSpec::function("probe_fn", 0x1000))
        .accelerated_hash(false)
        .build(base);
    let module = ElfModule::build(&image, base).expect("legacy-only image should build");

    assert!(module.accelerated_table().is_none());
    let found = find_function(&module, &["probe_fn".to_string()]).unwrap();
    assert_eq!(found, 0x7f00_0000_1000);

    let missing = find_function(&module, &["missing_fn".to_string()]).unwrap_err();
    assert!(matches!(missing, ResolveError::SymbolNotFound(_)));
}

#[test]
fn test_resolves_glibc_like_image() {
    let maps = libc_report();
    let resolver = Resolver::new(config_for(&maps), glibc_like().build(LIBC_BASE));

    let resolved = resolver.resolve(None).expect("resolution should succeed");
    assert_eq!(resolved.open_fn, LIBC_BASE + 0x1_2340);
    assert_eq!(resolved.lookup_fn, LIBC_BASE + 0x1_6000);
    assert_eq!(
        resolver.locator().cached().map(|m| m.base_address),
        Some(LIBC_BASE)
    );
    println!("✅ {resolved}");
}

#[test]
fn test_each_hash_table_alone_gives_the_same_answer() {
    let maps = libc_report();
    let legacy = Resolver::new(config_for(&maps), glibc_like().accelerated_hash(false).build(LIBC_BASE))
        .resolve(None)
        .unwrap();
    let accelerated = Resolver::new(config_for(&maps), glibc_like().legacy_hash(false).build(LIBC_BASE))
        .resolve(None)
        .unwrap();

    assert_eq!(legacy, accelerated);
}

#[test]
fn test_missing_open_function_fails_as_a_whole() {
    let maps = libc_report();
    let image = ImageBuilder::new().symbol(SymbolSpec::function("dlsym", 0x4000)).build(LIBC_BASE);
    let resolver = Resolver::new(config_for(&maps), image);

    assert_eq!(resolver.resolve(None), Err(ResolutionFailed));
    assert_eq!(resolver.resolved(), None);
}

#[test]
fn test_missing_lookup_function_fails() {
    let maps = libc_report();
    let image = ImageBuilder::new().symbol(SymbolSpec::function("dlopen", 0x3000)).build(LIBC_BASE);
    let resolver = Resolver::new(config_for(&maps), image);

    assert_eq!(resolver.resolve(None), Err(ResolutionFailed));
}

#[test]
fn test_data_symbol_is_not_a_function() {
    let image = ImageBuilder::new()
        .symbol(SymbolSpec::object("dlopen", 0x3000))
        .symbol(SymbolSpec::function("dlsym", 0x4000))
        .build(LIBC_BASE);
    let module = ElfModule::build(&image, LIBC_BASE).unwrap();

    assert!(module.lookup("dlopen").is_some());
    let err = find_function(&module, &["dlopen".to_string()]).unwrap_err();
    assert_eq!(err.to_string(), "Symbol dlopen not found");
}

#[test]
fn test_fallback_base_when_module_absent() {
    // musl: the interpreter is the C library and no path contains "libc"
    let interp = 0x7f40_0000_0000;
    let process = SyntheticProcess::new()
        .with_image(ImageBuilder::new().symbol(SymbolSpec::function("malloc", 0x100)).build(LIBC_BASE))
        .with_image(
            ImageBuilder::new()
                .symbol(SymbolSpec::function("dlopen", 0x5_0000))
                .symbol(SymbolSpec::function("dlsym", 0x5_1000))
                .build(interp),
        );
    let maps = report("7f4000000000-7f4000080000 r-xp 00000000 08:01 99 /lib/ld-musl-x86_64.so.1\n");
    let resolver = Resolver::new(config_for(&maps), process);

    let resolved = resolver.resolve(Some(interp)).unwrap();
    assert_eq!(resolved.open_fn, interp + 0x5_0000);
    assert_eq!(resolved.lookup_fn, interp + 0x5_1000);
    // The fallback is never remembered as the module base
    assert!(resolver.locator().cached().is_none());
}

#[test]
fn test_fallback_ignored_when_module_found() {
    let maps = libc_report();
    let bogus = 0x1000;
    let resolver = Resolver::new(config_for(&maps), glibc_like().build(LIBC_BASE));

    let resolved = resolver.resolve(Some(bogus)).unwrap();
    assert_eq!(resolved.lookup_fn, LIBC_BASE + 0x1_6000);
}

#[test]
fn test_bad_image_fails_without_poisoning_later_calls() {
    let maps = libc_report();
    let mut image = glibc_like().build(LIBC_BASE);
    image.bytes_mut()[0] = 0;
    let resolver = Resolver::new(config_for(&maps), image);

    assert_eq!(resolver.resolve(None), Err(ResolutionFailed));
    assert_eq!(resolver.resolve(None), Err(ResolutionFailed));
    // The base was still located and memoized
    assert_eq!(resolver.locator().cached().map(|m| m.base_address), Some(LIBC_BASE));
}

#[test]
fn test_concurrent_callers_agree() {
    let maps = libc_report();
    let resolver = Resolver::new(config_for(&maps), glibc_like().build(LIBC_BASE));

    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8).map(|_| scope.spawn(|| resolver.resolve(None))).collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let first = results[0].unwrap();
    assert!(results.iter().all(|r| *r == Ok(first)));
}

#[test]
fn test_custom_candidates() {
    let maps = libc_report();
    let config = config_for(&maps)
        .with_open_candidates(["my_open"])
        .with_lookup_candidates(["my_sym", "dlsym"]);
    let image = ImageBuilder::new()
        .symbol(SymbolSpec::function("my_open", 0x100))
        .symbol(SymbolSpec::function("dlsym", 0x200))
        .build(LIBC_BASE);

    let resolved = Resolver::new(config, image).resolve(None).unwrap();
    assert_eq!(resolved.open_fn, LIBC_BASE + 0x100);
    assert_eq!(resolved.lookup_fn, LIBC_BASE + 0x200);
}
