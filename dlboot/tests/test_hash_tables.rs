//! DT_HASH and DT_GNU_HASH must agree on every name, present or not
#![cfg(target_pointer_width = "64")]

use dlboot::elf::ElfModule;
use dlboot::symbols::accelerated_hash;
use dlboot::testing::{ImageBuilder, SymbolSpec, SyntheticImage};

const BASE: u64 = 0x7f20_0000_0000;

fn names(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("sym_{i:04}_{}", i * 7919 % 1013)).collect()
}

fn image_with(names: &[String], buckets: u32, bloom_words: u32) -> SyntheticImage {
    let mut builder = ImageBuilder::new().bucket_count(buckets).bloom_words(bloom_words);
    for (i, name) in names.iter().enumerate() {
        builder = builder.symbol(SymbolSpec::function(name, 0x1000 + 0x10 * i as u64));
    }
    builder.build(BASE)
}

#[test]
fn test_tables_agree_on_present_names() {
    let names = names(300);
    for (buckets, bloom_words) in [(1, 1), (17, 2), (64, 8), (301, 4)] {
        let image = image_with(&names, buckets, bloom_words);
        let module = ElfModule::build(&image, BASE).unwrap();

        for name in &names {
            let legacy = module.lookup_legacy(name).expect("DT_HASH lookup");
            let accelerated = module.lookup_accelerated(name).expect("DT_GNU_HASH lookup");
            assert_eq!(legacy.index, accelerated.index, "{name} with {buckets} buckets");
            assert_eq!(module.symbol_name(legacy.name_offset), Some(name.as_bytes()));
        }
    }
}

#[test]
fn test_tables_agree_on_absent_names() {
    let image = image_with(&names(100), 13, 2);
    let module = ElfModule::build(&image, BASE).unwrap();

    for i in 0..500 {
        let absent = format!("absent_{i}");
        assert!(module.lookup_legacy(&absent).is_none());
        assert!(module.lookup_accelerated(&absent).is_none());
    }
    // Prefixes and extensions of real names are not matches
    assert!(module.lookup("sym_0001").is_none());
    assert!(module.lookup("sym_0001_7919x").is_none());
}

#[test]
fn test_bloom_has_no_false_negatives() {
    let names = names(500);
    let image = image_with(&names, 37, 2);
    let module = ElfModule::build(&image, BASE).unwrap();
    let table = module.accelerated_table().expect("DT_GNU_HASH present");

    for name in &names {
        let hash = accelerated_hash(name.as_bytes());
        assert!(table.bloom_admits(module.view(), hash).unwrap(), "bloom rejected {name}");
    }
}

#[test]
fn test_bloom_rejects_some_absent_names() {
    let names = names(8);
    let image = image_with(&names, 4, 4);
    let module = ElfModule::build(&image, BASE).unwrap();
    let table = module.accelerated_table().unwrap();

    let rejected = (0..1000)
        .map(|i| accelerated_hash(format!("nothing_here_{i}").as_bytes()))
        .filter(|&hash| !table.bloom_admits(module.view(), hash).unwrap())
        .count();
    // 8 names set at most 16 of 256 bits; most probes must miss
    assert!(rejected > 800, "only {rejected} of 1000 rejected");
}

#[test]
fn test_zero_buckets_means_empty_table() {
    let names = names(10);
    let image = image_with(&names, 0, 1);
    let module = ElfModule::build(&image, BASE).unwrap();

    assert!(module.lookup_accelerated(&names[0]).is_none());
    assert!(module.lookup_legacy(&names[0]).is_none());
}
