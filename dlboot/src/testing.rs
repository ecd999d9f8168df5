//! Synthetic in-memory ELF images
//!
//! Lets the locator, reader and resolver be exercised without a live C
//! library: [`ImageBuilder`] lays out a minimal shared object (header, two
//! program headers, `.dynsym`, `.dynstr`, both hash tables, optional
//! `.gnu.version`, `.dynamic`) and [`SyntheticImage`] serves it at any
//! chosen base address.

use crate::elf::AddressSpace;

/// An owned byte buffer pretending to be mapped at `base`
#[derive(Debug, Clone)]
pub struct SyntheticImage {
    base: u64,
    bytes: Vec<u8>,
}

impl SyntheticImage {
    #[must_use]
    pub fn new(base: u64, bytes: Vec<u8>) -> Self {
        Self { base, bytes }
    }

    #[must_use]
    pub fn base(&self) -> u64 {
        self.base
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

impl AddressSpace for SyntheticImage {
    fn read(&self, addr: u64, len: usize) -> Option<&[u8]> {
        let start = usize::try_from(addr.checked_sub(self.base)?).ok()?;
        self.bytes.get(start..start.checked_add(len)?)
    }
}

/// Several images behind one address space, each at its own base
#[derive(Debug, Clone, Default)]
pub struct SyntheticProcess {
    images: Vec<SyntheticImage>,
}

impl SyntheticProcess {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_image(mut self, image: SyntheticImage) -> Self {
        self.images.push(image);
        self
    }
}

impl AddressSpace for SyntheticProcess {
    fn read(&self, addr: u64, len: usize) -> Option<&[u8]> {
        self.images.iter().find_map(|image| image.read(addr, len))
    }
}

#[cfg(target_pointer_width = "64")]
pub use builder::{ImageBuilder, SymbolSpec};

#[cfg(target_pointer_width = "64")]
mod builder {
    use object::elf;
    use object::endian::{U16, U32, U64};
    use object::pod::bytes_of;
    use std::mem::size_of;

    use super::SyntheticImage;
    use crate::elf::{endian, ElfDyn, ElfHeader, ElfPhdr, ElfSym};
    use crate::symbols::{accelerated_hash, legacy_hash};

    const BLOOM_SHIFT: u32 = 6;
    const WORD_BITS: u32 = 64;

    /// One dynamic symbol to place in the image
    #[derive(Debug, Clone)]
    pub struct SymbolSpec {
        pub name: String,
        pub value: u64,
        pub size: u64,
        pub st_type: u8,
        pub binding: u8,
        pub defined: bool,
        pub version: u16,
    }

    impl SymbolSpec {
        fn new(name: &str, value: u64, st_type: u8) -> Self {
            Self {
                name: name.to_string(),
                value,
                size: 16,
                st_type,
                binding: elf::STB_GLOBAL,
                defined: true,
                version: elf::VER_NDX_GLOBAL,
            }
        }

        #[must_use]
        pub fn function(name: &str, value: u64) -> Self {
            Self::new(name, value, elf::STT_FUNC)
        }

        #[must_use]
        pub fn ifunc(name: &str, value: u64) -> Self {
            Self::new(name, value, elf::STT_GNU_IFUNC)
        }

        #[must_use]
        pub fn object(name: &str, value: u64) -> Self {
            Self::new(name, value, elf::STT_OBJECT)
        }

        /// An imported function: `SHN_UNDEF`, value 0
        #[must_use]
        pub fn undefined(name: &str) -> Self {
            Self { defined: false, value: 0, size: 0, ..Self::new(name, 0, elf::STT_FUNC) }
        }

        #[must_use]
        pub fn with_version(mut self, version: u16) -> Self {
            self.version = version;
            self
        }
    }

    /// Builder for a minimal 64-bit shared object image
    #[derive(Debug, Clone)]
    pub struct ImageBuilder {
        symbols: Vec<SymbolSpec>,
        legacy_hash: bool,
        accelerated_hash: bool,
        versions: bool,
        dynamic_header: bool,
        absolute_pointers: bool,
        bucket_count: Option<u32>,
        bloom_words: u32,
        raw_tags: Vec<(u32, u64)>,
        omitted_tags: Vec<u32>,
        dynamic_vaddr: Option<u64>,
    }

    impl Default for ImageBuilder {
        fn default() -> Self {
            Self {
                symbols: Vec::new(),
                legacy_hash: true,
                accelerated_hash: true,
                versions: false,
                dynamic_header: true,
                absolute_pointers: false,
                bucket_count: None,
                bloom_words: 1,
                raw_tags: Vec::new(),
                omitted_tags: Vec::new(),
                dynamic_vaddr: None,
            }
        }
    }

    /// Where each section landed, as offsets from the image start
    struct Layout {
        symtab: u64,
        strtab: u64,
        strsz: u64,
        hash: Option<u64>,
        gnu_hash: Option<u64>,
        versym: Option<u64>,
        dynamic: u64,
    }

    impl ImageBuilder {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        #[must_use]
        pub fn symbol(mut self, symbol: SymbolSpec) -> Self {
            self.symbols.push(symbol);
            self
        }

        #[must_use]
        pub fn legacy_hash(mut self, enabled: bool) -> Self {
            self.legacy_hash = enabled;
            self
        }

        #[must_use]
        pub fn accelerated_hash(mut self, enabled: bool) -> Self {
            self.accelerated_hash = enabled;
            self
        }

        #[must_use]
        pub fn versions(mut self, enabled: bool) -> Self {
            self.versions = enabled;
            self
        }

        /// Emit `PT_NULL` where `PT_DYNAMIC` would be
        #[must_use]
        pub fn without_dynamic_header(mut self) -> Self {
            self.dynamic_header = false;
            self
        }

        /// Store dynamic pointers pre-relocated (base added) instead of as offsets
        #[must_use]
        pub fn absolute_pointers(mut self, enabled: bool) -> Self {
            self.absolute_pointers = enabled;
            self
        }

        #[must_use]
        pub fn bucket_count(mut self, count: u32) -> Self {
            self.bucket_count = Some(count);
            self
        }

        #[must_use]
        pub fn bloom_words(mut self, count: u32) -> Self {
            self.bloom_words = count;
            self
        }

        /// Override (or add) a dynamic tag with a verbatim value
        #[must_use]
        pub fn raw_tag(mut self, tag: u32, value: u64) -> Self {
            self.raw_tags.push((tag, value));
            self
        }

        /// Leave `tag` out of `.dynamic` entirely
        #[must_use]
        pub fn without_tag(mut self, tag: u32) -> Self {
            self.omitted_tags.push(tag);
            self
        }

        /// Point `PT_DYNAMIC` at `vaddr` instead of the real `.dynamic`
        #[must_use]
        pub fn dynamic_address(mut self, vaddr: u64) -> Self {
            self.dynamic_vaddr = Some(vaddr);
            self
        }

        /// Symbols in `.dynsym` order: null entry, imports, then definitions
        /// grouped by `DT_GNU_HASH` bucket. Returns the order and `symoffset`.
        fn ordered_symbols(&self, bucket_count: u32) -> (Vec<Option<&SymbolSpec>>, u32) {
            let mut ordered: Vec<Option<&SymbolSpec>> = vec![None];
            ordered.extend(self.symbols.iter().filter(|s| !s.defined).map(Some));
            let symbol_offset = u32::try_from(ordered.len()).unwrap_or(u32::MAX);

            let mut defined: Vec<&SymbolSpec> = self.symbols.iter().filter(|s| s.defined).collect();
            defined.sort_by_key(|s| accelerated_hash(s.name.as_bytes()) % bucket_count);
            ordered.extend(defined.into_iter().map(Some));
            (ordered, symbol_offset)
        }

        /// Lay the image out for loading at `base`
        #[must_use]
        #[allow(clippy::too_many_lines, clippy::cast_possible_truncation)]
        pub fn build(&self, base: u64) -> SyntheticImage {
            let e = endian();
            let defined_count = self.symbols.iter().filter(|s| s.defined).count() as u32;
            let bucket_count = self.bucket_count.unwrap_or(defined_count.max(1));
            let (ordered, symbol_offset) = self.ordered_symbols(bucket_count.max(1));

            let mut bytes = vec![0u8; size_of::<ElfHeader>() + 2 * size_of::<ElfPhdr>()];

            // .dynstr
            let mut strtab = vec![0u8];
            let mut name_offsets = vec![0u32];
            for spec in ordered.iter().skip(1).flatten() {
                name_offsets.push(strtab.len() as u32);
                strtab.extend_from_slice(spec.name.as_bytes());
                strtab.push(0);
            }

            // .dynsym
            let symtab = align(&mut bytes);
            for (i, spec) in ordered.iter().enumerate() {
                let sym = match spec {
                    None => ElfSym {
                        st_name: U32::new(e, 0),
                        st_info: 0,
                        st_other: 0,
                        st_shndx: U16::new(e, 0),
                        st_value: U64::new(e, 0),
                        st_size: U64::new(e, 0),
                    },
                    Some(spec) => ElfSym {
                        st_name: U32::new(e, name_offsets[i]),
                        st_info: (spec.binding << 4) | (spec.st_type & 0xf),
                        st_other: elf::STV_DEFAULT,
                        st_shndx: U16::new(e, if spec.defined { 1 } else { elf::SHN_UNDEF }),
                        st_value: U64::new(e, spec.value),
                        st_size: U64::new(e, spec.size),
                    },
                };
                bytes.extend_from_slice(bytes_of(&sym));
            }

            let strtab_off = align(&mut bytes);
            let strsz = strtab.len() as u64;
            bytes.extend_from_slice(&strtab);

            // .hash
            let hash = self.legacy_hash.then(|| {
                let off = align(&mut bytes);
                let nchain = ordered.len() as u32;
                let mut buckets = vec![0u32; bucket_count as usize];
                let mut chains = vec![0u32; nchain as usize];
                for (i, spec) in ordered.iter().enumerate().skip(1).rev() {
                    let name = spec.map_or(&b""[..], |s| s.name.as_bytes());
                    if bucket_count == 0 {
                        continue;
                    }
                    let b = (legacy_hash(name) % bucket_count) as usize;
                    chains[i] = buckets[b];
                    buckets[b] = i as u32;
                }
                for word in [bucket_count, nchain].iter().chain(&buckets).chain(&chains) {
                    bytes.extend_from_slice(&word.to_ne_bytes());
                }
                off
            });

            // .gnu.hash
            let gnu_hash = self.accelerated_hash.then(|| {
                let off = align(&mut bytes);
                let mut bloom = vec![0u64; self.bloom_words as usize];
                let mut buckets = vec![0u32; bucket_count as usize];
                let mut chains = Vec::new();

                let defined = &ordered[symbol_offset as usize..];
                for (j, spec) in defined.iter().enumerate() {
                    let name = spec.map_or(&b""[..], |s| s.name.as_bytes());
                    let h = accelerated_hash(name);
                    if !bloom.is_empty() {
                        let word = ((h / WORD_BITS) % self.bloom_words) as usize;
                        bloom[word] |= (1u64 << (h % WORD_BITS))
                            | (1u64 << ((h >> BLOOM_SHIFT) % WORD_BITS));
                    }
                    let b = if bucket_count == 0 { 0 } else { h % bucket_count };
                    if bucket_count > 0 && buckets[b as usize] == 0 {
                        buckets[b as usize] = symbol_offset + j as u32;
                    }
                    let next_b = defined.get(j + 1).map(|next| {
                        let next_name = next.map_or(&b""[..], |s| s.name.as_bytes());
                        if bucket_count == 0 { 0 } else { accelerated_hash(next_name) % bucket_count }
                    });
                    let last_in_bucket = next_b != Some(b);
                    chains.push(if last_in_bucket { h | 1 } else { h & !1 });
                }

                for word in [bucket_count, symbol_offset, self.bloom_words, BLOOM_SHIFT] {
                    bytes.extend_from_slice(&word.to_ne_bytes());
                }
                for word in &bloom {
                    bytes.extend_from_slice(&word.to_ne_bytes());
                }
                for word in buckets.iter().chain(&chains) {
                    bytes.extend_from_slice(&word.to_ne_bytes());
                }
                off
            });

            // .gnu.version
            let versym = self.versions.then(|| {
                let off = align(&mut bytes);
                for spec in &ordered {
                    let version = spec.map_or(elf::VER_NDX_LOCAL, |s| s.version);
                    bytes.extend_from_slice(&version.to_ne_bytes());
                }
                off
            });

            let dynamic = align(&mut bytes);
            let layout =
                Layout { symtab, strtab: strtab_off, strsz, hash, gnu_hash, versym, dynamic };
            self.write_dynamic(&mut bytes, &layout, base);
            self.write_headers(&mut bytes, &layout);

            SyntheticImage::new(base, bytes)
        }

        fn write_dynamic(&self, bytes: &mut Vec<u8>, layout: &Layout, base: u64) {
            let e = endian();
            let pointer = |offset: u64| if self.absolute_pointers { base + offset } else { offset };

            let mut tags: Vec<(u32, u64)> = Vec::new();
            if let Some(hash) = layout.hash {
                tags.push((elf::DT_HASH, pointer(hash)));
            }
            if let Some(gnu_hash) = layout.gnu_hash {
                tags.push((elf::DT_GNU_HASH, pointer(gnu_hash)));
            }
            tags.push((elf::DT_STRTAB, pointer(layout.strtab)));
            tags.push((elf::DT_SYMTAB, pointer(layout.symtab)));
            tags.push((elf::DT_STRSZ, layout.strsz));
            tags.push((elf::DT_SYMENT, size_of::<ElfSym>() as u64));
            if let Some(versym) = layout.versym {
                tags.push((elf::DT_VERSYM, pointer(versym)));
            }
            for &(tag, value) in &self.raw_tags {
                match tags.iter_mut().find(|(t, _)| *t == tag) {
                    Some(entry) => entry.1 = value,
                    None => tags.push((tag, value)),
                }
            }
            tags.retain(|(tag, _)| !self.omitted_tags.contains(tag));
            tags.push((elf::DT_NULL, 0));

            for (tag, value) in tags {
                let entry = ElfDyn { d_tag: U64::new(e, u64::from(tag)), d_val: U64::new(e, value) };
                bytes.extend_from_slice(bytes_of(&entry));
            }
        }

        #[allow(clippy::cast_possible_truncation)]
        fn write_headers(&self, bytes: &mut [u8], layout: &Layout) {
            let e = endian();
            let image_len = bytes.len() as u64;

            let header = ElfHeader {
                e_ident: elf::Ident {
                    magic: elf::ELFMAG,
                    class: elf::ELFCLASS64,
                    data: if cfg!(target_endian = "little") {
                        elf::ELFDATA2LSB
                    } else {
                        elf::ELFDATA2MSB
                    },
                    version: elf::EV_CURRENT,
                    os_abi: elf::ELFOSABI_NONE,
                    abi_version: 0,
                    padding: [0; 7],
                },
                e_type: U16::new(e, elf::ET_DYN),
                e_machine: U16::new(e, elf::EM_X86_64),
                e_version: U32::new(e, u32::from(elf::EV_CURRENT)),
                e_entry: U64::new(e, 0),
                e_phoff: U64::new(e, size_of::<ElfHeader>() as u64),
                e_shoff: U64::new(e, 0),
                e_flags: U32::new(e, 0),
                e_ehsize: U16::new(e, size_of::<ElfHeader>() as u16),
                e_phentsize: U16::new(e, size_of::<ElfPhdr>() as u16),
                e_phnum: U16::new(e, 2),
                e_shentsize: U16::new(e, 0),
                e_shnum: U16::new(e, 0),
                e_shstrndx: U16::new(e, 0),
            };
            let load = ElfPhdr {
                p_type: U32::new(e, elf::PT_LOAD),
                p_flags: U32::new(e, elf::PF_R | elf::PF_X),
                p_offset: U64::new(e, 0),
                p_vaddr: U64::new(e, 0),
                p_paddr: U64::new(e, 0),
                p_filesz: U64::new(e, image_len),
                p_memsz: U64::new(e, image_len),
                p_align: U64::new(e, 0x1000),
            };
            let dynamic_size = image_len - layout.dynamic;
            let dynamic = ElfPhdr {
                p_type: U32::new(
                    e,
                    if self.dynamic_header { elf::PT_DYNAMIC } else { elf::PT_NULL },
                ),
                p_flags: U32::new(e, elf::PF_R | elf::PF_W),
                p_offset: U64::new(e, layout.dynamic),
                p_vaddr: U64::new(e, self.dynamic_vaddr.unwrap_or(layout.dynamic)),
                p_paddr: U64::new(e, self.dynamic_vaddr.unwrap_or(layout.dynamic)),
                p_filesz: U64::new(e, dynamic_size),
                p_memsz: U64::new(e, dynamic_size),
                p_align: U64::new(e, 8),
            };

            let mut offset = 0;
            for record in [bytes_of(&header), bytes_of(&load), bytes_of(&dynamic)] {
                bytes[offset..offset + record.len()].copy_from_slice(record);
                offset += record.len();
            }
        }
    }

    /// Pad to an 8-byte boundary and return the new end offset
    fn align(bytes: &mut Vec<u8>) -> u64 {
        bytes.resize(bytes.len().next_multiple_of(8), 0);
        bytes.len() as u64
    }
}
