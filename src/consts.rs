//! Constants lifted from `usr/include/mach-o/loader.h`, `fat.h`,
//! `machine.h` and dyld's `mach-o/fixup-chains.h` / bind opcode tables.

// mach_header magic numbers
pub const MH_MAGIC: u32 = 0xfeedface;
pub const MH_CIGAM: u32 = 0xcefaedfe;
pub const MH_MAGIC_64: u32 = 0xfeedfacf;
pub const MH_CIGAM_64: u32 = 0xcffaedfe;

// fat_header magic numbers; fat headers are big-endian on disk
pub const FAT_MAGIC: u32 = 0xcafebabe;
pub const FAT_CIGAM: u32 = 0xbebafeca;
pub const FAT_MAGIC_64: u32 = 0xcafebabf;
pub const FAT_CIGAM_64: u32 = 0xbfbafeca;

// mach_header filetypes
pub const MH_OBJECT: u32 = 0x1;
pub const MH_EXECUTE: u32 = 0x2;
pub const MH_CORE: u32 = 0x4;
pub const MH_DYLIB: u32 = 0x6;
pub const MH_DYLINKER: u32 = 0x7;
pub const MH_BUNDLE: u32 = 0x8;
pub const MH_DSYM: u32 = 0xa;
pub const MH_KEXT_BUNDLE: u32 = 0xb;
pub const MH_FILESET: u32 = 0xc;

// Set on load commands dyld must understand to run the image
pub const LC_REQ_DYLD: u32 = 0x80000000;

pub const LC_SEGMENT: u32 = 0x1;
pub const LC_SYMTAB: u32 = 0x2;
pub const LC_UNIXTHREAD: u32 = 0x5;
pub const LC_DYSYMTAB: u32 = 0xb;
pub const LC_LOAD_DYLIB: u32 = 0xc;
pub const LC_ID_DYLIB: u32 = 0xd;
pub const LC_LOAD_DYLINKER: u32 = 0xe;
pub const LC_ID_DYLINKER: u32 = 0xf;
pub const LC_SUB_FRAMEWORK: u32 = 0x12;
pub const LC_SUB_CLIENT: u32 = 0x14;
pub const LC_LOAD_WEAK_DYLIB: u32 = 0x18 | LC_REQ_DYLD;
pub const LC_SEGMENT_64: u32 = 0x19;
pub const LC_ROUTINES_64: u32 = 0x1a;
pub const LC_UUID: u32 = 0x1b;
pub const LC_RPATH: u32 = 0x1c | LC_REQ_DYLD;
pub const LC_CODE_SIGNATURE: u32 = 0x1d;
pub const LC_SEGMENT_SPLIT_INFO: u32 = 0x1e;
pub const LC_REEXPORT_DYLIB: u32 = 0x1f | LC_REQ_DYLD;
pub const LC_LAZY_LOAD_DYLIB: u32 = 0x20;
pub const LC_ENCRYPTION_INFO: u32 = 0x21;
pub const LC_DYLD_INFO: u32 = 0x22;
pub const LC_DYLD_INFO_ONLY: u32 = 0x22 | LC_REQ_DYLD;
pub const LC_LOAD_UPWARD_DYLIB: u32 = 0x23 | LC_REQ_DYLD;
pub const LC_VERSION_MIN_MACOSX: u32 = 0x24;
pub const LC_VERSION_MIN_IPHONEOS: u32 = 0x25;
pub const LC_FUNCTION_STARTS: u32 = 0x26;
pub const LC_DYLD_ENVIRONMENT: u32 = 0x27;
pub const LC_MAIN: u32 = 0x28 | LC_REQ_DYLD;
pub const LC_DATA_IN_CODE: u32 = 0x29;
pub const LC_SOURCE_VERSION: u32 = 0x2a;
pub const LC_DYLIB_CODE_SIGN_DRS: u32 = 0x2b;
pub const LC_ENCRYPTION_INFO_64: u32 = 0x2c;
pub const LC_LINKER_OPTION: u32 = 0x2d;
pub const LC_LINKER_OPTIMIZATION_HINT: u32 = 0x2e;
pub const LC_VERSION_MIN_TVOS: u32 = 0x2f;
pub const LC_VERSION_MIN_WATCHOS: u32 = 0x30;
pub const LC_NOTE: u32 = 0x31;
pub const LC_BUILD_VERSION: u32 = 0x32;
pub const LC_DYLD_EXPORTS_TRIE: u32 = 0x33 | LC_REQ_DYLD;
pub const LC_DYLD_CHAINED_FIXUPS: u32 = 0x34 | LC_REQ_DYLD;

// cpu_type_t
pub const CPU_ARCH_ABI64: i32 = 0x0100_0000;
pub const CPU_TYPE_X86: i32 = 7;
pub const CPU_TYPE_X86_64: i32 = CPU_TYPE_X86 | CPU_ARCH_ABI64;
pub const CPU_TYPE_ARM: i32 = 12;
pub const CPU_TYPE_ARM64: i32 = CPU_TYPE_ARM | CPU_ARCH_ABI64;
pub const CPU_TYPE_POWERPC: i32 = 18;
pub const CPU_TYPE_POWERPC64: i32 = CPU_TYPE_POWERPC | CPU_ARCH_ABI64;

// cpu_subtype_t, masked of capability bits
pub const CPU_SUBTYPE_MASK: i32 = 0x00ff_ffff;
pub const CPU_SUBTYPE_ARM_V6: i32 = 6;
pub const CPU_SUBTYPE_ARM_V7: i32 = 9;
pub const CPU_SUBTYPE_ARM_V7S: i32 = 11;
pub const CPU_SUBTYPE_ARM_V7K: i32 = 12;
pub const CPU_SUBTYPE_ARM64_ALL: i32 = 0;
pub const CPU_SUBTYPE_ARM64E: i32 = 2;

// build_version_command platforms
pub const PLATFORM_MACOS: u32 = 1;
pub const PLATFORM_IOS: u32 = 2;
pub const PLATFORM_TVOS: u32 = 3;
pub const PLATFORM_WATCHOS: u32 = 4;
pub const PLATFORM_BRIDGEOS: u32 = 5;
pub const PLATFORM_MACCATALYST: u32 = 6;
pub const PLATFORM_IOSSIMULATOR: u32 = 7;
pub const PLATFORM_TVOSSIMULATOR: u32 = 8;
pub const PLATFORM_WATCHOSSIMULATOR: u32 = 9;
pub const PLATFORM_DRIVERKIT: u32 = 10;

// nlist n_type bit fields
pub const N_STAB: u8 = 0xe0;
pub const N_PEXT: u8 = 0x10;
pub const N_TYPE: u8 = 0x0e;
pub const N_EXT: u8 = 0x01;
pub const N_UNDF: u8 = 0x0;
pub const N_ABS: u8 = 0x2;
pub const N_SECT: u8 = 0xe;
pub const N_INDR: u8 = 0xa;

// dyld bind opcode stream; high nibble is the opcode, low the immediate
pub const BIND_OPCODE_MASK: u8 = 0xf0;
pub const BIND_IMMEDIATE_MASK: u8 = 0x0f;
pub const BIND_OPCODE_DONE: u8 = 0x00;
pub const BIND_OPCODE_SET_DYLIB_ORDINAL_IMM: u8 = 0x10;
pub const BIND_OPCODE_SET_DYLIB_ORDINAL_ULEB: u8 = 0x20;
pub const BIND_OPCODE_SET_DYLIB_SPECIAL_IMM: u8 = 0x30;
pub const BIND_OPCODE_SET_SYMBOL_TRAILING_FLAGS_IMM: u8 = 0x40;
pub const BIND_OPCODE_SET_TYPE_IMM: u8 = 0x50;
pub const BIND_OPCODE_SET_ADDEND_SLEB: u8 = 0x60;
pub const BIND_OPCODE_SET_SEGMENT_AND_OFFSET_ULEB: u8 = 0x70;
pub const BIND_OPCODE_ADD_ADDR_ULEB: u8 = 0x80;
pub const BIND_OPCODE_DO_BIND: u8 = 0x90;
pub const BIND_OPCODE_DO_BIND_ADD_ADDR_ULEB: u8 = 0xa0;
pub const BIND_OPCODE_DO_BIND_ADD_ADDR_IMM_SCALED: u8 = 0xb0;
pub const BIND_OPCODE_DO_BIND_ULEB_TIMES_SKIPPING_ULEB: u8 = 0xc0;

// Special dylib ordinals set via BIND_OPCODE_SET_DYLIB_SPECIAL_IMM
pub const BIND_SPECIAL_DYLIB_SELF: i64 = 0;
pub const BIND_SPECIAL_DYLIB_MAIN_EXECUTABLE: i64 = -1;
pub const BIND_SPECIAL_DYLIB_FLAT_LOOKUP: i64 = -2;
pub const BIND_SPECIAL_DYLIB_WEAK_LOOKUP: i64 = -3;

// Export trie terminal flags
pub const EXPORT_SYMBOL_FLAGS_KIND_MASK: u64 = 0x03;
pub const EXPORT_SYMBOL_FLAGS_WEAK_DEFINITION: u64 = 0x04;
pub const EXPORT_SYMBOL_FLAGS_REEXPORT: u64 = 0x08;
pub const EXPORT_SYMBOL_FLAGS_STUB_AND_RESOLVER: u64 = 0x10;

bitflags::bitflags! {
    /// `mach_header.flags`. Unknown bits are retained so rewritten headers
    /// stay byte-identical.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HeaderFlags: u32 {
        const NOUNDEFS = 0x1;
        const INCRLINK = 0x2;
        const DYLDLINK = 0x4;
        const BINDATLOAD = 0x8;
        const PREBOUND = 0x10;
        const SPLIT_SEGS = 0x20;
        const LAZY_INIT = 0x40;
        const TWOLEVEL = 0x80;
        const FORCE_FLAT = 0x100;
        const NOMULTIDEFS = 0x200;
        const NOFIXPREBINDING = 0x400;
        const PREBINDABLE = 0x800;
        const ALLMODSBOUND = 0x1000;
        const SUBSECTIONS_VIA_SYMBOLS = 0x2000;
        const CANONICAL = 0x4000;
        const WEAK_DEFINES = 0x8000;
        const BINDS_TO_WEAK = 0x10000;
        const ALLOW_STACK_EXECUTION = 0x20000;
        const ROOT_SAFE = 0x40000;
        const SETUID_SAFE = 0x80000;
        const NO_REEXPORTED_DYLIBS = 0x100000;
        const PIE = 0x200000;
        const DEAD_STRIPPABLE_DYLIB = 0x400000;
        const HAS_TLV_DESCRIPTORS = 0x800000;
        const NO_HEAP_EXECUTION = 0x1000000;
        const APP_EXTENSION_SAFE = 0x2000000;
        const NLIST_OUTOFSYNC_WITH_DYLDINFO = 0x4000000;
        const SIM_SUPPORT = 0x8000000;
        const DYLIB_IN_CACHE = 0x80000000;

        const _ = !0;
    }
}

/// Human name for a cpu_type/cpu_subtype pair, the way `lipo -info` and
/// `otool` spell them.
pub fn cpu_name(cpu_type: i32, cpu_subtype: i32) -> &'static str {
    match (cpu_type, cpu_subtype & CPU_SUBTYPE_MASK) {
        (CPU_TYPE_X86, _) => "X86",
        (CPU_TYPE_X86_64, _) => "X86_64",
        (CPU_TYPE_ARM, CPU_SUBTYPE_ARM_V6) => "armv6",
        (CPU_TYPE_ARM, CPU_SUBTYPE_ARM_V7) => "armv7",
        (CPU_TYPE_ARM, CPU_SUBTYPE_ARM_V7S) => "armv7s",
        (CPU_TYPE_ARM, CPU_SUBTYPE_ARM_V7K) => "armv7k",
        (CPU_TYPE_ARM, _) => "ARM",
        (CPU_TYPE_ARM64, CPU_SUBTYPE_ARM64E) => "arm64e",
        (CPU_TYPE_ARM64, _) => "ARM64",
        (CPU_TYPE_POWERPC, _) => "PowerPC",
        (CPU_TYPE_POWERPC64, _) => "PowerPC64",
        _ => "unknown",
    }
}

/// Parses an `--extract`-style arch name back into a cpu_type/cpu_subtype
/// pair. Case-insensitive on the fixed names.
pub fn cpu_for_name(name: &str) -> Option<(i32, i32)> {
    let lowered = name.to_ascii_lowercase();
    Some(match lowered.as_str() {
        "x86" | "i386" => (CPU_TYPE_X86, 3),
        "x86_64" => (CPU_TYPE_X86_64, 3),
        "armv6" => (CPU_TYPE_ARM, CPU_SUBTYPE_ARM_V6),
        "armv7" => (CPU_TYPE_ARM, CPU_SUBTYPE_ARM_V7),
        "armv7s" => (CPU_TYPE_ARM, CPU_SUBTYPE_ARM_V7S),
        "armv7k" => (CPU_TYPE_ARM, CPU_SUBTYPE_ARM_V7K),
        "arm64" => (CPU_TYPE_ARM64, CPU_SUBTYPE_ARM64_ALL),
        "arm64e" => (CPU_TYPE_ARM64, CPU_SUBTYPE_ARM64E),
        _ => return None,
    })
}

pub fn platform_name(platform: u32) -> &'static str {
    match platform {
        PLATFORM_MACOS => "macOS",
        PLATFORM_IOS => "iOS",
        PLATFORM_TVOS => "tvOS",
        PLATFORM_WATCHOS => "watchOS",
        PLATFORM_BRIDGEOS => "bridgeOS",
        PLATFORM_MACCATALYST => "Mac Catalyst",
        PLATFORM_IOSSIMULATOR => "iOS Simulator",
        PLATFORM_TVOSSIMULATOR => "tvOS Simulator",
        PLATFORM_WATCHOSSIMULATOR => "watchOS Simulator",
        PLATFORM_DRIVERKIT => "DriverKit",
        _ => "unknown",
    }
}

pub fn filetype_name(filetype: u32) -> &'static str {
    match filetype {
        MH_OBJECT => "object",
        MH_EXECUTE => "executable",
        MH_CORE => "core",
        MH_DYLIB => "dylib",
        MH_DYLINKER => "dylinker",
        MH_BUNDLE => "bundle",
        MH_DSYM => "dSYM",
        MH_KEXT_BUNDLE => "kext",
        MH_FILESET => "fileset",
        _ => "unknown",
    }
}

/// Renders an `X.Y.Z` version packed as `xxxx.yy.zz` nibbles.
pub fn version_string(version: u32) -> String {
    format!(
        "{}.{}.{}",
        version >> 16,
        (version >> 8) & 0xff,
        version & 0xff
    )
}

/// `source_version_command` packs five components as `a.b.c.d.e`
/// (a: 24 bits, the rest 10 bits each).
pub fn source_version_string(version: u64) -> String {
    format!(
        "{}.{}.{}.{}.{}",
        version >> 40,
        (version >> 30) & 0x3ff,
        (version >> 20) & 0x3ff,
        (version >> 10) & 0x3ff,
        version & 0x3ff
    )
}
