//! Plain-text renderings of the query surfaces; the host command
//! dispatcher prints these verbatim.

use crate::bind::BindTable;
use crate::consts::{
    cpu_name, filetype_name, platform_name, source_version_string, version_string,
};
use crate::errors::Result;
use crate::fat::MachFile;
use crate::library::Library;
use crate::objc::ObjCReader;

/// The `file` surface: thin/fat, slice count, per-slice architecture and
/// placement.
pub fn file_report(file: &MachFile) -> String {
    let mut out = String::new();
    if file.is_fat() {
        out.push_str(&format!("fat archive, {} slice(s)\n", file.slices.len()));
    } else {
        out.push_str("thin Mach-O, 1 slice\n");
    }
    for (index, slice) in file.slices.iter().enumerate() {
        out.push_str(&format!(
            "  slice {index}: {} (cputype {:#x}, subtype {:#x}) at {:#x}, {} bytes\n",
            cpu_name(slice.arch.cputype, slice.arch.cpusubtype),
            slice.arch.cputype,
            slice.arch.cpusubtype,
            slice.arch.offset,
            slice.arch.size,
        ));
    }
    out
}

/// The `info` surface: identity, versions and optionally the VM map.
pub fn info_report(lib: &Library, with_vm_map: bool) -> String {
    let mut out = String::new();
    out.push_str(&format!("name:     {}\n", lib.name()));
    out.push_str(&format!(
        "filetype: {}\n",
        filetype_name(lib.header.filetype)
    ));
    out.push_str(&format!(
        "arch:     {}\n",
        cpu_name(lib.header.cputype, lib.header.cpusubtype)
    ));
    out.push_str(&format!("flags:    {:?}\n", lib.header.flags));
    if let Some(uuid) = &lib.uuid {
        let hex: String = uuid.iter().map(|b| format!("{b:02x}")).collect();
        out.push_str(&format!("uuid:     {hex}\n"));
    }
    if let Some(platform) = lib.platform {
        out.push_str(&format!("platform: {}\n", platform_name(platform)));
    }
    if let Some(minos) = lib.minos {
        out.push_str(&format!("minos:    {}\n", version_string(minos)));
    }
    if let Some(sdk) = lib.sdk {
        out.push_str(&format!("sdk:      {}\n", version_string(sdk)));
    }
    if let Some(version) = lib.source_version {
        out.push_str(&format!("source:   {}\n", source_version_string(version)));
    }
    if with_vm_map {
        out.push_str("vm map:\n");
        for seg in &lib.segments {
            out.push_str(&format!(
                "  {:<16} {:#012x}..{:#012x} -> file {:#x}..{:#x}\n",
                seg.name,
                seg.vmaddr,
                seg.vmaddr + seg.vmsize,
                seg.fileoff,
                seg.fileoff + seg.filesize,
            ));
        }
    }
    out
}

/// `list --cmds`.
pub fn list_commands(lib: &Library) -> String {
    let mut out = String::new();
    for (index, lc) in lib.load_commands.iter().enumerate() {
        out.push_str(&format!(
            "{index:3} {:<24} {:5} bytes\n",
            lc.name(),
            lc.cmdsize
        ));
    }
    out
}

/// `list --linked`.
pub fn list_linked(lib: &Library) -> String {
    let mut out = String::new();
    for dylib in &lib.dylibs {
        out.push_str(&format!(
            "{:2} {} ({}, compat {}{})\n",
            dylib.ordinal,
            dylib.install_name,
            version_string(dylib.current_version),
            version_string(dylib.compatibility_version),
            if dylib.weak() { ", weak" } else { "" },
        ));
    }
    out
}

/// `list --classes`.
pub fn list_classes(lib: &Library) -> Result<String> {
    let classes = ObjCReader::new(lib).classes()?;
    let mut out = String::new();
    for class in classes {
        match &class.super_name {
            Some(super_name) => out.push_str(&format!("{} : {super_name}\n", class.name)),
            None => out.push_str(&format!("{}\n", class.name)),
        }
    }
    Ok(out)
}

/// `list --protocols`.
pub fn list_protocols(lib: &Library) -> Result<String> {
    let protocols = ObjCReader::new(lib).protocols()?;
    Ok(protocols
        .into_iter()
        .map(|proto| format!("{}\n", proto.name))
        .collect())
}

/// `symbols --symtab`.
pub fn symbols_table(lib: &Library) -> String {
    let mut out = String::new();
    for sym in &lib.symbols {
        out.push_str(&format!(
            "{:#018x} {:#04x} sect {:2} {}\n",
            sym.addr, sym.n_type, sym.sect, sym.name
        ));
    }
    out
}

/// `symbols --exports`.
pub fn symbols_exports(lib: &Library) -> String {
    let mut out = String::new();
    for export in &lib.exports {
        match export.address() {
            Some(addr) => out.push_str(&format!("{addr:#018x} {}\n", export.name)),
            None => out.push_str(&format!("{:>18} {} (re-export)\n", "-", export.name)),
        }
    }
    out
}

/// `symbols --imports`: undefined symbols resolved against the import
/// ordinal table.
pub fn symbols_imports(lib: &Library) -> String {
    let mut out = String::new();
    for sym in lib.symbols.iter().filter(|s| s.is_undefined()) {
        out.push_str(&format!("{}\n", sym.name));
    }
    out
}

/// `symbols --imp-acts`: the decoded bind actions from all three streams.
pub fn symbols_bind_actions(lib: &Library) -> String {
    let mut out = String::new();
    let mut render = |title: &str, table: &BindTable| {
        if table.actions.is_empty() {
            return;
        }
        out.push_str(&format!("{title}:\n"));
        for action in &table.actions {
            let source = lib
                .dylibs
                .iter()
                .find(|dylib| i64::from(dylib.ordinal) == action.dylib_ordinal)
                .map(|dylib| dylib.install_name.as_str())
                .unwrap_or("<special>");
            out.push_str(&format!(
                "  {:#018x} {} <- {source} (ordinal {})\n",
                action.addr, action.symbol, action.dylib_ordinal
            ));
        }
    };
    render("bind", &lib.binds);
    render("weak bind", &lib.weak_binds);
    render("lazy bind", &lib.lazy_binds);
    out
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testutil::MachBuilder;

    #[test]
    fn info_fields() {
        let bytes = MachBuilder::new_dylib("/usr/lib/libfoo.dylib").build();
        let lib = Library::parse(bytes).unwrap();
        let report = info_report(&lib, false);
        assert!(report.contains("name:     /usr/lib/libfoo.dylib"));
        assert!(report.contains("filetype: dylib"));
        assert!(report.contains("uuid:     00112233445566778899aabbccddeeff"));
        assert!(report.contains("platform: macOS"));
        assert!(report.contains("minos:    13.0.0"));
        assert!(report.contains("sdk:      14.0.0"));
    }

    #[test]
    fn vm_map_lists_segments() {
        let bytes = MachBuilder::new_dylib("/usr/lib/libfoo.dylib").build();
        let lib = Library::parse(bytes).unwrap();
        let report = info_report(&lib, true);
        assert!(report.contains("__TEXT"));
        assert!(report.contains("__LINKEDIT"));
    }

    #[test]
    fn file_report_names_cpus() {
        let bytes = MachBuilder::new_dylib("/usr/lib/libfoo.dylib").build();
        let file = crate::fat::read_file(&bytes).unwrap();
        let report = file_report(&file);
        assert!(report.starts_with("thin Mach-O"));
        assert!(report.contains("ARM64"));
    }

    #[test]
    fn linked_list_shows_ordinals() {
        let bytes = MachBuilder::new_dylib("/usr/lib/libfoo.dylib")
            .link("/usr/lib/libSystem.B.dylib")
            .link_weak("/usr/lib/libweak.dylib")
            .build();
        let lib = Library::parse(bytes).unwrap();
        let report = list_linked(&lib);
        assert!(report.contains(" 1 /usr/lib/libSystem.B.dylib"));
        assert!(report.contains(" 2 /usr/lib/libweak.dylib"));
        assert!(report.contains("weak"));
    }
}
