//! Renders a text-based stub (`.tbd`) describing a dylib's linkable
//! surface without its code.

use crate::commands::DylibKind;
use crate::consts::{cpu_name, platform_name, version_string};
use crate::errors::Result;
use crate::library::Library;
use crate::objc::ObjCReader;

const OBJC_CLASS_PREFIX: &str = "_OBJC_CLASS_$_";
const OBJC_METACLASS_PREFIX: &str = "_OBJC_METACLASS_$_";
const OBJC_IVAR_PREFIX: &str = "_OBJC_IVAR_$_";

/// Produces canonical stub text: every list is sorted and deduplicated so
/// two runs over the same binary are byte-identical.
pub fn tbd(lib: &Library) -> Result<String> {
    let arch = cpu_name(lib.arch.cputype, lib.arch.cpusubtype).to_ascii_lowercase();

    let mut symbols = Vec::new();
    let mut objc_classes = Vec::new();
    let mut objc_ivars = Vec::new();
    for export in &lib.exports {
        if let Some(name) = export.name.strip_prefix(OBJC_CLASS_PREFIX) {
            objc_classes.push(name.to_string());
        } else if export.name.starts_with(OBJC_METACLASS_PREFIX) {
            // implied by the class entry
        } else if let Some(name) = export.name.strip_prefix(OBJC_IVAR_PREFIX) {
            objc_ivars.push(name.to_string());
        } else {
            symbols.push(export.name.clone());
        }
    }
    // classlist entries cover stripped images with no export trie
    let mut reader = ObjCReader::new(lib);
    for class in reader.classes()? {
        objc_classes.push(class.name);
    }

    let mut reexports: Vec<String> = lib
        .dylibs
        .iter()
        .filter(|dylib| dylib.kind == DylibKind::Reexport)
        .map(|dylib| dylib.install_name.clone())
        .collect();

    for list in [
        &mut symbols,
        &mut objc_classes,
        &mut objc_ivars,
        &mut reexports,
    ] {
        list.sort();
        list.dedup();
    }

    let platform = lib
        .platform
        .map(tbd_platform)
        .unwrap_or("unknown")
        .to_string();
    let install_name = lib.install_name.clone().unwrap_or_default();
    let (current, compat) = lib
        .load_commands
        .iter()
        .find_map(|lc| match lc.dylib() {
            Some(dylib) if dylib.kind == DylibKind::Id => {
                Some((dylib.current_version, dylib.compatibility_version))
            }
            _ => None,
        })
        .unwrap_or((0x0001_0000, 0x0001_0000));

    let mut out = String::new();
    out.push_str("--- !tapi-tbd-v2\n");
    out.push_str(&format!("archs:                 [ {arch} ]\n"));
    if let Some(uuid) = &lib.uuid {
        out.push_str(&format!(
            "uuids:                 [ '{arch}: {}' ]\n",
            format_uuid(uuid)
        ));
    }
    out.push_str(&format!("platform:              {platform}\n"));
    out.push_str(&format!("install-name:          '{install_name}'\n"));
    out.push_str(&format!(
        "current-version:       {}\n",
        version_string(current)
    ));
    out.push_str(&format!(
        "compatibility-version: {}\n",
        version_string(compat)
    ));
    out.push_str("exports:\n");
    out.push_str(&format!("  - archs:           [ {arch} ]\n"));
    push_list(&mut out, "re-exports", &reexports);
    push_list(&mut out, "symbols", &symbols);
    push_list(&mut out, "objc-classes", &objc_classes);
    push_list(&mut out, "objc-ivars", &objc_ivars);
    out.push_str("...\n");
    Ok(out)
}

fn push_list(out: &mut String, key: &str, values: &[String]) {
    if values.is_empty() {
        return;
    }
    out.push_str(&format!(
        "    {key}:{}[ {} ]\n",
        " ".repeat(17usize.saturating_sub(key.len()).max(1)),
        values.join(", ")
    ));
}

fn tbd_platform(platform: u32) -> &'static str {
    match platform_name(platform) {
        "macOS" => "macosx",
        "iOS" => "ios",
        "tvOS" => "tvos",
        "watchOS" => "watchos",
        "bridgeOS" => "bridgeos",
        _ => "unknown",
    }
}

fn format_uuid(uuid: &[u8; 16]) -> String {
    let hex: Vec<String> = uuid.iter().map(|b| format!("{b:02X}")).collect();
    format!(
        "{}-{}-{}-{}-{}",
        hex[0..4].join(""),
        hex[4..6].join(""),
        hex[6..8].join(""),
        hex[8..10].join(""),
        hex[10..16].join("")
    )
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testutil::MachBuilder;

    fn export_trie_two_symbols() -> Vec<u8> {
        // root -> "_" -> {"alpha", "beta"}; addresses inside __text
        let mut t = Vec::new();
        t.extend_from_slice(&[0x00, 0x01]);
        t.extend_from_slice(b"_\0");
        t.push(5);
        assert_eq!(t.len(), 5);
        t.extend_from_slice(&[0x00, 0x02]);
        t.extend_from_slice(b"alpha\0");
        t.push(20);
        t.extend_from_slice(b"beta\0");
        t.push(25);
        assert_eq!(t.len(), 20);
        // "_alpha": terminal {flags 0, offset 0xf00}
        t.extend_from_slice(&[0x03, 0x00, 0x80, 0x1e, 0x00]);
        assert_eq!(t.len(), 25);
        // "_beta": terminal {flags 0, offset 0xf10}
        t.extend_from_slice(&[0x03, 0x00, 0x90, 0x1e, 0x00]);
        t
    }

    #[test]
    fn canonical_stub() {
        let bytes = MachBuilder::new_dylib("/usr/lib/libfoo.dylib")
            .export_trie(export_trie_two_symbols())
            .build();
        let lib = crate::library::Library::parse(bytes).unwrap();
        let text = tbd(&lib).unwrap();
        assert!(text.starts_with("--- !tapi-tbd-v2\n"));
        assert!(text.contains("[ arm64 ]"));
        assert!(text.contains("macosx"));
        assert!(text.contains("'/usr/lib/libfoo.dylib'"));
        assert!(text.contains("1.0.0"));
        assert!(text.contains("symbols:"));
        // sorted order
        let alpha = text.find("_alpha").unwrap();
        let beta = text.find("_beta").unwrap();
        assert!(alpha < beta);
        assert!(text.ends_with("...\n"));
    }

    #[test]
    fn stable_output() {
        let bytes = MachBuilder::new_dylib("/usr/lib/libbar.dylib").build();
        let lib = crate::library::Library::parse(bytes).unwrap();
        assert_eq!(tbd(&lib).unwrap(), tbd(&lib).unwrap());
    }
}
