//! Walks the Objective-C runtime metadata embedded in `__DATA`-family
//! segments: class list, category list, protocol list, and everything
//! hanging off them.
//!
//! All pointers here are virtual addresses and go through the segment map.
//! A visited set guards against metadata cycles; addresses seen twice are
//! recorded by name only instead of being walked again.

use crate::errors::Result;
use crate::library::Library;
use std::collections::HashSet;

// class_data_bits_t stashes flags in the low bits of the class_ro pointer
const FAST_DATA_MASK: u64 = 0x7;
// method_list_t.entsize_and_flags
const METHOD_LIST_SMALL: u32 = 0x8000_0000;
const METHOD_LIST_ENTSIZE_MASK: u32 = 0xfffc;

bitflags::bitflags! {
    /// `class_ro_t.flags`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ClassRoFlags: u32 {
        const META = 0x1;
        const ROOT = 0x2;
        const HAS_CXX_STRUCTORS = 0x4;
        const EXCEPTION = 0x20;
        const SWIFT_STABLE = 0x40;
        const IS_ARC = 0x80;

        const _ = !0;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjCMethod {
    pub selector: String,
    pub type_encoding: String,
    pub imp: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjCProperty {
    pub name: String,
    /// The raw attribute string, e.g. `T@"NSString",R,N,V_name`.
    pub attributes: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjCIvar {
    pub name: String,
    pub type_encoding: String,
    pub offset: u64,
    pub size: u32,
    pub alignment: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjCClass {
    /// VM address of the `class_t` this was read from.
    pub address: u64,
    pub name: String,
    pub super_name: Option<String>,
    pub flags: ClassRoFlags,
    pub instance_start: u32,
    pub instance_size: u32,
    pub methods: Vec<ObjCMethod>,
    pub properties: Vec<ObjCProperty>,
    pub ivars: Vec<ObjCIvar>,
    pub protocols: Vec<String>,
    /// Walked through `isa`; carries the class methods.
    pub metaclass: Option<Box<ObjCClass>>,
}

impl ObjCClass {
    pub fn class_methods(&self) -> &[ObjCMethod] {
        self.metaclass
            .as_ref()
            .map(|meta| meta.methods.as_slice())
            .unwrap_or(&[])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjCProtocol {
    pub address: u64,
    pub name: String,
    pub protocols: Vec<String>,
    pub methods: Vec<ObjCMethod>,
    pub class_methods: Vec<ObjCMethod>,
    pub opt_methods: Vec<ObjCMethod>,
    pub opt_class_methods: Vec<ObjCMethod>,
    pub properties: Vec<ObjCProperty>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjCCategory {
    pub address: u64,
    pub name: String,
    pub class_name: String,
    pub methods: Vec<ObjCMethod>,
    pub class_methods: Vec<ObjCMethod>,
    pub properties: Vec<ObjCProperty>,
    pub protocols: Vec<String>,
}

pub struct ObjCReader<'a> {
    lib: &'a Library,
    visited: HashSet<u64>,
}

impl<'a> ObjCReader<'a> {
    pub fn new(lib: &'a Library) -> Self {
        Self {
            lib,
            visited: HashSet::new(),
        }
    }

    /// Everything `__objc_classlist` points at. Per-class failures drop
    /// that class with a warning rather than aborting the walk.
    pub fn classes(&mut self) -> Result<Vec<ObjCClass>> {
        let mut classes = Vec::new();
        for addr in self.pointer_section("__objc_classlist")? {
            self.visited.clear();
            match self.read_class(addr) {
                Ok(Some(class)) => classes.push(class),
                Ok(None) => {}
                Err(err) => log::warn!("skipping class at {addr:#x}: {err}"),
            }
        }
        Ok(classes)
    }

    pub fn protocols(&mut self) -> Result<Vec<ObjCProtocol>> {
        let mut protocols = Vec::new();
        for addr in self.pointer_section("__objc_protolist")? {
            match self.read_protocol(addr) {
                Ok(proto) => protocols.push(proto),
                Err(err) => log::warn!("skipping protocol at {addr:#x}: {err}"),
            }
        }
        Ok(protocols)
    }

    pub fn categories(&mut self) -> Result<Vec<ObjCCategory>> {
        let mut categories = Vec::new();
        for addr in self.pointer_section("__objc_catlist")? {
            match self.read_category(addr) {
                Ok(category) => categories.push(category),
                Err(err) => log::warn!("skipping category at {addr:#x}: {err}"),
            }
        }
        Ok(categories)
    }

    fn pointer_section(&self, name: &str) -> Result<Vec<u64>> {
        let Some(section) = self.lib.find_data_section(name) else {
            return Ok(Vec::new());
        };
        let ptr_size = self.lib.ctx.ptr_size();
        let count = section.size / ptr_size;
        let mut pointers = Vec::with_capacity(count as usize);
        for index in 0..count {
            let addr = self.lib.vm_ptr(section.addr + index * ptr_size)?;
            pointers.push(strip_ptr(addr));
        }
        Ok(pointers)
    }

    fn read_class(&mut self, addr: u64) -> Result<Option<ObjCClass>> {
        if !self.visited.insert(addr) {
            // already on this walk; the caller links by name, not by value
            return Ok(None);
        }
        let ptr_size = self.lib.ctx.ptr_size();

        // class_t: {isa, superclass, cache, vtable, data}
        let isa = strip_ptr(self.lib.vm_ptr(addr)?);
        let superclass = strip_ptr(self.lib.vm_ptr(addr + ptr_size)?);
        let data = strip_ptr(self.lib.vm_ptr(addr + 4 * ptr_size)?) & !FAST_DATA_MASK;

        let ro = self.read_class_ro(data)?;
        let super_name = if superclass != 0 {
            let super_data = strip_ptr(self.lib.vm_ptr(superclass + 4 * ptr_size)?) & !FAST_DATA_MASK;
            // tolerate superclass pointers dangling into other images
            self.class_ro_name(super_data).ok()
        } else {
            self.super_name_from_bind(addr + ptr_size)
        };

        let metaclass = if isa != 0 && !ro.flags.contains(ClassRoFlags::META) {
            self.read_class(isa)?.map(Box::new)
        } else {
            None
        };

        Ok(Some(ObjCClass {
            address: addr,
            name: ro.name,
            super_name,
            flags: ro.flags,
            instance_start: ro.instance_start,
            instance_size: ro.instance_size,
            methods: ro.methods,
            properties: ro.properties,
            ivars: ro.ivars,
            protocols: ro.protocols,
            metaclass,
        }))
    }

    /// A superclass living in another image has a NULL pointer here and a
    /// bind entry at the pointer's address naming `_OBJC_CLASS_$_<name>`.
    fn super_name_from_bind(&self, field_addr: u64) -> Option<String> {
        const PREFIX: &str = "_OBJC_CLASS_$_";
        self.lib
            .binds
            .actions
            .iter()
            .chain(&self.lib.weak_binds.actions)
            .chain(&self.lib.lazy_binds.actions)
            .find(|action| action.addr == field_addr)
            .and_then(|action| action.symbol.strip_prefix(PREFIX))
            .map(str::to_owned)
    }

    fn class_ro_name(&self, ro_addr: u64) -> Result<String> {
        let ptr_size = self.lib.ctx.ptr_size();
        let pointers = ro_addr + if self.lib.ctx.is_64 { 16 } else { 12 };
        let name_ptr = strip_ptr(self.lib.vm_ptr(pointers + ptr_size)?);
        self.lib.vm_cstr(name_ptr)
    }

    fn read_class_ro(&mut self, addr: u64) -> Result<ClassRo> {
        let ptr_size = self.lib.ctx.ptr_size();
        let flags = ClassRoFlags::from_bits_retain(self.lib.vm_u32(addr)?);
        let instance_start = self.lib.vm_u32(addr + 4)?;
        let instance_size = self.lib.vm_u32(addr + 8)?;
        // the 64-bit layout inserts a reserved word before the pointers
        let pointers = addr + if self.lib.ctx.is_64 { 16 } else { 12 };
        let name_ptr = strip_ptr(self.lib.vm_ptr(pointers + ptr_size)?);
        let methods_ptr = strip_ptr(self.lib.vm_ptr(pointers + 2 * ptr_size)?);
        let protocols_ptr = strip_ptr(self.lib.vm_ptr(pointers + 3 * ptr_size)?);
        let ivars_ptr = strip_ptr(self.lib.vm_ptr(pointers + 4 * ptr_size)?);
        let properties_ptr = strip_ptr(self.lib.vm_ptr(pointers + 6 * ptr_size)?);

        Ok(ClassRo {
            flags,
            instance_start,
            instance_size,
            name: self.lib.vm_cstr(name_ptr)?,
            methods: self.read_method_list(methods_ptr)?,
            protocols: self.read_protocol_refs(protocols_ptr)?,
            ivars: self.read_ivar_list(ivars_ptr)?,
            properties: self.read_property_list(properties_ptr)?,
        })
    }

    fn read_method_list(&self, addr: u64) -> Result<Vec<ObjCMethod>> {
        if addr == 0 {
            return Ok(Vec::new());
        }
        let entsize_and_flags = self.lib.vm_u32(addr)?;
        let count = self.lib.vm_u32(addr + 4)?;
        let small = entsize_and_flags & METHOD_LIST_SMALL != 0;
        let entsize = u64::from(entsize_and_flags & METHOD_LIST_ENTSIZE_MASK);
        let expected = if small { 12 } else { 3 * self.lib.ctx.ptr_size() };
        let stride = if entsize != 0 { entsize } else { expected };

        let mut methods = Vec::with_capacity(count as usize);
        for index in 0..u64::from(count) {
            let entry = addr + 8 + index * stride;
            let method = if small {
                self.read_small_method(entry)
            } else {
                self.read_big_method(entry)
            };
            match method {
                Ok(method) => methods.push(method),
                Err(err) => log::warn!("skipping method at {entry:#x}: {err}"),
            }
        }
        Ok(methods)
    }

    fn read_big_method(&self, entry: u64) -> Result<ObjCMethod> {
        let ptr_size = self.lib.ctx.ptr_size();
        let name_ptr = strip_ptr(self.lib.vm_ptr(entry)?);
        let types_ptr = strip_ptr(self.lib.vm_ptr(entry + ptr_size)?);
        let imp = strip_ptr(self.lib.vm_ptr(entry + 2 * ptr_size)?);
        Ok(ObjCMethod {
            selector: self.lib.vm_cstr(name_ptr)?,
            type_encoding: self.lib.vm_cstr(types_ptr)?,
            imp,
        })
    }

    /// Small (relative) methods: three signed 32-bit deltas from each
    /// field's own address. The name delta lands on a selector-reference
    /// slot, not the string itself.
    fn read_small_method(&self, entry: u64) -> Result<ObjCMethod> {
        let name_rel = i64::from(self.lib.vm_u32(entry)? as i32);
        let types_rel = i64::from(self.lib.vm_u32(entry + 4)? as i32);
        let imp_rel = i64::from(self.lib.vm_u32(entry + 8)? as i32);

        let selref = entry.wrapping_add_signed(name_rel);
        let sel_ptr = strip_ptr(self.lib.vm_ptr(selref)?);
        let types_addr = (entry + 4).wrapping_add_signed(types_rel);
        let imp = (entry + 8).wrapping_add_signed(imp_rel);
        Ok(ObjCMethod {
            selector: self.lib.vm_cstr(sel_ptr)?,
            type_encoding: self.lib.vm_cstr(types_addr)?,
            imp,
        })
    }

    fn read_ivar_list(&self, addr: u64) -> Result<Vec<ObjCIvar>> {
        if addr == 0 {
            return Ok(Vec::new());
        }
        let ptr_size = self.lib.ctx.ptr_size();
        let entsize = u64::from(self.lib.vm_u32(addr)?);
        let count = self.lib.vm_u32(addr + 4)?;
        let stride = if entsize != 0 {
            entsize
        } else {
            3 * ptr_size + 8
        };

        let mut ivars = Vec::with_capacity(count as usize);
        for index in 0..u64::from(count) {
            let entry = addr + 8 + index * stride;
            let result = (|| -> Result<ObjCIvar> {
                let offset_ptr = strip_ptr(self.lib.vm_ptr(entry)?);
                let name_ptr = strip_ptr(self.lib.vm_ptr(entry + ptr_size)?);
                let type_ptr = strip_ptr(self.lib.vm_ptr(entry + 2 * ptr_size)?);
                let alignment = self.lib.vm_u32(entry + 3 * ptr_size)?;
                let size = self.lib.vm_u32(entry + 3 * ptr_size + 4)?;
                Ok(ObjCIvar {
                    name: self.lib.vm_cstr(name_ptr)?,
                    type_encoding: self.lib.vm_cstr(type_ptr)?,
                    // the offset variable itself is 32 bits
                    offset: if offset_ptr != 0 {
                        u64::from(self.lib.vm_u32(offset_ptr)?)
                    } else {
                        0
                    },
                    size,
                    alignment,
                })
            })();
            match result {
                Ok(ivar) => ivars.push(ivar),
                Err(err) => log::warn!("skipping ivar at {entry:#x}: {err}"),
            }
        }
        Ok(ivars)
    }

    fn read_property_list(&self, addr: u64) -> Result<Vec<ObjCProperty>> {
        if addr == 0 {
            return Ok(Vec::new());
        }
        let ptr_size = self.lib.ctx.ptr_size();
        let entsize = u64::from(self.lib.vm_u32(addr)?);
        let count = self.lib.vm_u32(addr + 4)?;
        let stride = if entsize != 0 { entsize } else { 2 * ptr_size };

        let mut properties = Vec::with_capacity(count as usize);
        for index in 0..u64::from(count) {
            let entry = addr + 8 + index * stride;
            let result = (|| -> Result<ObjCProperty> {
                let name_ptr = strip_ptr(self.lib.vm_ptr(entry)?);
                let attr_ptr = strip_ptr(self.lib.vm_ptr(entry + ptr_size)?);
                Ok(ObjCProperty {
                    name: self.lib.vm_cstr(name_ptr)?,
                    attributes: self.lib.vm_cstr(attr_ptr)?,
                })
            })();
            match result {
                Ok(property) => properties.push(property),
                Err(err) => log::warn!("skipping property at {entry:#x}: {err}"),
            }
        }
        Ok(properties)
    }

    /// `protocol_list_t`: a pointer-sized count followed by protocol
    /// pointers. Only the names are collected here.
    fn read_protocol_refs(&self, addr: u64) -> Result<Vec<String>> {
        if addr == 0 {
            return Ok(Vec::new());
        }
        let ptr_size = self.lib.ctx.ptr_size();
        let count = self.lib.vm_ptr(addr)?;
        let mut names = Vec::with_capacity(count as usize);
        for index in 0..count {
            let proto_addr = strip_ptr(self.lib.vm_ptr(addr + (1 + index) * ptr_size)?);
            match self.protocol_name(proto_addr) {
                Ok(name) => names.push(name),
                Err(err) => log::warn!("skipping protocol ref at {proto_addr:#x}: {err}"),
            }
        }
        Ok(names)
    }

    fn protocol_name(&self, addr: u64) -> Result<String> {
        let ptr_size = self.lib.ctx.ptr_size();
        let name_ptr = strip_ptr(self.lib.vm_ptr(addr + ptr_size)?);
        self.lib.vm_cstr(name_ptr)
    }

    fn read_protocol(&mut self, addr: u64) -> Result<ObjCProtocol> {
        let ptr_size = self.lib.ctx.ptr_size();
        // protocol_t: {isa, name, protocols, instanceMethods, classMethods,
        //              optionalInstanceMethods, optionalClassMethods,
        //              instanceProperties, size, flags}
        let name_ptr = strip_ptr(self.lib.vm_ptr(addr + ptr_size)?);
        let protocols_ptr = strip_ptr(self.lib.vm_ptr(addr + 2 * ptr_size)?);
        let methods_ptr = strip_ptr(self.lib.vm_ptr(addr + 3 * ptr_size)?);
        let class_methods_ptr = strip_ptr(self.lib.vm_ptr(addr + 4 * ptr_size)?);
        let opt_methods_ptr = strip_ptr(self.lib.vm_ptr(addr + 5 * ptr_size)?);
        let opt_class_methods_ptr = strip_ptr(self.lib.vm_ptr(addr + 6 * ptr_size)?);
        let properties_ptr = strip_ptr(self.lib.vm_ptr(addr + 7 * ptr_size)?);

        Ok(ObjCProtocol {
            address: addr,
            name: self.lib.vm_cstr(name_ptr)?,
            protocols: self.read_protocol_refs(protocols_ptr)?,
            methods: self.read_method_list(methods_ptr)?,
            class_methods: self.read_method_list(class_methods_ptr)?,
            opt_methods: self.read_method_list(opt_methods_ptr)?,
            opt_class_methods: self.read_method_list(opt_class_methods_ptr)?,
            properties: self.read_property_list(properties_ptr)?,
        })
    }

    fn read_category(&mut self, addr: u64) -> Result<ObjCCategory> {
        let ptr_size = self.lib.ctx.ptr_size();
        // category_t: {name, cls, instanceMethods, classMethods, protocols,
        //              instanceProperties}
        let name_ptr = strip_ptr(self.lib.vm_ptr(addr)?);
        let cls = strip_ptr(self.lib.vm_ptr(addr + ptr_size)?);
        let methods_ptr = strip_ptr(self.lib.vm_ptr(addr + 2 * ptr_size)?);
        let class_methods_ptr = strip_ptr(self.lib.vm_ptr(addr + 3 * ptr_size)?);
        let protocols_ptr = strip_ptr(self.lib.vm_ptr(addr + 4 * ptr_size)?);
        let properties_ptr = strip_ptr(self.lib.vm_ptr(addr + 5 * ptr_size)?);

        let class_name = if cls != 0 {
            let data = strip_ptr(self.lib.vm_ptr(cls + 4 * ptr_size)?) & !FAST_DATA_MASK;
            let pointers = data + if self.lib.ctx.is_64 { 16 } else { 12 };
            let class_name_ptr = strip_ptr(self.lib.vm_ptr(pointers + ptr_size)?);
            self.lib.vm_cstr(class_name_ptr)?
        } else {
            const PREFIX: &str = "_OBJC_CLASS_$_";
            self.lib
                .binds
                .actions
                .iter()
                .find(|action| action.addr == addr + ptr_size)
                .and_then(|action| action.symbol.strip_prefix(PREFIX))
                .unwrap_or("")
                .to_string()
        };

        Ok(ObjCCategory {
            address: addr,
            name: self.lib.vm_cstr(name_ptr)?,
            class_name,
            methods: self.read_method_list(methods_ptr)?,
            class_methods: self.read_method_list(class_methods_ptr)?,
            properties: self.read_property_list(properties_ptr)?,
            protocols: self.read_protocol_refs(protocols_ptr)?,
        })
    }
}

struct ClassRo {
    flags: ClassRoFlags,
    instance_start: u32,
    instance_size: u32,
    name: String,
    methods: Vec<ObjCMethod>,
    protocols: Vec<String>,
    ivars: Vec<ObjCIvar>,
    properties: Vec<ObjCProperty>,
}

/// Strips pointer-authentication and other tag bits that shared-cache
/// images leave in the high byte.
#[inline]
fn strip_ptr(ptr: u64) -> u64 {
    if ptr & 0xff00_0000_0000_0000 != 0 {
        ptr & 0x0000_7fff_ffff_ffff
    } else {
        ptr
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::library::Library;
    use crate::testutil::{DATA_VM, MachBuilder};
    use scroll::{LE, Pwrite};

    // Assembles __objc_data contents with a class Foo : NSObject carrying
    // one instance method, one class method, one property and one ivar.
    fn objc_fixture() -> Library {
        let base = DATA_VM + 8; // __objc_classlist occupies the first 8 bytes
        let class = base;
        let metaclass = base + 40;
        let ro = base + 80;
        let meta_ro = base + 152;
        let name_str = base + 224;
        let methods = base + 240;
        let ivars = base + 280;
        let properties = base + 336;
        let meta_methods = base + 368;
        let sel_bar = base + 400;
        let types_v = base + 408;
        let sel_shared = base + 424;
        let ivar_name = base + 432;
        let ivar_type = base + 440;
        let ivar_offset_var = base + 456;
        let prop_name = base + 464;
        let prop_attrs = base + 472;

        let mut blob = vec![0u8; 512];
        let put_ptr = |blob: &mut Vec<u8>, at: u64, value: u64| {
            blob.pwrite_with(value, (at - base) as usize, LE).unwrap();
        };
        let put_u32 = |blob: &mut Vec<u8>, at: u64, value: u32| {
            blob.pwrite_with(value, (at - base) as usize, LE).unwrap();
        };
        let put_str = |blob: &mut Vec<u8>, at: u64, value: &str| {
            let at = (at - base) as usize;
            blob[at..at + value.len()].copy_from_slice(value.as_bytes());
        };

        // class_t Foo
        put_ptr(&mut blob, class, metaclass);
        put_ptr(&mut blob, class + 8, 0); // superclass: bound externally
        put_ptr(&mut blob, class + 32, ro);
        // metaclass
        put_ptr(&mut blob, metaclass, 0);
        put_ptr(&mut blob, metaclass + 32, meta_ro);
        // class_ro_t Foo
        put_u32(&mut blob, ro, 0);
        put_u32(&mut blob, ro + 4, 8); // instanceStart
        put_u32(&mut blob, ro + 8, 16); // instanceSize
        put_ptr(&mut blob, ro + 24, name_str);
        put_ptr(&mut blob, ro + 32, methods);
        put_ptr(&mut blob, ro + 48, ivars);
        put_ptr(&mut blob, ro + 64, properties);
        // metaclass ro
        put_u32(&mut blob, meta_ro, ClassRoFlags::META.bits());
        put_ptr(&mut blob, meta_ro + 24, name_str);
        put_ptr(&mut blob, meta_ro + 32, meta_methods);
        // strings
        put_str(&mut blob, name_str, "Foo\0");
        put_str(&mut blob, sel_bar, "bar\0");
        put_str(&mut blob, types_v, "v16@0:8\0");
        put_str(&mut blob, sel_shared, "shared\0");
        put_str(&mut blob, ivar_name, "_name\0");
        put_str(&mut blob, ivar_type, "@\"NSString\"\0");
        put_str(&mut blob, prop_name, "name\0");
        put_str(&mut blob, prop_attrs, "T@\"NSString\",R,N,V_name\0");
        // method list: entsize 24, count 1
        put_u32(&mut blob, methods, 24);
        put_u32(&mut blob, methods + 4, 1);
        put_ptr(&mut blob, methods + 8, sel_bar);
        put_ptr(&mut blob, methods + 16, types_v);
        put_ptr(&mut blob, methods + 24, 0x1_0000_0f00);
        // ivar list: entsize 32, count 1
        put_u32(&mut blob, ivars, 32);
        put_u32(&mut blob, ivars + 4, 1);
        put_ptr(&mut blob, ivars + 8, ivar_offset_var);
        put_ptr(&mut blob, ivars + 16, ivar_name);
        put_ptr(&mut blob, ivars + 24, ivar_type);
        put_u32(&mut blob, ivars + 32, 3); // alignment
        put_u32(&mut blob, ivars + 36, 8); // size
        put_u32(&mut blob, ivar_offset_var, 8);
        // property list: entsize 16, count 1
        put_u32(&mut blob, properties, 16);
        put_u32(&mut blob, properties + 4, 1);
        put_ptr(&mut blob, properties + 8, prop_name);
        put_ptr(&mut blob, properties + 16, prop_attrs);
        // metaclass method list
        put_u32(&mut blob, meta_methods, 24);
        put_u32(&mut blob, meta_methods + 4, 1);
        put_ptr(&mut blob, meta_methods + 8, sel_shared);
        put_ptr(&mut blob, meta_methods + 16, types_v);
        put_ptr(&mut blob, meta_methods + 24, 0x1_0000_0f10);

        // superclass arrives via a bind on the class_t superclass slot
        // (__DATA is segment index 1)
        let mut bind = vec![0x11, 0x40];
        bind.extend_from_slice(b"_OBJC_CLASS_$_NSObject\0");
        bind.extend_from_slice(&[0x71, 0x10, 0x90, 0x00]);

        let classlist = class.to_le_bytes().to_vec();
        let bytes = MachBuilder::new_dylib("/usr/lib/libfoo.dylib")
            .link("/usr/lib/libobjc.A.dylib")
            .data_section("__objc_classlist", classlist)
            .data_section("__objc_data", blob)
            .bind_stream(bind)
            .build();
        Library::parse(bytes).unwrap()
    }

    #[test]
    fn reads_class_graph() {
        let lib = objc_fixture();
        let mut reader = ObjCReader::new(&lib);
        let classes = reader.classes().unwrap();
        assert_eq!(classes.len(), 1);
        let class = &classes[0];
        assert_eq!(class.name, "Foo");
        assert_eq!(class.super_name.as_deref(), Some("NSObject"));
        assert_eq!(class.instance_size, 16);

        assert_eq!(class.methods.len(), 1);
        assert_eq!(class.methods[0].selector, "bar");
        assert_eq!(class.methods[0].type_encoding, "v16@0:8");
        assert_eq!(class.methods[0].imp, 0x1_0000_0f00);

        assert_eq!(class.ivars.len(), 1);
        assert_eq!(class.ivars[0].name, "_name");
        assert_eq!(class.ivars[0].offset, 8);

        assert_eq!(class.properties.len(), 1);
        assert_eq!(class.properties[0].name, "name");
        assert_eq!(class.properties[0].attributes, "T@\"NSString\",R,N,V_name");

        let class_methods = class.class_methods();
        assert_eq!(class_methods.len(), 1);
        assert_eq!(class_methods[0].selector, "shared");
    }

    #[test]
    fn isa_cycle_is_cut() {
        // A class whose isa points back at itself must not loop
        let base = DATA_VM + 8;
        let mut blob = vec![0u8; 128];
        blob.pwrite_with(base, 0, LE).unwrap(); // isa -> self
        blob.pwrite_with(base + 40, 32, LE).unwrap(); // data -> ro
        blob.pwrite_with(base + 96, (40 + 24) as usize, LE).unwrap(); // ro.name
        blob[96..100].copy_from_slice(b"Me\0\0");

        let classlist = base.to_le_bytes().to_vec();
        let bytes = MachBuilder::new_dylib("/usr/lib/libme.dylib")
            .data_section("__objc_classlist", classlist)
            .data_section("__objc_data", blob)
            .build();
        let lib = Library::parse(bytes).unwrap();
        let classes = ObjCReader::new(&lib).classes().unwrap();
        assert_eq!(classes.len(), 1);
        assert_eq!(classes[0].name, "Me");
        assert!(classes[0].metaclass.is_none());
    }
}
