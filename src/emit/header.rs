//! Renders Objective-C interface declarations from the decoded runtime
//! metadata.

use crate::emit::encoding::{decode_method_signature, decode_type};
use crate::errors::Result;
use crate::library::Library;
use crate::objc::{ObjCCategory, ObjCClass, ObjCMethod, ObjCProperty, ObjCProtocol, ObjCReader};

#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderOptions {
    /// Sort methods by rendered declaration and properties by name instead
    /// of keeping the binary's declaration order.
    pub sorted: bool,
}

/// Renders one class (plus its metaclass's class methods) as a header.
pub fn class_header(class: &ObjCClass, options: HeaderOptions) -> String {
    let mut out = String::new();

    out.push_str(&format!("@interface {}", class.name));
    if let Some(super_name) = &class.super_name {
        out.push_str(&format!(" : {super_name}"));
    }
    if !class.protocols.is_empty() {
        out.push_str(&format!(" <{}>", class.protocols.join(", ")));
    }

    if class.ivars.is_empty() {
        out.push('\n');
    } else {
        out.push_str(" {\n");
        for ivar in &class.ivars {
            out.push_str(&format!("    {};\n", render_ivar(ivar)));
        }
        out.push_str("}\n");
    }
    out.push('\n');

    let mut properties: Vec<String> = class.properties.iter().map(render_property).collect();
    if options.sorted {
        let mut named: Vec<(&ObjCProperty, String)> =
            class.properties.iter().zip(properties.iter().cloned()).collect();
        named.sort_by(|a, b| a.0.name.cmp(&b.0.name));
        properties = named.into_iter().map(|(_, line)| line).collect();
    }
    for line in &properties {
        out.push_str(line);
        out.push('\n');
    }
    if !properties.is_empty() {
        out.push('\n');
    }

    let mut methods: Vec<String> = class
        .class_methods()
        .iter()
        .map(|m| render_method(m, '+'))
        .chain(class.methods.iter().map(|m| render_method(m, '-')))
        .collect();
    if options.sorted {
        methods.sort();
    }
    for line in &methods {
        out.push_str(line);
        out.push('\n');
    }
    if !methods.is_empty() {
        out.push('\n');
    }

    out.push_str("@end\n");
    out
}

pub fn category_header(category: &ObjCCategory, options: HeaderOptions) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "@interface {} ({})",
        category.class_name, category.name
    ));
    if !category.protocols.is_empty() {
        out.push_str(&format!(" <{}>", category.protocols.join(", ")));
    }
    out.push_str("\n\n");

    for property in &category.properties {
        out.push_str(&render_property(property));
        out.push('\n');
    }
    if !category.properties.is_empty() {
        out.push('\n');
    }

    let mut methods: Vec<String> = category
        .class_methods
        .iter()
        .map(|m| render_method(m, '+'))
        .chain(category.methods.iter().map(|m| render_method(m, '-')))
        .collect();
    if options.sorted {
        methods.sort();
    }
    for line in &methods {
        out.push_str(line);
        out.push('\n');
    }
    if !methods.is_empty() {
        out.push('\n');
    }

    out.push_str("@end\n");
    out
}

pub fn protocol_header(protocol: &ObjCProtocol, options: HeaderOptions) -> String {
    let mut out = String::new();
    out.push_str(&format!("@protocol {}", protocol.name));
    if !protocol.protocols.is_empty() {
        out.push_str(&format!(" <{}>", protocol.protocols.join(", ")));
    }
    out.push_str("\n\n");

    for property in &protocol.properties {
        out.push_str(&render_property(property));
        out.push('\n');
    }
    if !protocol.properties.is_empty() {
        out.push('\n');
    }

    let render_block = |out: &mut String, methods: &[ObjCMethod], marker: char| {
        let mut lines: Vec<String> = methods.iter().map(|m| render_method(m, marker)).collect();
        if options.sorted {
            lines.sort();
        }
        for line in lines {
            out.push_str(&line);
            out.push('\n');
        }
    };
    render_block(&mut out, &protocol.class_methods, '+');
    render_block(&mut out, &protocol.methods, '-');
    if !protocol.opt_methods.is_empty() || !protocol.opt_class_methods.is_empty() {
        out.push_str("\n@optional\n");
        render_block(&mut out, &protocol.opt_class_methods, '+');
        render_block(&mut out, &protocol.opt_methods, '-');
    }

    out.push_str("\n@end\n");
    out
}

/// Walks the whole image and renders one header per class, category and
/// protocol, keyed by the file name a dumper would write.
pub fn library_headers(lib: &Library, options: HeaderOptions) -> Result<Vec<(String, String)>> {
    let mut reader = ObjCReader::new(lib);
    let mut files = Vec::new();
    for class in reader.classes()? {
        files.push((
            format!("{}.h", class.name),
            class_header(&class, options),
        ));
    }
    for category in reader.categories()? {
        files.push((
            format!("{}+{}.h", category.class_name, category.name),
            category_header(&category, options),
        ));
    }
    for protocol in reader.protocols()? {
        files.push((
            format!("{}-Protocol.h", protocol.name),
            protocol_header(&protocol, options),
        ));
    }
    if options.sorted {
        files.sort_by(|a, b| a.0.cmp(&b.0));
    }
    Ok(files)
}

fn render_method(method: &ObjCMethod, marker: char) -> String {
    let (return_type, args) = decode_method_signature(&method.type_encoding);
    let pieces: Vec<&str> = method.selector.split(':').collect();

    if !method.selector.contains(':') {
        return format!("{marker} ({return_type}){};", method.selector);
    }

    let mut parts = Vec::new();
    // a trailing ':' yields one empty final piece; skip it
    for (index, piece) in pieces.iter().filter(|p| !p.is_empty()).enumerate() {
        let arg_type = args.get(index).cloned().unwrap_or_else(|| "id".into());
        parts.push(format!("{piece}:({arg_type})arg{}", index + 1));
    }
    format!("{marker} ({return_type}){};", parts.join(" "))
}

fn render_property(property: &ObjCProperty) -> String {
    let mut attrs = Vec::new();
    let mut prop_type = String::from("id");
    for attr in property.attributes.split(',') {
        match attr.chars().next() {
            Some('T') => prop_type = decode_type(&attr[1..]).0,
            Some('N') => attrs.push("nonatomic".to_string()),
            Some('R') => attrs.push("readonly".to_string()),
            Some('C') => attrs.push("copy".to_string()),
            Some('&') => attrs.push("retain".to_string()),
            Some('W') => attrs.push("weak".to_string()),
            Some('G') => attrs.push(format!("getter={}", &attr[1..])),
            Some('S') => attrs.push(format!("setter={}", &attr[1..])),
            // V names the backing ivar, D/P mark dynamic/gc; none render
            _ => {}
        }
    }

    let separator = if prop_type.ends_with('*') { "" } else { " " };
    if attrs.is_empty() {
        format!("@property {prop_type}{separator}{};", property.name)
    } else {
        format!(
            "@property ({}) {prop_type}{separator}{};",
            attrs.join(", "),
            property.name
        )
    }
}

fn render_ivar(ivar: &crate::objc::ObjCIvar) -> String {
    let decoded = decode_type(&ivar.type_encoding).0;
    // array types splice the name before the brackets
    if let Some(bracket) = decoded.find('[') {
        let (element, dims) = decoded.split_at(bracket);
        return format!("{}{}{}", element, ivar.name, dims);
    }
    let separator = if decoded.ends_with('*') { "" } else { " " };
    format!("{decoded}{separator}{}", ivar.name)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::objc::{ClassRoFlags, ObjCIvar};

    fn sample_class() -> ObjCClass {
        ObjCClass {
            address: 0x1000,
            name: "Foo".into(),
            super_name: Some("NSObject".into()),
            flags: ClassRoFlags::empty(),
            instance_start: 8,
            instance_size: 16,
            methods: vec![
                ObjCMethod {
                    selector: "bar".into(),
                    type_encoding: "v16@0:8".into(),
                    imp: 0x1f00,
                },
                ObjCMethod {
                    selector: "addItem:atIndex:".into(),
                    type_encoding: "v32@0:8@16q24".into(),
                    imp: 0x1f40,
                },
            ],
            properties: vec![ObjCProperty {
                name: "name".into(),
                attributes: "T@\"NSString\",R,N,V_name".into(),
            }],
            ivars: vec![ObjCIvar {
                name: "_name".into(),
                type_encoding: "@\"NSString\"".into(),
                offset: 8,
                size: 8,
                alignment: 3,
            }],
            protocols: vec!["NSCopying".into()],
            metaclass: None,
        }
    }

    #[test]
    fn renders_interface_line() {
        let header = class_header(&sample_class(), HeaderOptions::default());
        assert!(header.starts_with("@interface Foo : NSObject <NSCopying> {"));
        assert!(header.contains("    NSString *_name;\n"));
        assert!(header.ends_with("@end\n"));
    }

    #[test]
    fn renders_property_and_methods() {
        let header = class_header(&sample_class(), HeaderOptions::default());
        assert!(header.contains("@property (readonly, nonatomic) NSString *name;"));
        assert!(header.contains("- (void)bar;"));
        assert!(header.contains("- (void)addItem:(id)arg1 atIndex:(long long)arg2;"));
        // declaration order preserved when unsorted
        let bar = header.find("- (void)bar;").unwrap();
        let add = header.find("- (void)addItem:").unwrap();
        assert!(bar < add);
    }

    #[test]
    fn sorted_output_reorders_methods() {
        let header = class_header(
            &sample_class(),
            HeaderOptions { sorted: true },
        );
        let bar = header.find("- (void)bar;").unwrap();
        let add = header.find("- (void)addItem:").unwrap();
        assert!(add < bar);
    }

    #[test]
    fn protocol_optional_block() {
        let protocol = ObjCProtocol {
            address: 0,
            name: "Watchable".into(),
            protocols: vec![],
            methods: vec![ObjCMethod {
                selector: "watch".into(),
                type_encoding: "v16@0:8".into(),
                imp: 0,
            }],
            class_methods: vec![],
            opt_methods: vec![ObjCMethod {
                selector: "pause".into(),
                type_encoding: "v16@0:8".into(),
                imp: 0,
            }],
            opt_class_methods: vec![],
            properties: vec![],
        };
        let header = protocol_header(&protocol, HeaderOptions::default());
        assert!(header.starts_with("@protocol Watchable\n"));
        let optional = header.find("@optional").unwrap();
        let watch = header.find("- (void)watch;").unwrap();
        let pause = header.find("- (void)pause;").unwrap();
        assert!(watch < optional && optional < pause);
    }
}
