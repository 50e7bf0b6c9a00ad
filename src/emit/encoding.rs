//! Decodes Objective-C type-encoding strings (`@encode()` output) back
//! into C-ish type spellings.

/// Decodes one encoded type, returning the rendered type and how many
/// input bytes it consumed.
pub fn decode_type(encoded: &str) -> (String, usize) {
    let bytes = encoded.as_bytes();
    if bytes.is_empty() {
        return (String::new(), 0);
    }

    match bytes[0] {
        // method qualifiers; only const changes the rendering
        b'r' => {
            let (inner, used) = decode_type(&encoded[1..]);
            (format!("const {inner}"), used + 1)
        }
        b'n' | b'N' | b'o' | b'O' | b'R' | b'V' | b'A' => {
            let (inner, used) = decode_type(&encoded[1..]);
            (inner, used + 1)
        }
        b'@' => {
            // @"NSString" carries the class name, bare @ is id, @? a block
            if bytes.len() > 1 && bytes[1] == b'"' {
                if let Some(end) = encoded[2..].find('"') {
                    return (format!("{} *", &encoded[2..2 + end]), end + 3);
                }
            }
            if bytes.len() > 1 && bytes[1] == b'?' {
                return ("id /* block */".into(), 2);
            }
            ("id".into(), 1)
        }
        b'#' => ("Class".into(), 1),
        b':' => ("SEL".into(), 1),
        b'v' => ("void".into(), 1),
        b'c' => ("char".into(), 1),
        b'i' => ("int".into(), 1),
        b's' => ("short".into(), 1),
        b'l' => ("long".into(), 1),
        b'q' => ("long long".into(), 1),
        b'C' => ("unsigned char".into(), 1),
        b'I' => ("unsigned int".into(), 1),
        b'S' => ("unsigned short".into(), 1),
        b'L' => ("unsigned long".into(), 1),
        b'Q' => ("unsigned long long".into(), 1),
        b'f' => ("float".into(), 1),
        b'd' => ("double".into(), 1),
        b'D' => ("long double".into(), 1),
        b'B' => ("BOOL".into(), 1),
        b'*' => ("char *".into(), 1),
        b'?' => ("void /* unknown */".into(), 1),
        b'^' => {
            let (inner, used) = decode_type(&encoded[1..]);
            if inner.ends_with('*') {
                (format!("{inner}*"), used + 1)
            } else {
                (format!("{inner} *"), used + 1)
            }
        }
        b'{' => decode_record(encoded, '{', '}', "struct"),
        b'(' => decode_record(encoded, '(', ')', "union"),
        b'[' => decode_array(encoded),
        b'b' => {
            let digits = count_digits(&encoded[1..]);
            (format!("unsigned int : {}", &encoded[1..1 + digits]), digits + 1)
        }
        _ => (format!("/* {} */", &encoded[..1]), 1),
    }
}

/// `{Name=fields}` / `(Name=fields)`. The field details are not rendered,
/// only the tag; headers spell struct types by name.
fn decode_record(encoded: &str, open: char, close: char, keyword: &str) -> (String, usize) {
    let mut depth = 0usize;
    let mut end = encoded.len();
    for (index, ch) in encoded.char_indices() {
        if ch == open {
            depth += 1;
        } else if ch == close {
            depth -= 1;
            if depth == 0 {
                end = index + 1;
                break;
            }
        }
    }
    let body = &encoded[1..end - 1];
    let name = body.split('=').next().unwrap_or(body);
    let rendered = if name.is_empty() || name == "?" {
        format!("{keyword} /* anonymous */")
    } else {
        format!("{keyword} {name}")
    };
    (rendered, end)
}

/// `[Nt]` renders as `t[N]` at the use site; we return `t[N]` and let the
/// caller splice the variable name in front of the brackets.
fn decode_array(encoded: &str) -> (String, usize) {
    let digits = count_digits(&encoded[1..]);
    let count = &encoded[1..1 + digits];
    let (inner, used) = decode_type(&encoded[1 + digits..]);
    // consume the closing bracket when present
    let consumed = 1 + digits + used + usize::from(encoded.as_bytes().get(1 + digits + used) == Some(&b']'));
    (format!("{inner}[{count}]"), consumed)
}

fn count_digits(s: &str) -> usize {
    s.bytes().take_while(|b| b.is_ascii_digit()).count()
}

/// Splits a method signature encoding like `v16@0:8@16` into the return
/// type and the argument types, dropping the embedded stack offsets and
/// the implicit `self`/`_cmd` arguments.
pub fn decode_method_signature(encoded: &str) -> (String, Vec<String>) {
    let mut rest = encoded;
    let mut parts = Vec::new();
    while !rest.is_empty() {
        let (rendered, used) = decode_type(rest);
        if used == 0 {
            break;
        }
        rest = &rest[used..];
        let digits = count_digits(rest);
        rest = &rest[digits..];
        parts.push(rendered);
    }
    if parts.is_empty() {
        return ("void".into(), Vec::new());
    }
    let return_type = parts.remove(0);
    // implicit self (@) and _cmd (:)
    let args = parts.into_iter().skip(2).collect();
    (return_type, args)
}
