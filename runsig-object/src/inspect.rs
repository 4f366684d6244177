#![forbid(unsafe_code)]

use std::fmt::Write as _;

use crate::class::ClassRegistry;
use crate::value::Value;

impl ClassRegistry {
    /// Host-style `inspect` rendering of a value.
    pub fn inspect(&self, value: &Value) -> String {
        let mut out = String::new();
        self.write_inspect(value, &mut out);
        out
    }

    fn write_inspect(&self, value: &Value, out: &mut String) {
        match value {
            Value::Nil => out.push_str("nil"),
            Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            Value::Integer(i) => {
                let _ = write!(out, "{i}");
            }
            Value::Float(f) => out.push_str(&inspect_float(*f)),
            Value::String(s) => write_quoted(s, out),
            Value::Symbol(s) => {
                out.push(':');
                if is_plain_symbol(s) {
                    out.push_str(s);
                } else {
                    write_quoted(s, out);
                }
            }
            Value::Array(items) => {
                out.push('[');
                self.write_list(items, out);
                out.push(']');
            }
            Value::Hash(entries) => {
                if entries.is_empty() {
                    out.push_str("{}");
                    return;
                }
                out.push('{');
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    match k {
                        Value::Symbol(s) if is_plain_symbol(s) => {
                            out.push_str(s);
                            out.push_str(": ");
                        }
                        _ => {
                            self.write_inspect(k, out);
                            out.push_str(" => ");
                        }
                    }
                    self.write_inspect(v, out);
                }
                out.push('}');
            }
            Value::Set(items) => {
                out.push_str("#<Set: {");
                self.write_list(items, out);
                out.push_str("}>");
            }
            Value::Class(id) => out.push_str(self.name(*id)),
            Value::Object(obj) => {
                out.push_str("#<");
                out.push_str(self.name(obj.class()));
                for (i, (name, v)) in obj.ivars().iter().enumerate() {
                    out.push_str(if i == 0 { " " } else { ", " });
                    out.push('@');
                    out.push_str(name);
                    out.push('=');
                    self.write_inspect(v, out);
                }
                out.push('>');
            }
        }
    }

    fn write_list(&self, items: &[Value], out: &mut String) {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            self.write_inspect(item, out);
        }
    }
}

fn inspect_float(f: f64) -> String {
    if f.is_nan() {
        "NaN".to_string()
    } else if f.is_infinite() {
        (if f > 0.0 { "Infinity" } else { "-Infinity" }).to_string()
    } else if f.fract() == 0.0 && f.abs() < 1e16 {
        format!("{f:.1}")
    } else {
        format!("{f}")
    }
}

fn is_plain_symbol(s: &str) -> bool {
    let mut chars = s.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !(first.is_ascii_alphabetic() || first == '_') {
        return false;
    }
    let rest: Vec<char> = chars.collect();
    let body = match rest.last() {
        Some('?' | '!' | '=') => &rest[..rest.len() - 1],
        _ => &rest[..],
    };
    body.iter().all(|c| c.is_ascii_alphanumeric() || *c == '_')
}

fn write_quoted(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\u{1b}' => out.push_str("\\e"),
            c if c.is_control() => {
                let _ = write!(out, "\\u{:04X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn scalars() {
        let reg = ClassRegistry::new();
        assert_eq!(reg.inspect(&Value::Nil), "nil");
        assert_eq!(reg.inspect(&Value::Integer(-3)), "-3");
        assert_eq!(reg.inspect(&Value::Float(1.0)), "1.0");
        assert_eq!(reg.inspect(&Value::Float(2.5)), "2.5");
        assert_eq!(reg.inspect(&Value::str("foo")), "\"foo\"");
        assert_eq!(reg.inspect(&Value::str("a\"b\n")), "\"a\\\"b\\n\"");
        assert_eq!(reg.inspect(&Value::sym("bar")), ":bar");
        assert_eq!(reg.inspect(&Value::sym("empty?")), ":empty?");
        assert_eq!(reg.inspect(&Value::sym("two words")), ":\"two words\"");
    }

    #[test]
    fn collections() {
        let reg = ClassRegistry::new();
        let arr = Value::Array(vec![Value::Integer(1), Value::str("x")]);
        assert_eq!(reg.inspect(&arr), "[1, \"x\"]");
        let hash = Value::Hash(vec![
            (Value::sym("a"), Value::Integer(1)),
            (Value::str("k"), Value::Nil),
        ]);
        assert_eq!(reg.inspect(&hash), "{a: 1, \"k\" => nil}");
        assert_eq!(reg.inspect(&Value::Hash(vec![])), "{}");
        assert_eq!(
            reg.inspect(&Value::Set(vec![Value::Integer(1)])),
            "#<Set: {1}>"
        );
    }

    #[test]
    fn objects_show_class_and_ivars() {
        let mut reg = ClassRegistry::new();
        let c = reg.define_class("Point", None).unwrap();
        let mut ivars = BTreeMap::new();
        ivars.insert("x".to_string(), Value::Integer(1));
        ivars.insert("y".to_string(), Value::Integer(2));
        let p = reg.instantiate_with(c, ivars).unwrap();
        assert_eq!(reg.inspect(&p), "#<Point @x=1, @y=2>");
        assert_eq!(reg.inspect(&reg.instantiate(c).unwrap()), "#<Point>");
        assert_eq!(reg.inspect(&Value::Class(c)), "Point");
    }
}
