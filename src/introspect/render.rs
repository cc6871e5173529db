use std::fmt::Write;

use super::{ArgDecl, IntrospectionNode, MemberKind};

const DOCTYPE: &str = "<!DOCTYPE node PUBLIC \"-//freedesktop//DTD D-BUS Object Introspection 1.0//EN\"\n \"http://www.freedesktop.org/standards/dbus/1.0/introspect.dtd\">\n";

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

fn render_arg(out: &mut String, arg: &ArgDecl) {
    out.push_str("      <arg");
    if let Some(name) = &arg.name {
        let _ = write!(out, " name=\"{}\"", escape(name));
    }
    let _ = write!(out, " type=\"{}\"", escape(&arg.signature));
    if let Some(direction) = &arg.direction {
        let _ = write!(out, " direction=\"{}\"", escape(direction));
    }
    out.push_str("/>\n");
}

/// Renders a node as introspection XML.
#[must_use]
pub fn render_node(node: &IntrospectionNode) -> String {
    let mut out = String::from(DOCTYPE);
    out.push_str("<node>\n");
    for decl in node.interfaces.values() {
        let _ = writeln!(out, "  <interface name=\"{}\">", escape(&decl.name));
        for kind in [MemberKind::Method, MemberKind::Signal] {
            for (name, args) in decl.members(kind) {
                let _ = writeln!(out, "    <{} name=\"{}\">", kind.tag(), escape(name));
                for arg in args {
                    render_arg(&mut out, arg);
                }
                let _ = writeln!(out, "    </{}>", kind.tag());
            }
        }
        out.push_str("  </interface>\n");
    }
    for child in &node.children {
        let _ = writeln!(out, "  <node name=\"{}\"/>", escape(child));
    }
    out.push_str("</node>\n");
    out
}
