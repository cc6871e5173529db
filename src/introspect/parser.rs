use roxmltree::{Document, Node, ParsingOptions};

use super::{ArgDecl, InterfaceDecl, IntrospectError, IntrospectionNode, MemberKind};

/// Parses one introspection document.
///
/// Interfaces rejected by `intf_match` are skipped entirely; member elements
/// whose kind is rejected by `tag_match` are not parsed. Child `<node>`
/// elements without a name are ignored.
pub fn parse_node<I, T>(xml: &str, intf_match: I, tag_match: T) -> Result<IntrospectionNode, IntrospectError>
where
    I: Fn(&str) -> bool,
    T: Fn(MemberKind) -> bool,
{
    let opts = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    let doc = Document::parse_with_options(xml, opts).map_err(|e| IntrospectError::Xml(e.to_string()))?;
    let root = doc.root_element();
    if root.tag_name().name() != "node" {
        return Err(IntrospectError::UnexpectedRoot(root.tag_name().name().to_string()));
    }

    let mut node = IntrospectionNode::default();
    for child in root.children().filter(Node::is_element) {
        match child.tag_name().name() {
            "interface" => {
                let name = required_name(child)?;
                if !intf_match(name) {
                    continue;
                }
                node.add_interface(parse_interface(child, name, &tag_match)?);
            }
            "node" => {
                if let Some(name) = child.attribute("name").filter(|n| !n.is_empty()) {
                    node.children.push(name.to_string());
                }
            }
            _ => {}
        }
    }
    Ok(node)
}

fn required_name<'a>(element: Node<'a, '_>) -> Result<&'a str, IntrospectError> {
    element.attribute("name").ok_or_else(|| IntrospectError::MissingName {
        element: element.tag_name().name().to_string(),
    })
}

fn parse_interface<T>(element: Node<'_, '_>, name: &str, tag_match: &T) -> Result<InterfaceDecl, IntrospectError>
where
    T: Fn(MemberKind) -> bool,
{
    let mut decl = InterfaceDecl::new(name);
    for member in element.children().filter(Node::is_element) {
        let kind = match member.tag_name().name() {
            "method" => MemberKind::Method,
            "signal" => MemberKind::Signal,
            _ => continue,
        };
        if !tag_match(kind) {
            continue;
        }
        let member_name = required_name(member)?;
        let args = member
            .children()
            .filter(|n| n.is_element() && n.tag_name().name() == "arg")
            .map(|arg| ArgDecl {
                name: arg.attribute("name").map(str::to_string),
                signature: arg.attribute("type").unwrap_or_default().to_string(),
                direction: arg.attribute("direction").map(str::to_string),
            })
            .collect();
        decl.members_mut(kind).insert(member_name.to_string(), args);
    }
    Ok(decl)
}
