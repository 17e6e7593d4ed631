use anyhow::{anyhow, Result};
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// A namespace binding, `xmlns:prefix="uri"` or the default `xmlns="uri"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    pub prefix: Option<String>,
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// An owned XML element with its namespace context.
///
/// Every element remembers the bindings visible at its position in the source document, so it
/// can be cut out of one envelope and serialized into another without leaving prefixes unbound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    name: String,
    namespace: Option<String>,
    attributes: Vec<Attribute>,
    declarations: Vec<Namespace>,
    in_scope: Vec<Namespace>,
    children: Vec<Node>,
}

impl Element {
    /// Parses a whole document and returns its root element.
    pub fn parse(xml: &str) -> Result<Element> {
        let mut reader = Reader::from_str(xml);
        let mut stack: Vec<Element> = vec![];
        let mut root: Option<Element> = None;

        loop {
            match reader.read_event()? {
                Event::Start(start) => {
                    let element = Element::open(&start, scope_of(&stack))?;
                    stack.push(element);
                }
                Event::Empty(start) => {
                    let element = Element::open(&start, scope_of(&stack))?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| anyhow!("unexpected closing tag"))?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::Text(text) => {
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(Node::Text(text.unescape()?.into_owned()));
                    }
                }
                Event::CData(data) => {
                    if let Some(parent) = stack.last_mut() {
                        let text = String::from_utf8(data.into_inner().into_owned())?;
                        parent.children.push(Node::Text(text));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(anyhow!("document ended inside an open element"));
        }

        root.ok_or_else(|| anyhow!("document has no root element"))
    }

    fn open(start: &BytesStart, parent_scope: &[Namespace]) -> Result<Element> {
        let name = std::str::from_utf8(start.name().as_ref())?.to_string();
        let mut declarations = vec![];
        let mut attributes = vec![];

        for attribute in start.attributes() {
            let attribute = attribute?;
            let key = std::str::from_utf8(attribute.key.as_ref())?.to_string();
            let value = attribute.unescape_value()?.into_owned();

            if key == "xmlns" {
                declarations.push(Namespace {
                    prefix: None,
                    uri: value,
                });
            } else if let Some(prefix) = key.strip_prefix("xmlns:") {
                declarations.push(Namespace {
                    prefix: Some(prefix.to_string()),
                    uri: value,
                });
            } else {
                attributes.push(Attribute { name: key, value });
            }
        }

        let mut in_scope: Vec<Namespace> = parent_scope
            .iter()
            .filter(|binding| !declarations.iter().any(|d| d.prefix == binding.prefix))
            .cloned()
            .collect();
        in_scope.extend(declarations.iter().cloned());

        let prefix = name.split_once(':').map(|(prefix, _)| prefix);
        let namespace = in_scope
            .iter()
            .find(|binding| binding.prefix.as_deref() == prefix)
            .map(|binding| binding.uri.clone())
            .filter(|uri| !uri.is_empty());

        Ok(Element {
            name,
            namespace,
            attributes,
            declarations,
            in_scope,
            children: vec![],
        })
    }

    /// The qualified name as written in the source, e.g. `samlp:AuthnRequest`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn local_name(&self) -> &str {
        local_part(&self.name)
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Returns true when the local name matches and, if given, the namespace too.
    pub fn is(&self, local_name: &str, namespace: Option<&str>) -> bool {
        self.local_name() == local_name
            && namespace.map_or(true, |namespace| self.namespace() == Some(namespace))
    }

    /// Looks an attribute up by its qualified name, falling back to its local name.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attribute| attribute.name == name)
            .or_else(|| {
                self.attributes
                    .iter()
                    .find(|attribute| local_part(&attribute.name) == name)
            })
            .map(|attribute| attribute.value.as_str())
    }

    pub fn children(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            Node::Text(_) => None,
        })
    }

    pub fn child(&self, local_name: &str, namespace: Option<&str>) -> Option<&Element> {
        self.children()
            .find(|child| child.is(local_name, namespace))
    }

    pub fn first_child_element(&self) -> Option<&Element> {
        self.children().next()
    }

    /// Concatenated text of this element and its descendants.
    pub fn text(&self) -> String {
        let mut text = String::new();
        self.collect_text(&mut text);
        text
    }

    fn collect_text(&self, out: &mut String) {
        for node in &self.children {
            match node {
                Node::Text(value) => out.push_str(value),
                Node::Element(element) => element.collect_text(out),
            }
        }
    }

    /// Serializes the element as a standalone fragment.
    ///
    /// All bindings in scope at the element are declared on the fragment's root.
    pub fn to_xml_string(&self) -> String {
        let mut out = String::new();
        self.write(&mut out, &self.in_scope);
        out
    }

    fn write(&self, out: &mut String, declarations: &[Namespace]) {
        out.push('<');
        out.push_str(&self.name);

        for binding in declarations {
            match &binding.prefix {
                Some(prefix) => out.push_str(&format!(" xmlns:{}=\"{}\"", prefix, escape(&binding.uri))),
                None => out.push_str(&format!(" xmlns=\"{}\"", escape(&binding.uri))),
            }
        }

        for attribute in &self.attributes {
            out.push_str(&format!(" {}=\"{}\"", attribute.name, escape(&attribute.value)));
        }

        if self.children.is_empty() {
            out.push_str("/>");
            return;
        }

        out.push('>');
        for node in &self.children {
            match node {
                Node::Element(element) => element.write(out, &element.declarations),
                Node::Text(value) => out.push_str(&escape(value)),
            }
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

fn local_part(name: &str) -> &str {
    name.split_once(':').map_or(name, |(_, local)| local)
}

fn scope_of(stack: &[Element]) -> &[Namespace] {
    stack
        .last()
        .map(|element| element.in_scope.as_slice())
        .unwrap_or(&[])
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(Node::Element(element)),
        None if root.is_some() => return Err(anyhow!("document has more than one root element")),
        None => *root = Some(element),
    }

    Ok(())
}
