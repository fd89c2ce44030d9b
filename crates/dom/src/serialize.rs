//! Writes a document tree back out as UTF-8 XML text.

use std::fmt;
use std::io::Write;

use crate::document::{Document, NodeKind, NodeType};
use crate::error::DomError;
use crate::node::Node;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum XmlVersion {
    #[default]
    V10,
    V11,
}

impl XmlVersion {
    fn as_str(&self) -> &'static str {
        match self {
            XmlVersion::V10 => "1.0",
            XmlVersion::V11 => "1.1",
        }
    }

    /// Whether `c` may appear in output at all under this version's
    /// character table (escaped or not).
    fn permits(&self, c: char) -> bool {
        match self {
            XmlVersion::V10 => xylem_text::is_char(c),
            // 1.1 readmits the C0 controls except NUL, as character
            // references.
            XmlVersion::V11 => c != '\0' && (xylem_text::is_char(c) || (c as u32) < 0x20),
        }
    }
}

/// Output formatting knobs.
#[derive(Debug, Clone)]
pub struct WriteOptions {
    /// Indent nested elements.
    pub indent: bool,
    pub indent_width: usize,
    /// Starting depth, for writing fragments into an outer document.
    pub indent_level: usize,
    /// Put each attribute on its own line.
    pub indent_attributes: bool,
    /// Write childless elements as `<x/>` instead of `<x></x>`.
    pub collapse_tags: bool,
    pub suppress_comments: bool,
    /// Escape tabs and newlines in character data.
    pub escape_white_space: bool,
    /// Escape `"` and quote attributes with double quotes; when off,
    /// values containing a double quote switch to single quotes.
    pub escape_double_quote: bool,
    /// Collapse only HTML void elements, keep `<x></x>` otherwise.
    pub html: bool,
    pub version: XmlVersion,
    /// Always emit the XML declaration.
    pub wrap_prolog: bool,
    /// Encoding attribute for the declaration; its presence forces the
    /// declaration out.
    pub encoding: Option<String>,
    /// Standalone attribute for the declaration; same rule.
    pub standalone: Option<bool>,
}

impl Default for WriteOptions {
    fn default() -> Self {
        WriteOptions {
            indent: false,
            indent_width: 2,
            indent_level: 0,
            indent_attributes: false,
            collapse_tags: true,
            suppress_comments: false,
            escape_white_space: false,
            escape_double_quote: true,
            html: false,
            version: XmlVersion::V10,
            wrap_prolog: false,
            encoding: None,
            standalone: None,
        }
    }
}

// HTML "void elements": the only ones allowed to collapse in html mode.
const HTML_VOID: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

impl Document {
    pub fn write(&self, w: &mut dyn Write, opts: &WriteOptions) -> Result<(), DomError> {
        if opts.wrap_prolog || opts.encoding.is_some() || opts.standalone.is_some() {
            write!(w, "<?xml version=\"{}\"", opts.version.as_str())?;
            if let Some(encoding) = &opts.encoding {
                write!(w, " encoding=\"{}\"", encoding)?;
            }
            if let Some(standalone) = opts.standalone {
                write!(w, " standalone=\"{}\"", if standalone { "yes" } else { "no" })?;
            }
            writeln!(w, "?>")?;
        }

        for child in self.root().children() {
            write_node(child, w, opts, 0)?;
            if opts.indent {
                writeln!(w)?;
            }
        }
        Ok(())
    }

    pub fn to_xml(&self, opts: &WriteOptions) -> Result<String, DomError> {
        let mut buf = Vec::new();
        self.write(&mut buf, opts)?;
        // The writer only ever emits UTF-8.
        Ok(String::from_utf8(buf).unwrap_or_default())
    }
}

/// Serializes one node and its subtree.
pub fn write_node(node: Node<'_>, w: &mut dyn Write, opts: &WriteOptions, depth: usize) -> Result<(), DomError> {
    match node.document().kind(node.id()) {
        NodeKind::Element { .. } => write_element(node, w, opts, depth),
        NodeKind::Text(s) => {
            write_escaped(w, s, opts, false)?;
            Ok(())
        }
        NodeKind::CData(s) => write_cdata(w, s),
        NodeKind::Comment(s) => {
            if !opts.suppress_comments {
                write!(w, "<!--{}-->", s)?;
            }
            Ok(())
        }
        NodeKind::ProcessingInstruction { target, data } => {
            if data.is_empty() {
                write!(w, "<?{}?>", target)?;
            } else {
                write!(w, "<?{} {}?>", target, data)?;
            }
            Ok(())
        }
        NodeKind::Attribute { .. } | NodeKind::Document { .. } | NodeKind::Free => {
            Err(DomError::InvalidStructure("node kind is not serializable on its own"))
        }
    }
}

fn write_element(node: Node<'_>, w: &mut dyn Write, opts: &WriteOptions, depth: usize) -> Result<(), DomError> {
    let name = match node.name() {
        Some(q) => q.to_string(),
        None => return Err(DomError::InvalidStructure("element without a name")),
    };

    write!(w, "<{}", name)?;
    for attr in node.attributes() {
        let attr_name = attr.name().map(|q| q.to_string()).unwrap_or_default();
        let value = attr.text().unwrap_or("");
        check_value(value, opts.version)?;

        if opts.indent_attributes {
            writeln!(w)?;
            write_indent(w, opts, depth + 1)?;
        } else {
            write!(w, " ")?;
        }

        let double = opts.escape_double_quote || !value.contains('"');
        let quote = if double { '"' } else { '\'' };
        write!(w, "{}={}", attr_name, quote)?;
        write_escaped(w, value, opts, double)?;
        write!(w, "{}", quote)?;
    }

    if !node.has_children() {
        let collapse = if opts.html {
            HTML_VOID.contains(&name.to_ascii_lowercase().as_str())
        } else {
            opts.collapse_tags
        };
        if collapse {
            write!(w, "/>")?;
        } else {
            write!(w, "></{}>", name)?;
        }
        return Ok(());
    }

    write!(w, ">")?;

    // Mixed content is never re-indented; doing so would change it.
    let has_text = node
        .children()
        .any(|c| matches!(c.node_type(), NodeType::Text | NodeType::CData));
    let indent_children = opts.indent && !has_text;

    for child in node.children() {
        if opts.suppress_comments && child.node_type() == NodeType::Comment {
            continue;
        }
        if indent_children {
            writeln!(w)?;
            write_indent(w, opts, depth + 1)?;
        }
        write_node(child, w, opts, depth + 1)?;
    }

    if indent_children {
        writeln!(w)?;
        write_indent(w, opts, depth)?;
    }
    write!(w, "</{}>", name)?;
    Ok(())
}

fn write_indent(w: &mut dyn Write, opts: &WriteOptions, depth: usize) -> Result<(), DomError> {
    let spaces = opts.indent_width * (opts.indent_level + depth);
    write!(w, "{:spaces$}", "")?;
    Ok(())
}

fn write_cdata(w: &mut dyn Write, s: &str) -> Result<(), DomError> {
    // "]]>" cannot appear inside one section; split it across two.
    let mut rest = s;
    write!(w, "<![CDATA[")?;
    while let Some(idx) = rest.find("]]>") {
        write!(w, "{}]]", &rest[..idx])?;
        write!(w, "]]><![CDATA[")?;
        rest = &rest[idx + 2..];
    }
    write!(w, "{}]]>", rest)?;
    Ok(())
}

fn check_value(s: &str, version: XmlVersion) -> Result<(), DomError> {
    for c in s.chars() {
        if !version.permits(c) {
            return Err(DomError::InvalidCharacter(c as u32, "attribute value"));
        }
    }
    Ok(())
}

fn write_escaped(
    w: &mut dyn Write,
    s: &str,
    opts: &WriteOptions,
    in_double_quoted_attr: bool,
) -> Result<(), DomError> {
    for c in s.chars() {
        if !opts.version.permits(c) {
            return Err(DomError::InvalidCharacter(c as u32, "character data"));
        }
        match c {
            '&' => write!(w, "&amp;")?,
            '<' => write!(w, "&lt;")?,
            '>' => write!(w, "&gt;")?,
            '"' if in_double_quoted_attr => write!(w, "&quot;")?,
            '\r' => write!(w, "&#13;")?,
            '\t' | '\n' if opts.escape_white_space || in_double_quoted_attr => {
                write!(w, "&#{};", c as u32)?
            }
            c if (c as u32) < 0x20 && !xylem_text::is_space(c) => {
                // Only reachable under 1.1; always as a reference.
                write!(w, "&#{};", c as u32)?
            }
            c => {
                let mut buf = [0u8; 4];
                w.write_all(c.encode_utf8(&mut buf).as_bytes())?;
            }
        }
    }
    Ok(())
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self.to_xml(&WriteOptions::default()).map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}

impl fmt::Display for Node<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut buf = Vec::new();
        write_node(*self, &mut buf, &WriteOptions::default(), 0).map_err(|_| fmt::Error)?;
        f.write_str(&String::from_utf8(buf).unwrap_or_default())
    }
}
