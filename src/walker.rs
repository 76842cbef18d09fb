use std::io::BufRead;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::LoadError;

/// The stack of open tag names at the current point of a traversal. This is
/// the explicit replacement for a bare depth counter: accumulators match on
/// tag names in context instead of on depth/tag coincidences.
#[derive(Debug, Clone, Default)]
pub struct TagPath {
    stack: Vec<String>,
}

impl TagPath {
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// The innermost open tag, empty at document level.
    pub fn tag(&self) -> &str {
        self.stack.last().map(String::as_str).unwrap_or("")
    }

    pub fn parent(&self) -> &str {
        if self.stack.len() < 2 {
            return "";
        }
        &self.stack[self.stack.len() - 2]
    }

    pub fn ends_with(&self, suffix: &[&str]) -> bool {
        if suffix.len() > self.stack.len() {
            return false;
        }
        self.stack[self.stack.len() - suffix.len()..]
            .iter()
            .zip(suffix)
            .all(|(have, want)| have == want)
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.stack.iter().any(|name| name == tag)
    }

    fn push(&mut self, tag: String) {
        self.stack.push(tag);
    }

    fn pop(&mut self) {
        self.stack.pop();
    }
}

/// Attributes of one opened tag, namespace prefixes stripped.
#[derive(Debug, Clone, Default)]
pub struct Attrs(Vec<(String, String)>);

impl Attrs {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Receiver for the traversal event stream. `text` fires at most once per
/// element, just before its `exit`, with the element's accumulated character
/// data.
pub trait TagSink {
    fn enter(&mut self, path: &TagPath, attrs: &Attrs);
    fn text(&mut self, path: &TagPath, text: &str);
    fn exit(&mut self, path: &TagPath);
}

/// Streams one XML document into a [`TagSink`], maintaining the tag path.
///
/// A malformed byte stream surfaces as `LoadError::Xml` and the traversal
/// stops; the walker owns no state beyond the call, so a failed file cannot
/// leak into the processing of a sibling file.
pub struct TagPathWalker;

impl TagPathWalker {
    pub fn walk<R, S>(input: R, sink: &mut S, label: &str) -> Result<(), LoadError>
    where
        R: BufRead,
        S: TagSink,
    {
        let xml_error = |message: String| LoadError::Xml {
            path: label.to_string(),
            message,
        };

        let mut reader = Reader::from_reader(input);
        reader.config_mut().trim_text(true);

        let mut buf = Vec::new();
        let mut path = TagPath::default();
        // one text buffer per open element
        let mut text_stack: Vec<String> = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(start)) => {
                    let attrs = collect_attrs(&start).map_err(&xml_error)?;
                    path.push(local_name(start.name().as_ref()));
                    text_stack.push(String::new());
                    sink.enter(&path, &attrs);
                }
                Ok(Event::Empty(start)) => {
                    let attrs = collect_attrs(&start).map_err(&xml_error)?;
                    path.push(local_name(start.name().as_ref()));
                    sink.enter(&path, &attrs);
                    sink.exit(&path);
                    path.pop();
                }
                Ok(Event::Text(text)) => {
                    let value = text.unescape().map_err(|err| xml_error(err.to_string()))?;
                    if let Some(top) = text_stack.last_mut() {
                        top.push_str(&value);
                    }
                }
                Ok(Event::CData(cdata)) => {
                    if let Some(top) = text_stack.last_mut() {
                        top.push_str(&String::from_utf8_lossy(cdata.into_inner().as_ref()));
                    }
                }
                Ok(Event::End(_)) => {
                    let text = text_stack.pop().unwrap_or_default();
                    if !text.is_empty() {
                        sink.text(&path, &text);
                    }
                    sink.exit(&path);
                    path.pop();
                }
                Ok(Event::Eof) => {
                    if path.depth() > 0 {
                        return Err(xml_error(format!(
                            "unexpected end of file inside <{}>",
                            path.tag()
                        )));
                    }
                    break;
                }
                Ok(_) => {}
                Err(err) => return Err(xml_error(err.to_string())),
            }
            buf.clear();
        }
        Ok(())
    }
}

fn local_name(qname: &[u8]) -> String {
    let local = qname
        .rsplit(|byte| *byte == b':')
        .next()
        .unwrap_or(qname);
    String::from_utf8_lossy(local).into_owned()
}

fn collect_attrs(start: &BytesStart<'_>) -> Result<Attrs, String> {
    let mut out = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|err| err.to_string())?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|err| err.to_string())?
            .into_owned();
        out.push((key, value));
    }
    Ok(Attrs(out))
}
