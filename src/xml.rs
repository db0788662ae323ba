//! XML input driver.
//!
//! Reads a document with quick-xml's `NsReader` and replays it as
//! [`XmlSink`] calls: start tag, its namespace declarations in document
//! order, its attributes in document order, then content. Adjacent text,
//! CDATA and character/entity references are coalesced into one
//! `characters` call. Comments, processing instructions and the DOCTYPE
//! are skipped because the sink protocol has no events for them.
//!
//! # Beispiel
//!
//! ```
//! use xrewrite::{copy_xml_str, EventRecorder, XmlEvent};
//!
//! let mut recorder = EventRecorder::new();
//! copy_xml_str(r#"<p:a xmlns:p="urn:p" k="v">x</p:a>"#, &mut recorder).unwrap();
//! assert_eq!(recorder.events().len(), 5);
//! assert!(matches!(recorder.events()[4], XmlEvent::EndElement));
//! ```

use std::borrow::Cow;
use std::io::{BufRead, BufReader, Read};

use log::trace;
use memchr::memchr;
use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesCData, BytesStart, BytesText, Event};
use quick_xml::name::{QName as XmlQName, ResolveResult};
use quick_xml::reader::NsReader;

use crate::qname::QName;
use crate::sink::{XML_NS, XmlSink};
use crate::{Error, Result};

/// Streams `input` into `sink`.
///
/// # Errors
///
/// `Error::XmlParse` for malformed input or an unbound prefix; any error the
/// sink returns is passed through unchanged.
pub fn copy_xml<R: Read, S: XmlSink + ?Sized>(input: R, sink: &mut S) -> Result<()> {
    let reader = NsReader::from_reader(BufReader::new(input));
    drive(reader, sink)
}

/// Streams the document in `xml` into `sink`.
pub fn copy_xml_str<S: XmlSink + ?Sized>(xml: &str, sink: &mut S) -> Result<()> {
    drive(NsReader::from_str(xml), sink)
}

fn drive<R: BufRead, S: XmlSink + ?Sized>(mut reader: NsReader<R>, sink: &mut S) -> Result<()> {
    reader.config_mut().trim_text(false);

    let mut buf = Vec::new();
    let mut depth: usize = 0;
    // Text wird gepuffert und vor jedem Nicht-Text-Event geflusht.
    let mut pending_ch: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                flush_pending_ch(&mut pending_ch, sink)?;
                emit_start(&reader, &e, sink)?;
                depth += 1;
            }
            Ok(Event::Empty(e)) => {
                flush_pending_ch(&mut pending_ch, sink)?;
                emit_start(&reader, &e, sink)?;
                sink.end_element()?;
            }
            Ok(Event::End(_e)) => {
                flush_pending_ch(&mut pending_ch, sink)?;
                depth = depth.checked_sub(1).ok_or_else(|| {
                    Error::XmlParse("unerwartetes End-Element bei depth=0".to_string())
                })?;
                sink.end_element()?;
            }
            Ok(Event::Text(e)) => {
                if let Some(value) = decode_text(&e)? {
                    push_text(&mut pending_ch, depth, value)?;
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(value) = decode_cdata(e)? {
                    push_text(&mut pending_ch, depth, value)?;
                }
            }
            Ok(Event::GeneralRef(e)) => {
                let ref_name = decode_utf8(e.as_ref())?;
                let resolved = if ref_name.starts_with('#') {
                    resolve_char_reference(ref_name).map(String::from)
                } else {
                    resolve_predefined_entity(ref_name).map(str::to_string)
                };
                match resolved {
                    Some(value) => push_text(&mut pending_ch, depth, value)?,
                    None => {
                        return Err(Error::XmlParse(format!("unknown entity reference &{ref_name};")));
                    }
                }
            }
            Ok(Event::Comment(_) | Event::PI(_) | Event::DocType(_)) => {
                // keine Entsprechung im Sink-Protokoll, Text-Coalescing laeuft weiter
                trace!("skipping comment, PI or DOCTYPE");
            }
            Ok(Event::Decl(_)) => {}
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::XmlParse(format!(
                    "parse XML error at {:?}: {e}",
                    reader.buffer_position()
                )));
            }
        }

        buf.clear();
    }

    if depth != 0 {
        return Err(Error::XmlParse(format!("{depth} element(s) not closed at end of input")));
    }
    flush_pending_ch(&mut pending_ch, sink)?;
    sink.flush()
}

/// Emits the start tag, then declarations, then attributes.
fn emit_start<R: BufRead, S: XmlSink + ?Sized>(
    reader: &NsReader<R>,
    e: &BytesStart<'_>,
    sink: &mut S,
) -> Result<()> {
    let (uri, local, prefix) = resolve_element_qname(reader, e.name())?;
    let name = make_qname(&uri, &local, prefix.as_deref());
    sink.start_element(&name)?;

    let mut attrs: Vec<(QName, String)> = Vec::new();
    for attr in e.attributes().with_checks(false) {
        let attr = attr.map_err(|er| Error::XmlParse(er.to_string()))?;
        let key = attr.key.as_ref();
        let raw = std::str::from_utf8(attr.value.as_ref())
            .map_err(|er| Error::XmlParse(er.to_string()))?;

        if key == b"xmlns" {
            sink.default_namespace_decl(&unescape_attr_value(raw))?;
            continue;
        }
        if let Some(p) = key.strip_prefix(b"xmlns:") {
            sink.namespace_decl(decode_utf8(p)?, &unescape_attr_value(raw))?;
            continue;
        }

        let (attr_uri, attr_local, attr_prefix) = resolve_attribute_qname(reader, attr.key)?;
        let normalized = normalize_attr_whitespace(raw);
        let value = unescape_attr_value(&normalized).into_owned();
        attrs.push((make_qname(&attr_uri, &attr_local, attr_prefix.as_deref()), value));
    }

    for (name, value) in &attrs {
        sink.attribute(name, value)?;
    }
    Ok(())
}

fn flush_pending_ch<S: XmlSink + ?Sized>(pending_ch: &mut Option<String>, sink: &mut S) -> Result<()> {
    if let Some(text) = pending_ch.take() {
        sink.characters(&text)?;
    }
    Ok(())
}

/// Haengt Text an den Puffer an. Ausserhalb des Wurzelelements ist nur
/// Whitespace erlaubt.
fn push_text(pending_ch: &mut Option<String>, depth: usize, value: String) -> Result<()> {
    if depth == 0 {
        if value.trim().is_empty() {
            return Ok(());
        }
        return Err(Error::XmlParse("character data outside root element".to_string()));
    }
    match pending_ch {
        Some(existing) => existing.push_str(&value),
        None => *pending_ch = Some(value),
    }
    Ok(())
}

fn make_qname(uri: &str, local_name: &str, prefix: Option<&str>) -> QName {
    match prefix {
        Some(pfx) => QName::with_prefix(uri, local_name, pfx),
        None => QName::new(uri, local_name),
    }
}

fn resolve_element_qname<R: BufRead>(
    reader: &NsReader<R>,
    name: XmlQName<'_>,
) -> Result<(String, String, Option<String>)> {
    let (ns, local) = reader.resolver().resolve_element(name);
    split_resolved(ns, local.as_ref(), name.as_ref())
}

fn resolve_attribute_qname<R: BufRead>(
    reader: &NsReader<R>,
    name: XmlQName<'_>,
) -> Result<(String, String, Option<String>)> {
    let (ns, local) = reader.resolver().resolve_attribute(name);
    split_resolved(ns, local.as_ref(), name.as_ref())
}

fn split_resolved(
    ns: ResolveResult<'_>,
    local: &[u8],
    raw_name: &[u8],
) -> Result<(String, String, Option<String>)> {
    let uri = match ns {
        ResolveResult::Bound(ns) => decode_utf8(ns.as_ref())?.to_string(),
        ResolveResult::Unbound => String::new(),
        // `xml` ist immer gebunden, auch ohne Deklaration
        ResolveResult::Unknown(p) if p == b"xml" => XML_NS.to_string(),
        ResolveResult::Unknown(p) => {
            return Err(Error::XmlParse(format!(
                "unknown namespace prefix {:?}",
                String::from_utf8_lossy(&p)
            )));
        }
    };
    let local_name = decode_utf8(local)?.to_string();
    let prefix = match split_prefix(raw_name) {
        Some(p) => Some(decode_utf8(p)?.to_string()),
        None => None,
    };
    Ok((uri, local_name, prefix))
}

fn split_prefix(name: &[u8]) -> Option<&[u8]> {
    let pos = memchr(b':', name)?;
    Some(&name[..pos])
}

fn decode_utf8(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|er| Error::XmlParse(er.to_string()))
}

fn decode_text(e: &BytesText<'_>) -> Result<Option<String>> {
    let raw = decode_utf8(e)?;
    let text = quick_xml::escape::unescape(raw).map_err(|er| Error::XmlParse(er.to_string()))?;
    if text.is_empty() {
        Ok(None)
    } else {
        Ok(Some(normalize_line_endings(text.as_ref()).into_owned()))
    }
}

fn decode_cdata(e: BytesCData<'_>) -> Result<Option<String>> {
    let text = decode_utf8(&e)?;
    if text.is_empty() {
        Ok(None)
    } else {
        Ok(Some(normalize_line_endings(text).into_owned()))
    }
}

/// Loest Zeichen- und vordefinierte Entity-Referenzen in Attributwerten auf.
/// Unbekannte Referenzen bleiben unveraendert.
fn unescape_attr_value(value: &str) -> Cow<'_, str> {
    let bytes = value.as_bytes();
    let Some(mut amp) = memchr(b'&', bytes) else {
        return Cow::Borrowed(value);
    };

    let mut out = String::with_capacity(value.len());
    let mut pos = 0;
    loop {
        out.push_str(&value[pos..amp]);
        let Some(rel_semi) = memchr(b';', &bytes[amp + 1..]) else {
            out.push_str(&value[amp..]);
            return Cow::Owned(out);
        };
        let semi = amp + 1 + rel_semi;
        let name = &value[amp + 1..semi];
        if name.starts_with('#')
            && let Some(ch) = resolve_char_reference(name)
        {
            out.push(ch);
        } else if let Some(predef) = resolve_predefined_entity(name) {
            out.push_str(predef);
        } else {
            out.push_str(&value[amp..=semi]);
        }
        pos = semi + 1;
        match memchr(b'&', &bytes[pos..]) {
            Some(rel) => amp = pos + rel,
            None => {
                out.push_str(&value[pos..]);
                return Cow::Owned(out);
            }
        }
    }
}

/// XML 1.0 Sec. 2.11: \r\n -> \n, alleinstehende \r -> \n
fn normalize_line_endings(s: &str) -> Cow<'_, str> {
    if memchr(b'\r', s.as_bytes()).is_none() {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\r' {
            if matches!(chars.peek(), Some('\n')) {
                chars.next();
            }
            out.push('\n');
        } else {
            out.push(ch);
        }
    }
    Cow::Owned(out)
}

/// XML 1.0 Sec. 3.3.3: literale Zeilenumbrueche und Tabs im Attributwert
/// werden zu Leerzeichen. Laeuft vor dem Unescaping, damit `&#10;`
/// erhalten bleibt.
fn normalize_attr_whitespace(s: &str) -> Cow<'_, str> {
    if !s.bytes().any(|b| matches!(b, b'\r' | b'\n' | b'\t')) {
        return Cow::Borrowed(s);
    }
    let collapsed = normalize_line_endings(s);
    Cow::Owned(collapsed.replace(['\n', '\t'], " "))
}

fn resolve_char_reference(ref_name: &str) -> Option<char> {
    let digits = ref_name.strip_prefix('#')?;
    let code_point = if let Some(hex) = digits.strip_prefix('x') {
        u32::from_str_radix(hex, 16).ok()?
    } else {
        digits.parse::<u32>().ok()?
    };
    char::from_u32(code_point)
}
