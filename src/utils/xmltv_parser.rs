//! Quick-XML based XMLTV parser
//!
//! Streams `programme` elements out of any `BufRead` source. Only the fields
//! the guide lookup uses are extracted: channel, start, stop, title and desc.
//! The document is never held in memory as a whole.

use std::io::{self, BufRead};

use quick_xml::Reader;
use quick_xml::events::{BytesRef, BytesStart, Event};
use tracing::trace;

use crate::errors::{EpgError, NetworkError};
use crate::models::EpgProgram;
use crate::utils::time::parse_xmltv_timestamp;

/// Counters for one parsed document
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct XmltvSummary {
    /// Programmes handed to the callback
    pub programmes: usize,
    /// Programmes skipped for missing fields or bad timestamps
    pub dropped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextField {
    Title,
    Description,
}

#[derive(Debug, Default)]
struct PendingProgramme {
    channel: Option<String>,
    start: Option<String>,
    stop: Option<String>,
    title: Option<String>,
    description: Option<String>,
}

impl PendingProgramme {
    fn from_element<R>(element: &BytesStart<'_>, reader: &Reader<R>) -> Self {
        let mut pending = Self::default();
        for attr in element.attributes().flatten() {
            let Ok(value) = attr.decode_and_unescape_value(reader.decoder()) else {
                continue;
            };
            match attr.key.as_ref() {
                b"channel" => pending.channel = Some(value.into_owned()),
                b"start" => pending.start = Some(value.into_owned()),
                b"stop" => pending.stop = Some(value.into_owned()),
                _ => {}
            }
        }
        pending
    }

    fn set_text(&mut self, field: TextField, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        // First non-empty value wins when a guide repeats titles per language
        let slot = match field {
            TextField::Title => &mut self.title,
            TextField::Description => &mut self.description,
        };
        if slot.is_none() {
            *slot = Some(text.to_string());
        }
    }

    fn into_program(self) -> Option<EpgProgram> {
        let channel = self.channel.filter(|c| !c.trim().is_empty())?;
        let start = parse_xmltv_timestamp(self.start.as_deref()?)?;
        let stop = parse_xmltv_timestamp(self.stop.as_deref()?)?;
        let title = self.title?;

        Some(EpgProgram {
            channel_id: channel,
            start,
            stop,
            title,
            description: self.description,
        })
    }
}

/// Parse an XMLTV document, calling `on_program` for every complete programme
///
/// A programme is complete when it has a channel, parsable start and stop
/// timestamps and a non-empty title. Incomplete ones are counted in
/// [`XmltvSummary::dropped`]. Malformed XML aborts with [`EpgError::Xml`].
pub fn parse_xmltv_programs<R, F>(source: R, mut on_program: F) -> Result<XmltvSummary, EpgError>
where
    R: BufRead,
    F: FnMut(EpgProgram),
{
    let mut reader = Reader::from_reader(source);
    let mut buf = Vec::new();
    let mut summary = XmltvSummary::default();

    let mut pending: Option<PendingProgramme> = None;
    let mut capture: Option<TextField> = None;
    let mut text = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"programme" => {
                    pending = Some(PendingProgramme::from_element(e, &reader));
                    capture = None;
                }
                b"title" if pending.is_some() => {
                    capture = Some(TextField::Title);
                    text.clear();
                }
                b"desc" if pending.is_some() => {
                    capture = Some(TextField::Description);
                    text.clear();
                }
                _ => {}
            },

            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"programme" => {
                    capture = None;
                    if let Some(programme) = pending.take() {
                        match programme.into_program() {
                            Some(program) => {
                                summary.programmes += 1;
                                on_program(program);
                            }
                            None => {
                                summary.dropped += 1;
                                trace!("Dropping incomplete programme");
                            }
                        }
                    }
                }
                b"title" | b"desc" => {
                    if let (Some(field), Some(programme)) = (capture.take(), pending.as_mut()) {
                        programme.set_text(field, &text);
                    }
                    text.clear();
                }
                _ => {}
            },

            Ok(Event::Text(ref e)) if capture.is_some() => {
                text.push_str(&String::from_utf8_lossy(e));
            }

            Ok(Event::CData(ref e)) if capture.is_some() => {
                text.push_str(&String::from_utf8_lossy(e));
            }

            Ok(Event::GeneralRef(ref e)) if capture.is_some() => {
                push_entity(&mut text, e);
            }

            Ok(Event::Eof) => break,

            Err(e) => return Err(epg_error_from_xml(e)),

            // Comments, declarations, channel elements, etc.
            _ => {}
        }
        buf.clear();
    }

    Ok(summary)
}

/// Append the text an entity reference stands for
fn push_entity(text: &mut String, reference: &BytesRef<'_>) {
    if let Ok(Some(ch)) = reference.resolve_char_ref() {
        text.push(ch);
        return;
    }

    let name = String::from_utf8_lossy(reference);
    match name.as_ref() {
        "lt" => text.push('<'),
        "gt" => text.push('>'),
        "amp" => text.push('&'),
        "apos" => text.push('\''),
        "quot" => text.push('"'),
        other => {
            // Unknown entity, keep it verbatim
            text.push('&');
            text.push_str(other);
            text.push(';');
        }
    }
}

fn epg_error_from_xml(err: quick_xml::Error) -> EpgError {
    match err {
        quick_xml::Error::Io(io) => epg_error_from_io(&io),
        other => EpgError::xml(other.to_string()),
    }
}

/// Map an I/O failure from the guide reader chain onto [`EpgError`]
///
/// Transport errors travel through the blocking bridge wrapped in
/// `io::Error` and are unwrapped back into [`EpgError::Network`]; corrupt
/// data from the decoder becomes [`EpgError::Decompression`].
pub fn epg_error_from_io(err: &io::Error) -> EpgError {
    if let Some(network) = err
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<NetworkError>())
    {
        return EpgError::Network(network.clone());
    }

    match err.kind() {
        io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput | io::ErrorKind::UnexpectedEof => {
            EpgError::Decompression {
                message: err.to_string(),
            }
        }
        _ => EpgError::Io {
            message: err.to_string(),
        },
    }
}
