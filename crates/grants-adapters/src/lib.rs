//! Record parser for the `OpportunityDetail-V1.0` XML extract.
//!
//! Opportunities are the `OpportunitySynopsisDetail_1_0` children of the
//! document root; each field is a direct child element in the same namespace.
//! Anything outside that namespace is ignored.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use grants_core::{
    OpportunityField, OpportunityRecord, FIELD_COUNT, OPPORTUNITY_ELEMENT, OPPORTUNITY_NAMESPACE,
};
use quick_xml::events::Event;
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::reader::NsReader;
use thiserror::Error;
use tracing::debug;

pub const CRATE_NAME: &str = "grants-adapters";

const RECORD_DEPTH: usize = 1;
const FIELD_DEPTH: usize = 2;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("opening {}: {source}", path.display())]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed XML at byte {position}: {source}")]
    Xml {
        position: u64,
        source: quick_xml::Error,
    },
    #[error("document ended with {open_elements} unclosed element(s)")]
    UnexpectedEof { open_elements: usize },
}

/// Field text captured so far for one record.
#[derive(Debug, Default)]
struct PendingRecord {
    values: [Option<String>; FIELD_COUNT],
    capture: Option<FieldCapture>,
}

#[derive(Debug)]
struct FieldCapture {
    field: OpportunityField,
    text: String,
    // Element text ends at the first child element.
    closed: bool,
}

impl PendingRecord {
    fn begin_field(&mut self, field: OpportunityField) {
        self.capture = Some(FieldCapture {
            field,
            text: String::new(),
            closed: false,
        });
    }

    fn push_text(&mut self, text: &str) {
        if let Some(capture) = self.capture.as_mut().filter(|c| !c.closed) {
            capture.text.push_str(text);
        }
    }

    fn close_text(&mut self) {
        if let Some(capture) = self.capture.as_mut() {
            capture.closed = true;
        }
    }

    fn end_field(&mut self) {
        if let Some(capture) = self.capture.take() {
            self.store(capture.field, capture.text);
        }
    }

    fn store(&mut self, field: OpportunityField, text: String) {
        // First occurrence wins.
        let slot = &mut self.values[field.index()];
        if slot.is_none() {
            *slot = Some(text);
        }
    }

    fn finish(mut self) -> OpportunityRecord {
        OpportunityRecord::from_lookup(|field| self.values[field.index()].take())
    }
}

fn in_opportunity_namespace(ns: &ResolveResult<'_>) -> bool {
    matches!(ns, ResolveResult::Bound(Namespace(uri)) if *uri == OPPORTUNITY_NAMESPACE.as_bytes())
}

/// Parse every opportunity record from an XML stream, in document order.
pub fn parse_opportunities<R: BufRead>(input: R) -> Result<Vec<OpportunityRecord>, ParseError> {
    let mut reader = NsReader::from_reader(input);
    let mut buf = Vec::new();
    let mut depth = 0usize;
    let mut pending: Option<PendingRecord> = None;
    let mut records = Vec::new();

    loop {
        let (in_ns, event) = match reader.read_resolved_event_into(&mut buf) {
            Ok((ns, event)) => (in_opportunity_namespace(&ns), event),
            Err(source) => {
                return Err(ParseError::Xml {
                    position: reader.error_position() as u64,
                    source,
                })
            }
        };

        match event {
            Event::Start(e) => {
                let local = e.local_name();
                if depth == RECORD_DEPTH && in_ns && is_record_element(local.as_ref()) {
                    pending = Some(PendingRecord::default());
                } else if let Some(record) = pending.as_mut() {
                    if depth == FIELD_DEPTH && in_ns {
                        if let Some(field) = field_for(local.as_ref()) {
                            record.begin_field(field);
                        }
                    } else if depth > FIELD_DEPTH {
                        record.close_text();
                    }
                }
                depth += 1;
            }
            Event::Empty(e) => {
                let local = e.local_name();
                if depth == RECORD_DEPTH && in_ns && is_record_element(local.as_ref()) {
                    records.push(PendingRecord::default().finish());
                } else if let Some(record) = pending.as_mut() {
                    if depth == FIELD_DEPTH && in_ns {
                        if let Some(field) = field_for(local.as_ref()) {
                            record.store(field, String::new());
                        }
                    } else if depth > FIELD_DEPTH {
                        record.close_text();
                    }
                }
            }
            Event::Text(e) => {
                if depth == FIELD_DEPTH + 1 {
                    if let Some(record) = pending.as_mut() {
                        let text = e.unescape().map_err(|source| ParseError::Xml {
                            position: reader.buffer_position() as u64,
                            source,
                        })?;
                        record.push_text(&text);
                    }
                }
            }
            Event::CData(e) => {
                if depth == FIELD_DEPTH + 1 {
                    if let Some(record) = pending.as_mut() {
                        record.push_text(&String::from_utf8_lossy(&e.into_inner()));
                    }
                }
            }
            Event::End(_) => {
                depth = depth.saturating_sub(1);
                match depth {
                    FIELD_DEPTH => {
                        if let Some(record) = pending.as_mut() {
                            record.end_field();
                        }
                    }
                    RECORD_DEPTH => {
                        if let Some(record) = pending.take() {
                            records.push(record.finish());
                        }
                    }
                    _ => {}
                }
            }
            Event::Eof => {
                if depth != 0 {
                    return Err(ParseError::UnexpectedEof {
                        open_elements: depth,
                    });
                }
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(records)
}

fn is_record_element(local_name: &[u8]) -> bool {
    local_name == OPPORTUNITY_ELEMENT.as_bytes()
}

fn field_for(local_name: &[u8]) -> Option<OpportunityField> {
    std::str::from_utf8(local_name)
        .ok()
        .and_then(OpportunityField::from_xml_name)
}

pub fn parse_opportunities_str(xml: &str) -> Result<Vec<OpportunityRecord>, ParseError> {
    parse_opportunities(xml.as_bytes())
}

pub fn parse_opportunity_file(path: impl AsRef<Path>) -> Result<Vec<OpportunityRecord>, ParseError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| ParseError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let records = parse_opportunities(BufReader::new(file))?;
    debug!(path = %path.display(), records = records.len(), "parsed opportunity extract");
    Ok(records)
}
