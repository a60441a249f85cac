//! S3 XML document parsing.
//!
//! Public bucket endpoints answer with raw S3 XML: a `<ListBucketResult>`
//! index when listing is allowed, an `<Error>` document otherwise.  Both
//! are read with `quick-xml` in streaming mode so a huge index is never
//! materialized past the requested key limit.

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::errors::ProbeError;

/// Strip a namespace prefix from a tag name (`s3:Key` -> `Key`).
fn local_name(raw: &[u8]) -> String {
    let tag = String::from_utf8_lossy(raw);
    tag.rsplit(':').next().unwrap_or(&tag).to_string()
}

/// Extract up to `limit` object keys from a `<ListBucketResult>` document.
///
/// Only `Key` elements nested in `Contents` under a `ListBucketResult`
/// root count; namespaces are ignored.  Key text is kept verbatim: S3 keys
/// may begin or end with whitespace.
pub fn parse_list_bucket_keys(body: &[u8], limit: usize) -> Result<Vec<String>, ProbeError> {
    let mut reader = Reader::from_reader(body);

    let mut keys = Vec::new();
    let mut in_result = false;
    let mut in_contents = false;
    let mut in_key = false;
    let mut current_key = String::new();
    let mut buf = Vec::new();

    while keys.len() < limit {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match local_name(e.name().as_ref()).as_str() {
                "ListBucketResult" => in_result = true,
                "Contents" if in_result => in_contents = true,
                "Key" if in_contents => {
                    in_key = true;
                    current_key.clear();
                }
                _ => {}
            },
            Ok(Event::End(ref e)) => match local_name(e.name().as_ref()).as_str() {
                "ListBucketResult" => in_result = false,
                "Contents" => in_contents = false,
                "Key" if in_key => {
                    in_key = false;
                    if !current_key.is_empty() {
                        keys.push(std::mem::take(&mut current_key));
                    }
                }
                _ => {}
            },
            Ok(Event::Text(ref e)) if in_key => {
                let text = e
                    .unescape()
                    .map_err(|err| ProbeError::Transport(anyhow::anyhow!("listing XML: {err}")))?;
                current_key.push_str(&text);
            }
            Ok(Event::CData(ref e)) if in_key => {
                current_key.push_str(&String::from_utf8_lossy(e));
            }
            Ok(Event::Eof) => break,
            Err(err) => {
                return Err(ProbeError::Transport(anyhow::anyhow!(
                    "malformed listing XML at position {}: {err}",
                    reader.buffer_position()
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(keys)
}

/// Extract the `<Code>` of an S3 `<Error>` document, if the body is one.
pub fn parse_error_code(body: &[u8]) -> Option<String> {
    let mut reader = Reader::from_reader(body);
    reader.trim_text(true);
    let mut buf = Vec::new();
    let mut in_error = false;
    let mut in_code = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match local_name(e.name().as_ref()).as_str() {
                "Error" => in_error = true,
                "Code" if in_error => in_code = true,
                _ => {}
            },
            Ok(Event::Text(ref e)) if in_code => {
                let text = e.unescape().ok()?.trim().to_string();
                return (!text.is_empty()).then_some(text);
            }
            Ok(Event::End(ref e)) if local_name(e.name().as_ref()) == "Code" => {
                in_code = false;
            }
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
        buf.clear();
    }
}
