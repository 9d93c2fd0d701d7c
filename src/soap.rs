use crate::constants::{CREATED_FORMAT, NS_SOAP, OPERATION_NS};
use crate::error::{OnvifError, Result};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use quick_xml::Reader;
use quick_xml::events::Event;
use rand::RngCore;
use sha1::{Digest, Sha1};

/// WS-Security UsernameToken password digest:
/// `base64(sha1(nonce || created || password))`.
pub fn password_digest(nonce: &[u8], created: &str, password: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(nonce);
    hasher.update(created.as_bytes());
    hasher.update(password.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Build the `<wsse:Security>` header for one request. `clock_offset` is the
/// device clock minus our clock; cameras reject tokens whose Created stamp
/// drifts outside their replay window.
pub fn security_header(username: &str, password: &str, clock_offset: chrono::Duration) -> String {
    let mut nonce = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut nonce);

    let created = (chrono::Utc::now() + clock_offset)
        .format(CREATED_FORMAT)
        .to_string();
    let digest = password_digest(&nonce, &created, password);

    format!(
        r#"<wsse:Security xmlns:wsse="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd" xmlns:wsu="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd"><wsse:UsernameToken><wsse:Username>{}</wsse:Username><wsse:Password Type="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#PasswordDigest">{}</wsse:Password><wsse:Nonce EncodingType="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-soap-message-security-1.0#Base64Binary">{}</wsse:Nonce><wsu:Created>{}</wsu:Created></wsse:UsernameToken></wsse:Security>"#,
        escape(username),
        digest,
        BASE64.encode(nonce),
        created
    )
}

/// Wrap an operation body in its WSDL namespace. The inner XML is inserted
/// verbatim; callers escape interpolated values themselves.
pub fn operation_body(operation: &str, inner: &str) -> Result<String> {
    let ns = OPERATION_NS.get(operation).ok_or_else(|| {
        OnvifError::ValidationError(format!("Unknown ONVIF operation: {}", operation))
    })?;
    Ok(format!(r#"<{op} xmlns="{ns}">{inner}</{op}>"#, op = operation))
}

/// Assemble the SOAP 1.2 envelope around a header and body.
pub fn envelope(header: &str, body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><s:Envelope xmlns:s="{}"><s:Header>{}</s:Header><s:Body>{}</s:Body></s:Envelope>"#,
        NS_SOAP, header, body
    )
}

pub fn escape(value: &str) -> String {
    quick_xml::escape::escape(value).into_owned()
}

/// Extract the subcode and reason from a SOAP fault, if the response is one.
pub fn parse_fault(xml: &str) -> Option<(String, String)> {
    let mut reader = Reader::from_str(xml);
    let mut path: Vec<String> = Vec::new();
    let mut in_fault = false;
    let mut code = None;
    let mut reason = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = local_name(e.name().as_ref());
                if name == "Fault" {
                    in_fault = true;
                }
                path.push(name);
            }
            Ok(Event::End(_)) => {
                path.pop();
            }
            Ok(Event::Text(t)) if in_fault => {
                let text = t.unescape().ok()?.trim().to_string();
                if text.is_empty() {
                    continue;
                }
                match path.as_slice() {
                    [.., parent, tag] if tag.as_str() == "Value" && parent.as_str() == "Subcode" => {
                        code = Some(text);
                    }
                    [.., tag] if tag.as_str() == "Text" => {
                        reason.get_or_insert(text);
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
    }

    if !in_fault {
        return None;
    }
    Some((
        code.unwrap_or_else(|| "s:Receiver".to_string()),
        reason.unwrap_or_else(|| "Unspecified fault".to_string()),
    ))
}

/// First text content of `tag`, ignoring namespace prefixes.
pub fn element_text(xml: &str, tag: &str) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    let mut inside = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                inside = local_name(e.name().as_ref()) == tag;
            }
            Ok(Event::End(_)) => {
                inside = false;
            }
            Ok(Event::Text(t)) if inside => {
                if let Ok(text) = t.unescape() {
                    let text = text.trim().to_string();
                    if !text.is_empty() {
                        return Some(text);
                    }
                }
            }
            Ok(Event::Eof) => return None,
            Err(_) => return None,
            _ => {}
        }
    }
}

pub(crate) fn local_name(qname: &[u8]) -> String {
    let name = qname
        .rsplit(|&b| b == b':')
        .next()
        .unwrap_or(qname)
        .to_vec();
    String::from_utf8_lossy(&name).into_owned()
}
