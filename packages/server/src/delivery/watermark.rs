//! Invisible per-purchase markers for delivered text.
//!
//! The marker id is spelled out bit by bit in zero-width characters, framed
//! by a zero-width joiner on each side, and spliced in a quarter of the way
//! into the body.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

const ZERO: char = '\u{200B}';
const ONE: char = '\u{200C}';
const MARKER: char = '\u{200D}';

/// Hex characters of the HMAC kept in the id.
const ID_HEX_LEN: usize = 16;

#[derive(Clone)]
pub struct Watermarker {
    secret: Vec<u8>,
}

impl Watermarker {
    /// `None` when no secret is configured.
    pub fn new(secret: &str) -> Option<Self> {
        if secret.is_empty() {
            return None;
        }
        Some(Self {
            secret: secret.as_bytes().to_vec(),
        })
    }

    /// `wm-` followed by 16 hex characters of HMAC-SHA256 over
    /// `resource:purchase:timestamp`.
    pub fn mark_id(&self, resource_id: Uuid, purchase_id: Uuid, timestamp_ms: i64) -> String {
        let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(&self.secret) else {
            return String::new();
        };
        mac.update(format!("{resource_id}:{purchase_id}:{timestamp_ms}").as_bytes());
        let digest = hex::encode(mac.finalize().into_bytes());
        format!("wm-{}", &digest[..ID_HEX_LEN])
    }
}

impl std::fmt::Debug for Watermarker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Watermarker(..)")
    }
}

fn encode(mark: &str) -> String {
    let mut out = String::with_capacity(mark.len() * 8 * 3 + 6);
    out.push(MARKER);
    for byte in mark.bytes() {
        for shift in (0..8).rev() {
            out.push(if (byte >> shift) & 1 == 1 { ONE } else { ZERO });
        }
    }
    out.push(MARKER);
    out
}

/// Insert `mark` at 25% of the character count of `text`.
pub fn embed(text: &str, mark: &str) -> String {
    let at = text.chars().count() / 4;
    let split = text
        .char_indices()
        .nth(at)
        .map(|(i, _)| i)
        .unwrap_or(text.len());

    let mut out = String::with_capacity(text.len() + mark.len() * 24 + 6);
    out.push_str(&text[..split]);
    out.push_str(&encode(mark));
    out.push_str(&text[split..]);
    out
}

/// Recover the first embedded mark, if any.
#[cfg(test)]
fn extract(text: &str) -> Option<String> {
    let start = text.find(MARKER)? + MARKER.len_utf8();
    let len = text[start..].find(MARKER)?;

    let bits: Vec<u8> = text[start..start + len]
        .chars()
        .map(|c| match c {
            ZERO => Some(0),
            ONE => Some(1),
            _ => None,
        })
        .collect::<Option<_>>()?;

    if bits.is_empty() || bits.len() % 8 != 0 {
        return None;
    }

    let bytes: Vec<u8> = bits
        .chunks(8)
        .map(|chunk| chunk.iter().fold(0u8, |acc, bit| (acc << 1) | bit))
        .collect();
    String::from_utf8(bytes).ok()
}

/// `text` with every zero-width character used by the encoding removed.
#[cfg(test)]
fn strip(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(*c, ZERO | ONE | MARKER))
        .collect()
}
