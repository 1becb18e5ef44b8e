// ABOUTME: data_coding byte to character set mapping with configurable overrides
// ABOUTME: SMSCs violate the encoding rules often enough that decoding is two-stage: strict, then lossy

use std::collections::HashMap;
use std::str::FromStr;

use thiserror::Error;

/// Character sets this transport can decode. The names accepted in
/// `data_coding_overrides` are the lowercase variants of these.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Charset {
    /// 7-bit ASCII (also used for the GSM default alphabet in practice)
    Ascii,
    /// ISO-8859-1
    Latin1,
    /// UCS-2 big endian (UTF-16BE without surrogate awareness on the SMSC side)
    Ucs2,
    /// UTF-8, seen from SMSCs that ignore the data_coding table entirely
    Utf8,
    /// Uninterpreted octets, mapped through Latin-1 so nothing is lost
    Octet,
}

impl FromStr for Charset {
    type Err = DataCodingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ascii" => Ok(Charset::Ascii),
            "latin1" | "iso-8859-1" => Ok(Charset::Latin1),
            "ucs2" | "utf-16be" => Ok(Charset::Ucs2),
            "utf8" | "utf-8" => Ok(Charset::Utf8),
            "octet" | "octet_unspecified" => Ok(Charset::Octet),
            other => Err(DataCodingError::UnknownCharset(other.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum DataCodingError {
    #[error("unknown charset name '{0}'")]
    UnknownCharset(String),

    #[error("no charset mapped for data_coding {0:#04x}")]
    UnmappedDataCoding(u8),

    #[error("payload is not valid {charset:?}: {reason}")]
    MalformedPayload { charset: Charset, reason: String },
}

/// Mutable data_coding -> charset table, seeded with the SMPP defaults and
/// adjusted per deployment through `data_coding_overrides`.
#[derive(Clone, Debug)]
pub struct DataCodingMap {
    entries: HashMap<u8, Charset>,
}

impl Default for DataCodingMap {
    fn default() -> Self {
        let mut entries = HashMap::new();
        entries.insert(0x00, Charset::Ascii);
        entries.insert(0x01, Charset::Ascii);
        entries.insert(0x03, Charset::Latin1);
        entries.insert(0x08, Charset::Ucs2);
        DataCodingMap { entries }
    }
}

impl DataCodingMap {
    /// Build the table from the defaults plus override entries of the form
    /// `data_coding byte -> charset name`.
    pub fn with_overrides(overrides: &HashMap<u8, String>) -> Result<Self, DataCodingError> {
        let mut map = DataCodingMap::default();
        for (coding, name) in overrides {
            map.entries.insert(*coding, name.parse()?);
        }
        Ok(map)
    }

    pub fn charset_for(&self, data_coding: u8) -> Option<Charset> {
        self.entries.get(&data_coding).copied()
    }

    /// Strict decode. Fails on an unmapped data_coding or a payload that is
    /// invalid for the mapped charset.
    pub fn decode(&self, data_coding: u8, payload: &[u8]) -> Result<String, DataCodingError> {
        let charset = self
            .charset_for(data_coding)
            .ok_or(DataCodingError::UnmappedDataCoding(data_coding))?;
        decode_charset(charset, payload)
    }

    /// Best-effort decode for the publish-anyway path: undecodable octets
    /// are replaced rather than dropped, unmapped codings fall back to a
    /// lossless Latin-1 view.
    pub fn decode_lossy(&self, data_coding: u8, payload: &[u8]) -> String {
        match self.charset_for(data_coding).unwrap_or(Charset::Octet) {
            Charset::Ucs2 => {
                let units: Vec<u16> = payload
                    .chunks(2)
                    .map(|c| u16::from_be_bytes([c[0], *c.get(1).unwrap_or(&0)]))
                    .collect();
                String::from_utf16_lossy(&units)
            }
            Charset::Utf8 => String::from_utf8_lossy(payload).into_owned(),
            Charset::Ascii | Charset::Latin1 | Charset::Octet => {
                payload.iter().map(|&b| b as char).collect()
            }
        }
    }
}

fn decode_charset(charset: Charset, payload: &[u8]) -> Result<String, DataCodingError> {
    match charset {
        Charset::Ascii => {
            if let Some(bad) = payload.iter().find(|b| !b.is_ascii()) {
                return Err(DataCodingError::MalformedPayload {
                    charset,
                    reason: format!("non-ascii octet {bad:#04x}"),
                });
            }
            Ok(payload.iter().map(|&b| b as char).collect())
        }
        Charset::Latin1 | Charset::Octet => Ok(payload.iter().map(|&b| b as char).collect()),
        Charset::Ucs2 => {
            if payload.len() % 2 != 0 {
                return Err(DataCodingError::MalformedPayload {
                    charset,
                    reason: "odd octet count".into(),
                });
            }
            let units: Vec<u16> = payload
                .chunks_exact(2)
                .map(|c| u16::from_be_bytes([c[0], c[1]]))
                .collect();
            String::from_utf16(&units).map_err(|e| DataCodingError::MalformedPayload {
                charset,
                reason: e.to_string(),
            })
        }
        Charset::Utf8 => String::from_utf8(payload.to_vec()).map_err(|e| {
            DataCodingError::MalformedPayload {
                charset,
                reason: e.to_string(),
            }
        }),
    }
}
