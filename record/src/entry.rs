/// Name Records
///
/// A name record binds a peer identity to a content path. Every record is
/// signed by the identity's private key, carries a per-identity sequence
/// number and an absolute end-of-life (EOL) timestamp.
///
/// ## Wire Format
///
/// Records travel as a protobuf message (`IpnsEntry`):
///
/// | Tag | Field         | Type    | Content                                   |
/// |-----|---------------|---------|-------------------------------------------|
/// | 1   | value         | bytes   | UTF-8 content path                        |
/// | 2   | signature     | bytes   | signature over the signing payload        |
/// | 3   | validity_type | enum    | `EOL` (0)                                 |
/// | 4   | validity      | bytes   | RFC 3339 UTC timestamp, nanosecond digits |
/// | 5   | sequence      | uint64  | per-identity monotonic counter            |
///
/// ## Signing Payload
///
/// ```text
/// value || validity || "EOL" || uint64_be(sequence)
/// ```
///
/// The validity bytes are signed exactly as they appear on the wire, so a
/// record produced elsewhere with a different timestamp rendering still
/// verifies.
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use libp2p_identity::{Keypair, PublicKey};
use prost::Message;

use crate::{error::RecordError, path::Path};

/// Protobuf wire form of a name record.
#[derive(Clone, PartialEq, Message)]
pub struct IpnsEntry {
    #[prost(bytes = "vec", tag = "1")]
    pub value: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub signature: Vec<u8>,
    #[prost(enumeration = "ValidityType", tag = "3")]
    pub validity_type: i32,
    #[prost(bytes = "vec", tag = "4")]
    pub validity: Vec<u8>,
    #[prost(uint64, tag = "5")]
    pub sequence: u64,
}

/// How the validity field is interpreted. Only end-of-life is defined.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum ValidityType {
    Eol = 0,
}

impl fmt::Display for ValidityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidityType::Eol => f.write_str("EOL"),
        }
    }
}

/// Last second of year 9999, the latest EOL RFC 3339 can carry.
pub const LATEST_EOL_TIMESTAMP: i64 = 253_402_300_799;

/// Latest end of life a record can be created with.
pub fn latest_eol() -> DateTime<Utc> {
    DateTime::from_timestamp(LATEST_EOL_TIMESTAMP, 0).expect("year 9999 is representable")
}

/// Render a timestamp the way it is carried in the validity field.
pub fn format_validity(eol: &DateTime<Utc>) -> String {
    eol.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub fn parse_validity(raw: &[u8]) -> Result<DateTime<Utc>, RecordError> {
    let text = std::str::from_utf8(raw)
        .map_err(|_| RecordError::InvalidValidity(String::from_utf8_lossy(raw).into_owned()))?;

    DateTime::parse_from_rfc3339(text)
        .map(|eol| eol.with_timezone(&Utc))
        .map_err(|_| RecordError::InvalidValidity(text.to_string()))
}

/// A decoded, well-formed name record.
///
/// Decoding checks structure only (path syntax, timestamp, validity type);
/// authenticity is checked separately with [`NameRecord::verify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameRecord {
    value: Path,
    signature: Vec<u8>,
    sequence: u64,
    validity: DateTime<Utc>,
    validity_type: ValidityType,
    raw_validity: Vec<u8>,
}

impl NameRecord {
    /// Build and sign a new record.
    ///
    /// Fails with `InvalidValidity` when `eol` is past [`latest_eol`], since
    /// such a timestamp could not be decoded again.
    pub fn create(
        key: &Keypair,
        value: Path,
        sequence: u64,
        eol: DateTime<Utc>,
    ) -> Result<Self, RecordError> {
        if eol > latest_eol() {
            return Err(RecordError::InvalidValidity(format_validity(&eol)));
        }
        let raw_validity = format_validity(&eol).into_bytes();
        let payload = signing_payload(&value, &raw_validity, ValidityType::Eol, sequence);
        let signature = key.sign(&payload)?;

        Ok(Self {
            value,
            signature,
            sequence,
            validity: eol,
            validity_type: ValidityType::Eol,
            raw_validity,
        })
    }

    pub fn from_entry(entry: IpnsEntry) -> Result<Self, RecordError> {
        let validity_type = ValidityType::try_from(entry.validity_type)
            .map_err(|_| RecordError::UnknownValidityType(entry.validity_type))?;

        let value = String::from_utf8(entry.value).map_err(|err| RecordError::InvalidPath {
            path: String::from_utf8_lossy(err.as_bytes()).into_owned(),
            reason: "value is not UTF-8",
        })?;
        let value = Path::parse(&value)?;
        let validity = parse_validity(&entry.validity)?;

        Ok(Self {
            value,
            signature: entry.signature,
            sequence: entry.sequence,
            validity,
            validity_type,
            raw_validity: entry.validity,
        })
    }

    pub fn to_entry(&self) -> IpnsEntry {
        IpnsEntry {
            value: self.value.as_str().as_bytes().to_vec(),
            signature: self.signature.clone(),
            validity_type: self.validity_type as i32,
            validity: self.raw_validity.clone(),
            sequence: self.sequence,
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RecordError> {
        Self::from_entry(IpnsEntry::decode(bytes)?)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_entry().encode_to_vec()
    }

    /// Check the signature against the name's public key.
    pub fn verify(&self, public_key: &PublicKey) -> bool {
        let payload = signing_payload(
            &self.value,
            &self.raw_validity,
            self.validity_type,
            self.sequence,
        );
        public_key.verify(&payload, &self.signature)
    }

    /// Copy of this record with a new EOL and signature, same sequence.
    pub fn refreshed(&self, key: &Keypair, eol: DateTime<Utc>) -> Result<Self, RecordError> {
        Self::create(key, self.value.clone(), self.sequence, eol)
    }

    /// Whether this record should win over `other` for the same name: a
    /// higher sequence, or the same sequence with a later end of life.
    pub fn supersedes(&self, other: &NameRecord) -> bool {
        (self.sequence, self.validity) > (other.sequence, other.validity)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.validity < now
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn value(&self) -> &Path {
        &self.value
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn validity(&self) -> DateTime<Utc> {
        self.validity
    }

    pub fn validity_type(&self) -> ValidityType {
        self.validity_type
    }
}

fn signing_payload(
    value: &Path,
    raw_validity: &[u8],
    validity_type: ValidityType,
    sequence: u64,
) -> Vec<u8> {
    let value = value.as_str().as_bytes();
    let kind = validity_type.to_string();

    let mut payload = Vec::with_capacity(value.len() + raw_validity.len() + kind.len() + 8);
    payload.extend_from_slice(value);
    payload.extend_from_slice(raw_validity);
    payload.extend_from_slice(kind.as_bytes());
    payload.extend_from_slice(&sequence.to_be_bytes());
    payload
}
