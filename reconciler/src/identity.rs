//! Durable resource keys.
//!
//! Resources that the API addresses by a single slug or ID use that value directly.
//! Resources addressed by a path of several values (organization + member, organization +
//! project + key, ...) are persisted as a composite key: the parts joined with [`SEPARATOR`].
//!
//! There is no escaping. Parts are slugs and numeric IDs, which never contain the separator,
//! and [`encode`] refuses to write a key that would not decode back to the same parts.

pub const SEPARATOR: char = '/';

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum IdentityError {
    #[error("invalid identity part {part:?}: {reason}")]
    InvalidPart { part: String, reason: &'static str },

    #[error("unexpected format of ID ({id}), expected {expected}; could not recover {}", .missing.join(", "))]
    Malformed {
        id: String,
        expected: String,
        missing: Vec<&'static str>,
    },

    #[error("composite identities have 2 or 3 parts, got {0}")]
    UnsupportedArity(usize),
}

/// Joins 2 or 3 parts into a composite key.
pub fn encode<S: AsRef<str>>(parts: &[S]) -> Result<String, IdentityError> {
    if !(2..=3).contains(&parts.len()) {
        return Err(IdentityError::UnsupportedArity(parts.len()));
    }

    let mut key = String::new();
    for (i, part) in parts.iter().enumerate() {
        let part = part.as_ref();
        validate_part(part)?;
        if i > 0 {
            key.push(SEPARATOR);
        }
        key.push_str(part);
    }
    Ok(key)
}

/// Splits a composite key into exactly `labels.len()` parts.
///
/// `labels` name each part for the error message, e.g. `["organization-slug", "membership-id"]`.
/// A key with too few parts reports the trailing labels it could not recover; a key with too
/// many parts (or an empty part) reports every label, since no part can be trusted.
pub fn decode(key: &str, labels: &[&'static str]) -> Result<Vec<String>, IdentityError> {
    let parts: Vec<&str> = key.split(SEPARATOR).collect();

    if parts.len() == labels.len() && parts.iter().all(|p| !p.is_empty()) {
        return Ok(parts.into_iter().map(String::from).collect());
    }

    let missing = if parts.len() < labels.len() && parts.iter().all(|p| !p.is_empty()) {
        labels[parts.len()..].to_vec()
    } else {
        labels.to_vec()
    };

    Err(IdentityError::Malformed {
        id: key.to_string(),
        expected: labels.join(&SEPARATOR.to_string()),
        missing,
    })
}

/// Validated identity of one resource instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    parts: Vec<String>,
}

impl Identity {
    /// Builds an identity from parts returned by the API.
    pub fn from_parts<I, S>(parts: I) -> Result<Self, IdentityError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let parts: Vec<String> = parts.into_iter().map(Into::into).collect();
        match parts.len() {
            0 => Err(IdentityError::UnsupportedArity(0)),
            1 => {
                validate_part(&parts[0])?;
                Ok(Identity { parts })
            }
            _ => {
                // Round-trip through the codec so the same rules apply as on write.
                encode(&parts)?;
                Ok(Identity { parts })
            }
        }
    }

    /// Parses a persisted or user-supplied key.
    pub fn parse(key: &str, labels: &[&'static str]) -> Result<Self, IdentityError> {
        Ok(Identity {
            parts: decode(key, labels)?,
        })
    }

    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    pub fn part(&self, index: usize) -> &str {
        self.parts.get(index).map(String::as_str).unwrap_or_default()
    }

    /// The durable serialized form.
    pub fn key(&self) -> String {
        self.parts.join(&SEPARATOR.to_string())
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key())
    }
}

fn validate_part(part: &str) -> Result<(), IdentityError> {
    if part.is_empty() {
        return Err(IdentityError::InvalidPart {
            part: part.to_string(),
            reason: "must not be empty",
        });
    }
    if part.contains(SEPARATOR) {
        return Err(IdentityError::InvalidPart {
            part: part.to_string(),
            reason: "must not contain '/'",
        });
    }
    Ok(())
}
