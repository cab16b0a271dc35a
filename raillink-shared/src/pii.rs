use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Wrapper for contact details (phone numbers, emails) that hides the value
/// in Debug/Display output so it cannot leak through log macros.
///
/// Serialization passes the real value through: request bodies sent to the
/// backend need it, only the log surfaces must not.
#[derive(Clone, Deserialize)]
pub struct Masked<T>(pub T);

impl<T: fmt::Display> fmt::Debug for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", redact(&self.0.to_string()))
    }
}

impl<T: fmt::Display> fmt::Display for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", redact(&self.0.to_string()))
    }
}

impl<T: Serialize> Serialize for Masked<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<T: PartialEq> PartialEq for Masked<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<T> Masked<T> {
    pub fn new(value: T) -> Self {
        Masked(value)
    }

    pub fn into_inner(self) -> T {
        self.0
    }

    pub fn inner(&self) -> &T {
        &self.0
    }
}

/// Keep the last two characters visible so support staff can still match a
/// redacted number against what a caller reads out.
fn redact(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 4 {
        return "****".to_string();
    }
    let visible: String = chars[chars.len() - 2..].iter().collect();
    format!("{}{}", "*".repeat(chars.len() - 2), visible)
}
