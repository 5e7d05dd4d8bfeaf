use lazy_regex::regex_is_match;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid item name: `{0}`")]
pub struct InvalidItemName(pub String);

/// Name of a band, data set, parameter or dynamic attribute code.
///
/// Starts with a letter or underscore, followed by letters, digits or underscores.
/// At most 64 characters. Dots are not allowed as they separate the band name from
/// the field name in qualified parameter keys.
#[derive(Clone, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
#[repr(transparent)]
pub struct ItemName(String);

impl ItemName {
    pub fn new(name: String) -> Result<Self, InvalidItemName> {
        if regex_is_match!(r"^[a-zA-Z_][a-zA-Z0-9_]{0,63}$", &name) {
            Ok(Self(name))
        } else {
            Err(InvalidItemName(name))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ItemName {
    type Error = InvalidItemName;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        ItemName::new(s)
    }
}

impl TryFrom<&str> for ItemName {
    type Error = InvalidItemName;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        ItemName::new(s.to_owned())
    }
}

impl From<ItemName> for String {
    fn from(name: ItemName) -> String {
        name.0
    }
}

impl AsRef<str> for ItemName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ItemName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::fmt::Debug for ItemName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for ItemName {
    type Err = InvalidItemName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ItemName::new(s.to_string())
    }
}

impl std::borrow::Borrow<str> for ItemName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl std::ops::Deref for ItemName {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T: AsRef<str>> std::cmp::PartialEq<T> for ItemName {
    fn eq(&self, other: &T) -> bool {
        self.0 == other.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_identifiers() {
        for name in ["Root", "a", "_x", "Orders_master_data", "col2"] {
            assert!(ItemName::new(name.to_owned()).is_ok(), "{name}");
        }
    }

    #[test]
    fn rejects_non_identifiers() {
        let long = "x".repeat(65);
        for name in ["", "1abc", "a.b", "with space", "+code", long.as_str()] {
            assert_eq!(
                ItemName::new(name.to_owned()),
                Err(InvalidItemName(name.to_owned()))
            );
        }
    }

    #[test]
    fn deserializes_with_validation() {
        let ok: ItemName = serde_yml::from_str("Orders").unwrap();
        assert_eq!(ok, "Orders");

        let err = serde_yml::from_str::<ItemName>("\"a.b\"");
        assert!(err.is_err());
    }
}
