//! Opaque numeric identifiers, serialized as decimal strings on the wire.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

macro_rules! id_newtype {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub i64);

        impl $name {
            /// The wrapped raw numeric value.
            pub fn value(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                serializer.serialize_str(&self.0.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                struct IdVisitor;

                impl<'de> Visitor<'de> for IdVisitor {
                    type Value = $name;

                    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                        f.write_str("a decimal string or integer id")
                    }

                    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
                    where
                        E: de::Error,
                    {
                        v.parse::<i64>()
                            .map($name)
                            .map_err(|_| de::Error::custom(format!("invalid id: {v}")))
                    }

                    fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
                    where
                        E: de::Error,
                    {
                        Ok($name(v))
                    }

                    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
                    where
                        E: de::Error,
                    {
                        Ok($name(v as i64))
                    }
                }

                deserializer.deserialize_any(IdVisitor)
            }
        }
    };
}

id_newtype!(PortfolioId, "Identifies a Portfolio.");
id_newtype!(InstrumentId, "Identifies an Instrument.");
id_newtype!(PendingTradeId, "Identifies a Pending Trade.");
id_newtype!(DealBlockId, "Identifies a Deal Block.");
id_newtype!(DealAllocationId, "Identifies a Deal Allocation.");
id_newtype!(JournalEntryId, "Identifies a Journal Entry.");
id_newtype!(NavRunId, "Identifies an IBOR or ABOR NAV Run.");
id_newtype!(CaEventId, "Identifies a corporate-action event.");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_roundtrips_through_json_string() {
        let id = PortfolioId(42);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"42\"");
        let back: PortfolioId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_id_accepts_numeric_json() {
        let back: PortfolioId = serde_json::from_str("42").unwrap();
        assert_eq!(back, PortfolioId(42));
    }

    #[test]
    fn test_id_rejects_non_numeric_string() {
        let result: Result<PortfolioId, _> = serde_json::from_str("\"abc\"");
        assert!(result.is_err());
    }
}
