use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;

#[derive(
    Debug,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Hash,
    Clone,
    Copy,
    PartialOrd,
    Ord,
)]
#[serde(rename_all = "lowercase")]
pub(crate) enum RestorationKind {
    Implant,
    Crown,
    Filling,
    Bridge,
}

impl Display for RestorationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Implant => write!(f, "implant"),
            Self::Crown => write!(f, "crown"),
            Self::Filling => write!(f, "filling"),
            Self::Bridge => write!(f, "bridge"),
        }
    }
}

impl FromStr for RestorationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "implant" | "implants" => Ok(Self::Implant),
            "crown" | "crowns" => Ok(Self::Crown),
            "filling" | "fillings" => Ok(Self::Filling),
            "bridge" | "bridges" => Ok(Self::Bridge),
            _ => Err(format!("invalid restoration kind '{s}'")),
        }
    }
}

/// The meaning of a category id.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord)]
pub(crate) enum CategoryKind {
    /// A tooth position (1..=32).
    Tooth(u8),
    Restoration(RestorationKind),
}

impl CategoryKind {
    pub(crate) const TEETH: std::ops::RangeInclusive<u64> = 1..=32;

    /// Classifies a declared category. Ids inside [Self::TEETH] are
    /// tooth positions; every other id must name a restoration type.
    pub(crate) fn classify(
        id: u64,
        name: &str,
    ) -> Result<Self, SchemaError> {
        if Self::TEETH.contains(&id) {
            return Ok(Self::Tooth(id as u8));
        }

        RestorationKind::from_str(name)
            .map(Self::Restoration)
            .map_err(|_| SchemaError::UnknownCategory {
                id,
                name: name.into(),
            })
    }

    #[inline]
    pub(crate) fn is_tooth(&self) -> bool {
        matches!(self, Self::Tooth(_))
    }
}

impl Display for CategoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tooth(number) => write!(f, "tooth {number}"),
            Self::Restoration(kind) => write!(f, "{kind}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Category {
    pub(crate) id: u64,
    pub(crate) name: String,
    pub(crate) kind: CategoryKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restoration_kind_from_str() {
        use RestorationKind::*;

        assert_eq!(RestorationKind::from_str("implant").unwrap(), Implant);
        assert_eq!(RestorationKind::from_str("Crown").unwrap(), Crown);
        assert_eq!(RestorationKind::from_str("fillings").unwrap(), Filling);
        assert_eq!(RestorationKind::from_str("BRIDGE").unwrap(), Bridge);

        assert!(RestorationKind::from_str("caries").is_err());
    }

    #[test]
    fn restoration_kind_to_string() {
        use RestorationKind::*;

        assert_eq!(Implant.to_string(), "implant");
        assert_eq!(Crown.to_string(), "crown");
        assert_eq!(Filling.to_string(), "filling");
        assert_eq!(Bridge.to_string(), "bridge");
    }

    #[test]
    fn category_kind_classify() {
        assert_eq!(
            CategoryKind::classify(8, "8").unwrap(),
            CategoryKind::Tooth(8)
        );
        assert_eq!(
            CategoryKind::classify(1, "anything").unwrap(),
            CategoryKind::Tooth(1)
        );
        assert_eq!(
            CategoryKind::classify(32, "32").unwrap(),
            CategoryKind::Tooth(32)
        );
        assert_eq!(
            CategoryKind::classify(33, "Implant").unwrap(),
            CategoryKind::Restoration(RestorationKind::Implant)
        );

        assert_eq!(
            CategoryKind::classify(0, "0"),
            Err(SchemaError::UnknownCategory {
                id: 0,
                name: "0".into()
            })
        );
        assert!(CategoryKind::classify(40, "caries").is_err());
    }
}
