// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, de::Unexpected};
use std::fmt;

/// How many times the selected suites are run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Iterations {
    /// A fixed, positive number of iterations.
    Finite(usize),
    /// Repeat until a test fails or an abort is requested.
    Infinite,
}

impl Iterations {
    /// The total number of iterations, or `None` if infinite.
    pub fn total(self) -> Option<usize> {
        match self {
            Iterations::Finite(n) => Some(n),
            Iterations::Infinite => None,
        }
    }
}

impl Default for Iterations {
    fn default() -> Self {
        Iterations::Finite(1)
    }
}

impl fmt::Display for Iterations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Finite(n) => write!(f, "{n}"),
            Self::Infinite => write!(f, "infinite"),
        }
    }
}

impl<'de> Deserialize<'de> for Iterations {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct IterationsVisitor;

        impl serde::de::Visitor<'_> for IterationsVisitor {
            type Value = Iterations;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a positive integer or \"infinite\"")
            }

            // TOML uses i64, not u64
            fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if value <= 0 {
                    return Err(serde::de::Error::invalid_value(
                        Unexpected::Signed(value),
                        &self,
                    ));
                }
                Ok(Iterations::Finite(value as usize))
            }

            fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if value == 0 {
                    return Err(serde::de::Error::invalid_value(
                        Unexpected::Unsigned(value),
                        &self,
                    ));
                }
                Ok(Iterations::Finite(value as usize))
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                match value {
                    "infinite" => Ok(Iterations::Infinite),
                    _ => Err(serde::de::Error::invalid_value(
                        Unexpected::Str(value),
                        &self,
                    )),
                }
            }
        }

        deserializer.deserialize_any(IterationsVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::de::{IntoDeserializer, value::Error as ValueError};
    use test_case::test_case;

    #[test_case(3i64.into_deserializer(), Some(Iterations::Finite(3)); "positive")]
    #[test_case(0i64.into_deserializer(), None; "zero")]
    #[test_case((-1i64).into_deserializer(), None; "negative")]
    fn from_integer(
        deserializer: serde::de::value::I64Deserializer<ValueError>,
        expected: Option<Iterations>,
    ) {
        assert_eq!(Iterations::deserialize(deserializer).ok(), expected);
    }

    #[test_case("infinite", Some(Iterations::Infinite); "infinite")]
    #[test_case("forever", None; "unknown")]
    fn from_str(input: &str, expected: Option<Iterations>) {
        let deserializer: serde::de::value::StrDeserializer<'_, ValueError> =
            input.into_deserializer();
        assert_eq!(Iterations::deserialize(deserializer).ok(), expected);
    }

    #[test]
    fn total() {
        assert_eq!(Iterations::default().total(), Some(1));
        assert_eq!(Iterations::Infinite.total(), None);
        assert_eq!(Iterations::Infinite.to_string(), "infinite");
    }
}
