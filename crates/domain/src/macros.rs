//! Macro for string conversions of fieldless domain enums
//!
//! Generates `as_str`, `Display` and a case-insensitive `FromStr` from one
//! variant-to-string table, so the textual form used in logs, config files
//! and error messages cannot drift between directions.
//!
//! # Example
//!
//! ```rust
//! use cipherstore_domain::impl_domain_str_conversions;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum JournalMode {
//!     Wal,
//!     Delete,
//! }
//!
//! impl_domain_str_conversions!(JournalMode {
//!     Wal => "wal",
//!     Delete => "delete",
//! });
//!
//! assert_eq!(JournalMode::Wal.as_str(), "wal");
//! assert_eq!("DELETE".parse::<JournalMode>(), Ok(JournalMode::Delete));
//! ```

/// Implements `as_str`, `Display` and `FromStr` for a fieldless enum
///
/// String forms must be lowercase; parsing lowercases its input first.
#[macro_export]
macro_rules! impl_domain_str_conversions {
    ($enum_name:ident { $($variant:ident => $str:expr),+ $(,)? }) => {
        impl $enum_name {
            /// Canonical lowercase string form
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $str,)+
                }
            }
        }

        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $enum_name {
            type Err = String;

            fn from_str(s: &str) -> ::std::result::Result<Self, Self::Err> {
                match s.trim().to_lowercase().as_str() {
                    $($str => Ok(Self::$variant),)+
                    _ => Err(format!("Invalid {}: {}", stringify!($enum_name), s)),
                }
            }
        }
    };
}
