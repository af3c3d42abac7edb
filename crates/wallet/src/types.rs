//! Common identifier types shared by the wallet and the gateway.

/// Macro to define a newtype wrapper around `String` with standard trait
/// implementations.
///
/// Each generated type:
/// - Derives `Clone`, `Debug`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - Derives `Serialize` and `Deserialize` (transparent)
/// - Implements `From<String>` and `From<&str>`
/// - Implements `Display` and `AsRef<str>`
macro_rules! define_name {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord,
            serde::Serialize, serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Returns the name as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

define_name!(
    /// Membership service provider identifier of an organization.
    ///
    /// This is the identifier the ledger uses to attribute signatures and
    /// endorsements to an organization, e.g. `Org2MSP`.
    ///
    /// # Examples
    ///
    /// ```
    /// use claimledger_wallet::MspId;
    ///
    /// let msp = MspId::from("Org2MSP");
    /// assert_eq!(msp.to_string(), "Org2MSP");
    /// ```
    MspId
);

define_name!(
    /// Short organization name used to select a connection profile,
    /// e.g. `org2` for `connection-org2.json`.
    ///
    /// Distinct from [`MspId`] so that a profile key can never be passed
    /// where an MSP identifier is expected.
    ///
    /// # Examples
    ///
    /// ```
    /// use claimledger_wallet::OrgId;
    ///
    /// let org = OrgId::from("org2");
    /// assert_eq!(org.as_str(), "org2");
    /// ```
    OrgId
);
