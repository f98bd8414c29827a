//! Flow account addresses and chain identifiers.
//!
//! Addresses are 8-byte codewords of a [64, 45] linear code. Each chain XORs a
//! customizer into the codeword so that an address generated on one chain is
//! rejected on the others.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::AddressError;

/// Length of an account address in bytes.
pub const ADDRESS_LENGTH: usize = 8;

/// Keyword accepted in configuration files for the chain's service address.
pub const SERVICE_ADDRESS_KEYWORD: &str = "service";

/// Number of bits in an address codeword.
const LINEAR_CODE_N: usize = 64;

/// Columns of the parity-check matrix of the address code.
const PARITY_CHECK_MATRIX_COLUMNS: [u32; LINEAR_CODE_N] = [
    0x00001, 0x00002, 0x00004, 0x00008, 0x00010, 0x00020, 0x00040, 0x00080, 0x00100, 0x00200,
    0x00400, 0x00800, 0x01000, 0x02000, 0x04000, 0x08000, 0x10000, 0x20000, 0x40000, 0x7328d,
    0x6689a, 0x6112f, 0x6084b, 0x433fd, 0x42aab, 0x41951, 0x233ce, 0x22a81, 0x21948, 0x1ef60,
    0x1deca, 0x1c639, 0x1bdd8, 0x1a535, 0x194ac, 0x18c46, 0x1632b, 0x1529b, 0x14a43, 0x13184,
    0x12942, 0x118c1, 0x0f812, 0x0e027, 0x0d00e, 0x0c83c, 0x0b01d, 0x0a831, 0x0982b, 0x07034,
    0x0682a, 0x05819, 0x03807, 0x007d2, 0x00727, 0x0068e, 0x0067c, 0x0059d, 0x004eb, 0x003b4,
    0x0036a, 0x002d9, 0x001c7, 0x0003f,
];

/// Codeword of the first generated address (index 1) before chain customization.
const FIRST_CODEWORD: u64 = 0xe467_b9dd_11fa_00df;

/// A Flow network a configuration record can be bound to.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    Serialize,
    Deserialize,
)]
pub enum ChainId {
    #[default]
    #[strum(serialize = "flow-emulator")]
    #[serde(rename = "flow-emulator")]
    Emulator,
    #[strum(serialize = "flow-testnet")]
    #[serde(rename = "flow-testnet")]
    Testnet,
    #[strum(serialize = "flow-mainnet")]
    #[serde(rename = "flow-mainnet")]
    Mainnet,
}

impl ChainId {
    /// Every known chain, in inference priority order.
    pub const ALL: [ChainId; 3] = [ChainId::Emulator, ChainId::Testnet, ChainId::Mainnet];

    /// Value XORed into every codeword generated on this chain.
    const fn customizer(self) -> u64 {
        match self {
            ChainId::Mainnet => 0,
            ChainId::Testnet => 0x6834_ba37_b398_0209,
            ChainId::Emulator => 0x1cb1_5985_7af0_2018,
        }
    }

    /// The service account address of this chain.
    pub const fn service_address(self) -> Address {
        Address::from_u64(FIRST_CODEWORD ^ self.customizer())
    }

    /// Infer the chain from a conventional network name.
    pub fn from_network_name(name: &str) -> Option<Self> {
        match name {
            "emulator" => Some(ChainId::Emulator),
            "testnet" => Some(ChainId::Testnet),
            "mainnet" => Some(ChainId::Mainnet),
            _ => None,
        }
    }
}

/// An 8-byte Flow account address.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; ADDRESS_LENGTH]);

impl Address {
    /// The empty address.
    pub const ZERO: Address = Address([0; ADDRESS_LENGTH]);

    pub const fn from_bytes(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self(bytes)
    }

    pub const fn from_u64(value: u64) -> Self {
        Self(value.to_be_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.0
    }

    fn to_u64(self) -> u64 {
        u64::from_be_bytes(self.0)
    }

    /// The service address of `chain`.
    pub const fn service(chain: ChainId) -> Self {
        chain.service_address()
    }

    /// Parse a hex address with or without `0x`, left-padding short values.
    pub fn from_hex(value: &str) -> Result<Self, AddressError> {
        let trimmed = value.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(AddressError::InvalidHex(value.to_string()));
        }
        if digits.len() > ADDRESS_LENGTH * 2 {
            return Err(AddressError::TooLong {
                value: value.to_string(),
                max: ADDRESS_LENGTH,
            });
        }

        let padded = format!("{:0>width$}", digits, width = ADDRESS_LENGTH * 2);
        let mut bytes = [0u8; ADDRESS_LENGTH];
        hex::decode_to_slice(&padded, &mut bytes)
            .map_err(|_| AddressError::InvalidHex(value.to_string()))?;
        Ok(Self(bytes))
    }

    /// Parse a configuration address, resolving the `service` keyword against `chain`.
    pub fn from_config(value: &str, chain: Option<ChainId>) -> Result<Self, AddressError> {
        if value.trim() == SERVICE_ADDRESS_KEYWORD {
            return chain
                .map(Address::service)
                .ok_or(AddressError::MissingChain);
        }
        Self::from_hex(value)
    }

    /// Lowercase hex without prefix.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Lowercase hex with the `0x` prefix.
    pub fn to_hex_with_prefix(&self) -> String {
        format!("0x{}", self.to_hex())
    }

    /// Whether this address was generated on `chain`.
    pub fn is_valid_on(&self, chain: ChainId) -> bool {
        let codeword = self.to_u64() ^ chain.customizer();
        codeword != 0 && is_valid_codeword(codeword)
    }

    /// The first chain this address is valid on.
    pub fn infer_chain(&self) -> Option<ChainId> {
        ChainId::ALL.into_iter().find(|chain| self.is_valid_on(*chain))
    }
}

/// Multiply the codeword by the parity-check matrix over GF(2).
fn is_valid_codeword(mut codeword: u64) -> bool {
    let mut parity = 0u32;
    for column in PARITY_CHECK_MATRIX_COLUMNS {
        if codeword & 1 == 1 {
            parity ^= column;
        }
        codeword >>= 1;
    }
    parity == 0
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex_with_prefix())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex_with_prefix())
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex_with_prefix())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Address::from_hex(&value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_addresses() {
        assert_eq!(
            Address::service(ChainId::Emulator).to_hex(),
            "f8d6e0586b0a20c7"
        );
        assert_eq!(
            Address::service(ChainId::Testnet).to_hex(),
            "8c5303eaa26202d6"
        );
        assert_eq!(
            Address::service(ChainId::Mainnet).to_hex(),
            "e467b9dd11fa00df"
        );
    }

    #[test]
    fn test_is_valid_on_known_addresses() {
        let emulator = ["f8d6e0586b0a20c7", "01cf0e2f2f715450", "179b6b1cb6755e31"];
        for hex in emulator {
            let address = Address::from_hex(hex).unwrap();
            assert!(address.is_valid_on(ChainId::Emulator), "{hex}");
            assert!(!address.is_valid_on(ChainId::Mainnet), "{hex}");
        }

        let testnet = Address::from_hex("0x9a0766d93b6608b7").unwrap();
        assert!(testnet.is_valid_on(ChainId::Testnet));

        let mainnet = Address::from_hex("0xf233dcee88fe0abe").unwrap();
        assert!(mainnet.is_valid_on(ChainId::Mainnet));
        assert_eq!(mainnet.infer_chain(), Some(ChainId::Mainnet));
    }

    #[test]
    fn test_invalid_addresses() {
        assert!(!Address::ZERO.is_valid_on(ChainId::Mainnet));
        assert!(!Address::from_u64(0x1234).is_valid_on(ChainId::Emulator));
        assert_eq!(Address::from_u64(0x1234).infer_chain(), None);
    }

    #[test]
    fn test_parse_hex_forms() {
        let with_prefix = Address::from_hex("0xf8d6e0586b0a20c7").unwrap();
        let without_prefix = Address::from_hex("f8d6e0586b0a20c7").unwrap();
        assert_eq!(with_prefix, without_prefix);
        assert_eq!(Address::from_hex("0x01").unwrap(), Address::from_u64(1));

        assert!(Address::from_hex("0xzz").is_err());
        assert!(Address::from_hex("").is_err());
        assert!(matches!(
            Address::from_hex("0x0102030405060708090a"),
            Err(AddressError::TooLong { .. })
        ));
    }

    #[test]
    fn test_service_keyword() {
        assert_eq!(
            Address::from_config("service", Some(ChainId::Testnet)).unwrap(),
            Address::service(ChainId::Testnet)
        );
        assert_eq!(
            Address::from_config("service", None),
            Err(AddressError::MissingChain)
        );
    }

    #[test]
    fn test_chain_id_strings() {
        assert_eq!(ChainId::Emulator.to_string(), "flow-emulator");
        assert_eq!("flow-testnet".parse::<ChainId>().unwrap(), ChainId::Testnet);
        assert!("flow-unknown".parse::<ChainId>().is_err());
    }
}
