//! Device hardware address, parsed with nom
//!
//! Accepted text forms:
//! ```text
//! aa:bb:cc:dd:ee:ff
//! AA-BB-CC-DD-EE-FF
//! ```
//! The separator must be the same throughout. Display is always lower-case
//! and colon separated.

use std::fmt;
use std::str::FromStr;

use nom::{
    bytes::complete::take_while_m_n,
    character::complete::{char, one_of},
    combinator::{all_consuming, map_res},
    multi::count,
    sequence::preceded,
    IResult,
};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// 6-byte device hardware address
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MacAddr([u8; 6]);

impl MacAddr {
    /// Wrap raw octets
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// Raw octets
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Parse the text form
    pub fn parse(text: &str) -> Result<Self> {
        let (_, octets) =
            all_consuming(mac_addr)(text.trim()).map_err(|_| Error::InvalidMac(text.to_string()))?;
        Ok(Self(octets))
    }
}

fn hex_octet(input: &str) -> IResult<&str, u8> {
    map_res(take_while_m_n(2, 2, |c: char| c.is_ascii_hexdigit()), |s| {
        u8::from_str_radix(s, 16)
    })(input)
}

fn mac_addr(input: &str) -> IResult<&str, [u8; 6]> {
    let (input, first) = hex_octet(input)?;
    let (input, sep) = one_of(":-")(input)?;
    let (input, second) = hex_octet(input)?;
    let (input, tail) = count(preceded(char(sep), hex_octet), 4)(input)?;

    Ok((input, [first, second, tail[0], tail[1], tail[2], tail[3]]))
}

impl FromStr for MacAddr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<[u8; 6]> for MacAddr {
    fn from(octets: [u8; 6]) -> Self {
        Self(octets)
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

impl Serialize for MacAddr {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MacAddr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        MacAddr::parse(&text).map_err(de::Error::custom)
    }
}
