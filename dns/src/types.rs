//! Resolving RR type mnemonics to their IANA numbers.

use std::collections::HashMap;
use std::convert::TryFrom;
use std::fmt;

use log::*;


/// The set of mnemonics from the IANA DNS parameters registry.
///
/// <https://www.iana.org/assignments/dns-parameters/dns-parameters.xhtml>
static IANA_TYPES: &[(&str, u16)] = &[
    ("A",              1),
    ("NS",             2),
    ("MD",             3),
    ("MF",             4),
    ("CNAME",          5),
    ("SOA",            6),
    ("MB",             7),
    ("MG",             8),
    ("MR",             9),
    ("NULL",          10),
    ("WKS",           11),
    ("PTR",           12),
    ("HINFO",         13),
    ("MINFO",         14),
    ("MX",            15),
    ("TXT",           16),
    ("RP",            17),
    ("AFSDB",         18),
    ("X25",           19),
    ("ISDN",          20),
    ("RT",            21),
    ("NSAP",          22),
    ("NSAP-PTR",      23),
    ("SIG",           24),
    ("KEY",           25),
    ("PX",            26),
    ("GPOS",          27),
    ("AAAA",          28),
    ("LOC",           29),
    ("NXT",           30),
    ("EID",           31),
    ("NIMLOC",        32),
    ("SRV",           33),
    ("ATMA",          34),
    ("NAPTR",         35),
    ("KX",            36),
    ("CERT",          37),
    ("A6",            38),
    ("DNAME",         39),
    ("SINK",          40),
    ("OPT",           41),
    ("APL",           42),
    ("DS",            43),
    ("SSHFP",         44),
    ("IPSECKEY",      45),
    ("RRSIG",         46),
    ("NSEC",          47),
    ("DNSKEY",        48),
    ("DHCID",         49),
    ("NSEC3",         50),
    ("NSEC3PARAM",    51),
    ("TLSA",          52),
    ("SMIMEA",        53),
    ("HIP",           55),
    ("NINFO",         56),
    ("RKEY",          57),
    ("TALINK",        58),
    ("CDS",           59),
    ("CDNSKEY",       60),
    ("OPENPGPKEY",    61),
    ("CSYNC",         62),
    ("SPF",           99),
    ("UINFO",        100),
    ("UID",          101),
    ("GID",          102),
    ("UNSPEC",       103),
    ("NID",          104),
    ("L32",          105),
    ("L64",          106),
    ("LP",           107),
    ("EUI48",        108),
    ("EUI64",        109),
    ("TKEY",         249),
    ("TSIG",         250),
    ("IXFR",         251),
    ("AXFR",         252),
    ("MAILB",        253),
    ("MAILA",        254),
    ("ANY",          255),
    ("URI",          256),
    ("CAA",          257),
    ("AVC",          258),
    ("DOA",          259),
    ("TA",         32768),
    ("DLV",        32769),
];


/// A **type table** maps RR type mnemonics to their type numbers.
///
/// Lookups are case-insensitive, and an input of the form `TYPE<n>` — as
/// used by dig and dnsperf for types with no mnemonic — resolves to the
/// number `<n>` itself. Query corpora tend to repeat a handful of spellings
/// over and over, so every successful lookup is memoised under the exact
/// spelling it arrived with.
#[derive(Debug, Clone)]
pub struct TypeTable {
    types: HashMap<String, u16>,
}

impl Default for TypeTable {
    fn default() -> Self {
        let types = IANA_TYPES.iter()
            .map(|&(name, number)| (name.into(), number))
            .collect();

        Self { types }
    }
}

impl TypeTable {

    /// Resolves the given mnemonic to its type number, memoising the
    /// result for next time.
    pub fn lookup(&mut self, input: &str) -> Result<u16, TypeError> {
        match self.resolve(input) {
            Ok(number) => {
                self.types.insert(input.into(), number);
                Ok(number)
            }
            Err(e) => {
                warn!("Failed to resolve type {:?}: {}", input, e);
                Err(e)
            }
        }
    }

    fn resolve(&self, input: &str) -> Result<u16, TypeError> {
        if let Some(number) = self.types.get(input) {
            return Ok(*number);
        }

        if let Some(digits) = input.strip_prefix("TYPE") {
            return Self::parse_type_number(digits);
        }

        // search again using the upper-cased version of the string
        let upper = input.to_uppercase();
        if upper != input {
            if let Some(number) = self.types.get(&*upper) {
                return Ok(*number);
            }

            if let Some(digits) = upper.strip_prefix("TYPE") {
                return Self::parse_type_number(digits);
            }
        }

        Err(TypeError::Unrecognised(input.into()))
    }

    fn parse_type_number(digits: &str) -> Result<u16, TypeError> {
        match digits.parse::<u64>() {
            Ok(number) => {
                match u16::try_from(number) {
                    Ok(number)  => Ok(number),
                    Err(_)      => Err(TypeError::OutOfRange),
                }
            }
            Err(_) => Err(TypeError::Unparseable),
        }
    }
}


/// Something that can go wrong turning a type mnemonic into a number.
#[derive(PartialEq, Eq, Debug, Clone)]
pub enum TypeError {

    /// A `TYPE<n>` input where `<n>` was empty, non-numeric, or had
    /// trailing garbage.
    Unparseable,

    /// A `TYPE<n>` input where `<n>` does not fit in sixteen bits.
    OutOfRange,

    /// An input that matches no mnemonic at all.
    Unrecognised(String),
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unparseable          => write!(f, "numeric QTYPE unparseable"),
            Self::OutOfRange           => write!(f, "numeric QTYPE out of range"),
            Self::Unrecognised(input)  => write!(f, "unrecognised QTYPE: {}", input),
        }
    }
}
