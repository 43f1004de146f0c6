//! Command-line option parsing.

use std::ffi::OsStr;
use std::fmt;
use std::net::Ipv4Addr;
use std::path::PathBuf;

use dns::Opt;

use crate::logger;


/// The port DNS servers under test conventionally listen on.
const DEFAULT_PORT: u16 = 8053;

/// The smallest EDNS buffer size worth advertising.
const MIN_EDNS_BUFSIZE: u16 = 512;


/// The command-line options used when running dogpile.
#[derive(PartialEq, Debug)]
pub struct Options {

    /// The network interface to send from and listen on.
    pub interface: String,

    /// The local IPv4 address to mark queries as coming from.
    pub source: Ipv4Addr,

    /// The IPv4 address of the server under test.
    pub server: Ipv4Addr,

    /// The hardware address of the server (or the next hop towards it);
    /// supplying it directly is what lets the generator skip ARP.
    pub server_mac: [u8; 6],

    /// Where the query corpus comes from.
    pub corpus: CorpusFile,

    /// The UDP port the server is listening on.
    pub port: u16,

    /// How many sender/receiver pairs to run, one per CPU.
    pub threads: usize,

    /// How many seconds to keep sending for.
    pub runtime: u32,

    /// How many packets go into each sendmmsg call.
    pub batch_size: usize,

    /// The starting target rate, in packets per second.
    pub rate: u32,

    /// How much the rate adapter adds each tick.
    pub increment: u32,

    /// Whether to ramp the rate unconditionally instead of seeking the
    /// server's sustainable rate.
    pub ramp: bool,

    /// The OPT record to upgrade every query with, if EDNS was asked for.
    pub edns: Option<Opt>,
}

impl Options {

    /// Parses and interprets a set of options from the user’s command-line
    /// arguments.
    #[allow(unused_results)]
    pub fn getopts<C>(args: C) -> OptionsResult
    where C: IntoIterator,
          C::Item: AsRef<OsStr>,
    {
        let mut opts = getopts::Options::new();

        // Network options
        opts.optopt ("i", "interface",  "Network interface to use", "IFACE");
        opts.optopt ("a", "addr",       "Local address to send queries from", "ADDR");
        opts.optopt ("s", "server",     "Address of the server to query", "ADDR");
        opts.optopt ("m", "mac",        "Hardware address of the server to query", "MAC");
        opts.optopt ("p", "port",       "Port the server is listening on", "PORT");

        // Corpus options
        opts.optopt ("d", "data",       "Text query file to compile and send", "FILE");
        opts.optopt ("D", "raw",        "Raw query file to send", "FILE");
        opts.optopt ("U", "udp-size",   "EDNS UDP buffer size to advertise (enables EDNS)", "BYTES");
        opts.optflag("X", "dnssec",     "Set the DNSSEC OK bit (enables EDNS)");

        // Load options
        opts.optopt ("T", "threads",    "Number of sender/receiver pairs to run", "COUNT");
        opts.optopt ("l", "limit",      "Number of seconds to run for", "SECONDS");
        opts.optopt ("b", "batch",      "Number of packets per sendmmsg batch", "COUNT");
        opts.optopt ("r", "rate",       "Initial packet rate per second", "RATE");
        opts.optopt ("R", "increment",  "Packet rate increment per tick", "RATE");
        opts.optflag("M", "ramp",       "Raise the rate every tick instead of adapting");

        // Meta options
        opts.optflag     ("V", "version",  "Print version information");
        opts.optflagmulti("v", "",         "Increase verbosity by adding multiple (-vv)");
        opts.optflag     ("?", "help",     "Print list of command-line options");

        let matches = match opts.parse(args) {
            Ok(m)  => m,
            Err(e) => return OptionsResult::InvalidOptionsFormat(e),
        };

        match matches.opt_count("v") {
            0 => logger::configure(None),
            1 => logger::configure(Some("debug")),
            _ => logger::configure(Some("trace")),
        }

        if matches.opt_present("version") {
            OptionsResult::Version
        }
        else if matches.opt_present("help") {
            OptionsResult::Help(HelpReason::Flag)
        }
        else if matches.free.is_empty() && Self::nothing_specified(&matches) {
            OptionsResult::Help(HelpReason::NoArguments)
        }
        else {
            match Self::deduce(&matches) {
                Ok(opts) => OptionsResult::Ok(opts),
                Err(e)   => OptionsResult::InvalidOptions(e),
            }
        }
    }

    fn nothing_specified(matches: &getopts::Matches) -> bool {
        [ "interface", "addr", "server", "mac", "data", "raw" ].iter()
            .all(|flag| !matches.opt_present(flag))
    }

    fn deduce(matches: &getopts::Matches) -> Result<Self, OptionsError> {
        if let Some(arg) = matches.free.first() {
            return Err(OptionsError::UnwantedArgument(arg.clone()));
        }

        let interface = matches.opt_str("interface")
            .ok_or(OptionsError::MissingInterface)?;

        let source = parse_address(matches, "addr")?
            .ok_or(OptionsError::MissingSourceAddress)?;

        let server = parse_address(matches, "server")?
            .ok_or(OptionsError::MissingServerAddress)?;

        let mac_input = matches.opt_str("mac")
            .ok_or(OptionsError::MissingServerMac)?;
        let server_mac = parse_mac(&mac_input)
            .ok_or(OptionsError::InvalidMac(mac_input))?;

        let corpus = CorpusFile::deduce(matches)?;

        let port = parse_number(matches, "port")?.unwrap_or(DEFAULT_PORT);
        let threads = positive(parse_number(matches, "threads")?, "threads")?
            .unwrap_or_else(default_thread_count);
        let runtime = positive(parse_number(matches, "limit")?, "limit")?.unwrap_or(30);
        let batch_size = positive(parse_number(matches, "batch")?, "batch")?.unwrap_or(32);
        let rate = positive(parse_number(matches, "rate")?, "rate")?.unwrap_or(10_000);
        let increment = positive(parse_number(matches, "increment")?, "increment")?.unwrap_or(10_000);
        let ramp = matches.opt_present("ramp");

        let edns = Self::deduce_edns(matches)?;

        Ok(Self {
            interface, source, server, server_mac, corpus,
            port, threads, runtime, batch_size, rate, increment, ramp, edns,
        })
    }

    fn deduce_edns(matches: &getopts::Matches) -> Result<Option<Opt>, OptionsError> {
        let bufsize: Option<u16> = positive(parse_number(matches, "udp-size")?, "udp-size")?;
        let dnssec_ok = matches.opt_present("dnssec");

        if bufsize.is_none() && !dnssec_ok {
            return Ok(None);
        }

        Ok(Some(Opt {
            udp_payload_size: bufsize.unwrap_or(0).max(MIN_EDNS_BUFSIZE),
            flags: if dnssec_ok { Opt::DO } else { 0 },
        }))
    }
}


/// Where the queries to send come from: a text file to compile, or a
/// raw file to use as-is. Exactly one must be given.
#[derive(PartialEq, Debug)]
pub enum CorpusFile {

    /// A dnsperf-style text file of `name type` pairs.
    Text(PathBuf),

    /// A pre-compiled raw file of length-prefixed records.
    Raw(PathBuf),
}

impl CorpusFile {
    fn deduce(matches: &getopts::Matches) -> Result<Self, OptionsError> {
        match (matches.opt_str("data"), matches.opt_str("raw")) {
            (Some(text), None)  => Ok(Self::Text(text.into())),
            (None, Some(raw))   => Ok(Self::Raw(raw.into())),
            (Some(_), Some(_))  => Err(OptionsError::ConflictingQueryFiles),
            (None, None)        => Err(OptionsError::MissingQueryFile),
        }
    }
}


/// Parses one numeric flag value, complaining with the flag name if the
/// value does not parse.
fn parse_number<N: std::str::FromStr>(matches: &getopts::Matches, flag: &'static str) -> Result<Option<N>, OptionsError> {
    match matches.opt_str(flag) {
        None        => Ok(None),
        Some(value) => {
            match value.parse() {
                Ok(number) => Ok(Some(number)),
                Err(_)     => Err(OptionsError::InvalidNumber { flag, value }),
            }
        }
    }
}

/// Rejects an explicit zero, which for every numeric flag here would
/// mean “do nothing at all”.
fn positive<N: PartialEq + From<u8> + fmt::Display>(number: Option<N>, flag: &'static str) -> Result<Option<N>, OptionsError> {
    match number {
        Some(n) if n == N::from(0) => Err(OptionsError::InvalidNumber { flag, value: n.to_string() }),
        otherwise                  => Ok(otherwise),
    }
}

/// Parses a colon-separated hardware address, the way `ether_aton` would.
fn parse_mac(input: &str) -> Option<[u8; 6]> {
    let mut octets = [0_u8; 6];
    let mut count = 0;

    for part in input.split(':') {
        if count == octets.len() || part.is_empty() || part.len() > 2 {
            return None;
        }

        octets[count] = u8::from_str_radix(part, 16).ok()?;
        count += 1;
    }

    if count == octets.len() {
        Some(octets)
    }
    else {
        None
    }
}

fn parse_address(matches: &getopts::Matches, flag: &'static str) -> Result<Option<Ipv4Addr>, OptionsError> {
    match matches.opt_str(flag) {
        None        => Ok(None),
        Some(value) => {
            match value.parse() {
                Ok(addr)  => Ok(Some(addr)),
                Err(_)    => Err(OptionsError::InvalidAddress(value)),
            }
        }
    }
}

fn default_thread_count() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1)
}


/// The result of the `Options::getopts` function.
#[derive(PartialEq, Debug)]
pub enum OptionsResult {

    /// The options were parsed successfully.
    Ok(Options),

    /// There was an error (from `getopts`) parsing the arguments.
    InvalidOptionsFormat(getopts::Fail),

    /// There was an error with the combination of options the user selected.
    InvalidOptions(OptionsError),

    /// Usage should be displayed instead of running.
    Help(HelpReason),

    /// One of the arguments was `--version`, to display the version number.
    Version,
}

/// The reason that help is being displayed. If it’s for the `--help` flag,
/// then we shouldn’t return an error exit status.
#[derive(PartialEq, Debug, Copy, Clone)]
pub enum HelpReason {

    /// Help was requested with the `--help` flag.
    Flag,

    /// Nothing at all was specified, so display help instead.
    NoArguments,
}

/// Something wrong with the combination of options the user has picked.
#[derive(PartialEq, Debug)]
pub enum OptionsError {
    MissingInterface,
    MissingSourceAddress,
    MissingServerAddress,
    MissingServerMac,
    MissingQueryFile,
    ConflictingQueryFiles,
    UnwantedArgument(String),
    InvalidAddress(String),
    InvalidMac(String),
    InvalidNumber {
        flag: &'static str,
        value: String,
    },
}

impl fmt::Display for OptionsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingInterface             => write!(f, "An interface must be given with --interface"),
            Self::MissingSourceAddress         => write!(f, "A local address must be given with --addr"),
            Self::MissingServerAddress         => write!(f, "A server address must be given with --server"),
            Self::MissingServerMac             => write!(f, "The server's hardware address must be given with --mac"),
            Self::MissingQueryFile             => write!(f, "A query file must be given with --data or --raw"),
            Self::ConflictingQueryFiles        => write!(f, "Only one of --data and --raw can be given"),
            Self::UnwantedArgument(arg)        => write!(f, "Unexpected argument {:?}", arg),
            Self::InvalidAddress(addr)         => write!(f, "Invalid IPv4 address {:?}", addr),
            Self::InvalidMac(mac)              => write!(f, "Invalid hardware address {:?}", mac),
            Self::InvalidNumber { flag, value }  => write!(f, "Invalid value {:?} for --{}", value, flag),
        }
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    impl OptionsResult {
        fn unwrap(self) -> Options {
            match self {
                Self::Ok(o)  => o,
                _            => panic!("{:?}", self),
            }
        }
    }

    fn required() -> Vec<&'static str> {
        vec![ "-i", "eth9", "-a", "192.0.2.1", "-s", "192.0.2.53",
              "-m", "aa:bb:cc:dd:ee:ff", "-D", "queries.raw" ]
    }

    // help and version tests

    #[test]
    fn help() {
        assert_eq!(Options::getopts(&[ "--help" ]),
                   OptionsResult::Help(HelpReason::Flag));
    }

    #[test]
    fn empty() {
        let nothing: Vec<&str> = vec![];
        assert_eq!(Options::getopts(nothing),
                   OptionsResult::Help(HelpReason::NoArguments));
    }

    #[test]
    fn version() {
        assert_eq!(Options::getopts(&[ "--version" ]),
                   OptionsResult::Version);
    }

    #[test]
    fn fail() {
        assert_eq!(Options::getopts(&[ "--pear" ]),
                   OptionsResult::InvalidOptionsFormat(getopts::Fail::UnrecognizedOption("pear".into())));
    }

    // deduction tests

    #[test]
    fn all_the_defaults() {
        let options = Options::getopts(required()).unwrap();

        assert_eq!(options.interface, "eth9");
        assert_eq!(options.source, Ipv4Addr::new(192, 0, 2, 1));
        assert_eq!(options.server, Ipv4Addr::new(192, 0, 2, 53));
        assert_eq!(options.server_mac, [ 0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff ]);
        assert_eq!(options.corpus, CorpusFile::Raw("queries.raw".into()));
        assert_eq!(options.port, 8053);
        assert_eq!(options.runtime, 30);
        assert_eq!(options.batch_size, 32);
        assert_eq!(options.rate, 10_000);
        assert_eq!(options.increment, 10_000);
        assert_eq!(options.ramp, false);
        assert_eq!(options.edns, None);
    }

    #[test]
    fn everything_specified() {
        let mut args = required();
        args.extend([ "-p", "53", "-T", "4", "-l", "120", "-b", "64",
                      "-r", "50000", "-R", "2500", "-M" ]);
        let options = Options::getopts(args).unwrap();

        assert_eq!(options.port, 53);
        assert_eq!(options.threads, 4);
        assert_eq!(options.runtime, 120);
        assert_eq!(options.batch_size, 64);
        assert_eq!(options.rate, 50_000);
        assert_eq!(options.increment, 2_500);
        assert_eq!(options.ramp, true);
    }

    #[test]
    fn text_corpus() {
        let args = vec![ "-i", "eth9", "-a", "192.0.2.1", "-s", "192.0.2.53",
                         "-m", "aa:bb:cc:dd:ee:ff", "-d", "queries.txt" ];
        let options = Options::getopts(args).unwrap();

        assert_eq!(options.corpus, CorpusFile::Text("queries.txt".into()));
    }

    #[test]
    fn missing_interface() {
        let args = vec![ "-a", "192.0.2.1", "-s", "192.0.2.53",
                         "-m", "aa:bb:cc:dd:ee:ff", "-D", "queries.raw" ];
        assert_eq!(Options::getopts(args),
                   OptionsResult::InvalidOptions(OptionsError::MissingInterface));
    }

    #[test]
    fn missing_query_file() {
        let args = vec![ "-i", "eth9", "-a", "192.0.2.1", "-s", "192.0.2.53",
                         "-m", "aa:bb:cc:dd:ee:ff" ];
        assert_eq!(Options::getopts(args),
                   OptionsResult::InvalidOptions(OptionsError::MissingQueryFile));
    }

    #[test]
    fn both_query_files() {
        let mut args = required();
        args.extend([ "-d", "queries.txt" ]);
        assert_eq!(Options::getopts(args),
                   OptionsResult::InvalidOptions(OptionsError::ConflictingQueryFiles));
    }

    #[test]
    fn free_arguments_are_rejected() {
        let mut args = required();
        args.push("surprise");
        assert_eq!(Options::getopts(args),
                   OptionsResult::InvalidOptions(OptionsError::UnwantedArgument("surprise".into())));
    }

    #[test]
    fn bad_address() {
        let args = vec![ "-i", "eth9", "-a", "not-an-address", "-s", "192.0.2.53",
                         "-m", "aa:bb:cc:dd:ee:ff", "-D", "queries.raw" ];
        assert_eq!(Options::getopts(args),
                   OptionsResult::InvalidOptions(OptionsError::InvalidAddress("not-an-address".into())));
    }

    #[test]
    fn bad_mac() {
        let args = vec![ "-i", "eth9", "-a", "192.0.2.1", "-s", "192.0.2.53",
                         "-m", "aa:bb:cc:dd:ee", "-D", "queries.raw" ];
        assert_eq!(Options::getopts(args),
                   OptionsResult::InvalidOptions(OptionsError::InvalidMac("aa:bb:cc:dd:ee".into())));
    }

    #[test]
    fn zero_batch() {
        let mut args = required();
        args.extend([ "-b", "0" ]);
        assert_eq!(Options::getopts(args),
                   OptionsResult::InvalidOptions(OptionsError::InvalidNumber { flag: "batch", value: "0".into() }));
    }

    // EDNS tests

    #[test]
    fn edns_bufsize() {
        let mut args = required();
        args.extend([ "-U", "4096" ]);
        let options = Options::getopts(args).unwrap();

        assert_eq!(options.edns, Some(Opt { udp_payload_size: 4096, flags: 0 }));
    }

    #[test]
    fn edns_bufsize_clamped() {
        let mut args = required();
        args.extend([ "-U", "100" ]);
        let options = Options::getopts(args).unwrap();

        assert_eq!(options.edns, Some(Opt { udp_payload_size: 512, flags: 0 }));
    }

    #[test]
    fn dnssec_alone_enables_edns() {
        let mut args = required();
        args.push("-X");
        let options = Options::getopts(args).unwrap();

        assert_eq!(options.edns, Some(Opt { udp_payload_size: 512, flags: 0x8000 }));
    }

    // MAC parsing tests

    #[test]
    fn macs() {
        assert_eq!(parse_mac("0:1:2:3:4:5"), Some([ 0, 1, 2, 3, 4, 5 ]));
        assert_eq!(parse_mac("a:bb:cc:dd:ee:ff"), Some([ 0x0a, 0xbb, 0xcc, 0xdd, 0xee, 0xff ]));
        assert_eq!(parse_mac("a:bb:cc:dd:ee:ff:00"), None);
        assert_eq!(parse_mac("abc:00:00:00:00:00"), None);
        assert_eq!(parse_mac(""), None);
        assert_eq!(parse_mac("gg:bb:cc:dd:ee:ff"), None);
    }
}
