//! dogpile-echo, the reflector half of the toolkit: bounces DNS queries
//! straight back at whoever sent them.
//!
//! Each worker takes raw packets off a receive ring, swaps the IP
//! addresses and UDP ports in place, and sends the buffer back out of the
//! same socket. Neither checksum needs recomputing: swapping two
//! sixteen-bit quantities within the summed region leaves a one's
//! complement sum exactly where it was.

#![warn(deprecated_in_future)]
#![warn(future_incompatible)]
#![warn(missing_copy_implementations)]
#![warn(missing_docs)]
#![warn(nonstandard_style)]
#![warn(rust_2018_compatibility)]
#![warn(rust_2018_idioms)]
#![warn(single_use_lifetimes)]
#![warn(trivial_casts, trivial_numeric_casts)]
#![warn(unused)]

#![deny(unsafe_code)]


use std::env;
use std::ffi::OsStr;
use std::process::exit;
use std::thread;

use log::*;

use dns_transport::{cpu, Error, LinkAddr, PacketSocket};


/// Echo frames are small: queries are the only traffic expected, and 512
/// bytes holds any reasonable one. A deep ring soaks up bursts instead.
const FRAME_BITS: u32 = 9;

/// How many frames the ring holds.
const FRAME_COUNT: usize = 4096;

/// The port DNS servers under test conventionally listen on.
const DEFAULT_PORT: u16 = 8053;

/// The size of a UDP header, which a packet must be able to hold past
/// its IP header before the port fields mean anything.
const UDP_HEADER_LEN: usize = 8;


/// Parses the options, spawns one pinned echo worker per CPU, and waits
/// forever: the responder has no natural end, so it runs until killed.
fn main() {
    let options = match Options::getopts(env::args_os().skip(1)) {
        OptionsResult::Ok(options) => options,

        OptionsResult::Help => {
            print!("{}", USAGE);
            exit(exits::SUCCESS);
        }

        OptionsResult::Invalid(why) => {
            eprintln!("{}", why);
            print!("{}", USAGE);
            exit(exits::OPTIONS_ERROR);
        }
    };

    info!("Running with options -> {:#?}", options);
    match run(&options) {
        Ok(())  => exit(exits::SUCCESS),
        Err(e)  => {
            eprintln!("error: {}", e);
            exit(exits::RUNTIME_ERROR);
        }
    }
}

fn run(options: &Options) -> Result<(), Error> {
    let interface = options.interface.as_str();
    let port = options.port;

    thread::scope(|scope| -> Result<(), Error> {
        for index in 0 .. options.threads {
            let builder = thread::Builder::new().name(format!("echo:{}", index));

            let spawned = builder.spawn_scoped(scope, move || {
                if let Err(e) = echo_worker(interface, port, index) {
                    // one worker going down is that worker's problem;
                    // the rest keep reflecting
                    eprintln!("error: {}", e);
                }
            });

            if let Err(e) = spawned {
                return Err(Error::Syscall { call: "spawn", source: e });
            }
        }

        Ok(())
    })
}

/// One worker: open and bind a socket, pin to this worker's CPU, map the
/// ring, and reflect forever.
fn echo_worker(interface: &str, port: u16, index: usize) -> Result<(), Error> {
    let socket = PacketSocket::open()?;
    socket.bind_interface(interface)?;
    cpu::pin_current_thread(index)?;

    let mut ring = socket.rx_ring(FRAME_BITS, FRAME_COUNT)?;
    debug!("Echo worker {} listening", index);

    loop {
        ring.next(-1, |buf, addr| echo_one(&socket, port, buf, addr))?;
    }
}

/// Reflects a single packet in place: queries to the configured port get
/// their addresses and ports swapped and go back out; everything else is
/// dropped without a word.
fn echo_one(socket: &PacketSocket, port: u16, buf: &mut [u8], addr: &LinkAddr) -> Result<(), Error> {
    let Some(udp) = target_offset(buf, port) else {
        return Ok(());
    };

    reflect(buf, udp);

    match socket.send_to(buf, addr) {
        Ok(_) => Ok(()),
        Err(e) if e.is_would_block() => {
            trace!("Send queue full, dropping echo");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Where the UDP header starts, but only if this packet was really
/// aimed at the port we serve. Anything else — runts, IP fragments of
/// other conversations, unrelated traffic the fanout group sweeps up —
/// comes back as `None` and is dropped without a word.
fn target_offset(buf: &[u8], port: u16) -> Option<usize> {
    let udp = udp_header_offset(buf)?;

    if buf[udp + 2 .. udp + 4] == port.to_be_bytes() {
        Some(udp)
    }
    else {
        None
    }
}

/// Turns a query around in place: IP source and destination swap, and so
/// do the UDP ports.
fn reflect(buf: &mut [u8], udp: usize) {
    for i in 0 .. 4 {
        buf.swap(12 + i, 16 + i);
    }

    for i in 0 .. 2 {
        buf.swap(udp + i, udp + 2 + i);
    }
}

/// Where the UDP header starts, if the buffer really holds an IPv4
/// packet long enough to carry one.
fn udp_header_offset(buf: &[u8]) -> Option<usize> {
    let ihl = usize::from(buf.first()? & 0x0f);
    if ihl < 5 {
        return None;
    }

    let udp = ihl * 4;
    if buf.len() < udp + UDP_HEADER_LEN {
        return None;
    }

    Some(udp)
}


/// The command-line options used when running dogpile-echo.
#[derive(PartialEq, Debug)]
struct Options {

    /// The network interface to listen on.
    interface: String,

    /// The UDP port queries are expected on.
    port: u16,

    /// How many workers to run, one per CPU.
    threads: usize,
}

impl Options {
    fn getopts<C>(args: C) -> OptionsResult
    where C: IntoIterator,
          C::Item: AsRef<OsStr>,
    {
        let mut opts = getopts::Options::new();
        opts.optopt      ("i", "interface",  "Network interface to listen on", "IFACE");
        opts.optopt      ("p", "port",       "Port to listen on", "PORT");
        opts.optopt      ("T", "threads",    "Number of workers to run", "COUNT");
        opts.optflagmulti("v", "",           "Increase verbosity by adding multiple (-vv)");
        opts.optflag     ("?", "help",       "Print list of command-line options");

        let matches = match opts.parse(args) {
            Ok(m)  => m,
            Err(e) => return OptionsResult::Invalid(e.to_string()),
        };

        match matches.opt_count("v") {
            0 => logger_configure(None),
            1 => logger_configure(Some("debug")),
            _ => logger_configure(Some("trace")),
        }

        if matches.opt_present("help") {
            return OptionsResult::Help;
        }

        if let Some(arg) = matches.free.first() {
            return OptionsResult::Invalid(format!("Unexpected argument {:?}", arg));
        }

        let Some(interface) = matches.opt_str("interface") else {
            return OptionsResult::Invalid("An interface must be given with --interface".into());
        };

        let port = match matches.opt_str("port").map(|p| p.parse::<u16>()) {
            None               => DEFAULT_PORT,
            Some(Ok(p)) if p > 0  => p,
            Some(_)            => return OptionsResult::Invalid("Invalid value for --port".into()),
        };

        let threads = match matches.opt_str("threads").map(|t| t.parse::<usize>()) {
            None               => default_thread_count(),
            Some(Ok(t)) if t > 0  => t,
            Some(_)            => return OptionsResult::Invalid("Invalid value for --threads".into()),
        };

        OptionsResult::Ok(Options { interface, port, threads })
    }
}

/// The result of the `Options::getopts` function.
#[derive(PartialEq, Debug)]
enum OptionsResult {
    Ok(Options),
    Help,
    Invalid(String),
}

fn default_thread_count() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1)
}

/// Configures the logger the same way the generator does, off `-v` flags
/// or the `DOGPILE_DEBUG` environment variable.
fn logger_configure(filter: Option<&str>) {
    let mut logs = env_logger::Builder::new();

    if let Some(filter) = filter {
        let _ = logs.parse_filters(filter);
    }
    else if env::var_os("DOGPILE_DEBUG").map_or(false, |v| v.len() > 0) {
        let _ = logs.filter(None, log::LevelFilter::Debug);
    }
    else {
        let _ = logs.filter(None, log::LevelFilter::Off);
    }

    let _ = logs.try_init();
}


const USAGE: &str = "\
Usage:
  dogpile-echo -i IFACE [-p PORT] [-T COUNT]

Options:
  -i, --interface IFACE  Network interface to listen on
  -p, --port PORT        Port to listen on (default: 8053)
  -T, --threads COUNT    Number of workers to run (default: all CPUs)
  -v                     Increase verbosity by adding multiple (-vv)
  -?, --help             Print list of command-line options
";


mod exits {

    /// Exit code for when everything turns out OK.
    pub const SUCCESS: i32 = 0;

    /// Exit code for when a worker failed at runtime.
    pub const RUNTIME_ERROR: i32 = 1;

    /// Exit code for when the command-line options are invalid.
    pub const OPTIONS_ERROR: i32 = 3;
}


#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    /// A minimal IPv4+UDP packet destined for the given port.
    fn packet(dest_port: u16) -> Vec<u8> {
        let mut buf = vec![0_u8; 28];
        buf[0] = 0x45;
        buf[12 .. 16].copy_from_slice(&[ 192, 0, 2, 1 ]);    // source
        buf[16 .. 20].copy_from_slice(&[ 192, 0, 2, 53 ]);   // destination
        buf[20 .. 22].copy_from_slice(&16384_u16.to_be_bytes());
        buf[22 .. 24].copy_from_slice(&dest_port.to_be_bytes());
        buf
    }

    #[test]
    fn udp_offset_without_options() {
        assert_eq!(udp_header_offset(&packet(8053)), Some(20));
    }

    #[test]
    fn udp_offset_with_options() {
        let mut buf = vec![0_u8; 60];
        buf[0] = 0x46;  // ihl 6: one option word

        assert_eq!(udp_header_offset(&buf), Some(24));
    }

    #[test]
    fn runt_packets_have_no_udp() {
        assert_eq!(udp_header_offset(&[]), None);
        assert_eq!(udp_header_offset(&[ 0x45, 0x00 ]), None);
        assert_eq!(udp_header_offset(&vec![ 0x4f; 20 ]), None);
        assert_eq!(udp_header_offset(&[ 0x40 ]), None);
    }

    #[test]
    fn only_our_port_is_answered() {
        assert_eq!(target_offset(&packet(8053), 8053), Some(20));
        assert_eq!(target_offset(&packet(8054), 8053), None);
        assert_eq!(target_offset(&packet(53), 8053), None);
        assert_eq!(target_offset(&[ 0x45, 0x00 ], 8053), None);
    }

    #[test]
    fn reflection_swaps_in_place() {
        let mut buf = packet(8053);
        reflect(&mut buf, 20);

        assert_eq!(&buf[12 .. 16], &[ 192, 0, 2, 53 ]);
        assert_eq!(&buf[16 .. 20], &[ 192, 0, 2, 1 ]);
        assert_eq!(&buf[20 .. 22], &8053_u16.to_be_bytes());
        assert_eq!(&buf[22 .. 24], &16384_u16.to_be_bytes());
        assert_eq!(buf.len(), packet(8053).len());
    }

    #[test]
    fn reflection_undoes_itself() {
        let mut buf = packet(53);
        reflect(&mut buf, 20);
        reflect(&mut buf, 20);

        assert_eq!(buf, packet(53));
    }

    #[test]
    fn options_parse() {
        let options = match Options::getopts([ "-i", "eth9", "-p", "53", "-T", "2" ]) {
            OptionsResult::Ok(o)  => o,
            other                 => panic!("{:?}", other),
        };

        assert_eq!(options, Options {
            interface: "eth9".into(),
            port: 53,
            threads: 2,
        });
    }

    #[test]
    fn interface_is_mandatory() {
        assert_eq!(Options::getopts([ "-p", "53" ]),
                   OptionsResult::Invalid("An interface must be given with --interface".into()));
    }

    #[test]
    fn port_zero_is_rejected() {
        assert_eq!(Options::getopts([ "-i", "eth9", "-p", "0" ]),
                   OptionsResult::Invalid("Invalid value for --port".into()));
    }
}
