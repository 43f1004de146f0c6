//! dogpile, the command-line DNS load generator.

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
use std::fmt;
use std::io;
use std::process::exit;
use std::thread;

use log::*;

use dns::QueryFile;
use dns_transport::{cpu, ifindex, PacketSocket};

mod adapter;
mod logger;
mod receiver;
mod sender;
mod state;

mod options;
use self::options::*;

use self::receiver::Receiver;
use self::sender::Sender;
use self::state::{life_timer, SharedState, StartGate};


/// Configures logging, parses the command-line options, and handles any
/// errors before handing over to the pipeline.
fn main() {
    match Options::getopts(env::args_os().skip(1)) {
        OptionsResult::Ok(options) => {
            info!("Running with options -> {:#?}", options);
            exit(run(options));
        }

        OptionsResult::Help(help_reason) => {
            print!("{}", USAGE);

            if help_reason == HelpReason::NoArguments {
                exit(exits::OPTIONS_ERROR);
            }
            else {
                exit(exits::SUCCESS);
            }
        }

        OptionsResult::Version => {
            println!("dogpile {}", env!("CARGO_PKG_VERSION"));
            exit(exits::SUCCESS);
        }

        OptionsResult::InvalidOptionsFormat(oe) => {
            eprintln!("Invalid options: {}", oe);
            exit(exits::OPTIONS_ERROR);
        }

        OptionsResult::InvalidOptions(why) => {
            eprintln!("{}", why);
            exit(exits::OPTIONS_ERROR);
        }
    }
}

fn run(options: Options) -> i32 {
    match generate(options) {
        Ok(()) => {
            exits::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {}", e);
            exits::RUNTIME_ERROR
        }
    }
}

/// Loads the corpus, opens a bound socket per worker pair, and runs the
/// whole pipeline to completion: senders and receivers pinned in pairs to
/// each CPU, the rate adapter steering them, and the timer thread calling
/// time. The first error any thread returned is re-raised here once
/// every thread has been joined.
fn generate(options: Options) -> Result<(), RunError> {
    let ifindex = ifindex(&options.interface)?;

    let mut queries = QueryFile::new();
    match &options.corpus {
        CorpusFile::Text(path)  => queries.read_txt(path)?,
        CorpusFile::Raw(path)   => queries.read_raw(path)?,
    }

    if queries.is_empty() {
        return Err(RunError::EmptyCorpus);
    }

    if let Some(opt) = options.edns {
        debug!("Upgrading corpus to EDNS -> {:?}", opt);
        queries.edns(opt.udp_payload_size, opt.flags)?;
    }

    let shared = SharedState {
        thread_count: options.threads,
        batch_size: options.batch_size,
        ifindex,
        dest_port: options.port,
        src_ip: options.source,
        dest_ip: options.server,
        dest_mac: options.server_mac,
        queries,
        runtime: options.runtime,
        increment: options.increment,
        ramp: options.ramp,
        rate: options.rate.into(),
        rx_count: 0.into(),
        tx_count: 0.into(),
        stop: false.into(),
        start: StartGate::new(),
    };

    // every worker pair gets one socket, used by its sender to transmit
    // and by its receiver for the ring; opened and bound before any
    // thread starts so a failure here stays simple
    let mut sockets = Vec::with_capacity(shared.thread_count);
    for _ in 0 .. shared.thread_count {
        let socket = PacketSocket::open()?;
        socket.bind(ifindex)?;
        sockets.push(socket);
    }

    thread::scope(|scope| {
        let shared = &shared;
        let mut workers = Vec::with_capacity(2 * shared.thread_count + 2);

        let spawned = (|| -> Result<(), RunError> {
            for (index, socket) in sockets.iter().enumerate() {
                let tx = thread::Builder::new()
                    .name(format!("tx:{}", index))
                    .spawn_scoped(scope, move || {
                        cpu::pin_current_thread(index)?;
                        Sender::new(shared, socket, index).run()
                    })?;
                workers.push(tx);

                let rx = thread::Builder::new()
                    .name(format!("rx:{}", index))
                    .spawn_scoped(scope, move || {
                        cpu::pin_current_thread(index)?;
                        Receiver::new(shared, socket, index).run()
                    })?;
                workers.push(rx);
            }

            let rate = thread::Builder::new()
                .name("rate".into())
                .spawn_scoped(scope, move || adapter::run(shared))?;
            workers.push(rate);

            let timer = thread::Builder::new()
                .name("timer".into())
                .spawn_scoped(scope, move || life_timer(shared))?;
            workers.push(timer);

            Ok(())
        })();

        if spawned.is_err() {
            // anything already spawned is waiting behind the gate;
            // release it with the stop flag up so the scope can end
            shared.stop.store(true, std::sync::atomic::Ordering::Relaxed);
            shared.start.open();
        }
        spawned?;

        // the first failure wins; every thread still gets joined
        let mut first_error = None;
        for worker in workers {
            match worker.join() {
                Ok(Ok(()))  => {}
                Ok(Err(e))  => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
                Err(panic)  => std::panic::resume_unwind(panic),
            }
        }

        match first_error {
            Some(e)  => Err(e.into()),
            None     => Ok(()),
        }
    })
}


/// Something that stopped a run from completing.
#[derive(Debug)]
enum RunError {

    /// The wire side failed: a socket, ring, clock, or send went wrong.
    Transport(dns_transport::Error),

    /// The query corpus failed to load or upgrade.
    Corpus(dns::QueryFileError),

    /// The corpus loaded but held nothing to send.
    EmptyCorpus,

    /// A worker thread could not even be spawned.
    Spawn(io::Error),
}

impl From<dns_transport::Error> for RunError {
    fn from(inner: dns_transport::Error) -> Self {
        Self::Transport(inner)
    }
}

impl From<dns::QueryFileError> for RunError {
    fn from(inner: dns::QueryFileError) -> Self {
        Self::Corpus(inner)
    }
}

impl From<io::Error> for RunError {
    fn from(inner: io::Error) -> Self {
        Self::Spawn(inner)
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e)  => e.fmt(f),
            Self::Corpus(e)     => e.fmt(f),
            Self::EmptyCorpus   => write!(f, "query file contains no queries"),
            Self::Spawn(e)      => write!(f, "couldn't spawn thread: {}", e),
        }
    }
}


const USAGE: &str = "\
Usage:
  dogpile -i IFACE -a ADDR -s ADDR -m MAC (-d FILE | -D FILE) [options]

Examples:
  dogpile -i eth1 -a 192.0.2.1 -s 192.0.2.53 -m 3c:ec:ef:12:34:56 -d queries.txt
  dogpile -i eth1 -a 192.0.2.1 -s 192.0.2.53 -m 3c:ec:ef:12:34:56 -D queries.raw -M

Network options:
  -i, --interface IFACE  Network interface to use
  -a, --addr ADDR        Local address to send queries from
  -s, --server ADDR      Address of the server to query
  -m, --mac MAC          Hardware address of the server to query
  -p, --port PORT        Port the server is listening on (default: 8053)

Corpus options:
  -d, --data FILE        Text query file to compile and send
  -D, --raw FILE         Raw query file to send
  -U, --udp-size BYTES   EDNS UDP buffer size to advertise (enables EDNS)
  -X, --dnssec           Set the DNSSEC OK bit (enables EDNS)

Load options:
  -T, --threads COUNT    Number of sender/receiver pairs (default: all CPUs)
  -l, --limit SECONDS    Number of seconds to run for (default: 30)
  -b, --batch COUNT      Number of packets per sendmmsg batch (default: 32)
  -r, --rate RATE        Initial packet rate per second (default: 10000)
  -R, --increment RATE   Packet rate increment per tick (default: 10000)
  -M, --ramp             Raise the rate every tick instead of adapting

Meta options:
  -V, --version          Print version information
  -v                     Increase verbosity by adding multiple (-vv)
  -?, --help             Print list of command-line options
";


mod exits {

    /// Exit code for when everything turns out OK.
    pub const SUCCESS: i32 = 0;

    /// Exit code for when the pipeline failed at runtime.
    pub const RUNTIME_ERROR: i32 = 1;

    /// Exit code for when the command-line options are invalid.
    pub const OPTIONS_ERROR: i32 = 3;
}
