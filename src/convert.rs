//! dogpile-convert: compiles a text query file into the raw format the
//! generator can load without doing any work at startup.

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
use std::process::exit;

use log::*;

use dns::QueryFile;


/// Takes the one input path, derives the output path from it, and runs
/// the conversion.
fn main() {
    configure_logger();

    let mut args = env::args_os().skip(1);
    let (Some(input), None) = (args.next(), args.next()) else {
        eprintln!("Usage: dogpile-convert FILE.txt");
        exit(exits::OPTIONS_ERROR);
    };

    let input = match input.into_string() {
        Ok(input) => input,
        Err(input) => {
            eprintln!("error: file name {:?} is not valid UTF-8", input);
            exit(exits::OPTIONS_ERROR);
        }
    };

    let output = output_name(&input);
    info!("Converting {} into {}", input, output);

    match convert(&input, &output) {
        Ok(()) => exit(exits::SUCCESS),
        Err(e) => {
            eprintln!("error: {}", e);
            exit(exits::RUNTIME_ERROR);
        }
    }
}

fn convert(input: &str, output: &str) -> Result<(), dns::QueryFileError> {
    let mut queries = QueryFile::new();
    queries.read_txt(input)?;
    queries.write_raw(output)
}

/// The output name is the input name with any `.txt` suffix stripped and
/// `.raw` appended.
fn output_name(input: &str) -> String {
    let stem = input.strip_suffix(".txt").unwrap_or(input);
    format!("{}.raw", stem)
}

/// Checks the `DOGPILE_DEBUG` environment variable, enabling debug
/// logging if it’s non-empty.
fn configure_logger() {
    let present = match env::var_os("DOGPILE_DEBUG") {
        Some(debug)  => debug.len() > 0,
        None         => false,
    };

    let mut logs = env_logger::Builder::new();
    if present {
        let _ = logs.filter(None, log::LevelFilter::Debug);
    }
    else {
        let _ = logs.filter(None, log::LevelFilter::Off);
    }

    logs.init()
}


mod exits {

    /// Exit code for when everything turns out OK.
    pub const SUCCESS: i32 = 0;

    /// Exit code for when the conversion failed.
    pub const RUNTIME_ERROR: i32 = 1;

    /// Exit code for when the command-line arguments are invalid.
    pub const OPTIONS_ERROR: i32 = 3;
}


#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn txt_suffix_is_replaced() {
        assert_eq!(output_name("queries.txt"), "queries.raw");
    }

    #[test]
    fn other_names_gain_a_suffix() {
        assert_eq!(output_name("queries"), "queries.raw");
        assert_eq!(output_name("queries.text"), "queries.text.raw");
        assert_eq!(output_name("txt"), "txt.raw");
    }
}
