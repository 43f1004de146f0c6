//! Debug logging, controlled by `-v` flags or the `DOGPILE_DEBUG`
//! environment variable.

use std::env;


/// Configures the logger: an explicit filter string wins, then a
/// non-empty `DOGPILE_DEBUG` turns on debug logging, and otherwise the
/// logger stays quiet so the stats stream is all there is.
pub fn configure(filter: Option<&str>) {
    let mut logs = env_logger::Builder::new();

    if let Some(filter) = filter {
        let _ = logs.parse_filters(filter);
    }
    else {
        let present = match env::var_os("DOGPILE_DEBUG") {
            Some(debug)  => debug.len() > 0,
            None         => false,
        };

        if present {
            let _ = logs.filter(None, log::LevelFilter::Debug);
        }
        else {
            let _ = logs.filter(None, log::LevelFilter::Off);
        }
    }

    let _ = logs.try_init();
}
