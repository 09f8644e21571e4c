/// Prints to the console (unless quiet) and appends the same text, without
/// ANSI colors, to the run log. A heading level > 0 turns the line into a
/// Markdown heading in the log.
#[macro_export]
macro_rules! make_notes {
    ($file:expr, $quiet:expr, $heading:literal, $($arg:tt)*) => {{
        use std::io::Write;
        if !$quiet {
            print!($($arg)*);
        }

        let formatted = format!($($arg)*);

        // ESC, '[', digits and ';' up to the closing 'm' or 'K'
        let mut plain = match regex::Regex::new(r"\x1B\[[0-9;]*[mK]") {
            Ok(re) => re.replace_all(&formatted, "").to_string(),
            Err(_) => formatted,
        };

        if $heading > 0 {
            let prefix = "#".repeat($heading as usize);
            plain = format!("{} {}\n", prefix, plain.trim());
        }

        if let Ok(mut file) = std::fs::OpenOptions::new().append(true).create(true).open($file) {
            let _ = write!(file, "{}", plain);
        }
    }};
}

/// Appends a line to the file named by AWRMINER_TRACE, if set.
#[macro_export]
macro_rules! debug_trace {
    ($($arg:tt)*) => {{
        use std::io::Write;

        if let Ok(trace_file) = std::env::var("AWRMINER_TRACE") {
            if let Ok(mut file) = std::fs::OpenOptions::new().append(true).create(true).open(trace_file) {
                let _ = writeln!(file, "{}", format_args!($($arg)*));
            }
        }
    }};
}

/// `debug_trace!` with a timestamp and the call site.
#[macro_export]
macro_rules! debug_note {
    ($($arg:tt)*) => {{
        let time = $crate::tools::get_timestamp();
        $crate::debug_trace!(
            "[{}] [{}:{}] {}",
            time,
            file!(),
            line!(),
            format_args!($($arg)*)
        );
    }};
}
