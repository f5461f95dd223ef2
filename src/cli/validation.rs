use crate::cli::args::CliArgs;

// syntax checks on raw flag values, before they are merged with the config file
pub fn validate(args: &CliArgs) -> Result<(), String> {
    if let Some(threads) = args.threads {
        if threads == 0 {
            return Err("invalid threads, expected positive integer".to_string());
        }
    }
    if let Some(rps) = args.rps {
        if rps == 0 {
            return Err("invalid rps, expected positive integer".to_string());
        }
    }
    if let Some(raw) = args.timeout.as_deref() {
        crate::config::parse_duration(raw)
            .map_err(|e| format!("invalid --timeout '{raw}': {e}"))?;
    }
    if let Some(raw) = args.retry_delay.as_deref() {
        crate::config::parse_duration(raw)
            .map_err(|e| format!("invalid --retry-delay '{raw}': {e}"))?;
    }
    if let Some(raw) = args.methods.as_deref() {
        crate::utils::parse_http_methods_csv(raw)
            .map_err(|e| format!("invalid --methods '{raw}': {e}"))?;
    }
    if let Some(raw) = args.extensions.as_deref() {
        crate::utils::parse_extensions_csv(raw)
            .map_err(|e| format!("invalid --extensions '{raw}': {e}"))?;
    }
    if let Some(raw) = args.status_codes.as_deref() {
        crate::utils::parse_status_codes_csv(raw)
            .map_err(|e| format!("invalid --status-codes '{raw}': {e}"))?;
    }
    if let Some(raw) = args.exclude_status.as_deref() {
        crate::utils::parse_status_codes_csv(raw)
            .map_err(|e| format!("invalid --exclude-status '{raw}': {e}"))?;
    }
    for line in args.header.iter() {
        crate::config::parse_header_line(line).map_err(|e| e.to_string())?;
    }
    if let Some(raw) = args.format.as_deref() {
        if crate::output::OutputFormat::parse(raw).is_none() {
            return Err(format!(
                "invalid --format '{raw}', expected console, json or csv"
            ));
        }
    }
    if let (Some(min), Some(max)) = (args.min_size, args.max_size) {
        if min > 0 && max > 0 && min > max {
            return Err(format!("--min-size {min} is larger than --max-size {max}"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn parse(extra: &[&str]) -> CliArgs {
        let mut argv = vec!["dirsweep", "-u", "http://example.com/"];
        argv.extend_from_slice(extra);
        CliArgs::parse_from(argv)
    }

    #[test]
    fn accepts_well_formed_flags() {
        let args = parse(&[
            "-m",
            "get,post",
            "--timeout",
            "1500ms",
            "-H",
            "Cookie: a=b",
            "-H",
            "X-Test: 1",
            "--exclude-status",
            "",
        ]);
        validate(&args).unwrap();
        assert_eq!(args.header.len(), 2);
    }

    #[test]
    fn rejects_malformed_flags() {
        assert!(validate(&parse(&["-t", "0"])).is_err());
        assert!(validate(&parse(&["--timeout", "soon"])).is_err());
        assert!(validate(&parse(&["--status-codes", "2xx"])).is_err());
        assert!(validate(&parse(&["-H", "no-colon"])).is_err());
        assert!(validate(&parse(&["-f", "xml"])).is_err());
        assert!(validate(&parse(&["--min-size", "10", "--max-size", "5"])).is_err());
    }
}
