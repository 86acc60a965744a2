//! `probe` subcommand: one reachability check against the configured strip.

use std::path::Path;
use std::time::Instant;

use super::{ProbeOutput, Result, kv, kv_width, load_config, print_json};
use elitelight_lib::probe::{Reachability, ReachabilityProber};

pub(super) fn cmd_probe(config_path: Option<&Path>, json: bool) -> Result<()> {
    let config = load_config(config_path);
    let endpoint = config.endpoint()?;
    let probe_config = config.probe_config();
    let timeout = probe_config.timeout;
    let prober = ReachabilityProber::new(probe_config);

    let started = Instant::now();
    let result = prober.check_reachable(&endpoint);
    let elapsed = started.elapsed();

    if json {
        return print_json(&ProbeOutput {
            device: endpoint.identity().to_string(),
            host: endpoint.host().to_string(),
            port: endpoint.port(),
            reachable: result == Reachability::Reachable,
            elapsed_ms: elapsed.as_millis(),
        });
    }

    let w = kv_width(&["Device:", "Address:", "Timeout:", "Result:"], &[]);
    kv("Device:", endpoint.identity(), w);
    kv(
        "Address:",
        format_args!("{}:{}", endpoint.host(), endpoint.port()),
        w,
    );
    kv("Timeout:", format_args!("{} ms", timeout.as_millis()), w);
    kv(
        "Result:",
        format_args!("{result} ({} ms)", elapsed.as_millis()),
        w,
    );
    Ok(())
}
