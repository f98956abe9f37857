#![no_main]

use libfuzzer_sys::fuzz_target;
use perfcache::config::{parse_bool, PerfConfig};
use perfcache::recorder::StatField;

const VARS: [&str; 6] = [
    "API_CACHE_SIZE",
    "API_CACHE_TTL_MINUTES",
    "SLOW_FUNCTION_THRESHOLD",
    "MIN_WORKERS",
    "MAX_WORKERS_MULTIPLIER",
    "ENABLE_PROFILING",
];

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        let _ = parse_bool(input);
        let _ = input.parse::<StatField>();

        // Feed the same value to every variable; a config that loads must validate
        for var in VARS {
            let result = PerfConfig::from_lookup(|key| (key == var).then(|| input.to_string()));
            if let Ok(config) = result {
                assert!(config.validate().is_ok());
                let _ = config.optimal_workers(Some(input.len()));
            }
        }
    }
});
