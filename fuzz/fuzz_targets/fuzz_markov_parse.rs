#![no_main]

use libfuzzer_sys::fuzz_target;
use netprobe_core::markov::MarkovLengthGenerator;

// Malformed descriptions should return a `CoreError`, never panic.
fuzz_target!(|data: &str| {
    let _ = MarkovLengthGenerator::parse(data);
});
