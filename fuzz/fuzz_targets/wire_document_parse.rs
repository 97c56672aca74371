//! Fuzz target for label document decoding.
//!
//! This fuzzer feeds arbitrary byte sequences to the document decoder,
//! checking for panics, crashes, or hangs.

#![no_main]

use std::sync::{Arc, OnceLock};

use labelspace::{wire::from_json_slice, Ontology};
use libfuzzer_sys::fuzz_target;

const ONTOLOGY: &str = include_str!("../../tests/fixtures/ontology.json");

fn ontology() -> Arc<Ontology> {
    static ONTOLOGY_CELL: OnceLock<Arc<Ontology>> = OnceLock::new();
    ONTOLOGY_CELL
        .get_or_init(|| Arc::new(Ontology::from_json_str(ONTOLOGY).expect("fixture ontology")))
        .clone()
}

fuzz_target!(|data: &[u8]| {
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    let _ = from_json_slice(ontology(), data);
});
