#![no_main]
use libfuzzer_sys::fuzz_target;

use exi_stream::{CodingMode, ExiOptions, Grammar, Preserve};

fuzz_target!(|data: &[u8]| {
    let Some((&mode, body)) = data.split_first() else { return };
    let mut opts = ExiOptions::default();
    if mode & 1 != 0 {
        opts.set_coding_mode(CodingMode::BytePacked);
    }
    if mode & 2 != 0 {
        opts.set_fragment(true);
    }
    if mode & 4 != 0 {
        opts.set_preserve(Preserve {
            comments: true,
            pis: true,
            dtd: true,
            prefixes: true,
            lexical_values: false,
        });
    }
    if mode & 8 != 0 {
        opts.set_value_partition_capacity(Some(u32::from(mode >> 4)));
    }
    // Nur Fehler, keine Panics
    let _ = exi_stream::decode(Grammar::schema_less(), opts, body);
});
